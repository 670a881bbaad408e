use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The four looks a manicure photo can be restyled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StylePreset {
    Professional,
    Glamour,
    Minimal,
    Artistic,
}

impl StylePreset {
    pub const ALL: [StylePreset; 4] = [Self::Professional, Self::Glamour, Self::Minimal, Self::Artistic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Glamour => "glamour",
            Self::Minimal => "minimal",
            Self::Artistic => "artistic",
        }
    }

    /// Fixed instruction text sent to the model for this style.
    pub fn instruction(&self, language: Language) -> &'static str {
        match (language, self) {
            (Language::Polish, Self::Professional) => PL_PROFESSIONAL,
            (Language::Polish, Self::Glamour) => PL_GLAMOUR,
            (Language::Polish, Self::Minimal) => PL_MINIMAL,
            (Language::Polish, Self::Artistic) => PL_ARTISTIC,
            (Language::English, Self::Professional) => EN_PROFESSIONAL,
            (Language::English, Self::Glamour) => EN_GLAMOUR,
            (Language::English, Self::Minimal) => EN_MINIMAL,
            (Language::English, Self::Artistic) => EN_ARTISTIC,
        }
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PL_PROFESSIONAL: &str = "Przekształć to zdjęcie manicure w profesjonalną fotografię produktową:
1. Usuń całkowicie tło
2. Dodaj gradient tła od jasnoszarego do białego
3. Dodaj profesjonalne oświetlenie studyjne typu softbox
4. Popraw ostrość i szczegóły paznokci
5. Zwiększ nasycenie koloru lakieru
6. Usuń wszystkie niedoskonałości skóry
7. Dodaj subtelny cień pod dłonią";

const PL_GLAMOUR: &str = "Przekształć to zdjęcie manicure w glamour shot:
1. Usuń tło i zastąp błyszczącym, rozmytym bokeh w odcieniach różu i złota
2. Dodaj delikatne cząsteczki brokatu wokół paznokci
3. Zwiększ blask i połysk lakieru
4. Dodaj ciepłe, złote oświetlenie
5. Wygładź skórę zachowując naturalność
6. Podkreśl kontury paznokci";

const PL_MINIMAL: &str = "Stwórz minimalistyczną wersję zdjęcia manicure:
1. Usuń tło i zastąp czystym białym
2. Zastosuj wysokie oświetlenie high-key
3. Usuń wszystkie rozpraszające elementy
4. Zachowaj czystą, prostą kompozycję
5. Lekko rozjaśnij całość
6. Wyostrz krawędzie paznokci";

const PL_ARTISTIC: &str = "Przekształć zdjęcie manicure w artystyczną fotografię:
1. Dodaj kreatywne, kolorowe tło z abstrakcyjnymi kształtami
2. Zastosuj interesujące oświetlenie z kolorowymi refleksami
3. Zwiększ kontrast i saturację
4. Dodaj artystyczny efekt rozmycia w wybranych miejscach
5. Podkreśl unikalność designu paznokci";

const EN_PROFESSIONAL: &str = "Turn this manicure photo into a professional product photograph:
1. Remove the background completely
2. Add a background gradient from light grey to white
3. Add professional softbox studio lighting
4. Improve the sharpness and detail of the nails
5. Increase the saturation of the polish colour
6. Remove all skin imperfections
7. Add a subtle shadow under the hand";

const EN_GLAMOUR: &str = "Turn this manicure photo into a glamour shot:
1. Remove the background and replace it with a sparkling, blurred bokeh in shades of pink and gold
2. Add delicate glitter particles around the nails
3. Increase the shine and gloss of the polish
4. Add warm, golden lighting
5. Smooth the skin while keeping it natural
6. Emphasise the contours of the nails";

const EN_MINIMAL: &str = "Create a minimalist version of this manicure photo:
1. Remove the background and replace it with clean white
2. Apply bright high-key lighting
3. Remove all distracting elements
4. Keep a clean, simple composition
5. Slightly brighten the whole image
6. Sharpen the edges of the nails";

const EN_ARTISTIC: &str = "Turn this manicure photo into an artistic photograph:
1. Add a creative, colourful background with abstract shapes
2. Apply interesting lighting with colourful reflections
3. Increase contrast and saturation
4. Add an artistic blur effect in selected areas
5. Emphasise the uniqueness of the nail design";

/// Language of the instruction templates and of every user-facing notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    Polish,
    English,
}

impl Language {
    pub fn messages(&self) -> &'static Messages {
        match self {
            Self::Polish => &POLISH_MESSAGES,
            Self::English => &ENGLISH_MESSAGES,
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pl" | "polish" => Ok(Self::Polish),
            "en" | "english" => Ok(Self::English),
            other => Err(format!("unsupported language '{other}' (expected pl or en)")),
        }
    }
}

pub struct Messages {
    pub credential_saved: &'static str,
    pub credential_empty: &'static str,
    pub credential_missing: &'static str,
    pub image_missing: &'static str,
    pub not_an_image: &'static str,
    pub already_processing: &'static str,
    pub processed: &'static str,
    pub no_result: &'static str,
    pub error_prefix: &'static str,
}

static POLISH_MESSAGES: Messages = Messages {
    credential_saved: "Klucz API zapisany!",
    credential_empty: "Klucz API nie może być pusty!",
    credential_missing: "Wprowadź klucz API Google AI Studio!",
    image_missing: "Wybierz zdjęcie do przetworzenia!",
    not_an_image: "Wybrany plik nie jest obrazem!",
    already_processing: "Przetwarzanie już trwa, poczekaj na wynik.",
    processed: "Zdjęcie przetworzone pomyślnie!",
    no_result: "Model nie zwrócił obrazu. Spróbuj ponownie.",
    error_prefix: "Błąd",
};

static ENGLISH_MESSAGES: Messages = Messages {
    credential_saved: "API key saved!",
    credential_empty: "The API key cannot be empty!",
    credential_missing: "Enter your Google AI Studio API key!",
    image_missing: "Choose a photo to process!",
    not_an_image: "The selected file is not an image!",
    already_processing: "Processing is already running, please wait for the result.",
    processed: "Photo processed successfully!",
    no_result: "The model did not return an image. Please try again.",
    error_prefix: "Error",
};
