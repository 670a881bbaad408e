use anyhow::Context;
use std::time::Duration;

use crate::{gemini::{DEFAULT_API_BASE, DEFAULT_MODEL}, prompts::Language};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_MB: usize = 20;
const DEFAULT_SESSION_TTL_MINS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub api_base: String,
    pub model: String,
    pub language: Language,
    pub max_upload_bytes: usize,
    /// Sessions untouched for this long are dropped.
    pub session_ttl: Duration,
}

impl Config {
    /// Reads settings from the environment (after `.env` has been loaded).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid PORT '{v}'"))?,
            None => DEFAULT_PORT,
        };
        let language = match get("EDITOR_LANGUAGE") {
            Some(v) => v.parse::<Language>().map_err(anyhow::Error::msg).context("invalid EDITOR_LANGUAGE")?,
            None => Language::default(),
        };
        let max_upload_mb: usize = match get("MAX_UPLOAD_MB") {
            Some(v) => v.parse().with_context(|| format!("invalid MAX_UPLOAD_MB '{v}'"))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };
        let session_ttl_mins: u64 = match get("SESSION_TTL_MINS") {
            Some(v) => v.parse().with_context(|| format!("invalid SESSION_TTL_MINS '{v}'"))?,
            None => DEFAULT_SESSION_TTL_MINS,
        };
        anyhow::ensure!(session_ttl_mins > 0, "SESSION_TTL_MINS must be at least 1");

        Ok(Self {
            port,
            api_base: get("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            language,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            session_ttl: Duration::from_secs(session_ttl_mins * 60),
        })
    }
}
