use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{runtime::Handle, task::AbortHandle, time::Instant};
use tracing::warn;

use crate::models::{Notice, NoticeKind};

pub const NOTICE_DURATION: Duration = Duration::from_secs(5);

#[derive(Default)]
struct NotifierState {
    current: Option<Notice>,
    pending_hide: Option<AbortHandle>,
    seq: u64,
}

/// Transient message slot. Only the newest notice's hide timer is live.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<Mutex<NotifierState>>,
}

impl Notifier {
    pub fn notify(&self, message: impl Into<String>, kind: NoticeKind) {
        let mut state = self.inner.lock();
        state.seq += 1;
        let seq = state.seq;
        state.current = Some(Notice { message: message.into(), kind });
        if let Some(previous) = state.pending_hide.take() {
            previous.abort();
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available, notice will stay visible");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let deadline = Instant::now() + NOTICE_DURATION;
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut state = inner.lock();
            // a newer notice may have landed while this task waited for the lock
            if state.seq == seq {
                state.current = None;
                state.pending_hide = None;
            }
        });
        state.pending_hide = Some(task.abort_handle());
    }

    pub fn current(&self) -> Option<Notice> {
        self.inner.lock().current.clone()
    }
}
