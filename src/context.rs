use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clipboard::ClipboardProvider;
use crate::store::KvBackend;

/// Source of "now". Injected so tests control note ids and dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time in Unix milliseconds. Note and thread ids are built from this.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything a session needs from the outside world.
#[derive(Clone)]
pub struct Context {
    pub backend: Arc<dyn KvBackend>,
    pub clock: Arc<dyn Clock>,
    pub clipboard: Arc<dyn ClipboardProvider>,
    /// Stamped into `meta.version` of new notes and into the threads config.
    pub app_version: String,
}

impl Context {
    pub fn new(backend: Arc<dyn KvBackend>, clipboard: Arc<dyn ClipboardProvider>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            clipboard,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
