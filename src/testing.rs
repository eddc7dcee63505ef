//! Fakes shared by the unit tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::clipboard::ClipboardProvider;
use crate::context::{Clock, Context};
use crate::store::{KvBackend, MemoryBackend};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct MockClipboard {
    pub writes: Mutex<Vec<String>>,
    pub fail: bool,
}

impl MockClipboard {
    pub fn failing() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn last(&self) -> Option<String> {
        self.writes.lock().unwrap().last().cloned()
    }
}

impl ClipboardProvider for MockClipboard {
    fn set_text(&self, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("no display");
        }
        self.writes.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

pub fn context_on(
    backend: Arc<dyn KvBackend>,
    clock: Arc<ManualClock>,
    clipboard: Arc<MockClipboard>,
) -> Context {
    Context {
        backend,
        clock,
        clipboard,
        app_version: "9.9.9".to_string(),
    }
}

pub fn test_context() -> (Context, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at(start_time()));
    let ctx = context_on(
        Arc::new(MemoryBackend::new()),
        clock.clone(),
        Arc::new(MockClipboard::default()),
    );
    (ctx, clock)
}

pub fn test_context_with_clipboard() -> (Context, Arc<ManualClock>, Arc<MockClipboard>) {
    let clock = Arc::new(ManualClock::at(start_time()));
    let clipboard = Arc::new(MockClipboard::default());
    let ctx = context_on(Arc::new(MemoryBackend::new()), clock.clone(), clipboard.clone());
    (ctx, clock, clipboard)
}
