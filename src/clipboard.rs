use std::sync::Arc;

use anyhow::{anyhow, Result};
use arboard::Clipboard;

pub const COPY_FAILED_MESSAGE: &str = "Failed to copy to clipboard.";

/// Writes text to the system clipboard.
pub trait ClipboardProvider: Send + Sync {
    fn set_text(&self, text: &str) -> Result<()>;
}

/// System clipboard via arboard. A new handle is opened per write so a
/// missing display only fails the write, not the session.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    /// On Linux the writing process owns the selection. A write then blocks,
    /// serving the content until another application replaces it, so the
    /// copy outlives a short-lived process.
    pub fn holds_selection(&self) -> bool {
        cfg!(target_os = "linux")
    }
}

impl ClipboardProvider for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        let mut clipboard = Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {e}"))?;

        #[cfg(target_os = "linux")]
        {
            use arboard::SetExtLinux;
            clipboard
                .set()
                .wait()
                .text(text.to_string())
                .map_err(|e| anyhow!("Failed to set clipboard: {e}"))?;
        }

        #[cfg(not(target_os = "linux"))]
        clipboard
            .set_text(text.to_string())
            .map_err(|e| anyhow!("Failed to set clipboard: {e}"))?;

        Ok(())
    }
}

/// User-facing result of a clipboard operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Failure(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(m) | Notice::Failure(m) => m,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success(_))
    }
}

/// Copy `content` off the async runtime and report how it went.
/// No retry on failure.
pub async fn copy_to_clipboard(
    clipboard: Arc<dyn ClipboardProvider>,
    content: String,
    success_message: &str,
) -> Notice {
    let result = tokio::task::spawn_blocking(move || clipboard.set_text(&content)).await;
    match result {
        Ok(Ok(())) => Notice::Success(success_message.to_string()),
        Ok(Err(e)) => {
            tracing::error!("Failed to copy: {e:#}");
            Notice::Failure(COPY_FAILED_MESSAGE.to_string())
        }
        Err(e) => {
            tracing::error!("Clipboard task failed: {e}");
            Notice::Failure(COPY_FAILED_MESSAGE.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClipboard;

    #[tokio::test]
    async fn success_carries_caller_message() {
        let clipboard = Arc::new(MockClipboard::default());
        let notice = copy_to_clipboard(clipboard.clone(), "# Doc".into(), "Copied!").await;
        assert_eq!(notice, Notice::Success("Copied!".into()));
        assert_eq!(clipboard.last().as_deref(), Some("# Doc"));
    }

    #[tokio::test]
    async fn failure_has_distinct_message() {
        let clipboard = Arc::new(MockClipboard::failing());
        let notice = copy_to_clipboard(clipboard, "# Doc".into(), "Copied!").await;
        assert!(!notice.is_success());
        assert_eq!(notice.message(), COPY_FAILED_MESSAGE);
    }

    #[test]
    fn system_clipboard_holds_selection_only_on_linux() {
        assert_eq!(SystemClipboard.holds_selection(), cfg!(target_os = "linux"));
    }
}
