//! Cache-invalidation collaborator.
//!
//! The host application caches rendered templates and stylesheets. After every
//! import that changes a row the importer emits a [`CacheEvent`]; how the host
//! is told is up to the [`CacheSignal`] implementation. Delivery is
//! fire-and-forget: failures are logged by the importer and never fail the
//! import.

use serde::Serialize;
use tokio::sync::mpsc;

use themesync_core::ContentKind;

use crate::error::SignalError;

/// A single "this item changed" notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEvent {
    pub kind: ContentKind,
    pub set_name: String,
    pub item_name: String,
}

pub trait CacheSignal: Send + Sync {
    fn notify(&self, event: &CacheEvent) -> Result<(), SignalError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSignal;

impl CacheSignal for NoopSignal {
    fn notify(&self, _event: &CacheEvent) -> Result<(), SignalError> {
        Ok(())
    }
}

/// Records each event in the log. The token is held for the host's refresh
/// hook and never written out.
#[derive(Clone, Default)]
pub struct LogSignal {
    token: Option<String>,
}

impl LogSignal {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl std::fmt::Debug for LogSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSignal")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CacheSignal for LogSignal {
    fn notify(&self, event: &CacheEvent) -> Result<(), SignalError> {
        tracing::info!(
            kind = %event.kind,
            set = %event.set_name,
            item = %event.item_name,
            authenticated = self.token.is_some(),
            "cache invalidation requested",
        );
        Ok(())
    }
}

/// Forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSignal {
    tx: mpsc::UnboundedSender<CacheEvent>,
}

impl ChannelSignal {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CacheEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CacheSignal for ChannelSignal {
    fn notify(&self, event: &CacheEvent) -> Result<(), SignalError> {
        self.tx.send(event.clone()).map_err(|_| SignalError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> CacheEvent {
        CacheEvent {
            kind: ContentKind::Template,
            set_name: "Dark".to_string(),
            item_name: "header".to_string(),
        }
    }

    #[test]
    fn channel_signal_delivers_and_reports_closed() {
        let (signal, mut rx) = ChannelSignal::channel();
        signal.notify(&event()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), event());

        drop(rx);
        assert!(matches!(signal.notify(&event()), Err(SignalError::Closed)));
    }

    #[test]
    fn log_signal_debug_hides_token() {
        let signal = LogSignal::new(Some("s3cret".to_string()));
        assert!(!format!("{signal:?}").contains("s3cret"));
        assert!(signal.notify(&event()).is_ok());
    }
}
