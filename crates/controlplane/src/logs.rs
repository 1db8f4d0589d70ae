//! `StreamLogs` — a broadcast tail of the control plane's own operational
//! log lines. Unlike the `Watch*` family this is a pure forward stream: a
//! new subscriber does not get history, only what's emitted from then on.
//!
//! Every emitted record is also forwarded to `tracing`, so the same line
//! lands in whatever subscriber the embedding process wires up (matching
//! the teacher's habit of logging through `tracing` at every significant
//! state change) in addition to being available over this facade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const LOG_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub at: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

pub struct LogBroadcaster {
    tx: broadcast::Sender<LogRecord>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, level: LogLevel, target: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!(target = target, "{message}"),
            LogLevel::Warn => tracing::warn!(target = target, "{message}"),
            LogLevel::Info => tracing::info!(target = target, "{message}"),
            LogLevel::Debug => tracing::debug!(target = target, "{message}"),
        }
        let record = LogRecord {
            at: Utc::now(),
            level: level.as_str().to_string(),
            target: target.to_string(),
            message,
        };
        // Zero receivers is the normal state until a client calls StreamLogs.
        let _ = self.tx.send(record);
    }

    pub fn stream(&self) -> impl futures_core::Stream<Item = LogRecord> {
        let mut rx = self.tx.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(record) => yield record,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn subscriber_sees_records_emitted_after_subscribing() {
        let broadcaster = LogBroadcaster::new();
        let mut stream = Box::pin(broadcaster.stream());
        broadcaster.emit(LogLevel::Info, "bootstrap", "starting up");
        let record = stream.next().await.unwrap();
        assert_eq!(record.level, "info");
        assert_eq!(record.message, "starting up");
    }
}
