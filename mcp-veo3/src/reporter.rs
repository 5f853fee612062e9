//! Request-scoped progress reporting.
//!
//! Pipeline components report through the narrow [`ProgressReporter`]
//! capability and never see the MCP session. Reporting is best effort: a
//! failed notification is logged and the request carries on.

use std::sync::Mutex;

use async_trait::async_trait;
use rmcp::model::{LoggingLevel, LoggingMessageNotificationParam, ProgressNotificationParam, ProgressToken};
use rmcp::service::{Peer, RoleServer};
use tracing::{debug, error, info};

/// Logger name attached to MCP log notifications.
pub const LOGGER_NAME: &str = "mcp-veo3";

/// Sink for progress of a single generation request.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Informational message for the caller.
    async fn notify_info(&self, message: &str);

    /// Error message for the caller.
    async fn notify_error(&self, message: &str);

    /// Numeric progress; `total` is `None` when unknown.
    async fn notify_progress(&self, progress: u32, total: Option<u32>, message: &str);
}

/// Reporter that only writes to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl ProgressReporter for TracingReporter {
    async fn notify_info(&self, message: &str) {
        info!(target: "mcp_veo3::progress", "{}", message);
    }

    async fn notify_error(&self, message: &str) {
        error!(target: "mcp_veo3::progress", "{}", message);
    }

    async fn notify_progress(&self, progress: u32, total: Option<u32>, message: &str) {
        debug!(target: "mcp_veo3::progress", progress, total, "{}", message);
    }
}

/// Reporter that forwards to the connected MCP client.
///
/// Messages become `notifications/message`; numeric progress becomes
/// `notifications/progress` when the client sent a progress token with the
/// request, and is otherwise only logged.
/// Every notification is also written locally through [`TracingReporter`].
pub struct McpReporter {
    peer: Peer<RoleServer>,
    progress_token: Option<ProgressToken>,
    local: TracingReporter,
}

impl McpReporter {
    pub fn new(peer: Peer<RoleServer>, progress_token: Option<ProgressToken>) -> Self {
        Self {
            peer,
            progress_token,
            local: TracingReporter,
        }
    }

    async fn log(&self, level: LoggingLevel, message: &str) {
        let param = LoggingMessageNotificationParam {
            level,
            logger: Some(LOGGER_NAME.to_string()),
            data: serde_json::Value::String(message.to_string()),
        };
        if let Err(e) = self.peer.notify_logging_message(param).await {
            debug!(error = %e, "Failed to send log notification");
        }
    }
}

#[async_trait]
impl ProgressReporter for McpReporter {
    async fn notify_info(&self, message: &str) {
        self.local.notify_info(message).await;
        self.log(LoggingLevel::Info, message).await;
    }

    async fn notify_error(&self, message: &str) {
        self.local.notify_error(message).await;
        self.log(LoggingLevel::Error, message).await;
    }

    async fn notify_progress(&self, progress: u32, total: Option<u32>, message: &str) {
        self.local.notify_progress(progress, total, message).await;
        let Some(token) = self.progress_token.clone() else {
            return;
        };
        let param = ProgressNotificationParam {
            progress_token: token,
            progress: f64::from(progress),
            total: total.map(f64::from),
            message: Some(message.to_string()),
        };
        if let Err(e) = self.peer.notify_progress(param).await {
            debug!(error = %e, "Failed to send progress notification");
        }
    }
}

/// One captured notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Info(String),
    Error(String),
    Progress { progress: u32, total: Option<u32> },
}

/// Reporter that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the notifications received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Info(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn notify_info(&self, message: &str) {
        self.push(ProgressEvent::Info(message.to_string()));
    }

    async fn notify_error(&self, message: &str) {
        self.push(ProgressEvent::Error(message.to_string()));
    }

    async fn notify_progress(&self, progress: u32, total: Option<u32>, _message: &str) {
        self.push(ProgressEvent::Progress { progress, total });
    }
}
