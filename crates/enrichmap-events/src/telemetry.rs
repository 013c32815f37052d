use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "enrichmap::events::telemetry";

pub const OP_APPLY_LAYOUT: &str = "ApplyLayout";
pub const OP_EXPORT_ARCHIVE: &str = "ExportArchive";
pub const OP_SAVE_POSITIONS: &str = "SavePositions";
pub const OP_BUILD_SEARCH_INDEX: &str = "BuildSearchIndex";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationLifecycle {
    Start,
    Success,
    Failure,
}

impl fmt::Display for OperationLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "operation_start"),
            Self::Success => write!(f, "operation_success"),
            Self::Failure => write!(f, "operation_failure"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTelemetry {
    pub correlation_id: String,
    pub operation: String,
    pub lifecycle: OperationLifecycle,
    pub error_reason: Option<String>,
    pub duration_ms: Option<u128>,
}

impl OperationTelemetry {
    fn new(operation: &str, correlation_id: &str, lifecycle: OperationLifecycle) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            operation: operation.to_string(),
            lifecycle,
            error_reason: None,
            duration_ms: None,
        }
    }

    fn now_unix_ms() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn operation_start(operation: &str, correlation_id: &str) -> OperationTelemetry {
    let telemetry = OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Start);
    info!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_start"
    );
    telemetry
}

pub fn operation_success(
    operation: &str,
    correlation_id: &str,
    duration_ms: Option<u128>,
) -> OperationTelemetry {
    let mut telemetry =
        OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Success);
    telemetry.duration_ms = duration_ms;
    info!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        duration_ms = ?telemetry.duration_ms,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_success"
    );
    telemetry
}

pub fn operation_failure(
    operation: &str,
    correlation_id: &str,
    reason: Option<String>,
) -> OperationTelemetry {
    let mut telemetry =
        OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Failure);
    telemetry.error_reason = reason;
    let error_reason = telemetry.error_reason.as_deref().unwrap_or("unclassified");

    error!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        error = %error_reason,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_failure"
    );

    telemetry
}

pub fn debug_context(operation: &str, correlation_id: &str, context: &str) {
    debug!(
        target: TELEMETRY_TARGET,
        operation = %operation,
        correlation_id = %correlation_id,
        context = %context,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_context"
    );
}

/// Start/finish pair for one operation; logs the start on creation.
pub struct OperationSpan {
    operation: &'static str,
    correlation_id: String,
    started: Instant,
}

impl OperationSpan {
    pub fn start(operation: &'static str) -> Self {
        let correlation_id = new_correlation_id();
        operation_start(operation, &correlation_id);
        Self {
            operation,
            correlation_id,
            started: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn context(&self, context: &str) {
        debug_context(self.operation, &self.correlation_id, context);
    }

    /// Logs success or failure depending on `result` and hands it back.
    pub fn finish<T, E: fmt::Display>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => {
                operation_success(
                    self.operation,
                    &self.correlation_id,
                    Some(self.started.elapsed().as_millis()),
                );
            }
            Err(err) => {
                operation_failure(self.operation, &self.correlation_id, Some(err.to_string()));
            }
        }
        result
    }
}
