use crate::core::context::InvocationContext;
use crate::core::fault::Fault;
use crate::core::sync_impl::interceptor::Interceptor;
use crate::core::{Hook, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single hook observed on a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: u64,
    pub invocation_id: String,
    pub interceptor: String,
    pub hook: String,
    pub interaction_type: Option<String>,
    pub operation: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Trait for recording hook traces.
pub trait Telemetry: Send + Sync {
    fn record(&self, entry: TraceEntry);
    fn flush(&self);
}

/// Simple in-memory collector for traces.
#[derive(Default)]
pub struct MemoryTelemetry {
    traces: Mutex<Vec<TraceEntry>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_traces(&self) -> Vec<TraceEntry> {
        self.traces.lock().clone()
    }

    /// `interceptor:hook` for every trace, in recording order.
    pub fn hooks(&self) -> Vec<String> {
        self.traces
            .lock()
            .iter()
            .map(|t| format!("{}:{}", t.interceptor, t.hook))
            .collect()
    }

    pub fn clear(&self) {
        self.traces.lock().clear();
    }
}

impl Telemetry for MemoryTelemetry {
    fn record(&self, entry: TraceEntry) {
        self.traces.lock().push(entry);
    }

    fn flush(&self) {
        // No-op for memory collector
    }
}

/// Interceptor that records every hook it sees into a [`Telemetry`] sink.
///
/// Hooks never fail. Static key/value pairs added with
/// [`TelemetryInterceptor::metadata`] are copied onto every entry.
pub struct TelemetryInterceptor {
    name: String,
    sink: Arc<dyn Telemetry>,
    metadata: HashMap<String, String>,
}

impl TelemetryInterceptor {
    pub fn new(name: impl Into<String>, sink: Arc<dyn Telemetry>) -> Self {
        Self {
            name: name.into(),
            sink,
            metadata: HashMap::new(),
        }
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn trace(&self, hook: Hook, ctx: &InvocationContext) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.sink.record(TraceEntry {
            timestamp,
            invocation_id: ctx.id().to_string(),
            interceptor: self.name.clone(),
            hook: hook.as_str().to_string(),
            interaction_type: ctx.interaction_type().map(|t| t.to_string()),
            operation: ctx.operation().map(|op| op.full_name()),
            metadata: self.metadata.clone(),
        });
    }
}

impl Interceptor for TelemetryInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        self.trace(Hook::Init, ctx);
        Ok(())
    }

    fn handle_request(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        self.trace(Hook::Request, ctx);
        Ok(())
    }

    fn handle_response(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        self.trace(Hook::Response, ctx);
        Ok(())
    }

    fn handle_fault(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        self.trace(Hook::Fault, ctx);
        self.sink.flush();
        Ok(())
    }
}

/// Serializes traces for export.
pub fn to_json(traces: &[TraceEntry]) -> Value {
    serde_json::to_value(traces).unwrap_or_else(|e| {
        log::error!("serde_json::to_value() failed to convert the traces: {}", e);
        Value::Array(Vec::new())
    })
}
