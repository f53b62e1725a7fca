use crate::core::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A hook or the target reported an error.
pub const E_HOOK_FAILED: &str = "E_HOOK_FAILED";
/// The target raised an error or rejected its future.
pub const E_TARGET_FAILED: &str = "E_TARGET_FAILED";
/// The target reported a fault through its completion callback.
pub const E_CALLBACK_FAULT: &str = "E_CALLBACK_FAULT";
/// The Tail was asked to run a target that already ran for this context.
pub const E_TARGET_REINVOKED: &str = "E_TARGET_REINVOKED";
/// A deferred call was dropped before its callback was ever completed.
pub const E_ABANDONED: &str = "E_ABANDONED";

/// The normalized error value that travels backward through a chain.
///
/// A fault either comes from the pipeline itself (an interceptor hook failed)
/// or from the application logic behind the target, in which case
/// [`Fault::is_biz_fault`] is `true`. Both kinds are routed through
/// `handle_fault` the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{}", self.describe())]
pub struct Fault {
    /// Name of the processor (or target) that raised the fault.
    pub thrown_by: Option<String>,
    pub error_code: Option<String>,
    pub reason: Option<String>,
    /// The underlying error object, handed back to the caller.
    pub details: Value,
    #[serde(rename = "isBizFault")]
    pub biz: bool,
}

impl Fault {
    pub fn new(
        thrown_by: Option<String>,
        error_code: Option<String>,
        reason: Option<String>,
        details: Value,
    ) -> Self {
        Self {
            thrown_by,
            error_code,
            reason,
            details,
            biz: false,
        }
    }

    /// A runtime fault with a reason and no details.
    pub fn runtime(error_code: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            None,
            Some(error_code.to_string()),
            Some(reason.clone()),
            Value::String(reason),
        )
    }

    /// A fault raised by the application logic behind the target.
    ///
    /// The reason is lifted from `details` when it is a string or an object
    /// with a `message`/`reason` field.
    pub fn business(error_code: &str, details: Value) -> Self {
        let reason = match &details {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("message")
                .or_else(|| map.get("reason"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        };
        Self {
            thrown_by: None,
            error_code: Some(error_code.to_string()),
            reason,
            details,
            biz: true,
        }
    }

    /// Fills `thrown_by` when the raiser did not name itself.
    pub fn thrown_by_default(mut self, name: &str) -> Self {
        if self.thrown_by.is_none() {
            self.thrown_by = Some(name.to_string());
        }
        self
    }

    pub fn is_biz_fault(&self) -> bool {
        self.biz
    }

    fn describe(&self) -> String {
        let kind = if self.biz { "business fault" } else { "fault" };
        let by = self.thrown_by.as_deref().unwrap_or("unknown");
        match (&self.error_code, &self.reason) {
            (Some(code), Some(reason)) => format!("{kind} [{code}] raised by {by}: {reason}"),
            (Some(code), None) => format!("{kind} [{code}] raised by {by}"),
            (None, Some(reason)) => format!("{kind} raised by {by}: {reason}"),
            (None, None) => format!("{kind} raised by {by}: {}", self.details),
        }
    }
}

impl From<String> for Fault {
    fn from(reason: String) -> Self {
        Fault::runtime(E_HOOK_FAILED, reason)
    }
}

impl From<&str> for Fault {
    fn from(reason: &str) -> Self {
        Fault::runtime(E_HOOK_FAILED, reason)
    }
}
