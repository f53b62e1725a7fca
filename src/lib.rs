//! # Tollgate
//!
//! An interceptor pipeline for Rust: wrap any operation with an ordered set of
//! cross-cutting handlers (logging, auth, retries, telemetry) without the
//! operation's author or its caller writing any of that logic.
//!
//! ## Features
//!
//! - **One Lifecycle, Four Completion Styles**: a target may return directly,
//!   call its completion callback before returning, return a future, or park
//!   and complete through its callback later. Interceptors always see one
//!   `init` / `handle_request` / `handle_response` / `handle_fault` lifecycle.
//! - **Sync & Async Interceptors**: full support for both; asynchronous
//!   interceptors are rejected on synchronous operations when the chain is built.
//! - **Reentrant by Construction**: singleton interceptors correlate per-call
//!   state through context slots, so nested and recursive calls pair up.
//! - **Faults, Not Panics**: every failure is a [`Fault`] routed backward
//!   through `handle_fault`; configuration mistakes surface as [`ConfigError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tollgate::prelude::*;
//! use std::sync::Arc;
//!
//! struct Audit;
//!
//! impl Interceptor for Audit {
//!     fn name(&self) -> &str {
//!         "audit"
//!     }
//!
//!     fn handle_request(&self, ctx: &InvocationContext) -> Result<(), Fault> {
//!         ctx.set_slot(self.name(), JsonValue::from("seen"));
//!         Ok(())
//!     }
//! }
//!
//! let registry = Arc::new(InterceptorRegistry::new());
//! registry.register(InterceptorMetadata::new("audit", InteractionStyle::Sync));
//!
//! let price = Endpoint::new(
//!     OperationMetadata::new("StockService", "getPrice").intercept(Audit),
//!     registry,
//!     |_ctx: &InvocationContext| -> Result<Returned, JsonValue> { Ok(JsonValue::from(100).into()) },
//! );
//!
//! let reply = price.call(vec![JsonValue::from("IBM").into()]).unwrap();
//! assert_eq!(reply.ready(), Some(Ok(JsonValue::from(100))));
//! ```
//!
//! ## Module Organization
//!
//! - [`prelude`]: Commonly used types and traits (import with `use tollgate::prelude::*`)
//! - [`sync_prelude`]: Only synchronous interceptor types
//! - [`async_prelude`]: Only asynchronous interceptor types

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Core types
pub use crate::core::context::{
    Argument, CompletionStyle, InteractionType, InvocationContext, ProcessStatus,
};
pub use crate::core::error::{ChainError, ConfigError, ResumeError};
pub use crate::core::fault::{
    E_ABANDONED, E_CALLBACK_FAULT, E_HOOK_FAILED, E_TARGET_FAILED, E_TARGET_REINVOKED, Fault,
};
pub use crate::core::metadata::{
    InteractionStyle, InterceptorBinding, InterceptorFactory, InterceptorMetadata,
    OperationMetadata,
};
pub use crate::core::registry::InterceptorRegistry;
pub use crate::core::target::{Returned, Target};
pub use crate::core::validation::{ValidationIssue, ValidationResult};
pub use crate::core::{Hook, InterceptorInstance, Value};

// Pipeline
pub use crate::core::callback::Callback;
pub use crate::core::chain::{
    HEADER_NAME, HeaderProcessor, InterceptorProcessor, Processor, ProcessorChain,
    RESUMPTION_NAME, ResumptionProcessor, TAIL_NAME, TailProcessor,
};
pub use crate::core::endpoint::{Component, Endpoint};
pub use crate::core::invoker::{EndpointInvoker, ParkedCall, Reply, Resumed};

// Synchronous implementations
pub use crate::core::sync_impl::interceptor::Interceptor;

// Asynchronous implementations
pub use crate::core::async_impl::async_interceptor::AsyncInterceptor;

// Built-in interceptors
pub use crate::core::logging::LoggingInterceptor;
pub use crate::core::telemetry::{MemoryTelemetry, Telemetry, TelemetryInterceptor, TraceEntry};

/// Telemetry helpers.
pub mod telemetry {
    pub use crate::core::telemetry::to_json;
}

// ============================================================================
// Prelude Modules - Convenient Bulk Imports
// ============================================================================

/// The main prelude: imports everything you need for both sync and async interceptors.
///
/// # Example
/// ```rust
/// use tollgate::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        Argument,
        // Async
        AsyncInterceptor,
        Callback,
        CompletionStyle,
        Component,
        ConfigError,
        Endpoint,
        EndpointInvoker,
        Fault,
        // Sync
        Interceptor,
        InterceptorBinding,
        InterceptorInstance,
        InterceptorMetadata,
        InterceptorRegistry,
        InteractionStyle,
        InteractionType,
        InvocationContext,
        JsonValue,
        OperationMetadata,
        Reply,
        Resumed,
        Returned,
        Target,
    };
}

/// Prelude for synchronous-only pipelines.
///
/// # Example
/// ```rust
/// use tollgate::sync_prelude::*;
/// ```
pub mod sync_prelude {
    pub use super::{
        Argument, Callback, Endpoint, Fault, Interceptor, InterceptorMetadata,
        InterceptorRegistry, InteractionStyle, InvocationContext, JsonValue, OperationMetadata,
        Reply, Returned,
    };
}

/// Prelude for asynchronous pipelines.
///
/// # Example
/// ```rust
/// use tollgate::async_prelude::*;
/// ```
pub mod async_prelude {
    pub use super::{
        Argument, AsyncInterceptor, Callback, Endpoint, Fault, InterceptorInstance,
        InterceptorMetadata, InterceptorRegistry, InteractionStyle, InvocationContext, JsonValue,
        OperationMetadata, Reply, Resumed, Returned,
    };
}

// ============================================================================
// Re-export commonly used external types for convenience
// ============================================================================

pub use serde_json::Value as JsonValue;

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
