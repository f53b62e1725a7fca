pub mod async_impl;
pub mod callback;
pub mod chain;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod fault;
pub mod invoker;
pub mod logging;
pub mod metadata;
pub mod registry;
pub mod sync_impl;
pub mod target;
pub mod telemetry;
pub mod validation;

use async_impl::async_interceptor::AsyncInterceptor;
use context::{InteractionType, InvocationContext};
use fault::Fault;
use futures::future::BoxFuture;
use metadata::InteractionStyle;
use std::fmt;
use std::sync::Arc;
use sync_impl::interceptor::Interceptor;

/// The Alias for serde_json::Value, used for arguments, results and fault details.
pub type Value = serde_json::Value;

/// The lifecycle hook an interceptor is asked to run in a given phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Init,
    Request,
    Response,
    Fault,
}

impl Hook {
    /// The hook that runs for `phase`. `LOCATE_RESULT` runs none.
    pub fn for_phase(phase: InteractionType) -> Option<Hook> {
        match phase {
            InteractionType::Locate => Some(Hook::Init),
            InteractionType::LocateResult => None,
            InteractionType::Invoke => Some(Hook::Request),
            InteractionType::InvokeResult => Some(Hook::Response),
            InteractionType::InvokeFault => Some(Hook::Fault),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Init => "init",
            Hook::Request => "handleRequest",
            Hook::Response => "handleResponse",
            Hook::Fault => "handleFault",
        }
    }
}

/// Result of dispatching a hook: done on the spot, or still running.
pub(crate) enum HookRun {
    Ready(Result<(), Fault>),
    Pending(BoxFuture<'static, Result<(), Fault>>),
}

/// The General Interceptor Enum
///
/// An interceptor instance is either synchronous or asynchronous; the
/// variant must agree with the interaction style its type was registered with.
#[derive(Clone)]
pub enum InterceptorInstance {
    Sync(Arc<dyn Interceptor>),
    Async(Arc<dyn AsyncInterceptor>),
}

impl InterceptorInstance {
    /// Wraps an asynchronous interceptor.
    pub fn asynchronous<I: AsyncInterceptor>(interceptor: I) -> Self {
        InterceptorInstance::Async(Arc::new(interceptor))
    }

    pub fn name(&self) -> &str {
        match self {
            InterceptorInstance::Sync(i) => i.name(),
            InterceptorInstance::Async(i) => i.name(),
        }
    }

    /// The interaction style implied by the variant.
    pub fn style(&self) -> InteractionStyle {
        match self {
            InterceptorInstance::Sync(_) => InteractionStyle::Sync,
            InterceptorInstance::Async(_) => InteractionStyle::Async,
        }
    }

    pub fn can_process(&self, ctx: &InvocationContext) -> bool {
        match self {
            InterceptorInstance::Sync(i) => i.can_process(ctx),
            InterceptorInstance::Async(i) => i.can_process(ctx),
        }
    }

    pub(crate) fn dispatch(&self, hook: Hook, ctx: &InvocationContext) -> HookRun {
        match self {
            InterceptorInstance::Sync(i) => HookRun::Ready(sync_impl::interceptor::dispatch(
                i.as_ref(),
                hook,
                ctx,
            )),
            InterceptorInstance::Async(i) => {
                HookRun::Pending(async_impl::async_interceptor::dispatch(i.clone(), hook, ctx.clone()))
            }
        }
    }
}

impl<I: Interceptor> From<I> for InterceptorInstance {
    fn from(interceptor: I) -> Self {
        InterceptorInstance::Sync(Arc::new(interceptor))
    }
}

impl fmt::Debug for InterceptorInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorInstance")
            .field("name", &self.name())
            .field("style", &self.style())
            .finish()
    }
}
