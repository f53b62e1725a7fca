use crate::core::Hook;
use crate::core::context::InvocationContext;
use crate::core::fault::Fault;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Defines the behavior of an asynchronous interceptor.
///
/// Same lifecycle as [`Interceptor`](crate::core::sync_impl::interceptor::Interceptor),
/// but each hook is awaited. A hook future that is already complete when
/// first polled lets the walk continue on the calling stack; otherwise the
/// call suspends and the rest of the chain runs when the caller awaits the
/// returned [`Reply`](crate::core::invoker::Reply).
#[async_trait]
pub trait AsyncInterceptor: Send + Sync + 'static {
    /// Stable, unique name. Also the key of the interceptor's context slot.
    fn name(&self) -> &str;

    /// Whether this interceptor takes part in the current phase.
    fn can_process(&self, _ctx: &InvocationContext) -> bool {
        true
    }

    /// Called once per call while the chain is being located (async).
    async fn init(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }

    /// Called on the way in, before the target runs (async).
    async fn handle_request(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }

    /// Called on the way out when the target produced a result (async).
    async fn handle_response(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }

    /// Called on the way out when the call faulted (async).
    ///
    /// A rejection here is logged and otherwise ignored.
    async fn handle_fault(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }
}

pub(crate) fn dispatch(
    interceptor: Arc<dyn AsyncInterceptor>,
    hook: Hook,
    ctx: InvocationContext,
) -> BoxFuture<'static, Result<(), Fault>> {
    Box::pin(async move {
        match hook {
            Hook::Init => interceptor.init(&ctx).await,
            Hook::Request => interceptor.handle_request(&ctx).await,
            Hook::Response => interceptor.handle_response(&ctx).await,
            Hook::Fault => interceptor.handle_fault(&ctx).await,
        }
    })
}
