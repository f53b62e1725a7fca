use crate::core::Hook;
use crate::core::context::InvocationContext;
use crate::core::fault::Fault;

/// Defines the behavior of a synchronous interceptor.
///
/// Every hook has a default that lets the call through, so an interceptor
/// only overrides the phases it cares about. Returning `Err` from
/// [`init`](Interceptor::init), [`handle_request`](Interceptor::handle_request)
/// or [`handle_response`](Interceptor::handle_response) turns the call into a
/// fault: from then on the chain walks backward calling
/// [`handle_fault`](Interceptor::handle_fault).
///
/// A singleton interceptor is shared by every call in flight, including
/// calls nested inside each other. State that has to survive from the
/// request phase to the response phase of the *same* call belongs in the
/// context slots ([`InvocationContext::set_slot`]), not in fields.
pub trait Interceptor: Send + Sync + 'static {
    /// Stable, unique name. Also the key of the interceptor's context slot.
    fn name(&self) -> &str;

    /// Whether this interceptor takes part in the current phase.
    ///
    /// Must be free of side effects: it is re-evaluated on every phase and a
    /// `false` only skips the hook, traversal always moves on.
    fn can_process(&self, _ctx: &InvocationContext) -> bool {
        true
    }

    /// Called once per call while the chain is being located.
    fn init(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }

    /// Called on the way in, before the target runs.
    fn handle_request(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }

    /// Called on the way out when the target produced a result.
    fn handle_response(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }

    /// Called on the way out when the call faulted.
    ///
    /// An error returned here is logged and otherwise ignored.
    fn handle_fault(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        Ok(())
    }
}

pub(crate) fn dispatch(
    interceptor: &dyn Interceptor,
    hook: Hook,
    ctx: &InvocationContext,
) -> Result<(), Fault> {
    match hook {
        Hook::Init => interceptor.init(ctx),
        Hook::Request => interceptor.handle_request(ctx),
        Hook::Response => interceptor.handle_response(ctx),
        Hook::Fault => interceptor.handle_fault(ctx),
    }
}
