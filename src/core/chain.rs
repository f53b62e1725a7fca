//! The processor chain: a Header, the bound interceptors in binding order,
//! and a Tail that owns the target.
//!
//! Processors live in an arena and are linked by position in both
//! directions. Once assembled the chain is frozen and every relink fails.

use crate::core::context::{CompletionStyle, InteractionType, InvocationContext, ProcessStatus};
use crate::core::error::ChainError;
use crate::core::fault::{E_TARGET_FAILED, E_TARGET_REINVOKED, Fault};
use crate::core::metadata::OperationMetadata;
use crate::core::target::{Returned, Target};
use crate::core::{Hook, HookRun, InterceptorInstance};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};

pub const HEADER_NAME: &str = "system:internal:header";
pub const TAIL_NAME: &str = "system:internal:tail";
pub const RESUMPTION_NAME: &str = "system:internal:resumption";

/// What a processor asks the driver to do after it ran.
pub(crate) enum Step {
    /// Move towards the Tail.
    Next,
    /// Move towards the Header.
    Previous,
    /// Run the same processor again; the phase changed.
    Stay,
    /// Suspend until the future yields the step to take.
    Await(BoxFuture<'static, Step>),
    /// The target will complete through its callback later. Carries the
    /// future the target returned alongside, if it is not done yet.
    Park(Option<BoxFuture<'static, ()>>),
    /// The backward walk already ran, inside the target's callback.
    Settled,
    /// The Header reported the terminal status.
    Done(ProcessStatus),
}

/// A node of the chain.
pub enum Processor {
    Header(HeaderProcessor),
    Interceptor(InterceptorProcessor),
    Tail(TailProcessor),
    Resumption(ResumptionProcessor),
}

impl Processor {
    pub fn name(&self) -> &str {
        match self {
            Processor::Header(_) => HEADER_NAME,
            Processor::Interceptor(p) => p.instance.name(),
            Processor::Tail(_) => TAIL_NAME,
            Processor::Resumption(_) => RESUMPTION_NAME,
        }
    }

    pub(crate) fn process(&self, ctx: &InvocationContext) -> Step {
        match self {
            Processor::Header(p) => p.process(ctx),
            Processor::Interceptor(p) => p.process(ctx),
            Processor::Tail(p) => p.process(ctx),
            Processor::Resumption(p) => p.process(ctx),
        }
    }
}

// The Header attaches the interaction before any other processor runs.
fn phase_of(ctx: &InvocationContext) -> InteractionType {
    ctx.interaction_type().unwrap_or(InteractionType::Locate)
}

/// First processor. Starts the call, turns `LOCATE_RESULT` into `INVOKE`
/// and reports the terminal status.
pub struct HeaderProcessor {
    operation: Arc<OperationMetadata>,
}

impl HeaderProcessor {
    fn process(&self, ctx: &InvocationContext) -> Step {
        if ctx.begin(&self.operation) {
            log::debug!("[{}] [header] start {}", ctx.id(), self.operation.full_name());
        }
        let phase = phase_of(ctx);
        log::debug!("[{}] [header] {}", ctx.id(), phase);
        match phase {
            InteractionType::Locate | InteractionType::Invoke => Step::Next,
            InteractionType::LocateResult => {
                ctx.set_interaction_type(InteractionType::Invoke);
                Step::Stay
            }
            InteractionType::InvokeResult | InteractionType::InvokeFault => {
                Step::Done(ctx.finish(phase))
            }
        }
    }
}

/// Wraps one bound interceptor.
pub struct InterceptorProcessor {
    instance: InterceptorInstance,
}

impl InterceptorProcessor {
    pub fn instance(&self) -> &InterceptorInstance {
        &self.instance
    }

    fn process(&self, ctx: &InvocationContext) -> Step {
        let phase = phase_of(ctx);
        let name = self.instance.name();
        log::debug!("[{}] [{}] {}", ctx.id(), name, phase);

        if !self.instance.can_process(ctx) {
            return if phase.is_forward() {
                Step::Next
            } else {
                Step::Previous
            };
        }

        let Some(hook) = Hook::for_phase(phase) else {
            return Step::Previous;
        };

        match self.instance.dispatch(hook, ctx) {
            HookRun::Ready(result) => conclude(name, hook, result, ctx),
            HookRun::Pending(future) => match poll_once(future) {
                Ok(result) => conclude(name, hook, result, ctx),
                Err(future) => {
                    log::debug!("[{}] [{}] {} suspended", ctx.id(), name, hook.as_str());
                    let name = name.to_string();
                    let ctx = ctx.clone();
                    Step::Await(Box::pin(async move {
                        let result = future.await;
                        conclude(&name, hook, result, &ctx)
                    }))
                }
            },
        }
    }
}

/// Decides where to go once a hook has finished.
fn conclude(name: &str, hook: Hook, result: Result<(), Fault>, ctx: &InvocationContext) -> Step {
    match (hook, result) {
        (Hook::Init | Hook::Request, Ok(())) => Step::Next,
        (Hook::Response | Hook::Fault, Ok(())) => Step::Previous,
        (Hook::Fault, Err(fault)) => {
            log::error!(
                "[{}] [{}] handleFault failed, continuing backward: {}",
                ctx.id(),
                name,
                fault
            );
            Step::Previous
        }
        (_, Err(fault)) => {
            log::debug!("[{}] [{}] {} failed: {}", ctx.id(), name, hook.as_str(), fault);
            ctx.switch_to_fault(fault.thrown_by_default(name));
            Step::Stay
        }
    }
}

/// Polls a future once, handing it back if it is not done yet.
fn poll_once<T>(mut future: BoxFuture<'static, T>) -> Result<T, BoxFuture<'static, T>> {
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(value) => Ok(value),
        Poll::Pending => Err(future),
    }
}

/// Last processor. Invokes the target and detects how it completes.
pub struct TailProcessor {
    target: Arc<dyn Target>,
}

impl TailProcessor {
    fn process(&self, ctx: &InvocationContext) -> Step {
        let phase = phase_of(ctx);
        log::debug!("[{}] [tail] {}", ctx.id(), phase);
        match phase {
            InteractionType::Locate => {
                ctx.set_interaction_type(InteractionType::LocateResult);
                Step::Stay
            }
            InteractionType::LocateResult
            | InteractionType::InvokeResult
            | InteractionType::InvokeFault => Step::Previous,
            InteractionType::Invoke => self.invoke(ctx),
        }
    }

    fn invoke(&self, ctx: &InvocationContext) -> Step {
        if !ctx.mark_target_invoked() {
            ctx.switch_to_fault(
                Fault::runtime(E_TARGET_REINVOKED, "target already invoked for this call")
                    .thrown_by_default(TAIL_NAME),
            );
            return Step::Stay;
        }
        ctx.hold_continuation();

        let returned = self.target.call(ctx);

        if ctx.interaction_type().is_some_and(|p| p.is_settled()) {
            // The completion already recorded its style.
            log::debug!("[{}] [tail] sync callback mode", ctx.id());
            if let Err(details) = returned {
                log::warn!(
                    "[{}] [tail] target raised after completing its callback, ignored: {}",
                    ctx.id(),
                    details
                );
            }
            return Step::Settled;
        }

        match returned {
            Err(details) => {
                log::debug!("[{}] [tail] sync mode, target raised", ctx.id());
                ctx.set_completion_style(CompletionStyle::SyncDirect);
                ctx.switch_to_fault(
                    Fault::business(E_TARGET_FAILED, details).thrown_by_default(TAIL_NAME),
                );
                Step::Stay
            }
            Ok(returned) if ctx.callback_supported() => {
                log::debug!("[{}] [tail] async callback mode", ctx.id());
                ctx.set_completion_style(CompletionStyle::AsyncCallback);
                let Returned::Future(future) = returned else {
                    return Step::Park(None);
                };
                // Only the callback completes the call; the future still runs.
                let id = ctx.id();
                let detached: BoxFuture<'static, ()> = Box::pin(async move {
                    if let Err(details) = future.await {
                        log::debug!("[{}] [tail] future beside the callback failed, ignored: {}", id, details);
                    }
                });
                Step::Park(poll_once(detached).err())
            }
            Ok(Returned::Future(future)) => {
                log::debug!("[{}] [tail] async promise mode", ctx.id());
                ctx.set_completion_style(CompletionStyle::AsyncPromise);
                let ctx = ctx.clone();
                Step::Await(Box::pin(async move {
                    let settled = future.await;
                    if ctx.interaction_type().is_some_and(|p| p.is_settled()) {
                        // A resumption completed the call while the future ran.
                        return Step::Settled;
                    }
                    match settled {
                        Ok(value) => ctx.switch_to_result(value),
                        Err(details) => ctx.switch_to_fault(
                            Fault::business(E_TARGET_FAILED, details).thrown_by_default(TAIL_NAME),
                        ),
                    }
                    Step::Stay
                }))
            }
            Ok(Returned::Value(value)) => {
                log::debug!("[{}] [tail] sync mode, direct return", ctx.id());
                ctx.set_completion_style(CompletionStyle::SyncDirect);
                ctx.switch_to_result(value);
                Step::Stay
            }
        }
    }
}

/// Transient processor anchored just after the Tail. A deferred completion
/// enters the chain through it and walks backward from the Tail.
pub struct ResumptionProcessor {
    anchor: usize,
}

impl ResumptionProcessor {
    /// Position the backward walk continues from.
    pub fn previous(&self) -> usize {
        self.anchor
    }

    fn process(&self, ctx: &InvocationContext) -> Step {
        log::debug!("[{}] [resumption] {:?}", ctx.id(), ctx.interaction_type());
        Step::Previous
    }
}

struct Link {
    processor: Processor,
    next: Option<usize>,
    previous: Option<usize>,
    frozen: bool,
}

/// Doubly linked, direction-aware list of processors.
pub struct ProcessorChain {
    links: Vec<Link>,
    header: usize,
    tail: usize,
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("links", &self.links.len())
            .field("header", &self.header)
            .field("tail", &self.tail)
            .finish_non_exhaustive()
    }
}

impl ProcessorChain {
    /// A chain with only the Header and the Tail, linked to each other.
    pub fn new(operation: Arc<OperationMetadata>, target: Arc<dyn Target>) -> Self {
        let mut chain = Self {
            links: Vec::new(),
            header: 0,
            tail: 1,
        };
        chain.push(Processor::Header(HeaderProcessor { operation }));
        chain.push(Processor::Tail(TailProcessor { target }));
        chain.links[0].next = Some(1);
        chain.links[1].previous = Some(0);
        chain
    }

    fn push(&mut self, processor: Processor) -> usize {
        self.links.push(Link {
            processor,
            next: None,
            previous: None,
            frozen: false,
        });
        self.links.len() - 1
    }

    fn link_mut(&mut self, at: usize) -> Result<&mut Link, ChainError> {
        let link = self.links.get_mut(at).ok_or(ChainError::UnknownNode(at))?;
        if link.frozen {
            return Err(ChainError::Frozen {
                node: link.processor.name().to_string(),
            });
        }
        Ok(link)
    }

    pub fn set_next(&mut self, at: usize, next: Option<usize>) -> Result<(), ChainError> {
        self.link_mut(at)?.next = next;
        Ok(())
    }

    pub fn set_previous(&mut self, at: usize, previous: Option<usize>) -> Result<(), ChainError> {
        self.link_mut(at)?.previous = previous;
        Ok(())
    }

    /// Inserts an interceptor just before the Tail and returns its position.
    pub fn splice(&mut self, instance: InterceptorInstance) -> Result<usize, ChainError> {
        // Check up front so a frozen chain is left untouched.
        let before = self.previous(self.tail).ok_or(ChainError::UnknownNode(self.tail))?;
        self.link_mut(before)?;
        self.link_mut(self.tail)?;

        let at = self.push(Processor::Interceptor(InterceptorProcessor { instance }));
        self.set_previous(at, Some(before))?;
        self.set_next(at, Some(self.tail))?;
        self.set_next(before, Some(at))?;
        self.set_previous(self.tail, Some(at))?;
        Ok(at)
    }

    /// Freezes every processor. Links cannot change afterwards.
    pub fn freeze(&mut self) {
        for link in &mut self.links {
            link.frozen = true;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.links.iter().all(|l| l.frozen)
    }

    pub fn header(&self) -> usize {
        self.header
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    pub fn next(&self, at: usize) -> Option<usize> {
        self.links.get(at).and_then(|l| l.next)
    }

    pub fn previous(&self, at: usize) -> Option<usize> {
        self.links.get(at).and_then(|l| l.previous)
    }

    pub fn processor(&self, at: usize) -> Option<&Processor> {
        self.links.get(at).map(|l| &l.processor)
    }

    /// A fresh resumption point behind the Tail.
    pub fn resumption(&self) -> ResumptionProcessor {
        ResumptionProcessor { anchor: self.tail }
    }

    /// Processor names from Header to Tail.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.links.len());
        let mut at = Some(self.header);
        while let Some(i) = at {
            let Some(link) = self.links.get(i) else { break };
            names.push(link.processor.name());
            at = link.next;
        }
        names
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::core::sync_impl::interceptor::Interceptor;

    struct Named(&'static str);

    impl Interceptor for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn echo(_ctx: &InvocationContext) -> Result<Returned, Value> {
        Ok(Returned::Value(Value::Null))
    }

    fn chain() -> ProcessorChain {
        ProcessorChain::new(
            Arc::new(OperationMetadata::new("Stock", "getPrice")),
            Arc::new(echo),
        )
    }

    #[test]
    fn test_splice_preserves_binding_order() {
        let mut chain = chain();
        chain.splice(Named("first").into()).unwrap();
        chain.splice(Named("second").into()).unwrap();
        assert_eq!(
            chain.names(),
            vec![HEADER_NAME, "first", "second", TAIL_NAME]
        );

        // Backward links mirror the forward ones.
        let mut names = Vec::new();
        let mut at = Some(chain.tail());
        while let Some(i) = at {
            names.push(chain.processor(i).unwrap().name());
            at = chain.previous(i);
        }
        assert_eq!(names, vec![TAIL_NAME, "second", "first", HEADER_NAME]);
    }

    #[test]
    fn test_frozen_chain_rejects_relinking() {
        let mut chain = chain();
        chain.splice(Named("only").into()).unwrap();
        chain.freeze();
        assert!(chain.is_frozen());

        let err = chain.set_next(chain.header(), Some(chain.tail())).unwrap_err();
        assert_eq!(
            err,
            ChainError::Frozen {
                node: HEADER_NAME.to_string()
            }
        );
        assert!(chain.splice(Named("late").into()).is_err());
        assert_eq!(chain.names(), vec![HEADER_NAME, "only", TAIL_NAME]);
    }

    #[test]
    fn test_unknown_position() {
        let mut chain = chain();
        assert_eq!(chain.set_previous(9, None), Err(ChainError::UnknownNode(9)));
        assert!(chain.processor(9).is_none());
    }

    #[test]
    fn test_resumption_is_anchored_after_tail() {
        let chain = chain();
        let resumption = chain.resumption();
        assert_eq!(resumption.previous(), chain.tail());
    }

    #[test]
    fn test_poll_once_hands_back_pending_futures() {
        let ready: BoxFuture<'static, i32> = Box::pin(async { 7 });
        assert_eq!(poll_once(ready).ok(), Some(7));
        let pending: BoxFuture<'static, ()> = Box::pin(futures::future::pending());
        assert!(poll_once(pending).is_err());
    }
}
