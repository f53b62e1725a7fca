use crate::core::Value;
use crate::core::chain::{Processor, ProcessorChain, Step};
use crate::core::context::{InteractionType, InvocationContext, ProcessStatus};
use crate::core::error::{ConfigError, ResumeError};
use crate::core::fault::{E_ABANDONED, E_HOOK_FAILED, Fault};
use crate::core::metadata::{InteractionStyle, OperationMetadata};
use crate::core::registry::InterceptorRegistry;
use crate::core::target::Target;
use crate::core::validation::ValidationResult;
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Either};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Where the drive loop stopped.
enum Drive {
    /// The Header reported the terminal status.
    Done(ProcessStatus),
    /// The walk completed inside the target's callback.
    Settled,
    /// The target will complete through its callback later.
    Parked(Option<BoxFuture<'static, ()>>),
    /// A hook or the target returned a future that is not done yet.
    Suspended {
        at: usize,
        pending: BoxFuture<'static, Step>,
    },
}

/// Walks the chain from `at` until the call completes or suspends.
///
/// When `step` is given it is applied at `at` instead of running the
/// processor there; this is how a suspended walk picks up again.
fn drive(chain: &ProcessorChain, ctx: &InvocationContext, mut at: usize, mut step: Option<Step>) -> Drive {
    loop {
        let current = match step.take() {
            Some(step) => step,
            None => match chain.processor(at) {
                Some(processor) => processor.process(ctx),
                None => return broken(ctx, at),
            },
        };
        match current {
            Step::Next => match chain.next(at) {
                Some(next) => at = next,
                None => return broken(ctx, at),
            },
            Step::Previous => match chain.previous(at) {
                Some(previous) => at = previous,
                None => return broken(ctx, at),
            },
            Step::Stay => {}
            Step::Await(pending) => return Drive::Suspended { at, pending },
            Step::Park(detached) => return Drive::Parked(detached),
            Step::Settled => return Drive::Settled,
            Step::Done(status) => return Drive::Done(status),
        }
    }
}

// A frozen chain always runs Header to Tail and back, so this only fires if
// a processor asks to leave through an end that has no link.
fn broken(ctx: &InvocationContext, at: usize) -> Drive {
    log::error!("[{}] chain walked off its end at position {}", ctx.id(), at);
    ctx.switch_to_fault(Fault::runtime(E_HOOK_FAILED, "processor chain is broken"));
    Drive::Done(ctx.finish(InteractionType::InvokeFault))
}

/// Keeps awaiting and driving until the walk no longer suspends.
async fn settle(
    chain: Arc<ProcessorChain>,
    ctx: InvocationContext,
    mut at: usize,
    mut pending: BoxFuture<'static, Step>,
) -> Drive {
    loop {
        let step = pending.await;
        match drive(&chain, &ctx, at, Some(step)) {
            Drive::Suspended {
                at: next_at,
                pending: next,
            } => {
                at = next_at;
                pending = next;
            }
            other => return other,
        }
    }
}

/// Waits for the Header to report, unless it already has.
///
/// A backward walk that suspended while nobody could await it is driven
/// from here.
async fn report(
    ctx: InvocationContext,
    reported: oneshot::Receiver<ProcessStatus>,
) -> Result<Value, Fault> {
    if ctx.status().is_some() {
        return ctx.outcome();
    }
    if let Some(walk) = ctx.pending_walk() {
        walk.await;
        return ctx.outcome();
    }
    match reported.await {
        Ok(_) => ctx.outcome(),
        Err(_) => Err(Fault::runtime(
            E_ABANDONED,
            "the call was dropped before it completed",
        )),
    }
}

fn status_of(ctx: &InvocationContext, fallback: InteractionType) -> ProcessStatus {
    ctx.status().unwrap_or(ProcessStatus {
        interaction_type: ctx.interaction_type().unwrap_or(fallback),
        completion_style: ctx.completion_style(),
    })
}

/// What [`EndpointInvoker::invoke`] hands back to the caller.
#[must_use = "a reply carries the result or fault of the call"]
pub enum Reply {
    /// The call completed on the calling stack.
    Ready(Result<Value, Fault>),
    /// The call completes once this future is driven to the end.
    Pending(BoxFuture<'static, Result<Value, Fault>>),
    /// The target parked the call; its callback delivers the result.
    Deferred(ParkedCall),
}

impl Reply {
    pub fn is_ready(&self) -> bool {
        matches!(self, Reply::Ready(_))
    }

    /// The outcome, if the call completed on the calling stack.
    pub fn ready(self) -> Option<Result<Value, Fault>> {
        match self {
            Reply::Ready(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Waits for the outcome, whichever way the call completes.
    pub async fn resolve(self) -> Result<Value, Fault> {
        match self {
            Reply::Ready(outcome) => outcome,
            Reply::Pending(future) => future.await,
            Reply::Deferred(parked) => parked.settled().await,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            Reply::Pending(_) => f.write_str("Pending"),
            Reply::Deferred(parked) => f.debug_tuple("Deferred").field(parked).finish(),
        }
    }
}

/// A call waiting for its target to complete through the callback.
pub struct ParkedCall {
    ctx: InvocationContext,
    reported: oneshot::Receiver<ProcessStatus>,
    detached: Option<BoxFuture<'static, ()>>,
}

impl ParkedCall {
    pub fn context(&self) -> &InvocationContext {
        &self.ctx
    }

    /// Resolves once the resumed walk has reached the Header.
    ///
    /// A future the target returned next to its callback is driven here as
    /// well, but its output never becomes the result of the call.
    pub async fn settled(self) -> Result<Value, Fault> {
        let outcome = Box::pin(report(self.ctx, self.reported));
        match self.detached {
            None => outcome.await,
            Some(detached) => match futures::future::select(detached, outcome).await {
                Either::Left(((), outcome)) => outcome.await,
                Either::Right((outcome, _)) => outcome,
            },
        }
    }
}

impl fmt::Debug for ParkedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParkedCall").field("ctx", &self.ctx).finish()
    }
}

/// What a resumption hands back to whoever completed the call.
#[must_use = "a pending resumption does nothing unless it is awaited"]
pub enum Resumed {
    Done(ProcessStatus),
    /// An async hook suspended the backward walk.
    Pending(BoxFuture<'static, ProcessStatus>),
}

impl Resumed {
    pub fn is_done(&self) -> bool {
        matches!(self, Resumed::Done(_))
    }

    pub async fn wait(self) -> ProcessStatus {
        match self {
            Resumed::Done(status) => status,
            Resumed::Pending(future) => future.await,
        }
    }
}

impl fmt::Debug for Resumed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resumed::Done(status) => f.debug_tuple("Done").field(status).finish(),
            Resumed::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Owns the chain of one operation and drives calls through it.
///
/// The chain is assembled from the operation's bindings on first use and
/// shared, frozen, by every later call.
pub struct EndpointInvoker {
    operation: Arc<OperationMetadata>,
    registry: Arc<InterceptorRegistry>,
    target: Arc<dyn Target>,
    chain: RwLock<Option<Arc<ProcessorChain>>>,
}

impl EndpointInvoker {
    pub fn new(
        operation: OperationMetadata,
        registry: Arc<InterceptorRegistry>,
        target: impl Target,
    ) -> Self {
        Self {
            operation: Arc::new(operation),
            registry,
            target: Arc::new(target),
            chain: RwLock::new(None),
        }
    }

    pub fn operation(&self) -> &Arc<OperationMetadata> {
        &self.operation
    }

    /// The assembled chain, building it on first use.
    pub fn chain(&self) -> Result<Arc<ProcessorChain>, ConfigError> {
        if let Some(chain) = self.chain.read().as_ref() {
            return Ok(chain.clone());
        }
        let mut slot = self.chain.write();
        if let Some(chain) = slot.as_ref() {
            return Ok(chain.clone());
        }
        let chain = Arc::new(self.assemble()?);
        *slot = Some(chain.clone());
        Ok(chain)
    }

    fn assemble(&self) -> Result<ProcessorChain, ConfigError> {
        let operation = &self.operation;
        let name = operation.full_name();
        let mut validation = ValidationResult::new();
        let mut instances = Vec::with_capacity(operation.bindings.len());
        let mut seen = HashSet::new();

        if operation.bindings.is_empty() {
            validation.add_warning("no interceptors bound, calls go straight to the target");
        }

        for binding in &operation.bindings {
            let interceptor = &binding.interceptor_type;
            if !seen.insert(interceptor.as_str()) {
                validation.add_error(ConfigError::DuplicateBinding {
                    operation: name.clone(),
                    interceptor: interceptor.clone(),
                });
                continue;
            }

            let Some(metadata) = self.registry.get(interceptor) else {
                validation.add_error(ConfigError::MissingInterceptor {
                    operation: name.clone(),
                    interceptor: interceptor.clone(),
                });
                continue;
            };

            if operation.interaction_style == InteractionStyle::Sync
                && metadata.interaction_style() == InteractionStyle::Async
            {
                validation.add_error(ConfigError::IncompatibleStyle {
                    operation: name.clone(),
                    interceptor: interceptor.clone(),
                });
                continue;
            }

            let instance = match binding.resolve(&metadata) {
                Ok(instance) => instance,
                Err(e) => {
                    validation.add_error(e);
                    continue;
                }
            };
            if instance.style() != metadata.interaction_style() {
                validation.add_error(ConfigError::StyleMismatch(interceptor.clone()));
                continue;
            }
            if instance.name() != interceptor {
                validation.add_error(ConfigError::NameMismatch {
                    expected: interceptor.clone(),
                    actual: instance.name().to_string(),
                });
                continue;
            }
            instances.push(instance);
        }

        validation.log_summary(&name);
        validation.into_result()?;

        let mut chain = ProcessorChain::new(operation.clone(), self.target.clone());
        for instance in instances {
            chain.splice(instance)?;
        }
        chain.freeze();
        log::info!("assembled chain for {}: {}", name, chain.names().join(" -> "));
        Ok(chain)
    }

    /// Runs a call through the chain.
    ///
    /// Fails when the chain cannot be assembled or `ctx` already carried a
    /// call, in which case the target never runs. Faults raised during the
    /// call come back inside the [`Reply`].
    pub fn invoke(&self, ctx: &InvocationContext) -> Result<Reply, ConfigError> {
        let chain = self.chain()?;
        if ctx.is_started() {
            return Err(ConfigError::ContextReused(ctx.id().to_string()));
        }
        let (tx, reported) = oneshot::channel();
        ctx.attach_reporter(Box::new(move |status| {
            let _ = tx.send(status);
        }));

        let reply = match drive(&chain, ctx, chain.header(), None) {
            Drive::Done(_) => Reply::Ready(ctx.outcome()),
            Drive::Settled if ctx.status().is_some() => Reply::Ready(ctx.outcome()),
            Drive::Settled => Reply::Pending(Box::pin(report(ctx.clone(), reported))),
            Drive::Parked(detached) => Reply::Deferred(ParkedCall {
                ctx: ctx.clone(),
                reported,
                detached,
            }),
            Drive::Suspended { at, pending } => {
                let ctx = ctx.clone();
                Reply::Pending(Box::pin(async move {
                    match settle(chain, ctx.clone(), at, pending).await {
                        Drive::Done(_) => ctx.outcome(),
                        _ => report(ctx, reported).await,
                    }
                }))
            }
        };
        Ok(reply)
    }

    /// Completes a parked call with the result already stored on `ctx`.
    pub fn resume_with_result(&self, ctx: &InvocationContext) -> Result<Resumed, ResumeError> {
        self.resume(ctx, InteractionType::InvokeResult, None)
    }

    /// Completes a parked call with the fault already stored on `ctx`.
    pub fn resume_with_fault(&self, ctx: &InvocationContext) -> Result<Resumed, ResumeError> {
        self.resume(ctx, InteractionType::InvokeFault, None)
    }

    fn resume(
        &self,
        ctx: &InvocationContext,
        phase: InteractionType,
        completion: Option<Result<Value, Fault>>,
    ) -> Result<Resumed, ResumeError> {
        self.accept(ctx, phase, completion)?;
        Ok(self.walk_back(ctx))
    }

    /// Moves a parked call into its terminal phase without walking it yet.
    pub(crate) fn accept(
        &self,
        ctx: &InvocationContext,
        phase: InteractionType,
        completion: Option<Result<Value, Fault>>,
    ) -> Result<(), ResumeError> {
        self.chain()?;
        ctx.begin_resume(phase, completion)
    }

    /// Walks an accepted call from the Tail back to the Header.
    ///
    /// A walk that suspends is also held on `ctx`, so the caller's reply can
    /// drive it when the completer cannot.
    pub(crate) fn walk_back(&self, ctx: &InvocationContext) -> Resumed {
        let phase = ctx.interaction_type().unwrap_or(InteractionType::InvokeResult);
        let chain = match self.chain() {
            Ok(chain) => chain,
            Err(e) => {
                log::error!("[{}] resume without a chain: {}", ctx.id(), e);
                return Resumed::Done(status_of(ctx, phase));
            }
        };

        let entry = Processor::Resumption(chain.resumption());
        log::debug!("[{}] resume {} through {}", ctx.id(), phase, entry.name());
        let first = match entry.process(ctx) {
            Step::Previous => None,
            other => Some(other),
        };
        match drive(&chain, ctx, chain.tail(), first) {
            Drive::Done(status) => Resumed::Done(status),
            Drive::Suspended { at, pending } => {
                let walking = ctx.clone();
                let walk: BoxFuture<'static, ProcessStatus> = Box::pin(async move {
                    match settle(chain, walking.clone(), at, pending).await {
                        Drive::Done(status) => status,
                        _ => status_of(&walking, phase),
                    }
                });
                let walk = walk.shared();
                ctx.hold_walk(walk.clone());
                Resumed::Pending(Box::pin(walk))
            }
            Drive::Settled | Drive::Parked(_) => Resumed::Done(status_of(ctx, phase)),
        }
    }
}

impl fmt::Debug for EndpointInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointInvoker")
            .field("operation", &self.operation.full_name())
            .field("assembled", &self.chain.read().is_some())
            .finish()
    }
}
