use crate::core::Value;
use crate::core::context::{InteractionType, InvocationContext, ProcessStatus};
use crate::core::fault::{E_CALLBACK_FAULT, Fault};
use crate::core::invoker::{EndpointInvoker, Resumed};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Deliver = Box<dyn Fn(Result<Value, Fault>) + Send + Sync>;

struct Binding {
    invoker: Arc<EndpointInvoker>,
    ctx: InvocationContext,
}

struct CallbackInner {
    deliver: Deliver,
    bound: Mutex<Vec<Binding>>,
    settled: Mutex<Option<ProcessStatus>>,
}

/// A completion callback handed to a target.
///
/// When the endpoint runs a call, the callback at the operation's
/// completion position is bound to that call. Completing it resumes the
/// bound call's backward walk before the caller's own function sees the
/// result. A callback passed through several nested calls is bound to each
/// of them, and a completion resumes them innermost first.
#[derive(Clone)]
pub struct Callback {
    inner: Arc<CallbackInner>,
}

impl Callback {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(Result<Value, Fault>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(CallbackInner {
                deliver: Box::new(deliver),
                bound: Mutex::new(Vec::new()),
                settled: Mutex::new(None),
            }),
        }
    }

    /// A callback whose caller does not care about the result.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub(crate) fn bind(&self, invoker: Arc<EndpointInvoker>, ctx: InvocationContext) {
        let mut bound = self.inner.bound.lock();
        if !bound.is_empty() {
            log::debug!(
                "[{}] callback already bound to {} call(s), stacking",
                ctx.id(),
                bound.len()
            );
        }
        bound.push(Binding { invoker, ctx });
    }

    pub(crate) fn unbind(&self, ctx: &InvocationContext) {
        self.inner.bound.lock().retain(|b| !b.ctx.same_call(ctx));
    }

    /// Whether a call is waiting on this callback.
    pub fn is_bound(&self) -> bool {
        !self.inner.bound.lock().is_empty()
    }

    /// Number of calls waiting on this callback.
    pub fn depth(&self) -> usize {
        self.inner.bound.lock().len()
    }

    pub fn ok(&self, value: Value) -> Resumed {
        self.complete(Ok(value))
    }

    pub fn fail(&self, details: Value) -> Resumed {
        self.complete(Err(details))
    }

    /// Completes every bound call with `completion`, then hands the result to
    /// the caller's function.
    ///
    /// `Err(details)` is the callback's fault argument and completes the
    /// calls with a business fault. Completing again only reaches the
    /// caller's function and returns the status the last completion left;
    /// a callback that never completed a call reports a status with no
    /// completion style.
    pub fn complete(&self, completion: Result<Value, Value>) -> Resumed {
        let completion = completion.map_err(|details| Fault::business(E_CALLBACK_FAULT, details));
        let phase = match completion {
            Ok(_) => InteractionType::InvokeResult,
            Err(_) => InteractionType::InvokeFault,
        };
        let bound = std::mem::take(&mut *self.inner.bound.lock());

        // Every call leaves INVOKE before any of them walks back, so a target
        // still on the stack sees its call completed.
        let accepted: Vec<Binding> = bound
            .into_iter()
            .rev()
            .filter(|binding| accept(binding, phase, &completion))
            .collect();

        let mut status = None;
        let mut walks = accepted.into_iter();
        while let Some(binding) = walks.next() {
            match binding.invoker.walk_back(&binding.ctx) {
                Resumed::Done(done) => status = Some(done),
                Resumed::Pending(walk) => {
                    let rest: Vec<Binding> = walks.by_ref().collect();
                    let waiting: Vec<InvocationContext> = std::iter::once(binding.ctx.clone())
                        .chain(rest.iter().map(|b| b.ctx.clone()))
                        .collect();
                    let inner = self.inner.clone();
                    let remaining: BoxFuture<'static, ProcessStatus> = Box::pin(async move {
                        let mut status = walk.await;
                        for binding in &rest {
                            status = binding.invoker.walk_back(&binding.ctx).wait().await;
                        }
                        *inner.settled.lock() = Some(status);
                        (inner.deliver)(completion);
                        status
                    });
                    let remaining = remaining.shared();
                    for ctx in &waiting {
                        ctx.hold_walk(remaining.clone());
                    }
                    return Resumed::Pending(Box::pin(remaining));
                }
            }
        }

        let status = match status {
            Some(status) => {
                *self.inner.settled.lock() = Some(status);
                status
            }
            None => {
                let last = *self.inner.settled.lock();
                last.unwrap_or(ProcessStatus {
                    interaction_type: phase,
                    completion_style: None,
                })
            }
        };
        (self.inner.deliver)(completion);
        Resumed::Done(status)
    }
}

fn accept(binding: &Binding, phase: InteractionType, completion: &Result<Value, Fault>) -> bool {
    match binding
        .invoker
        .accept(&binding.ctx, phase, Some(completion.clone()))
    {
        Ok(()) => true,
        Err(e) => {
            log::warn!("[{}] callback could not resume the call: {}", binding.ctx.id(), e);
            false
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("depth", &self.depth()).finish()
    }
}
