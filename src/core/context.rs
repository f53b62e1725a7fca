use crate::core::Value;
use crate::core::callback::Callback;
use crate::core::error::ResumeError;
use crate::core::fault::{E_HOOK_FAILED, Fault};
use crate::core::metadata::OperationMetadata;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The phase a call is in. Exactly one is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Locate,
    LocateResult,
    Invoke,
    InvokeResult,
    InvokeFault,
}

impl InteractionType {
    /// Phases that travel from the Header towards the Tail.
    pub fn is_forward(&self) -> bool {
        matches!(self, InteractionType::Locate | InteractionType::Invoke)
    }

    /// Phases reached once the target has completed, one way or the other.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            InteractionType::InvokeResult | InteractionType::InvokeFault
        )
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InteractionType::Locate => "LOCATE",
            InteractionType::LocateResult => "LOCATE_RESULT",
            InteractionType::Invoke => "INVOKE",
            InteractionType::InvokeResult => "INVOKE_RESULT",
            InteractionType::InvokeFault => "INVOKE_FAULT",
        };
        f.write_str(s)
    }
}

/// How the target signalled completion. Set once per call, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionStyle {
    /// Returned its result (or raised) on the calling stack.
    SyncDirect,
    /// Invoked its completion callback before returning.
    SyncCallback,
    /// Returned a future.
    AsyncPromise,
    /// Returned without invoking the completion callback it was handed.
    AsyncCallback,
}

/// Terminal status reported by the Header once the backward walk is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    pub interaction_type: InteractionType,
    pub completion_style: Option<CompletionStyle>,
}

impl ProcessStatus {
    pub fn is_fault(&self) -> bool {
        self.interaction_type == InteractionType::InvokeFault
    }
}

/// Continuation run when a suspended call finally reaches the Header.
pub type HeldContinuation = Box<dyn FnOnce(ProcessStatus) + Send>;

/// A suspended backward walk that any holder may drive to the Header.
pub(crate) type Walk = Shared<BoxFuture<'static, ProcessStatus>>;

/// Per-call phase record. Created by the Header, one per context.
pub struct Interaction {
    pub(crate) interaction_type: InteractionType,
    pub(crate) operation: Arc<OperationMetadata>,
    pub(crate) completion_style: Option<CompletionStyle>,
    pub(crate) held: Option<HeldContinuation>,
    pub(crate) target_invoked: bool,
    pub(crate) callback_style: bool,
    pub(crate) status: Option<ProcessStatus>,
    pub(crate) walk: Option<Walk>,
}

impl Interaction {
    fn new(operation: Arc<OperationMetadata>) -> Self {
        Self {
            interaction_type: InteractionType::Locate,
            operation,
            completion_style: None,
            held: None,
            target_invoked: false,
            callback_style: false,
            status: None,
            walk: None,
        }
    }
}

/// One argument of a call: a plain value or a completion callback.
#[derive(Clone)]
pub enum Argument {
    Value(Value),
    Callback(Callback),
}

impl Argument {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::Value(v) => Some(v),
            Argument::Callback(_) => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Argument::Callback(cb) => Some(cb),
            Argument::Value(_) => None,
        }
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl From<Callback> for Argument {
    fn from(callback: Callback) -> Self {
        Argument::Callback(callback)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => write!(f, "Value({v})"),
            Argument::Callback(_) => write!(f, "Callback"),
        }
    }
}

struct ContextState {
    input: Vec<Argument>,
    output: Option<Value>,
    fault: Option<Fault>,
    interaction: Option<Interaction>,
    reporter: Option<HeldContinuation>,
    slots: HashMap<String, Vec<Value>>,
}

struct ContextInner {
    id: Uuid,
    target: Option<Arc<dyn Any + Send + Sync>>,
    state: Mutex<ContextState>,
}

/// The per-call record handed to every processor of a chain.
///
/// Cloning is cheap and yields a handle to the same call. Accessors lock
/// the state only for their own duration, so hooks and targets are free to
/// re-enter the pipeline with the same or a new context.
#[derive(Clone)]
pub struct InvocationContext {
    inner: Arc<ContextInner>,
}

impl InvocationContext {
    pub fn new(input: Vec<Argument>) -> Self {
        Self::with_target(input, None)
    }

    /// Creates a context whose target reference ("this") is `target`.
    pub fn with_target(input: Vec<Argument>, target: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: Uuid::new_v4(),
                target,
                state: Mutex::new(ContextState {
                    input,
                    output: None,
                    fault: None,
                    interaction: None,
                    reporter: None,
                    slots: HashMap::new(),
                }),
            }),
        }
    }

    /// Unique id of this call, used in log lines and traces.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Whether both handles refer to the same call.
    pub fn same_call(&self, other: &InvocationContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn target<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.target.clone()?.downcast::<T>().ok()
    }

    pub fn args(&self) -> Vec<Argument> {
        self.inner.state.lock().input.clone()
    }

    /// The plain value at `position`, if there is one.
    pub fn arg(&self, position: usize) -> Option<Value> {
        self.inner
            .state
            .lock()
            .input
            .get(position)
            .and_then(Argument::as_value)
            .cloned()
    }

    /// Replaces the value at `position`. Out of range positions are ignored.
    pub fn set_arg(&self, position: usize, value: Value) {
        let mut state = self.inner.state.lock();
        if let Some(arg) = state.input.get_mut(position) {
            *arg = Argument::Value(value);
        }
    }

    /// The completion callback handed to the target, if the operation
    /// declares one and the caller supplied it.
    pub fn callback(&self) -> Option<Callback> {
        let state = self.inner.state.lock();
        let position = state.interaction.as_ref()?.operation.completion_param?;
        state
            .input
            .get(position)
            .and_then(Argument::as_callback)
            .cloned()
    }

    pub fn output(&self) -> Option<Value> {
        self.inner.state.lock().output.clone()
    }

    pub fn set_output(&self, value: Value) {
        self.inner.state.lock().output = Some(value);
    }

    pub fn fault(&self) -> Option<Fault> {
        self.inner.state.lock().fault.clone()
    }

    pub fn set_fault(&self, fault: Fault) {
        self.inner.state.lock().fault = Some(fault);
    }

    /// The current phase, `None` before the Header picked the call up.
    pub fn interaction_type(&self) -> Option<InteractionType> {
        self.inner
            .state
            .lock()
            .interaction
            .as_ref()
            .map(|i| i.interaction_type)
    }

    pub fn completion_style(&self) -> Option<CompletionStyle> {
        self.inner
            .state
            .lock()
            .interaction
            .as_ref()
            .and_then(|i| i.completion_style)
    }

    /// The operation this call belongs to.
    pub fn operation(&self) -> Option<Arc<OperationMetadata>> {
        self.inner
            .state
            .lock()
            .interaction
            .as_ref()
            .map(|i| i.operation.clone())
    }

    /// Terminal status, once the Header has reported it.
    pub fn status(&self) -> Option<ProcessStatus> {
        self.inner
            .state
            .lock()
            .interaction
            .as_ref()
            .and_then(|i| i.status)
    }

    pub fn is_target_invoked(&self) -> bool {
        self.inner
            .state
            .lock()
            .interaction
            .as_ref()
            .is_some_and(|i| i.target_invoked)
    }

    /// Whether the result arrived through the completion callback.
    pub fn is_callback_style(&self) -> bool {
        self.inner
            .state
            .lock()
            .interaction
            .as_ref()
            .is_some_and(|i| i.callback_style)
    }

    // ------------------------------------------------------------------
    // Correlation slots
    // ------------------------------------------------------------------

    /// Sets the slot of `processor`, replacing its most recent entry.
    pub fn set_slot(&self, processor: &str, value: Value) {
        let mut state = self.inner.state.lock();
        let stack = state.slots.entry(processor.to_string()).or_default();
        stack.pop();
        stack.push(value);
    }

    /// Most recent entry of the slot of `processor`.
    pub fn slot(&self, processor: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .slots
            .get(processor)
            .and_then(|stack| stack.last().cloned())
    }

    /// Pushes an entry on the slot of `processor`.
    pub fn push_slot(&self, processor: &str, value: Value) {
        self.inner
            .state
            .lock()
            .slots
            .entry(processor.to_string())
            .or_default()
            .push(value);
    }

    /// Pops the most recent entry of the slot of `processor`.
    pub fn pop_slot(&self, processor: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .slots
            .get_mut(processor)
            .and_then(Vec::pop)
    }

    /// Removes every entry of the slot of `processor`, oldest first.
    pub fn take_slot(&self, processor: &str) -> Vec<Value> {
        self.inner
            .state
            .lock()
            .slots
            .remove(processor)
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Pipeline internals
    // ------------------------------------------------------------------

    /// Attaches the interaction record. Returns `false` if one exists.
    pub(crate) fn begin(&self, operation: &Arc<OperationMetadata>) -> bool {
        let mut state = self.inner.state.lock();
        if state.interaction.is_some() {
            return false;
        }
        state.interaction = Some(Interaction::new(operation.clone()));
        true
    }

    /// Whether a call already ran, or is running, on this context.
    pub(crate) fn is_started(&self) -> bool {
        self.inner.state.lock().interaction.is_some()
    }

    pub(crate) fn set_interaction_type(&self, interaction_type: InteractionType) {
        if let Some(interaction) = self.inner.state.lock().interaction.as_mut() {
            interaction.interaction_type = interaction_type;
        }
    }

    /// Records the fault and flips the call to `INVOKE_FAULT`.
    pub(crate) fn switch_to_fault(&self, fault: Fault) {
        let mut state = self.inner.state.lock();
        state.fault = Some(fault);
        if let Some(interaction) = state.interaction.as_mut() {
            interaction.interaction_type = InteractionType::InvokeFault;
        }
    }

    /// Records the result and flips the call to `INVOKE_RESULT`.
    pub(crate) fn switch_to_result(&self, value: Value) {
        let mut state = self.inner.state.lock();
        state.output = Some(value);
        if let Some(interaction) = state.interaction.as_mut() {
            interaction.interaction_type = InteractionType::InvokeResult;
        }
    }

    /// Stores the completion style. A style that is already set wins.
    pub(crate) fn set_completion_style(&self, style: CompletionStyle) -> bool {
        let mut state = self.inner.state.lock();
        match state.interaction.as_mut() {
            Some(interaction) if interaction.completion_style.is_none() => {
                interaction.completion_style = Some(style);
                true
            }
            Some(interaction) => {
                log::warn!(
                    "[{}] completion style already {:?}, ignoring {:?}",
                    self.inner.id,
                    interaction.completion_style,
                    style
                );
                false
            }
            None => false,
        }
    }

    /// Hands over the continuation that reports to the original caller.
    pub(crate) fn attach_reporter(&self, reporter: HeldContinuation) {
        self.inner.state.lock().reporter = Some(reporter);
    }

    /// Parks the caller's continuation on the interaction, ready for a
    /// resumption that happens outside the current stack.
    pub(crate) fn hold_continuation(&self) {
        let mut state = self.inner.state.lock();
        let reporter = state.reporter.take();
        if let Some(interaction) = state.interaction.as_mut() {
            interaction.held = reporter;
        }
    }

    /// Marks the target as invoked. Returns `false` if it already was.
    pub(crate) fn mark_target_invoked(&self) -> bool {
        let mut state = self.inner.state.lock();
        match state.interaction.as_mut() {
            Some(interaction) if !interaction.target_invoked => {
                interaction.target_invoked = true;
                true
            }
            _ => false,
        }
    }

    /// Moves a call parked in `INVOKE` to `phase` on behalf of a deferred
    /// completion, recording the completion first when one is given.
    ///
    /// A completion that arrives before the Tail saw the target return is a
    /// sync callback; otherwise the style the Tail detected is kept.
    pub(crate) fn begin_resume(
        &self,
        phase: InteractionType,
        completion: Option<Result<Value, Fault>>,
    ) -> Result<(), ResumeError> {
        let mut state = self.inner.state.lock();
        let interaction = state.interaction.as_mut().ok_or(ResumeError::NotStarted)?;
        if interaction.interaction_type != InteractionType::Invoke || !interaction.target_invoked {
            return Err(ResumeError::NotAwaiting {
                phase: interaction.interaction_type,
            });
        }
        interaction.interaction_type = phase;
        interaction.callback_style = true;
        if interaction.completion_style.is_none() {
            interaction.completion_style = Some(CompletionStyle::SyncCallback);
        }
        match completion {
            Some(Ok(value)) => state.output = Some(value),
            Some(Err(fault)) => state.fault = Some(fault),
            None => {}
        }
        Ok(())
    }

    /// Records a backward walk that suspended before reaching the Header.
    pub(crate) fn hold_walk(&self, walk: Walk) {
        if let Some(interaction) = self.inner.state.lock().interaction.as_mut() {
            interaction.walk = Some(walk);
        }
    }

    pub(crate) fn pending_walk(&self) -> Option<Walk> {
        self.inner
            .state
            .lock()
            .interaction
            .as_ref()
            .and_then(|i| i.walk.clone())
    }

    /// Whether the operation declares a completion callback and the caller
    /// supplied one.
    pub(crate) fn callback_supported(&self) -> bool {
        self.callback().is_some()
    }

    /// Records the terminal status and runs the held continuation, if any.
    pub(crate) fn finish(&self, interaction_type: InteractionType) -> ProcessStatus {
        let (status, held) = {
            let mut state = self.inner.state.lock();
            match state.interaction.as_mut() {
                Some(interaction) => {
                    let status = ProcessStatus {
                        interaction_type,
                        completion_style: interaction.completion_style,
                    };
                    interaction.status = Some(status);
                    interaction.walk = None;
                    (status, interaction.held.take())
                }
                None => (
                    ProcessStatus {
                        interaction_type,
                        completion_style: None,
                    },
                    None,
                ),
            }
        };
        if let Some(held) = held {
            held(status);
        }
        status
    }

    /// What the caller observes once the call is over.
    pub(crate) fn outcome(&self) -> Result<Value, Fault> {
        let state = self.inner.state.lock();
        let faulted = state
            .interaction
            .as_ref()
            .is_some_and(|i| i.interaction_type == InteractionType::InvokeFault);
        if faulted {
            Err(state
                .fault
                .clone()
                .unwrap_or_else(|| Fault::runtime(E_HOOK_FAILED, "call faulted without a fault record")))
        } else {
            Ok(state.output.clone().unwrap_or(Value::Null))
        }
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("id", &self.inner.id)
            .field("interaction_type", &self.interaction_type())
            .field("completion_style", &self.completion_style())
            .finish()
    }
}
