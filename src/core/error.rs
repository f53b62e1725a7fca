use crate::core::context::InteractionType;
use thiserror::Error;

/// Errors that stop a call before its target runs. Assembly errors are
/// fatal for the operation and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("interceptor '{interceptor}' bound to {operation} is not registered")]
    MissingInterceptor {
        operation: String,
        interceptor: String,
    },

    #[error("interceptor '{0}' has neither a singleton instance nor a registered factory")]
    MissingFactory(String),

    #[error("ASYNC interceptor '{interceptor}' cannot be bound to SYNC operation {operation}")]
    IncompatibleStyle {
        operation: String,
        interceptor: String,
    },

    #[error("interceptor '{0}' is declared with one interaction style but implemented with the other")]
    StyleMismatch(String),

    #[error("binding for interceptor type '{expected}' produced an instance named '{actual}'")]
    NameMismatch { expected: String, actual: String },

    #[error("interceptor '{interceptor}' is bound more than once to {operation}")]
    DuplicateBinding {
        operation: String,
        interceptor: String,
    },

    #[error("{class_name} has no operation named '{operation}'")]
    UnknownOperation {
        class_name: String,
        operation: String,
    },

    #[error("context {0} already carried a call, every call needs a fresh context")]
    ContextReused(String),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

/// Errors raised by the processor chain itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("processor '{node}' is frozen, its links can no longer change")]
    Frozen { node: String },

    #[error("no processor at position {0}")]
    UnknownNode(usize),
}

/// Errors raised when a deferred completion tries to resume a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumeError {
    #[error("the context was never invoked")]
    NotStarted,

    #[error("the context is not awaiting a result (current phase: {phase})")]
    NotAwaiting { phase: InteractionType },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
