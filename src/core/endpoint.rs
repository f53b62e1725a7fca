use crate::core::context::{Argument, InvocationContext};
use crate::core::error::ConfigError;
use crate::core::invoker::{EndpointInvoker, Reply};
use crate::core::metadata::OperationMetadata;
use crate::core::registry::InterceptorRegistry;
use crate::core::target::Target;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A callable handle to one instrumented operation.
///
/// Calling an endpoint builds a fresh [`InvocationContext`], binds the
/// completion callback (if the operation declares one and the caller
/// passed it) and runs the call through the operation's chain. Clones share
/// the same chain.
#[derive(Clone)]
pub struct Endpoint {
    invoker: Arc<EndpointInvoker>,
    this: Option<Arc<dyn Any + Send + Sync>>,
}

impl Endpoint {
    pub fn new(
        operation: OperationMetadata,
        registry: Arc<InterceptorRegistry>,
        target: impl Target,
    ) -> Self {
        Self {
            invoker: Arc::new(EndpointInvoker::new(operation, registry, target)),
            this: None,
        }
    }

    /// Sets the target reference every call's context carries.
    pub fn bound_to(mut self, this: Arc<dyn Any + Send + Sync>) -> Self {
        self.this = Some(this);
        self
    }

    /// Assembles the chain now instead of on the first call.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        self.invoker.chain().map(|_| ())
    }

    pub fn operation(&self) -> &OperationMetadata {
        self.invoker.operation()
    }

    pub fn invoker(&self) -> &Arc<EndpointInvoker> {
        &self.invoker
    }

    pub fn call(&self, args: Vec<Argument>) -> Result<Reply, ConfigError> {
        let ctx = InvocationContext::with_target(args, self.this.clone());
        self.call_with(&ctx)
    }

    /// Runs a call with a context the caller built.
    pub fn call_with(&self, ctx: &InvocationContext) -> Result<Reply, ConfigError> {
        let callback = self
            .operation()
            .completion_param
            .and_then(|position| ctx.args().into_iter().nth(position))
            .and_then(|arg| match arg {
                Argument::Callback(callback) => Some(callback),
                Argument::Value(_) => None,
            });

        if let Some(callback) = &callback {
            callback.bind(self.invoker.clone(), ctx.clone());
        }
        let reply = self.invoker.invoke(ctx);
        if reply.is_err() {
            if let Some(callback) = &callback {
                callback.unbind(ctx);
            }
        }
        reply
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("invoker", &self.invoker)
            .field("bound", &self.this.is_some())
            .finish()
    }
}

/// The instrumented operations of one class, registered by name.
pub struct Component {
    class_name: String,
    registry: Arc<InterceptorRegistry>,
    this: Option<Arc<dyn Any + Send + Sync>>,
    endpoints: HashMap<String, Endpoint>,
}

impl Component {
    pub fn new(class_name: impl Into<String>, registry: Arc<InterceptorRegistry>) -> Self {
        Self {
            class_name: class_name.into(),
            registry,
            this: None,
            endpoints: HashMap::new(),
        }
    }

    /// Sets the instance every operation of the component is bound to.
    pub fn with_instance(mut self, this: Arc<dyn Any + Send + Sync>) -> Self {
        self.this = Some(this);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Registers an operation of this class and returns its endpoint.
    ///
    /// The operation's class name is overwritten with the component's.
    pub fn register(&mut self, mut operation: OperationMetadata, target: impl Target) -> Endpoint {
        operation.class_name = self.class_name.clone();
        let name = operation.operation_name.clone();
        let mut endpoint = Endpoint::new(operation, self.registry.clone(), target);
        if let Some(this) = &self.this {
            endpoint = endpoint.bound_to(this.clone());
        }
        if self.endpoints.insert(name.clone(), endpoint.clone()).is_some() {
            log::warn!("{}.{} registered twice, replacing", self.class_name, name);
        }
        endpoint
    }

    pub fn endpoint(&self, operation: &str) -> Option<&Endpoint> {
        self.endpoints.get(operation)
    }

    /// Operation names, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Assembles every chain, failing on the first configuration error.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        for name in self.operations() {
            if let Some(endpoint) = self.endpoints.get(name) {
                endpoint.prepare()?;
            }
        }
        Ok(())
    }

    pub fn call(&self, operation: &str, args: Vec<Argument>) -> Result<Reply, ConfigError> {
        let endpoint = self
            .endpoints
            .get(operation)
            .ok_or_else(|| ConfigError::UnknownOperation {
                class_name: self.class_name.clone(),
                operation: operation.to_string(),
            })?;
        endpoint.call(args)
    }
}
