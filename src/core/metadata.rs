use crate::core::error::ConfigError;
use crate::core::{InterceptorInstance, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Declared interaction style of an operation or an interceptor type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InteractionStyle {
    /// Completes on the calling stack. Operations default to this.
    #[default]
    Sync,
    /// May complete later, through a future or a deferred callback.
    Async,
}

impl fmt::Display for InteractionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionStyle::Sync => write!(f, "SYNC"),
            InteractionStyle::Async => write!(f, "ASYNC"),
        }
    }
}

/// Builds a fresh interceptor instance from the init params of a binding.
pub type InterceptorFactory = Arc<dyn Fn(&[Value]) -> InterceptorInstance + Send + Sync>;

/// Metadata of an interceptor type, kept in the
/// [`InterceptorRegistry`](crate::core::registry::InterceptorRegistry).
#[derive(Clone)]
pub struct InterceptorMetadata {
    name: String,
    interaction_style: InteractionStyle,
    factory: Option<InterceptorFactory>,
}

impl InterceptorMetadata {
    pub fn new(name: impl Into<String>, interaction_style: InteractionStyle) -> Self {
        Self {
            name: name.into(),
            interaction_style,
            factory: None,
        }
    }

    /// Attaches a constructor so bindings can reference this type by name
    /// instead of handing over a singleton.
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&[Value]) -> InterceptorInstance + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interaction_style(&self) -> InteractionStyle {
        self.interaction_style
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    pub(crate) fn create(&self, init_params: &[Value]) -> Option<InterceptorInstance> {
        self.factory.as_ref().map(|factory| factory(init_params))
    }
}

impl fmt::Debug for InterceptorMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorMetadata")
            .field("name", &self.name)
            .field("interaction_style", &self.interaction_style)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// One interceptor bound to an operation.
///
/// A binding either carries a pre-built singleton, shared by every chain it
/// is spliced into, or names a registered type whose factory builds a fresh
/// instance for each chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptorBinding {
    pub interceptor_type: String,
    #[serde(default)]
    pub init_params: Vec<Value>,
    #[serde(skip)]
    pub singleton: Option<InterceptorInstance>,
}

impl InterceptorBinding {
    /// Binds a shared instance. The type name is the instance's own name.
    pub fn singleton(instance: impl Into<InterceptorInstance>) -> Self {
        let instance = instance.into();
        Self {
            interceptor_type: instance.name().to_string(),
            init_params: Vec::new(),
            singleton: Some(instance),
        }
    }

    /// Binds a registered interceptor type, built per chain from `init_params`.
    pub fn factory(interceptor_type: impl Into<String>, init_params: Vec<Value>) -> Self {
        Self {
            interceptor_type: interceptor_type.into(),
            init_params,
            singleton: None,
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton.is_some()
    }

    /// Resolves the instance this binding contributes to a chain.
    pub(crate) fn resolve(
        &self,
        metadata: &InterceptorMetadata,
    ) -> Result<InterceptorInstance, ConfigError> {
        let instance = match &self.singleton {
            Some(instance) => instance.clone(),
            None => metadata
                .create(&self.init_params)
                .ok_or_else(|| ConfigError::MissingFactory(self.interceptor_type.clone()))?,
        };
        log::debug!(
            "resolved interceptor '{}' ({})",
            instance.name(),
            if self.is_singleton() { "singleton" } else { "fresh" }
        );
        Ok(instance)
    }
}

/// Everything the pipeline needs to know about one instrumented operation.
///
/// Built once at registration time and read-only afterwards. The bindings
/// are kept in binding order: requests travel through them front to back,
/// responses and faults back to front.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    pub class_name: String,
    pub operation_name: String,
    /// Position of the completion callback among the arguments, if any.
    #[serde(default)]
    pub completion_param: Option<usize>,
    #[serde(default)]
    pub interaction_style: InteractionStyle,
    #[serde(default, rename = "interceptors")]
    pub bindings: Vec<InterceptorBinding>,
}

impl OperationMetadata {
    pub fn new(class_name: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            operation_name: operation_name.into(),
            completion_param: None,
            interaction_style: InteractionStyle::default(),
            bindings: Vec::new(),
        }
    }

    /// Loads the declarative part of an operation from JSON.
    ///
    /// ```rust
    /// use tollgate::{InteractionStyle, OperationMetadata};
    ///
    /// let op = OperationMetadata::from_json(r#"{
    ///     "className": "StockService",
    ///     "operationName": "getPrice",
    ///     "completionParam": 1,
    ///     "interceptors": [{ "interceptorType": "Logger" }]
    /// }"#).unwrap();
    /// assert_eq!(op.interaction_style, InteractionStyle::Sync);
    /// assert_eq!(op.bindings[0].interceptor_type, "Logger");
    /// ```
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn style(mut self, style: InteractionStyle) -> Self {
        self.interaction_style = style;
        self
    }

    pub fn completion_param(mut self, position: usize) -> Self {
        self.completion_param = Some(position);
        self
    }

    /// Appends a binding. Binding order is chain order.
    pub fn bind(mut self, binding: InterceptorBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Shorthand for `bind(InterceptorBinding::singleton(instance))`.
    pub fn intercept(self, instance: impl Into<InterceptorInstance>) -> Self {
        self.bind(InterceptorBinding::singleton(instance))
    }

    /// Replaces the singleton of the binding for `interceptor_type`.
    pub fn attach_singleton(mut self, instance: impl Into<InterceptorInstance>) -> Self {
        let instance = instance.into();
        if let Some(binding) = self
            .bindings
            .iter_mut()
            .find(|b| b.interceptor_type == instance.name())
        {
            binding.singleton = Some(instance);
        } else {
            log::warn!(
                "no binding named '{}' on {}, singleton ignored",
                instance.name(),
                self.full_name()
            );
        }
        self
    }

    pub fn has_interceptors(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// `Class.operation`, as used in log lines and errors.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.class_name, self.operation_name)
    }
}
