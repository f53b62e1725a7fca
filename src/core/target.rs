use crate::core::Value;
use crate::core::context::InvocationContext;
use futures::future::BoxFuture;

/// What a target hands back when it returns.
pub enum Returned {
    /// A plain value. For a target that completes through its callback this
    /// is usually `Value::Null` and is not used as the result.
    Value(Value),
    /// A future that settles with the result or the error details.
    Future(BoxFuture<'static, Result<Value, Value>>),
}

impl Returned {
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        Returned::Future(Box::pin(future))
    }
}

impl From<Value> for Returned {
    fn from(value: Value) -> Self {
        Returned::Value(value)
    }
}

/// The operation at the end of a chain, run by the Tail exactly once per call.
///
/// The target reads its arguments (and its completion callback, if the
/// operation declares one) from the context. `Err(details)` is an error
/// raised by the application logic and becomes a business fault.
pub trait Target: Send + Sync + 'static {
    fn call(&self, ctx: &InvocationContext) -> Result<Returned, Value>;
}

impl<F> Target for F
where
    F: Fn(&InvocationContext) -> Result<Returned, Value> + Send + Sync + 'static,
{
    fn call(&self, ctx: &InvocationContext) -> Result<Returned, Value> {
        self(ctx)
    }
}
