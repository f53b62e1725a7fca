use crate::core::Hook;
use crate::core::context::InvocationContext;
use crate::core::fault::Fault;
use crate::core::sync_impl::interceptor::Interceptor;

/// Writes one log line per hook through the `log` facade.
///
/// Faults are always logged at `warn`; everything else at the configured
/// level (`debug` unless changed).
pub struct LoggingInterceptor {
    name: String,
    level: log::Level,
}

impl LoggingInterceptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: log::Level::Debug,
        }
    }

    pub fn level(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }

    fn line(&self, hook: Hook, ctx: &InvocationContext) -> String {
        let operation = ctx
            .operation()
            .map(|op| op.full_name())
            .unwrap_or_else(|| "<unknown>".to_string());
        format!("[{}] [{}] {} {}", ctx.id(), self.name, hook.as_str(), operation)
    }
}

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        log::log!(self.level, "{}", self.line(Hook::Init, ctx));
        Ok(())
    }

    fn handle_request(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        log::log!(self.level, "{} args={:?}", self.line(Hook::Request, ctx), ctx.args());
        Ok(())
    }

    fn handle_response(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        log::log!(
            self.level,
            "{} output={}",
            self.line(Hook::Response, ctx),
            ctx.output().unwrap_or_default()
        );
        Ok(())
    }

    fn handle_fault(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        match ctx.fault() {
            Some(fault) => log::warn!("{} {}", self.line(Hook::Fault, ctx), fault),
            None => log::warn!("{}", self.line(Hook::Fault, ctx)),
        }
        Ok(())
    }
}
