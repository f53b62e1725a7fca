//! A target that calls itself through the pipeline, passing its completion
//! callback down, to a depth of 160 before anything completes.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tollgate::prelude::*;

const MAX_NESTED_STACK_DEPTH: u64 = 160;

/// Shared singleton that correlates request and response through a stack.
#[derive(Default)]
struct StackLogger {
    next_iid: AtomicU64,
    call_stack: Mutex<Vec<u64>>,
    inits: AtomicUsize,
    requests: AtomicUsize,
    responses: AtomicUsize,
    mismatches: AtomicUsize,
}

impl Interceptor for StackLogger {
    fn name(&self) -> &str {
        "logger"
    }

    fn init(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_request(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        let iid = self.next_iid.fetch_add(1, Ordering::SeqCst);
        self.call_stack.lock().push(iid);
        ctx.push_slot(self.name(), json!(iid));
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_response(&self, ctx: &InvocationContext) -> Result<(), Fault> {
        let top = self.call_stack.lock().pop();
        let own = ctx.pop_slot(self.name()).and_then(|v| v.as_u64());
        if top.is_none() || top != own {
            self.mismatches.fetch_add(1, Ordering::SeqCst);
        }
        self.responses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Nested {
    endpoint: Arc<OnceLock<Endpoint>>,
    logger: Arc<StackLogger>,
    parked: Arc<Mutex<Option<Callback>>>,
}

/// `nested(n, callback)`: recurse down to zero, then complete the callback,
/// either right away or later from outside.
fn nested(deferred: bool) -> Nested {
    let registry = Arc::new(InterceptorRegistry::new());
    registry.register(InterceptorMetadata::new("logger", InteractionStyle::Sync));

    let logger = Arc::new(StackLogger::default());
    let style = if deferred {
        InteractionStyle::Async
    } else {
        InteractionStyle::Sync
    };
    let op = OperationMetadata::new("Recursive", "nested")
        .style(style)
        .completion_param(1)
        .bind(InterceptorBinding::singleton(InterceptorInstance::Sync(logger.clone())));

    let slot: Arc<OnceLock<Endpoint>> = Arc::new(OnceLock::new());
    let parked = Arc::new(Mutex::new(None));
    let this = slot.clone();
    let keep = parked.clone();
    let endpoint = Endpoint::new(op, registry, move |ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        let n = ctx.arg(0).and_then(|v| v.as_u64()).unwrap_or_default();
        let callback = ctx.callback().ok_or_else(|| json!("callback missing"))?;
        if n > 0 {
            let endpoint = this.get().ok_or_else(|| json!("endpoint missing"))?;
            let _inner = endpoint
                .call(vec![json!(n - 1).into(), callback.into()])
                .map_err(|e| json!(e.to_string()))?;
        } else if deferred {
            *keep.lock() = Some(callback);
        } else {
            let _ = callback.ok(json!("bottom reached"));
        }
        Ok(JsonValue::Null.into())
    });
    assert!(slot.set(endpoint).is_ok());

    Nested {
        endpoint: slot,
        logger,
        parked,
    }
}

fn run_on_big_stack<F: FnOnce() + Send + 'static>(f: F) {
    std::thread::Builder::new()
        .stack_size(32 * 1024 * 1024)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap();
}

fn assert_balanced(logger: &StackLogger) {
    let depth = MAX_NESTED_STACK_DEPTH as usize;
    assert_eq!(logger.inits.load(Ordering::SeqCst), depth);
    assert_eq!(logger.requests.load(Ordering::SeqCst), depth);
    assert_eq!(logger.responses.load(Ordering::SeqCst), depth);
    assert_eq!(logger.mismatches.load(Ordering::SeqCst), 0);
    assert!(logger.call_stack.lock().is_empty());
}

#[test]
fn test_nested_sync_callback_to_depth_160() {
    run_on_big_stack(|| {
        let nested = nested(false);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let callback = Callback::new(move |outcome| sink.lock().push(outcome));

        let endpoint = nested.endpoint.get().unwrap();
        let ctx = InvocationContext::new(vec![
            json!(MAX_NESTED_STACK_DEPTH - 1).into(),
            callback.clone().into(),
        ]);
        let reply = endpoint.call_with(&ctx).unwrap();

        assert_eq!(reply.ready(), Some(Ok(json!("bottom reached"))));
        assert_eq!(ctx.completion_style(), Some(CompletionStyle::SyncCallback));
        assert_eq!(*delivered.lock(), vec![Ok(json!("bottom reached"))]);
        assert!(!callback.is_bound());
        assert_balanced(&nested.logger);
    });
}

#[test]
fn test_nested_deferred_callback_to_depth_160() {
    run_on_big_stack(|| {
        let nested = nested(true);
        let delivered = Arc::new(AtomicUsize::new(0));
        let count = delivered.clone();
        let callback = Callback::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let endpoint = nested.endpoint.get().unwrap();
        let reply = endpoint
            .call(vec![json!(MAX_NESTED_STACK_DEPTH - 1).into(), callback.clone().into()])
            .unwrap();
        assert!(matches!(reply, Reply::Deferred(_)));
        assert_eq!(callback.depth(), MAX_NESTED_STACK_DEPTH as usize);
        assert_eq!(nested.logger.responses.load(Ordering::SeqCst), 0);

        let parked = nested.parked.lock().take().unwrap();
        let resumed = parked.ok(json!(42));
        assert!(resumed.is_done());

        assert_eq!(futures::executor::block_on(reply.resolve()), Ok(json!(42)));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_balanced(&nested.logger);

        // A second completion reaches only the caller's function.
        let _ = parked.ok(json!(43));
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(nested.logger.responses.load(Ordering::SeqCst), 160);
    });
}
