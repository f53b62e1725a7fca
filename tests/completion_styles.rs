//! Every completion style yields the target's value and the same hook order.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tollgate::prelude::*;
use tollgate::{E_CALLBACK_FAULT, E_TARGET_FAILED};

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn push(&self, hook: &str) {
        self.log.lock().push(format!("{}:{}", self.name, hook));
    }
}

impl Interceptor for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn init(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        self.push("init");
        Ok(())
    }

    fn handle_request(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        self.push("request");
        Ok(())
    }

    fn handle_response(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        self.push("response");
        Ok(())
    }

    fn handle_fault(&self, _ctx: &InvocationContext) -> Result<(), Fault> {
        self.push("fault");
        Ok(())
    }
}

const EXPECTED: [&str; 6] = [
    "a:init",
    "b:init",
    "a:request",
    "b:request",
    "b:response",
    "a:response",
];

fn setup(style: InteractionStyle, completion_param: Option<usize>) -> (Arc<InterceptorRegistry>, OperationMetadata, Arc<Mutex<Vec<String>>>) {
    let registry = Arc::new(InterceptorRegistry::new());
    registry.register(InterceptorMetadata::new("a", InteractionStyle::Sync));
    registry.register(InterceptorMetadata::new("b", InteractionStyle::Sync));

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut op = OperationMetadata::new("Stock", "getPrice")
        .style(style)
        .intercept(Recorder { name: "a", log: log.clone() })
        .intercept(Recorder { name: "b", log: log.clone() });
    if let Some(position) = completion_param {
        op = op.completion_param(position);
    }
    (registry, op, log)
}

fn delivered() -> (Callback, Arc<Mutex<Vec<Result<JsonValue, Fault>>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let callback = Callback::new(move |outcome| sink.lock().push(outcome));
    (callback, received)
}

#[test]
fn test_sync_direct() {
    let (registry, op, log) = setup(InteractionStyle::Sync, None);
    let endpoint = Endpoint::new(op, registry, |ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        assert_invoking(ctx);
        Ok(json!(100).into())
    });

    let ctx = InvocationContext::new(vec![json!("IBM").into()]);
    let reply = endpoint.call_with(&ctx).unwrap();

    assert_eq!(reply.ready(), Some(Ok(json!(100))));
    assert_eq!(ctx.completion_style(), Some(CompletionStyle::SyncDirect));
    assert!(!ctx.is_callback_style());
    assert_eq!(*log.lock(), EXPECTED);
}

fn assert_invoking(ctx: &InvocationContext) {
    assert_eq!(ctx.interaction_type(), Some(InteractionType::Invoke));
    assert!(ctx.is_target_invoked());
}

#[test]
fn test_sync_callback() {
    let (registry, op, log) = setup(InteractionStyle::Sync, Some(1));
    let endpoint = Endpoint::new(op, registry, |ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        let callback = ctx.callback().expect("callback bound");
        assert!(callback.ok(json!(7)).is_done());
        Ok(JsonValue::Null.into())
    });

    let (callback, received) = delivered();
    let ctx = InvocationContext::new(vec![json!("IBM").into(), callback.clone().into()]);
    let reply = endpoint.call_with(&ctx).unwrap();

    assert_eq!(reply.ready(), Some(Ok(json!(7))));
    assert_eq!(ctx.completion_style(), Some(CompletionStyle::SyncCallback));
    assert!(ctx.is_callback_style());
    assert_eq!(*received.lock(), vec![Ok(json!(7))]);
    assert!(!callback.is_bound());
    assert_eq!(*log.lock(), EXPECTED);
}

#[tokio::test]
async fn test_async_promise() {
    let (registry, op, log) = setup(InteractionStyle::Async, None);
    let endpoint = Endpoint::new(op, registry, |_ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        Ok(Returned::future(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(json!(9))
        }))
    });

    let ctx = InvocationContext::new(Vec::new());
    let reply = endpoint.call_with(&ctx).unwrap();
    assert!(!reply.is_ready());
    assert_eq!(*log.lock(), EXPECTED[..4]);

    assert_eq!(reply.resolve().await, Ok(json!(9)));
    assert_eq!(ctx.completion_style(), Some(CompletionStyle::AsyncPromise));
    assert_eq!(*log.lock(), EXPECTED);
}

#[tokio::test]
async fn test_async_promise_settles_only_after_the_future() {
    let (registry, op, log) = setup(InteractionStyle::Async, None);
    let (tx, rx) = tokio::sync::oneshot::channel::<JsonValue>();
    let rx = Arc::new(Mutex::new(Some(rx)));
    let endpoint = Endpoint::new(op, registry, move |_ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        let rx = rx.lock().take().expect("called once");
        Ok(Returned::future(async move {
            rx.await.map_err(|_| json!("sender dropped"))
        }))
    });

    let reply = endpoint.call(Vec::new()).unwrap();
    let handle = tokio::spawn(reply.resolve());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_finished());
    assert_eq!(log.lock().len(), 4);

    tx.send(json!("filled")).unwrap();
    assert_eq!(handle.await.unwrap(), Ok(json!("filled")));
    assert_eq!(*log.lock(), EXPECTED);
}

#[tokio::test]
async fn test_async_promise_rejection_is_a_business_fault() {
    let (registry, op, log) = setup(InteractionStyle::Async, None);
    let endpoint = Endpoint::new(op, registry, |_ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        Ok(Returned::future(async { Err(json!({"message": "market closed"})) }))
    });

    let fault = endpoint.call(Vec::new()).unwrap().resolve().await.unwrap_err();
    assert!(fault.is_biz_fault());
    assert_eq!(fault.error_code.as_deref(), Some(E_TARGET_FAILED));
    assert_eq!(fault.reason.as_deref(), Some("market closed"));
    assert_eq!(
        *log.lock(),
        ["a:init", "b:init", "a:request", "b:request", "b:fault", "a:fault"]
    );
}

#[tokio::test]
async fn test_async_callback() {
    let (registry, op, log) = setup(InteractionStyle::Async, Some(0));
    let parked: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(None));
    let slot = parked.clone();
    let endpoint = Endpoint::new(op, registry, move |ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        *slot.lock() = ctx.callback();
        Ok(JsonValue::Null.into())
    });

    let (callback, received) = delivered();
    let reply = endpoint.call(vec![callback.into()]).unwrap();
    let ctx = match &reply {
        Reply::Deferred(parked) => parked.context().clone(),
        other => panic!("expected a deferred reply, got {other:?}"),
    };
    assert_eq!(ctx.completion_style(), Some(CompletionStyle::AsyncCallback));
    assert_eq!(log.lock().len(), 4);
    assert!(received.lock().is_empty());

    let callback = parked.lock().take().expect("target kept its callback");
    let status = callback.ok(json!(11)).wait().await;
    assert_eq!(status.interaction_type, InteractionType::InvokeResult);
    assert_eq!(status.completion_style, Some(CompletionStyle::AsyncCallback));

    assert_eq!(reply.resolve().await, Ok(json!(11)));
    assert!(ctx.is_callback_style());
    assert_eq!(*received.lock(), vec![Ok(json!(11))]);
    assert_eq!(*log.lock(), EXPECTED);

    // A repeated completion only reaches the caller and reports the same status.
    let again = callback.ok(json!(12)).wait().await;
    assert_eq!(again, status);
    assert_eq!(received.lock().len(), 2);
    assert_eq!(*log.lock(), EXPECTED);
}

#[tokio::test]
async fn test_callback_wins_over_a_returned_future() {
    let (registry, op, log) = setup(InteractionStyle::Async, Some(0));
    let parked: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(None));
    let slot = parked.clone();
    let endpoint = Endpoint::new(op, registry, move |ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        *slot.lock() = ctx.callback();
        Ok(Returned::future(async { Ok(JsonValue::Null) }))
    });

    let (callback, received) = delivered();
    let reply = endpoint.call(vec![callback.into()]).unwrap();
    let Reply::Deferred(call) = reply else {
        panic!("expected the call to wait for its callback");
    };
    let ctx = call.context().clone();
    assert_eq!(ctx.completion_style(), Some(CompletionStyle::AsyncCallback));
    assert_eq!(ctx.status(), None);
    assert_eq!(log.lock().len(), 4);

    let callback = parked.lock().take().expect("target kept its callback");
    assert!(callback.ok(json!(42)).is_done());

    assert_eq!(call.settled().await, Ok(json!(42)));
    assert_eq!(*received.lock(), vec![Ok(json!(42))]);
    assert_eq!(*log.lock(), EXPECTED);
}

#[tokio::test]
async fn test_future_beside_the_callback_still_runs() {
    let (registry, op, _log) = setup(InteractionStyle::Async, Some(0));
    let parked: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(None));
    let ran = Arc::new(Mutex::new(false));
    let slot = parked.clone();
    let flag = ran.clone();
    let endpoint = Endpoint::new(op, registry, move |ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        *slot.lock() = ctx.callback();
        let flag = flag.clone();
        Ok(Returned::future(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            *flag.lock() = true;
            Ok(json!("ignored"))
        }))
    });

    let reply = endpoint.call(vec![Callback::noop().into()]).unwrap();
    assert!(matches!(reply, Reply::Deferred(_)));
    let handle = tokio::spawn(reply.resolve());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(*ran.lock());
    assert!(!handle.is_finished());

    let callback = parked.lock().take().expect("target kept its callback");
    let _ = callback.ok(json!("filled"));
    assert_eq!(handle.await.unwrap(), Ok(json!("filled")));
}

#[tokio::test]
async fn test_async_callback_fault_argument() {
    let (registry, op, log) = setup(InteractionStyle::Async, Some(0));
    let endpoint = Endpoint::new(op, registry, |_ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        Ok(JsonValue::Null.into())
    });

    let (callback, received) = delivered();
    let reply = endpoint.call(vec![callback.clone().into()]).unwrap();
    let _ = callback.fail(json!("quote feed down"));

    let fault = reply.resolve().await.unwrap_err();
    assert!(fault.is_biz_fault());
    assert_eq!(fault.error_code.as_deref(), Some(E_CALLBACK_FAULT));
    assert_eq!(fault.details, json!("quote feed down"));
    assert_eq!(received.lock().len(), 1);
    assert_eq!(log.lock()[4..], ["b:fault", "a:fault"]);
}

#[test]
fn test_sync_operation_called_twice() {
    let (registry, op, log) = setup(InteractionStyle::Sync, None);
    let endpoint = Endpoint::new(op, registry, |ctx: &InvocationContext| -> Result<Returned, JsonValue> {
        Ok(ctx.arg(0).unwrap_or_default().into())
    });

    for n in 0..2 {
        let reply = endpoint.call(vec![json!(n).into()]).unwrap();
        assert_eq!(reply.ready(), Some(Ok(json!(n))));
    }

    let log = log.lock();
    let count = |entry: &str| log.iter().filter(|l| l.as_str() == entry).count();
    assert_eq!(count("a:request"), 2);
    assert_eq!(count("a:response"), 2);
    assert_eq!(count("b:request"), 2);
    assert_eq!(count("b:response"), 2);
}

#[test]
fn test_no_interceptors() {
    let endpoint = Endpoint::new(
        OperationMetadata::new("Stock", "getPrice"),
        Arc::new(InterceptorRegistry::new()),
        |_ctx: &InvocationContext| -> Result<Returned, JsonValue> { Ok(json!(1).into()) },
    );
    assert!(endpoint.prepare().is_ok());
    assert_eq!(endpoint.call(Vec::new()).unwrap().ready(), Some(Ok(json!(1))));
}
