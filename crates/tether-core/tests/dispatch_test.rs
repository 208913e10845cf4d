#![allow(clippy::unwrap_used)]
// Integration tests for handler registration and dispatch.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{counting, error_recorder};
use tether_api::EventSink;
use tether_core::{
    CoreError, Dispatcher, Event, EventArgs, Handler, HandlerError, HandlerPanic,
};

const GRACE: Duration = Duration::from_secs(2);

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Handler {
    let log = Arc::clone(log);
    Handler::new(move |_| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(tag);
            Ok(())
        }
    })
}

fn failing(message: &'static str) -> Handler {
    Handler::new(move |_| async move { Err(HandlerError::from(message)) })
}

#[tokio::test]
async fn primary_and_listeners_all_run_in_registration_order() {
    let dispatcher = Dispatcher::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    dispatcher.add_listener(Some("message"), recorder(&log, "first")).unwrap();
    dispatcher.set_primary(Some("on_message"), recorder(&log, "primary")).unwrap();
    dispatcher.add_listener(Some("MESSAGE"), recorder(&log, "second")).unwrap();

    let scheduled = dispatcher.dispatch("on_message", EventArgs::Payload(json!({ "id": 1 })));
    assert_eq!(scheduled, 3);
    assert!(dispatcher.wait_idle(GRACE).await);

    assert_eq!(*log.lock().unwrap(), vec!["primary", "first", "second"]);
}

#[tokio::test]
async fn dispatch_returns_before_handlers_finish() {
    let dispatcher = Dispatcher::new();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));

    dispatcher
        .set_primary(
            Some("slow"),
            Handler::new(move |_| {
                let rx = Arc::clone(&rx);
                async move {
                    if let Some(rx) = rx.lock().await.take() {
                        let _ = rx.await;
                    }
                    Ok(())
                }
            }),
        )
        .unwrap();

    assert_eq!(dispatcher.dispatch("slow", EventArgs::Empty), 1);
    tokio::task::yield_now().await;
    assert_eq!(dispatcher.pending(), 1);

    tx.send(()).unwrap();
    assert!(dispatcher.wait_idle(GRACE).await);
    assert_eq!(dispatcher.pending(), 0);
}

#[tokio::test]
async fn failing_handler_is_reported_to_error_event() {
    let dispatcher = Dispatcher::new();
    let origins = Arc::new(Mutex::new(Vec::new()));
    let messages = Arc::new(Mutex::new(Vec::new()));

    dispatcher.set_primary(Some("error"), error_recorder(&origins)).unwrap();
    dispatcher
        .add_listener(Some("error"), {
            let messages = Arc::clone(&messages);
            Handler::new(move |event: Arc<Event>| {
                let messages = Arc::clone(&messages);
                async move {
                    let ctx = event.error().unwrap();
                    messages.lock().unwrap().push(ctx.error.to_string());
                    Ok(())
                }
            })
        })
        .unwrap();
    dispatcher.set_primary(Some("message_create"), failing("bad payload")).unwrap();

    dispatcher.dispatch("on_message_create", EventArgs::Empty);
    wait_for(|| origins.lock().unwrap().len() == 1).await;
    assert!(dispatcher.wait_idle(GRACE).await);

    assert_eq!(*origins.lock().unwrap(), vec!["message_create".to_owned()]);
    assert_eq!(*messages.lock().unwrap(), vec!["bad payload".to_owned()]);
}

#[tokio::test]
async fn panicking_handler_is_reported_as_handler_panic() {
    let dispatcher = Dispatcher::new();
    let panics = Arc::new(Mutex::new(Vec::new()));

    dispatcher
        .set_primary(Some("boom"), Handler::new(|_| async { panic!("kaboom") }))
        .unwrap();
    dispatcher
        .set_primary(Some("error"), {
            let panics = Arc::clone(&panics);
            Handler::new(move |event: Arc<Event>| {
                let panics = Arc::clone(&panics);
                async move {
                    let ctx = event.error().unwrap();
                    let panic = ctx.error.downcast_ref::<HandlerPanic>().unwrap();
                    panics.lock().unwrap().push(panic.0.clone());
                    Ok(())
                }
            })
        })
        .unwrap();

    dispatcher.dispatch("boom", EventArgs::Empty);
    wait_for(|| panics.lock().unwrap().len() == 1).await;

    assert_eq!(*panics.lock().unwrap(), vec!["kaboom".to_owned()]);
}

#[tokio::test]
async fn failing_error_handler_does_not_loop() {
    let dispatcher = Dispatcher::new();
    let calls = Arc::new(AtomicUsize::new(0));

    dispatcher
        .set_primary(Some("error"), {
            let calls = Arc::clone(&calls);
            Handler::new(move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(HandlerError::from("error handler broke"))
                }
            })
        })
        .unwrap();
    dispatcher.set_primary(Some("ready"), failing("nope")).unwrap();

    dispatcher.dispatch("ready", EventArgs::Empty);
    assert!(dispatcher.wait_idle(GRACE).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.pending(), 0);
}

#[tokio::test]
async fn error_without_handler_is_only_logged() {
    let dispatcher = Dispatcher::new();
    dispatcher.set_primary(Some("ready"), failing("nope")).unwrap();

    assert_eq!(dispatcher.dispatch("ready", EventArgs::Empty), 1);
    assert!(dispatcher.wait_idle(GRACE).await);
    assert_eq!(dispatcher.dispatch_error("run", Arc::new(CoreError::Timeout)), 0);
}

#[tokio::test]
async fn once_listener_runs_a_single_time() {
    let dispatcher = Dispatcher::new();
    let count = Arc::new(AtomicUsize::new(0));

    dispatcher.add_listener_once(Some("ready"), counting(&count)).unwrap();
    assert_eq!(dispatcher.dispatch("ready", EventArgs::Empty), 1);
    assert_eq!(dispatcher.dispatch("ready", EventArgs::Empty), 0);
    assert!(dispatcher.wait_idle(GRACE).await);

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(dispatcher.names().is_empty());
}

#[tokio::test]
async fn duplicate_listener_runs_once_per_dispatch() {
    let dispatcher = Dispatcher::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = counting(&calls);

    dispatcher.add_listener(Some("message_create"), handler.clone()).unwrap();
    dispatcher.add_listener(Some("message_create"), handler).unwrap();

    assert_eq!(dispatcher.dispatch("message_create", EventArgs::Empty), 1);
    assert!(dispatcher.wait_idle(GRACE).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn removed_listener_no_longer_runs() {
    let dispatcher = Dispatcher::new();
    let count = Arc::new(AtomicUsize::new(0));
    let handler = counting(&count);

    dispatcher.add_listener(Some("typing_start"), handler.clone()).unwrap();
    // Same handler twice is one registration.
    dispatcher.add_listener(Some("on_typing_start"), handler.clone()).unwrap();
    assert_eq!(dispatcher.handlers_for("typing_start").len(), 1);

    assert!(dispatcher.remove_listener("typing_start", &handler));
    assert!(!dispatcher.remove_listener("typing_start", &handler));
    assert_eq!(dispatcher.dispatch("typing_start", EventArgs::Empty), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn registration_uses_handler_name_or_rejects() {
    let dispatcher = Dispatcher::new();

    let named = Handler::named("on_Guild_Create", |_| async { Ok(()) });
    assert_eq!(dispatcher.set_primary(None, named).unwrap(), "guild_create");
    assert!(dispatcher.has_primary("GUILD_CREATE"));

    let anonymous = Handler::new(|_| async { Ok(()) });
    let err = dispatcher.add_listener(None, anonymous.clone()).unwrap_err();
    assert!(matches!(err, CoreError::UnnamedHandler));
    let err = dispatcher.add_listener(Some("  on_ "), anonymous).unwrap_err();
    assert!(matches!(err, CoreError::UnnamedHandler));
}

#[tokio::test]
async fn event_sink_emit_dispatches_payload() {
    let dispatcher = Dispatcher::new();
    let seen = Arc::new(Mutex::new(None));

    dispatcher
        .set_primary(Some("guild_create"), {
            let seen = Arc::clone(&seen);
            Handler::new(move |event: Arc<Event>| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = event.payload().cloned();
                    Ok(())
                }
            })
        })
        .unwrap();

    let sink: Arc<dyn EventSink> = Arc::new(dispatcher.clone());
    sink.emit("on_guild_create", json!({ "id": "42" }));
    assert!(dispatcher.wait_idle(GRACE).await);

    assert_eq!(*seen.lock().unwrap(), Some(json!({ "id": "42" })));
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(GRACE, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap();
}
