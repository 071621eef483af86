//! End-to-end navigation scenarios.

mod common;

use common::{id_params, record_events, sample_router};
use pollster::block_on;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wayfarer::{
    middleware_fn, transition_path, Decision, ErrorCode, Middleware, MiddlewareFactory, Params,
    Router, RouterError, State,
};

#[test]
fn start_then_navigate_commits_and_notifies_once() {
    let router = sample_router();

    // start("/") with a default route resolves to home.
    let state = block_on(router.start("/")).unwrap();
    assert_eq!(state.name, "home");
    assert_eq!(state.path, "/home");

    let events = record_events(&router);
    let state = block_on(router.navigate("users.view", id_params("42"))).unwrap();

    assert_eq!(state.name, "users.view");
    assert_eq!(state.path, "/users/view/42");
    assert_eq!(
        *events.lock().unwrap(),
        vec!["TRANSITION_START", "TRANSITION_SUCCESS"]
    );
}

#[test]
fn middleware_redirect_commits_target_with_flag() {
    let router = sample_router();
    block_on(router.start("/")).unwrap();

    let factory: MiddlewareFactory = Arc::new(|_router: &Router| {
        Ok(Arc::new(middleware_fn(|to: &State, _from: Option<&State>| {
            if to.name == "users.list" {
                Decision::Redirect(State::new("home", Params::new(), String::new()))
            } else {
                Decision::Allow
            }
        })) as Arc<dyn Middleware>)
    });
    router.use_middleware(vec![factory]).unwrap();
    block_on(router.navigate("users.view", id_params("1"))).unwrap();

    let events = record_events(&router);
    let state = block_on(router.navigate("users.list", Params::new())).unwrap();

    assert_eq!(state.name, "home");
    assert!(state.is_redirected());
    let success_count = events
        .lock()
        .unwrap()
        .iter()
        .filter(|name| **name == "TRANSITION_SUCCESS")
        .count();
    assert_eq!(success_count, 1);
}

#[test]
fn middleware_batch_with_failing_factory_registers_nothing() {
    let router = sample_router();
    block_on(router.start("/")).unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let counting = |counter: Arc<AtomicUsize>| -> MiddlewareFactory {
        Arc::new(move |_router: &Router| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(
                Arc::new(middleware_fn(|_: &State, _: Option<&State>| true))
                    as Arc<dyn Middleware>,
            )
        })
    };
    let failing: MiddlewareFactory = Arc::new(|_router: &Router| {
        Err(RouterError::new(ErrorCode::InvalidOption).with_message("broken factory"))
    });

    let result = router.use_middleware(vec![
        counting(invocations.clone()),
        counting(invocations.clone()),
        failing,
        counting(invocations.clone()),
    ]);

    assert!(result.is_err());
    // Factories one and two ran once each; the fourth never ran.
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // The registry is unchanged: a later valid registration works and the
    // pipeline still runs.
    router
        .use_middleware(vec![counting(invocations.clone())])
        .unwrap();
    assert!(block_on(router.navigate("users.view", id_params("9"))).is_ok());
}

#[test]
fn build_match_round_trip_preserves_declared_params() {
    let router = sample_router();
    block_on(router.start("/")).unwrap();

    let path = router.build_path("users.view", id_params("42")).unwrap();
    let matched = router.match_path(&path).unwrap();

    assert_eq!(matched.name, "users.view");
    assert_eq!(matched.params.get_str("id"), Some("42"));
}

#[test]
fn transition_path_properties_hold() {
    let router = sample_router();
    block_on(router.start("/")).unwrap();

    let from = router.build_state("users.view", id_params("1")).unwrap();
    let to = router.build_state("users.list", Params::new()).unwrap();

    let diff = transition_path(&to, Some(&from));

    // The intersection prefixes both names.
    assert!(from.name.starts_with(&diff.intersection));
    assert!(to.name.starts_with(&diff.intersection));
    // Activation lists exactly the segments of `to` below the intersection.
    assert_eq!(diff.to_activate, vec!["users.list".to_string()]);
    // Deactivation lists exactly the segments of `from` below it, deepest first.
    assert_eq!(diff.to_deactivate, vec!["users.view".to_string()]);
}

#[test]
fn superseding_navigation_cancels_the_first() {
    let router = sample_router();
    block_on(router.start("/")).unwrap();

    let gate: Arc<Mutex<Option<futures::channel::oneshot::Receiver<()>>>> =
        Arc::new(Mutex::new(None));
    let (tx, rx) = futures::channel::oneshot::channel::<()>();
    *gate.lock().unwrap() = Some(rx);

    let gate_for_guard = gate.clone();
    router
        .add_activate_guard(
            "users.view",
            wayfarer::async_guard_fn(move |_: &State, _: Option<&State>| {
                let gate = gate_for_guard.clone();
                async move {
                    let rx = gate.lock().unwrap().take();
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok(Decision::Allow)
                }
            }),
        )
        .unwrap();

    let events = record_events(&router);

    block_on(async {
        let first = router.navigate("users.view", id_params("1"));
        futures::pin_mut!(first);
        // Drive the first navigation into its pending guard.
        assert!(futures::poll!(first.as_mut()).is_pending());

        // The second navigation supersedes it.
        let second = router.navigate("users.list", Params::new()).await.unwrap();
        assert_eq!(second.name, "users.list");

        // Release the gate; the first navigation must now observe
        // cancellation instead of committing.
        let _ = tx.send(());
        let err = first.await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransitionCancelled);
    });

    assert_eq!(router.get_state().unwrap().name, "users.list");

    let log = events.lock().unwrap();
    // One success (the survivor), one cancel (the superseded), and no
    // success event for the cancelled target.
    assert_eq!(
        log.iter().filter(|name| **name == "TRANSITION_SUCCESS").count(),
        1
    );
    assert_eq!(
        log.iter().filter(|name| **name == "TRANSITION_CANCEL").count(),
        1
    );
}

#[test]
fn options_value_is_referentially_stable() {
    let router = sample_router();
    let first = router.get_options();
    let second = router.get_options();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn unsubscribe_called_repeatedly_removes_once() {
    let router = sample_router();
    block_on(router.start("/")).unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let handle = router
        .subscribe_fn(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(handle.call());
    assert!(!handle.call());
    assert!(!handle.call());

    block_on(router.navigate("users.list", Params::new())).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}
