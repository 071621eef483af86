//! Shared fixtures for the end-to-end suites.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use wayfarer::{Params, RouteDefinition, Router, RouterEvent, RouterOptions};

/// The route table most scenarios run against.
pub fn sample_routes() -> Vec<RouteDefinition> {
    vec![
        RouteDefinition::new("home", "/home"),
        RouteDefinition::new("users", "/users").with_children(vec![
            RouteDefinition::new("view", "/view/:id"),
            RouteDefinition::new("list", "/list"),
        ]),
    ]
}

/// A router over [`sample_routes`] with `home` as the default route.
pub fn sample_router() -> Router {
    Router::new(
        sample_routes(),
        RouterOptions::builder()
            .default_route("home")
            .build()
            .expect("valid options"),
    )
    .expect("valid routes")
}

/// Params with a single `id` entry.
pub fn id_params(id: &str) -> Params {
    let mut params = Params::new();
    params.insert("id", id);
    params
}

/// Subscribe an event-name recorder to the router.
pub fn record_events(router: &Router) -> Arc<Mutex<Vec<&'static str>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handle = router
        .subscribe_fn(move |event: &RouterEvent| {
            sink.lock().unwrap().push(event.name());
        })
        .expect("subscription accepted");
    // The recorder lives for the whole test.
    std::mem::forget(handle);
    events
}
