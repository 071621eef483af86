//! Persistent query parameters.
//!
//! Some query parameters — a UI language, an A/B cohort, a tenant id — should
//! survive every navigation without each call site threading them through.
//! [`PersistentParamsPlugin`] keeps a sticky mapping for a fixed set of keys:
//!
//! - a parameter decorator injects the mapping into every path and state
//!   build (caller-supplied values always win);
//! - on every committed transition the mapping is refreshed from the target
//!   state's parameters, and a key explicitly set to
//!   [`Null`](crate::params::ParamValue::Null) is dropped from the mapping;
//! - the tracked keys are declared as query parameters on the route tree's
//!   root so the matching engine recognizes them on every route.
//!
//! Teardown removes the decorator, restores the root declarations, and
//! clears the mapping. A second installation attempt fails.
//!
//! # Example
//!
//! ```
//! use wayfarer::options::RouterOptions;
//! use wayfarer::params::Params;
//! use wayfarer::persistent::PersistentParamsPlugin;
//! use wayfarer::router::Router;
//! use wayfarer::tree::RouteDefinition;
//!
//! let router = Router::new(
//!     vec![
//!         RouteDefinition::new("home", "/home"),
//!         RouteDefinition::new("list", "/list"),
//!     ],
//!     RouterOptions::builder().default_route("home").build().unwrap(),
//! )
//! .unwrap();
//! router
//!     .use_plugin(vec![PersistentParamsPlugin::factory(vec!["lang".into()])])
//!     .unwrap();
//! pollster::block_on(router.start("/")).unwrap();
//!
//! let mut params = Params::new();
//! params.insert("lang", "en");
//! pollster::block_on(router.navigate("list", params)).unwrap();
//!
//! // The language sticks to later navigations.
//! assert_eq!(router.build_path("home", Params::new()).unwrap(), "/home?lang=en");
//! ```

use crate::params::Params;
use crate::plugin::Plugin;
use crate::registry::Unsubscribe;
use crate::router::{ParamsDecorator, PluginFactory, Router};
use crate::state::{NavigationOptions, State};
use crate::trace_log;
use std::sync::{Arc, Mutex};

/// Plugin keeping a sticky subset of query parameters.
pub struct PersistentParamsPlugin {
    router: Router,
    keys: Vec<String>,
    values: Mutex<Params>,
    decorator: Mutex<Option<Unsubscribe>>,
    previous_root_params: Vec<String>,
}

impl PersistentParamsPlugin {
    /// Produce the plugin factory for [`Router::use_plugin`], tracking the
    /// given query parameter keys.
    pub fn factory(keys: Vec<String>) -> PluginFactory {
        Arc::new(move |router: &Router| {
            router.claim_plugin_flag("PersistentParamsPlugin")?;

            let previous_root_params = router.root_query_params();
            let mut extended = previous_root_params.clone();
            for key in &keys {
                if !extended.contains(key) {
                    extended.push(key.clone());
                }
            }
            router.set_root_query_params(extended)?;

            let plugin = Arc::new(PersistentParamsPlugin {
                router: router.clone(),
                keys: keys.clone(),
                values: Mutex::new(Params::new()),
                decorator: Mutex::new(None),
                previous_root_params,
            });

            let weak = Arc::downgrade(&plugin);
            let decorator: ParamsDecorator = Arc::new(move |_name, params| {
                match weak.upgrade() {
                    // Sticky values underneath, caller values on top.
                    Some(plugin) => {
                        let sticky = plugin.values.lock().expect("sticky poisoned").clone();
                        Params::merge(&sticky, &params)
                    }
                    None => params,
                }
            });
            *plugin.decorator.lock().expect("decorator poisoned") =
                Some(router.add_params_decorator(decorator));

            Ok(plugin as Arc<dyn Plugin>)
        })
    }

    /// The current sticky mapping.
    pub fn persistent_params(&self) -> Params {
        self.values.lock().expect("sticky poisoned").clone()
    }
}

impl Plugin for PersistentParamsPlugin {
    fn name(&self) -> &'static str {
        "PersistentParamsPlugin"
    }

    fn on_transition_success(
        &self,
        to: &State,
        _from: Option<&State>,
        _options: &NavigationOptions,
    ) {
        let mut values = self.values.lock().expect("sticky poisoned");
        for key in &self.keys {
            match to.params.get(key) {
                Some(value) if value.is_null() => {
                    trace_log!("persistent param '{}' cleared", key);
                    values.remove(key);
                }
                Some(value) => {
                    values.insert(key.clone(), value.clone());
                }
                None => {}
            }
        }
    }

    fn teardown(&self) {
        if let Some(handle) = self.decorator.lock().expect("decorator poisoned").take() {
            handle.call();
        }
        let _ = self
            .router
            .set_root_query_params(self.previous_root_params.clone());
        *self.values.lock().expect("sticky poisoned") = Params::new();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RouterOptions;
    use crate::tree::RouteDefinition;
    use pollster::block_on;

    fn router_with_plugin() -> Router {
        let router = Router::new(
            vec![
                RouteDefinition::new("home", "/home"),
                RouteDefinition::new("users", "/users").with_children(vec![
                    RouteDefinition::new("list", "/list"),
                ]),
            ],
            RouterOptions::builder().default_route("home").build().unwrap(),
        )
        .unwrap();
        router
            .use_plugin(vec![PersistentParamsPlugin::factory(vec!["lang".into()])])
            .unwrap();
        block_on(router.start("/")).unwrap();
        router
    }

    fn lang(value: &str) -> Params {
        let mut params = Params::new();
        params.insert("lang", value);
        params
    }

    #[test]
    fn test_param_sticks_across_navigations() {
        let router = router_with_plugin();

        let state = block_on(router.navigate("users.list", lang("en"))).unwrap();
        assert_eq!(state.path, "/users/list?lang=en");

        let state = block_on(router.navigate("home", Params::new())).unwrap();
        assert_eq!(state.path, "/home?lang=en");
    }

    #[test]
    fn test_caller_value_wins() {
        let router = router_with_plugin();
        block_on(router.navigate("users.list", lang("en"))).unwrap();

        let state = block_on(router.navigate("home", lang("fr"))).unwrap();
        assert_eq!(state.path, "/home?lang=fr");

        // And the override becomes the new sticky value.
        let state = block_on(router.navigate("users.list", Params::new())).unwrap();
        assert_eq!(state.path, "/users/list?lang=fr");
    }

    #[test]
    fn test_unset_removes_sticky_value() {
        let router = router_with_plugin();
        block_on(router.navigate("users.list", lang("en"))).unwrap();

        let mut params = Params::new();
        params.unset("lang");
        let state = block_on(router.navigate("home", params)).unwrap();
        assert_eq!(state.path, "/home");

        let state = block_on(router.navigate("users.list", Params::new())).unwrap();
        assert_eq!(state.path, "/users/list");
    }

    #[test]
    fn test_build_path_injects_sticky_params() {
        let router = router_with_plugin();
        block_on(router.navigate("users.list", lang("en"))).unwrap();

        assert_eq!(
            router.build_path("home", Params::new()).unwrap(),
            "/home?lang=en"
        );
    }

    #[test]
    fn test_double_install_rejected() {
        let router = router_with_plugin();
        let again = router.use_plugin(vec![PersistentParamsPlugin::factory(vec![
            "lang".into(),
        ])]);
        assert!(again.is_err());
    }

    #[test]
    fn test_teardown_restores_everything() {
        let router = Router::new(
            vec![RouteDefinition::new("home", "/home")],
            RouterOptions::builder().default_route("home").build().unwrap(),
        )
        .unwrap();
        let handle = router
            .use_plugin(vec![PersistentParamsPlugin::factory(vec!["lang".into()])])
            .unwrap();
        block_on(router.start("/")).unwrap();
        block_on(router.navigate_with(
            "home",
            lang("en"),
            crate::state::NavigationOptions {
                force: true,
                ..Default::default()
            },
        ))
        .unwrap();

        handle.call();

        // Decorator gone, root declarations restored: lang is no longer
        // recognized or injected.
        assert_eq!(router.build_path("home", Params::new()).unwrap(), "/home");
    }
}
