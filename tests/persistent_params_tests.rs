//! End-to-end sticky query parameter scenarios.

mod common;

use common::sample_router;
use pollster::block_on;
use wayfarer::persistent::PersistentParamsPlugin;
use wayfarer::Params;

fn lang(value: &str) -> Params {
    let mut params = Params::new();
    params.insert("lang", value);
    params
}

#[test]
fn tracked_param_sticks_until_unset() {
    let router = sample_router();
    router
        .use_plugin(vec![PersistentParamsPlugin::factory(vec!["lang".into()])])
        .unwrap();
    block_on(router.start("/")).unwrap();

    // Setting the tracked param makes it part of the committed path.
    let state = block_on(router.navigate("users.list", lang("en"))).unwrap();
    assert_eq!(state.path, "/users/list?lang=en");

    // It follows subsequent navigations untouched.
    let state = block_on(router.navigate("home", Params::new())).unwrap();
    assert_eq!(state.path, "/home?lang=en");

    // Explicitly unsetting removes it from the mapping.
    let mut params = Params::new();
    params.unset("lang");
    let state = block_on(router.navigate("users.list", params)).unwrap();
    assert_eq!(state.path, "/users/list");

    // And it stays gone.
    let state = block_on(router.navigate("home", Params::new())).unwrap();
    assert_eq!(state.path, "/home");
}

#[test]
fn sticky_params_reach_built_paths_and_states() {
    let router = sample_router();
    router
        .use_plugin(vec![PersistentParamsPlugin::factory(vec!["lang".into()])])
        .unwrap();
    block_on(router.start("/")).unwrap();
    block_on(router.navigate("users.list", lang("de"))).unwrap();

    assert_eq!(router.build_path("home", Params::new()).unwrap(), "/home?lang=de");

    let state = router.build_state("home", Params::new()).unwrap();
    assert_eq!(state.params.get_str("lang"), Some("de"));
}
