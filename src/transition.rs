//! The transition pipeline.
//!
//! Carries a navigation from candidate state to committable state through the
//! ordered lifecycle phases:
//!
//! ```text
//! CAN_DEACTIVATE (deactivated segments, deepest first)
//!   → CAN_ACTIVATE (activated segments, shallowest first)
//!     → MIDDLEWARE (registration order)
//!       → commit handoff
//! ```
//!
//! The pipeline is result-typed throughout: every phase returns
//! `RouterResult<_>`, and cancellation is the `TRANSITION_CANCELLED` error
//! code rather than a side channel. The cancellation token is polled before
//! every hook invocation and once more before handing the final state back
//! for commit — each `await` is a suspension point, and a newer navigation
//! may have superseded this one while a hook was pending.
//!
//! Error discipline per phase:
//!
//! - a hook returning `Deny` fails with the phase's code
//!   (`CANNOT_DEACTIVATE`, `CANNOT_ACTIVATE`, `TRANSITION_ERR`);
//! - a hook returning `Err` has the error's code overwritten to the phase's
//!   code and re-thrown with the segment attached;
//! - a guard returning a state with a **different** route name is rejected —
//!   guards cannot redirect, that is middleware's job;
//! - middleware returning a different-name state restarts the pipeline at
//!   the new target with the `redirected` flag set, up to
//!   [`MAX_REDIRECT_DEPTH`] times.

use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::guards::{Decision, Guard, GuardKind};
use crate::logging::Logger;
use crate::middleware::Middleware;
use crate::navigation::CancellationToken;
use crate::params::Params;
use crate::state::{transition_path, State};
use crate::{debug_log, trace_log};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum middleware redirect chain before the transition fails.
pub const MAX_REDIRECT_DEPTH: usize = 5;

/// Everything a single transition run needs, snapshotted at entry so
/// mid-flight registry changes cannot affect it.
pub struct TransitionEnv {
    /// Token of the navigation this transition belongs to.
    pub token: CancellationToken,
    /// Activation guards keyed by segment name.
    pub activate_guards: HashMap<String, Arc<dyn Guard>>,
    /// Deactivation guards keyed by segment name.
    pub deactivate_guards: HashMap<String, Arc<dyn Guard>>,
    /// Middleware in registration order.
    pub middleware: Vec<Arc<dyn Middleware>>,
    /// Log sink for non-fatal anomalies.
    pub logger: Logger,
}

/// Run the pipeline for a candidate state.
///
/// `build_redirect` turns a middleware-returned state (name + params) into a
/// fully built state carrying fresh metadata with the `redirected` flag.
/// Returns the state to commit; the caller performs the atomic commit and
/// event emission.
pub async fn run_transition<F>(
    to: State,
    from: Option<&State>,
    env: &TransitionEnv,
    build_redirect: F,
) -> RouterResult<State>
where
    F: Fn(&State) -> RouterResult<State>,
{
    let mut target = to;
    let mut redirects = 0usize;

    loop {
        let path = transition_path(&target, from);
        debug_log!(
            "transition {} -> {}: activate {:?}, deactivate {:?}",
            from.map_or("(none)", |state| state.name.as_str()),
            target.name,
            path.to_activate,
            path.to_deactivate
        );

        // Phase 1: deactivation guards, deepest first.
        for segment in &path.to_deactivate {
            target = run_guard(
                env,
                GuardKind::Deactivate,
                segment,
                target,
                from,
            )
            .await?;
        }

        // Phase 2: activation guards, shallowest first.
        for segment in &path.to_activate {
            target = run_guard(env, GuardKind::Activate, segment, target, from).await?;
        }

        // Phase 3: middleware, registration order.
        let mut redirect_target = None;
        for middleware in &env.middleware {
            ensure_live(env)?;
            trace_log!("middleware '{}' for '{}'", middleware.name(), target.name);
            let decision = middleware
                .run(&target, from)
                .resolve()
                .await
                .map_err(|error| error.with_code(ErrorCode::TransitionErr))?;

            match decision {
                Decision::Allow => {}
                Decision::Deny => {
                    return Err(RouterError::new(ErrorCode::TransitionErr)
                        .with_message(format!("middleware '{}' denied", middleware.name())));
                }
                Decision::Redirect(state) if state.name == target.name => {
                    target = merge_refinement(target, state);
                }
                Decision::Redirect(state) => {
                    redirect_target = Some(state);
                    break;
                }
            }
        }

        if let Some(redirect) = redirect_target {
            redirects += 1;
            if redirects > MAX_REDIRECT_DEPTH {
                return Err(RouterError::new(ErrorCode::TransitionErr)
                    .with_redirect(redirect.name.clone())
                    .with_message(format!(
                        "redirect chain exceeds {MAX_REDIRECT_DEPTH} hops"
                    )));
            }
            debug_log!("middleware redirect: '{}' -> '{}'", target.name, redirect.name);
            target = build_redirect(&redirect)?;
            continue;
        }

        // Commit handoff.
        ensure_live(env)?;
        return Ok(target);
    }
}

/// Fail fast when the navigation has been superseded.
fn ensure_live(env: &TransitionEnv) -> RouterResult<()> {
    if env.token.is_cancelled() {
        return Err(env.token.cancellation_error());
    }
    Ok(())
}

/// Run one guard for one segment, applying the phase's error discipline.
async fn run_guard(
    env: &TransitionEnv,
    kind: GuardKind,
    segment: &str,
    target: State,
    from: Option<&State>,
) -> RouterResult<State> {
    ensure_live(env)?;

    let table = match kind {
        GuardKind::Activate => &env.activate_guards,
        GuardKind::Deactivate => &env.deactivate_guards,
    };
    let Some(guard) = table.get(segment) else {
        return Ok(target);
    };

    let phase_code = match kind {
        GuardKind::Activate => ErrorCode::CannotActivate,
        GuardKind::Deactivate => ErrorCode::CannotDeactivate,
    };

    trace_log!("guard '{}' on segment '{}'", guard.name(), segment);
    let decision = guard
        .check(&target, from)
        .resolve()
        .await
        .map_err(|error| attach_segment(error.with_code(phase_code), segment))?;

    match decision {
        Decision::Allow => Ok(target),
        Decision::Deny => Err(RouterError::new(phase_code).with_segment(segment)),
        Decision::Redirect(state) if state.name == target.name => {
            Ok(merge_refinement(target, state))
        }
        Decision::Redirect(state) => Err(RouterError::new(phase_code)
            .with_segment(segment)
            .with_redirect(state.name)
            .with_message("guards cannot redirect; use middleware")),
    }
}

fn attach_segment(error: RouterError, segment: &str) -> RouterError {
    if error.segment.is_some() {
        error
    } else {
        error.with_segment(segment)
    }
}

/// Fold a same-name refinement into the target: returned parameters win,
/// the returned path replaces the target's when present, metadata stays.
fn merge_refinement(target: State, refined: State) -> State {
    let params = Params::merge(&target.params, &refined.params);
    let path = if refined.path.is_empty() {
        target.path
    } else {
        refined.path
    };
    State {
        name: target.name,
        params,
        path,
        meta: target.meta,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::{async_guard_fn, guard_fn};
    use crate::middleware::middleware_fn;
    use crate::navigation::Navigation;
    use crate::state::StateMeta;
    use pollster::block_on;
    use std::sync::Mutex;

    fn meta_for(name: &str) -> StateMeta {
        let mut params = crate::state::SegmentParamSources::new();
        let mut cumulative = String::new();
        for part in name.split('.') {
            if !cumulative.is_empty() {
                cumulative.push('.');
            }
            cumulative.push_str(part);
            params.insert(cumulative.clone(), Default::default());
        }
        StateMeta {
            params,
            ..StateMeta::default()
        }
    }

    fn state(name: &str) -> State {
        State::new(name, Params::new(), format!("/{}", name.replace('.', "/")))
            .with_meta(meta_for(name))
    }

    fn env(nav: &Navigation) -> TransitionEnv {
        TransitionEnv {
            token: nav.begin(),
            activate_guards: HashMap::new(),
            deactivate_guards: HashMap::new(),
            middleware: Vec::new(),
            logger: Logger::silent(),
        }
    }

    fn no_redirect(state: &State) -> RouterResult<State> {
        let mut built = state.clone();
        let meta = built.meta.get_or_insert_with(StateMeta::default);
        meta.redirected = true;
        Ok(built)
    }

    #[test]
    fn test_plain_transition_passes_through() {
        let nav = Navigation::new();
        let env = env(&nav);
        let committed = block_on(run_transition(
            state("users.view"),
            Some(&state("home")),
            &env,
            no_redirect,
        ))
        .unwrap();
        assert_eq!(committed.name, "users.view");
    }

    #[test]
    fn test_deactivate_guard_blocks() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.deactivate_guards.insert(
            "users.view".to_string(),
            Arc::new(guard_fn(|_: &State, _: Option<&State>| false)),
        );

        let err = block_on(run_transition(
            state("home"),
            Some(&state("users.view")),
            &env,
            no_redirect,
        ))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CannotDeactivate);
        assert_eq!(err.segment.as_deref(), Some("users.view"));
    }

    #[test]
    fn test_activate_guard_blocks() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.activate_guards.insert(
            "users.view".to_string(),
            Arc::new(guard_fn(|_: &State, _: Option<&State>| false)),
        );

        let err = block_on(run_transition(
            state("users.view"),
            Some(&state("home")),
            &env,
            no_redirect,
        ))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CannotActivate);
    }

    #[test]
    fn test_guard_error_code_is_overwritten() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.activate_guards.insert(
            "users.view".to_string(),
            Arc::new(guard_fn(|_: &State, _: Option<&State>| {
                Err::<Decision, _>(RouterError::new(ErrorCode::InvalidOption).with_message("boom"))
            })),
        );

        let err = block_on(run_transition(
            state("users.view"),
            Some(&state("home")),
            &env,
            no_redirect,
        ))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CannotActivate);
        assert_eq!(err.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_guard_cannot_redirect() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.activate_guards.insert(
            "users.view".to_string(),
            Arc::new(guard_fn(|_: &State, _: Option<&State>| state("home"))),
        );

        let err = block_on(run_transition(
            state("users.view"),
            Some(&state("home")),
            &env,
            no_redirect,
        ))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CannotActivate);
        assert!(err.message.unwrap().contains("use middleware"));
    }

    #[test]
    fn test_guard_refines_params() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.activate_guards.insert(
            "users.view".to_string(),
            Arc::new(guard_fn(|to: &State, _: Option<&State>| {
                let mut refined = to.clone();
                refined.params.insert("tab", "posts");
                refined
            })),
        );

        let committed = block_on(run_transition(
            state("users.view"),
            Some(&state("home")),
            &env,
            no_redirect,
        ))
        .unwrap();
        assert_eq!(committed.params.get_str("tab"), Some("posts"));
    }

    #[test]
    fn test_guard_order_deactivate_deepest_first_then_activate() {
        let nav = Navigation::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut env = env(&nav);

        for segment in ["a", "a.b"] {
            let sink = order.clone();
            let tag = format!("deactivate:{segment}");
            env.deactivate_guards.insert(
                segment.to_string(),
                Arc::new(guard_fn(move |_: &State, _: Option<&State>| {
                    sink.lock().unwrap().push(tag.clone());
                    true
                })),
            );
        }
        for segment in ["x", "x.y"] {
            let sink = order.clone();
            let tag = format!("activate:{segment}");
            env.activate_guards.insert(
                segment.to_string(),
                Arc::new(guard_fn(move |_: &State, _: Option<&State>| {
                    sink.lock().unwrap().push(tag.clone());
                    true
                })),
            );
        }

        block_on(run_transition(
            state("x.y"),
            Some(&state("a.b")),
            &env,
            no_redirect,
        ))
        .unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec![
                "deactivate:a.b",
                "deactivate:a",
                "activate:x",
                "activate:x.y"
            ]
        );
    }

    #[test]
    fn test_middleware_redirect_restarts_pipeline() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.middleware.push(Arc::new(middleware_fn(
            |to: &State, _: Option<&State>| {
                if to.name == "users.list" {
                    Decision::Redirect(state("home"))
                } else {
                    Decision::Allow
                }
            },
        )));

        let committed = block_on(run_transition(
            state("users.list"),
            Some(&state("users.view")),
            &env,
            no_redirect,
        ))
        .unwrap();
        assert_eq!(committed.name, "home");
        assert!(committed.is_redirected());
    }

    #[test]
    fn test_redirect_loop_fails() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.middleware.push(Arc::new(middleware_fn(
            |to: &State, _: Option<&State>| {
                let other = if to.name == "a" { "b" } else { "a" };
                Decision::Redirect(state(other))
            },
        )));

        let err = block_on(run_transition(state("a"), None, &env, no_redirect)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TransitionErr);
        assert!(err.message.unwrap().contains("redirect chain"));
    }

    #[test]
    fn test_middleware_error_is_wrapped() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.middleware.push(Arc::new(middleware_fn(
            |_: &State, _: Option<&State>| {
                Err::<Decision, _>(RouterError::new(ErrorCode::RouteNotFound).with_message("inner"))
            },
        )));

        let err = block_on(run_transition(state("home"), None, &env, no_redirect)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TransitionErr);
        assert_eq!(err.message.as_deref(), Some("inner"));
    }

    #[test]
    fn test_cancellation_before_async_guard() {
        let nav = Navigation::new();
        let mut env = env(&nav);
        env.activate_guards.insert(
            "users.view".to_string(),
            Arc::new(async_guard_fn(|_: &State, _: Option<&State>| async {
                Ok(Decision::Allow)
            })),
        );

        // A newer navigation supersedes the captured token.
        nav.begin();

        let err = block_on(run_transition(
            state("users.view"),
            Some(&state("home")),
            &env,
            no_redirect,
        ))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TransitionCancelled);
    }
}
