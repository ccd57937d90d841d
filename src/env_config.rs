//! Environment overrides for the demo binaries.
//!
//! The library itself never consults the environment. Binaries call
//! [`solver_config_from_env`] to layer `LEXMDP_*` variables over the
//! [`SolverConfig`] defaults, and [`init_thread_pool`] to size the global
//! rayon pool.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `LEXMDP_EPSILON` | convergence tolerance ε |
//! | `LEXMDP_LOOPING` | `true`/`false`: inner-loop partition solves |
//! | `LEXMDP_BACKEND` | `cpu` or `accelerator` |
//! | `LEXMDP_MAX_ITER` | outer sweep cap |
//! | `LEXMDP_THREADS` | rayon pool size (unset: rayon's default) |

use std::str::FromStr;

use crate::types::{BackendKind, SolverConfig};

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Backend name as accepted in `LEXMDP_BACKEND`.
pub fn backend_from_name(name: &str) -> Option<BackendKind> {
    match name {
        "cpu" => Some(BackendKind::Cpu),
        "accelerator" => Some(BackendKind::Accelerator),
        _ => None,
    }
}

/// Solver configuration with any `LEXMDP_*` overrides applied on top of the
/// defaults. Unset or unparsable variables leave the default in place.
pub fn solver_config_from_env() -> SolverConfig {
    let mut config = SolverConfig::default();
    if let Some(epsilon) = parse_var("LEXMDP_EPSILON") {
        config.epsilon = epsilon;
    }
    if let Some(looping) = parse_var("LEXMDP_LOOPING") {
        config.looping = looping;
    }
    if let Some(backend) = std::env::var("LEXMDP_BACKEND")
        .ok()
        .and_then(|s| backend_from_name(&s))
    {
        config.backend = backend;
    }
    if let Some(cap) = parse_var("LEXMDP_MAX_ITER") {
        config.max_iterations = Some(cap);
    }
    config
}

/// Size the global rayon pool from `LEXMDP_THREADS`. Returns the configured
/// count, or `None` when the variable is unset and rayon's default stands.
/// A pool that was already built elsewhere is left as is.
pub fn init_thread_pool() -> Option<usize> {
    let threads: usize = parse_var("LEXMDP_THREADS")?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
    Some(threads)
}
