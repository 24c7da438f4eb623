//! `deferred` - runs the deferred promise demo scenarios.
//!
//! ```text
//! deferred            run every scenario
//! deferred <name>     run one of: lazy, context, chain, reject
//! ```
//!
//! Logging goes to stderr; `RUST_LOG` wins over the `[logging] filter` from
//! `~/.deferred/config.toml`.

mod scenarios;

use std::env;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use deferred_config::RuntimeConfig;
use deferred_engine::EventLoop;

fn init_tracing(fallback: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    let config = RuntimeConfig::load().ok().flatten().unwrap_or_default();
    init_tracing(config.log_filter());

    let name = env::args().nth(1);
    let selected = scenarios::select(name.as_deref())?;
    let ev = EventLoop::with_config(config)?;

    for scenario in selected {
        let outcome = scenario.run(&ev)?;
        println!("{:<8} ok  {outcome}", scenario.name);
        tracing::debug!(scenario = scenario.name, summary = scenario.summary, "scenario passed");
    }
    Ok(())
}
