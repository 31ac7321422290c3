//! Wicket - WASM app module runtime bridge

use std::env;

use tracing_subscriber::EnvFilter;

use wicket::app::{self, HostCallbacks};
use wicket::config;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut config = config::load();

    // A single positional argument overrides the configured resource base.
    let args: Vec<String> = env::args().collect();
    if let Some(base) = args.get(1) {
        tracing::info!(base, "resource base from command line");
        config.resources.base = Some(base.clone());
    }

    let mut callbacks = HostCallbacks::default();
    callbacks.on_load_progress = Some(Box::new(|core, audio| {
        tracing::info!(core, audio, "loading");
    }));

    if let Err(e) = app::run(config, callbacks) {
        tracing::error!("Bridge error: {}", e);
        std::process::exit(1);
    }
}
