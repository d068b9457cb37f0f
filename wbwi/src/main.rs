#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wbwi::dump::{self, DumpConfig};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wbwi=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A path on the command line overrides WBWI_DUMP_INPUT.
    let config = match std::env::args_os().nth(1) {
        Some(input) => DumpConfig::from_env_with_input(input),
        None => DumpConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::debug!(
        "dumping {} as {:?}",
        config.input.display(),
        config.view
    );

    match dump::run(&config) {
        Ok(out) => print!("{out}"),
        Err(e) => {
            tracing::error!("Failed to dump {}: {e}", config.input.display());
            std::process::exit(1);
        }
    }
}
