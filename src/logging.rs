//! Tracing setup for the `taskloop` binary.
//!
//! Reads `TASKLOOP_LOG` (same syntax as `RUST_LOG`). Defaults to `info`.
//! Output goes to stderr so it never mixes with the assistant's text on stdout.
//!
//! ```bash
//! TASKLOOP_LOG=taskloop=debug,taskloop_llm=debug taskloop run "fix the tests"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV_VAR: &str = "TASKLOOP_LOG";

pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
