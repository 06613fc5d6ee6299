//! Tracing setup for the CLI.
//!
//! Diagnostics go to stderr so stdout stays clean for command output
//! (`ppctl token` is meant to be piped). Verbosity is controlled with
//! `RUST_LOG`; the default only surfaces warnings.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry().with(filter).with(fmt).init();
}
