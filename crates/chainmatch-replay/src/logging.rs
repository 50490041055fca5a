//! Tracing initialisation for the replay binary.
//!
//! Library crates only emit `tracing` events; this is the one place a
//! subscriber is installed. `RUST_LOG` filters as usual
//! (e.g. `RUST_LOG=chainmatch_engine=debug`).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber.
///
/// `json` selects machine-readable output; otherwise logs are compact
/// human-readable lines. Everything goes to stderr so stdout carries only
/// the replay summary.
pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        registry.with(json_layer).init();
    } else {
        let compact_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(compact_layer).init();
    }
}
