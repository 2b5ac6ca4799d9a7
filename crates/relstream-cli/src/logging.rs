//! Logging setup for the `relstream` binary.

use tracing_subscriber::EnvFilter;

/// Crates whose events `--log-level` controls.
const CRATES: &[&str] = &["relstream", "relstream_core", "relstream_sqlite", "relstream_types"];

/// Filter directives putting the relstream crates at `level` and every
/// other target at `warn`.
fn directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|krate| format!("{krate}={level}")));
    directives.join(",")
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
