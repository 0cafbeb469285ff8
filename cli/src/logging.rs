use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "warn";

/// `FITZY_LOG` wins over `RUST_LOG`. Logs go to stderr so `--json` output on
/// stdout stays parseable.
pub fn init() {
    let filter = EnvFilter::try_from_env("FITZY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
