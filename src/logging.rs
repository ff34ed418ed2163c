//! Tracing setup for the binaries.

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs at INFO and above by default; `RUST_LOG` overrides, e.g.
/// `RUST_LOG=rfnet::service=debug` to trace every read and write payload.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
