use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at `info`
/// (`debug` with `--verbose`, which includes response bodies) and
/// dependencies only at `warn`.
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default_directives = format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
