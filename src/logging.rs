use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber, writing to stderr so stdout stays free for
/// command output. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) -> Result<(), TryInitError> {
    let default_filter = format!("nestegg={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init()?;

    tracing::debug!(level, "logging initialized");
    Ok(())
}
