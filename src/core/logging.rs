use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a global `tracing` subscriber filtered by `level`
/// (an `EnvFilter` directive such as `"info"` or `"ironkey_core=debug"`).
///
/// `RUST_LOG` wins over `level` when set. Returns `false` when a subscriber
/// was already installed, by this crate or by the host process.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
