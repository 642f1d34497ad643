use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// `-v` count picks the default level; `RUST_LOG` overrides it per target.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .compact()
        .try_init();
}
