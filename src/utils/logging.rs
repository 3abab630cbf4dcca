use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber for the command line tool.
///
/// `RUST_LOG` takes precedence; otherwise the locator logs at `info`, or at
/// `debug` when `verbose` is set.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("strike_locator=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    // a second call keeps the subscriber already installed
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init();
}
