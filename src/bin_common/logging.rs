//! Logging initialization for binaries

use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with formatted output
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A second init (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing("debug");
        init_tracing("info");
        tracing::info!("still logging");
    }
}
