//! Structured logging setup.

use tracing::Level;

/// Install a global fmt subscriber at the given level.
///
/// Uses `try_init`, so calling it more than once is harmless; returns whether
/// this call installed the subscriber.
pub fn init_tracing(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Subscriber for unit tests: debug level, captured by the test harness.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}
