use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,throttlekit=trace
pub fn init() {
    INIT.call_once(|| {
        // Create a filter based on the RUST_LOG environment variable
        // Default to 'info' level if not specified
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true) // Include module path in logs
                    .with_thread_ids(true) // Useful for debugging concurrency issues
                    .with_line_number(true),
            )
            .init();

        tracing::info!("Logging initialized");
    });
}

/// Macro for logging admission decisions
#[macro_export]
macro_rules! decision_event {
    ($algorithm:expr, $cost:expr, $allowed:expr, $remaining:expr) => {
        tracing::debug!(
            algorithm = $algorithm,
            cost = $cost,
            allowed = $allowed,
            remaining = $remaining,
            "Admission decision"
        )
    };
}

/// Macro for logging atomic store procedure calls
#[macro_export]
macro_rules! store_op {
    ($procedure:expr, $key:expr, $success:expr) => {
        tracing::debug!(
            procedure = ?$procedure,
            key = $key,
            success = $success,
            "Store procedure"
        )
    };
}
