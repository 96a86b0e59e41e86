use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// Global flag to control per-unit debug logging
pub static FACTORY_DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Set per-unit debug logging on/off
pub fn set_factory_debug(enabled: bool) {
    FACTORY_DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
    tracing::info!(
        "🔧 Factory debug logging {}",
        if enabled { "ENABLED" } else { "DISABLED" }
    );
}

/// Check if per-unit debug logging is enabled
pub fn is_factory_debug_enabled() -> bool {
    FACTORY_DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Install the fmt subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Factory debug macro - only logs if factory debug is enabled
#[macro_export]
macro_rules! factory_debug {
    ($($arg:tt)*) => {
        if $crate::log::FACTORY_DEBUG_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_toggle() {
        set_factory_debug(true);
        assert!(is_factory_debug_enabled());
        factory_debug!("unit trace while enabled");
        set_factory_debug(false);
        assert!(!is_factory_debug_enabled());
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing("info");
        // The second install always loses to the first
        assert!(!init_tracing("debug"));
    }
}
