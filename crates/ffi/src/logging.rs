// Logger setup for the host process

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Install the platform logger once; later calls are no-ops
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("Audiowave"),
            );
        }

        #[cfg(not(target_os = "android"))]
        {
            // RUST_LOG overrides the default level; another logger may already be installed
            let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .is_test(cfg!(test))
                .try_init();
        }
    });
}
