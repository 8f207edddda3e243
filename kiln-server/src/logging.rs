use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &ServerConfig) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match config.log_level.parse::<EnvFilter>() {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!(
                    "WARN: KILN_LOG='{}' is not a valid tracing filter ({}); falling back to 'info'",
                    config.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_names(true);

    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
