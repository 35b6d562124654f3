use crate::config::Config;
use carousel_bridge::upstream_request::UpstreamTarget;
use log::{error, info};

pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

pub fn validate(config: &Config) -> bool {
    info!("Starting configuration validation...");

    // --- Validate Log level ---
    if !VALID_LOG_LEVELS
        .iter()
        .any(|lvl| lvl.eq_ignore_ascii_case(&config.log.level))
    {
        error!("Invalid log level: {}", config.log.level);
        return false;
    }

    // --- Validate listen address ---
    if config.listen.address.is_empty() {
        error!("Listen address is empty");
        return false;
    }

    // --- Validate listen port ---
    if config.listen.port == 0 || config.listen.port > 65535 {
        error!(
            "Invalid listen port: {} (must be between 1 and 65535)",
            config.listen.port
        );
        return false;
    }

    // --- Validate forward timeout ---
    if config.forward_timeout_ms == 0 {
        error!("Forward timeout is invalid (0)");
        return false;
    }

    // --- Validate backends ---
    if config.backends.is_empty() {
        error!("No backends configured");
        return false;
    }

    for (index, backend) in config.backends.iter().enumerate() {
        let address = backend.address();
        if address.is_empty() {
            error!("Backend address is missing for backend #{}", index);
            return false;
        }

        if let Err(err) = UpstreamTarget::parse(address) {
            error!("Backend address '{}' is invalid: {}", address, err);
            return false;
        }
    }

    info!("Configuration validation passed successfully");

    true
}
