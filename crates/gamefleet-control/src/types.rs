//! Configuration types for the fleet controller.

use std::time::Duration;

use crate::error::FleetError;

/// Tunable parameters of the control loop.
///
/// The two margins bound the target operating band: the controller scales up
/// when the aggregate capacity falls below `upscale_margin` and scales down
/// when it exceeds `downscale_margin`. Keeping a gap between them prevents
/// the loop from oscillating when capacity sits near one threshold.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Scale up when the committed aggregate capacity is below this value.
    pub upscale_margin: u32,
    /// Scale down when the committed aggregate capacity is above this value.
    pub downscale_margin: u32,
    /// Sleep between control cycles.
    pub poll_interval: Duration,
    /// Per-request timeout for the health reporter's client.
    pub health_timeout: Duration,
    /// Bound on waiting for a newly provisioned instance to become running.
    pub provision_timeout: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            upscale_margin: 2,
            downscale_margin: 10,
            poll_interval: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            provision_timeout: Duration::from_secs(180),
        }
    }
}

impl FleetConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `UPSCALE_MARGIN`: scale-up capacity threshold
    /// - `DOWNSCALE_MARGIN`: scale-down capacity threshold
    /// - `POLL_INTERVAL_SECS`: seconds between control cycles
    /// - `HEALTH_TIMEOUT_SECS`: per-request health check timeout
    /// - `PROVISION_TIMEOUT_SECS`: bound on waiting for a new instance
    ///
    /// Unset or unparseable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = parse_env("UPSCALE_MARGIN") {
            config.upscale_margin = val;
        }
        if let Some(val) = parse_env("DOWNSCALE_MARGIN") {
            config.downscale_margin = val;
        }
        if let Some(val) = parse_env("POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(val);
        }
        if let Some(val) = parse_env("HEALTH_TIMEOUT_SECS") {
            config.health_timeout = Duration::from_secs(val);
        }
        if let Some(val) = parse_env("PROVISION_TIMEOUT_SECS") {
            config.provision_timeout = Duration::from_secs(val);
        }

        config
    }

    /// Check the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// Returns `FleetError::Config` if `downscale_margin` is not strictly
    /// greater than `upscale_margin`, or if `poll_interval` is zero.
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.downscale_margin <= self.upscale_margin {
            return Err(FleetError::Config(format!(
                "downscale_margin ({}) must be greater than upscale_margin ({})",
                self.downscale_margin, self.upscale_margin
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(FleetError::Config(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FleetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.upscale_margin, 2);
        assert_eq!(config.downscale_margin, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn inverted_margins_rejected() {
        let config = FleetConfig {
            upscale_margin: 10,
            downscale_margin: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FleetError::Config(_))));
    }

    #[test]
    fn equal_margins_rejected() {
        let config = FleetConfig {
            upscale_margin: 5,
            downscale_margin: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let config = FleetConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
