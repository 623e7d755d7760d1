//! Types for the provisioning crate.

use serde::{Deserialize, Serialize};

/// Configuration for the Kubernetes provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Kubernetes namespace for game server pods.
    pub namespace: String,
    /// Container image for the game server.
    pub image: String,
    /// Instance class label value; all pods of one fleet share it and the
    /// registry is rebuilt at startup from pods carrying it.
    pub instance_class: String,
    /// Container port the game server listens on.
    pub game_port: u16,
    /// CPU allocation in millicores.
    pub cpu_millicores: u32,
    /// Memory allocation in megabytes.
    pub memory_mb: u32,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            namespace: "game-servers".to_string(),
            image: "ghcr.io/gamefleet/game-server:latest".to_string(),
            instance_class: "default".to_string(),
            game_port: 7777,
            cpu_millicores: 1000,
            memory_mb: 1024,
        }
    }
}

impl ProvisionerConfig {
    /// Create a new provisioner config with the given namespace.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `GAME_NAMESPACE`: Kubernetes namespace for game server pods
    /// - `GAME_SERVER_IMAGE`: Container image for the game server
    /// - `INSTANCE_CLASS`: Instance class label value for this fleet
    /// - `GAME_PORT`: Container port the game server listens on
    /// - `GAME_CPU_MILLICORES`: CPU allocation
    /// - `GAME_MEMORY_MB`: Memory allocation
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GAME_NAMESPACE") {
            config.namespace = val;
        }
        if let Ok(val) = std::env::var("GAME_SERVER_IMAGE") {
            config.image = val;
        }
        if let Ok(val) = std::env::var("INSTANCE_CLASS") {
            config.instance_class = val;
        }
        if let Ok(val) = std::env::var("GAME_PORT") {
            if let Ok(n) = val.parse() {
                config.game_port = n;
            }
        }
        if let Ok(val) = std::env::var("GAME_CPU_MILLICORES") {
            if let Ok(n) = val.parse() {
                config.cpu_millicores = n;
            }
        }
        if let Ok(val) = std::env::var("GAME_MEMORY_MB") {
            if let Ok(n) = val.parse() {
                config.memory_mb = n;
            }
        }

        config
    }
}
