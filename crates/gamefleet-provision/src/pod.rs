//! Pod specification builder for Kubernetes.
//!
//! This module provides helpers to construct Kubernetes pod specs for game
//! server pods with all necessary configuration.

use gamefleet_core::InstanceId;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, Pod, PodSpec, Probe, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

use crate::ProvisionerConfig;

/// Label identifying game server pods managed by this fleet controller.
pub const APP_LABEL: &str = "game-server";

/// Label key carrying the fleet's instance class.
pub const INSTANCE_CLASS_LABEL: &str = "gamefleet.io/instance-class";

/// Build a Kubernetes pod spec for a game server instance.
///
/// This creates a complete pod specification including:
/// - Fleet membership labels used for registry rebuild at startup
/// - Resource requests and limits
/// - Environment variables for instance configuration
/// - A readiness probe against the game server's health endpoint
#[must_use]
pub fn build_pod(instance_id: &InstanceId, config: &ProvisionerConfig) -> Pod {
    Pod {
        metadata: build_metadata(instance_id, config),
        spec: Some(build_pod_spec(instance_id, config)),
        ..Default::default()
    }
}

/// Generate a fresh pod name for a new instance.
///
/// The name doubles as the instance identifier; it must be unique per create.
#[must_use]
pub fn generate_instance_name() -> InstanceId {
    InstanceId::new(format!("gs-{}", uuid::Uuid::new_v4().simple()))
}

fn build_metadata(instance_id: &InstanceId, config: &ProvisionerConfig) -> ObjectMeta {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), APP_LABEL.to_string());
    labels.insert(
        INSTANCE_CLASS_LABEL.to_string(),
        config.instance_class.clone(),
    );

    let mut annotations = BTreeMap::new();
    annotations.insert(
        "gamefleet.io/created-at".to_string(),
        chrono::Utc::now().to_rfc3339(),
    );

    ObjectMeta {
        name: Some(instance_id.as_str().to_string()),
        namespace: Some(config.namespace.clone()),
        labels: Some(labels),
        annotations: Some(annotations),
        ..Default::default()
    }
}

fn build_pod_spec(instance_id: &InstanceId, config: &ProvisionerConfig) -> PodSpec {
    PodSpec {
        containers: vec![build_container(instance_id, config)],
        restart_policy: Some("Never".to_string()),
        termination_grace_period_seconds: Some(30),
        ..Default::default()
    }
}

fn build_container(instance_id: &InstanceId, config: &ProvisionerConfig) -> Container {
    let port = i32::from(config.game_port);

    Container {
        name: "game-server".to_string(),
        image: Some(config.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: port,
            name: Some("game".to_string()),
            ..Default::default()
        }]),
        env: Some(build_env_vars(instance_id, config)),
        resources: Some(build_resources(config)),
        readiness_probe: Some(build_readiness_probe(port)),
        ..Default::default()
    }
}

fn build_env_vars(instance_id: &InstanceId, config: &ProvisionerConfig) -> Vec<EnvVar> {
    vec![
        EnvVar {
            name: "INSTANCE_ID".to_string(),
            value: Some(instance_id.as_str().to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "GAME_LISTEN_ADDR".to_string(),
            value: Some(format!("0.0.0.0:{}", config.game_port)),
            ..Default::default()
        },
    ]
}

fn build_resources(config: &ProvisionerConfig) -> ResourceRequirements {
    let cpu = Quantity(format!("{}m", config.cpu_millicores));
    let memory = Quantity(format!("{}Mi", config.memory_mb));

    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), cpu.clone());
    requests.insert("memory".to_string(), memory.clone());

    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), cpu);
    limits.insert("memory".to_string(), memory);

    ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

fn build_readiness_probe(port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/health/".to_string()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_format() {
        let id = generate_instance_name();
        assert!(id.as_str().starts_with("gs-"));
        assert_eq!(id.as_str().len(), 3 + 32); // "gs-" + simple uuid

        let other = generate_instance_name();
        assert_ne!(id, other);
    }

    #[test]
    fn build_pod_has_required_fields() {
        let id = InstanceId::new("gs-test");
        let config = ProvisionerConfig::default();

        let pod = build_pod(&id, &config);

        // Metadata
        let meta = &pod.metadata;
        assert_eq!(meta.name.as_deref(), Some("gs-test"));
        assert_eq!(meta.namespace.as_deref(), Some("game-servers"));

        let labels = meta.labels.as_ref().unwrap();
        assert_eq!(labels.get("app"), Some(&APP_LABEL.to_string()));
        assert_eq!(
            labels.get(INSTANCE_CLASS_LABEL),
            Some(&"default".to_string())
        );

        // Spec
        let pod_spec = pod.spec.as_ref().unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod_spec.termination_grace_period_seconds, Some(30));

        // Container
        let container = &pod_spec.containers[0];
        assert_eq!(container.name, "game-server");
        assert!(container.image.is_some());
        assert!(container.resources.is_some());
        assert!(container.readiness_probe.is_some());

        let ports = container.ports.as_ref().unwrap();
        assert_eq!(ports[0].container_port, 7777);

        let env = container.env.as_ref().unwrap();
        let env_names: Vec<_> = env.iter().map(|e| e.name.as_str()).collect();
        assert!(env_names.contains(&"INSTANCE_ID"));
        assert!(env_names.contains(&"GAME_LISTEN_ADDR"));
    }

    #[test]
    fn build_pod_uses_config_resources() {
        let id = InstanceId::new("gs-test");
        let config = ProvisionerConfig {
            cpu_millicores: 2000,
            memory_mb: 4096,
            ..Default::default()
        };

        let pod = build_pod(&id, &config);
        let container = &pod.spec.as_ref().unwrap().containers[0];
        let resources = container.resources.as_ref().unwrap();

        let requests = resources.requests.as_ref().unwrap();
        assert_eq!(requests.get("cpu"), Some(&Quantity("2000m".to_string())));
        assert_eq!(
            requests.get("memory"),
            Some(&Quantity("4096Mi".to_string()))
        );
    }

    #[test]
    fn readiness_probe_targets_health_endpoint() {
        let id = InstanceId::new("gs-test");
        let config = ProvisionerConfig::default();

        let pod = build_pod(&id, &config);
        let probe = pod.spec.as_ref().unwrap().containers[0]
            .readiness_probe
            .as_ref()
            .unwrap();
        let http_get = probe.http_get.as_ref().unwrap();

        assert_eq!(http_get.path.as_deref(), Some("/health/"));
        assert_eq!(http_get.port, IntOrString::Int(7777));
    }
}
