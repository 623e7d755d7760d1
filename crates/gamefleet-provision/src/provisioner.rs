//! Kubernetes provisioner implementation.
//!
//! This module provides the [`Provisioner`] trait and the [`K8sProvisioner`]
//! which creates and destroys game server pods in a Kubernetes cluster.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::{info, warn};

use gamefleet_core::InstanceId;

use crate::pod::{build_pod, generate_instance_name, APP_LABEL, INSTANCE_CLASS_LABEL};
use crate::types::ProvisionerConfig;
use crate::{ProvisionError, Result};

/// Interval between pod status checks while waiting for the running state.
const RUNNING_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The `Provisioner` trait defines the interface for instance lifecycle
/// management against the cloud backend.
///
/// The fleet controller depends on this capability rather than any concrete
/// backend; the only network calls the control loop makes besides health
/// polling go through this trait.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Request creation of a new instance, returning its identifier.
    ///
    /// Creation is asynchronous on the backend side; the instance is not yet
    /// running when this returns. Use [`Provisioner::await_running`] to wait
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the creation request is rejected.
    async fn create_instance(&self) -> Result<InstanceId>;

    /// Block until the instance reaches the running state, then resolve and
    /// return its network endpoint (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Timeout` if the instance does not reach the
    /// running state within `timeout`, or `ProvisionError::MissingAddress`
    /// if it is running but no address can be resolved.
    async fn await_running(&self, instance_id: &InstanceId, timeout: Duration) -> Result<String>;

    /// Destroy an instance.
    ///
    /// Destroying an instance that no longer exists is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the destroy request fails.
    async fn destroy_instance(&self, instance_id: &InstanceId) -> Result<()>;

    /// List the identifiers of all existing instances of the configured
    /// instance class.
    ///
    /// Used once at process start to rebuild the in-memory registry.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_instances(&self) -> Result<Vec<InstanceId>>;
}

/// Kubernetes-based provisioner for game server pods.
pub struct K8sProvisioner {
    client: Client,
    config: ProvisionerConfig,
}

impl K8sProvisioner {
    /// Create a new Kubernetes provisioner.
    ///
    /// This will attempt to connect to the cluster using in-cluster config
    /// or kubeconfig file.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn new(config: ProvisionerConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ProvisionError::Config(format!("Failed to create K8s client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create a new provisioner with a pre-configured client.
    ///
    /// This is useful for testing with mock clients.
    #[must_use]
    pub fn with_client(client: Client, config: ProvisionerConfig) -> Self {
        Self { client, config }
    }

    /// Get a reference to the provisioner config.
    #[must_use]
    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Get the pods API client for the configured namespace.
    fn pods_api(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Extract the endpoint of a pod that is running and ready, if any.
    fn running_endpoint(pod: &Pod, game_port: u16) -> Option<String> {
        let status = pod.status.as_ref()?;

        if status.phase.as_deref() != Some("Running") || !Self::is_pod_ready(pod) {
            return None;
        }

        status
            .pod_ip
            .as_ref()
            .map(|ip| format!("{ip}:{game_port}"))
    }

    fn is_pod_ready(pod: &Pod) -> bool {
        pod.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            })
    }

    fn class_selector(&self) -> String {
        format!(
            "app={APP_LABEL},{INSTANCE_CLASS_LABEL}={}",
            self.config.instance_class
        )
    }
}

#[async_trait]
impl Provisioner for K8sProvisioner {
    async fn create_instance(&self) -> Result<InstanceId> {
        let instance_id = generate_instance_name();
        let pod = build_pod(&instance_id, &self.config);

        self.pods_api().create(&PostParams::default(), &pod).await?;

        info!(
            instance_id = %instance_id,
            class = %self.config.instance_class,
            "Created game server pod"
        );

        Ok(instance_id)
    }

    async fn await_running(&self, instance_id: &InstanceId, timeout: Duration) -> Result<String> {
        let pods = self.pods_api();
        let game_port = self.config.game_port;

        let wait = async {
            loop {
                match pods.get_opt(instance_id.as_str()).await? {
                    Some(pod) => {
                        if let Some(endpoint) = Self::running_endpoint(&pod, game_port) {
                            return Ok(endpoint);
                        }
                        // Pod exists but is not yet running and ready.
                        if pod
                            .status
                            .as_ref()
                            .and_then(|s| s.phase.as_deref())
                            .is_some_and(|p| p == "Failed" || p == "Succeeded")
                        {
                            return Err(ProvisionError::MissingAddress(
                                instance_id.to_string(),
                            ));
                        }
                    }
                    None => return Err(ProvisionError::PodNotFound(instance_id.to_string())),
                }
                tokio::time::sleep(RUNNING_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Timeout(instance_id.to_string())),
        }
    }

    async fn destroy_instance(&self, instance_id: &InstanceId) -> Result<()> {
        match self
            .pods_api()
            .delete(instance_id.as_str(), &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(instance_id = %instance_id, "Destroyed game server pod");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                warn!(instance_id = %instance_id, "Pod not found, already destroyed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_instances(&self) -> Result<Vec<InstanceId>> {
        let params = ListParams::default().labels(&self.class_selector());
        let pod_list = self.pods_api().list(&params).await?;

        Ok(pod_list
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .map(InstanceId::new)
            .collect())
    }
}

/// A mock provisioner for testing without a real Kubernetes cluster.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, Duration, InstanceId, ProvisionError, Provisioner, Result};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// A mock provisioner that tracks instances in memory.
    ///
    /// Each created instance is assigned a sequential identifier and a fake
    /// endpoint. Creation failures can be injected to exercise the control
    /// loop's failure paths.
    #[derive(Default)]
    pub struct MockProvisioner {
        inner: Mutex<MockInner>,
    }

    #[derive(Default)]
    struct MockInner {
        next: u32,
        endpoints: HashMap<InstanceId, String>,
        destroyed: Vec<InstanceId>,
        fail_create: bool,
    }

    impl MockProvisioner {
        /// Create a new mock provisioner.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Inject a pre-existing instance, as if it had been created before
        /// this process started.
        pub fn seed_instance(&self, endpoint: impl Into<String>) -> InstanceId {
            let mut inner = self.inner.lock();
            inner.next += 1;
            let id = InstanceId::new(format!("gs-mock-{}", inner.next));
            inner.endpoints.insert(id.clone(), endpoint.into());
            id
        }

        /// Make subsequent `create_instance` calls fail.
        pub fn set_fail_create(&self, fail: bool) {
            self.inner.lock().fail_create = fail;
        }

        /// Get the endpoint assigned to an instance, if it exists.
        #[must_use]
        pub fn endpoint_of(&self, instance_id: &InstanceId) -> Option<String> {
            self.inner.lock().endpoints.get(instance_id).cloned()
        }

        /// Get the number of live (created and not destroyed) instances.
        #[must_use]
        pub fn live_count(&self) -> usize {
            self.inner.lock().endpoints.len()
        }

        /// Get the identifiers of destroyed instances, in destruction order.
        #[must_use]
        pub fn destroyed(&self) -> Vec<InstanceId> {
            self.inner.lock().destroyed.clone()
        }
    }

    #[async_trait]
    impl Provisioner for MockProvisioner {
        async fn create_instance(&self) -> Result<InstanceId> {
            let mut inner = self.inner.lock();

            if inner.fail_create {
                return Err(ProvisionError::Config(
                    "injected creation failure".to_string(),
                ));
            }

            inner.next += 1;
            let id = InstanceId::new(format!("gs-mock-{}", inner.next));
            let endpoint = format!("10.0.0.{}:7777", inner.next);
            inner.endpoints.insert(id.clone(), endpoint);

            Ok(id)
        }

        async fn await_running(
            &self,
            instance_id: &InstanceId,
            _timeout: Duration,
        ) -> Result<String> {
            self.inner
                .lock()
                .endpoints
                .get(instance_id)
                .cloned()
                .ok_or_else(|| ProvisionError::PodNotFound(instance_id.to_string()))
        }

        async fn destroy_instance(&self, instance_id: &InstanceId) -> Result<()> {
            let mut inner = self.inner.lock();
            inner.endpoints.remove(instance_id);
            inner.destroyed.push(instance_id.clone());
            Ok(())
        }

        async fn list_instances(&self) -> Result<Vec<InstanceId>> {
            let mut ids: Vec<_> = self.inner.lock().endpoints.keys().cloned().collect();
            ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            Ok(ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProvisioner;
    use super::*;

    #[tokio::test]
    async fn mock_create_and_destroy() {
        let provisioner = MockProvisioner::new();

        let id = provisioner.create_instance().await.unwrap();
        assert_eq!(provisioner.live_count(), 1);

        let endpoint = provisioner
            .await_running(&id, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(endpoint.ends_with(":7777"));

        provisioner.destroy_instance(&id).await.unwrap();
        assert_eq!(provisioner.live_count(), 0);
        assert_eq!(provisioner.destroyed(), vec![id]);
    }

    #[tokio::test]
    async fn mock_create_failure_injection() {
        let provisioner = MockProvisioner::new();
        provisioner.set_fail_create(true);

        let result = provisioner.create_instance().await;
        assert!(matches!(result, Err(ProvisionError::Config(_))));
        assert_eq!(provisioner.live_count(), 0);

        provisioner.set_fail_create(false);
        assert!(provisioner.create_instance().await.is_ok());
    }

    #[tokio::test]
    async fn mock_await_unknown_instance() {
        let provisioner = MockProvisioner::new();
        let unknown = InstanceId::new("gs-unknown");

        let result = provisioner
            .await_running(&unknown, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ProvisionError::PodNotFound(_))));
    }

    #[tokio::test]
    async fn mock_list_and_seed() {
        let provisioner = MockProvisioner::new();

        let a = provisioner.seed_instance("10.1.0.1:7777");
        let b = provisioner.create_instance().await.unwrap();

        let listed = provisioner.list_instances().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&a));
        assert!(listed.contains(&b));

        assert_eq!(
            provisioner.endpoint_of(&a),
            Some("10.1.0.1:7777".to_string())
        );
    }
}
