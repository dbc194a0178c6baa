use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use pkg_constants::cluster::DELETE_GRACE_PERIOD_SECS;
use tracing::{debug, info};

use crate::ClusterGateway;
use crate::error::{GatewayError, ResourceKind};

/// Gateway backed by the Kubernetes API server via `kube`.
#[derive(Clone)]
pub struct KubeGateway {
    namespace: String,
    services: Api<Service>,
    endpoints: Api<Endpoints>,
}

impl KubeGateway {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            services: Api::namespaced(client.clone(), namespace),
            endpoints: Api::namespaced(client, namespace),
        }
    }

    /// Build a client from a kubeconfig and scope it to `namespace`.
    ///
    /// With no explicit kubeconfig the usual lookup applies: `$KUBECONFIG`,
    /// then `~/.kube/config`, then the in-cluster service account.
    pub async fn connect(
        kubeconfig: Option<&str>,
        context: Option<&str>,
        namespace: &str,
    ) -> Result<Self, GatewayError> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let config = match (kubeconfig, context) {
            (Some(path), _) => {
                info!("Loading kubeconfig from {}", path);
                let kc = Kubeconfig::read_from(path).map_err(|e| {
                    GatewayError::Connection(format!("cannot read kubeconfig {}: {}", path, e))
                })?;
                Config::from_custom_kubeconfig(kc, &options)
                    .await
                    .map_err(|e| GatewayError::Connection(format!("invalid kubeconfig: {}", e)))?
            }
            (None, Some(ctx)) => {
                info!("Using kubeconfig context {}", ctx);
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| GatewayError::Connection(format!("invalid kubeconfig: {}", e)))?
            }
            (None, None) => Config::infer().await.map_err(|e| {
                GatewayError::Connection(format!("cannot infer cluster config: {}", e))
            })?,
        };

        debug!("Cluster API endpoint: {}", config.cluster_url);
        let client = Client::try_from(config).map_err(|e| GatewayError::Connection(e.to_string()))?;
        Ok(Self::new(client, namespace))
    }

    fn service_err(&self, err: kube::Error, name: &str) -> GatewayError {
        GatewayError::from_kube(err, ResourceKind::Service, &self.namespace, name)
    }

    fn endpoints_err(&self, err: kube::Error, name: &str) -> GatewayError {
        GatewayError::from_kube(err, ResourceKind::Endpoints, &self.namespace, name)
    }
}

fn delete_params() -> DeleteParams {
    DeleteParams::default().grace_period(DELETE_GRACE_PERIOD_SECS)
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_service(&self, name: &str) -> Result<Service, GatewayError> {
        debug!("GET service {}/{}", self.namespace, name);
        self.services.get(name).await.map_err(|e| self.service_err(e, name))
    }

    async fn delete_service(&self, name: &str) -> Result<(), GatewayError> {
        debug!("DELETE service {}/{}", self.namespace, name);
        self.services
            .delete(name, &delete_params())
            .await
            .map(|_| ())
            .map_err(|e| self.service_err(e, name))
    }

    async fn create_service(&self, service: &Service) -> Result<Service, GatewayError> {
        let name = service.metadata.name.as_deref().unwrap_or_default();
        debug!("POST service {}/{}", self.namespace, name);
        self.services
            .create(&PostParams::default(), service)
            .await
            .map_err(|e| self.service_err(e, name))
    }

    async fn list_services(&self, label_selector: &str) -> Result<Vec<Service>, GatewayError> {
        debug!("LIST services in {} ({})", self.namespace, label_selector);
        let params = ListParams::default().labels(label_selector);
        self.services
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| self.service_err(e, label_selector))
    }

    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, GatewayError> {
        let name = endpoints.metadata.name.as_deref().unwrap_or_default();
        debug!("POST endpoints {}/{}", self.namespace, name);
        self.endpoints
            .create(&PostParams::default(), endpoints)
            .await
            .map_err(|e| self.endpoints_err(e, name))
    }

    async fn delete_endpoints(&self, name: &str) -> Result<(), GatewayError> {
        debug!("DELETE endpoints {}/{}", self.namespace, name);
        self.endpoints
            .delete(name, &delete_params())
            .await
            .map(|_| ())
            .map_err(|e| self.endpoints_err(e, name))
    }
}
