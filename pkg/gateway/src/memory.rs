//! In-process cluster model.
//!
//! Behaves like a single namespace of an API server: assigns resource
//! versions and uids, rejects creates that replay a resource version, and
//! enforces name uniqueness. Every call is recorded so tests can assert on
//! the exact sequence of Gateway traffic an engine produced.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pkg_constants::cluster::SERVICE_TYPE_CLUSTER_IP;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ClusterGateway;
use crate::error::{GatewayError, ResourceKind};

/// Gateway operations, used for call recording and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetService,
    DeleteService,
    CreateService,
    ListServices,
    CreateEndpoints,
    DeleteEndpoints,
}

impl Operation {
    /// Whether the operation changes cluster state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::GetService | Operation::ListServices)
    }
}

/// A recorded Gateway call. `target` is the resource name, or the label
/// selector for list calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub op: Operation,
    pub target: String,
}

#[derive(Default)]
struct ClusterState {
    services: BTreeMap<String, Service>,
    endpoints: BTreeMap<String, Endpoints>,
    calls: Vec<GatewayCall>,
    faults: HashMap<Operation, Vec<GatewayError>>,
    unreachable: bool,
}

pub struct InMemoryGateway {
    namespace: String,
    state: Mutex<ClusterState>,
    resource_version: AtomicU64,
}

impl InMemoryGateway {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(ClusterState::default()),
            resource_version: AtomicU64::new(1),
        }
    }

    /// Seed a Service without recording a call.
    pub async fn insert_service(&self, mut service: Service) {
        self.stamp(&mut service.metadata);
        let name = service.metadata.name.clone().unwrap_or_default();
        self.state.lock().await.services.insert(name, service);
    }

    /// Seed an Endpoints object without recording a call.
    pub async fn insert_endpoints(&self, mut endpoints: Endpoints) {
        self.stamp(&mut endpoints.metadata);
        let name = endpoints.metadata.name.clone().unwrap_or_default();
        self.state.lock().await.endpoints.insert(name, endpoints);
    }

    pub async fn service(&self, name: &str) -> Option<Service> {
        self.state.lock().await.services.get(name).cloned()
    }

    pub async fn endpoints(&self, name: &str) -> Option<Endpoints> {
        self.state.lock().await.endpoints.get(name).cloned()
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn mutation_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.op.is_mutation())
            .count()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Make the next call of `op` fail with `err`. Faults queue up per operation.
    pub async fn fail_next(&self, op: Operation, err: GatewayError) {
        self.state
            .lock()
            .await
            .faults
            .entry(op)
            .or_default()
            .push(err);
    }

    /// While unreachable, every call fails with a connection error.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    fn stamp(&self, meta: &mut ObjectMeta) {
        let version = self.resource_version.fetch_add(1, Ordering::Relaxed);
        meta.resource_version = Some(version.to_string());
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.namespace = Some(self.namespace.clone());
    }

    fn not_found(&self, kind: ResourceKind, name: &str) -> GatewayError {
        GatewayError::NotFound {
            kind,
            namespace: self.namespace.clone(),
            name: name.to_string(),
        }
    }

    fn conflict(&self, kind: ResourceKind, name: &str) -> GatewayError {
        GatewayError::Conflict {
            kind,
            namespace: self.namespace.clone(),
            name: name.to_string(),
        }
    }

    /// Record the call and surface any injected failure.
    fn enter(
        &self,
        state: &mut ClusterState,
        op: Operation,
        target: &str,
    ) -> Result<(), GatewayError> {
        state.calls.push(GatewayCall {
            op,
            target: target.to_string(),
        });
        if state.unreachable {
            return Err(GatewayError::Connection(
                "connection refused (in-memory cluster marked unreachable)".to_string(),
            ));
        }
        if let Some(queue) = state.faults.get_mut(&op) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        Ok(())
    }

    /// Admission checks the API server applies to every created object.
    fn admit(&self, meta: &ObjectMeta) -> Result<String, GatewayError> {
        let name = match meta.name.as_deref() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                return Err(GatewayError::Api {
                    code: 422,
                    message: "metadata.name: Required value".to_string(),
                });
            }
        };
        if meta.resource_version.as_deref().is_some_and(|v| !v.is_empty()) {
            return Err(GatewayError::Api {
                code: 500,
                message: "resourceVersion should not be set on objects to be created".to_string(),
            });
        }
        if let Some(ns) = meta.namespace.as_deref() {
            if ns != self.namespace {
                return Err(GatewayError::Api {
                    code: 400,
                    message: format!(
                        "the namespace of the provided object ({}) does not match the namespace sent on the request ({})",
                        ns, self.namespace
                    ),
                });
            }
        }
        Ok(name)
    }
}

/// Evaluate an equality-based label selector (`k=v`, `k==v`, `k!=v`, `k`).
pub fn selector_matches(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((k, v)) = term.split_once("!=") {
                labels.get(k.trim()).map(String::as_str) != Some(v.trim())
            } else if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                labels.get(k.trim()).map(String::as_str) == Some(v.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

fn has_node_ports_on_cluster_ip(service: &Service) -> bool {
    let Some(spec) = service.spec.as_ref() else {
        return false;
    };
    let cluster_ip = spec.type_.as_deref().is_none_or(|t| t == SERVICE_TYPE_CLUSTER_IP);
    cluster_ip
        && spec
            .ports
            .iter()
            .flatten()
            .any(|p| p.node_port.is_some())
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_service(&self, name: &str) -> Result<Service, GatewayError> {
        let mut state = self.state.lock().await;
        self.enter(&mut state, Operation::GetService, name)?;
        state
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(ResourceKind::Service, name))
    }

    async fn delete_service(&self, name: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        self.enter(&mut state, Operation::DeleteService, name)?;
        state
            .services
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| self.not_found(ResourceKind::Service, name))
    }

    async fn create_service(&self, service: &Service) -> Result<Service, GatewayError> {
        let mut state = self.state.lock().await;
        let target = service.metadata.name.clone().unwrap_or_default();
        self.enter(&mut state, Operation::CreateService, &target)?;
        let name = self.admit(&service.metadata)?;
        if has_node_ports_on_cluster_ip(service) {
            return Err(GatewayError::Api {
                code: 422,
                message: "spec.ports.nodePort: Forbidden: may not be used when `type` is 'ClusterIP'"
                    .to_string(),
            });
        }
        if state.services.contains_key(&name) {
            return Err(self.conflict(ResourceKind::Service, &name));
        }
        let mut created = service.clone();
        self.stamp(&mut created.metadata);
        state.services.insert(name, created.clone());
        Ok(created)
    }

    async fn list_services(&self, label_selector: &str) -> Result<Vec<Service>, GatewayError> {
        let mut state = self.state.lock().await;
        self.enter(&mut state, Operation::ListServices, label_selector)?;
        Ok(state
            .services
            .values()
            .filter(|s| selector_matches(s.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, GatewayError> {
        let mut state = self.state.lock().await;
        let target = endpoints.metadata.name.clone().unwrap_or_default();
        self.enter(&mut state, Operation::CreateEndpoints, &target)?;
        let name = self.admit(&endpoints.metadata)?;
        if state.endpoints.contains_key(&name) {
            return Err(self.conflict(ResourceKind::Endpoints, &name));
        }
        let mut created = endpoints.clone();
        self.stamp(&mut created.metadata);
        state.endpoints.insert(name, created.clone());
        Ok(created)
    }

    async fn delete_endpoints(&self, name: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        self.enter(&mut state, Operation::DeleteEndpoints, name)?;
        state
            .endpoints
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| self.not_found(ResourceKind::Endpoints, name))
    }
}
