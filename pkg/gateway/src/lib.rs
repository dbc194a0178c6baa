//! Namespace-scoped access to Service and Endpoints resources.
//!
//! [`ClusterGateway`] is the only way the swap and restore engines touch a
//! cluster. [`KubeGateway`] talks to a real API server. With the `testing`
//! feature, `InMemoryGateway` models one in process for tests.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};

pub use client::KubeGateway;
pub use error::{GatewayError, ResourceKind};
#[cfg(any(test, feature = "testing"))]
pub use memory::{GatewayCall, InMemoryGateway, Operation};

/// Read/create/delete of Services and Endpoints in a single namespace.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Namespace every call is scoped to.
    fn namespace(&self) -> &str;

    async fn get_service(&self, name: &str) -> Result<Service, GatewayError>;

    async fn delete_service(&self, name: &str) -> Result<(), GatewayError>;

    /// Create a Service. Fails with [`GatewayError::Conflict`] if the name is taken.
    async fn create_service(&self, service: &Service) -> Result<Service, GatewayError>;

    /// List Services matching an equality-based label selector (`k=v,k2=v2`).
    async fn list_services(&self, label_selector: &str) -> Result<Vec<Service>, GatewayError>;

    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, GatewayError>;

    async fn delete_endpoints(&self, name: &str) -> Result<(), GatewayError>;
}
