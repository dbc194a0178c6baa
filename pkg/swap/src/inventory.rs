//! Discovery of swapped Services.

use k8s_openapi::api::core::v1::Service;
use pkg_constants::swap::SWAP_LABEL_SELECTOR;
use pkg_gateway::ClusterGateway;

use crate::error::Result;
use crate::snapshot::{parse, snapshot_of};

/// What a marked Service holds in its snapshot annotation.
#[derive(Debug)]
pub enum SnapshotState {
    Valid(Box<Service>),
    /// Marker present but the annotation is absent or empty.
    Missing,
    Malformed(serde_json::Error),
}

/// A Service carrying the swap marker, as found in the cluster.
#[derive(Debug)]
pub struct SwappedService {
    pub current: Service,
    pub snapshot: SnapshotState,
}

impl SwappedService {
    pub fn inspect(current: Service) -> Self {
        let snapshot = match snapshot_of(&current).map(parse) {
            None => SnapshotState::Missing,
            Some(Ok(original)) => SnapshotState::Valid(Box::new(original)),
            Some(Err(e)) => SnapshotState::Malformed(e),
        };
        Self { current, snapshot }
    }

    pub fn name(&self) -> &str {
        self.current.metadata.name.as_deref().unwrap_or_default()
    }

    /// The pre-swap Service, when the snapshot decodes.
    pub fn original(&self) -> Option<&Service> {
        match &self.snapshot {
            SnapshotState::Valid(svc) => Some(svc),
            _ => None,
        }
    }
}

/// Every Service in the gateway's namespace that carries the swap marker.
/// Issues a single list call and nothing else.
pub async fn list_swapped(gateway: &dyn ClusterGateway) -> Result<Vec<SwappedService>> {
    let services = gateway.list_services(SWAP_LABEL_SELECTOR).await?;
    Ok(services.into_iter().map(SwappedService::inspect).collect())
}
