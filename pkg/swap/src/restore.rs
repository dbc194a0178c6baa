use k8s_openapi::api::core::v1::Service;
use pkg_gateway::ClusterGateway;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::inventory::{SnapshotState, SwappedService, list_swapped};
use crate::snapshot::{clear_cluster_fields, into_restorable};

/// Outcome of a restore run.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Services rebuilt from their snapshots, in processing order.
    pub restored: Vec<String>,
    /// Marked Services that carried no snapshot payload.
    pub skipped: Vec<String>,
}

/// Rebuilds every swapped Service in the gateway's namespace from its snapshot.
pub struct RestoreEngine {
    gateway: Arc<dyn ClusterGateway>,
}

impl RestoreEngine {
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    /// Restore all swapped Services. The first error aborts the run; Services
    /// restored before it stay restored and no longer carry the marker, so a
    /// second run picks up exactly what is left.
    pub async fn restore(&self) -> Result<RestoreReport> {
        let ns = self.gateway.namespace().to_string();
        let swapped = list_swapped(self.gateway.as_ref()).await?;
        let mut report = RestoreReport::default();

        if swapped.is_empty() {
            info!("No swapped services in namespace {}", ns);
            return Ok(report);
        }
        info!("Found {} swapped service(s) in {}", swapped.len(), ns);

        for entry in swapped {
            let name = entry.name().to_string();
            if let Err(e) = self.restore_entry(entry, &mut report).await {
                if !report.restored.is_empty() {
                    warn!(
                        "Restore aborted at {}/{}; already restored: {}",
                        ns,
                        name,
                        report.restored.join(", ")
                    );
                }
                return Err(e);
            }
        }
        Ok(report)
    }

    async fn restore_entry(&self, entry: SwappedService, report: &mut RestoreReport) -> Result<()> {
        let ns = self.gateway.namespace();
        let name = entry.name().to_string();
        let original = match entry.snapshot {
            SnapshotState::Valid(original) => *original,
            SnapshotState::Missing => {
                warn!(
                    "Service {}/{} carries the swap marker but no snapshot, skipping",
                    ns, name
                );
                report.skipped.push(name);
                return Ok(());
            }
            SnapshotState::Malformed(source) => {
                return Err(Error::Encoding {
                    name,
                    verb: "decoded",
                    source,
                });
            }
        };

        let original = into_restorable(original, &name, ns);
        self.restore_one(&entry.current, &original).await?;
        info!("Restored service {}/{}", ns, name);
        report.restored.push(name);
        Ok(())
    }

    /// Drop the manual Endpoints and the replacement, then create the original.
    async fn restore_one(&self, current: &Service, original: &Service) -> Result<()> {
        let ns = self.gateway.namespace();
        let name = current.metadata.name.as_deref().unwrap_or_default();

        let had_endpoints = match self.gateway.delete_endpoints(name).await {
            Ok(()) => {
                debug!("Deleted endpoints {}/{}", ns, name);
                true
            }
            Err(e) if e.is_not_found() => {
                debug!("No endpoints {}/{} to delete", ns, name);
                false
            }
            Err(e) => return Err(e.into()),
        };

        info!("Deleting replacement service {}/{}", ns, name);
        if let Err(e) = self.gateway.delete_service(name).await {
            if had_endpoints {
                error!(
                    "Service {}/{} is still swapped but its endpoints are gone; run restore again",
                    ns, name
                );
            }
            return Err(e.into());
        }

        info!("Creating original service {}/{}", ns, name);
        if let Err(source) = self.gateway.create_service(original).await {
            error!(
                "Failed to create original service {}/{}: {}",
                ns, name, source
            );
            let rolled_back = self.roll_back(current).await;
            return Err(Error::PartialRestore {
                namespace: ns.to_string(),
                name: name.to_string(),
                rolled_back,
                source,
            });
        }
        Ok(())
    }

    /// Re-create the replacement so its snapshot survives a failed restore.
    async fn roll_back(&self, current: &Service) -> bool {
        let mut replacement = current.clone();
        clear_cluster_fields(&mut replacement.metadata);
        replacement.status = None;
        let ns = self.gateway.namespace();
        let name = replacement.metadata.name.clone().unwrap_or_default();
        match self.gateway.create_service(&replacement).await {
            Ok(_) => {
                warn!(
                    "Rolled back: re-created replacement service {}/{}; its endpoints are gone",
                    ns, name
                );
                true
            }
            Err(e) => {
                error!("Rollback of service {}/{} failed: {}", ns, name, e);
                if let Ok(json) = serde_json::to_string(&replacement) {
                    error!("Replacement definition of {}/{}: {}", ns, name, json);
                }
                false
            }
        }
    }
}
