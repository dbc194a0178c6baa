//! Snapshot encoding.
//!
//! A snapshot is the JSON form of the complete pre-swap Service, stored in
//! the [`SNAPSHOT_ANNOTATION`] of the replacement. Cluster-assigned
//! metadata is kept in the payload but never replayed on create.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pkg_constants::swap::{SNAPSHOT_ANNOTATION, SWAP_LABEL_KEY, SWAP_LABEL_VALUE};

use crate::error::{Error, Result};

pub fn encode(service: &Service) -> Result<String> {
    serde_json::to_string(service).map_err(|source| Error::Encoding {
        name: service.metadata.name.clone().unwrap_or_default(),
        verb: "encoded",
        source,
    })
}

pub fn parse(payload: &str) -> serde_json::Result<Service> {
    serde_json::from_str(payload)
}

/// Decode the snapshot stored on the replacement Service `name`.
pub fn decode(name: &str, payload: &str) -> Result<Service> {
    parse(payload).map_err(|source| Error::Encoding {
        name: name.to_string(),
        verb: "decoded",
        source,
    })
}

/// The snapshot payload carried by `service`, if any. Empty payloads count as absent.
pub fn snapshot_of(service: &Service) -> Option<&str> {
    service
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SNAPSHOT_ANNOTATION))
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Whether `service` carries the swap marker label.
pub fn is_swapped(service: &Service) -> bool {
    service
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(SWAP_LABEL_KEY))
        .is_some_and(|v| v == SWAP_LABEL_VALUE)
}

/// Drop fields the API server assigns. Creating an object with a stale
/// resource version is rejected outright.
pub fn clear_cluster_fields(meta: &mut ObjectMeta) {
    meta.resource_version = None;
    meta.uid = None;
    meta.creation_timestamp = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
    meta.generation = None;
    meta.managed_fields = None;
    meta.self_link = None;
}

/// Remove the swap marker and snapshot annotation, dropping maps left empty.
pub fn strip_swap_keys(meta: &mut ObjectMeta) {
    if let Some(labels) = meta.labels.as_mut() {
        labels.remove(SWAP_LABEL_KEY);
        if labels.is_empty() {
            meta.labels = None;
        }
    }
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(SNAPSHOT_ANNOTATION);
        if annotations.is_empty() {
            meta.annotations = None;
        }
    }
}

/// Turn a decoded snapshot into a Service that can be created as `name`
/// in `namespace`.
pub fn into_restorable(mut service: Service, name: &str, namespace: &str) -> Service {
    clear_cluster_fields(&mut service.metadata);
    strip_swap_keys(&mut service.metadata);
    service.metadata.name = Some(name.to_string());
    service.metadata.namespace = Some(namespace.to_string());
    service.status = None;
    service
}
