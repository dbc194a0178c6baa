use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pkg_constants::cluster::SERVICE_TYPE_CLUSTER_IP;
use pkg_constants::swap::{SNAPSHOT_ANNOTATION, SWAP_LABEL_KEY, SWAP_LABEL_VALUE};
use pkg_gateway::ClusterGateway;
use pkg_types::validate::{parse_external_address, validate_service_name};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::snapshot::{self, clear_cluster_fields, is_swapped};

/// Result of a completed swap.
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub service: String,
    pub endpoints: String,
    pub address: IpAddr,
    pub ports: Vec<EndpointPort>,
}

/// Replaces a Service with a selector-less copy routed to an external address.
pub struct SwapEngine {
    gateway: Arc<dyn ClusterGateway>,
}

impl SwapEngine {
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    /// Swap `service_name` over to `external_address`.
    ///
    /// Everything that can fail without touching the cluster (validation,
    /// lookup, snapshot encoding) happens before the original is deleted.
    /// If the replacement cannot be created afterwards, the original is
    /// re-created from memory and [`Error::PartialSwap`] is returned.
    pub async fn swap(&self, service_name: &str, external_address: &str) -> Result<SwapOutcome> {
        validate_service_name(service_name).map_err(|e| Error::InvalidName(e.to_string()))?;
        let address = parse_external_address(external_address)
            .map_err(|e| Error::InvalidAddress(e.to_string()))?;
        let ns = self.gateway.namespace().to_string();

        let original = self.gateway.get_service(service_name).await?;
        if is_swapped(&original) {
            return Err(Error::AlreadySwapped {
                namespace: ns,
                name: service_name.to_string(),
            });
        }

        let payload = snapshot::encode(&original)?;
        let replacement = build_replacement(&original, payload.clone());
        let ports = endpoint_ports(&original);
        let endpoints = build_endpoints(service_name, address, ports.clone());

        info!("Deleting service {}/{}", ns, service_name);
        self.gateway.delete_service(service_name).await?;

        info!("Creating replacement service {}/{}", ns, service_name);
        if let Err(source) = self.gateway.create_service(&replacement).await {
            error!(
                "Failed to create replacement service {}/{}: {}",
                ns, service_name, source
            );
            let rolled_back = self.roll_back(&original).await;
            if !rolled_back {
                error!(
                    "Original definition of {}/{}: {}",
                    ns, service_name, payload
                );
            }
            return Err(Error::PartialSwap {
                namespace: ns,
                name: service_name.to_string(),
                rolled_back,
                source,
            });
        }

        let created = match self.create_endpoints(&endpoints).await {
            Ok(ep) => ep,
            Err(e) => {
                error!(
                    "Service {}/{} is swapped but its endpoints are missing; run restore to undo",
                    ns, service_name
                );
                return Err(e);
            }
        };
        let endpoints_name = created
            .metadata
            .name
            .unwrap_or_else(|| service_name.to_string());
        info!(
            "Endpoints {}/{} created pointing to {} ({} port(s))",
            ns,
            endpoints_name,
            address,
            ports.len()
        );

        Ok(SwapOutcome {
            service: service_name.to_string(),
            endpoints: endpoints_name,
            address,
            ports,
        })
    }

    /// Re-create the original after a failed replacement. Returns whether it worked.
    async fn roll_back(&self, original: &Service) -> bool {
        let mut restored = original.clone();
        clear_cluster_fields(&mut restored.metadata);
        restored.status = None;
        let name = restored.metadata.name.clone().unwrap_or_default();
        match self.gateway.create_service(&restored).await {
            Ok(_) => {
                warn!(
                    "Rolled back: re-created original service {}/{}",
                    self.gateway.namespace(),
                    name
                );
                true
            }
            Err(e) => {
                error!(
                    "Rollback of service {}/{} failed: {}",
                    self.gateway.namespace(),
                    name,
                    e
                );
                false
            }
        }
    }

    /// Create the manual Endpoints, replacing a stale object of the same
    /// name left behind by the endpoint controller.
    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints> {
        let err = match self.gateway.create_endpoints(endpoints).await {
            Ok(created) => return Ok(created),
            Err(e) => e,
        };
        if !err.is_conflict() {
            return Err(err.into());
        }

        let name = endpoints.metadata.name.as_deref().unwrap_or_default();
        warn!(
            "Endpoints {}/{} already exist, replacing them",
            self.gateway.namespace(),
            name
        );
        match self.gateway.delete_endpoints(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self.gateway.create_endpoints(endpoints).await?)
    }
}

/// Derive the replacement Service: no selector, type ClusterIP, the marker
/// label, and `snapshot` as its only annotation.
pub fn build_replacement(original: &Service, snapshot: String) -> Service {
    let mut replacement = original.clone();
    clear_cluster_fields(&mut replacement.metadata);
    replacement.status = None;

    replacement.metadata.annotations = Some(BTreeMap::from([(
        SNAPSHOT_ANNOTATION.to_string(),
        snapshot,
    )]));
    replacement
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(SWAP_LABEL_KEY.to_string(), SWAP_LABEL_VALUE.to_string());

    let spec = replacement.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = None;
    spec.type_ = Some(SERVICE_TYPE_CLUSTER_IP.to_string());
    // Fields the API server rejects on a ClusterIP Service.
    spec.external_name = None;
    spec.external_traffic_policy = None;
    spec.health_check_node_port = None;
    spec.load_balancer_ip = None;
    spec.load_balancer_class = None;
    spec.load_balancer_source_ranges = None;
    spec.allocate_load_balancer_node_ports = None;
    for port in spec.ports.iter_mut().flatten() {
        port.node_port = None;
    }
    replacement
}

/// Project `(name, port, protocol)` from each Service port, in order.
/// Target ports are ignored: the external backend listens on the Service port.
pub fn endpoint_ports(service: &Service) -> Vec<EndpointPort> {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|p| EndpointPort {
                    name: p.name.clone(),
                    port: p.port,
                    protocol: p.protocol.clone(),
                    ..Default::default()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A single-subset Endpoints object routing `name` to `address`.
pub fn build_endpoints(name: &str, address: IpAddr, ports: Vec<EndpointPort>) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(vec![EndpointAddress {
                ip: address.to_string(),
                ..Default::default()
            }]),
            ports: Some(ports),
            ..Default::default()
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{selector_of, service, web_service};
    use crate::snapshot::{decode, snapshot_of};
    use pkg_gateway::{GatewayError, InMemoryGateway, Operation};

    fn engine(gw: &Arc<InMemoryGateway>) -> SwapEngine {
        SwapEngine::new(gw.clone())
    }

    #[tokio::test]
    async fn test_swap_web_to_external_address() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;

        let outcome = engine(&gw).swap("web", "10.0.0.5").await.unwrap();
        assert_eq!(outcome.service, "web");
        assert_eq!(outcome.endpoints, "web");
        assert_eq!(outcome.address.to_string(), "10.0.0.5");

        let svc = gw.service("web").await.unwrap();
        let spec = svc.spec.as_ref().unwrap();
        assert!(spec.selector.is_none());
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));

        let original = decode("web", snapshot_of(&svc).unwrap()).unwrap();
        assert_eq!(
            selector_of(&original),
            Some(BTreeMap::from([("app".to_string(), "web".to_string())]))
        );

        let ep = gw.endpoints("web").await.unwrap();
        let subsets = ep.subsets.unwrap();
        assert_eq!(subsets.len(), 1);
        let addresses = subsets[0].addresses.as_ref().unwrap();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].ip, "10.0.0.5");
        let ports = subsets[0].ports.as_ref().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("http"));
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
    }

    #[tokio::test]
    async fn test_swap_preserves_port_order_and_identity() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        let original = service(
            "api",
            &[("app", "api")],
            &[("http", 80, "TCP"), ("metrics", 9100, "TCP"), ("dns", 53, "UDP")],
        );
        gw.insert_service(original.clone()).await;

        engine(&gw).swap("api", "192.168.1.20").await.unwrap();

        let ep = gw.endpoints("api").await.unwrap();
        let ports = ep.subsets.unwrap()[0].ports.clone().unwrap();
        let want: Vec<_> = original
            .spec
            .unwrap()
            .ports
            .unwrap()
            .into_iter()
            .map(|p| (p.name, p.port, p.protocol))
            .collect();
        let got: Vec<_> = ports
            .into_iter()
            .map(|p| (p.name, p.port, p.protocol))
            .collect();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn test_replacement_carries_marker_and_snapshot_together() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;

        engine(&gw).swap("web", "10.0.0.5").await.unwrap();

        let svc = gw.service("web").await.unwrap();
        assert!(is_swapped(&svc));
        let payload = snapshot_of(&svc).expect("snapshot annotation");
        assert!(decode("web", payload).is_ok());
        // Original labels survive next to the marker.
        let labels = svc.metadata.labels.unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("web"));
    }

    #[tokio::test]
    async fn test_swap_missing_service_is_not_found() {
        let gw = Arc::new(InMemoryGateway::new("default"));

        let err = engine(&gw).swap("ghost", "10.0.0.5").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(gw.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn test_swap_rejects_already_swapped_service() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;
        let eng = engine(&gw);
        eng.swap("web", "10.0.0.5").await.unwrap();
        let snapshot_before = snapshot_of(&gw.service("web").await.unwrap())
            .unwrap()
            .to_string();
        gw.clear_calls().await;

        let err = eng.swap("web", "10.0.0.6").await.unwrap_err();
        assert!(matches!(err, Error::AlreadySwapped { .. }));
        assert_eq!(gw.mutation_count().await, 0);
        let svc = gw.service("web").await.unwrap();
        assert_eq!(snapshot_of(&svc), Some(snapshot_before.as_str()));
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_gateway_calls() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;
        let eng = engine(&gw);

        let err = eng.swap("web", "db.example.com").await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        let err = eng.swap("Web_1", "10.0.0.5").await.unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
        assert!(gw.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_loopback_address_leaves_service_untouched() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;
        let eng = engine(&gw);

        for addr in ["127.0.0.1", "::1", "169.254.1.1", "fe80::1"] {
            let err = eng.swap("web", addr).await.unwrap_err();
            assert!(matches!(err, Error::InvalidAddress(_)));
        }
        assert_eq!(gw.mutation_count().await, 0);
        assert!(!is_swapped(&gw.service("web").await.unwrap()));
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_connection_error() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.set_unreachable(true).await;

        let err = engine(&gw).swap("web", "10.0.0.5").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Gateway(GatewayError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_replacement_rolls_back_original() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;
        gw.fail_next(
            Operation::CreateService,
            GatewayError::Api {
                code: 500,
                message: "etcdserver: request timed out".to_string(),
            },
        )
        .await;

        let err = engine(&gw).swap("web", "10.0.0.5").await.unwrap_err();
        assert!(matches!(
            err,
            Error::PartialSwap {
                rolled_back: true,
                ..
            }
        ));

        let svc = gw.service("web").await.expect("original re-created");
        assert!(!is_swapped(&svc));
        assert_eq!(
            selector_of(&svc),
            Some(BTreeMap::from([("app".to_string(), "web".to_string())]))
        );
        assert!(gw.endpoints("web").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_rollback_is_reported() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;
        for _ in 0..2 {
            gw.fail_next(
                Operation::CreateService,
                GatewayError::Api {
                    code: 500,
                    message: "etcdserver: leader changed".to_string(),
                },
            )
            .await;
        }

        let err = engine(&gw).swap("web", "10.0.0.5").await.unwrap_err();
        assert!(matches!(
            err,
            Error::PartialSwap {
                rolled_back: false,
                ..
            }
        ));
        assert!(err.to_string().contains("MISSING"));
        assert!(gw.service("web").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_endpoints_are_replaced() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        gw.insert_service(web_service()).await;
        gw.insert_endpoints(build_endpoints(
            "web",
            "10.244.1.7".parse().unwrap(),
            endpoint_ports(&web_service()),
        ))
        .await;

        engine(&gw).swap("web", "10.0.0.5").await.unwrap();

        let ep = gw.endpoints("web").await.unwrap();
        let subsets = ep.subsets.unwrap();
        assert_eq!(subsets[0].addresses.as_ref().unwrap()[0].ip, "10.0.0.5");
        let ops: Vec<Operation> = gw.calls().await.into_iter().map(|c| c.op).collect();
        assert_eq!(
            ops,
            vec![
                Operation::GetService,
                Operation::DeleteService,
                Operation::CreateService,
                Operation::CreateEndpoints,
                Operation::DeleteEndpoints,
                Operation::CreateEndpoints,
            ]
        );
    }

    #[test]
    fn test_build_replacement_clears_node_port_fields() {
        let mut original = web_service();
        {
            let spec = original.spec.as_mut().unwrap();
            spec.type_ = Some("LoadBalancer".to_string());
            spec.external_traffic_policy = Some("Local".to_string());
            spec.health_check_node_port = Some(32000);
            spec.allocate_load_balancer_node_ports = Some(true);
            spec.ports.as_mut().unwrap()[0].node_port = Some(30080);
        }
        original.metadata.resource_version = Some("99".to_string());
        original.metadata.annotations = Some(BTreeMap::from([(
            "cloud.example.com/lb".to_string(),
            "internal".to_string(),
        )]));

        let replacement = build_replacement(&original, "{}".to_string());
        let spec = replacement.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert!(spec.selector.is_none());
        assert!(spec.external_traffic_policy.is_none());
        assert!(spec.health_check_node_port.is_none());
        assert!(spec.allocate_load_balancer_node_ports.is_none());
        assert!(spec.ports.unwrap()[0].node_port.is_none());
        assert!(replacement.metadata.resource_version.is_none());

        let annotations = replacement.metadata.annotations.unwrap();
        assert_eq!(annotations.len(), 1);
        assert!(annotations.contains_key(SNAPSHOT_ANNOTATION));
    }

    #[tokio::test]
    async fn test_swap_node_port_service() {
        let gw = Arc::new(InMemoryGateway::new("default"));
        let mut original = web_service();
        {
            let spec = original.spec.as_mut().unwrap();
            spec.type_ = Some("NodePort".to_string());
            spec.ports.as_mut().unwrap()[0].node_port = Some(30080);
        }
        gw.insert_service(original).await;

        engine(&gw).swap("web", "10.0.0.5").await.unwrap();

        let svc = gw.service("web").await.unwrap();
        let snapshot = decode("web", snapshot_of(&svc).unwrap()).unwrap();
        let spec = snapshot.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        assert_eq!(spec.ports.unwrap()[0].node_port, Some(30080));
    }
}
