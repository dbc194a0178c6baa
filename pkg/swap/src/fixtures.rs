use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// A ClusterIP Service with the given selector and `(name, port, protocol)` ports.
/// Every port targets `port + 8000` so tests can tell target ports apart.
pub fn service(name: &str, selector: &[(&str, &str)], ports: &[(&str, i32, &str)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(
                selector
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ports: Some(
                ports
                    .iter()
                    .map(|(n, p, proto)| ServicePort {
                        name: Some(n.to_string()),
                        port: *p,
                        protocol: Some(proto.to_string()),
                        target_port: Some(IntOrString::Int(p + 8000)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            type_: Some("ClusterIP".to_string()),
            cluster_ip: Some("10.96.0.10".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Service `web`: selector `{app: web}`, ports `[{http, 80, TCP}]`.
pub fn web_service() -> Service {
    service("web", &[("app", "web")], &[("http", 80, "TCP")])
}

pub fn selector_of(service: &Service) -> Option<BTreeMap<String, String>> {
    service.spec.as_ref().and_then(|s| s.selector.clone())
}
