use std::fmt;

/// Resource kinds the gateway handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Service,
    Endpoints,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Service => write!(f, "service"),
            ResourceKind::Endpoints => write!(f, "endpoints"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} already exists")]
    Conflict {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// The cluster could not be reached, or refused our credentials.
    #[error("cannot talk to the cluster: {0}")]
    Connection(String),

    /// Any other status returned by the API server.
    #[error("API server rejected the request ({code}): {message}")]
    Api { code: u16, message: String },
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Conflict { .. })
    }

    /// Classify a `kube` client error for the resource it was issued against.
    pub fn from_kube(err: kube::Error, kind: ResourceKind, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) => match resp.code {
                404 => GatewayError::NotFound {
                    kind,
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
                409 => GatewayError::Conflict {
                    kind,
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
                401 | 403 => GatewayError::Connection(format!(
                    "credentials rejected ({}): {}",
                    resp.code, resp.message
                )),
                code => GatewayError::Api {
                    code,
                    message: resp.message,
                },
            },
            other => GatewayError::Connection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} from the API server", reason),
            reason: reason.to_string(),
            code,
        })
    }

    fn classify(err: kube::Error) -> GatewayError {
        GatewayError::from_kube(err, ResourceKind::Endpoints, "default", "web")
    }

    #[test]
    fn test_not_found_keeps_resource_identity() {
        let err = classify(api_error(404, "NotFound"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "endpoints default/web not found");
    }

    #[test]
    fn test_conflict_maps_to_conflict() {
        let err = classify(api_error(409, "AlreadyExists"));
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "endpoints default/web already exists");
    }

    #[test]
    fn test_rejected_credentials_are_connection_errors() {
        for code in [401, 403] {
            match classify(api_error(code, "Forbidden")) {
                GatewayError::Connection(msg) => assert!(msg.contains(&code.to_string())),
                other => panic!("{} mapped to {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_other_status_is_api_error() {
        match classify(api_error(500, "InternalError")) {
            GatewayError::Api { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "InternalError from the API server");
            }
            other => panic!("500 mapped to {:?}", other),
        }
        assert!(matches!(
            classify(api_error(422, "Invalid")),
            GatewayError::Api { code: 422, .. }
        ));
    }

    #[test]
    fn test_transport_error_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = classify(kube::Error::Service(Box::new(io)));
        assert!(matches!(err, GatewayError::Connection(_)));
        assert!(!err.is_not_found());
    }
}
