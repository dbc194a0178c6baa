//! Cluster-facing constants.

/// Namespace used when neither the CLI nor the config file names one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Service type forced onto replacement Services.
pub const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";

/// Grace period, in seconds, for every delete issued by kutex.
pub const DELETE_GRACE_PERIOD_SECS: u32 = 0;

/// Maximum length of a DNS-1035 / DNS-1123 label.
pub const MAX_NAME_LEN: usize = 63;
