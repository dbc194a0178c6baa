//! Keys kutex writes onto swapped Services.

/// Label key of the swap marker.
pub const SWAP_LABEL_KEY: &str = "kutex";

/// Label value of the swap marker. The marker carries no payload.
pub const SWAP_LABEL_VALUE: &str = "kutex";

/// Label selector matching every swapped Service.
pub const SWAP_LABEL_SELECTOR: &str = "kutex=kutex";

/// Annotation holding the JSON snapshot of the original Service.
pub const SNAPSHOT_ANNOTATION: &str = "kutex/original-service";
