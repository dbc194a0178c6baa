use pkg_gateway::GatewayError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid service name: {0}")]
    InvalidName(String),

    #[error("invalid external address: {0}")]
    InvalidAddress(String),

    #[error("service {namespace}/{name} is already swapped; restore it before swapping again")]
    AlreadySwapped { namespace: String, name: String },

    #[error("snapshot of service {name} could not be {verb}: {source}")]
    Encoding {
        name: String,
        verb: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The original was deleted but the replacement could not be created.
    #[error(
        "service {namespace}/{name} was deleted but its replacement could not be created: {source}; {}",
        rollback_note(.rolled_back)
    )]
    PartialSwap {
        namespace: String,
        name: String,
        rolled_back: bool,
        #[source]
        source: GatewayError,
    },

    /// The replacement was deleted but the original could not be created.
    #[error(
        "replacement service {namespace}/{name} was deleted but the original could not be created: {source}; {}",
        rollback_note(.rolled_back)
    )]
    PartialRestore {
        namespace: String,
        name: String,
        rolled_back: bool,
        #[source]
        source: GatewayError,
    },
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "the previous service definition was re-created"
    } else {
        "the service is MISSING and must be re-created manually (its definition is in the error log)"
    }
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Gateway(e) if e.is_not_found())
    }
}
