// pserv-core: Domain translator between the node registry and the
// provisioning backend's typed objects.

pub mod config;
pub mod convert;
pub mod error;
pub mod mac_delta;
pub mod metadata;
pub mod provisioning;

pub use config::{SessionConfig, TlsVerification};
pub use convert::{DistroRecord, NodeRecord, ProfileRecord, postprocess_mapping};
pub use error::CoreError;
pub use mac_delta::mac_address_deltas;
pub use metadata::{BootstrapMetadata, PRESEED_KEY};
pub use provisioning::{Deltas, ProvisioningApi};

// Re-exported so downstream crates need not depend on pserv-api directly
// for the common types.
pub use pserv_api::{Attributes, PowerAction, Session, TemplateKind};
