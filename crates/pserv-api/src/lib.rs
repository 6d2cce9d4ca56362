// pserv-api: Async client for the provisioning backend's XML-RPC API

pub mod error;
pub mod object;
pub mod session;
pub mod templates;
pub mod transport;
pub mod xmlrpc;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Fault, FaultKind};
pub use object::{Attributes, InterfaceEdit, KindDescriptor, ObjectKind, ObjectRef, PowerAction};
pub use session::{Arg, Session, StateCookie};
pub use templates::{TemplateKind, Templates};
pub use transport::{DEFAULT_TIMEOUT, HttpTransport, TlsMode, Transport, TransportConfig};
