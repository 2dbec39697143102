//! HTTP access to the NIBE Uplink API

pub mod serviceinfo;
pub mod transport;

pub use serviceinfo::ServiceInfo;
pub use transport::{JsonResponse, ReqwestTransport, Transport};
