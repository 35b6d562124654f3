pub mod http_backend;
pub mod http_client;

pub use http_backend::{HttpBackend, TransportError};
pub use http_client::UpstreamClient;
