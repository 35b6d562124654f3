use carousel_lb::{Backend, BackendSet, ProxyBody, Selection, error_response};
use hyper::{Request, Response, StatusCode};
use log::{info, warn};

/// Routes each inbound request to the next backend of its set.
///
/// Holds no per-request state; the round-robin position lives in the
/// [`BackendSet`]. A failed forward is final, the request is not retried on
/// another backend.
pub struct Dispatcher<B> {
    port: u16,
    backends: BackendSet<B>,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(port: u16, backends: BackendSet<B>) -> Self {
        Self { port, backends }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn backends(&self) -> &BackendSet<B> {
        &self.backends
    }

    pub async fn handle_request(&self, req: Request<ProxyBody>) -> Response<ProxyBody> {
        match self.backends.next() {
            Selection::Selected { backend, .. } => {
                info!("forwarding request to addr {:?}", backend.address());
                backend.forward(req).await
            }
            Selection::NoneAvailable => {
                warn!(
                    "No alive backend for {} {}, answering 503",
                    req.method(),
                    req.uri()
                );
                error_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
        }
    }
}
