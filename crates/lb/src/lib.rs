use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use http::{Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full, combinators::BoxBody};

pub mod round_robin;

pub use round_robin::{BackendSet, EmptyBackendSet, Selection};

/// Body type carried through the balancer in both directions.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// One upstream target the balancer may forward to.
///
/// `forward` never fails: transport problems are turned into a gateway error
/// response by the implementation.
pub trait Backend: Send + Sync {
    fn address(&self) -> &str;

    fn is_alive(&self) -> bool;

    fn forward(
        &self,
        req: Request<ProxyBody>,
    ) -> impl Future<Output = Response<ProxyBody>> + Send;
}

/// Shared liveness flag for a backend.
///
/// Cloning hands out another handle to the same flag, so whoever owns a clone
/// can take the backend in or out of rotation while it sits in a
/// [`BackendSet`].
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new(alive: bool) -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(alive)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new(true)
    }
}

pub fn full_body(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Plain-text response produced by the balancer itself.
pub fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(format!("{message}\n")));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
