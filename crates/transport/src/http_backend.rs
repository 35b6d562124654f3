use std::time::Duration;

use carousel_bridge::upstream_request::{
    BridgeError, UpstreamTarget, remove_hop_headers, rewrite_request,
};
use carousel_lb::{Backend, Liveness, ProxyBody, error_response};
use http_body_util::BodyExt;
use hyper::{Request, Response, StatusCode};
use log::{debug, error};

use crate::http_client::UpstreamClient;

#[derive(Debug)]
pub enum TransportError {
    InvalidAddress { address: String, source: BridgeError },
    Rewrite(BridgeError),
    Send(hyper_util::client::legacy::Error),
    Timeout(Duration),
}

impl TransportError {
    /// Status returned to the client when forwarding fails this way.
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::InvalidAddress { address, source } => {
                write!(f, "invalid backend address '{address}': {source}")
            }
            TransportError::Rewrite(err) => write!(f, "cannot rewrite request: {err}"),
            TransportError::Send(err) => write!(f, "send failed: {err}"),
            TransportError::Timeout(after) => {
                write!(f, "no response within {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::InvalidAddress { source, .. } => Some(source),
            TransportError::Rewrite(err) => Some(err),
            TransportError::Send(err) => Some(err),
            TransportError::Timeout(_) => None,
        }
    }
}

/// `http://` or `https://` upstream reached through a shared [`UpstreamClient`].
pub struct HttpBackend {
    address: String,
    target: UpstreamTarget,
    liveness: Liveness,
    client: UpstreamClient,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(
        address: &str,
        client: UpstreamClient,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let target =
            UpstreamTarget::parse(address).map_err(|source| TransportError::InvalidAddress {
                address: address.to_string(),
                source,
            })?;

        Ok(Self {
            address: address.to_string(),
            target,
            liveness: Liveness::default(),
            client,
            timeout,
        })
    }

    /// Handle to this backend's liveness flag.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    // `timeout` only covers the wait for response headers; the body streams
    // for as long as the upstream keeps sending.
    async fn try_forward(
        &self,
        req: Request<ProxyBody>,
    ) -> Result<Response<ProxyBody>, TransportError> {
        let req = rewrite_request(&self.target, req).map_err(TransportError::Rewrite)?;
        debug!("{} {} -> {}", req.method(), req.uri(), self.address);

        let response = tokio::time::timeout(self.timeout, self.client.send(req))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(TransportError::Send)?;

        let (mut parts, body) = response.into_parts();
        remove_hop_headers(&mut parts.headers);

        Ok(Response::from_parts(parts, body.boxed()))
    }
}

impl Backend for HttpBackend {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    async fn forward(&self, req: Request<ProxyBody>) -> Response<ProxyBody> {
        match self.try_forward(req).await {
            Ok(response) => response,
            Err(err) => {
                error!("Forwarding to {} failed: {}", self.address, err);
                let status = err.status();
                error_response(status, status.canonical_reason().unwrap_or("Bad Gateway"))
            }
        }
    }
}
