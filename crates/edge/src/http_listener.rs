use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use carousel_bridge::upstream_request::ClientAddr;
use carousel_lb::Backend;
use http_body_util::BodyExt;
use hyper::{Request, body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use log::{debug, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinSet,
};

use crate::dispatcher::Dispatcher;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP listener that feeds every HTTP request it receives to a [`Dispatcher`].
pub struct HttpListener {
    listener: TcpListener,
}

impl HttpListener {
    pub async fn bind(address: &str, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((address, port)).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` completes, then gives open
    /// connections up to five seconds to finish before aborting them.
    pub async fn serve<B, F>(self, dispatcher: Arc<Dispatcher<B>>, shutdown: F)
    where
        B: Backend + 'static,
        F: Future<Output = ()>,
    {
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(err) => {
                            warn!("Failed to accept connection: {}", err);
                            continue;
                        }
                    };
                    connections.spawn(serve_connection(dispatcher.clone(), stream, peer));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!("Listener stopped, draining {} connections", connections.len());
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "Drain timeout reached, aborting {} connections",
                connections.len()
            );
            connections.abort_all();
        }
    }
}

async fn serve_connection<B>(dispatcher: Arc<Dispatcher<B>>, stream: TcpStream, peer: SocketAddr)
where
    B: Backend + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = dispatcher.clone();
        async move {
            let mut req = req.map(|body| body.boxed());
            req.extensions_mut().insert(ClientAddr(peer));
            Ok::<_, Infallible>(dispatcher.handle_request(req).await)
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    if let Err(err) = builder.serve_connection(TokioIo::new(stream), service).await {
        debug!("Connection from {} ended with error: {}", peer, err);
    }
}
