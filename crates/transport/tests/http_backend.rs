use std::{convert::Infallible, sync::Arc, time::Duration};

use bytes::Bytes;
use carousel_bridge::upstream_request::ClientAddr;
use carousel_lb::{Backend, full_body};
use carousel_transport::{HttpBackend, UpstreamClient};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::{
    Request, Response, StatusCode,
    body::{Frame, Incoming},
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::{
    net::TcpListener,
    sync::{Notify, mpsc},
};
use tokio_stream::wrappers::ReceiverStream;

async fn echo(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() == "/slow" {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let method = req.method().clone();
    let uri = req.uri().clone();
    let host = header(&req, "host");
    let forwarded = header(&req, "x-forwarded-for");
    let hop = header(&req, "x-hop");
    let body = req.into_body().collect().await.unwrap().to_bytes();

    let text = format!(
        "{method} {uri} host={host} xff={forwarded} hop={hop} body={}",
        String::from_utf8_lossy(&body)
    );

    let response = Response::builder()
        .status(StatusCode::CREATED)
        .header("x-backend", "echo")
        .header("connection", "x-hop")
        .header("x-hop", "1")
        .body(Full::new(Bytes::from(text)))
        .unwrap();
    Ok(response)
}

fn header(req: &Request<Incoming>, name: &str) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

async fn start_backend() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(echo))
                    .await;
            });
        }
    });

    Ok(port)
}

// Sends "first", then holds the body open until `release` is notified.
async fn start_streaming_backend(release: Arc<Notify>) -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => break,
            };
            let release = release.clone();
            let service = service_fn(move |_req: Request<Incoming>| {
                let release = release.clone();
                async move {
                    let (tx, rx) = mpsc::channel::<Result<Frame<Bytes>, Infallible>>(4);
                    tokio::spawn(async move {
                        let _ = tx.send(Ok(Frame::data(Bytes::from("first")))).await;
                        release.notified().await;
                        let _ = tx.send(Ok(Frame::data(Bytes::from("rest")))).await;
                    });
                    Ok::<_, Infallible>(Response::new(StreamBody::new(ReceiverStream::new(rx))))
                }
            });
            tokio::spawn(async move {
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Ok(port)
}

// Accepts TCP connections and closes them straight away.
async fn start_hangup_backend() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    Ok(port)
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn backend(port: u16, timeout: Duration) -> HttpBackend {
    HttpBackend::new(
        &format!("http://127.0.0.1:{port}"),
        UpstreamClient::new(),
        timeout,
    )
    .unwrap()
}

async fn body_text(response: Response<carousel_lb::ProxyBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn forwards_request_and_mirrors_response() {
    let port = start_backend().await.unwrap();
    let backend = backend(port, Duration::from_secs(5));

    let mut req = Request::builder()
        .method("PUT")
        .uri("http://lb.local:8000/things/1?x=y")
        .header("host", "lb.local:8000")
        .body(full_body("hello"))
        .unwrap();
    req.extensions_mut()
        .insert(ClientAddr("192.0.2.7:4000".parse().unwrap()));

    let response = backend.forward(req).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-backend"], "echo");
    assert!(response.headers().get("x-hop").is_none());
    assert_eq!(
        body_text(response).await,
        format!("PUT /things/1?x=y host=127.0.0.1:{port} xff=192.0.2.7 hop=- body=hello")
    );
}

#[tokio::test]
async fn streams_large_bodies_intact() {
    let port = start_backend().await.unwrap();
    let backend = backend(port, Duration::from_secs(5));

    let payload = "z".repeat(1 << 20);
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .body(full_body(payload.clone()))
        .unwrap();

    let text = body_text(backend.forward(req).await).await;
    assert!(text.starts_with("POST /upload host="));
    assert!(text.ends_with(&payload));
}

#[tokio::test]
async fn response_body_is_streamed_before_upstream_finishes() {
    let release = Arc::new(Notify::new());
    let port = start_streaming_backend(release.clone()).await.unwrap();
    let backend = backend(port, Duration::from_secs(5));

    let req = Request::builder().uri("/stream").body(full_body("")).unwrap();
    let response = tokio::time::timeout(Duration::from_secs(2), backend.forward(req))
        .await
        .expect("response head should arrive while the body is still open");
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let first = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("first chunk should arrive before the upstream finishes")
        .unwrap()
        .unwrap();
    assert_eq!(first.into_data().unwrap(), Bytes::from("first"));

    release.notify_one();
    let rest = body.collect().await.unwrap().to_bytes();
    assert_eq!(rest, Bytes::from("rest"));
}

#[tokio::test]
async fn failed_tls_handshake_yields_bad_gateway() {
    let port = start_hangup_backend().await.unwrap();
    let backend = HttpBackend::new(
        &format!("https://127.0.0.1:{port}"),
        UpstreamClient::new(),
        Duration::from_secs(5),
    )
    .unwrap();

    let req = Request::builder().uri("/").body(full_body("")).unwrap();
    let response = backend.forward(req).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn unreachable_backend_yields_bad_gateway() {
    let port = closed_port().await;
    let backend = backend(port, Duration::from_secs(5));

    let req = Request::builder().uri("/").body(full_body("")).unwrap();
    let response = backend.forward(req).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "Bad Gateway\n");
}

#[tokio::test]
async fn slow_backend_yields_gateway_timeout() {
    let port = start_backend().await.unwrap();
    let backend = backend(port, Duration::from_millis(50));

    let req = Request::builder().uri("/slow").body(full_body("")).unwrap();
    let response = backend.forward(req).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_text(response).await, "Gateway Timeout\n");
}
