use std::{convert::Infallible, net::SocketAddr};

use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::{Request, Response, body::Incoming, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(version, about = "Minimal HTTP/1.1 backend for trying carousel locally")]
struct Cli {
    #[arg(long, default_value_t = 8081)]
    port: u16,

    /// Name echoed back in every response
    #[arg(long, default_value = "backend")]
    name: String,
}

async fn handle_request(
    name: &str,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let text = format!("{} {} {}\n", name, req.method(), req.uri());
    Ok(Response::new(Full::new(Bytes::from(text))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let addr: SocketAddr = format!("127.0.0.1:{}", cli.port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    println!("{} listening on http://{}", cli.name, addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let name = cli.name.clone();
        let service = service_fn(move |req| {
            let name = name.clone();
            async move { handle_request(&name, req).await }
        });

        tokio::spawn(async move {
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await;
        });
    }
}
