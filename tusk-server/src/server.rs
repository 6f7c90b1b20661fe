//! HTTP/1.1 server implementation

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};
use tusk_engine::Handler;

use crate::handlers::handle_request;

pub struct TuskServer {
    handler: Arc<Handler>,
    prefix: Arc<str>,
}

impl TuskServer {
    pub fn new(handler: Handler) -> Self {
        let prefix = route_prefix(handler.base_path());
        Self {
            handler: Arc::new(handler),
            prefix: prefix.into(),
        }
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("tusk server listening on {} (uploads under {})", addr, self.prefix);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!("New connection from {}", remote_addr);

            let handler = self.handler.clone();
            let prefix = self.prefix.clone();
            tokio::spawn(async move {
                Self::handle_connection(stream, remote_addr, handler, prefix).await;
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        remote_addr: SocketAddr,
        handler: Arc<Handler>,
        prefix: Arc<str>,
    ) {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let handler = handler.clone();
            let prefix = prefix.clone();
            async move { handle_request(req, handler, prefix, remote_addr).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            error!("Connection error from {}: {}", remote_addr, err);
        }
    }
}

/// Path under which uploads are routed. An absolute base URL contributes
/// only its path.
fn route_prefix(base_path: &str) -> String {
    match url::Url::parse(base_path) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => base_path.to_string(),
    }
}
