//! HTTP/1.1 over Unix-domain sockets.
//!
//! The target host is a socket path. A trailing `:80` is ignored and
//! relative paths are taken from the filesystem root. The path is
//! hex-encoded into the URI authority so the client pool keys connections
//! per socket.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{header, HeaderValue, Request, Response, Uri};
use hyper::rt::ReadBufCursor;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tower::Service;

use crate::transport::{send, set_uri, target_host, Transport, TransportConfig};
use crate::upstream::UpstreamError;

#[derive(Debug, Clone)]
pub struct UnixTransport {
    client: Client<UnixConnector, Body>,
    header_timeout: Duration,
}

impl UnixTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let connector = UnixConnector {
            dial_timeout: config.dial_timeout,
        };
        Self {
            client: config.client(connector, false),
            header_timeout: config.response_header_timeout,
        }
    }
}

#[async_trait]
impl Transport for UnixTransport {
    async fn round_trip(
        &self,
        mut request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        let path = socket_path(&target_host(&request)?);
        if !request.headers().contains_key(header::HOST) {
            request
                .headers_mut()
                .insert(header::HOST, HeaderValue::from_static("localhost"));
        }
        set_uri(&mut request, Scheme::HTTP, &encode_path(&path))?;
        send(&self.client, request, self.header_timeout).await
    }
}

fn socket_path(host: &str) -> String {
    let path = host.strip_suffix(":80").unwrap_or(host);
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn encode_path(path: &str) -> String {
    path.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_path(encoded: &str) -> io::Result<PathBuf> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidInput, "bad unix socket authority");
    if encoded.len() % 2 != 0 {
        return Err(invalid());
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&encoded[i..i + 2], 16).map_err(|_| invalid()))
        .collect::<io::Result<Vec<u8>>>()?;
    String::from_utf8(bytes)
        .map(PathBuf::from)
        .map_err(|_| invalid())
}

#[derive(Debug, Clone)]
struct UnixConnector {
    dial_timeout: Duration,
}

impl Service<Uri> for UnixConnector {
    type Response = UnixConnection;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<UnixConnection>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let dial_timeout = self.dial_timeout;
        Box::pin(async move {
            let path = decode_path(uri.host().unwrap_or_default())?;
            let stream = tokio::time::timeout(dial_timeout, UnixStream::connect(&path))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("dial {} timed out", path.display()),
                    )
                })??;
            Ok(UnixConnection {
                io: TokioIo::new(stream),
            })
        })
    }
}

struct UnixConnection {
    io: TokioIo<UnixStream>,
}

impl Connection for UnixConnection {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl hyper::rt::Read for UnixConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for UnixConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::set_target_host;
    use axum::http::StatusCode;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use tokio::net::UnixListener;

    #[test]
    fn socket_path_normalization() {
        assert_eq!(socket_path("/tmp/app.sock"), "/tmp/app.sock");
        assert_eq!(socket_path("/tmp/app.sock:80"), "/tmp/app.sock");
        assert_eq!(socket_path("app.sock"), "/app.sock");
    }

    #[test]
    fn path_encoding() {
        let encoded = encode_path("/tmp/a b.sock");
        assert!(encoded.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(decode_path(&encoded).unwrap(), PathBuf::from("/tmp/a b.sock"));
        assert!(decode_path("abc").is_err());
        assert!(decode_path("zz").is_err());
    }

    #[tokio::test]
    async fn round_trip_over_socket() {
        let path = std::env::temp_dir().join(format!("rampart-unix-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                let host = req.headers()[header::HOST].to_str().unwrap().to_string();
                let mut response = Response::new(Body::from(host));
                *response.status_mut() = StatusCode::CREATED;
                Ok::<_, std::convert::Infallible>(response)
            });
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });

        let transport = UnixTransport::new(&TransportConfig::default());
        let mut request = Request::builder()
            .uri("/")
            .header(header::HOST, "example.com")
            .body(Body::empty())
            .unwrap();
        set_target_host(&mut request, path.to_string_lossy());

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"example.com");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_socket_is_transport_error() {
        let transport = UnixTransport::new(&TransportConfig::default());
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        set_target_host(&mut request, "/nonexistent/rampart.sock");

        let err = transport.round_trip(request).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(_)));
    }
}
