//! Hyper-backed upstream client.
//!
//! Plain `http` origins go straight over TCP; `https` origins are wrapped in
//! rustls. Server certificates are checked against the bundled web PKI roots,
//! or only against `forward.ca_cert_path` when one is configured.

use std::error::Error as StdError;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::Frame;
use hyper_rustls::{ConfigBuilderExt, HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::config::ForwardConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::http::Response;
use crate::upstream::{UpstreamBody, UpstreamClient, UpstreamRequest};

type OutboundBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Upstream client over a pooled hyper HTTP/1 connector.
#[derive(Clone)]
pub struct HyperUpstream {
    client: Client<HttpsConnector<HttpConnector>, OutboundBody>,
}

impl HyperUpstream {
    pub fn new(config: &ForwardConfig) -> std::io::Result<Self> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        connector.set_nodelay(true);
        connector.enforce_http(false);

        let tls = client_tls_config(config.ca_cert_path.as_deref().map(Path::new))?;
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { client })
    }
}

fn client_tls_config(ca_cert_path: Option<&Path>) -> std::io::Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let config = match ca_cert_path {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            let mut reader = BufReader::new(File::open(path)?);
            for cert in rustls_pemfile::certs(&mut reader) {
                roots
                    .add(cert?)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            }
            if roots.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("No certificates found in {:?}", path),
                ));
            }
            tracing::info!(ca_cert_path = ?path, "Trusting configured CA for https origins");
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        None => builder.with_webpki_roots().with_no_client_auth(),
    };
    Ok(config)
}

#[async_trait]
impl UpstreamClient for HyperUpstream {
    async fn send(&self, request: UpstreamRequest) -> ProxyResult<Response> {
        let UpstreamRequest {
            method,
            uri,
            headers,
            body,
        } = request;

        let mut outbound = hyper::Request::new(outbound_body(body));
        *outbound.method_mut() = method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(error_chain(&e)))?;

        let (parts, incoming) = response.into_parts();
        let body = StreamReader::new(incoming.into_data_stream().map_err(std::io::Error::other));

        Ok(Response::new(parts.version, parts.status, parts.headers, Box::new(body)))
    }
}

fn outbound_body(body: Option<UpstreamBody>) -> OutboundBody {
    match body {
        Some(reader) => StreamBody::new(ReaderStream::new(reader).map_ok(Frame::data)).boxed_unsync(),
        None => Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed_unsync(),
    }
}

/// Render an error with its sources; hyper's top-level messages are terse.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
