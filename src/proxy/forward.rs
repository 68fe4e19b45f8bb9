//! Forward (non-CONNECT) request handling.
//!
//! # Responsibilities
//! - Apply the header forwarding policy
//! - Add `X-Forwarded-For` with the accepting socket's peer address
//! - Execute the request via the upstream client and relay the response
//!
//! # Design Decisions
//! - Multi-valued headers are flattened to their first value
//! - The client's own `X-Forwarded-For` is replaced, never extended
//! - `GET` never carries a body; other methods stream the client body
//! - Methods are matched ignoring case; standard methods go out upper-cased
//! - Chunked uploads are not decoded: the raw chunk bytes become the outbound
//!   body and the client's `Transfer-Encoding` is dropped, so the origin
//!   receives the client's framing as payload

use std::net::IpAddr;
use std::sync::Arc;

use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use hyper::{HeaderMap, Method};
use tokio::io::AsyncReadExt;

use crate::error::{ProxyError, ProxyResult};
use crate::http::{ClientReader, Request, RequestHead, Target};
use crate::observability::metrics;
use crate::proxy::shutdown_quietly;
use crate::upstream::{UpstreamBody, UpstreamClient, UpstreamRequest};

/// Request headers never copied to the origin, compared ignoring case.
pub const IGNORED_HEADERS: [&str; 2] = ["host", "proxy-connection"];

/// Framing header re-derived by the upstream client for streamed bodies.
const REFRAMED_HEADER: &str = "transfer-encoding";

const STANDARD_METHODS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
    Method::CONNECT,
    Method::PATCH,
    Method::TRACE,
];

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Re-issues forward requests to the origin server.
#[derive(Clone)]
pub struct ForwardHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl ForwardHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }

    /// Execute `request` against its origin and relay the response.
    ///
    /// Returns the origin status code once the whole body has been relayed.
    pub async fn handle(&self, request: Request, peer: IpAddr) -> ProxyResult<u16> {
        let (head, body, mut sink) = request.into_parts();
        let outbound = build_upstream_request(&head, body, peer)?;
        tracing::debug!(method = %outbound.method, uri = %outbound.uri, "Forwarding request");

        let response = self.upstream.send(outbound).await?;
        let status = response.status().as_u16();
        tracing::debug!(
            status,
            version = ?response.version(),
            header_count = response.headers().len(),
            "Origin responded"
        );

        let relayed = response.relay_to(&mut sink).await;
        shutdown_quietly(&mut sink, "client").await;
        let bytes = relayed?;

        metrics::record_forward(status);
        tracing::info!(
            method = head.method(),
            target = %head.target(),
            status,
            bytes,
            "Forward request completed"
        );
        Ok(status)
    }
}

/// Build the outbound request for a forward request head.
pub fn build_upstream_request(
    head: &RequestHead,
    body: ClientReader,
    peer: IpAddr,
) -> ProxyResult<UpstreamRequest> {
    let method = outbound_method(head.method())?;

    let uri = match head.target() {
        Target::Absolute(uri) => uri.clone(),
        Target::Authority { .. } => {
            return Err(ProxyError::malformed("forward request needs an absolute URI"));
        }
    };

    let headers = forwarded_headers(head, peer);
    let body = if method == Method::GET {
        None
    } else {
        request_body(head, body)
    };

    Ok(UpstreamRequest {
        method,
        uri,
        headers,
        body,
    })
}

/// Parse the request method, upper-casing it when it names a standard method.
fn outbound_method(raw: &str) -> ProxyResult<Method> {
    let upper = raw.to_ascii_uppercase();
    if let Some(method) = STANDARD_METHODS.iter().find(|m| m.as_str() == upper) {
        return Ok(method.clone());
    }
    Method::from_bytes(raw.as_bytes())
        .map_err(|_| ProxyError::malformed(format!("invalid method '{}'", raw)))
}

/// Apply the forwarding policy to the client's headers.
pub fn forwarded_headers(head: &RequestHead, peer: IpAddr) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(head.headers().len() + 1);

    for (name, values) in head.headers().iter() {
        if is_ignored(name)
            || name.eq_ignore_ascii_case(X_FORWARDED_FOR)
            || name.eq_ignore_ascii_case(REFRAMED_HEADER)
        {
            continue;
        }
        let Some(value) = values.first() else {
            continue;
        };
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            tracing::debug!(header = name, "Dropping header that is not valid HTTP");
            continue;
        };
        // Names differing only in case collapse onto one entry; first wins.
        headers.entry(name).or_insert(value);
    }

    headers.insert(
        HeaderName::from_static(X_FORWARDED_FOR),
        HeaderValue::from_str(&peer.to_string()).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );
    headers
}

fn is_ignored(name: &str) -> bool {
    IGNORED_HEADERS.iter().any(|ignored| name.eq_ignore_ascii_case(ignored))
}

/// Body for a non-GET request.
///
/// `Content-Length` bounds the body; `Transfer-Encoding` streams until the
/// client closes its side; neither means there is no body.
fn request_body(head: &RequestHead, body: ClientReader) -> Option<UpstreamBody> {
    let headers = head.headers();
    let length = headers
        .first_ignore_case(CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse::<u64>().ok());

    match length {
        Some(length) => Some(Box::new(body.take(length))),
        None if headers.first_ignore_case(REFRAMED_HEADER).is_some() => Some(Box::new(body)),
        None => None,
    }
}
