//! Proxy request model.
//!
//! # Responsibilities
//! - Parse the request head into method, target and headers
//! - Classify the request as a forward request or a CONNECT tunnel
//! - Own the client stream halves for the lifetime of the request
//!
//! # Design Decisions
//! - Header names are stored as received; matching policy is up to callers
//! - Repeated header names keep every value, in wire order
//! - A parsed request is immutable; handlers take it apart with `into_parts`

use std::str::FromStr;

use hyper::http::uri::Authority;
use hyper::Uri;
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::error::{ProxyError, ProxyResult};
use crate::http::preamble::read_preamble;

/// Readable half of a client connection, positioned after the request head.
pub type ClientReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Writable half of a client connection.
pub type ClientWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Port assumed for a CONNECT authority without one.
pub const DEFAULT_TUNNEL_PORT: u16 = 443;

/// Ordered header mapping. Each name maps to all of its values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under `name`, keeping earlier values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// All values stored under exactly `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// First value stored under exactly `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First value of the first entry whose name matches ignoring ASCII case.
    pub fn first_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the request is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Absolute URI of a forward request.
    Absolute(Uri),
    /// `host:port` of a CONNECT request.
    Authority { host: String, port: u16 },
}

impl Target {
    fn parse_absolute(raw: &str) -> ProxyResult<Self> {
        let uri = Uri::from_str(raw)
            .map_err(|e| ProxyError::malformed(format!("invalid target '{}': {}", raw, e)))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ProxyError::malformed(format!(
                "forward target must be an absolute URI: '{}'",
                raw
            )));
        }
        Ok(Target::Absolute(uri))
    }

    fn parse_authority(raw: &str) -> ProxyResult<Self> {
        let authority = Authority::from_str(raw)
            .map_err(|e| ProxyError::malformed(format!("invalid CONNECT target '{}': {}", raw, e)))?;
        if authority.as_str().contains('@') {
            return Err(ProxyError::malformed(format!(
                "CONNECT target must not carry credentials: '{}'",
                raw
            )));
        }
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(ProxyError::malformed(format!("CONNECT target has no host: '{}'", raw)));
        }
        Ok(Target::Authority {
            host,
            port: authority.port_u16().unwrap_or(DEFAULT_TUNNEL_PORT),
        })
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Absolute(uri) => write!(f, "{}", uri),
            Target::Authority { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Target::Authority { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// The parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    method: String,
    target: Target,
    version: String,
    headers: Headers,
}

impl RequestHead {
    /// Parse a request head (without its terminating blank line).
    pub fn parse(head: &str) -> ProxyResult<Self> {
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let tokens: Vec<&str> = request_line.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.len() < 3 {
            return Err(ProxyError::malformed(format!(
                "invalid request line: '{}'",
                request_line
            )));
        }
        let method = tokens[0].to_string();
        let target = if method.eq_ignore_ascii_case("CONNECT") {
            Target::parse_authority(tokens[1])?
        } else {
            Target::parse_absolute(tokens[1])?
        };

        let mut headers = Headers::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProxyError::malformed(format!("header line without colon: '{}'", line)))?;
            if name.is_empty() {
                return Err(ProxyError::malformed(format!("header line without name: '{}'", line)));
            }
            headers.append(name, value.trim());
        }

        Ok(Self {
            method,
            target,
            version: tokens[2].to_string(),
            headers,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Protocol marker from the request line, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// True for CONNECT requests.
    pub fn is_tunnel(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }
}

/// A proxy request together with the client stream it arrived on.
pub struct Request {
    head: RequestHead,
    body: ClientReader,
    sink: ClientWriter,
}

impl Request {
    /// Read and parse a request head from the client stream.
    pub async fn read_from(
        mut body: ClientReader,
        sink: ClientWriter,
        max_preamble_bytes: usize,
    ) -> ProxyResult<Self> {
        let preamble = read_preamble(&mut body, max_preamble_bytes).await?;
        let head = RequestHead::parse(&preamble)?;
        Ok(Self { head, body, sink })
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn is_tunnel(&self) -> bool {
        self.head.is_tunnel()
    }

    /// Split into head, remaining client body and client sink.
    pub fn into_parts(self) -> (RequestHead, ClientReader, ClientWriter) {
        (self.head, self.body, self.sink)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").field("head", &self.head).finish_non_exhaustive()
    }
}
