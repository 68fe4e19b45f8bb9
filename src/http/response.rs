//! Origin response model and relay to the client.
//!
//! The client sees a bare status line, `"<version> <status>\n\n"`, followed
//! by the origin body byte-for-byte. Origin headers are kept for logging only.

use hyper::{HeaderMap, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Readable origin body.
pub type ResponseBody = Box<dyn AsyncRead + Send + Unpin>;

/// Response received from the origin server.
pub struct Response {
    version: Version,
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    pub fn new(version: Version, status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            version,
            status,
            headers,
            body,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Status line as written to the client.
    pub fn status_line(&self) -> String {
        format!("{} {}\n\n", version_token(self.version), self.status.as_u16())
    }

    /// Write the status line and copy the body to `sink`.
    ///
    /// Returns the number of body bytes relayed.
    pub async fn relay_to<W>(mut self, sink: &mut W) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        sink.write_all(self.status_line().as_bytes()).await?;
        let copied = tokio::io::copy(&mut self.body, sink).await?;
        sink.flush().await?;
        Ok(copied)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("version", &self.version)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Protocol token for a version, e.g. `HTTP/1.1`.
pub fn version_token(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}
