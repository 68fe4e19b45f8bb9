//! Request head framing.
//!
//! # Responsibilities
//! - Read the request line and headers off a raw client stream
//! - Stop exactly at the first `\r\n\r\n`, leaving the body unread
//! - Reject truncated, oversized or non-UTF-8 heads
//!
//! # Design Decisions
//! - Works on `AsyncBufRead`: bytes after the terminator stay buffered in the
//!   reader and become the start of the request body
//! - A 4-byte sliding window detects the terminator even when it straddles
//!   two buffer fills

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{ProxyError, ProxyResult};

/// Marks the end of the request head.
pub const TERMINATOR: [u8; 4] = *b"\r\n\r\n";

/// Default cap on the size of a request head, terminator included.
pub const DEFAULT_MAX_PREAMBLE_BYTES: usize = 64 * 1024;

/// Read the request head from `reader`.
///
/// Returns the text preceding the first `\r\n\r\n`. Exactly the head bytes
/// plus the terminator are consumed from the reader.
pub async fn read_preamble<R>(reader: &mut R, max_bytes: usize) -> ProxyResult<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut head: Vec<u8> = Vec::with_capacity(512);
    let mut window = [0u8; 4];

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(ProxyError::malformed(if head.is_empty() {
                "empty request"
            } else {
                "stream ended before end of request head"
            }));
        }

        let mut consumed = 0;
        let mut complete = false;
        for &byte in available {
            consumed += 1;
            window.rotate_left(1);
            window[3] = byte;
            head.push(byte);
            if window == TERMINATOR {
                complete = true;
                break;
            }
            if head.len() >= max_bytes {
                break;
            }
        }
        reader.consume(consumed);

        if complete {
            head.truncate(head.len() - TERMINATOR.len());
            return String::from_utf8(head)
                .map_err(|_| ProxyError::malformed("request head is not valid UTF-8"));
        }
        if head.len() >= max_bytes {
            return Err(ProxyError::malformed(format!(
                "request head exceeds {} bytes",
                max_bytes
            )));
        }
    }
}
