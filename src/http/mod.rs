//! HTTP framing subsystem.
//!
//! # Data Flow
//! ```text
//! Client byte stream
//!     → preamble.rs (read up to the first blank line)
//!     → request.rs (request line, headers, forward/tunnel classification)
//!     → [proxy handlers]
//!     → response.rs (status line + body relay, forward path only)
//!     → Client
//! ```

pub mod preamble;
pub mod request;
pub mod response;

pub use preamble::read_preamble;
pub use request::{ClientReader, ClientWriter, Headers, Request, RequestHead, Target};
pub use response::Response;
