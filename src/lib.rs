//! Forward HTTP proxy library.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                    FORWARD PROXY                     │
//!                    │                                                      │
//!   Client           │  ┌─────────┐   ┌────────────┐   ┌──────────────┐     │
//!   ─────────────────┼─▶│   net   │──▶│ dispatcher │──▶│     http     │     │
//!                    │  │listener │   │ + pool     │   │  preamble +  │     │
//!                    │  └─────────┘   └────────────┘   │  request     │     │
//!                    │                                 └──────┬───────┘     │
//!                    │                    CONNECT ┌───────────┴──┐ other    │
//!                    │                            ▼              ▼          │
//!                    │                   ┌──────────────┐ ┌──────────────┐  │
//!   Target   ◀───────┼───────────────────│proxy::tunnel │ │proxy::forward│  │
//!   (raw bytes)      │                   └──────────────┘ └──────┬───────┘  │
//!                    │                                           ▼          │
//!   Origin   ◀───────┼────────────────────────────────── ┌──────────────┐   │
//!   (HTTP)           │                                   │   upstream   │   │
//!                    │                                   └──────────────┘   │
//!                    │  ┌───────────────────────────────────────────────┐   │
//!                    │  │ config · lifecycle · observability · error    │   │
//!                    │  └───────────────────────────────────────────────┘   │
//!                    └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod proxy;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use lifecycle::Shutdown;
pub use net::Dispatcher;
