//! Non-blocking outbound write pipeline for WebSocket, HTTP/1.1 and
//! HTTP/2 connections.
//!
//! The pipeline turns a caller's payload into correctly framed bytes,
//! drives them onto an [`tokio::io::AsyncWrite`] transport without ever
//! blocking, and transparently buffers whatever the transport didn't
//! accept so the caller can resume on the next writable event. See
//! [`dispatch::write`] for the entry point and `DESIGN.md` for how each
//! module maps onto the write path.

pub mod config;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod ext;
pub mod file_pump;
pub mod h2;
pub mod pt;
pub mod raw;
pub mod stats;
pub mod transport;
pub mod trunc;
pub mod ws;

#[cfg(test)]
mod test_support;

pub use config::WriteConfig;
pub use conn::{Conn, ConnState, Mode};
pub use dispatch::{write, Kind, WriteProtocol};
pub use error::{BoxError, ErrorExt, Result, WriteError};
pub use file_pump::{pump_file, CompletionAction, FileCompletion, FileProvider, HtmlInterpreter, PumpOutcome};
pub use pt::{ConnId, Pt};
pub use ws::{FramedBuf, Role};
