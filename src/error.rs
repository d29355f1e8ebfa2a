//! Error taxonomy for the write pipeline.

use std::fmt;
use std::io;

/// Type-erased error, for extension callbacks and file providers whose
/// concrete error type the core does not need to know about.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed error taxonomy for the write pipeline.
///
/// Each variant corresponds to one distinct failure condition callers
/// need to branch on, rather than a single opaque error type.
#[derive(Debug)]
pub enum WriteError {
    /// Socket or TLS error: connection must be torn down.
    Transport(io::Error),
    /// `write` called twice within one writable event, or a write issued
    /// from outside the writable callback.
    Reentrant,
    /// `issue_raw` was offered a fresh payload while residue was still
    /// pending; the caller must drain the truncation buffer first.
    ResiduePending,
    /// Negative or overflowing length passed to the public entry point.
    InvalidLength,
    /// An extension callback reported a fatal condition.
    Extension(BoxError),
    /// A length that cannot be represented in the selected WS header
    /// (payloads above `u32::MAX` on hosts that can't carry a true 64-bit
    /// length through the pipeline).
    PayloadTooLarge { len: usize },
    /// The file provider failed a seek/read.
    FilePump(BoxError),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Reentrant => write!(f, "write issued twice within one writable event"),
            Self::ResiduePending => write!(
                f,
                "fresh payload offered while truncation buffer still holds residue"
            ),
            Self::InvalidLength => write!(f, "invalid (negative or overflowing) write length"),
            Self::Extension(e) => write!(f, "extension callback failed: {e}"),
            Self::PayloadTooLarge { len } => {
                write!(f, "payload of {len} bytes cannot be framed on this host")
            }
            Self::FilePump(e) => write!(f, "file pump failed: {e}"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Extension(e) | Self::FilePump(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for WriteError {
    fn from(e: io::Error) -> Self {
        Self::Transport(e)
    }
}

/// Extension methods for enriching ad-hoc errors with context.
pub trait ErrorExt {
    fn context(self, msg: &'static str) -> BoxError;
}

impl<E> ErrorExt for E
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &'static str) -> BoxError {
        #[derive(Debug)]
        struct Context {
            msg: &'static str,
            source: BoxError,
        }
        impl fmt::Display for Context {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}: {}", self.msg, self.source)
            }
        }
        impl std::error::Error for Context {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(self.source.as_ref())
            }
        }
        Box::new(Context {
            msg,
            source: Box::new(self),
        })
    }
}

pub type Result<T> = std::result::Result<T, WriteError>;
