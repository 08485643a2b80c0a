//! Fault taxonomy. Every fault is recoverable: it is logged, answered with a failure
//! notification when a requester can be identified, and the daemon keeps serving.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::osc::DecodeError;

/// Anything that can go wrong between receiving a request and finishing its upload
#[derive(Debug, Error)]
pub enum Fault {
    #[error("protocol fault: {0}")]
    Protocol(#[from] DecodeError),
    #[error("validation fault: {0}")]
    Validation(#[from] ValidationFault),
    /// A validation fault where not even a path could be recovered for the reply
    #[error("unaddressable request: {0}")]
    Unaddressable(ValidationFault),
    #[error("duplicate request: {0} is already queued")]
    Duplicate(String),
    #[error("file fault: {0}")]
    File(#[from] FileFault),
    #[error("upload fault: {0:#}")]
    Upload(anyhow::Error),
    #[error("{0} is no longer queued")]
    Stale(String),
}

/// A decodable message that is not a well-formed upload request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationFault {
    #[error("unknown address {0:?}")]
    UnknownAddress(String),
    #[error("expected exactly 1 argument, got {0}")]
    ArgumentCount(usize),
    #[error("path argument must be a string, got type '{0}'")]
    ArgumentType(char),
}

#[derive(Debug, Error)]
pub enum FileFault {
    #[error("file not found {0:?}")]
    Missing(PathBuf),
    #[error("cannot stat {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("file size limit exceeded {path:?}: {size} > {limit} bytes")]
    Oversize { path: PathBuf, size: u64, limit: u64 },
}
