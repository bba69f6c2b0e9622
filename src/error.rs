//! Frame graph error types.

use std::fmt;

/// Errors that can occur while declaring or compiling a frame graph.
///
/// Most of these are reported as non-fatal preconditions: the offending
/// operation logs the error, returns a sentinel (an uninitialized handle or
/// `false`), and the rest of the graph still compiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameGraphError {
    /// A handle is uninitialized or refers to a stale resource version.
    InvalidHandle {
        /// Slot index carried by the handle.
        index: u16,
        /// Version carried by the handle.
        version: u16,
    },
    /// The requested usage is not a subset of an imported resource's
    /// declared capabilities.
    IncompatibleUsage(String),
    /// A resource node would receive a second writer for the same version.
    DoubleWriter(String),
    /// A handle's slot index is out of range.
    UnknownResource(u16),
    /// An edge was linked after the graph had already been culled.
    GraphAlreadyCulled,
}

impl fmt::Display for FrameGraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle { index, version } => {
                write!(
                    f,
                    "resource handle is invalid or uninitialized (index={index}, version={version})"
                )
            }
            Self::IncompatibleUsage(msg) => write!(f, "incompatible usage: {msg}"),
            Self::DoubleWriter(msg) => write!(f, "double writer: {msg}"),
            Self::UnknownResource(index) => write!(f, "unknown resource (index={index})"),
            Self::GraphAlreadyCulled => write!(f, "graph has already been culled"),
        }
    }
}

impl std::error::Error for FrameGraphError {}
