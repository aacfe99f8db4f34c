//! The error taxonomy of §7: allocation failure, protocol misuse, resource failure, backend
//! failure, and fatal startup failure. Every fallible core entry point returns
//! `Result<T, CoreError>`; nothing client-reachable panics.

use std::fmt;

/// The kind of object a [`CoreError::Protocol`] error was raised against, for logging and for
/// a wire layer to map back onto the right protocol object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Surface,
    Buffer,
    Output,
    ShellSurface,
    DataSource,
    DataOffer,
    Input,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::Surface => "surface",
            ObjectKind::Buffer => "buffer",
            ObjectKind::Output => "output",
            ObjectKind::ShellSurface => "shell_surface",
            ObjectKind::DataSource => "data_source",
            ObjectKind::DataOffer => "data_offer",
            ObjectKind::Input => "input_device",
        };
        f.write_str(s)
    }
}

/// Errors the core can raise. See §7 for the taxonomy these variants implement.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Surface/buffer/binding creation failed due to allocation exhaustion. The request is
    /// dropped and the client told "no memory"; the compositor remains live.
    #[error("allocation failed while creating a {0}")]
    Alloc(ObjectKind),

    /// A client misused the protocol (illegal role transition, double-bound singleton, out of
    /// range resize edges, ...). The caller should report a protocol error on `object` and drop
    /// the client connection.
    #[error("protocol error on {object}: {message}")]
    Protocol { object: ObjectKind, message: String },

    /// A GPU-adjacent operation (texture upload, driver image creation) failed. The surface
    /// keeps its previous texture and damage is left scheduled so the next repaint retries.
    #[error("resource failure: {message}")]
    Resource { message: String },

    /// The backend refused an optional optimization (scanout, hardware cursor). Callers fall
    /// back to the software path; this is never propagated to the client.
    #[error("backend declined: {message}")]
    Backend { message: String },

    /// Unrecoverable startup failure (GPU context init, socket bind). The caller should log
    /// this and exit with a non-zero status.
    #[error("fatal: {0}")]
    Fatal(#[from] std::io::Error),
}

impl CoreError {
    pub fn protocol(object: ObjectKind, message: impl Into<String>) -> Self {
        CoreError::Protocol {
            object,
            message: message.into(),
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        CoreError::Resource {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        CoreError::Backend {
            message: message.into(),
        }
    }

    /// Whether this error should terminate the offending client connection.
    pub fn is_protocol(&self) -> bool {
        matches!(self, CoreError::Protocol { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
