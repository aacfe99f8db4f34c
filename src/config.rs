//! An explicit, immutable-after-construction configuration value (C10), replacing the
//! global mutable CLI state flagged in §9. Whatever populates this (argv parsing, a config
//! file, test fixtures) is external to the core; the core only ever reads a `Config` that
//! was handed to it at construction.

use std::path::PathBuf;

/// Which reference shell policy (§4.8) a [`crate::Compositor`] should install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellKind {
    #[default]
    Desktop,
    Tablet,
}

/// Startup configuration, mirroring the CLI surface of §6 (`--background`, `--connector`,
/// `--geometry`, `--socket`) without this crate parsing argv itself.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to a background image, opaque to the core: handed to the backend to decode and
    /// paint, never read by this crate.
    pub background: Option<PathBuf>,
    /// Backend connector selector (e.g. a DRM connector index); opaque to the core.
    pub connector: Option<i32>,
    /// Initial output geometry hint, `(width, height)`, used only when the backend doesn't
    /// report its own mode.
    pub geometry_hint: (i32, i32),
    /// Name of the listening socket; opaque to the core (consumed by the transport layer).
    pub socket_name: Option<String>,
    /// Which shell policy to install at startup.
    pub shell_kind: ShellKind,
    /// Idle timeout before the compositor transitions to `Sleeping` (§4.5).
    pub idle_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            background: None,
            connector: None,
            geometry_hint: (1024, 768),
            socket_name: None,
            shell_kind: ShellKind::Desktop,
            idle_timeout_ms: 5 * 60 * 1000,
        }
    }
}
