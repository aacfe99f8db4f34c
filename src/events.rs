//! Client-facing event emission. The wire-level protocol marshaller itself is out of scope
//! (§1); what *is* in scope is the ordering and content of the events the core decides to
//! send, which is exactly what §4.7's ordering guarantees and §8's scenarios pin down. This
//! trait is the seam: a real wire layer implements it by encoding and writing to a client
//! socket, and a recording test double implements it to make the ordering guarantees
//! assertable without a transport.

use crate::surface::SurfaceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

/// Server-to-client events, keyed to the surface whose client should receive them.
pub trait ClientEvents {
    fn pointer_enter(&self, surface: &SurfaceHandle, time: u32, sx: i32, sy: i32);
    fn pointer_leave(&self, surface: &SurfaceHandle, time: u32);
    fn pointer_motion(&self, surface: &SurfaceHandle, time: u32, sx: i32, sy: i32);
    fn pointer_button(&self, surface: &SurfaceHandle, time: u32, button: u32, state: ButtonState);

    fn keyboard_enter(&self, surface: &SurfaceHandle, time: u32, keys: &[u32]);
    fn keyboard_leave(&self, surface: &SurfaceHandle, time: u32);
    fn keyboard_key(&self, surface: &SurfaceHandle, time: u32, key: u32, state: KeyState);

    /// A map event: the surface just transitioned from unmapped to a concrete role.
    fn map(&self, surface: &SurfaceHandle, x: i32, y: i32, width: i32, height: i32);
    /// A configure event: the shell is asking the client to move/resize to `(x, y, w, h)`.
    fn configure(&self, surface: &SurfaceHandle, x: i32, y: i32, width: i32, height: i32);
    /// A frame-completion (`wl_callback.done`-equivalent) event.
    fn frame_done(&self, surface: &SurfaceHandle, msecs: u32);

    /// A data-offer broadcast carrying the available MIME types (C9).
    fn data_offer(&self, surface: &SurfaceHandle, mime_types: &[String]);
    fn drag_enter(&self, surface: &SurfaceHandle, time: u32, sx: i32, sy: i32);
    fn drag_motion(&self, surface: &SurfaceHandle, time: u32, sx: i32, sy: i32);
    fn drag_leave(&self, surface: &SurfaceHandle, time: u32);
    fn drag_drop(&self, surface: &SurfaceHandle, time: u32);

    /// A protocol error on some client object; the caller is expected to drop the
    /// connection after this (§7).
    fn protocol_error(&self, object: crate::error::ObjectKind, message: &str);

    /// Ask the lock-screen helper to provide a lock surface (§4.8 `lock()`). The helper
    /// answers asynchronously via [`crate::shell::DesktopShell::provide_lock_surface`].
    fn prepare_lock_surface(&self);
    /// Ask the lock-screen helper to clear its lock state (§4.8 `unlock()`). The helper
    /// answers asynchronously via [`crate::shell::DesktopShell::acknowledge_unlock`].
    fn prepare_unlock(&self);
}
