//! The backend interface (§6): everything the core treats as an external collaborator — the
//! GPU context, the output driver, and cursor-image decoding. The core never talks to a real
//! GPU or KMS/X11/nested driver directly; it only ever calls through this trait object.

use crate::buffer::Buffer;
use crate::input::Input;
use crate::output::OutputHandle;
use crate::surface::{SurfaceHandle, TextureName};

/// One rectangle of one surface, fully resolved for drawing: the renderer (C6) produces a
/// sequence of these per repaint and hands them to the backend instead of issuing GL calls
/// itself, so the draw pass can be tested (§8 scenario 2/5) without a GPU context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub texture: TextureName,
    /// Screen-space rectangle actually drawn (already clipped to damage).
    pub rect: crate::geometry::Rectangle,
    pub blend: BlendMode,
}

/// Blending policy selected by a surface's visual (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Opaque RGB: blending off.
    Opaque,
    /// Premultiplied ARGB: `(ONE, ONE_MINUS_SRC_ALPHA)`.
    Premultiplied,
    /// Straight ARGB: `(SRC_ALPHA, ONE_MINUS_SRC_ALPHA)`.
    Straight,
}

/// The per-output and per-compositor hooks a real backend (KMS/X11/nested, or a test double)
/// must implement. See §6 for the protocol-level framing of each call.
pub trait Backend {
    /// Allocate a new, uninitialized GPU texture name. `None` on allocation exhaustion.
    fn create_texture(&self) -> Option<TextureName>;

    /// Release a GPU texture. Called from every surface destruction path (§9).
    fn destroy_texture(&self, texture: TextureName);

    /// Upload a shared-memory buffer's pixels into `texture` (full-image upload, §4.3).
    fn upload_buffer(&self, texture: TextureName, buffer: &Buffer) -> Result<(), ()>;

    /// Import a driver-image buffer and target `texture` via it.
    fn import_driver_image(&self, texture: TextureName, buffer: &Buffer) -> Result<(), ()>;

    /// Record one resolved draw call (§4.6 step 4/6/7).
    fn draw(&self, call: DrawCall);

    /// Clear a rectangle to the background color when no background surface is mapped
    /// (§4.6 step 5).
    fn clear(&self, rect: crate::geometry::Rectangle);

    /// Backend hook run before the renderer walks the stack for `output`.
    fn prepare_render(&self, output: &OutputHandle);

    /// Ask the backend to present `output`'s current frame.
    fn present(&self, output: &OutputHandle);

    /// Ask the backend to scan `surface` out directly on `output`, bypassing composition.
    /// Returns `true` on success (§4.6 step 3).
    fn prepare_scanout_surface(&self, output: &OutputHandle, surface: &SurfaceHandle) -> bool;

    /// Ask the backend to promote `input`'s cursor sprite to a hardware cursor. Returns
    /// `true` on success (§4.6 step 7, §4.7 cursor damage).
    fn set_hardware_cursor(&self, input: &Input) -> bool;

    /// Decode/allocate a cursor image of the given size (e.g. a PNG sprite); opaque to the
    /// core beyond the resulting texture name.
    fn create_cursor_image(&self, width: i32, height: i32) -> Option<TextureName>;

    /// Authenticate a client's DRM magic cookie (or backend-equivalent identity check).
    fn authenticate(&self, id: u32) -> bool;

    /// Tear down the backend. Called once, on orderly shutdown (§6 Exit).
    fn destroy(&self);
}
