//! Buffer registry (C3): external pixel sources and the set of surfaces attached to each.
//!
//! A [`Buffer`] is owned by the client connection that created it; the core only ever holds
//! a [`std::rc::Weak`] reference plus the symmetric attached-surface link described in §3 and
//! §9. The buffer never owns a surface — the link exists purely so [`Buffer::release`] can
//! detach every attached surface in O(attached-surfaces) without a full scan of the scene.

use crate::surface::{Surface, SurfaceHandle, WeakSurface};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Pixel format / alpha semantics, shared by [`Buffer`] and [`crate::surface::Surface`]. Also
/// used to select the blending policy in the renderer (C6 §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visual {
    /// No alpha channel; blending disabled.
    OpaqueRgb,
    /// Alpha channel already multiplied into the color channels.
    PremultipliedArgb,
    /// Alpha channel not multiplied into the color channels.
    StraightArgb,
}

/// How a buffer's pixels reach the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Client shared memory; the core uploads pixels into a texture.
    Shm,
    /// A driver-allocated image (dmabuf-equivalent); the core targets the texture via an
    /// imported driver image instead of copying pixels.
    DriverImage,
}

pub type BufferHandle = Rc<RefCell<Buffer>>;
pub type WeakBuffer = Weak<RefCell<Buffer>>;

/// An external pixel source. See the module docs for the ownership model.
#[derive(Debug)]
pub struct Buffer {
    pub width: i32,
    pub height: i32,
    pub pitch: i32,
    pub visual: Visual,
    pub kind: BufferKind,
    attached: Vec<WeakSurface>,
}

impl Buffer {
    pub fn new(width: i32, height: i32, pitch: i32, visual: Visual, kind: BufferKind) -> BufferHandle {
        Rc::new(RefCell::new(Buffer {
            width,
            height,
            pitch,
            visual,
            kind,
            attached: Vec::new(),
        }))
    }

    /// Link `surface` into this buffer's attached-surface set, exactly once.
    pub(crate) fn attach(this: &BufferHandle, surface: &SurfaceHandle) {
        let mut buf = this.borrow_mut();
        if !buf.attached.iter().any(|w| weak_points_to(w, surface)) {
            buf.attached.push(Rc::downgrade(surface));
        }
    }

    /// Unlink `surface` from this buffer's attached-surface set, if present.
    pub(crate) fn detach(this: &BufferHandle, surface: &SurfaceHandle) {
        let mut buf = this.borrow_mut();
        buf.attached.retain(|w| !weak_points_to(w, surface));
    }

    pub fn attached_surface_count(&self) -> usize {
        self.attached.iter().filter(|w| w.strong_count() > 0).count()
    }

    /// A shared-memory buffer was damaged by the client: re-upload pixels to every attached
    /// surface's texture (full-image upload; see §4.3 on sub-image upload).
    pub fn notify_damaged(this: &BufferHandle, backend: &dyn crate::backend::Backend) {
        let buf = this.borrow();
        for weak in &buf.attached {
            if let Some(surface) = weak.upgrade() {
                let tex = surface.borrow().texture;
                if let Err(err) = backend.upload_buffer(tex, &buf) {
                    tracing::warn!(?err, "buffer re-upload failed, texture left stale until next retry");
                }
            }
        }
    }

    /// Release this buffer: clear every attached surface's buffer back-link and empty the
    /// attached-surface set. Called when the owning client destroys the buffer.
    pub fn release(this: &BufferHandle) {
        let attached = std::mem::take(&mut this.borrow_mut().attached);
        for weak in attached {
            if let Some(surface) = weak.upgrade() {
                Surface::clear_buffer_link(&surface);
            }
        }
    }
}

fn weak_points_to(weak: &WeakSurface, surface: &SurfaceHandle) -> bool {
    weak.upgrade().map(|s| Rc::ptr_eq(&s, surface)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface as Surf;
    use crate::test_util::RecordingBackend;

    #[test]
    fn release_clears_every_attached_surface() {
        let buffer = Buffer::new(10, 10, 40, Visual::OpaqueRgb, BufferKind::Shm);
        let s1 = Surf::new_unallocated(0, 0, 10, 10);
        let s2 = Surf::new_unallocated(0, 0, 10, 10);
        Buffer::attach(&buffer, &s1);
        Buffer::attach(&buffer, &s2);
        s1.borrow_mut().buffer = Some(Rc::downgrade(&buffer));
        s2.borrow_mut().buffer = Some(Rc::downgrade(&buffer));

        Buffer::release(&buffer);

        assert!(s1.borrow().buffer.is_none());
        assert!(s2.borrow().buffer.is_none());
        assert_eq!(buffer.borrow().attached_surface_count(), 0);
    }

    #[test]
    fn attach_is_idempotent() {
        let buffer = Buffer::new(10, 10, 40, Visual::OpaqueRgb, BufferKind::Shm);
        let s1 = Surf::new_unallocated(0, 0, 10, 10);
        Buffer::attach(&buffer, &s1);
        Buffer::attach(&buffer, &s1);
        assert_eq!(buffer.borrow().attached_surface_count(), 1);
    }

    #[test]
    fn notify_damaged_reuploads_to_attached_surfaces() {
        let buffer = Buffer::new(4, 4, 16, Visual::OpaqueRgb, BufferKind::Shm);
        let s1 = Surf::new_unallocated(0, 0, 4, 4);
        Buffer::attach(&buffer, &s1);
        let backend = RecordingBackend::default();
        Buffer::notify_damaged(&buffer, &backend);
        assert_eq!(backend.uploads.borrow().len(), 1);
    }
}
