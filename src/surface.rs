//! Surface store (C2): the scene-graph entity and the operations the shell and protocol
//! layer drive it through.

use crate::backend::Backend;
use crate::buffer::{Buffer, BufferHandle, Visual, WeakBuffer};
use crate::compositor::Compositor;
use crate::error::{CoreError, ObjectKind};
use crate::geometry::{Mat4, Rectangle};
use crate::output::WeakOutput;
use crate::signal::Signal;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// An opaque GPU texture name. Allocation/release is delegated to the [`Backend`]; the core
/// never interprets the value, only threads it through.
pub type TextureName = u64;

/// The role a mapped surface plays, which determines stacking and placement (§3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unmapped,
    Toplevel,
    Transient,
    Fullscreen,
    Panel,
    Background,
    Lock,
    CursorSprite,
}

impl Role {
    pub fn is_mapped(&self) -> bool {
        !matches!(self, Role::Unmapped)
    }
}

pub type SurfaceHandle = Rc<RefCell<Surface>>;
pub type WeakSurface = Weak<RefCell<Surface>>;

/// The scene-graph node described in §3. See the module docs for lifecycle notes.
#[derive(Debug)]
pub struct Surface {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub pitch: i32,
    pub forward: Mat4,
    pub inverse: Mat4,
    pub visual: Visual,
    pub buffer: Option<WeakBuffer>,
    pub texture: TextureName,
    pub saved_texture: Option<TextureName>,
    pub role: Role,
    pub output: Option<WeakOutput>,
    pub fullscreen_output: Option<WeakOutput>,
    pub saved_pos: Option<(i32, i32)>,
    pub(crate) destroy_signal: Signal,
}

impl Surface {
    /// Create an unmapped surface with an identity-like transform (C2 `create`). Fails only
    /// on texture allocation exhaustion, per §7's allocation-failure taxonomy.
    pub fn create(backend: &dyn Backend, x: i32, y: i32, w: i32, h: i32) -> Result<SurfaceHandle, CoreError> {
        let texture = backend
            .create_texture()
            .ok_or(CoreError::Alloc(ObjectKind::Surface))?;
        let mut surface = Surface {
            x,
            y,
            width: w,
            height: h,
            pitch: 0,
            forward: Mat4::identity(),
            inverse: Mat4::identity(),
            visual: Visual::OpaqueRgb,
            buffer: None,
            texture,
            saved_texture: None,
            role: Role::Unmapped,
            output: None,
            fullscreen_output: None,
            saved_pos: None,
            destroy_signal: Signal::new(),
        };
        surface.update_matrix();
        Ok(Rc::new(RefCell::new(surface)))
    }

    /// A surface with no backend-allocated texture (`texture == 0`), used both by tests and
    /// to seed a seat's cursor-sprite surface before any buffer has been attached to it.
    pub(crate) fn new_unallocated(x: i32, y: i32, w: i32, h: i32) -> SurfaceHandle {
        let mut surface = Surface {
            x,
            y,
            width: w,
            height: h,
            pitch: 0,
            forward: Mat4::identity(),
            inverse: Mat4::identity(),
            visual: Visual::OpaqueRgb,
            buffer: None,
            texture: 0,
            saved_texture: None,
            role: Role::Unmapped,
            output: None,
            fullscreen_output: None,
            saved_pos: None,
            destroy_signal: Signal::new(),
        };
        surface.update_matrix();
        Rc::new(RefCell::new(surface))
    }

    pub fn rect(&self) -> Rectangle {
        Rectangle::new(self.x, self.y, self.width, self.height)
    }

    /// Recompute the forward/inverse transforms from `(x, y, w, h)` (C2 `update_matrix`).
    /// `forward` maps normalized surface-local `[0,1]^2` coordinates to screen space;
    /// `inverse` is its exact affine inverse (§8: `forward . inverse = I` to 1e-5).
    pub fn update_matrix(&mut self) {
        self.forward = Mat4::translate(self.x as f32, self.y as f32, 0.0) * Mat4::scale(self.width as f32, self.height as f32, 1.0);
        self.inverse = self.forward.affine_inverse();
    }

    /// Convert a screen-space point to surface-local integer pixel coordinates (C2
    /// `transform_point`).
    pub fn transform_point(&self, sx: i32, sy: i32) -> (i32, i32) {
        let normalized = self.inverse.transform([sx as f32, sy as f32, 0.0, 1.0]);
        const EPSILON: f32 = 1e-4;
        (
            (normalized[0] * self.width as f32 + EPSILON).floor() as i32,
            (normalized[1] * self.height as f32 + EPSILON).floor() as i32,
        )
    }

    /// Whether screen point `(sx, sy)` falls within this surface's mapped bounds.
    pub fn hit_test(&self, sx: i32, sy: i32) -> bool {
        let (lx, ly) = self.transform_point(sx, sy);
        lx >= 0 && lx < self.width && ly >= 0 && ly < self.height
    }

    /// Atomic role write (C2). Any transition is legal except away from `Lock`.
    pub fn set_role(this: &SurfaceHandle, role: Role) -> Result<(), CoreError> {
        let mut surface = this.borrow_mut();
        if surface.role == Role::Lock && role != Role::Lock {
            return Err(CoreError::protocol(
                ObjectKind::Surface,
                "cannot reassign a lock surface's role",
            ));
        }
        surface.role = role;
        Ok(())
    }

    /// Damage this surface's full rectangle, in screen space (C2 `damage`). Legal even while
    /// unmapped, to erase the surface's previous footprint.
    pub fn damage(compositor: &mut Compositor, this: &SurfaceHandle) {
        let rect = this.borrow().rect();
        compositor.damage_rect(rect);
    }

    /// Damage a sub-rectangle of this surface, translated into screen space (C2
    /// `damage_rect`).
    pub fn damage_rect(compositor: &mut Compositor, this: &SurfaceHandle, x: i32, y: i32, w: i32, h: i32) {
        let surface = this.borrow();
        let rect = Rectangle::new(surface.x + x, surface.y + y, w, h);
        drop(surface);
        compositor.damage_rect(rect);
    }

    /// Raise to the top of the compositor stack (C2 `raise`).
    pub fn raise(compositor: &mut Compositor, this: &SurfaceHandle) {
        compositor.raise_surface(this);
    }

    /// Bind `buffer` to this surface (C2 `attach_buffer`): erase the old footprint, detach
    /// the old buffer link, upload/import the new one, resize, and re-assign an output if the
    /// surface moved.
    pub fn attach_buffer(
        compositor: &mut Compositor,
        this: &SurfaceHandle,
        buffer: &BufferHandle,
        dx: i32,
        dy: i32,
    ) -> Result<(), CoreError> {
        Surface::damage(compositor, this);

        if let Some(old) = this.borrow().buffer.as_ref().and_then(Weak::upgrade) {
            Buffer::detach(&old, this);
        }

        let (tex, kind, width, height, visual) = {
            let buf = buffer.borrow();
            (this.borrow().texture, buf.kind, buf.width, buf.height, buf.visual)
        };
        match kind {
            crate::buffer::BufferKind::Shm => compositor
                .backend
                .upload_buffer(tex, &buffer.borrow())
                .map_err(|_| CoreError::resource("shm upload failed"))?,
            crate::buffer::BufferKind::DriverImage => compositor
                .backend
                .import_driver_image(tex, &buffer.borrow())
                .map_err(|_| CoreError::resource("driver image import failed"))?,
        }

        {
            let mut surface = this.borrow_mut();
            surface.x += dx;
            surface.y += dy;
            surface.width = width;
            surface.height = height;
            surface.visual = visual;
            surface.update_matrix();
        }

        if (dx, dy) != (0, 0) {
            let (sx, sy) = (this.borrow().x, this.borrow().y);
            let output = compositor.outputs.find_at(sx, sy);
            this.borrow_mut().output = output.as_ref().map(Rc::downgrade);
        }

        Surface::damage(compositor, this);
        this.borrow_mut().buffer = Some(Rc::downgrade(buffer));
        Buffer::attach(buffer, this);
        Ok(())
    }

    /// Called by [`Buffer::release`] to clear the back-link when the owning buffer is
    /// destroyed.
    pub(crate) fn clear_buffer_link(this: &SurfaceHandle) {
        this.borrow_mut().buffer = None;
    }

    /// Swap in a driver-image cursor texture, saving the previous one (used while the
    /// pointer's cursor sprite surface is backed by a hardware-cursor-eligible image).
    pub fn swap_texture(this: &SurfaceHandle, new_texture: TextureName) {
        let mut surface = this.borrow_mut();
        let current = surface.texture;
        surface.saved_texture.get_or_insert(current);
        surface.texture = new_texture;
    }

    pub fn restore_texture(this: &SurfaceHandle) {
        let mut surface = this.borrow_mut();
        if let Some(saved) = surface.saved_texture.take() {
            surface.texture = saved;
        }
    }

    /// Clear a fullscreen assignment, restoring the saved position (used both by the shell's
    /// un-fullscreen path and by output removal, §4.4 expansion).
    pub fn unset_fullscreen(this: &SurfaceHandle) {
        let mut surface = this.borrow_mut();
        if let Some((x, y)) = surface.saved_pos.take() {
            surface.x = x;
            surface.y = y;
        }
        surface.fullscreen_output = None;
        if surface.role == Role::Fullscreen {
            surface.role = Role::Toplevel;
        }
        surface.update_matrix();
    }

    /// Subscribe to this surface's destruction (§9 event-emitter pattern).
    pub fn on_destroy(this: &SurfaceHandle, callback: impl FnMut() + 'static) -> crate::signal::ListenerToken {
        this.borrow_mut().destroy_signal.subscribe(callback)
    }

    /// Destroy this surface: fire destroy listeners, detach from any bound buffer, release
    /// the GPU texture, and unlink from the compositor stack/outputs. Uses a `scopeguard` so
    /// the texture is released exactly once even if an earlier step in a future revision of
    /// this function returns early.
    pub fn destroy(compositor: &mut Compositor, this: SurfaceHandle) {
        {
            let mut surface = this.borrow_mut();
            surface.destroy_signal.fire();
        }
        if let Some(buf) = this.borrow().buffer.as_ref().and_then(Weak::upgrade) {
            Buffer::detach(&buf, &this);
        }
        let tex = this.borrow().texture;
        {
            let backend = compositor.backend.as_ref();
            let _release_guard = scopeguard::guard(tex, |t| backend.destroy_texture(t));
        }

        compositor.unlink_surface(&this);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::test_compositor;

    #[test]
    fn update_matrix_inverts_within_tolerance() {
        let surface = Surface::new_unallocated(10, 20, 200, 100);
        let s = surface.borrow();
        let (lx, ly) = s.transform_point(10, 20);
        assert_eq!((lx, ly), (0, 0));
        let (lx2, ly2) = s.transform_point(209, 119);
        assert_eq!((lx2, ly2), (199, 99));
    }

    #[test]
    fn set_role_rejects_transition_away_from_lock() {
        let surface = Surface::new_unallocated(0, 0, 10, 10);
        Surface::set_role(&surface, Role::Lock).unwrap();
        let err = Surface::set_role(&surface, Role::Toplevel).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn set_role_allows_other_transitions() {
        let surface = Surface::new_unallocated(0, 0, 10, 10);
        Surface::set_role(&surface, Role::Toplevel).unwrap();
        Surface::set_role(&surface, Role::Transient).unwrap();
        assert_eq!(surface.borrow().role, Role::Transient);
    }

    #[test]
    fn attach_buffer_is_idempotent() {
        let mut compositor = test_compositor();
        let surface = Surface::create(compositor.backend.as_ref(), 0, 0, 1, 1).unwrap();
        let buffer = Buffer::new(200, 100, 800, Visual::OpaqueRgb, crate::buffer::BufferKind::Shm);

        Surface::attach_buffer(&mut compositor, &surface, &buffer, 0, 0).unwrap();
        Surface::attach_buffer(&mut compositor, &surface, &buffer, 0, 0).unwrap();

        assert_eq!(buffer.borrow().attached_surface_count(), 1);
        assert_eq!((surface.borrow().width, surface.borrow().height), (200, 100));
    }
}
