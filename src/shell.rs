//! Shell policy (C8): surface roles drive placement and stacking, move/resize are modal
//! grabs, and locking hides the desktop behind a helper-provided lock surface. Grounded on
//! Smithay's `src/desktop/space/mod.rs` for the stacking-list shape and on
//! `compositor/shell.c` (`map`, `configure`, `activate`, `lock`, `unlock`, `resume_desktop`)
//! and `compositor/meego-tablet-shell.c` (the zoom spring and state machine) for the exact
//! policy this module reproduces.

use crate::compositor::Compositor;
use crate::error::{CoreError, ObjectKind};
use crate::input::{Grab, InputHandle, MoveGrabState, ResizeEdges, ResizeGrabState};
use crate::surface::{Role, Surface, SurfaceHandle, WeakSurface};
use rand::Rng;
use std::rc::Rc;

/// The capability the core drives surface-role policy through (§4.8). `attach` is called once,
/// when the client wraps a surface in a shell-surface object (before a role or size is known);
/// `map` is called once the role is set and the first buffer is attached.
pub trait Shell {
    fn attach(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, parent: Option<&SurfaceHandle>);
    fn map(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, width: i32, height: i32);
    fn configure(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, x: i32, y: i32, width: i32, height: i32);
    fn activate(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, input: &InputHandle, time: u32);
    fn lock(&mut self, compositor: &mut Compositor);
    fn unlock(&mut self, compositor: &mut Compositor);
    /// Advance shell-owned animation state (§3 "list of Animations"/"fade tweener state"); a
    /// no-op for shells that don't animate.
    fn tick(&mut self, compositor: &mut Compositor, dt_ms: u32) {
        let _ = (compositor, dt_ms);
    }
}

/// Start a move grab on `surface` (protocol entry point `shell_surface.move`, §6): records the
/// pointer's current offset from the surface origin so grab motion can reproduce it.
pub fn start_move(compositor: &mut Compositor, input: &InputHandle, surface: &SurfaceHandle, button: u32, time: u32) {
    let (px, py) = {
        let inp = input.borrow();
        (inp.pointer_x, inp.pointer_y)
    };
    let (sx, sy) = {
        let s = surface.borrow();
        (s.x, s.y)
    };
    let grab = Grab::Move(MoveGrabState {
        surface: surface.clone(),
        dx: sx - px,
        dy: sy - py,
    });
    crate::input::start_grab(compositor, input, grab, button, time);
}

/// Start a resize grab on `surface` (protocol entry point `shell_surface.resize`, §6). Rejects
/// the edge mask the same way the original validates it (§4.8): `0`, `>15`, `L|R`, `T|B`.
pub fn start_resize(
    compositor: &mut Compositor,
    input: &InputHandle,
    surface: &SurfaceHandle,
    edges: ResizeEdges,
    button: u32,
    time: u32,
) -> Result<(), CoreError> {
    if !edges.is_valid() {
        return Err(CoreError::protocol(ObjectKind::ShellSurface, "illegal resize edge mask"));
    }
    let (px, py) = {
        let inp = input.borrow();
        (inp.pointer_x, inp.pointer_y)
    };
    let (w, h) = {
        let s = surface.borrow();
        (s.width, s.height)
    };
    let grab = Grab::Resize(ResizeGrabState {
        surface: surface.clone(),
        edges,
        grab_x: px,
        grab_y: py,
        width: w,
        height: h,
    });
    crate::input::start_grab(compositor, input, grab, button, time);
    Ok(())
}

fn rank(role: Role) -> i32 {
    match role {
        Role::Lock => 0,
        Role::Panel => 1,
        Role::Background => 3,
        _ => 2,
    }
}

/// Insert `surface` at the top of its stacking band (§4.8: panels, then ordinary surfaces in
/// LRU-activation order, then backgrounds; lock above all non-background).
fn insert_into_stack(compositor: &mut Compositor, surface: &SurfaceHandle) {
    let r = rank(surface.borrow().role);
    let idx = compositor
        .stack
        .iter()
        .position(|s| rank(s.borrow().role) > r)
        .unwrap_or(compositor.stack.len());
    compositor.stack.insert(idx, surface.clone());
}

/// Raise `surface` to the top of its own stacking band, preserving the band ordering that a
/// plain [`Compositor::raise_surface`] (which always moves to index 0) would violate.
fn raise_within_band(compositor: &mut Compositor, surface: &SurfaceHandle) {
    compositor.stack.retain(|s| !Rc::ptr_eq(s, surface));
    insert_into_stack(compositor, surface);
}

/// Reference desktop shell (§4.8 "Desktop shell"): toplevel/transient/fullscreen placement,
/// panel/background stacking, and a lock/unlock state machine backed by a hidden-surface list.
#[derive(Debug, Default)]
pub struct DesktopShell {
    transient_parents: Vec<(WeakSurface, WeakSurface)>,
    hidden: Vec<SurfaceHandle>,
    locked: bool,
    lock_surface: Option<SurfaceHandle>,
    /// Whether the external lock-screen helper process is still connected; when it has
    /// disconnected, `unlock` restores the desktop immediately instead of waiting on it.
    pub helper_connected: bool,
}

impl DesktopShell {
    pub fn new() -> Self {
        DesktopShell {
            helper_connected: true,
            ..Default::default()
        }
    }

    fn parent_of(&mut self, surface: &SurfaceHandle) -> Option<SurfaceHandle> {
        self.transient_parents.retain(|(s, _)| s.upgrade().is_some());
        self.transient_parents
            .iter()
            .find(|(s, _)| s.upgrade().map(|s| Rc::ptr_eq(&s, surface)).unwrap_or(false))
            .and_then(|(_, p)| p.upgrade())
    }

    /// Hide every mapped surface except backgrounds, moving them to `self.hidden` in their
    /// current relative order so `resume_desktop` can restore it exactly (§8 scenario 4).
    fn hide_desktop(&mut self, compositor: &mut Compositor) {
        let (hidden, kept): (Vec<_>, Vec<_>) = compositor
            .stack
            .drain(..)
            .partition(|s| !matches!(s.borrow().role, Role::Background | Role::Panel | Role::Lock));
        compositor.stack = kept;
        self.hidden = hidden;

        for input in compositor.inputs.clone() {
            crate::input::set_keyboard_focus(compositor, &input, None, 0);
        }
    }

    /// Restore the hidden surfaces just below the panels and repick focus (§4.8
    /// `resume_desktop`).
    fn resume_desktop(&mut self, compositor: &mut Compositor) {
        for surface in self.hidden.drain(..) {
            insert_into_stack(compositor, &surface);
        }
    }
}

impl Shell for DesktopShell {
    fn attach(&mut self, _compositor: &mut Compositor, surface: &SurfaceHandle, parent: Option<&SurfaceHandle>) {
        if let Some(parent) = parent {
            self.transient_parents.push((Rc::downgrade(surface), Rc::downgrade(parent)));
        }
    }

    fn map(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, width: i32, height: i32) {
        let role = surface.borrow().role;
        let (x, y) = match role {
            Role::Toplevel => {
                let mut rng = rand::thread_rng();
                (10 + rng.gen_range(0..400), 10 + rng.gen_range(0..400))
            }
            Role::Transient => match self.parent_of(surface) {
                Some(parent) => {
                    let p = parent.borrow();
                    (p.x + 10, p.y + 10)
                }
                None => (surface.borrow().x, surface.borrow().y),
            },
            Role::Fullscreen => {
                let (sx, sy) = (surface.borrow().x, surface.borrow().y);
                surface.borrow_mut().saved_pos = Some((sx, sy));
                let output = compositor.outputs.find_at(sx, sy);
                match &output {
                    Some(output) => {
                        surface.borrow_mut().fullscreen_output = Some(Rc::downgrade(output));
                        let rect = output.borrow().rect;
                        (rect.x + (rect.width - width) / 2, rect.y + (rect.height - height) / 2)
                    }
                    None => (sx, sy),
                }
            }
            _ => (surface.borrow().x, surface.borrow().y),
        };

        {
            let mut s = surface.borrow_mut();
            s.x = x;
            s.y = y;
            s.width = width;
            s.height = height;
            s.update_matrix();
        }

        if !compositor.stack.iter().any(|s| Rc::ptr_eq(s, surface)) {
            insert_into_stack(compositor, surface);
        }

        compositor.events.map(surface, x, y, width, height);
        Surface::damage(compositor, surface);
    }

    fn configure(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, x: i32, y: i32, width: i32, height: i32) {
        Surface::damage(compositor, surface);
        {
            let mut s = surface.borrow_mut();
            s.x = x;
            s.y = y;
            s.width = width;
            s.height = height;
            s.update_matrix();
        }
        Surface::damage(compositor, surface);
        compositor.events.configure(surface, x, y, width, height);
    }

    fn activate(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, input: &InputHandle, time: u32) {
        raise_within_band(compositor, surface);
        crate::input::set_keyboard_focus(compositor, input, Some(surface.clone()), time);
    }

    fn lock(&mut self, compositor: &mut Compositor) {
        if self.locked {
            return;
        }
        self.locked = true;
        compositor.locked = true;
        self.hide_desktop(compositor);
        compositor.events.prepare_lock_surface();
    }

    fn unlock(&mut self, compositor: &mut Compositor) {
        if !self.locked {
            return;
        }
        if !self.helper_connected {
            self.finish_unlock(compositor);
            return;
        }
        compositor.events.prepare_unlock();
    }
}

impl DesktopShell {
    fn finish_unlock(&mut self, compositor: &mut Compositor) {
        if let Some(lock_surface) = self.lock_surface.take() {
            compositor.unlink_surface(&lock_surface);
        }
        self.locked = false;
        compositor.locked = false;
        self.resume_desktop(compositor);
    }

    /// Called by the wire layer once the lock-screen helper provides its surface (§4.8: the
    /// helper "later provides a surface assigned role Lock which is stacked on top").
    pub fn provide_lock_surface(&mut self, compositor: &mut Compositor, surface: SurfaceHandle) {
        Surface::set_role(&surface, Role::Lock).expect("a freshly provided lock surface has no prior role");
        insert_into_stack(compositor, &surface);
        self.lock_surface = Some(surface);
    }

    /// Called by the wire layer once the lock-screen helper acknowledges `prepare_unlock`
    /// (§4.8: `unlock()` "emits prepare and awaits the helper to clear lock state").
    pub fn acknowledge_unlock(&mut self, compositor: &mut Compositor) {
        if !self.locked {
            return;
        }
        self.finish_unlock(compositor);
    }
}

/// A critically-damped-ish spring used to drive the tablet shell's zoom animation (§4.8,
/// `meego-tablet-shell.c`'s `wlsc_spring`): `current` chases `target` at a rate set by `k`.
#[derive(Debug, Clone, Copy)]
struct Spring {
    k: f32,
    friction: f32,
    current: f32,
    velocity: f32,
    target: f32,
}

impl Spring {
    fn new(k: f32, current: f32, target: f32) -> Self {
        Spring {
            k,
            friction: 4.0,
            current,
            velocity: 0.0,
            target,
        }
    }

    fn update(&mut self, dt_ms: u32) {
        let dt = dt_ms as f32 / 1000.0;
        let force = (self.target - self.current) * self.k - self.velocity * self.friction;
        self.velocity += force * dt;
        self.current += self.velocity * dt;
    }

    fn done(&self) -> bool {
        (self.current - self.target).abs() < 0.001 && self.velocity.abs() < 0.001
    }
}

/// The tablet shell's coarse state machine (§4.8 "Tablet shell").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabletState {
    Starting,
    Locked,
    Home,
    Switcher,
    Task,
}

#[derive(Debug)]
struct ZoomAnimation {
    surface: WeakSurface,
    spring: Spring,
}

/// Reference tablet shell (§4.8): a five-state machine with a spring-damped zoom animation
/// driven on task activation. Menu-key long-press toggles the switcher; a short press goes
/// home.
#[derive(Debug)]
pub struct TabletShell {
    pub state: TabletState,
    zoom: Option<ZoomAnimation>,
}

impl TabletShell {
    pub fn new() -> Self {
        TabletShell {
            state: TabletState::Starting,
            zoom: None,
        }
    }

    /// Short press of the designated menu key (§4.8): always returns to `Home`.
    pub fn short_press(&mut self, compositor: &mut Compositor) {
        if self.state == TabletState::Locked {
            return;
        }
        self.state = TabletState::Home;
        self.raise_home(compositor);
    }

    /// Long press of the designated menu key (§4.8): toggles the switcher.
    pub fn long_press(&mut self) {
        if self.state == TabletState::Locked {
            return;
        }
        self.state = if self.state == TabletState::Switcher {
            TabletState::Home
        } else {
            TabletState::Switcher
        };
    }

    /// Activate `surface` as the foreground task (§4.8): runs the zoom-in animation scaling
    /// from 0.3 to 1.0 around the surface's centroid.
    pub fn activate_task(&mut self, surface: &SurfaceHandle) {
        self.state = TabletState::Task;
        self.zoom = Some(ZoomAnimation {
            surface: Rc::downgrade(surface),
            spring: Spring::new(100.0, 0.3, 1.0),
        });
    }

    fn raise_home(&mut self, compositor: &mut Compositor) {
        if let Some(home) = compositor.stack.iter().find(|s| s.borrow().role == Role::Toplevel).cloned() {
            raise_within_band(compositor, &home);
        }
    }
}

impl Default for TabletShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell for TabletShell {
    fn attach(&mut self, _compositor: &mut Compositor, _surface: &SurfaceHandle, _parent: Option<&SurfaceHandle>) {}

    fn map(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, width: i32, height: i32) {
        {
            let mut s = surface.borrow_mut();
            s.width = width;
            s.height = height;
            s.update_matrix();
        }
        if !compositor.stack.iter().any(|s| Rc::ptr_eq(s, surface)) {
            compositor.stack.insert(0, surface.clone());
        }
        let (x, y) = { let s = surface.borrow(); (s.x, s.y) };
        compositor.events.map(surface, x, y, width, height);
        Surface::damage(compositor, surface);
        if self.state == TabletState::Starting {
            self.state = TabletState::Home;
        }
        self.activate_task(surface);
    }

    fn configure(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, x: i32, y: i32, width: i32, height: i32) {
        Surface::damage(compositor, surface);
        {
            let mut s = surface.borrow_mut();
            s.x = x;
            s.y = y;
            s.width = width;
            s.height = height;
            s.update_matrix();
        }
        Surface::damage(compositor, surface);
        compositor.events.configure(surface, x, y, width, height);
    }

    fn activate(&mut self, compositor: &mut Compositor, surface: &SurfaceHandle, input: &InputHandle, time: u32) {
        compositor.stack.retain(|s| !Rc::ptr_eq(s, surface));
        compositor.stack.insert(0, surface.clone());
        crate::input::set_keyboard_focus(compositor, input, Some(surface.clone()), time);
        self.activate_task(surface);
    }

    fn lock(&mut self, compositor: &mut Compositor) {
        self.state = TabletState::Locked;
        compositor.locked = true;
        for input in compositor.inputs.clone() {
            crate::input::set_keyboard_focus(compositor, &input, None, 0);
        }
    }

    fn unlock(&mut self, compositor: &mut Compositor) {
        compositor.locked = false;
        self.state = TabletState::Home;
    }

    fn tick(&mut self, compositor: &mut Compositor, dt_ms: u32) {
        let finished = if let Some(zoom) = &mut self.zoom {
            zoom.spring.update(dt_ms);
            if let Some(surface) = zoom.surface.upgrade() {
                let scale = zoom.spring.current;
                let (cx, cy) = {
                    let s = surface.borrow();
                    (s.x as f32 + s.width as f32 / 2.0, s.y as f32 + s.height as f32 / 2.0)
                };
                {
                    let mut s = surface.borrow_mut();
                    s.forward = crate::geometry::Mat4::translate(cx, cy, 0.0)
                        * crate::geometry::Mat4::scale(scale, scale, 1.0)
                        * crate::geometry::Mat4::translate(-cx, -cy, 0.0)
                        * s.forward;
                    s.inverse = s.forward.affine_inverse();
                }
                Surface::damage(compositor, &surface);
            }
            zoom.spring.done()
        } else {
            false
        };
        if finished {
            self.zoom = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Visual;
    use crate::test_util::test_compositor;

    #[test]
    fn toplevel_map_places_within_random_band_and_pushes_stack() {
        let mut compositor = test_compositor();
        let surface = Surface::create(compositor.backend.as_ref(), 0, 0, 1, 1).unwrap();
        Surface::set_role(&surface, Role::Toplevel).unwrap();
        compositor.with_shell(|c, shell| shell.map(c, &surface, 200, 100));

        let s = surface.borrow();
        assert!((10..410).contains(&s.x));
        assert!((10..410).contains(&s.y));
        assert_eq!((s.width, s.height), (200, 100));
        drop(s);
        assert!(compositor.stack.iter().any(|x| Rc::ptr_eq(x, &surface)));
    }

    #[test]
    fn fullscreen_map_centers_on_assigned_output_and_saves_position() {
        let mut compositor = test_compositor();
        compositor.outputs.add(crate::output::Output::new(crate::geometry::Rectangle::new(0, 0, 800, 600), false));
        let surface = Surface::create(compositor.backend.as_ref(), 10, 10, 1, 1).unwrap();
        Surface::set_role(&surface, Role::Fullscreen).unwrap();
        compositor.with_shell(|c, shell| shell.map(c, &surface, 800, 600));

        let s = surface.borrow();
        assert_eq!((s.x, s.y), (0, 0));
        assert_eq!(s.saved_pos, Some((10, 10)));
    }

    #[test]
    fn resize_rejects_illegal_edge_masks() {
        let mut compositor = test_compositor();
        let surface = Surface::new_unallocated(0, 0, 10, 10);
        let input = crate::input::Input::new();
        let err = start_resize(&mut compositor, &input, &surface, ResizeEdges::LEFT | ResizeEdges::RIGHT, 1, 0).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn lock_hides_non_background_and_unlock_restores_same_order() {
        let mut shell = DesktopShell::new();
        let mut compositor = test_compositor();
        let panel = Surface::new_unallocated(0, 0, 10, 10);
        panel.borrow_mut().role = Role::Panel;
        let t1 = Surface::new_unallocated(0, 0, 10, 10);
        t1.borrow_mut().role = Role::Toplevel;
        let t2 = Surface::new_unallocated(0, 0, 10, 10);
        t2.borrow_mut().role = Role::Toplevel;
        let bg = Surface::new_unallocated(0, 0, 10, 10);
        bg.borrow_mut().role = Role::Background;
        compositor.stack = vec![panel.clone(), t1.clone(), t2.clone(), bg.clone()];

        shell.lock(&mut compositor);
        assert_eq!(compositor.stack.len(), 2);
        assert!(compositor.locked);

        let lock_surface = Surface::new_unallocated(0, 0, 10, 10);
        shell.provide_lock_surface(&mut compositor, lock_surface.clone());
        assert!(Rc::ptr_eq(&compositor.stack[0], &lock_surface));

        shell.unlock(&mut compositor);
        assert!(compositor.locked, "unlock must wait for the helper's acknowledgement");
        shell.acknowledge_unlock(&mut compositor);
        assert!(!compositor.locked);
        assert!(compositor.stack.iter().any(|s| Rc::ptr_eq(s, &t1)));
        assert!(compositor.stack.iter().any(|s| Rc::ptr_eq(s, &t2)));
        let t1_pos = compositor.stack.iter().position(|s| Rc::ptr_eq(s, &t1)).unwrap();
        let t2_pos = compositor.stack.iter().position(|s| Rc::ptr_eq(s, &t2)).unwrap();
        assert!(t1_pos < t2_pos);
    }

    #[test]
    fn tablet_zoom_spring_converges_to_full_scale() {
        let mut shell = TabletShell::new();
        let mut compositor = test_compositor();
        let surface = Surface::new_unallocated(0, 0, 100, 100);
        surface.borrow_mut().visual = Visual::OpaqueRgb;
        shell.activate_task(&surface);
        for _ in 0..500 {
            shell.tick(&mut compositor, 16);
        }
        assert!(shell.zoom.is_none(), "spring should have settled");
    }
}
