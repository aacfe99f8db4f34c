//! Input router (C7): motion/button/key delivery, pointer-focus picking, keyboard focus,
//! grabs, and key/button bindings. Grounded on Smithay's `input/pointer/{mod,grab}.rs` and
//! `input/keyboard/mod.rs` for the shape of the seat and its focus bookkeeping, and on
//! `compositor/compositor.c`'s `notify_motion`/`notify_button`/`notify_key` for the exact
//! event-ordering rules §4.7 pins down.

use crate::compositor::Compositor;
use crate::events::{ButtonState, KeyState};
use crate::surface::{Surface, SurfaceHandle, WeakSurface};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

bitflags::bitflags! {
    /// Currently-held modifier keys (§4.7: Ctrl/Alt/Super map to modifier bits).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const CTRL = 0b001;
        const ALT = 0b010;
        const SUPER = 0b100;
    }
}

/// evdev-style keycodes for the modifier keys that set [`Modifiers`] bits (§4.7).
pub const KEY_LEFTCTRL: u32 = 29;
pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_LEFTALT: u32 = 56;
pub const KEY_RIGHTALT: u32 = 100;
pub const KEY_LEFTMETA: u32 = 125;
pub const KEY_RIGHTMETA: u32 = 126;

fn modifier_bit_for_key(key: u32) -> Option<Modifiers> {
    match key {
        KEY_LEFTCTRL | KEY_RIGHTCTRL => Some(Modifiers::CTRL),
        KEY_LEFTALT | KEY_RIGHTALT => Some(Modifiers::ALT),
        KEY_LEFTMETA | KEY_RIGHTMETA => Some(Modifiers::SUPER),
        _ => None,
    }
}

bitflags::bitflags! {
    /// Resize-edge mask (§4.8): illegal values are `0`, `>15`, `L|R`, `T|B`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResizeEdges: u32 {
        const LEFT = 1;
        const RIGHT = 2;
        const TOP = 4;
        const BOTTOM = 8;
    }
}

impl ResizeEdges {
    pub fn is_valid(self) -> bool {
        !self.is_empty()
            && self.bits() <= 15
            && !(self.contains(Self::LEFT) && self.contains(Self::RIGHT))
            && !(self.contains(Self::TOP) && self.contains(Self::BOTTOM))
    }
}

#[derive(Debug)]
pub struct MotionGrabState {
    pub surface: SurfaceHandle,
}

#[derive(Debug)]
pub struct MoveGrabState {
    pub surface: SurfaceHandle,
    pub dx: i32,
    pub dy: i32,
}

#[derive(Debug)]
pub struct ResizeGrabState {
    pub surface: SurfaceHandle,
    pub edges: ResizeEdges,
    pub grab_x: i32,
    pub grab_y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug)]
pub struct DragGrabState {
    pub source: Option<crate::data_device::DataSourceHandle>,
    pub icon: Option<SurfaceHandle>,
}

#[derive(Debug)]
pub struct MenuGrabState {
    pub surface: SurfaceHandle,
}

/// The five grab variants of §3/§4.7, as a tagged union rather than dynamic dispatch (§9:
/// "do not allocate each grab on a separate heap slot ... inline into the seat"). At most one
/// is ever live per [`Input`] (§8 invariant).
#[derive(Debug)]
pub enum Grab {
    Motion(MotionGrabState),
    Move(MoveGrabState),
    Resize(ResizeGrabState),
    Drag(DragGrabState),
    Menu(MenuGrabState),
}

impl Grab {
    /// The surface this grab is anchored to, if any (used to wire the destroy-cancellation
    /// listener in [`start_grab`]). Drag grabs track focus dynamically and have none.
    fn anchor(&self) -> Option<&SurfaceHandle> {
        match self {
            Grab::Motion(s) => Some(&s.surface),
            Grab::Move(s) => Some(&s.surface),
            Grab::Resize(s) => Some(&s.surface),
            Grab::Menu(s) => Some(&s.surface),
            Grab::Drag(_) => None,
        }
    }
}

pub type InputHandle = Rc<RefCell<Input>>;
pub type WeakInput = Weak<RefCell<Input>>;

/// One seat's pointer+keyboard state (§3). A single logical seat is assumed (§1 non-goal:
/// multi-seat input), but nothing here prevents a caller from constructing several.
#[derive(Debug)]
pub struct Input {
    pub pointer_x: i32,
    pub pointer_y: i32,
    pub pointer_focus: Option<WeakSurface>,
    pub pointer_focus_time: u32,
    pub keyboard_focus: Option<WeakSurface>,
    pub pressed_keys: Vec<u32>,
    pub modifiers: Modifiers,
    pub grab: Option<Grab>,
    pub grab_button: u32,
    pub hotspot: (i32, i32),
    pub cursor_sprite: SurfaceHandle,
    pub hardware_cursor: bool,
}

impl Input {
    /// A fresh seat with no focus and a blank cursor-sprite surface. The sprite starts with
    /// no backend-allocated texture; [`crate::backend::Backend::attach`]-equivalent protocol
    /// handling binds one the first time the client sets its own cursor (§6).
    pub fn new() -> InputHandle {
        Rc::new(RefCell::new(Input {
            pointer_x: 0,
            pointer_y: 0,
            pointer_focus: None,
            pointer_focus_time: 0,
            keyboard_focus: None,
            pressed_keys: Vec::new(),
            modifiers: Modifiers::empty(),
            grab: None,
            grab_button: 0,
            hotspot: (0, 0),
            cursor_sprite: Surface::new_unallocated(0, 0, 0, 0),
            hardware_cursor: false,
        }))
    }

    /// Clear this seat's grab if it is anchored to `surface` (§9 destroy-listener pattern;
    /// wired by [`start_grab`]). Deliberately does not emit any client event: the destroying
    /// surface's client must observe nothing further (§4.7 ordering guarantee, §8 scenario 3).
    fn cancel_grab_if_anchored(this: &InputHandle, surface: &SurfaceHandle) {
        let anchored = this
            .borrow()
            .grab
            .as_ref()
            .and_then(Grab::anchor)
            .map(|s| Rc::ptr_eq(s, surface))
            .unwrap_or(false);
        if anchored {
            this.borrow_mut().grab = None;
        }
    }
}

/// Walk the stack top-down and return the first mapped surface whose bounds contain
/// `(x, y)` (C7 `pick_surface`).
pub fn pick_surface(compositor: &Compositor, x: i32, y: i32) -> Option<SurfaceHandle> {
    compositor.stack.iter().find(|s| s.borrow().hit_test(x, y)).cloned()
}

fn same_surface(a: &Option<WeakSurface>, b: &Option<SurfaceHandle>) -> bool {
    match (a.as_ref().and_then(Weak::upgrade), b) {
        (Some(a), Some(b)) => Rc::ptr_eq(&a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Update pointer focus to `new_focus`, emitting leave-then-enter-then-motion in that order
/// (§4.7 ordering guarantees). A no-op focus change still emits motion.
pub fn set_pointer_focus(compositor: &mut Compositor, input: &InputHandle, new_focus: Option<SurfaceHandle>, time: u32, x: i32, y: i32) {
    let unchanged = same_surface(&input.borrow().pointer_focus, &new_focus);
    if unchanged {
        if let Some(focus) = &new_focus {
            let (sx, sy) = focus.borrow().transform_point(x, y);
            compositor.events.pointer_motion(focus, time, sx, sy);
        }
        return;
    }

    if let Some(old) = input.borrow().pointer_focus.as_ref().and_then(Weak::upgrade) {
        compositor.events.pointer_leave(&old, time);
    }

    input.borrow_mut().pointer_focus = new_focus.as_ref().map(Rc::downgrade);
    input.borrow_mut().pointer_focus_time = time;

    if let Some(focus) = &new_focus {
        let (sx, sy) = focus.borrow().transform_point(x, y);
        compositor.events.pointer_enter(focus, time, sx, sy);
        compositor.events.pointer_motion(focus, time, sx, sy);
    }
}

fn repick_pointer_focus(compositor: &mut Compositor, input: &InputHandle, time: u32, x: i32, y: i32) {
    let hit = pick_surface(compositor, x, y);
    set_pointer_focus(compositor, input, hit, time, x, y);
}

/// Damage the cursor sprite's current footprint (C7: "always damage the cursor sprite
/// rectangle before and after moving it").
fn damage_cursor(compositor: &mut Compositor, input: &InputHandle) {
    let rect = input.borrow().cursor_sprite.borrow().rect();
    compositor.damage_rect(rect);
}

fn place_cursor(input: &InputHandle) {
    let inp = input.borrow_mut();
    let (hx, hy) = inp.hotspot;
    let (x, y) = (inp.pointer_x - hx, inp.pointer_y - hy);
    let mut sprite = inp.cursor_sprite.borrow_mut();
    sprite.x = x;
    sprite.y = y;
    sprite.update_matrix();
}

/// Begin an exclusive grab (§4.7 `start_grab`): emit a leave to the current pointer-focus
/// client (it stops seeing motion it did not expect), clear focus, and subscribe a
/// destroy-cancellation listener on the grab's anchor surface if it has one.
pub fn start_grab(compositor: &mut Compositor, input: &InputHandle, grab: Grab, button: u32, time: u32) {
    if let Some(old) = input.borrow().pointer_focus.as_ref().and_then(Weak::upgrade) {
        compositor.events.pointer_leave(&old, time);
    }

    if let Some(anchor) = grab.anchor() {
        let weak_input = Rc::downgrade(input);
        Surface::on_destroy(anchor, move || {
            if let Some(input) = weak_input.upgrade() {
                input.borrow_mut().grab = None;
            }
        });
    }

    let mut inp = input.borrow_mut();
    inp.grab = Some(grab);
    inp.grab_button = button;
    inp.pointer_focus = None;
}

/// End the active grab (§4.7 `end_grab`): run its cleanup, then repick focus at the seat's
/// current pointer position.
pub fn end_grab(compositor: &mut Compositor, input: &InputHandle, time: u32) {
    let grab = input.borrow_mut().grab.take();
    if let Some(grab) = grab {
        on_end(compositor, input, grab, time);
    }
    let (x, y) = {
        let inp = input.borrow();
        (inp.pointer_x, inp.pointer_y)
    };
    repick_pointer_focus(compositor, input, time, x, y);
}

fn on_motion(compositor: &mut Compositor, _input: &InputHandle, grab: &Grab, time: u32, x: i32, y: i32) {
    match grab {
        Grab::Motion(state) => {
            let (sx, sy) = state.surface.borrow().transform_point(x, y);
            compositor.events.pointer_motion(&state.surface, time, sx, sy);
        }
        Grab::Move(state) => {
            let (x, y) = (x + state.dx, y + state.dy);
            let (w, h) = {
                let s = state.surface.borrow();
                (s.width, s.height)
            };
            compositor.with_shell(|c, shell| shell.configure(c, &state.surface, x, y, w, h));
        }
        Grab::Resize(state) => {
            let width = if state.edges.contains(ResizeEdges::LEFT) {
                state.grab_x - x + state.width
            } else if state.edges.contains(ResizeEdges::RIGHT) {
                x - state.grab_x + state.width
            } else {
                state.width
            };
            let height = if state.edges.contains(ResizeEdges::TOP) {
                state.grab_y - y + state.height
            } else if state.edges.contains(ResizeEdges::BOTTOM) {
                y - state.grab_y + state.height
            } else {
                state.height
            };
            let (sx, sy) = {
                let s = state.surface.borrow();
                (s.x, s.y)
            };
            let (width, height) = (width.max(1), height.max(1));
            compositor.with_shell(|c, shell| shell.configure(c, &state.surface, sx, sy, width, height));
        }
        Grab::Drag(state) => {
            let hit = pick_surface(compositor, x, y);
            crate::data_device::on_drag_motion(compositor, state, hit, time, x, y);
        }
        Grab::Menu(state) => {
            let (sx, sy) = state.surface.borrow().transform_point(x, y);
            compositor.events.pointer_motion(&state.surface, time, sx, sy);
        }
    }
}

fn on_button(compositor: &mut Compositor, _input: &InputHandle, grab: &Grab, time: u32, button: u32, state: ButtonState) {
    match grab {
        Grab::Motion(s) => compositor.events.pointer_button(&s.surface, time, button, state),
        Grab::Move(_) | Grab::Resize(_) => {}
        Grab::Drag(_) => {}
        Grab::Menu(s) => compositor.events.pointer_button(&s.surface, time, button, state),
    }
}

fn on_end(compositor: &mut Compositor, _input: &InputHandle, grab: Grab, time: u32) {
    if let Grab::Drag(state) = grab {
        crate::data_device::end_drag(compositor, &state, time);
    }
}

/// Clamp to the union of output rectangles, deliver to an active grab, or repick focus and
/// emit motion (C7 `motion`).
pub fn handle_motion(compositor: &mut Compositor, input: &InputHandle, time: u32, x: i32, y: i32) {
    let (x, y) = compositor.outputs.clamp(x, y);

    damage_cursor(compositor, input);

    input.borrow_mut().pointer_x = x;
    input.borrow_mut().pointer_y = y;

    let grab = input.borrow_mut().grab.take();
    match grab {
        Some(grab) => {
            on_motion(compositor, input, &grab, time, x, y);
            input.borrow_mut().grab = Some(grab);
        }
        None => repick_pointer_focus(compositor, input, time, x, y),
    }

    place_cursor(input);
    damage_cursor(compositor, input);
}

/// Activate focus, scan bindings, deliver to a grab, and release on matching button-up
/// (C7 `button`).
pub fn handle_button(compositor: &mut Compositor, input: &InputHandle, time: u32, button: u32, state: ButtonState) {
    if state == ButtonState::Pressed {
        let focus = input.borrow().pointer_focus.as_ref().and_then(Weak::upgrade);
        let has_grab = input.borrow().grab.is_some();
        if let (Some(surface), false) = (focus, has_grab) {
            compositor.with_shell(|c, shell| shell.activate(c, &surface, input, time));
            crate::data_device::set_selection_focus(compositor, Some(&surface), time);
            start_grab(
                compositor,
                input,
                Grab::Motion(MotionGrabState { surface: surface.clone() }),
                button,
                time,
            );
        }

        let modifiers = input.borrow().modifiers;
        let locked = compositor.locked;
        if let Some(binding) = compositor
            .bindings
            .iter()
            .find(|b| b.button == Some(button) && b.modifiers == modifiers && (!locked || b.essential))
            .cloned()
        {
            (binding.handler)(compositor, input, time);
        }
    }

    let grab = input.borrow_mut().grab.take();
    if let Some(grab) = grab {
        on_button(compositor, input, &grab, time, button, state);
        input.borrow_mut().grab = Some(grab);
    }

    if state == ButtonState::Released {
        let matches = {
            let inp = input.borrow();
            inp.grab.is_some() && inp.grab_button == button
        };
        if matches {
            end_grab(compositor, input, time);
        }
    }
}

/// Scan key bindings, update the modifier mask and pressed-keys array, and deliver to the
/// keyboard-focus client (C7 `key`).
pub fn handle_key(compositor: &mut Compositor, input: &InputHandle, time: u32, key: u32, state: KeyState) {
    let modifiers = input.borrow().modifiers;
    if state == KeyState::Pressed {
        let locked = compositor.locked;
        if let Some(binding) = compositor
            .bindings
            .iter()
            .find(|b| b.key == Some(key) && b.modifiers == modifiers && (!locked || b.essential))
            .cloned()
        {
            (binding.handler)(compositor, input, time);
        }
    }

    if let Some(bit) = modifier_bit_for_key(key) {
        let mut inp = input.borrow_mut();
        if state == KeyState::Pressed {
            inp.modifiers.insert(bit);
        } else {
            inp.modifiers.remove(bit);
        }
    }

    {
        let mut inp = input.borrow_mut();
        if let Some(pos) = inp.pressed_keys.iter().position(|&k| k == key) {
            inp.pressed_keys.swap_remove(pos);
        }
        if state == KeyState::Pressed {
            inp.pressed_keys.push(key);
        }
    }

    if let Some(focus) = input.borrow().keyboard_focus.as_ref().and_then(Weak::upgrade) {
        compositor.events.keyboard_key(&focus, time, key, state);
    }
}

/// Set keyboard focus, per the top-of-stack policy chosen for the §9 ambiguity (see
/// `DESIGN.md`): leave the old focus, enter the new one, and broadcast the selection offer.
pub fn set_keyboard_focus(compositor: &mut Compositor, input: &InputHandle, new_focus: Option<SurfaceHandle>, time: u32) {
    if same_surface(&input.borrow().keyboard_focus, &new_focus) {
        return;
    }
    if let Some(old) = input.borrow().keyboard_focus.as_ref().and_then(Weak::upgrade) {
        compositor.events.keyboard_leave(&old, time);
    }
    input.borrow_mut().keyboard_focus = new_focus.as_ref().map(Rc::downgrade);
    if let Some(focus) = &new_focus {
        let keys = input.borrow().pressed_keys.clone();
        compositor.events.keyboard_enter(focus, time, &keys);
    }
    crate::data_device::notify_keyboard_focus_changed(compositor, new_focus.as_ref(), time);
}

/// Called from [`Compositor::unlink_surface`] so every seat drops stale grab/focus
/// references to a surface that is mid-destruction (§4.7 ordering guarantee).
pub(crate) fn notify_surface_destroyed(compositor: &mut Compositor, surface: &SurfaceHandle) {
    let inputs = compositor.inputs.clone();
    for input in inputs {
        Input::cancel_grab_if_anchored(&input, surface);
        let (x, y) = {
            let inp = input.borrow();
            (inp.pointer_x, inp.pointer_y)
        };
        if input.borrow().grab.is_none() {
            repick_pointer_focus(compositor, &input, 0, x, y);
        }
    }
}

/// Callback invoked when a [`Binding`] matches: the compositor, the input whose key/button
/// triggered it, and the event time.
pub type BindingHandler = Rc<dyn Fn(&mut Compositor, &InputHandle, u32)>;

/// A `(key, button, modifier-mask)` triple mapped to a handler (§3 `Binding`). `key` and
/// `button` are independently optional so one binding can be keyboard-only or pointer-only.
/// `essential` bindings (e.g. the termination key combo) still fire while the shell is locked
/// (§4.8 "disables non-essential bindings"); everything else is suppressed.
#[derive(Clone)]
pub struct Binding {
    pub key: Option<u32>,
    pub button: Option<u32>,
    pub modifiers: Modifiers,
    pub essential: bool,
    pub handler: BindingHandler,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("button", &self.button)
            .field("modifiers", &self.modifiers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;
    use crate::output::Output;
    use crate::test_util::test_compositor;

    #[test]
    fn pick_surface_returns_topmost_hit() {
        let mut compositor = test_compositor();
        compositor.outputs.add(Output::new(Rectangle::new(0, 0, 1000, 1000), false));
        let bottom = Surface::new_unallocated(0, 0, 500, 500);
        let top = Surface::new_unallocated(0, 0, 200, 200);
        compositor.stack = vec![top.clone(), bottom.clone()];
        let hit = pick_surface(&compositor, 50, 50).unwrap();
        assert!(Rc::ptr_eq(&hit, &top));
    }

    #[test]
    fn button_press_starts_motion_grab_and_release_ends_it() {
        let mut compositor = test_compositor();
        compositor.outputs.add(Output::new(Rectangle::new(0, 0, 1000, 1000), false));
        let surface = Surface::new_unallocated(0, 0, 200, 200);
        compositor.stack = vec![surface.clone()];
        let input = Input::new();
        compositor.inputs.push(input.clone());

        handle_motion(&mut compositor, &input, 1, 10, 10);
        assert!(Rc::ptr_eq(&input.borrow().pointer_focus.as_ref().unwrap().upgrade().unwrap(), &surface));

        handle_button(&mut compositor, &input, 2, 1, ButtonState::Pressed);
        assert!(input.borrow().grab.is_some());
        assert!(input.borrow().pointer_focus.is_none());

        handle_button(&mut compositor, &input, 3, 1, ButtonState::Released);
        assert!(input.borrow().grab.is_none());
    }

    #[test]
    fn grab_ends_and_no_event_reaches_destroyed_clients_surface() {
        let mut compositor = test_compositor();
        compositor.outputs.add(Output::new(Rectangle::new(0, 0, 1000, 1000), false));
        let surface = Surface::new_unallocated(0, 0, 200, 200);
        compositor.stack = vec![surface.clone()];
        let input = Input::new();
        compositor.inputs.push(input.clone());

        handle_motion(&mut compositor, &input, 1, 10, 10);
        handle_button(&mut compositor, &input, 2, 1, ButtonState::Pressed);
        assert!(input.borrow().grab.is_some());

        Surface::destroy(&mut compositor, surface);

        assert!(input.borrow().grab.is_none());
        assert!(input.borrow().pointer_focus.is_none());
    }

    #[test]
    fn resize_edges_validity_matches_spec_illegal_masks() {
        assert!(!ResizeEdges::empty().is_valid());
        assert!(!(ResizeEdges::LEFT | ResizeEdges::RIGHT).is_valid());
        assert!(!(ResizeEdges::TOP | ResizeEdges::BOTTOM).is_valid());
        assert!(ResizeEdges::TOP.is_valid());
        assert!((ResizeEdges::TOP | ResizeEdges::LEFT).is_valid());
    }
}
