//! Data device (C9): selection and drag-and-drop, keyed to keyboard/pointer focus. Grounded
//! on Smithay's `wayland/data_device/{seat_data,dnd_grab}.rs` for the offer/broadcast shape
//! and on `compositor/data-device.c` for the selection-follows-keyboard-focus and
//! drag-requires-implicit-grab rules §4.9 describes.

use crate::compositor::Compositor;
use crate::error::{CoreError, ObjectKind};
use crate::input::{DragGrabState, Grab, InputHandle};
use crate::surface::SurfaceHandle;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

pub type DataSourceHandle = Rc<RefCell<DataSource>>;
pub type WeakDataSource = Weak<RefCell<DataSource>>;

/// A client-offered set of MIME types, refcounted because both a selection and an in-flight
/// drag can reference the same source object (§3 `Binding`-adjacent data model).
#[derive(Debug)]
pub struct DataSource {
    pub mime_types: Vec<String>,
    refcount: Cell<u32>,
}

impl DataSource {
    pub fn new() -> DataSourceHandle {
        Rc::new(RefCell::new(DataSource {
            mime_types: Vec::new(),
            refcount: Cell::new(1),
        }))
    }

    pub fn offer(this: &DataSourceHandle, mime: impl Into<String>) {
        this.borrow_mut().mime_types.push(mime.into());
    }

    pub fn ref_(this: &DataSourceHandle) {
        let c = this.borrow().refcount.get();
        this.borrow().refcount.set(c + 1);
    }

    /// Drop one reference; once it reaches zero the source is gone from both the selection
    /// and drag slots it may have occupied (callers only hold it through those two slots).
    pub fn unref(this: &DataSourceHandle) {
        let c = this.borrow().refcount.get();
        this.borrow().refcount.set(c.saturating_sub(1));
    }
}

/// Root state for C9, owned by [`Compositor`]. Both the selection and an in-flight drag are
/// keyed off the active seat's keyboard/pointer focus rather than tracked per-client.
#[derive(Debug, Default)]
pub struct DataDeviceManager {
    pub selection: Option<DataSourceHandle>,
    pub drag_focus: Option<Weak<RefCell<crate::surface::Surface>>>,
}

impl DataDeviceManager {
    pub fn new() -> Self {
        DataDeviceManager::default()
    }
}

/// Atomically replace the selection and, if `focus` is the current keyboard focus, broadcast
/// a data-offer immediately (§4.9 "Selection set"). `focus` is the surface that just became
/// (or already is) the keyboard focus — callers pass `None` to clear the selection with no
/// broadcast target.
pub fn set_selection(compositor: &mut Compositor, source: Option<DataSourceHandle>, focus: Option<&SurfaceHandle>, time: u32) {
    if let Some(old) = compositor.data_device.selection.take() {
        DataSource::unref(&old);
    }
    compositor.data_device.selection = source;
    if let Some(focus) = focus {
        broadcast_selection(compositor, focus, time);
    }
}

/// Called directly from the input router on click-to-activate (§4.7 `button`), mirroring the
/// original `wlsc_selection_set_focus` call site rather than routing it through the shell
/// capability.
pub fn set_selection_focus(compositor: &mut Compositor, focus: Option<&SurfaceHandle>, time: u32) {
    if let Some(focus) = focus {
        broadcast_selection(compositor, focus, time);
    }
}

/// Called from [`crate::input::set_keyboard_focus`]: whenever keyboard focus changes, the new
/// focus (if any) receives a data-offer before it can process any subsequent key event
/// (§8 scenario 6).
pub fn notify_keyboard_focus_changed(compositor: &mut Compositor, new_focus: Option<&SurfaceHandle>, time: u32) {
    if let Some(focus) = new_focus {
        broadcast_selection(compositor, focus, time);
    }
}

fn broadcast_selection(compositor: &mut Compositor, focus: &SurfaceHandle, _time: u32) {
    if let Some(source) = &compositor.data_device.selection {
        let mimes = source.borrow().mime_types.clone();
        compositor.events.data_offer(focus, &mimes);
    }
}

/// Start a drag (§4.9 "Drag start"): requires the seat to already hold an implicit pointer
/// grab from the button press that initiated the drag request. Returns the [`Grab::Drag`]
/// variant for the caller to install via [`crate::input::start_grab`].
pub fn start_drag(input: &InputHandle, source: Option<DataSourceHandle>, icon: Option<SurfaceHandle>) -> Result<Grab, CoreError> {
    if input.borrow().grab.is_none() {
        return Err(CoreError::protocol(
            ObjectKind::DataSource,
            "start_drag requires an active implicit pointer grab",
        ));
    }
    if let Some(source) = &source {
        DataSource::ref_(source);
    }
    Ok(Grab::Drag(DragGrabState { source, icon }))
}

/// Focus-tracking for an active drag (§4.9): emits enter/leave/motion to whichever surface the
/// pointer is currently over, and broadcasts the offer's MIME types to a newly entered surface
/// the same way [`set_selection`] broadcasts the selection to a newly focused one.
pub fn on_drag_motion(compositor: &mut Compositor, state: &DragGrabState, hit: Option<SurfaceHandle>, time: u32, x: i32, y: i32) {
    let current = compositor.data_device.drag_focus.as_ref().and_then(Weak::upgrade);
    let same = match (&current, &hit) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    };

    if !same {
        if let Some(old) = &current {
            compositor.events.drag_leave(old, time);
        }
        compositor.data_device.drag_focus = hit.as_ref().map(Rc::downgrade);
        if let Some(new) = &hit {
            let (sx, sy) = new.borrow().transform_point(x, y);
            compositor.events.drag_enter(new, time, sx, sy);
            if let Some(source) = &state.source {
                let mimes = source.borrow().mime_types.clone();
                compositor.events.data_offer(new, &mimes);
            }
        }
    } else if let Some(focus) = &hit {
        let (sx, sy) = focus.borrow().transform_point(x, y);
        compositor.events.drag_motion(focus, time, sx, sy);
    }
}

/// End a drag (§4.9 "On grab end"): emit drop to the current drag focus and unref the source.
pub fn end_drag(compositor: &mut Compositor, state: &DragGrabState, time: u32) {
    if let Some(focus) = compositor.data_device.drag_focus.take().and_then(|w| w.upgrade()) {
        compositor.events.drag_drop(&focus, time);
    }
    if let Some(source) = &state.source {
        DataSource::unref(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Input;
    use crate::surface::Surface;
    use crate::test_util::test_compositor_with_events;

    #[test]
    fn selection_broadcast_reaches_new_keyboard_focus() {
        let (mut compositor, data_offers) = test_compositor_with_events();
        let source = DataSource::new();
        DataSource::offer(&source, "text/plain");
        set_selection(&mut compositor, Some(source), None, 0);

        let surface = Surface::new_unallocated(0, 0, 10, 10);
        let input = Input::new();
        crate::input::set_keyboard_focus(&mut compositor, &input, Some(surface), 1);

        let offers = data_offers.borrow();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].1, vec!["text/plain".to_string()]);
    }

    #[test]
    fn start_drag_requires_active_grab() {
        let input = Input::new();
        let err = start_drag(&input, None, None).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn drag_enter_broadcasts_the_dragged_offers_mime_types() {
        let (mut compositor, data_offers) = test_compositor_with_events();
        let source = DataSource::new();
        DataSource::offer(&source, "text/uri-list");
        DataSource::ref_(&source);
        let state = DragGrabState { source: Some(source), icon: None };

        let target = Surface::new_unallocated(0, 0, 10, 10);
        on_drag_motion(&mut compositor, &state, Some(target.clone()), 0, 5, 5);

        let offers = data_offers.borrow();
        assert_eq!(offers.len(), 1);
        assert!(Rc::ptr_eq(&offers[0].0, &target));
        assert_eq!(offers[0].1, vec!["text/uri-list".to_string()]);
    }
}
