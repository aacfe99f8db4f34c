//! Shared test doubles (§8 "Test tooling"): a recording `Backend` and `ClientEvents`
//! implementation, plus a `Compositor` fixture builder, in the style of the teacher library's
//! own dummy renderer/backend test doubles used across its test suites.

use crate::backend::{Backend, DrawCall};
use crate::buffer::Buffer;
use crate::compositor::Compositor;
use crate::config::Config;
use crate::events::{ButtonState, ClientEvents, KeyState};
use crate::geometry::Rectangle;
use crate::input::Input;
use crate::output::OutputHandle;
use crate::shell::DesktopShell;
use crate::surface::{SurfaceHandle, TextureName};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A `Backend` that records what it was asked to do instead of touching a GPU, so draw-call
/// counts and rectangles (§8 scenarios 2/5) are assertable directly.
#[derive(Default)]
pub struct RecordingBackend {
    next_texture: Cell<TextureName>,
    pub uploads: RefCell<Vec<TextureName>>,
    pub draws: RefCell<Vec<DrawCall>>,
    pub scanout_accepts: Cell<bool>,
    pub hardware_cursor_accepts: Cell<bool>,
}

impl Backend for RecordingBackend {
    fn create_texture(&self) -> Option<TextureName> {
        let next = self.next_texture.get() + 1;
        self.next_texture.set(next);
        Some(next)
    }

    fn destroy_texture(&self, _texture: TextureName) {}

    fn upload_buffer(&self, texture: TextureName, _buffer: &Buffer) -> Result<(), ()> {
        self.uploads.borrow_mut().push(texture);
        Ok(())
    }

    fn import_driver_image(&self, texture: TextureName, _buffer: &Buffer) -> Result<(), ()> {
        self.uploads.borrow_mut().push(texture);
        Ok(())
    }

    fn draw(&self, call: DrawCall) {
        self.draws.borrow_mut().push(call);
    }

    fn clear(&self, _rect: Rectangle) {}

    fn prepare_render(&self, _output: &OutputHandle) {}

    fn present(&self, _output: &OutputHandle) {}

    fn prepare_scanout_surface(&self, _output: &OutputHandle, _surface: &SurfaceHandle) -> bool {
        self.scanout_accepts.get()
    }

    fn set_hardware_cursor(&self, _input: &Input) -> bool {
        self.hardware_cursor_accepts.get()
    }

    fn create_cursor_image(&self, _width: i32, _height: i32) -> Option<TextureName> {
        self.create_texture()
    }

    fn authenticate(&self, _id: u32) -> bool {
        true
    }

    fn destroy(&self) {}
}

/// Surfaces that received a data-offer and the MIME types it carried, in broadcast order.
pub type DataOfferLog = Rc<RefCell<Vec<(SurfaceHandle, Vec<String>)>>>;

/// A `ClientEvents` that records every data-offer broadcast; all other events are discarded.
/// Scenarios that need to assert ordering of other events can extend the recorded fields as
/// needed rather than growing this into a generic logger.
#[derive(Default)]
pub struct RecordingEvents {
    pub data_offers: DataOfferLog,
    pub lock_surface_requests: Cell<u32>,
    pub unlock_requests: Cell<u32>,
}

impl ClientEvents for RecordingEvents {
    fn pointer_enter(&self, _surface: &SurfaceHandle, _time: u32, _sx: i32, _sy: i32) {}
    fn pointer_leave(&self, _surface: &SurfaceHandle, _time: u32) {}
    fn pointer_motion(&self, _surface: &SurfaceHandle, _time: u32, _sx: i32, _sy: i32) {}
    fn pointer_button(&self, _surface: &SurfaceHandle, _time: u32, _button: u32, _state: ButtonState) {}

    fn keyboard_enter(&self, _surface: &SurfaceHandle, _time: u32, _keys: &[u32]) {}
    fn keyboard_leave(&self, _surface: &SurfaceHandle, _time: u32) {}
    fn keyboard_key(&self, _surface: &SurfaceHandle, _time: u32, _key: u32, _state: KeyState) {}

    fn map(&self, _surface: &SurfaceHandle, _x: i32, _y: i32, _width: i32, _height: i32) {}
    fn configure(&self, _surface: &SurfaceHandle, _x: i32, _y: i32, _width: i32, _height: i32) {}
    fn frame_done(&self, _surface: &SurfaceHandle, _msecs: u32) {}

    fn data_offer(&self, surface: &SurfaceHandle, mime_types: &[String]) {
        self.data_offers.borrow_mut().push((surface.clone(), mime_types.to_vec()));
    }
    fn drag_enter(&self, _surface: &SurfaceHandle, _time: u32, _sx: i32, _sy: i32) {}
    fn drag_motion(&self, _surface: &SurfaceHandle, _time: u32, _sx: i32, _sy: i32) {}
    fn drag_leave(&self, _surface: &SurfaceHandle, _time: u32) {}
    fn drag_drop(&self, _surface: &SurfaceHandle, _time: u32) {}

    fn protocol_error(&self, _object: crate::error::ObjectKind, _message: &str) {}

    fn prepare_lock_surface(&self) {
        self.lock_surface_requests.set(self.lock_surface_requests.get() + 1);
    }

    fn prepare_unlock(&self) {
        self.unlock_requests.set(self.unlock_requests.get() + 1);
    }
}

/// A `Compositor` wired with [`RecordingBackend`]/[`RecordingEvents`]/[`DesktopShell`], plus a
/// handle to the events double's recorded data-offers for assertions that need them.
pub fn test_compositor_with_events() -> (Compositor, DataOfferLog) {
    let events = RecordingEvents::default();
    let data_offers = events.data_offers.clone();
    let compositor = Compositor::new(
        Box::new(RecordingBackend::default()),
        Box::new(events),
        Box::new(DesktopShell::new()),
        Config::default(),
    );
    (compositor, data_offers)
}

pub fn test_compositor() -> Compositor {
    test_compositor_with_events().0
}
