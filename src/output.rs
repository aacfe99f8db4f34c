//! Output set (C4): rendering destinations with fixed geometry, a projection matrix, and
//! per-output damage history.

use crate::geometry::{Mat4, Rectangle, Region};
use crate::surface::{Surface, SurfaceHandle, WeakSurface};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub type OutputHandle = Rc<RefCell<Output>>;
pub type WeakOutput = Weak<RefCell<Output>>;

/// A rendering destination: a physical display region with fixed geometry (§3).
#[derive(Debug)]
pub struct Output {
    pub rect: Rectangle,
    pub flip: bool,
    pub matrix: Mat4,
    pub previous_damage: Region,
    pub repaint_needed: bool,
    pub finished: bool,
    pub background: Option<WeakSurface>,
    pub mode: Option<(i32, i32)>,
}

impl Output {
    pub fn new(rect: Rectangle, flip: bool) -> OutputHandle {
        let matrix = project(&rect, flip);
        Rc::new(RefCell::new(Output {
            rect,
            flip,
            matrix,
            previous_damage: Region::empty(),
            repaint_needed: false,
            finished: true,
            background: None,
            mode: None,
        }))
    }

    /// Recompute `self.matrix` from `self.rect`/`self.flip` (§4.4): translate the rect's
    /// center to the origin, then scale into normalized device coordinates, flipping the Y
    /// axis when the backend reports an inverted framebuffer.
    fn update_projection(&mut self) {
        self.matrix = project(&self.rect, self.flip);
    }
}

fn project(rect: &Rectangle, flip: bool) -> Mat4 {
    let half_w = rect.width as f32 / 2.0;
    let half_h = rect.height as f32 / 2.0;
    let translate = Mat4::translate(-(rect.x as f32 + half_w), -(rect.y as f32 + half_h), 0.0);
    let sy = if flip { -2.0 / rect.height as f32 } else { 2.0 / rect.height as f32 };
    let scale = Mat4::scale(2.0 / rect.width as f32, sy, 1.0);
    scale * translate
}

/// The ordered collection of outputs driving a [`crate::Compositor`] (C4).
#[derive(Debug, Default)]
pub struct OutputSet {
    outputs: Vec<OutputHandle>,
}

impl OutputSet {
    pub fn new() -> Self {
        OutputSet { outputs: Vec::new() }
    }

    pub fn add(&mut self, output: OutputHandle) {
        self.outputs.push(output);
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputHandle> {
        self.outputs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Point-in-rectangle test against `(x, y)`; falls back to the first output, logging,
    /// when nothing matches (§4.4).
    pub fn find_at(&self, x: i32, y: i32) -> Option<OutputHandle> {
        if let Some(hit) = self.outputs.iter().find(|o| o.borrow().rect.contains_point(x, y)) {
            return Some(hit.clone());
        }
        if let Some(first) = self.outputs.first() {
            tracing::debug!(x, y, "no output contains point, defaulting to first output");
            return Some(first.clone());
        }
        None
    }

    /// The union of all output rectangles' bounds, per axis, used to clamp pointer motion
    /// (§4.7). Returns `None` if there are no outputs.
    pub fn bounds(&self) -> Option<Rectangle> {
        let mut iter = self.outputs.iter();
        let first = iter.next()?.borrow().rect;
        let mut min_x = first.left();
        let mut min_y = first.top();
        let mut max_x = first.right();
        let mut max_y = first.bottom();
        for o in iter {
            let r = o.borrow().rect;
            min_x = min_x.min(r.left());
            min_y = min_y.min(r.top());
            max_x = max_x.max(r.right());
            max_y = max_y.max(r.bottom());
        }
        Some(Rectangle::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// Clamp `(x, y)` against the union of output rectangles, per axis (§4.7): a point off
    /// every output on one axis snaps to the nearest edge on that axis.
    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        match self.bounds() {
            Some(b) => (x.clamp(b.left(), b.right() - 1), y.clamp(b.top(), b.bottom() - 1)),
            None => (x, y),
        }
    }

    /// Move `output` to `rect`: damages the old rectangle (the caller is expected to also
    /// damage the new one via the compositor, since this type has no damage-region access),
    /// recomputes the projection, and rebinds any background surface to the new geometry.
    pub fn move_output(output: &OutputHandle, rect: Rectangle) -> Rectangle {
        let old_rect = {
            let mut o = output.borrow_mut();
            let old = o.rect;
            o.rect = rect;
            o.update_projection();
            old
        };
        if let Some(bg) = output.borrow().background.as_ref().and_then(Weak::upgrade) {
            let mut bg_mut = bg.borrow_mut();
            bg_mut.x = rect.x;
            bg_mut.y = rect.y;
            bg_mut.width = rect.width;
            bg_mut.height = rect.height;
            bg_mut.update_matrix();
        }
        old_rect
    }

    /// Remove `output` from the set, migrating every surface assigned or fullscreened to it
    /// (the backend hot-unplug path described in the C10/C4 expansion).
    pub fn remove(&mut self, output: &OutputHandle, surfaces: &[SurfaceHandle]) {
        self.outputs.retain(|o| !Rc::ptr_eq(o, output));

        for surface in surfaces {
            let is_fullscreen_here = surface
                .borrow()
                .fullscreen_output
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|o| Rc::ptr_eq(&o, output))
                .unwrap_or(false);
            if is_fullscreen_here {
                Surface::unset_fullscreen(surface);
            }
            let is_assigned_here = surface
                .borrow()
                .output
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|o| Rc::ptr_eq(&o, output))
                .unwrap_or(false);
            if is_assigned_here {
                let (sx, sy) = (surface.borrow().x, surface.borrow().y);
                surface.borrow_mut().output = self.find_at(sx, sy).as_ref().map(Rc::downgrade);
            }
        }

        if let Some(bg) = output.borrow().background.as_ref().and_then(Weak::upgrade) {
            bg.borrow_mut().role = crate::surface::Role::Unmapped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_maps_output_center_to_origin() {
        let output = Output::new(Rectangle::new(100, 0, 800, 600), false);
        let center = output.borrow().matrix.transform([100.0 + 400.0, 0.0 + 300.0, 0.0, 1.0]);
        assert!((center[0]).abs() < 1e-4);
        assert!((center[1]).abs() < 1e-4);
    }

    #[test]
    fn projection_flips_y_when_requested() {
        let flipped = Output::new(Rectangle::new(0, 0, 800, 600), true);
        let normal = Output::new(Rectangle::new(0, 0, 800, 600), false);
        let p_flipped = flipped.borrow().matrix.transform([0.0, 0.0, 0.0, 1.0]);
        let p_normal = normal.borrow().matrix.transform([0.0, 0.0, 0.0, 1.0]);
        assert!((p_flipped[1] + p_normal[1]).abs() < 1e-4);
    }

    #[test]
    fn find_at_defaults_to_first_output_on_miss() {
        let mut set = OutputSet::new();
        let a = Output::new(Rectangle::new(0, 0, 100, 100), false);
        set.add(a.clone());
        let hit = set.find_at(1000, 1000).unwrap();
        assert!(Rc::ptr_eq(&hit, &a));
    }

    #[test]
    fn clamp_snaps_to_nearest_edge_outside_every_output() {
        let mut set = OutputSet::new();
        set.add(Output::new(Rectangle::new(0, 0, 800, 600), false));
        let (x, y) = set.clamp(-50, 1000);
        assert_eq!((x, y), (0, 599));
    }
}
