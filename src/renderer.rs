//! Renderer driver (C6): turns a stack of surfaces plus a screen-space damage region into a
//! sequence of clipped, blend-mode-tagged draw calls. The actual GPU work (shader binding,
//! vertex upload) is the backend's job — see §1's non-goal on rendering-pipeline detail; this
//! module only decides *what* to draw and *in what order*, which is the part the damage and
//! stacking invariants actually constrain.

use crate::backend::{Backend, BlendMode, DrawCall};
use crate::buffer::Visual;
use crate::geometry::Region;
use crate::input::InputHandle;
use crate::output::OutputHandle;
use crate::surface::{Role, SurfaceHandle};
use std::rc::Rc;

fn blend_for(visual: Visual) -> BlendMode {
    match visual {
        Visual::OpaqueRgb => BlendMode::Opaque,
        Visual::PremultipliedArgb => BlendMode::Premultiplied,
        Visual::StraightArgb => BlendMode::Straight,
    }
}

fn is_fullscreen_on(surface: &SurfaceHandle, output: &OutputHandle) -> bool {
    let s = surface.borrow();
    s.role == Role::Fullscreen
        && s.fullscreen_output
            .as_ref()
            .and_then(std::rc::Weak::upgrade)
            .map(|o| Rc::ptr_eq(&o, output))
            .unwrap_or(false)
}

/// Render one output's damaged region against the current surface stack (C6 §4.6). `stack`
/// is front-to-back (topmost first), matching the compositor's own ordering. Returns every
/// draw call issued, in emission order, for both driving a real backend (each call is also
/// forwarded to `backend.draw`) and for test assertions (§8 scenarios 2 and 5).
pub fn render_output(
    backend: &dyn Backend,
    stack: &[SurfaceHandle],
    output: &OutputHandle,
    inputs: &[InputHandle],
    mut total_damage: Region,
) -> Vec<DrawCall> {
    let mut calls = Vec::new();

    backend.prepare_render(output);

    let hardware_cursor_active = inputs.first().map(|i| i.borrow().hardware_cursor).unwrap_or(false);

    if let Some(top) = stack.first() {
        let eligible = {
            let s = top.borrow();
            s.visual == Visual::OpaqueRgb
        } && is_fullscreen_on(top, output)
            && hardware_cursor_active;
        if eligible && backend.prepare_scanout_surface(output, top) {
            // Scanout takes the whole output directly; the damage is deferred back to the
            // next frame in case scanout stops being available, so no draw calls are issued.
            return calls;
        }
    }

    // Front-to-back opaque pass: eliminate overdraw by subtracting each opaque surface's
    // full footprint from the remaining damage, regardless of how much of it was actually
    // drawn this frame.
    for surface in stack.iter() {
        let (visual, rect, texture) = {
            let s = surface.borrow();
            (s.visual, s.rect(), s.texture)
        };
        if visual != Visual::OpaqueRgb {
            continue;
        }
        let clipped = total_damage.intersect_rect(rect);
        for piece in clipped.rectangles() {
            let call = DrawCall {
                texture,
                rect: *piece,
                blend: BlendMode::Opaque,
            };
            backend.draw(call);
            calls.push(call);
        }
        total_damage.subtract_rect(rect);
    }

    // Background, or a clear, into whatever damage remains after the opaque pass.
    if let Some(bg) = stack.iter().find(|s| s.borrow().role == Role::Background) {
        let (rect, texture) = {
            let s = bg.borrow();
            (s.rect(), s.texture)
        };
        let clipped = total_damage.intersect_rect(rect);
        for piece in clipped.rectangles() {
            let call = DrawCall {
                texture,
                rect: *piece,
                blend: BlendMode::Opaque,
            };
            backend.draw(call);
            calls.push(call);
        }
    } else {
        for piece in total_damage.rectangles() {
            backend.clear(*piece);
        }
    }

    // Back-to-front translucent pass: opaque surfaces below a translucent one must be
    // redrawn under it, so their rectangles go back into the damage region; translucent
    // surfaces themselves always draw into whatever damage remains.
    for surface in stack.iter().rev() {
        let (visual, rect, texture) = {
            let s = surface.borrow();
            (s.visual, s.rect(), s.texture)
        };
        match visual {
            Visual::OpaqueRgb => total_damage.union_rect(rect),
            Visual::PremultipliedArgb | Visual::StraightArgb => {
                let clipped = total_damage.intersect_rect(rect);
                for piece in clipped.rectangles() {
                    let call = DrawCall {
                        texture,
                        rect: *piece,
                        blend: blend_for(visual),
                    };
                    backend.draw(call);
                    calls.push(call);
                }
            }
        }
    }

    // Input-device cursor sprites, skipping any the backend accepted as a hardware cursor.
    for input in inputs {
        let input_ref = input.borrow();
        if input_ref.hardware_cursor {
            continue;
        }
        let sprite = input_ref.cursor_sprite.clone();
        drop(input_ref);
        let (rect, texture) = {
            let s = sprite.borrow();
            (s.rect(), s.texture)
        };
        let call = DrawCall {
            texture,
            rect,
            blend: BlendMode::Straight,
        };
        backend.draw(call);
        calls.push(call);
    }

    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;
    use crate::output::Output;
    use crate::surface::Surface;
    use crate::test_util::RecordingBackend;

    #[test]
    fn opaque_overdraw_elimination_draws_top_surface_fully_and_bottom_minus_overlap() {
        let backend = RecordingBackend::default();
        let output = Output::new(Rectangle::new(0, 0, 1024, 768), false);

        let a = Surface::new_unallocated(0, 0, 1024, 768); // bottom, fullscreen-sized
        let b = Surface::new_unallocated(200, 200, 500, 500); // top, overlapping
        a.borrow_mut().texture = 1;
        b.borrow_mut().texture = 2;

        let stack = vec![b.clone(), a.clone()]; // topmost first
        let damage = Region::from_rect(Rectangle::new(0, 0, 1024, 768));

        let calls = render_output(&backend, &stack, &output, &[], damage);

        let b_area: i64 = calls.iter().filter(|c| c.texture == 2).map(|c| c.rect.area()).sum();
        let a_area: i64 = calls.iter().filter(|c| c.texture == 1).map(|c| c.rect.area()).sum();
        assert_eq!(b_area, b.borrow().rect().area());
        assert_eq!(a_area, a.borrow().rect().area() - a.borrow().rect().intersection(&b.borrow().rect()).unwrap().area());
    }

    #[test]
    fn fullscreen_scanout_success_issues_zero_draw_calls() {
        let backend = RecordingBackend::default();
        backend.scanout_accepts.set(true);
        let output = Output::new(Rectangle::new(0, 0, 800, 600), false);

        let fullscreen = Surface::new_unallocated(0, 0, 800, 600);
        fullscreen.borrow_mut().role = Role::Fullscreen;
        fullscreen.borrow_mut().fullscreen_output = Some(Rc::downgrade(&output));

        let input = crate::input::Input::new();
        input.borrow_mut().hardware_cursor = true;

        let stack = vec![fullscreen];
        let damage = Region::from_rect(Rectangle::new(0, 0, 800, 600));
        let calls = render_output(&backend, &stack, &output, &[input], damage);
        assert!(calls.is_empty());
    }

    #[test]
    fn fullscreen_scanout_refusal_falls_back_to_full_draw() {
        let backend = RecordingBackend::default();
        backend.scanout_accepts.set(false);
        let output = Output::new(Rectangle::new(0, 0, 800, 600), false);

        let fullscreen = Surface::new_unallocated(0, 0, 800, 600);
        fullscreen.borrow_mut().role = Role::Fullscreen;
        fullscreen.borrow_mut().fullscreen_output = Some(Rc::downgrade(&output));

        let input = crate::input::Input::new();
        input.borrow_mut().hardware_cursor = true;

        let stack = vec![fullscreen.clone()];
        let damage = Region::from_rect(Rectangle::new(0, 0, 800, 600));
        let calls = render_output(&backend, &stack, &output, &[input], damage);
        let total: i64 = calls.iter().map(|c| c.rect.area()).sum();
        assert_eq!(total, fullscreen.borrow().rect().area());
    }
}
