//! Compositor root (C5/C10): aggregated damage, repaint scheduling, frame-callback delivery,
//! and the idle/active state machine. Grounded on Smithay's `src/compositor/mod.rs` for the
//! root-container shape and on `compositor/compositor.c`'s `repaint_output`/`idle_handler`
//! for the exact repaint-tick and idle-timeout algorithm §4.5 describes.

use crate::backend::Backend;
use crate::config::Config;
use crate::data_device::DataDeviceManager;
use crate::events::ClientEvents;
use crate::geometry::{Rectangle, Region};
use crate::input::{Binding, InputHandle};
use crate::output::OutputHandle;
use crate::renderer;
use crate::shell::Shell;
use crate::surface::SurfaceHandle;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Sleep/wake state driven by the idle timer (§4.5 expansion of the `active`/idle-inhibit
/// fields §3 declares but the distilled spec never wires up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Active,
    Sleeping,
}

/// Root container for the whole scene (§3 `Compositor`). Owns every other subsystem's state
/// and is the single mutable borrow all core entry points take.
pub struct Compositor {
    pub stack: Vec<SurfaceHandle>,
    pub outputs: crate::output::OutputSet,
    pub inputs: Vec<InputHandle>,
    pub damage_region: Region,
    pub bindings: Vec<Binding>,
    pub backend: Box<dyn Backend>,
    pub events: Box<dyn ClientEvents>,
    pub data_device: DataDeviceManager,
    pub config: Config,
    /// Taken out and put back by [`Compositor::with_shell`] so a `Shell` method can receive
    /// `&mut Compositor` without aliasing the field it was called through.
    shell: Option<Box<dyn Shell>>,
    /// Set by [`crate::shell::Shell::lock`]/`unlock`; read by the input router to suppress
    /// non-essential bindings while a lock surface is up (§4.8).
    pub locked: bool,
    active: ActiveState,
    idle_inhibit_count: u32,
    last_activity: Instant,
    last_repaint: Instant,
    /// The duration to arm the repaint timer for, or `None` if no repaint is pending. Holds
    /// whichever deadline is sooner: the 1ms generic rearm (§4.5 "schedule repaint") or the
    /// 5ms batching deadline `finish_frame` requests.
    repaint_timer_due: Option<Duration>,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("stack_len", &self.stack.len())
            .field("active", &self.active)
            .field("idle_inhibit_count", &self.idle_inhibit_count)
            .finish()
    }
}

impl Compositor {
    pub fn new(backend: Box<dyn Backend>, events: Box<dyn ClientEvents>, shell: Box<dyn Shell>, config: Config) -> Self {
        Compositor {
            stack: Vec::new(),
            outputs: crate::output::OutputSet::new(),
            inputs: Vec::new(),
            damage_region: Region::empty(),
            bindings: Vec::new(),
            backend,
            events,
            data_device: DataDeviceManager::new(),
            config,
            shell: Some(shell),
            locked: false,
            active: ActiveState::Active,
            idle_inhibit_count: 0,
            last_activity: Instant::now(),
            last_repaint: Instant::now(),
            repaint_timer_due: None,
        }
    }

    /// Arm the repaint timer for `duration`, keeping the sooner of the new request and any
    /// deadline already pending.
    fn arm_repaint_timer(&mut self, duration: Duration) {
        self.repaint_timer_due = Some(match self.repaint_timer_due {
            Some(existing) if existing <= duration => existing,
            _ => duration,
        });
    }

    /// Take the installed [`Shell`] out, run `f` with both it and `self`, then put it back.
    /// This is the only way shell-policy methods (which need `&mut Compositor` themselves) get
    /// invoked — a plain `self.shell.configure(self, ...)` call does not borrow-check.
    pub fn with_shell<R>(&mut self, f: impl FnOnce(&mut Compositor, &mut dyn Shell) -> R) -> R {
        let mut shell = self.shell.take().expect("shell is only absent while with_shell is on the stack");
        let result = f(self, shell.as_mut());
        self.shell = Some(shell);
        result
    }

    /// Union `rect` into the accumulated damage region and schedule a repaint (C2
    /// `damage`/`damage_rect`).
    pub fn damage_rect(&mut self, rect: Rectangle) {
        self.damage_region.union_rect(rect);
        self.schedule_repaint();
    }

    /// Mark every output needing a repaint and arm the 1ms repaint timer if it isn't already
    /// (§4.5 "schedule repaint").
    pub fn schedule_repaint(&mut self) {
        for output in self.outputs.iter() {
            output.borrow_mut().repaint_needed = true;
        }
        self.arm_repaint_timer(Duration::from_millis(1));
    }

    /// Move `surface` to the front of the stack (C2 `raise`). No-op if absent.
    pub fn raise_surface(&mut self, surface: &SurfaceHandle) {
        if let Some(pos) = self.stack.iter().position(|s| Rc::ptr_eq(s, surface)) {
            let s = self.stack.remove(pos);
            self.stack.insert(0, s);
        }
    }

    /// Unlink `surface` from the stack and notify every seat that held a grab or focus on it
    /// (§4.7 ordering guarantee: destruction cancels grabs/focus before any further event can
    /// reach the destroyed client).
    pub fn unlink_surface(&mut self, surface: &SurfaceHandle) {
        self.stack.retain(|s| !Rc::ptr_eq(s, surface));
        crate::input::notify_surface_destroyed(self, surface);
    }

    pub fn inhibit_idle(&mut self) {
        self.idle_inhibit_count += 1;
    }

    pub fn uninhibit_idle(&mut self) {
        self.idle_inhibit_count = self.idle_inhibit_count.saturating_sub(1);
    }

    /// Reset the idle clock; called on every input event (§4.5 idle expansion).
    pub fn note_activity(&mut self) {
        self.last_activity = Instant::now();
        if self.active == ActiveState::Sleeping {
            self.wake();
        }
    }

    /// Transition back to `Active` and schedule a full repaint of every output.
    pub fn wake(&mut self) {
        self.active = ActiveState::Active;
        for output in self.outputs.iter() {
            self.damage_region.union_rect(output.borrow().rect);
        }
        self.schedule_repaint();
    }

    pub fn active_state(&self) -> ActiveState {
        self.active
    }

    /// Whether the idle timeout has elapsed with no inhibitors held; the caller is expected to
    /// poll this from its own idle timer source and call [`Compositor::sleep`] when it fires.
    pub fn idle_elapsed(&self) -> bool {
        self.idle_inhibit_count == 0 && self.last_activity.elapsed() >= Duration::from_millis(self.config.idle_timeout_ms)
    }

    /// Transition to `Sleeping`: stop arming the repaint timer until the next activity or an
    /// explicit [`Compositor::wake`].
    pub fn sleep(&mut self) {
        self.active = ActiveState::Sleeping;
    }

    /// A `calloop` timer source pre-armed for the idle timeout, for the owner's event loop to
    /// register once at startup (§5: timer/event-loop plumbing built on `calloop`).
    pub fn idle_timer(&self) -> calloop::timer::Timer {
        calloop::timer::Timer::from_duration(Duration::from_millis(self.config.idle_timeout_ms))
    }

    /// Run one repaint tick over every output (C5 §4.5). Returns `true` if the timer must be
    /// rearmed (some output was skipped because the backend hadn't finished its previous
    /// present).
    pub fn repaint_tick(&mut self) -> bool {
        self.repaint_timer_due = None;
        if self.active == ActiveState::Sleeping {
            return false;
        }

        let dt_ms = self.last_repaint.elapsed().as_millis().min(u128::from(u32::MAX)) as u32;
        self.last_repaint = Instant::now();
        self.with_shell(|c, shell| shell.tick(c, dt_ms));

        let outputs: Vec<OutputHandle> = self.outputs.iter().cloned().collect();
        let mut rearm = false;

        for output in &outputs {
            let (needs, finished) = {
                let o = output.borrow();
                (o.repaint_needed, o.finished)
            };
            if !needs {
                continue;
            }
            if !finished {
                rearm = true;
                continue;
            }

            let out_rect = output.borrow().rect;
            let new_damage = self.damage_region.intersect_rect(out_rect);
            self.damage_region.subtract_rect(out_rect);

            let mut total_damage = new_damage.clone();
            total_damage.union(&output.borrow().previous_damage);
            output.borrow_mut().previous_damage = new_damage;

            renderer::render_output(self.backend.as_ref(), &self.stack, output, &self.inputs, total_damage);

            {
                let mut o = output.borrow_mut();
                o.finished = false;
                o.repaint_needed = false;
            }
            self.backend.present(output);
        }

        if rearm {
            self.arm_repaint_timer(Duration::from_millis(1));
        }
        rearm
    }

    /// Called by the backend when `output` has finished presenting the previous frame (C5
    /// §4.5 `finish_frame`): deliver frame-completion to every surface assigned to it, mark it
    /// finished, and arm the 5ms batching-deadline timer.
    pub fn finish_frame(&mut self, output: &OutputHandle, msecs: u32) {
        for surface in &self.stack {
            let assigned = surface
                .borrow()
                .output
                .as_ref()
                .and_then(std::rc::Weak::upgrade)
                .map(|o| Rc::ptr_eq(&o, output))
                .unwrap_or(false);
            if assigned {
                self.events.frame_done(surface, msecs);
            }
        }
        output.borrow_mut().finished = true;
        self.arm_repaint_timer(Duration::from_millis(5));
    }

    /// Whether the repaint timer should be (re-)armed right now. The owner's event loop polls
    /// this after every entry point call and, if `true`, registers [`Compositor::repaint_timer`].
    pub fn repaint_timer_armed(&self) -> bool {
        self.repaint_timer_due.is_some()
    }

    /// A `calloop` timer source pre-armed for whichever deadline is currently due: the 1ms
    /// repaint rearm, or the 5ms batching deadline `finish_frame` requests (§4.5), for the
    /// owner's event loop to register whenever [`Compositor::repaint_timer_armed`] is true.
    pub fn repaint_timer(&self) -> calloop::timer::Timer {
        calloop::timer::Timer::from_duration(self.repaint_timer_due.unwrap_or(Duration::from_millis(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;
    use crate::output::Output;
    use crate::surface::Surface;
    use crate::test_util::test_compositor;

    #[test]
    fn damage_rect_schedules_repaint_on_every_output() {
        let mut compositor = test_compositor();
        compositor.outputs.add(Output::new(Rectangle::new(0, 0, 100, 100), false));
        compositor.damage_rect(Rectangle::new(0, 0, 10, 10));
        assert!(compositor.outputs.iter().next().unwrap().borrow().repaint_needed);
        assert!(compositor.repaint_timer_armed());
    }

    #[test]
    fn raise_surface_moves_it_to_stack_front() {
        let mut compositor = test_compositor();
        let a = Surface::new_unallocated(0, 0, 10, 10);
        let b = Surface::new_unallocated(0, 0, 10, 10);
        compositor.stack = vec![a.clone(), b.clone()];
        compositor.raise_surface(&b);
        assert!(Rc::ptr_eq(&compositor.stack[0], &b));
    }

    #[test]
    fn repaint_tick_consumes_damage_and_marks_output_unfinished() {
        let mut compositor = test_compositor();
        let output = Output::new(Rectangle::new(0, 0, 100, 100), false);
        compositor.outputs.add(output.clone());
        output.borrow_mut().finished = true;
        compositor.damage_rect(Rectangle::new(0, 0, 10, 10));

        compositor.repaint_tick();

        assert!(!output.borrow().finished);
        assert!(!output.borrow().repaint_needed);
        assert!(compositor.damage_region.is_empty());
    }

    #[test]
    fn repaint_tick_rearms_when_output_not_finished() {
        let mut compositor = test_compositor();
        let output = Output::new(Rectangle::new(0, 0, 100, 100), false);
        compositor.outputs.add(output.clone());
        output.borrow_mut().finished = false;
        compositor.damage_rect(Rectangle::new(0, 0, 10, 10));

        let rearm = compositor.repaint_tick();

        assert!(rearm);
        assert!(output.borrow().repaint_needed);
    }

    #[test]
    fn finish_frame_arms_timer_for_five_milliseconds() {
        let mut compositor = test_compositor();
        let output = Output::new(Rectangle::new(0, 0, 100, 100), false);
        compositor.outputs.add(output.clone());

        let before = Instant::now();
        compositor.finish_frame(&output, 0);

        assert!(compositor.repaint_timer_armed());
        let deadline = compositor.repaint_timer().current_deadline().unwrap();
        let delay = deadline.duration_since(before);
        assert!(delay >= Duration::from_millis(5), "expected >= 5ms, got {delay:?}");
        assert!(delay < Duration::from_millis(20), "expected well under 20ms, got {delay:?}");
    }

    #[test]
    fn generic_rearm_keeps_the_sooner_deadline_after_finish_frame() {
        let mut compositor = test_compositor();
        let output = Output::new(Rectangle::new(0, 0, 100, 100), false);
        compositor.outputs.add(output.clone());

        let before = Instant::now();
        compositor.finish_frame(&output, 0);
        compositor.damage_rect(Rectangle::new(0, 0, 10, 10));

        let deadline = compositor.repaint_timer().current_deadline().unwrap();
        let delay = deadline.duration_since(before);
        assert!(delay < Duration::from_millis(5), "expected the sooner 1ms deadline to win, got {delay:?}");
    }

    #[test]
    fn sleeping_compositor_skips_repaint_until_woken() {
        let mut compositor = test_compositor();
        let output = Output::new(Rectangle::new(0, 0, 100, 100), false);
        compositor.outputs.add(output.clone());
        output.borrow_mut().finished = true;
        compositor.sleep();
        compositor.damage_rect(Rectangle::new(0, 0, 10, 10));

        compositor.repaint_tick();
        assert!(output.borrow().repaint_needed, "sleeping tick must not clear repaint_needed");

        compositor.wake();
        compositor.repaint_tick();
        assert!(!output.borrow().repaint_needed);
    }
}
