//! Frame-rate independent animation
//!
//! An overlay's loop is a chain of one-shot frame tickets. Each frame checks
//! liveness first, re-arms the next frame, then computes a clamped delta so
//! every animated quantity advances by `rate * dt` regardless of how often
//! frames arrive.
//!
//! # Usage
//! ```ignore
//! let mut frame = AnimationFrameState::default();
//! frame.start(&mut scheduler, owner);
//!
//! // When the scheduler fires `ticket` for `owner`:
//! if let Some(dt) = frame.on_frame(&mut scheduler, owner, ticket, now, max_step, is_active) {
//!     rotation += SPIN_RATE * dt;
//! }
//! ```

use std::time::Duration;

use crate::scheduler::{Scheduler, Ticket, TicketOwner};

/// Per-frame timing handed to a visualization's update hook
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStep {
    /// Seconds since the previous frame, clamped to `[0, max_step]`
    pub dt: f32,
    /// Seconds since activation, from the monotonic clock
    pub elapsed: f32,
}

#[derive(Debug, Default)]
pub struct AnimationFrameState {
    last_frame_time: Option<Duration>,
    cancelled: bool,
    handle: Option<Ticket>,
}

impl AnimationFrameState {
    /// Arm the first frame. Starting a running loop is a no-op.
    pub fn start(&mut self, scheduler: &mut Scheduler, owner: TicketOwner) -> bool {
        if self.handle.is_some() && !self.cancelled {
            return false;
        }
        self.cancelled = false;
        self.last_frame_time = None;
        self.handle = Some(scheduler.schedule_frame(owner));
        true
    }

    /// Cancel the pending frame; returns `true` if one was pending
    pub fn stop(&mut self, scheduler: &mut Scheduler) -> bool {
        self.cancelled = true;
        self.last_frame_time = None;
        match self.handle.take() {
            Some(ticket) => scheduler.cancel(ticket),
            None => false,
        }
    }

    /// Handle a fired frame ticket
    ///
    /// Returns the clamped delta in seconds, or `None` when the loop is not
    /// live (in which case no further frame is scheduled). The first frame
    /// after a start has a delta of zero.
    pub fn on_frame(
        &mut self,
        scheduler: &mut Scheduler,
        owner: TicketOwner,
        ticket: Ticket,
        now: Duration,
        max_step: Duration,
        live: bool,
    ) -> Option<f32> {
        if self.handle != Some(ticket) {
            return None;
        }
        self.handle = None;
        if self.cancelled || !live {
            return None;
        }

        self.handle = Some(scheduler.schedule_frame(owner));

        let dt = match self.last_frame_time {
            None => Duration::ZERO,
            Some(prev) => now.saturating_sub(prev).min(max_step),
        };
        self.last_frame_time = Some(now);
        Some(dt.as_secs_f32())
    }

    pub fn handle(&self) -> Option<Ticket> {
        self.handle
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

// =============================================================================
// SPRING F32
// =============================================================================

/// Critically-damped spring for smooth UI fades
///
/// # Usage
/// ```ignore
/// let mut dim = SpringF32::new(1.0);
/// dim.set_target(0.0);
///
/// // Each frame:
/// dim.tick(dt);
/// let opacity = dim.get();
/// ```
#[derive(Debug, Clone)]
pub struct SpringF32 {
    current: f32,
    target: f32,
    velocity: f32,
    stiffness: f32,
    damping: f32,
}

impl SpringF32 {
    pub fn new(initial: f32) -> Self {
        Self::with_stiffness(initial, 170.0)
    }

    pub fn with_stiffness(initial: f32, stiffness: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            velocity: 0.0,
            stiffness,
            damping: 1.0,
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Jump immediately to value (no animation)
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.velocity = 0.0;
    }

    /// F = -k*x - c*v, with c = damping * 2 * sqrt(k)
    pub fn tick(&mut self, dt: f32) {
        // Clamp dt to prevent instability with large time steps
        let dt = dt.min(0.1);

        let displacement = self.current - self.target;
        let spring_force = -self.stiffness * displacement;
        let damping_force = -self.damping * 2.0 * self.stiffness.sqrt() * self.velocity;
        self.velocity += (spring_force + damping_force) * dt;
        self.current += self.velocity * dt;

        if (self.current - self.target).abs() < 1e-4 && self.velocity.abs() < 1e-4 {
            self.current = self.target;
            self.velocity = 0.0;
        }
    }

    pub fn get(&self) -> f32 {
        self.current
    }

    pub fn is_animating(&self) -> bool {
        self.current != self.target || self.velocity != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayId;

    const OWNER: TicketOwner = TicketOwner::Overlay(OverlayId::Devices);
    const MAX_STEP: Duration = Duration::from_millis(40);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn fire(
        frame: &mut AnimationFrameState,
        scheduler: &mut Scheduler,
        now: Duration,
        live: bool,
    ) -> Option<f32> {
        let fired = scheduler.due(now);
        let ticket = fired.iter().find(|f| f.owner == OWNER)?.ticket;
        frame.on_frame(scheduler, OWNER, ticket, now, MAX_STEP, live)
    }

    #[test]
    fn test_first_frame_has_zero_delta() {
        let mut scheduler = Scheduler::new();
        let mut frame = AnimationFrameState::default();
        frame.start(&mut scheduler, OWNER);
        assert_eq!(fire(&mut frame, &mut scheduler, ms(1000), true), Some(0.0));
        let dt = fire(&mut frame, &mut scheduler, ms(1016), true).unwrap();
        assert!((dt - 0.016).abs() < 1e-6);
    }

    #[test]
    fn test_long_gap_is_clamped() {
        let mut scheduler = Scheduler::new();
        let mut frame = AnimationFrameState::default();
        frame.start(&mut scheduler, OWNER);
        fire(&mut frame, &mut scheduler, ms(0), true);
        let dt = fire(&mut frame, &mut scheduler, ms(400), true).unwrap();
        assert!((dt - 0.040).abs() < 1e-6);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut scheduler = Scheduler::new();
        let mut frame = AnimationFrameState::default();
        assert!(frame.start(&mut scheduler, OWNER));
        assert!(!frame.start(&mut scheduler, OWNER));
        assert_eq!(scheduler.live_for(OWNER), 1);
    }

    #[test]
    fn test_not_live_does_not_reschedule() {
        let mut scheduler = Scheduler::new();
        let mut frame = AnimationFrameState::default();
        frame.start(&mut scheduler, OWNER);
        assert_eq!(fire(&mut frame, &mut scheduler, ms(0), false), None);
        assert!(frame.handle().is_none());
        assert_eq!(scheduler.live_count(), 0);
    }

    #[test]
    fn test_stop_cancels_pending_frame() {
        let mut scheduler = Scheduler::new();
        let mut frame = AnimationFrameState::default();
        frame.start(&mut scheduler, OWNER);
        assert!(frame.stop(&mut scheduler));
        assert!(!frame.stop(&mut scheduler));
        assert!(frame.is_cancelled());
        assert!(scheduler.due(ms(16)).is_empty());
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut scheduler = Scheduler::new();
        let mut frame = AnimationFrameState::default();
        frame.start(&mut scheduler, OWNER);
        let stray = scheduler.schedule_frame(OWNER);
        assert_eq!(frame.on_frame(&mut scheduler, OWNER, stray, ms(0), MAX_STEP, true), None);
        assert!(frame.is_running());
    }

    #[test]
    fn test_restart_after_stop() {
        let mut scheduler = Scheduler::new();
        let mut frame = AnimationFrameState::default();
        frame.start(&mut scheduler, OWNER);
        frame.stop(&mut scheduler);
        assert!(frame.start(&mut scheduler, OWNER));
        assert_eq!(fire(&mut frame, &mut scheduler, ms(5000), true), Some(0.0));
    }

    #[test]
    fn test_spring_converges() {
        let mut spring = SpringF32::new(0.0);
        spring.set_target(1.0);
        for _ in 0..120 {
            spring.tick(1.0 / 60.0);
        }
        assert!((spring.get() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_spring_immediate() {
        let mut spring = SpringF32::new(0.0);
        spring.set_immediate(0.35);
        assert_eq!(spring.get(), 0.35);
        assert!(!spring.is_animating());
    }
}
