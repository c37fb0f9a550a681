//! Teardown of everything an overlay activation allocated
//!
//! [`dispose`] checks each piece before acting on it, so a second call finds
//! nothing left and reports all zeros.

use crate::animation::AnimationFrameState;
use crate::chrome::{Chrome, ChromeKey};
use crate::scene::{Generation, ResourceArena};
use crate::scheduler::{Scheduler, Ticket};

/// Handles held by one active overlay
#[derive(Debug, Default)]
pub struct OverlayResources {
    pub generation: Option<Generation>,
    pub frame: AnimationFrameState,
    pub poll_ticket: Option<Ticket>,
    /// Chrome elements created for this activation
    pub chrome: Vec<ChromeKey>,
}

impl OverlayResources {
    pub fn is_empty(&self) -> bool {
        self.generation.is_none()
            && self.frame.handle().is_none()
            && self.poll_ticket.is_none()
            && self.chrome.is_empty()
    }
}

/// What one [`dispose`] call actually released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposalReport {
    pub nodes: usize,
    pub frames_cancelled: usize,
    pub polls_cancelled: usize,
    pub chrome_removed: usize,
}

impl DisposalReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

pub fn dispose(
    resources: &mut OverlayResources,
    scheduler: &mut Scheduler,
    arena: &mut ResourceArena,
    chrome: &mut Chrome,
) -> DisposalReport {
    let mut report = DisposalReport::default();

    if resources.frame.stop(scheduler) {
        report.frames_cancelled = 1;
    }

    if let Some(ticket) = resources.poll_ticket.take() {
        if scheduler.cancel(ticket) {
            report.polls_cancelled = 1;
        }
    }

    if let Some(generation) = resources.generation.take() {
        report.nodes = arena.release_generation(generation);
    }

    for key in resources.chrome.drain(..) {
        if chrome.remove(key) {
            report.chrome_removed += 1;
        }
    }

    report
}
