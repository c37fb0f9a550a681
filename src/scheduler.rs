//! Cancellable periodic and per-frame tickets
//!
//! The scheduler owns no callbacks. [`Scheduler::due`] reports which tickets
//! fired and the caller routes them to their owners. Frame tickets are
//! one-shot: an animation loop that wants the next frame must ask for it
//! again. Periodic tickets keep firing until cancelled.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::dashboard::RefresherKind;
use crate::overlay::OverlayId;

/// Handle for one scheduled callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Who a ticket fires for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketOwner {
    Overlay(OverlayId),
    Dashboard(RefresherKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    Frame,
    Periodic,
}

/// A ticket that came due during [`Scheduler::due`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub ticket: Ticket,
    pub owner: TicketOwner,
    pub kind: TicketKind,
}

#[derive(Debug, Clone, Copy)]
enum Schedule {
    Frame,
    Periodic { interval: Duration, next_due: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    owner: TicketOwner,
    schedule: Schedule,
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    entries: BTreeMap<Ticket, Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&mut self, entry: Entry) -> Ticket {
        self.next_id += 1;
        let ticket = Ticket(self.next_id);
        self.entries.insert(ticket, entry);
        ticket
    }

    /// Fire every `interval`, first at `now + interval`
    pub fn schedule_periodic(
        &mut self,
        owner: TicketOwner,
        interval: Duration,
        now: Duration,
    ) -> Ticket {
        let interval = interval.max(MIN_INTERVAL);
        self.issue(Entry {
            owner,
            schedule: Schedule::Periodic {
                interval,
                next_due: now + interval,
            },
        })
    }

    /// Fire once, on the next call to [`Scheduler::due`]
    pub fn schedule_frame(&mut self, owner: TicketOwner) -> Ticket {
        self.issue(Entry {
            owner,
            schedule: Schedule::Frame,
        })
    }

    /// Returns `true` if the ticket was still live
    pub fn cancel(&mut self, ticket: Ticket) -> bool {
        self.entries.remove(&ticket).is_some()
    }

    pub fn is_live(&self, ticket: Ticket) -> bool {
        self.entries.contains_key(&ticket)
    }

    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    pub fn live_for(&self, owner: TicketOwner) -> usize {
        self.entries.values().filter(|e| e.owner == owner).count()
    }

    /// Whether any frame ticket is waiting (the host should keep repainting)
    pub fn has_pending_frame(&self) -> bool {
        self.entries
            .values()
            .any(|e| matches!(e.schedule, Schedule::Frame))
    }

    /// Earliest periodic deadline, if any
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries
            .values()
            .filter_map(|e| match e.schedule {
                Schedule::Periodic { next_due, .. } => Some(next_due),
                Schedule::Frame => None,
            })
            .min()
    }

    /// Collect every ticket due at `now`
    ///
    /// Frame tickets are consumed. A periodic ticket fires at most once per
    /// call; missed periods are skipped rather than replayed.
    pub fn due(&mut self, now: Duration) -> Vec<Fired> {
        let mut fired = Vec::new();
        let mut consumed = Vec::new();

        for (ticket, entry) in self.entries.iter_mut() {
            match &mut entry.schedule {
                Schedule::Frame => {
                    consumed.push(*ticket);
                    fired.push(Fired {
                        ticket: *ticket,
                        owner: entry.owner,
                        kind: TicketKind::Frame,
                    });
                }
                Schedule::Periodic { interval, next_due } => {
                    if *next_due <= now {
                        let next = *next_due + *interval;
                        *next_due = if next <= now { now + *interval } else { next };
                        fired.push(Fired {
                            ticket: *ticket,
                            owner: entry.owner,
                            kind: TicketKind::Periodic,
                        });
                    }
                }
            }
        }

        for ticket in consumed {
            self.entries.remove(&ticket);
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DNA: TicketOwner = TicketOwner::Overlay(OverlayId::Dna);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_frame_ticket_fires_once() {
        let mut scheduler = Scheduler::new();
        let ticket = scheduler.schedule_frame(DNA);
        assert!(scheduler.is_live(ticket));

        let fired = scheduler.due(ms(0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, TicketKind::Frame);
        assert!(!scheduler.is_live(ticket));
        assert!(scheduler.due(ms(16)).is_empty());
    }

    #[test]
    fn test_periodic_ticket_fires_each_interval() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_periodic(DNA, ms(100), ms(0));

        assert!(scheduler.due(ms(50)).is_empty());
        assert_eq!(scheduler.due(ms(100)).len(), 1);
        assert!(scheduler.due(ms(150)).is_empty());
        assert_eq!(scheduler.due(ms(200)).len(), 1);
    }

    #[test]
    fn test_periodic_skips_missed_periods() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_periodic(DNA, ms(100), ms(0));

        // One fire even though five periods elapsed
        assert_eq!(scheduler.due(ms(500)).len(), 1);
        assert!(scheduler.due(ms(550)).is_empty());
        assert_eq!(scheduler.due(ms(600)).len(), 1);
    }

    #[test]
    fn test_cancel_stops_firing() {
        let mut scheduler = Scheduler::new();
        let ticket = scheduler.schedule_periodic(DNA, ms(10), ms(0));
        assert!(scheduler.cancel(ticket));
        assert!(!scheduler.cancel(ticket));
        assert!(scheduler.due(ms(1000)).is_empty());
        assert_eq!(scheduler.live_count(), 0);
    }

    #[test]
    fn test_frame_scheduled_during_dispatch_waits_for_next_call() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_frame(DNA);
        let fired = scheduler.due(ms(0));
        assert_eq!(fired.len(), 1);

        // Re-arm as a loop would
        scheduler.schedule_frame(DNA);
        assert!(scheduler.has_pending_frame());
        assert_eq!(scheduler.due(ms(16)).len(), 1);
    }

    #[test]
    fn test_live_for_owner() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_frame(DNA);
        scheduler.schedule_periodic(DNA, ms(10), ms(0));
        scheduler.schedule_periodic(TicketOwner::Overlay(OverlayId::Network), ms(10), ms(0));
        assert_eq!(scheduler.live_for(DNA), 2);
        assert_eq!(scheduler.next_deadline(), Some(ms(10)));
    }

    proptest! {
        #[test]
        fn prop_cancelled_tickets_never_fire(
            intervals in proptest::collection::vec(1u64..500, 1..20),
            cancel_mask in proptest::collection::vec(any::<bool>(), 20),
        ) {
            let mut scheduler = Scheduler::new();
            let mut cancelled = Vec::new();
            for (i, interval) in intervals.iter().enumerate() {
                let ticket = scheduler.schedule_periodic(DNA, ms(*interval), ms(0));
                if cancel_mask[i] {
                    scheduler.cancel(ticket);
                    cancelled.push(ticket);
                }
            }
            for step in 1..=20u64 {
                for fired in scheduler.due(ms(step * 50)) {
                    prop_assert!(!cancelled.contains(&fired.ticket));
                }
            }
            prop_assert_eq!(scheduler.live_count(), intervals.len() - cancelled.len());
        }
    }
}
