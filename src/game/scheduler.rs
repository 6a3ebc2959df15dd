use serde::{Deserialize, Serialize};

use crate::ai::AiDecision;

use super::player::PlayerId;

/// Identifies one scheduled transition. Tickets are never reused in a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ScheduledAction {
    /// A computer player's decision, applied once its thinking delay ends.
    ComputerMove {
        player_id: PlayerId,
        decision: AiDecision,
    },
    /// Takes the life after a failed guess has been on display.
    ResolveResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTransition {
    pub ticket: Ticket,
    pub delay_ms: u32,
    pub action: ScheduledAction,
}

/// Single pending-transition slot. Scheduling replaces whatever was pending,
/// so at most one timer is ever live and an outdated one cannot fire.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_ticket: u64,
    pending: Option<ScheduledTransition>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, delay_ms: u32, action: ScheduledAction) -> &ScheduledTransition {
        self.next_ticket += 1;
        self.pending.insert(ScheduledTransition {
            ticket: Ticket(self.next_ticket),
            delay_ms,
            action,
        })
    }

    /// Drops the pending transition, if any. Safe to call at any time.
    pub fn cancel(&mut self) -> Option<ScheduledTransition> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&ScheduledTransition> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self, ticket: Ticket) -> bool {
        self.pending
            .as_ref()
            .map_or(false, |pending| pending.ticket == ticket)
    }

    /// Claims the pending transition if `ticket` still names it.
    pub fn take(&mut self, ticket: Ticket) -> Option<ScheduledTransition> {
        if self.is_pending(ticket) {
            self.pending.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_schedule_replaces_the_pending_one() {
        let mut scheduler = Scheduler::new();
        let first = scheduler.schedule(100, ScheduledAction::ResolveResult).ticket;
        let second = scheduler.schedule(200, ScheduledAction::ResolveResult).ticket;

        assert_ne!(first, second);
        assert!(scheduler.take(first).is_none(), "replaced ticket is stale");
        let taken = scheduler.take(second).expect("latest ticket fires");
        assert_eq!(taken.delay_ms, 200);
        assert!(scheduler.pending().is_none());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.cancel().is_none());
        let ticket = scheduler.schedule(10, ScheduledAction::ResolveResult).ticket;
        assert!(scheduler.cancel().is_some());
        assert!(scheduler.cancel().is_none());
        assert!(scheduler.take(ticket).is_none());
    }

    #[test]
    fn ticket_fires_once() {
        let mut scheduler = Scheduler::new();
        let ticket = scheduler.schedule(0, ScheduledAction::ResolveResult).ticket;
        assert!(scheduler.take(ticket).is_some());
        assert!(scheduler.take(ticket).is_none());
    }
}
