//! Portal lifecycle tracking.
use std::collections::HashMap;

use crate::{common::verbose, statement::PortalName};

/// Lifecycle of a server side portal.
///
/// ```text
/// Unbound -> Bound -> Active <-> Suspended
///              |        |           |
///              +--------+-> Exhausted / Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalState {
    /// `Bind` written, not yet acknowledged.
    Unbound,
    /// `BindComplete` received.
    Bound,
    /// Execution returning rows.
    Active,
    /// Row limit reached, the cursor position is retained.
    Suspended,
    /// Execution ran to completion, only close is meaningful.
    Exhausted,
    /// Terminal.
    Closed,
}

impl PortalState {
    /// Whether `Execute` may be sent for the portal.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, Self::Exhausted | Self::Closed)
    }

    fn can_advance(self, to: PortalState) -> bool {
        use PortalState::*;
        match (self, to) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Unbound, Bound) => true,
            (Bound | Active | Suspended, Active | Suspended | Exhausted) => true,
            _ => false,
        }
    }
}

/// Portals bound on this connection.
#[derive(Debug, Default)]
pub struct PortalTracker {
    portals: HashMap<PortalName, PortalState>,
}

impl PortalTracker {
    /// A `Bind` was written, whatever occupied the slot is superseded.
    pub(crate) fn bind(&mut self, name: &PortalName) {
        if let Some(_old) = self.portals.insert(name.clone(), PortalState::Unbound) {
            verbose!(portal = %name, state = ?_old, "portal superseded");
        }
    }

    /// Move a portal to `to`, invalid transitions are ignored.
    pub(crate) fn advance(&mut self, name: &PortalName, to: PortalState) {
        let Some(state) = self.portals.get_mut(name) else {
            return;
        };
        if state.can_advance(to) {
            *state = to;
        }
    }

    /// A transaction ended, the server dropped every portal.
    ///
    /// Closed portals from the previous transaction are forgotten.
    pub(crate) fn end_transaction(&mut self) {
        self.portals.retain(|_, state| *state != PortalState::Closed);
        for state in self.portals.values_mut() {
            *state = PortalState::Closed;
        }
    }

    /// State of a portal, `None` if it was never bound on this connection.
    pub fn state(&self, name: &PortalName) -> Option<PortalState> {
        self.portals.get(name).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use PortalState::*;

    #[test]
    fn lifecycle() {
        let mut tracker = PortalTracker::default();
        let name = PortalName::from("c1");

        tracker.bind(&name);
        tracker.advance(&name, Bound);
        tracker.advance(&name, Active);
        tracker.advance(&name, Suspended);
        assert_eq!(tracker.state(&name), Some(Suspended));

        tracker.advance(&name, Active);
        tracker.advance(&name, Exhausted);
        assert!(!tracker.state(&name).unwrap().is_resumable());

        tracker.advance(&name, Closed);
        tracker.advance(&name, Active);
        assert_eq!(tracker.state(&name), Some(Closed));
    }

    #[test]
    fn unnamed_slot_superseded() {
        let mut tracker = PortalTracker::default();
        let unnamed = PortalName::unnamed();
        tracker.bind(&unnamed);
        tracker.advance(&unnamed, Bound);
        tracker.advance(&unnamed, Exhausted);

        tracker.bind(&unnamed);
        assert_eq!(tracker.state(&unnamed), Some(Unbound));
    }

    #[test]
    fn transaction_end_closes_all() {
        let mut tracker = PortalTracker::default();
        let name = PortalName::from("c2");
        tracker.bind(&name);
        tracker.advance(&name, Bound);

        tracker.end_transaction();
        assert_eq!(tracker.state(&name), Some(Closed));

        tracker.end_transaction();
        assert_eq!(tracker.state(&name), None);
    }
}
