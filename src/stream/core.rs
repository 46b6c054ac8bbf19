//! Stream lifecycle bookkeeping.
//!
//! Pure state, no I/O: the drivers own channels and tasks, this module
//! owns the legality of transitions. `Ended` and `Errored` are sticky,
//! a terminal event can be emitted at most once, and a released stream
//! emits nothing further even if a production request is still settling.

use tracing::debug;

/// Externally observable stream state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, no consumer demand yet.
    Idle,
    /// Producing and delivering.
    Flowing,
    /// Delivery suspended; an in-flight request keeps running.
    Paused,
    /// Terminal: source exhausted or stream released.
    Ended,
    /// Terminal: source failed.
    Errored,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Ended | Lifecycle::Errored)
    }
}

#[derive(Debug)]
pub(crate) struct StateMachine {
    state: Lifecycle,
    request_in_flight: bool,
    terminal_emitted: bool,
    released: bool,
}

impl StateMachine {
    pub(crate) fn new() -> StateMachine {
        StateMachine {
            state: Lifecycle::Idle,
            request_in_flight: false,
            terminal_emitted: false,
            released: false,
        }
    }

    pub(crate) fn state(&self) -> Lifecycle {
        self.state
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Idle/Paused → Flowing. Terminal states stay put.
    pub(crate) fn resume(&mut self) {
        if matches!(self.state, Lifecycle::Idle | Lifecycle::Paused) {
            debug!(from = ?self.state, "stream flowing");
            self.state = Lifecycle::Flowing;
        }
    }

    /// Flowing → Paused. An in-flight request is not cancelled; its result
    /// is held by the driver until the next `resume`.
    pub(crate) fn pause(&mut self) {
        if self.state == Lifecycle::Flowing {
            debug!("stream paused");
            self.state = Lifecycle::Paused;
        }
    }

    /// Whether the driver may issue a production request now.
    pub(crate) fn can_request(&self) -> bool {
        self.state == Lifecycle::Flowing && !self.request_in_flight
    }

    pub(crate) fn begin_request(&mut self) {
        debug_assert!(self.can_request(), "double-issued production request");
        self.request_in_flight = true;
    }

    pub(crate) fn complete_request(&mut self) {
        self.request_in_flight = false;
    }

    /// Move to a terminal state. Returns whether the terminal event should
    /// be emitted — false if one was already emitted or the stream was
    /// released.
    pub(crate) fn finish(&mut self, errored: bool) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = if errored {
            Lifecycle::Errored
        } else {
            Lifecycle::Ended
        };
        debug!(state = ?self.state, "stream terminal");
        if self.terminal_emitted || self.released {
            return false;
        }
        self.terminal_emitted = true;
        true
    }

    /// Tear down from any state. Returns whether collaborator resources
    /// should be closed (first call only). Suppresses any further events.
    pub(crate) fn release(&mut self) -> bool {
        let first = !self.released;
        self.released = true;
        if !self.state.is_terminal() {
            self.state = Lifecycle::Ended;
        }
        if first {
            debug!("stream released");
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_flow_to_end() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state(), Lifecycle::Idle);
        sm.resume();
        assert_eq!(sm.state(), Lifecycle::Flowing);
        assert!(sm.can_request());
        sm.begin_request();
        assert!(!sm.can_request());
        sm.complete_request();
        assert!(sm.finish(false));
        assert_eq!(sm.state(), Lifecycle::Ended);
        // Terminal event at most once.
        assert!(!sm.finish(false));
        assert!(!sm.finish(true));
    }

    #[test]
    fn pause_suspends_requests_but_not_completion() {
        let mut sm = StateMachine::new();
        sm.resume();
        sm.begin_request();
        sm.pause();
        assert_eq!(sm.state(), Lifecycle::Paused);
        // The in-flight request may still settle while paused.
        sm.complete_request();
        assert!(!sm.can_request());
        sm.resume();
        assert!(sm.can_request());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut sm = StateMachine::new();
        sm.resume();
        assert!(sm.finish(true));
        assert_eq!(sm.state(), Lifecycle::Errored);
        sm.resume();
        assert_eq!(sm.state(), Lifecycle::Errored);
        sm.pause();
        assert_eq!(sm.state(), Lifecycle::Errored);
    }

    #[test]
    fn release_closes_once_and_suppresses_events() {
        let mut sm = StateMachine::new();
        sm.resume();
        assert!(sm.release());
        assert!(!sm.release());
        assert_eq!(sm.state(), Lifecycle::Ended);
        // A late source result must not surface after release.
        assert!(!sm.finish(true));
    }

    #[test]
    fn release_from_idle_is_legal() {
        let mut sm = StateMachine::new();
        assert!(sm.release());
        assert!(sm.is_terminal());
    }
}
