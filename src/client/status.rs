// ABOUTME: Client status machine
// ABOUTME: Small finite-state automaton rejecting nonsensical UI transitions

use std::fmt;

/// Display status of the playback client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Nothing loaded yet
    #[default]
    Idle,
    /// A track artifact is being fetched and decoded
    Loading,
    /// Loaded and waiting for a play broadcast
    Ready,
    /// Playing
    Playing,
    /// Paused
    Paused,
}

impl Status {
    /// Human-readable label passed to the display observer
    pub fn label(&self) -> &'static str {
        match self {
            Status::Idle => "Waiting for audio",
            Status::Loading => "Loading audio…",
            Status::Ready => "Ready",
            Status::Playing => "Playing",
            Status::Paused => "Paused",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events that drive the status machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// A new track started loading
    Load,
    /// Loading finished
    AutoReady,
    /// A play broadcast was applied
    Play,
    /// A pause broadcast was applied
    Pause,
    /// Loading failed
    Error,
}

/// Observer notified on every accepted transition
pub type StatusObserver = Box<dyn Fn(Status, &'static str) + Send>;

/// The status machine; refuses unknown transitions and logs them
#[derive(Default)]
pub struct StatusMachine {
    state: Status,
    observer: Option<StatusObserver>,
}

impl StatusMachine {
    /// Create a new machine in the idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the single display observer
    pub fn set_observer(&mut self, observer: StatusObserver) {
        self.observer = Some(observer);
    }

    /// Current state
    pub fn state(&self) -> Status {
        self.state
    }

    /// Apply an event. Returns false (and logs) for a refused transition.
    pub fn apply(&mut self, event: StatusEvent) -> bool {
        let next = match (self.state, event) {
            // A new load is accepted from any state.
            (_, StatusEvent::Load) => Some(Status::Loading),
            (Status::Loading, StatusEvent::AutoReady) => Some(Status::Ready),
            (Status::Loading, StatusEvent::Error) => Some(Status::Idle),
            (Status::Ready, StatusEvent::Play) => Some(Status::Playing),
            (Status::Playing, StatusEvent::Pause) => Some(Status::Paused),
            (Status::Paused, StatusEvent::Play) => Some(Status::Playing),
            _ => None,
        };

        match next {
            Some(state) => {
                self.state = state;
                if let Some(observer) = &self.observer {
                    observer(state, state.label());
                }
                true
            }
            None => {
                log::warn!(
                    "Refusing status transition {:?} from {:?}",
                    event,
                    self.state
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_happy_path() {
        let mut machine = StatusMachine::new();
        assert_eq!(machine.state(), Status::Idle);

        assert!(machine.apply(StatusEvent::Load));
        assert!(machine.apply(StatusEvent::AutoReady));
        assert!(machine.apply(StatusEvent::Play));
        assert!(machine.apply(StatusEvent::Pause));
        assert!(machine.apply(StatusEvent::Play));
        assert_eq!(machine.state(), Status::Playing);
    }

    #[test]
    fn test_play_before_ready_is_refused() {
        let mut machine = StatusMachine::new();
        assert!(!machine.apply(StatusEvent::Play));
        assert_eq!(machine.state(), Status::Idle);

        machine.apply(StatusEvent::Load);
        assert!(!machine.apply(StatusEvent::Play));
        assert_eq!(machine.state(), Status::Loading);
    }

    #[test]
    fn test_error_resets_only_from_loading() {
        let mut machine = StatusMachine::new();
        machine.apply(StatusEvent::Load);
        assert!(machine.apply(StatusEvent::Error));
        assert_eq!(machine.state(), Status::Idle);

        machine.apply(StatusEvent::Load);
        machine.apply(StatusEvent::AutoReady);
        assert!(!machine.apply(StatusEvent::Error));
        assert_eq!(machine.state(), Status::Ready);
    }

    #[test]
    fn test_load_accepted_mid_playback() {
        let mut machine = StatusMachine::new();
        machine.apply(StatusEvent::Load);
        machine.apply(StatusEvent::AutoReady);
        machine.apply(StatusEvent::Play);

        assert!(machine.apply(StatusEvent::Load));
        assert_eq!(machine.state(), Status::Loading);
    }

    #[test]
    fn test_observer_sees_accepted_transitions_only() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let mut machine = StatusMachine::new();
        machine.set_observer(Box::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        machine.apply(StatusEvent::Play); // refused
        machine.apply(StatusEvent::Load); // accepted
        machine.apply(StatusEvent::Pause); // refused
        machine.apply(StatusEvent::AutoReady); // accepted

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
