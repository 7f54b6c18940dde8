use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::clock::ClockTick;
use crate::session::{Phase, Session};

/// The two kinds of event a session consumes, serialized through one queue.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The host's full input buffer.
    Input(String),
    /// A single typed character.
    Char(char),
    Tick(ClockTick),
}

impl From<ClockTick> for SessionEvent {
    fn from(tick: ClockTick) -> Self {
        SessionEvent::Tick(tick)
    }
}

/// Source of queued session events
pub trait SessionEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError>;
}

/// Event source backed by an mpsc channel; clock and input producers hold
/// clones of the sender.
pub struct ChannelEventSource {
    rx: Receiver<SessionEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<SessionEvent>) -> Self {
        Self { rx }
    }
}

impl SessionEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Pumps queued events into a session one at a time
pub struct Runner<S: SessionEventSource> {
    source: S,
    poll_interval: Duration,
}

impl<S: SessionEventSource> Runner<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    /// Blocks up to the poll interval; `None` if nothing arrived.
    pub fn step(&self) -> Option<SessionEvent> {
        self.source.recv_timeout(self.poll_interval).ok()
    }

    /// Handle at most one event. Returns whether one was handled.
    pub fn pump(&self, session: &mut Session) -> bool {
        match self.step() {
            Some(event) => {
                session.handle(event);
                true
            }
            None => false,
        }
    }

    /// Pump until the session finishes or `max_polls` polls have passed.
    pub fn run_until_finished(&self, session: &mut Session, max_polls: usize) -> Phase {
        for _ in 0..max_polls {
            if session.phase() == Phase::Finished {
                break;
            }
            self.pump(session);
        }
        session.phase()
    }
}
