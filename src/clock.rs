use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// One countdown tick, tagged with the run it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub epoch: u64,
}

/// Countdown driver for a session.
pub trait Clock: Send {
    /// Deliver `ticks` ticks tagged with `epoch`, one per period. Replaces any
    /// run in progress.
    fn start(&mut self, epoch: u64, ticks: u32);
    /// Cancel the current run. Takes effect immediately.
    fn stop(&mut self);
}

/// Ticks from a background thread into an event channel.
pub struct ThreadClock<E> {
    tx: Sender<E>,
    period: Duration,
    cancel: Option<Sender<()>>,
}

impl<E> ThreadClock<E>
where
    E: From<ClockTick> + Send + 'static,
{
    pub fn new(tx: Sender<E>) -> Self {
        Self::with_period(tx, TICK_PERIOD)
    }

    pub fn with_period(tx: Sender<E>, period: Duration) -> Self {
        Self {
            tx,
            period,
            cancel: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

impl<E> Clock for ThreadClock<E>
where
    E: From<ClockTick> + Send + 'static,
{
    fn start(&mut self, epoch: u64, ticks: u32) {
        self.stop();

        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let tx = self.tx.clone();
        let period = self.period;

        thread::spawn(move || {
            for _ in 0..ticks {
                match cancel_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if tx.send(E::from(ClockTick { epoch })).is_err() {
                            break;
                        }
                    }
                    // explicit cancel or the clock was dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        self.cancel = Some(cancel_tx);
    }

    fn stop(&mut self) {
        // dropping the sender wakes the thread with Disconnected
        self.cancel.take();
    }
}

impl<E> Drop for ThreadClock<E> {
    fn drop(&mut self) {
        self.cancel.take();
    }
}

#[derive(Debug, Default)]
struct ManualState {
    epoch: Option<u64>,
    starts: usize,
}

/// Clock that never ticks on its own; the caller drives `Session::tick`.
/// Clones share state, so a test can keep one to observe start/stop.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.epoch().is_some()
    }

    /// Epoch of the run in progress.
    pub fn epoch(&self) -> Option<u64> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .epoch
    }

    pub fn starts(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .starts
    }
}

impl Clock for ManualClock {
    fn start(&mut self, epoch: u64, _ticks: u32) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.epoch = Some(epoch);
        state.starts += 1;
    }

    fn stop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .epoch = None;
    }
}
