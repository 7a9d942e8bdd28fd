//! A one-shot, restartable timer driven by the scheduler's own runtime.
//!
//! `start` behaves like a watchdog kick: any previously scheduled fire is
//! cancelled and a new one is armed. Because cancellation goes through
//! `JoinHandle::abort` rather than a single-threaded cooperative scheduler
//! (as the callback this was ported from relies on), a task that has already
//! fired and queued its message before `abort` lands would otherwise be
//! indistinguishable from a live one; `epoch` exists to make that
//! distinguishable (see [`Timer::start`]).

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Identifies one armed period of a [`Timer`]. A [`TimerFired`] event is only
/// acted on by the scheduler if its epoch still matches the timer's current
/// epoch — anything else is a stale fire from a timer that was since
/// stopped or restarted.
pub type Epoch = u64;

pub struct Timer {
    handle: Option<JoinHandle<()>>,
    epoch: Epoch,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            handle: None,
            epoch: 0,
        }
    }

    /// Stops any running timer, then schedules a fired event to be sent on
    /// `fired_tx` after `timeout`. `build` receives the new timer's epoch so
    /// the event can carry it for the scheduler's staleness check; returns
    /// that same epoch to the caller for bookkeeping.
    pub fn start<T, F>(&mut self, timeout: Duration, fired_tx: UnboundedSender<T>, build: F) -> Epoch
    where
        T: Send + 'static,
        F: FnOnce(Epoch) -> T + Send + 'static,
    {
        self.stop();
        self.epoch += 1;
        let epoch = self.epoch;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = fired_tx.send(build(epoch));
        }));
        epoch
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether `epoch` still identifies this timer's current armed period.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.handle.is_some() && epoch == self.epoch
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let mut timer = Timer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epoch = timer.start(Duration::from_millis(50), tx, |_epoch| "fired");

        tokio::time::advance(Duration::from_millis(60)).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received, "fired");
        assert!(timer.is_current(epoch));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_previous_epoch() {
        let mut timer = Timer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first_epoch = timer.start(Duration::from_millis(50), tx.clone(), |_| 1u32);
        let second_epoch = timer.start(Duration::from_millis(50), tx, |_| 2u32);

        assert_ne!(first_epoch, second_epoch);
        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(rx.recv().await.unwrap(), 2);
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_current(first_epoch));
        assert!(timer.is_current(second_epoch));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_fire() {
        let mut timer = Timer::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<u32>();
        timer.start(Duration::from_millis(50), tx, |_| 1);
        timer.stop();

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }
}
