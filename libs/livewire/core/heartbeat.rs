//! Periodic background tickers
//!
//! Heartbeat probes, latency sampling, batch flushing, metrics sampling and
//! throttle cleanup all run on their own independent interval:
//!
//! ```text
//! ┌─────────────────────┐
//! │  Ticker Task        │
//! │  (Tokio spawn)      │
//! │                     │
//! │  Every X interval:  │
//! │  1. Check shutdown  │<── bounded(1) shutdown channel
//! │  2. Wait for tick   │
//! │  3. Run body ───────┼──> awaited inline, so a tick never overlaps the previous one
//! └─────────────────────┘
//! ```
//!
//! Missed ticks are skipped rather than replayed in a burst.

use crossbeam_channel::{Receiver, Sender};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Returned by a tick body to keep or stop the ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Running ticker; stopping or dropping it ends the task
pub struct Ticker {
    name: &'static str,
    handle: JoinHandle<()>,
    shutdown_tx: Sender<()>,
}

impl Ticker {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal shutdown and cancel any pending wait
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        self.handle.abort();
    }
}

async fn ticker_task<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut body: F,
    shutdown_rx: Receiver<()>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = TickFlow>,
{
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick - wait for the first interval
    ticker.tick().await;
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("{} ticker started with interval: {:?}", name, interval);

    loop {
        match shutdown_rx.try_recv() {
            Ok(_) => {
                debug!("{} ticker received shutdown signal", name);
                break;
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                debug!("{} ticker shutdown channel disconnected", name);
                break;
            }
            Err(crossbeam_channel::TryRecvError::Empty) => {}
        }

        ticker.tick().await;

        if body().await == TickFlow::Stop {
            debug!("{} ticker body requested stop", name);
            break;
        }
    }

    debug!("{} ticker exiting", name);
}

/// Spawn a ticker on the current Tokio runtime
///
/// Returns `None` when called outside a runtime; periodic work is then
/// simply not scheduled.
pub fn spawn_ticker<F, Fut>(name: &'static str, interval: Duration, body: F) -> Option<Ticker>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = TickFlow> + Send + 'static,
{
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!("No Tokio runtime available, {} ticker not started", name);
            return None;
        }
    };

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let handle = runtime.spawn(ticker_task(name, interval, body, shutdown_rx));

    Some(Ticker {
        name,
        handle,
        shutdown_tx,
    })
}

/// Run `f` once after `delay` on the current runtime
pub fn spawn_delayed<F, Fut>(name: &'static str, delay: Duration, f: F) -> Option<JoinHandle<()>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            f().await;
        })),
        Err(_) => {
            warn!("No Tokio runtime available, {} timer not scheduled", name);
            None
        }
    }
}
