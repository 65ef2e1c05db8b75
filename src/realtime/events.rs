//! What drives the watch loop: timer ticks and cancellation.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Why the watch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Interrupt or termination requested by the operator.
    Signal,
    /// The tick source ended on its own, e.g. after the configured cycle count.
    TickerClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Tick,
    Stop(StopCause),
}

/// A source of watch events.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event. Once a `Stop` has been returned, every
    /// later call returns a `Stop` too.
    async fn next_event(&mut self) -> WatchEvent;

    /// Token that fires when the operator asks to stop, used to abandon
    /// in-flight work between ticks.
    fn cancellation(&self) -> CancellationToken;
}

/// Wall-clock ticks on a fixed period, optionally bounded in count.
pub struct IntervalEvents {
    interval: Interval,
    cancel: CancellationToken,
    remaining: Option<usize>,
}

impl IntervalEvents {
    /// The first tick fires immediately.
    pub fn new(period: Duration, cancel: CancellationToken, max_ticks: Option<usize>) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            cancel,
            remaining: max_ticks,
        }
    }
}

#[async_trait]
impl EventSource for IntervalEvents {
    async fn next_event(&mut self) -> WatchEvent {
        if self.cancel.is_cancelled() {
            return WatchEvent::Stop(StopCause::Signal);
        }
        if self.remaining == Some(0) {
            return WatchEvent::Stop(StopCause::TickerClosed);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => WatchEvent::Stop(StopCause::Signal),
            _ = self.interval.tick() => {
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                }
                WatchEvent::Tick
            }
        }
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Replays a fixed list of events, then reports the ticker closed.
#[doc(hidden)]
pub struct ScriptedEvents {
    events: VecDeque<WatchEvent>,
    cancel: CancellationToken,
}

impl ScriptedEvents {
    pub fn new(events: impl IntoIterator<Item = WatchEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            cancel: CancellationToken::new(),
        }
    }

    /// `n` ticks and nothing else.
    pub fn ticks(n: usize) -> Self {
        Self::new(std::iter::repeat_n(WatchEvent::Tick, n))
    }
}

#[async_trait]
impl EventSource for ScriptedEvents {
    async fn next_event(&mut self) -> WatchEvent {
        match self.events.pop_front() {
            Some(WatchEvent::Stop(cause)) => {
                if cause == StopCause::Signal {
                    self.cancel.cancel();
                }
                self.events.clear();
                WatchEvent::Stop(cause)
            }
            Some(event) => event,
            None => WatchEvent::Stop(StopCause::TickerClosed),
        }
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
