//! # Consumer-facing event streams.
//!
//! An [`EventStream`] is a pull-based view over the bus: it yields events
//! matching its filter from subscription time onward, and in replay mode it
//! first drains a history snapshot before switching to live events.
//!
//! ## Architecture
//! ```text
//!                     history snapshot
//!                    ┌───────────────┐
//!   replay(id)  ───▶ │ e1 e2 ... eN  │──┐        EventStream::next()
//!                    └───────────────┘  ├──────▶ Event | Dropped(n) | end
//!                    ┌───────────────┐  │
//!   Bus::subscribe ─▶│ live receiver │──┘  (live events with seq <= eN.seq
//!                    └───────────────┘       are skipped, so the seam never
//!                                            duplicates)
//! ```
//!
//! ## Rules
//! - A dropped-events gap is surfaced as [`StreamItem::Dropped`], never
//!   swallowed.
//! - Replayed history cannot contain gaps; only the live side can lag.

use std::collections::VecDeque;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::event::Event;
use super::filter::EventFilter;

/// One item pulled from an [`EventStream`].
#[derive(Clone, Debug)]
pub enum StreamItem {
    /// A transition event matching the stream's filter.
    Event(Event),
    /// The stream fell behind and at least this many events were discarded.
    ///
    /// Consumers that need the lost transitions can re-read the instance
    /// history, which is always complete.
    Dropped(u64),
}

/// Filtered, pull-based stream of transition events.
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
    filter: EventFilter,
    replay: VecDeque<Event>,
    /// Highest seq present in the replay snapshot; live events at or below
    /// it are duplicates of replayed history and are skipped.
    seen: Option<u64>,
}

impl EventStream {
    /// Live-only stream: events from subscription time onward.
    pub(crate) fn new(rx: broadcast::Receiver<Event>, filter: EventFilter) -> Self {
        Self {
            rx,
            filter,
            replay: VecDeque::new(),
            seen: None,
        }
    }

    /// Replay mode: drains `history` first, then continues live.
    ///
    /// The receiver must have been subscribed *before* the history snapshot
    /// was taken; the seam is then deduplicated by sequence number.
    pub(crate) fn with_history(
        rx: broadcast::Receiver<Event>,
        filter: EventFilter,
        history: Vec<Event>,
    ) -> Self {
        let seen = history.iter().map(|e| e.seq).max();
        let replay = history.into_iter().filter(|e| filter.matches(e)).collect();
        Self {
            rx,
            filter,
            replay,
            seen,
        }
    }

    /// Yields the next item, or `None` once the runtime shut down and all
    /// buffered events were delivered.
    pub async fn next(&mut self) -> Option<StreamItem> {
        if let Some(ev) = self.replay.pop_front() {
            return Some(StreamItem::Event(ev));
        }
        loop {
            match self.rx.recv().await {
                Ok(ev) => {
                    if let Some(seen) = self.seen {
                        if ev.seq <= seen {
                            continue;
                        }
                    }
                    if self.filter.matches(&ev) {
                        return Some(StreamItem::Event(ev));
                    }
                }
                Err(RecvError::Lagged(n)) => return Some(StreamItem::Dropped(n)),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Bus;
    use crate::instance::{InstanceId, Phase};
    use crate::jobs::JobId;

    fn ev(job: &str, to: Phase) -> Event {
        Event::new(
            InstanceId::new(),
            JobId::new(job).unwrap(),
            Phase::Pending,
            to,
            1,
            None,
        )
    }

    #[tokio::test]
    async fn live_events_flow_through_in_order() {
        let bus = Bus::new(16);
        let mut stream = EventStream::new(bus.subscribe(), EventFilter::all());
        let a = ev("a", Phase::Running);
        let b = ev("a", Phase::Completed);
        bus.publish(a.clone());
        bus.publish(b.clone());

        match stream.next().await {
            Some(StreamItem::Event(got)) => assert_eq!(got.seq, a.seq),
            other => panic!("expected first event, got {other:?}"),
        }
        match stream.next().await {
            Some(StreamItem::Event(got)) => assert_eq!(got.seq, b.seq),
            other => panic!("expected second event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn filter_skips_non_matching_events() {
        let bus = Bus::new(16);
        let filter = EventFilter::for_job(JobId::new("wanted").unwrap());
        let mut stream = EventStream::new(bus.subscribe(), filter);
        bus.publish(ev("noise", Phase::Running));
        let wanted = ev("wanted", Phase::Running);
        bus.publish(wanted.clone());

        match stream.next().await {
            Some(StreamItem::Event(got)) => assert_eq!(got.job.as_str(), "wanted"),
            other => panic!("expected the matching event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overflow_surfaces_as_dropped_marker() {
        let bus = Bus::new(2);
        let mut stream = EventStream::new(bus.subscribe(), EventFilter::all());
        for _ in 0..5 {
            bus.publish(ev("burst", Phase::Running));
        }

        match stream.next().await {
            Some(StreamItem::Dropped(n)) => assert_eq!(n, 3, "ring of 2 keeps the newest 2 of 5"),
            other => panic!("expected a dropped marker, got {other:?}"),
        }
        assert!(matches!(stream.next().await, Some(StreamItem::Event(_))));
        assert!(matches!(stream.next().await, Some(StreamItem::Event(_))));
    }

    #[tokio::test]
    async fn replay_then_live_never_duplicates_the_seam() {
        let bus = Bus::new(16);
        let rx = bus.subscribe();

        let past = ev("job", Phase::Running);
        let seam = ev("job", Phase::Restarting);
        let history = vec![past.clone(), seam.clone()];

        // The seam event is also in flight on the live channel.
        bus.publish(seam.clone());
        let fresh = ev("job", Phase::Pending);
        bus.publish(fresh.clone());

        let mut stream = EventStream::with_history(rx, EventFilter::all(), history);
        let mut seqs = Vec::new();
        for _ in 0..3 {
            match stream.next().await {
                Some(StreamItem::Event(got)) => seqs.push(got.seq),
                other => panic!("expected an event, got {other:?}"),
            }
        }
        assert_eq!(
            seqs,
            vec![past.seq, seam.seq, fresh.seq],
            "seam event must appear exactly once"
        );
    }

    #[tokio::test]
    async fn closed_bus_ends_the_stream_after_replay() {
        let bus = Bus::new(4);
        let rx = bus.subscribe();
        let only = ev("job", Phase::Completed);
        let mut stream = EventStream::with_history(rx, EventFilter::all(), vec![only.clone()]);
        drop(bus);

        match stream.next().await {
            Some(StreamItem::Event(got)) => assert_eq!(got.seq, only.seq),
            other => panic!("expected replayed event, got {other:?}"),
        }
        assert!(stream.next().await.is_none(), "stream must end once the bus is gone");
    }
}
