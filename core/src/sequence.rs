//! Stale-result detection for superseded requests.
//!
//! Each logical slot (for example the review list currently on screen) has a
//! generation counter. A caller takes a `Ticket` when it issues a request and
//! asks whether that ticket is still the latest once the result arrives. No
//! network call is cancelled; late results are only marked stale.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    slot: String,
    generation: u64,
}

impl Ticket {
    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of a sequenced request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sequenced<T> {
    Current(T),
    Stale,
}

impl<T> Sequenced<T> {
    pub fn current(self) -> Option<T> {
        match self {
            Sequenced::Current(value) => Some(value),
            Sequenced::Stale => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Sequenced::Stale)
    }
}

/// Per-slot generation counters. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    latest: Arc<Mutex<HashMap<String, u64>>>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation for `slot`, superseding every earlier ticket.
    pub fn issue(&self, slot: &str) -> Ticket {
        let mut latest = self.lock();
        let generation = latest.entry(slot.to_string()).or_insert(0);
        *generation += 1;
        Ticket {
            slot: slot.to_string(),
            generation: *generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.lock().get(&ticket.slot) == Some(&ticket.generation)
    }

    pub fn settle<T>(&self, ticket: &Ticket, value: T) -> Sequenced<T> {
        if self.is_current(ticket) {
            Sequenced::Current(value)
        } else {
            debug!(
                slot = %ticket.slot,
                generation = ticket.generation,
                "discarding superseded result"
            );
            Sequenced::Stale
        }
    }

    /// Issue a ticket for `slot`, await `fut`, and settle its output.
    pub async fn track<T, Fut>(&self, slot: &str, fut: Fut) -> Sequenced<T>
    where
        Fut: Future<Output = T>,
    {
        let ticket = self.issue(slot);
        let value = fut.await;
        self.settle(&ticket, value)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn newer_ticket_supersedes_older() {
        let seq = Sequencer::new();
        let first = seq.issue("reviews");
        let second = seq.issue("reviews");
        assert!(second.generation() > first.generation());
        assert!(!seq.is_current(&first));
        assert!(seq.is_current(&second));
        assert_eq!(seq.settle(&first, 1), Sequenced::Stale);
        assert_eq!(seq.settle(&second, 2), Sequenced::Current(2));
    }

    #[test]
    fn slots_are_independent() {
        let seq = Sequencer::new();
        let reviews = seq.issue("reviews");
        let _ = seq.issue("favorites");
        assert!(seq.is_current(&reviews));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_earlier_page_load_is_discarded() {
        let seq = Sequencer::new();
        let slow = seq.track("reviews", async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "page 1"
        });
        let fast = seq.track("reviews", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "page 2"
        });
        // `track` issues on first poll; the join below polls `slow` first.
        let (slow, fast) = tokio::join!(slow, fast);
        assert!(slow.is_stale());
        assert_eq!(fast.current(), Some("page 2"));
    }
}
