// ── Fingerprints and pending long-polls ──
//
// The three version counters and the requests waiting on them live in one
// struct so that "increment, then wake" happens as a single step.

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::trace;

use crate::JsonObject;

/// Current version of each resource axis. All start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprints {
    pub state: u64,
    pub traits: u64,
    pub components: u64,
}

impl Default for Fingerprints {
    fn default() -> Self {
        Self {
            state: 1,
            traits: 1,
            components: 1,
        }
    }
}

impl Fingerprints {
    /// `checkForUpdates` reply body. Commands share the traits counter.
    pub fn to_json(self) -> JsonObject {
        let mut output = JsonObject::new();
        output.insert("stateFingerprint".into(), Value::String(self.state.to_string()));
        output.insert("commandsFingerprint".into(), Value::String(self.traits.to_string()));
        output.insert("traitsFingerprint".into(), Value::String(self.traits.to_string()));
        output.insert(
            "componentsFingerprint".into(),
            Value::String(self.components.to_string()),
        );
        output
    }
}

struct Pending {
    id: u64,
    /// Axes the caller is waiting on; zero means "ignore".
    baseline: Fingerprints,
    reply: oneshot::Sender<Fingerprints>,
}

/// Owner of the fingerprints and the queue of waiting requests.
#[derive(Default)]
pub struct UpdateTracker {
    current: Fingerprints,
    pending: Vec<Pending>,
    next_id: u64,
}

impl UpdateTracker {
    pub fn current(&self) -> Fingerprints {
        self.current
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue a waiter. The receiver resolves with the fingerprints current
    /// when it is woken, expired or released.
    pub fn register(&mut self, baseline: Fingerprints) -> (u64, oneshot::Receiver<Fingerprints>) {
        self.next_id += 1;
        let id = self.next_id;
        let (reply, rx) = oneshot::channel();
        // Requests whose caller went away before any wake or expiry.
        self.pending.retain(|p| !p.reply.is_closed());
        self.pending.push(Pending { id, baseline, reply });
        trace!(id, pending = self.pending.len(), "long-poll registered");
        (id, rx)
    }

    /// State is part of the component tree, so both counters move.
    pub fn bump_state(&mut self) {
        self.current.state += 1;
        self.current.components += 1;
        self.wake(|b| b.state != 0 || b.components != 0);
    }

    pub fn bump_traits(&mut self) {
        self.current.traits += 1;
        self.wake(|b| b.traits != 0);
    }

    pub fn bump_components(&mut self) {
        self.current.components += 1;
        self.wake(|b| b.components != 0);
    }

    /// Reply to one request on timeout. No-op if it already got a reply.
    pub fn expire(&mut self, id: u64) {
        if let Some(index) = self.pending.iter().position(|p| p.id == id) {
            let pending = self.pending.swap_remove(index);
            trace!(id, "long-poll timed out");
            let _ = pending.reply.send(self.current);
        }
    }

    /// Reply to every waiting request.
    pub fn release_all(&mut self) {
        let current = self.current;
        for pending in self.pending.drain(..) {
            let _ = pending.reply.send(current);
        }
    }

    fn wake(&mut self, interested: impl Fn(&Fingerprints) -> bool) {
        let (woken, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| interested(&p.baseline));
        self.pending = waiting;

        if !woken.is_empty() {
            trace!(woken = woken.len(), waiting = self.pending.len(), "waking long-polls");
        }
        for pending in woken {
            let _ = pending.reply.send(self.current);
        }
    }
}
