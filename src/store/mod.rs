//! FeedbackStore - ordered, deduplicated log merged from history and the live feed
//!
//! Hydrations are ticketed: only the most recently *initiated* `hydrate()` may apply its
//! result, whatever order the reads complete in. Live entries appended while a hydration
//! is outstanding are re-merged behind the fetched history so none are lost to the swap.

use crate::contract::ContractGateway;
use crate::core::{Entry, Watchers};
use crate::error::Result;
use futures::channel::mpsc;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    /// History replaced the log; carries the resulting length.
    Applied(usize),
    /// A newer hydration was initiated meanwhile; this result was discarded.
    Superseded,
}

#[derive(Default)]
struct Log {
    entries: Rc<Vec<Entry>>,
    keys: HashSet<Entry>,
}

impl Log {
    fn insert(&mut self, entry: Entry) -> bool {
        if self.keys.contains(&entry) {
            return false;
        }
        self.keys.insert(entry.clone());
        Rc::make_mut(&mut self.entries).push(entry);
        true
    }
}

pub struct FeedbackStore {
    gateway: Rc<ContractGateway>,
    log: RefCell<Log>,
    /// Ticket of the latest initiated hydration.
    latest: Cell<u64>,
    hydrating: Cell<bool>,
    /// Sequence number of the next live append.
    live_seq: Cell<u64>,
    /// Live appends seen while a hydration is outstanding.
    live_log: RefCell<Vec<(u64, Entry)>>,
    watchers: Watchers<Rc<Vec<Entry>>>,
}

impl FeedbackStore {
    pub fn new(gateway: Rc<ContractGateway>) -> Self {
        Self {
            gateway,
            log: RefCell::new(Log::default()),
            latest: Cell::new(0),
            hydrating: Cell::new(false),
            live_seq: Cell::new(0),
            live_log: RefCell::new(Vec::new()),
            watchers: Watchers::default(),
        }
    }

    /// Replace the log with the contract's history. On failure the prior log is kept.
    pub async fn hydrate(&self) -> Result<HydrateOutcome> {
        let ticket = self.latest.get() + 1;
        self.latest.set(ticket);
        self.hydrating.set(true);
        let _pending = Pending { store: self, ticket };
        let mark = self.live_seq.get();
        debug!("hydrate #{} started", ticket);

        let result = self.gateway.fetch_all().await;

        if self.latest.get() != ticket {
            match &result {
                Ok(_) => {
                    warn!("hydrate #{} superseded by #{}, discarding", ticket, self.latest.get())
                }
                Err(e) => warn!("hydrate #{} (superseded) failed: {}", ticket, e),
            }
            return result.map(|_| HydrateOutcome::Superseded);
        }
        self.hydrating.set(false);
        let live: Vec<Entry> = self
            .live_log
            .borrow_mut()
            .drain(..)
            .filter(|(seq, _)| *seq >= mark)
            .map(|(_, entry)| entry)
            .collect();

        let history = match result {
            Ok(history) => history,
            Err(e) => {
                warn!("hydrate #{} failed, keeping {} entries: {}", ticket, self.len(), e);
                return Err(e);
            }
        };

        let mut next = Log::default();
        for entry in history.into_iter().chain(live) {
            next.insert(entry);
        }
        let len = next.entries.len();
        *self.log.borrow_mut() = next;
        info!("hydrated {} entries", len);
        self.publish();
        Ok(HydrateOutcome::Applied(len))
    }

    /// Tail insert unless already present. Returns whether the entry was new.
    pub fn append(&self, entry: Entry) -> bool {
        if self.hydrating.get() {
            let seq = self.live_seq.get();
            self.live_log.borrow_mut().push((seq, entry.clone()));
        }
        self.live_seq.set(self.live_seq.get() + 1);

        let inserted = self.log.borrow_mut().insert(entry);
        if inserted {
            self.publish();
        }
        inserted
    }

    /// Snapshot; later appends never show through it.
    pub fn all(&self) -> Rc<Vec<Entry>> {
        self.log.borrow().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.log.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A hydration is outstanding and live appends are being tracked for re-merge.
    pub fn is_hydrating(&self) -> bool {
        self.hydrating.get()
    }

    /// Discard everything and invalidate any in-flight hydration.
    pub fn clear(&self) {
        self.latest.set(self.latest.get() + 1);
        self.hydrating.set(false);
        self.live_log.borrow_mut().clear();
        *self.log.borrow_mut() = Log::default();
        debug!("store cleared");
        self.publish();
    }

    pub fn watch(&self) -> mpsc::UnboundedReceiver<Rc<Vec<Entry>>> {
        self.watchers.watch()
    }

    fn publish(&self) {
        let snapshot = self.all();
        self.watchers.notify(&snapshot);
    }
}

/// Ends the latest hydration's live tracking if its future is dropped before completing.
struct Pending<'a> {
    store: &'a FeedbackStore,
    ticket: u64,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.store.latest.get() == self.ticket && self.store.hydrating.replace(false) {
            debug!("hydrate #{} dropped", self.ticket);
            self.store.live_log.borrow_mut().clear();
        }
    }
}
