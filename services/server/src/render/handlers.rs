//! Per-instance event handler tables.
//!
//! Handler ids are keyed by callback identity so a re-render that builds fresh
//! closures at the same call sites keeps the ids already in the client's DOM,
//! while dispatch always reaches the latest closure. Ids a render drops stay
//! dispatchable until their grace window ends, which covers events already in
//! flight from the previous DOM.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use weft_id::HandlerId;
use weft_protocol::PayloadKind;

use crate::component::markup::EventBinding;
use crate::component::{Callback, CallbackIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandlerKey {
    identity: CallbackIdentity,
    occurrence: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) event_name: String,
    pub(crate) callback: Callback,
    pub(crate) payload: PayloadKind,
    key: HandlerKey,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub(crate) struct HandlerTable {
    entries: HashMap<HandlerId, HandlerEntry>,
    ids: HashMap<HandlerKey, HandlerId>,
}

impl HandlerTable {
    /// A dispatchable handler: present and not past its grace window.
    pub(crate) fn lookup(&self, id: HandlerId, now: Instant) -> Option<&HandlerEntry> {
        self.entries
            .get(&id)
            .filter(|entry| entry.expires_at.map_or(true, |at| at > now))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Starts the table for a new render; bindings not re-bound by the time
    /// [`HandlerTableBuilder::finish`] runs begin retiring.
    pub(crate) fn rebuild(self) -> HandlerTableBuilder {
        HandlerTableBuilder {
            previous: self,
            next: HandlerTable::default(),
            occurrences: HashMap::new(),
        }
    }
}

pub(crate) struct HandlerTableBuilder {
    previous: HandlerTable,
    next: HandlerTable,
    occurrences: HashMap<CallbackIdentity, u32>,
}

impl HandlerTableBuilder {
    pub(crate) fn bind(&mut self, binding: &EventBinding) -> HandlerId {
        let identity = binding.callback.identity().clone();
        let counter = self.occurrences.entry(identity.clone()).or_insert(0);
        let key = HandlerKey {
            identity,
            occurrence: *counter,
        };
        *counter += 1;

        let id = match self.previous.ids.remove(&key) {
            Some(id) => {
                self.previous.entries.remove(&id);
                id
            }
            None => HandlerId::new(),
        };
        self.next.ids.insert(key.clone(), id);
        self.next.entries.insert(
            id,
            HandlerEntry {
                event_name: binding.event_name.clone(),
                callback: binding.callback.clone(),
                payload: PayloadKind::for_event_name(&binding.event_name),
                key,
                expires_at: None,
            },
        );
        id
    }

    /// Stamps an expiry on dropped handlers and prunes the expired ones.
    pub(crate) fn finish(self, now: Instant, grace: Duration) -> HandlerTable {
        let mut next = self.next;
        for (id, mut entry) in self.previous.entries {
            let expires_at = *entry.expires_at.get_or_insert(now + grace);
            if expires_at > now {
                next.ids.insert(entry.key.clone(), id);
                next.entries.insert(id, entry);
            }
        }
        next
    }
}
