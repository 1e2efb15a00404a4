//! # Ledger Events
//!
//! Every state change the kernel makes is recorded as a [`LedgerEvent`]. The
//! log is append-only, so it is kept out of the engine's rollback snapshot:
//! an operation that rolls back truncates the log to where it started, and a
//! consumer never sees an event for something that did not happen.
//!
//! Records are numbered from 0 without gaps. Only the most recent
//! `event_retention` records stay in memory; older ones are pruned once the
//! operation that pushed past the cap commits. The node polls
//! [`EventLog::since`] after each request and pushes new records to
//! WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Address, ResourceId};

/// A single state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // Registry
    ModuleApproved {
        module: Address,
    },
    ModuleRevoked {
        module: Address,
    },
    FactoryApproved {
        factory: Address,
    },
    FactoryRevoked {
        factory: Address,
    },
    ResourceAdded {
        id: ResourceId,
        endpoint: Address,
    },
    ResourceRemoved {
        id: ResourceId,
    },
    BasketDisabled {
        basket: Address,
    },

    // Directory
    IntegrationBound {
        module: Address,
        name: String,
        adapter: String,
    },
    IntegrationUnbound {
        module: Address,
        name: String,
    },

    // Basket lifecycle
    /// A basket came into existence. `factory` is `None` for direct
    /// deployments that were never registered.
    BasketCreated {
        basket: Address,
        factory: Option<Address>,
        manager: Address,
        name: String,
        symbol: String,
        components: Vec<Address>,
    },
    ModuleAdded {
        basket: Address,
        module: Address,
    },
    ModuleInitialized {
        basket: Address,
        module: Address,
    },
    ModuleRemoved {
        basket: Address,
        module: Address,
    },
    PendingModuleRemoved {
        basket: Address,
        module: Address,
    },
    ManagerChanged {
        basket: Address,
        previous: Address,
        manager: Address,
    },

    // Positions
    DefaultPositionEdited {
        basket: Address,
        component: Address,
        #[serde(with = "crate::math::i128_string")]
        unit: i128,
    },
    ExternalPositionEdited {
        basket: Address,
        component: Address,
        module: Address,
        #[serde(with = "crate::math::i128_string")]
        unit: i128,
    },
    ComponentAdded {
        basket: Address,
        component: Address,
    },
    ComponentRemoved {
        basket: Address,
        component: Address,
    },

    // Supply and custody
    SharesMinted {
        basket: Address,
        holder: Address,
        #[serde(with = "crate::math::u128_string")]
        amount: u128,
    },
    SharesBurned {
        basket: Address,
        holder: Address,
        #[serde(with = "crate::math::u128_string")]
        amount: u128,
    },
    SharesTransferred {
        basket: Address,
        from: Address,
        to: Address,
        #[serde(with = "crate::math::u128_string")]
        amount: u128,
    },
    /// A module moved tokens out of a basket's custody.
    BasketTransfer {
        basket: Address,
        module: Address,
        asset: Address,
        to: Address,
        #[serde(with = "crate::math::u128_string")]
        amount: u128,
    },
    /// A module had an adapter act on a basket's custody.
    BasketInvoked {
        basket: Address,
        module: Address,
        adapter: String,
    },
}

impl LedgerEvent {
    /// Basket the event concerns, if any.
    pub fn basket(&self) -> Option<&Address> {
        match self {
            LedgerEvent::BasketDisabled { basket }
            | LedgerEvent::BasketCreated { basket, .. }
            | LedgerEvent::ModuleAdded { basket, .. }
            | LedgerEvent::ModuleInitialized { basket, .. }
            | LedgerEvent::ModuleRemoved { basket, .. }
            | LedgerEvent::PendingModuleRemoved { basket, .. }
            | LedgerEvent::ManagerChanged { basket, .. }
            | LedgerEvent::DefaultPositionEdited { basket, .. }
            | LedgerEvent::ExternalPositionEdited { basket, .. }
            | LedgerEvent::ComponentAdded { basket, .. }
            | LedgerEvent::ComponentRemoved { basket, .. }
            | LedgerEvent::SharesMinted { basket, .. }
            | LedgerEvent::SharesBurned { basket, .. }
            | LedgerEvent::SharesTransferred { basket, .. }
            | LedgerEvent::BasketTransfer { basket, .. }
            | LedgerEvent::BasketInvoked { basket, .. } => Some(basket),
            _ => None,
        }
    }
}

/// An event with its position in the log and the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based position in the log.
    pub sequence: u64,
    /// Top-level operation that emitted the event. Events sharing an id were
    /// committed together.
    pub operation: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Append-only event log with a bounded in-memory window.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
    /// Sequence of `records[0]`.
    first: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, operation: Uuid, event: LedgerEvent) -> &EventRecord {
        let sequence = self.next_sequence();
        self.records.push(EventRecord {
            sequence,
            operation,
            timestamp: Utc::now(),
            event,
        });
        &self.records[self.records.len() - 1]
    }

    /// Sequence the next record will get; also the number of records ever
    /// emitted.
    pub fn next_sequence(&self) -> u64 {
        self.first + self.records.len() as u64
    }

    /// Sequence of the oldest record still held.
    pub fn first_retained(&self) -> u64 {
        self.first
    }

    /// Number of records still held in memory.
    pub fn retained(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record with `sequence >= from`.
    pub(crate) fn truncate(&mut self, from: u64) {
        let keep = usize::try_from(from.saturating_sub(self.first)).unwrap_or(usize::MAX);
        self.records.truncate(keep);
    }

    /// Drops the oldest records until at most `retention` remain. A
    /// retention of 0 keeps everything.
    pub(crate) fn prune(&mut self, retention: usize) {
        if retention == 0 || self.records.len() <= retention {
            return;
        }
        let excess = self.records.len() - retention;
        self.records.drain(..excess);
        self.first += excess as u64;
    }

    /// Retained records with `sequence >= from`.
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = usize::try_from(from.saturating_sub(self.first))
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[start..]
    }

    /// The last `limit` records, oldest first.
    pub fn tail(&self, limit: usize) -> &[EventRecord] {
        let start = self.records.len().saturating_sub(limit);
        &self.records[start..]
    }

    /// Every retained record concerning `basket`.
    pub fn for_basket<'a>(&'a self, basket: &'a Address) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| record.event.basket() == Some(basket))
    }
}
