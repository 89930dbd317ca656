//! Event → mapping reconciliation
//!
//! The [`Reconciler`] owns the published mapping and decides, for every
//! event, whether the hosts file must be rewritten. It does no I/O; the
//! engine performs the sink call for [`Outcome::Changed`].

use crate::hosts::HostsMapping;
use crate::node::{AddressPolicy, HostRecord, NodeDescriptor};
use crate::traits::WatchEvent;

/// What processing one event produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The event carried no node change (resync notification or the sync
    /// marker); nothing was computed
    Discarded,

    /// The candidate mapping equals the published one
    Unchanged { record: HostRecord },

    /// The published mapping was replaced; `rendered` must be handed to
    /// the sink
    Changed { record: HostRecord, rendered: String },
}

/// Whether an update is a resync notification rather than a change
///
/// Version markers are trusted at face value: when both are present and
/// equal the update is dropped. A missing marker on either side disables
/// the shortcut and the mapping comparison absorbs the duplicate instead.
pub fn is_resync(old: &NodeDescriptor, new: &NodeDescriptor) -> bool {
    matches!(
        (&old.resource_version, &new.resource_version),
        (Some(old_rv), Some(new_rv)) if old_rv == new_rv
    )
}

/// Owner of the published hosts mapping
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    published: HostsMapping,
    policy: AddressPolicy,
}

impl Reconciler {
    /// Create a reconciler with an empty published mapping
    pub fn new(policy: AddressPolicy) -> Self {
        Self::with_published(HostsMapping::new(), policy)
    }

    /// Create a reconciler that starts from `published`
    pub fn with_published(published: HostsMapping, policy: AddressPolicy) -> Self {
        Self { published, policy }
    }

    /// The last published mapping
    pub fn published(&self) -> &HostsMapping {
        &self.published
    }

    /// Process one event
    pub fn reconcile(&mut self, event: &WatchEvent) -> Outcome {
        match self.record_for(event) {
            Some(record) => self.apply(record),
            None => Outcome::Discarded,
        }
    }

    /// Reduce an event to the host record it implies
    fn record_for(&self, event: &WatchEvent) -> Option<HostRecord> {
        match event {
            WatchEvent::Added(node) => Some(self.extract(node)),
            WatchEvent::Updated { old, new } => {
                if is_resync(old, new) {
                    return None;
                }
                Some(self.extract(new))
            }
            WatchEvent::Removed(removal) => Some(HostRecord::removal(removal.hostname())),
            WatchEvent::Synced => None,
        }
    }

    fn extract(&self, node: &NodeDescriptor) -> HostRecord {
        HostRecord::from_node_with_policy(node, &self.policy)
    }

    /// Build the candidate from a full copy of the published mapping and
    /// swap it in only if it differs
    fn apply(&mut self, record: HostRecord) -> Outcome {
        let candidate = self.published.with_record(&record);
        if candidate == self.published {
            return Outcome::Unchanged { record };
        }

        self.published = candidate;
        Outcome::Changed {
            rendered: self.published.render(),
            record,
        }
    }
}
