//! Kademlia routing table: 256 XOR-distance buckets over known peers.
//!
//! Entries reference peers by contact only; liveness metadata lives in the
//! peer store. Each bucket holds at most `k` contacts in least-recently-seen
//! order and sits behind its own lock, so sightings in distinct buckets never
//! serialize on each other. When a full bucket sees a new candidate, the
//! incumbent oldest contact is pinged first and only evicted if the ping
//! fails.

use tokio::sync::Mutex;

use crate::identity::{bucket_index, cmp_by_distance, Contact, PeerId};

/// A single routing bucket, oldest contact first.
#[derive(Debug, Default)]
struct Bucket {
    contacts: Vec<Contact>,
}

/// Outcome of touching a bucket with a contact sighting.
#[derive(Debug)]
enum TouchOutcome {
    /// Contact was newly inserted.
    Inserted,
    /// Existing contact moved to the most-recently-seen end.
    Refreshed,
    /// Bucket is full; the oldest contact must be probed before eviction.
    Full { candidate: Contact, oldest: Contact },
}

/// A deferred bucket update awaiting a liveness probe of the incumbent.
#[derive(Clone, Debug)]
pub struct PendingEviction {
    bucket: usize,
    /// The least-recently-seen incumbent to probe.
    pub oldest: Contact,
    /// The new candidate that wants the slot.
    pub candidate: Contact,
}

impl Bucket {
    fn touch(&mut self, contact: Contact, k: usize) -> TouchOutcome {
        if let Some(pos) = self.contacts.iter().position(|c| c.id == contact.id) {
            let mut existing = self.contacts.remove(pos);
            // A sighting may carry a newer address.
            if !contact.addr.is_empty() {
                existing.addr = contact.addr;
            }
            self.contacts.push(existing);
            return TouchOutcome::Refreshed;
        }

        if self.contacts.len() < k {
            self.contacts.push(contact);
            TouchOutcome::Inserted
        } else {
            let oldest = self.contacts[0].clone();
            TouchOutcome::Full {
                candidate: contact,
                oldest,
            }
        }
    }

    fn refresh(&mut self, id: &PeerId) -> bool {
        if let Some(pos) = self.contacts.iter().position(|c| &c.id == id) {
            let existing = self.contacts.remove(pos);
            self.contacts.push(existing);
            true
        } else {
            false
        }
    }

    fn remove(&mut self, id: &PeerId) -> bool {
        if let Some(pos) = self.contacts.iter().position(|c| &c.id == id) {
            self.contacts.remove(pos);
            true
        } else {
            false
        }
    }
}

/// Routing table over 256 independently locked buckets for 256-bit peer ids.
///
/// Mutation only ever locks the one bucket a peer id maps to; reads such as
/// [`closest`](Self::closest) lock buckets one at a time while collecting.
#[derive(Debug)]
pub struct RoutingTable {
    self_id: PeerId,
    k: usize,
    buckets: Vec<Mutex<Bucket>>,
}

impl RoutingTable {
    /// Create a routing table for the given local id and bucket size.
    pub fn new(self_id: PeerId, k: usize) -> Self {
        Self {
            self_id,
            k,
            buckets: (0..256).map(|_| Mutex::new(Bucket::default())).collect(),
        }
    }

    /// Record a contact sighting.
    ///
    /// Returns a [`PendingEviction`] when the target bucket is full, so the
    /// caller can ping the incumbent and settle the slot with
    /// [`apply_probe_result`](Self::apply_probe_result).
    pub async fn update(&self, contact: Contact) -> Option<PendingEviction> {
        if contact.id == self.self_id {
            return None;
        }
        let idx = bucket_index(&self.self_id, &contact.id);
        let mut bucket = self.buckets[idx].lock().await;
        match bucket.touch(contact, self.k) {
            TouchOutcome::Inserted | TouchOutcome::Refreshed => None,
            TouchOutcome::Full { candidate, oldest } => Some(PendingEviction {
                bucket: idx,
                oldest,
                candidate,
            }),
        }
    }

    /// Drop a contact, e.g. after repeated unreachability.
    pub async fn remove(&self, id: &PeerId) {
        let idx = bucket_index(&self.self_id, id);
        let _ = self.buckets[idx].lock().await.remove(id);
    }

    /// Settle a deferred eviction after probing the incumbent.
    ///
    /// A live incumbent keeps its slot (refreshed); a dead one is replaced by
    /// the candidate.
    pub async fn apply_probe_result(&self, pending: PendingEviction, oldest_alive: bool) {
        let mut bucket = self.buckets[pending.bucket].lock().await;
        if oldest_alive {
            bucket.refresh(&pending.oldest.id);
            return;
        }

        let _ = bucket.remove(&pending.oldest.id);
        let already_present = bucket
            .contacts
            .iter()
            .any(|contact| contact.id == pending.candidate.id);
        if !already_present && bucket.contacts.len() < self.k {
            bucket.contacts.push(pending.candidate);
        }
    }

    /// The `count` known contacts closest to a target id.
    ///
    /// Ordering is deterministic: XOR distance first, raw id bytes on ties.
    pub async fn closest(&self, target: &[u8; 32], count: usize) -> Vec<Contact> {
        let mut all = Vec::new();
        for bucket in &self.buckets {
            let bucket = bucket.lock().await;
            all.extend(bucket.contacts.iter().cloned());
        }

        all.sort_by(|a, b| cmp_by_distance(&a.id, &b.id, target));
        all.truncate(count);
        all
    }

    /// Whether a contact is currently present.
    pub async fn contains(&self, id: &PeerId) -> bool {
        let idx = bucket_index(&self.self_id, id);
        self.buckets[idx]
            .lock()
            .await
            .contacts
            .iter()
            .any(|c| &c.id == id)
    }

    /// Total number of contacts across all buckets.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for bucket in &self.buckets {
            total += bucket.lock().await.contacts.len();
        }
        total
    }

    /// True when the table holds no contacts.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
