//! Cluster resolution and view assembly for identify calls.
//!
//! Everything here is in-memory work over rows already read inside the
//! caller's transaction; the only store access is the root lookup in
//! [`resolve_roots`].

use std::collections::{BTreeMap, BTreeSet};

use contactlink_core::{ContactId, ContactRecord, IdentityView};
use contactlink_storage::{ContactTransaction, StorageError};

/// The contact heading one of the clusters touched by a match set.
#[derive(Debug, Clone)]
pub struct ClusterRoot {
    pub contact: ContactRecord,
    /// Ids that members of this cluster link to but which no longer resolve to
    /// a live primary (deleted or demoted out from under them).
    pub stale_targets: Vec<ContactId>,
}

impl ClusterRoot {
    fn new(contact: ContactRecord) -> Self {
        Self {
            contact,
            stale_targets: Vec::new(),
        }
    }

    pub fn is_orphan(&self) -> bool {
        !self.contact.is_primary()
    }
}

/// Resolve every matched contact to the root of its cluster. Returns the
/// distinct roots, oldest first, so the head of the list is the survivor.
pub fn resolve_roots<T: ContactTransaction>(
    tx: &T,
    matches: &[ContactRecord],
) -> Result<Vec<ClusterRoot>, StorageError> {
    let mut roots: BTreeMap<ContactId, ClusterRoot> = BTreeMap::new();
    let mut stale: BTreeSet<ContactId> = BTreeSet::new();
    let mut chained: BTreeSet<ContactId> = BTreeSet::new();

    for contact in matches {
        if contact.is_primary() {
            roots
                .entry(contact.id)
                .or_insert_with(|| ClusterRoot::new(contact.clone()));
            continue;
        }
        let Some(target) = contact.linked_id else {
            roots
                .entry(contact.id)
                .or_insert_with(|| ClusterRoot::new(contact.clone()));
            continue;
        };
        if roots.contains_key(&target) || stale.contains(&target) || chained.contains(&target) {
            continue;
        }
        match tx.get(target)? {
            Some(primary) if primary.is_primary() => {
                roots
                    .entry(primary.id)
                    .or_insert_with(|| ClusterRoot::new(primary));
            }
            Some(middle) => match live_primary(tx, middle.linked_id)? {
                // One-hop chain: the link target was demoted under another
                // primary. Its members follow it there.
                Some(primary) => {
                    chained.insert(target);
                    roots
                        .entry(primary.id)
                        .or_insert_with(|| ClusterRoot::new(primary))
                        .stale_targets
                        .push(target);
                }
                None => {
                    stale.insert(target);
                }
            },
            None => {
                stale.insert(target);
            }
        }
    }

    // Members of a cluster whose primary vanished elect their oldest live
    // member as a stand-in root.
    for target in stale {
        let members = tx.find_linked_to(&[target])?;
        if let Some(oldest) = members.into_iter().next() {
            roots
                .entry(oldest.id)
                .or_insert_with(|| ClusterRoot::new(oldest))
                .stale_targets
                .push(target);
        }
    }

    let mut roots: Vec<ClusterRoot> = roots.into_values().collect();
    roots.sort_by_key(|r| r.contact.age_key());
    Ok(roots)
}

fn live_primary<T: ContactTransaction>(
    tx: &T,
    id: Option<ContactId>,
) -> Result<Option<ContactRecord>, StorageError> {
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(tx.get(id)?.filter(ContactRecord::is_primary))
}

/// Assemble the response for a cluster. `members` is every other live row of
/// the cluster in discovery order (oldest first, fresh inserts last).
pub fn build_view(primary: &ContactRecord, members: &[ContactRecord]) -> IdentityView {
    let mut emails = OrderedSet::default();
    let mut phone_numbers = OrderedSet::default();
    let mut secondary_emails = OrderedSet::default();
    let mut secondary_phone_numbers = OrderedSet::default();
    let mut secondary_contact_ids = Vec::new();

    emails.push(primary.email.as_deref());
    phone_numbers.push(primary.phone_number.as_deref());

    for member in members.iter().filter(|m| m.id != primary.id) {
        secondary_contact_ids.push(member.id);
        if emails.push(member.email.as_deref()) {
            secondary_emails.push(member.email.as_deref());
        }
        if phone_numbers.push(member.phone_number.as_deref()) {
            secondary_phone_numbers.push(member.phone_number.as_deref());
        }
    }

    IdentityView {
        primary_contact_id: primary.id,
        emails: emails.into_vec(),
        phone_numbers: phone_numbers.into_vec(),
        secondary_contact_ids,
        secondary_emails: Some(secondary_emails.into_vec()),
        secondary_phone_numbers: Some(secondary_phone_numbers.into_vec()),
    }
}

/// Duplicate-free, insertion-ordered list of strings.
#[derive(Default)]
struct OrderedSet {
    seen: BTreeSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    /// Returns true if `value` was present and new.
    fn push(&mut self, value: Option<&str>) -> bool {
        match value {
            Some(v) if self.seen.insert(v.to_string()) => {
                self.items.push(v.to_string());
                true
            }
            _ => false,
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}
