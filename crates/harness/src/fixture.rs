use std::collections::BTreeMap;

use contactlink_core::{
    ContactId, ContactRecord, IdentifyRequest, IdentityView, LinkPrecedence, NewContact, Timestamp,
};
use contactlink_engine::{Engine, EngineError};
use contactlink_storage::{
    ContactStore, ContactTransaction, MemoryStorage, SqliteStorage, StorageError,
};

/// An engine plus helpers for seeding rows with explicit creation times,
/// bypassing reconciliation.
pub struct Fixture<S: ContactStore = SqliteStorage> {
    pub engine: Engine<S>,
}

impl Fixture<SqliteStorage> {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            engine: Engine::new(SqliteStorage::open_in_memory()?),
        })
    }
}

impl Fixture<MemoryStorage> {
    pub fn memory() -> Self {
        Self {
            engine: Engine::new(MemoryStorage::new()),
        }
    }
}

impl<S: ContactStore> Fixture<S> {
    pub fn identify(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<IdentityView, EngineError> {
        self.engine.identify(IdentifyRequest::new(email, phone_number))
    }

    /// Insert a primary row directly, created at `created_ms`.
    pub fn seed_primary(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
        created_ms: i64,
    ) -> Result<ContactRecord, StorageError> {
        self.seed(NewContact::primary(
            email.map(str::to_string),
            phone_number.map(str::to_string),
            Timestamp::from_millis(created_ms),
        ))
    }

    /// Insert a secondary row linked to `primary`, created at `created_ms`.
    pub fn seed_secondary(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
        primary: ContactId,
        created_ms: i64,
    ) -> Result<ContactRecord, StorageError> {
        self.seed(NewContact::secondary(
            email.map(str::to_string),
            phone_number.map(str::to_string),
            primary,
            Timestamp::from_millis(created_ms),
        ))
    }

    fn seed(&mut self, contact: NewContact) -> Result<ContactRecord, StorageError> {
        let mut tx = self.engine.storage_mut().begin()?;
        let record = tx.insert(&contact)?;
        tx.commit()?;
        Ok(record)
    }

    pub fn soft_delete(&mut self, id: ContactId, at_ms: i64) -> Result<(), StorageError> {
        let mut tx = self.engine.storage_mut().begin()?;
        tx.soft_delete(id, Timestamp::from_millis(at_ms))?;
        tx.commit()
    }

    pub fn contacts(&self) -> Result<Vec<ContactRecord>, StorageError> {
        self.engine.storage().all_contacts()
    }

    pub fn contact(&self, id: ContactId) -> Result<ContactRecord, StorageError> {
        self.contacts()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(StorageError::NotFound(id))
    }

    pub fn row_count(&self) -> Result<usize, StorageError> {
        Ok(self.contacts()?.len())
    }

    /// Run [`check_invariants`] over the current store contents.
    pub fn assert_invariants(&self) -> Result<(), Box<dyn std::error::Error>> {
        check_invariants(&self.contacts()?)?;
        Ok(())
    }
}

/// Verify the quiescent-state rules over every live row: primaries carry no
/// link, secondaries link to a live primary, and no cluster holds the same
/// (email, phone) pair twice.
pub fn check_invariants(contacts: &[ContactRecord]) -> Result<(), String> {
    let live: BTreeMap<ContactId, &ContactRecord> = contacts
        .iter()
        .filter(|c| c.deleted_at.is_none())
        .map(|c| (c.id, c))
        .collect();

    let mut pairs: BTreeMap<(ContactId, Option<&str>, Option<&str>), ContactId> = BTreeMap::new();
    for contact in live.values() {
        let root = match (contact.link_precedence, contact.linked_id) {
            (LinkPrecedence::Primary, None) => contact.id,
            (LinkPrecedence::Primary, Some(l)) => {
                return Err(format!("primary {} links to {l}", contact.id));
            }
            (LinkPrecedence::Secondary, None) => {
                return Err(format!("secondary {} has no link", contact.id));
            }
            (LinkPrecedence::Secondary, Some(l)) => match live.get(&l) {
                Some(target) if target.is_primary() => l,
                Some(_) => return Err(format!("secondary {} chains to secondary {l}", contact.id)),
                None => return Err(format!("secondary {} links to missing {l}", contact.id)),
            },
        };
        let key = (root, contact.email.as_deref(), contact.phone_number.as_deref());
        if let Some(other) = pairs.insert(key, contact.id) {
            return Err(format!(
                "contacts {other} and {} repeat the same pair in cluster {root}",
                contact.id
            ));
        }
    }
    Ok(())
}
