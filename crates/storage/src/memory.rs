use std::collections::{BTreeMap, VecDeque};

use contactlink_core::{ContactId, ContactRecord, LinkPrecedence, NewContact, Timestamp};

use crate::error::StorageError;
use crate::traits::{ContactStore, ContactTransaction};

/// Failure scripted into a [`MemoryStorage`]; consumed in FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// `begin` fails as if the store were unreachable.
    BeginUnavailable,
    /// `commit` reports a write conflict (retryable).
    CommitConflict,
    /// `commit` fails as if the store went away mid-call.
    CommitUnavailable,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    contacts: BTreeMap<ContactId, ContactRecord>,
}

impl MemoryState {
    fn live(&self) -> impl Iterator<Item = &ContactRecord> {
        self.contacts.values().filter(|c| c.deleted_at.is_none())
    }

    fn oldest_first(&self, pred: impl Fn(&ContactRecord) -> bool) -> Vec<ContactRecord> {
        let mut out: Vec<ContactRecord> = self.live().filter(|c| pred(c)).cloned().collect();
        out.sort_by_key(|c| c.age_key());
        out
    }
}

/// In-process contact store. A transaction works on a private copy of the
/// state and swaps it in on commit, so an abandoned transaction leaves no trace.
#[derive(Default)]
pub struct MemoryStorage {
    state: MemoryState,
    faults: VecDeque<InjectedFault>,
    transactions_started: usize,
    commits: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_fault(&mut self, fault: InjectedFault) {
        self.faults.push_back(fault);
    }

    pub fn transactions_started(&self) -> usize {
        self.transactions_started
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    fn take_fault(&mut self, wanted: &[InjectedFault]) -> Option<InjectedFault> {
        match self.faults.front() {
            Some(f) if wanted.contains(f) => self.faults.pop_front(),
            _ => None,
        }
    }
}

impl ContactStore for MemoryStorage {
    type Tx<'a> = MemoryTransaction<'a>;

    fn begin(&mut self) -> Result<MemoryTransaction<'_>, StorageError> {
        self.transactions_started += 1;
        if self.take_fault(&[InjectedFault::BeginUnavailable]).is_some() {
            return Err(StorageError::Unavailable("injected begin failure".into()));
        }
        let working = self.state.clone();
        Ok(MemoryTransaction {
            store: self,
            working,
        })
    }

    fn all_contacts(&self) -> Result<Vec<ContactRecord>, StorageError> {
        Ok(self.state.contacts.values().cloned().collect())
    }
}

pub struct MemoryTransaction<'a> {
    store: &'a mut MemoryStorage,
    working: MemoryState,
}

impl MemoryTransaction<'_> {
    fn live_mut(&mut self, id: ContactId) -> Result<&mut ContactRecord, StorageError> {
        self.working
            .contacts
            .get_mut(&id)
            .filter(|c| c.deleted_at.is_none())
            .ok_or(StorageError::NotFound(id))
    }
}

impl ContactTransaction for MemoryTransaction<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<ContactRecord>, StorageError> {
        Ok(self.working.oldest_first(|c| {
            let email_hit = email.is_some() && c.email.as_deref() == email;
            let phone_hit = phone_number.is_some() && c.phone_number.as_deref() == phone_number;
            email_hit || phone_hit
        }))
    }

    fn get(&self, id: ContactId) -> Result<Option<ContactRecord>, StorageError> {
        Ok(self
            .working
            .contacts
            .get(&id)
            .filter(|c| c.deleted_at.is_none())
            .cloned())
    }

    fn find_cluster(&self, primary_id: ContactId) -> Result<Vec<ContactRecord>, StorageError> {
        Ok(self
            .working
            .oldest_first(|c| c.id == primary_id || c.linked_id == Some(primary_id)))
    }

    fn find_linked_to(&self, ids: &[ContactId]) -> Result<Vec<ContactRecord>, StorageError> {
        Ok(self
            .working
            .oldest_first(|c| c.linked_id.is_some_and(|l| ids.contains(&l))))
    }

    fn insert(&mut self, contact: &NewContact) -> Result<ContactRecord, StorageError> {
        let primary = contact.link_precedence == LinkPrecedence::Primary;
        if primary != contact.linked_id.is_none() {
            return Err(StorageError::ConstraintViolation(
                "linked_id must be set exactly for secondary contacts".into(),
            ));
        }
        if let Some(target) = contact.linked_id {
            if !self.working.contacts.contains_key(&target) {
                return Err(StorageError::ConstraintViolation(format!(
                    "linked_id {target} does not exist"
                )));
            }
        }
        self.working.next_id += 1;
        let id = ContactId::new(self.working.next_id);
        let record = contact.clone().into_record(id);
        self.working.contacts.insert(id, record.clone());
        Ok(record)
    }

    fn update_precedence_and_link(
        &mut self,
        id: ContactId,
        precedence: LinkPrecedence,
        linked_id: Option<ContactId>,
        now: Timestamp,
    ) -> Result<ContactRecord, StorageError> {
        let contact = self.live_mut(id)?;
        contact.link_precedence = precedence;
        contact.linked_id = linked_id;
        contact.updated_at = now;
        Ok(contact.clone())
    }

    fn relink(
        &mut self,
        from: &[ContactId],
        to: ContactId,
        now: Timestamp,
    ) -> Result<Vec<ContactId>, StorageError> {
        let moved: Vec<ContactId> = self
            .find_linked_to(from)?
            .into_iter()
            .filter(|c| c.id != to)
            .map(|c| c.id)
            .collect();
        for id in &moved {
            let contact = self.live_mut(*id)?;
            contact.linked_id = Some(to);
            contact.updated_at = now;
        }
        Ok(moved)
    }

    fn soft_delete(&mut self, id: ContactId, now: Timestamp) -> Result<(), StorageError> {
        let contact = self.live_mut(id)?;
        contact.deleted_at = Some(now);
        contact.updated_at = now;
        Ok(())
    }

    fn commit(self) -> Result<(), StorageError> {
        let fault = self
            .store
            .take_fault(&[InjectedFault::CommitConflict, InjectedFault::CommitUnavailable]);
        match fault {
            Some(InjectedFault::CommitConflict) => {
                Err(StorageError::Conflict("injected commit conflict".into()))
            }
            Some(_) => Err(StorageError::Unavailable("injected commit failure".into())),
            None => {
                self.store.state = self.working;
                self.store.commits += 1;
                Ok(())
            }
        }
    }
}
