use contactlink_core::{ContactId, ContactRecord, LinkPrecedence, NewContact, Timestamp};

use crate::error::StorageError;

/// A durable collection of contacts. All reads and writes made on behalf of one
/// identify call go through a single transaction obtained from [`begin`].
///
/// [`begin`]: ContactStore::begin
pub trait ContactStore {
    type Tx<'a>: ContactTransaction
    where
        Self: 'a;

    /// Open a transaction that is isolated from every other writer until it
    /// commits. Dropping the handle without committing rolls it back.
    fn begin(&mut self) -> Result<Self::Tx<'_>, StorageError>;

    /// Every row, deleted ones included, ordered by id.
    fn all_contacts(&self) -> Result<Vec<ContactRecord>, StorageError>;
}

pub trait ContactTransaction {
    /// Live contacts whose email equals `email` or whose phone number equals
    /// `phone_number`, oldest first. A `None` argument matches nothing.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<ContactRecord>, StorageError>;

    fn get(&self, id: ContactId) -> Result<Option<ContactRecord>, StorageError>;

    /// The live primary `primary_id` and every live contact linked to it,
    /// oldest first.
    fn find_cluster(&self, primary_id: ContactId) -> Result<Vec<ContactRecord>, StorageError>;

    /// Live contacts whose `linked_id` is one of `ids`, oldest first.
    fn find_linked_to(&self, ids: &[ContactId]) -> Result<Vec<ContactRecord>, StorageError>;

    fn insert(&mut self, contact: &NewContact) -> Result<ContactRecord, StorageError>;

    fn update_precedence_and_link(
        &mut self,
        id: ContactId,
        precedence: LinkPrecedence,
        linked_id: Option<ContactId>,
        now: Timestamp,
    ) -> Result<ContactRecord, StorageError>;

    /// Point every live contact linked to one of `from` at `to`. Returns the
    /// ids that moved.
    fn relink(
        &mut self,
        from: &[ContactId],
        to: ContactId,
        now: Timestamp,
    ) -> Result<Vec<ContactId>, StorageError>;

    fn soft_delete(&mut self, id: ContactId, now: Timestamp) -> Result<(), StorageError>;

    fn commit(self) -> Result<(), StorageError>
    where
        Self: Sized;
}
