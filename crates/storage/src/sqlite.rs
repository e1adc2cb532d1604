use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use contactlink_core::{ContactId, ContactRecord, LinkPrecedence, NewContact, Timestamp};

use crate::error::StorageError;
use crate::traits::{ContactStore, ContactTransaction};

const CONTACT_COLUMNS: &str =
    "id, email, phone_number, linked_id, link_precedence, created_at, updated_at, deleted_at";

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn read_contact(row: &rusqlite::Row) -> rusqlite::Result<ContactRecord> {
    let precedence: String = row.get(4)?;
    let link_precedence = LinkPrecedence::parse(&precedence).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            Box::new(OpaqueStorageError(e.to_string())),
        )
    })?;
    Ok(ContactRecord {
        id: ContactId::new(row.get(0)?),
        email: row.get(1)?,
        phone_number: row.get(2)?,
        linked_id: row.get::<_, Option<i64>>(3)?.map(ContactId::new),
        link_precedence,
        created_at: Timestamp::from_millis(row.get(5)?),
        updated_at: Timestamp::from_millis(row.get(6)?),
        deleted_at: row.get::<_, Option<i64>>(7)?.map(Timestamp::from_millis),
    })
}

fn query_contacts(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ContactRecord>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let contacts = stmt
        .query_map(params, read_contact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(contacts)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl ContactStore for SqliteStorage {
    type Tx<'a> = SqliteTransaction<'a>;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>, StorageError> {
        // IMMEDIATE takes the write lock up front, so two identify calls can
        // never both read "no match" and both insert.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteTransaction { tx })
    }

    fn all_contacts(&self) -> Result<Vec<ContactRecord>, StorageError> {
        query_contacts(
            &self.conn,
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id"),
            [],
        )
    }
}

pub struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl ContactTransaction for SqliteTransaction<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<ContactRecord>, StorageError> {
        query_contacts(
            &self.tx,
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts
                 WHERE deleted_at IS NULL
                   AND ((?1 IS NOT NULL AND email = ?1) OR (?2 IS NOT NULL AND phone_number = ?2))
                 ORDER BY created_at, id"
            ),
            rusqlite::params![email, phone_number],
        )
    }

    fn get(&self, id: ContactId) -> Result<Option<ContactRecord>, StorageError> {
        let contact = self
            .tx
            .query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1 AND deleted_at IS NULL"
                ),
                rusqlite::params![id.get()],
                read_contact,
            )
            .optional()?;
        Ok(contact)
    }

    fn find_cluster(&self, primary_id: ContactId) -> Result<Vec<ContactRecord>, StorageError> {
        query_contacts(
            &self.tx,
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts
                 WHERE deleted_at IS NULL AND (id = ?1 OR linked_id = ?1)
                 ORDER BY created_at, id"
            ),
            rusqlite::params![primary_id.get()],
        )
    }

    fn find_linked_to(&self, ids: &[ContactId]) -> Result<Vec<ContactRecord>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        query_contacts(
            &self.tx,
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts
                 WHERE deleted_at IS NULL AND linked_id IN ({})
                 ORDER BY created_at, id",
                placeholders(ids.len())
            ),
            rusqlite::params_from_iter(ids.iter().map(|id| id.get())),
        )
    }

    fn insert(&mut self, contact: &NewContact) -> Result<ContactRecord, StorageError> {
        let result = self.tx.execute(
            "INSERT INTO contacts (email, phone_number, linked_id, link_precedence, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                contact.email,
                contact.phone_number,
                contact.linked_id.map(|id| id.get()),
                contact.link_precedence.as_str(),
                contact.created_at.as_millis(),
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StorageError::ConstraintViolation(
                    msg.unwrap_or_else(|| err.to_string()),
                ));
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }
        let id = ContactId::new(self.tx.last_insert_rowid());
        Ok(contact.clone().into_record(id))
    }

    fn update_precedence_and_link(
        &mut self,
        id: ContactId,
        precedence: LinkPrecedence,
        linked_id: Option<ContactId>,
        now: Timestamp,
    ) -> Result<ContactRecord, StorageError> {
        let changed = self.tx.execute(
            "UPDATE contacts SET link_precedence = ?1, linked_id = ?2, updated_at = ?3
             WHERE id = ?4 AND deleted_at IS NULL",
            rusqlite::params![
                precedence.as_str(),
                linked_id.map(|l| l.get()),
                now.as_millis(),
                id.get(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        self.get(id)?.ok_or(StorageError::NotFound(id))
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
        if moved.is_empty() {
            return Ok(moved);
        }
        let sql = format!(
            "UPDATE contacts SET linked_id = ?, updated_at = ? WHERE id IN ({})",
            placeholders(moved.len())
        );
        let params = [to.get(), now.as_millis()]
            .into_iter()
            .chain(moved.iter().map(|id| id.get()));
        self.tx.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(moved)
    }

    fn soft_delete(&mut self, id: ContactId, now: Timestamp) -> Result<(), StorageError> {
        let changed = self.tx.execute(
            "UPDATE contacts SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            rusqlite::params![now.as_millis(), id.get()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StorageError> {
        self.tx.commit()?;
        Ok(())
    }
}

/// Wrapper error type used to tunnel domain parse errors through rusqlite's
/// error system in row mappers that must return rusqlite::Error.
#[derive(Debug)]
struct OpaqueStorageError(String);

impl std::fmt::Display for OpaqueStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OpaqueStorageError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn insert_assigns_increasing_ids() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let mut tx = storage.begin()?;
        let a = tx.insert(&NewContact::primary(Some("a@x.com".into()), None, ts(1)))?;
        let b = tx.insert(&NewContact::primary(None, Some("1".into()), ts(2)))?;
        tx.commit()?;

        assert!(b.id > a.id);
        assert_eq!(storage.all_contacts()?.len(), 2);
        Ok(())
    }

    #[test]
    fn find_matches_either_field_and_skips_null() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let mut tx = storage.begin()?;
        let a = tx.insert(&NewContact::primary(Some("a@x.com".into()), None, ts(1)))?;
        let b = tx.insert(&NewContact::primary(None, Some("1".into()), ts(2)))?;
        tx.insert(&NewContact::primary(Some("c@x.com".into()), Some("3".into()), ts(3)))?;

        let both = tx.find_by_email_or_phone(Some("a@x.com"), Some("1"))?;
        assert_eq!(both.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        let email_only = tx.find_by_email_or_phone(Some("a@x.com"), None)?;
        assert_eq!(email_only.len(), 1);

        assert!(tx.find_by_email_or_phone(None, None)?.is_empty());
        Ok(())
    }

    #[test]
    fn soft_deleted_rows_are_invisible() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let mut tx = storage.begin()?;
        let a = tx.insert(&NewContact::primary(Some("a@x.com".into()), None, ts(1)))?;
        tx.soft_delete(a.id, ts(2))?;

        assert!(tx.find_by_email_or_phone(Some("a@x.com"), None)?.is_empty());
        assert!(tx.get(a.id)?.is_none());
        assert!(matches!(tx.soft_delete(a.id, ts(3)), Err(StorageError::NotFound(_))));
        tx.commit()?;

        let all = storage.all_contacts()?;
        assert_eq!(all[0].deleted_at, Some(ts(2)));
        Ok(())
    }

    #[test]
    fn demote_and_relink() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let mut tx = storage.begin()?;
        let p1 = tx.insert(&NewContact::primary(Some("a".into()), None, ts(1)))?;
        let p2 = tx.insert(&NewContact::primary(Some("b".into()), None, ts(2)))?;
        let s2 = tx.insert(&NewContact::secondary(None, Some("2".into()), p2.id, ts(3)))?;

        let demoted =
            tx.update_precedence_and_link(p2.id, LinkPrecedence::Secondary, Some(p1.id), ts(4))?;
        assert_eq!(demoted.linked_id, Some(p1.id));
        assert_eq!(demoted.updated_at, ts(4));
        assert_eq!(demoted.created_at, ts(2));

        let moved = tx.relink(&[p2.id], p1.id, ts(4))?;
        assert_eq!(moved, vec![s2.id]);

        let cluster = tx.find_cluster(p1.id)?;
        assert_eq!(
            cluster.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![p1.id, p2.id, s2.id]
        );
        Ok(())
    }

    #[test]
    fn update_missing_contact_is_not_found() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let mut tx = storage.begin()?;
        let err = tx
            .update_precedence_and_link(ContactId::new(99), LinkPrecedence::Primary, None, ts(1))
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(id) if id == ContactId::new(99)));
        Ok(())
    }

    #[test]
    fn dropped_transaction_rolls_back() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        {
            let mut tx = storage.begin()?;
            tx.insert(&NewContact::primary(Some("a".into()), None, ts(1)))?;
        }
        assert!(storage.all_contacts()?.is_empty());
        Ok(())
    }

    #[test]
    fn file_backed_store_persists_across_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("contacts.db");
        let path = path.to_str().ok_or("non-utf8 temp path")?;
        {
            let mut storage = SqliteStorage::open(path)?;
            let mut tx = storage.begin()?;
            tx.insert(&NewContact::primary(Some("a".into()), Some("1".into()), ts(1)))?;
            tx.commit()?;
        }
        let storage = SqliteStorage::open(path)?;
        let all = storage.all_contacts()?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].email.as_deref(), Some("a"));
        assert!(all[0].is_primary());
        Ok(())
    }
}
