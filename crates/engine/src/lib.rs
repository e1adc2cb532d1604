pub mod error;
pub mod reconcile;

pub use error::EngineError;

use contactlink_core::{
    ContactClock, ContactId, ContactRecord, IdentifyRequest, IdentityView, LinkPrecedence,
    NewContact, Timestamp,
};
use contactlink_storage::{ContactStore, ContactTransaction, StorageError};

use crate::reconcile::{build_view, resolve_roots};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Total tries for one identify call when the store reports a retryable
    /// conflict. Always at least one.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Reconciles incoming contact fragments against the store.
///
/// The engine keeps no contact state between calls: every identify call reads
/// and writes through one store transaction, and only the timestamp clock
/// survives from call to call.
pub struct Engine<S: ContactStore> {
    storage: S,
    clock: ContactClock,
    config: EngineConfig,
}

impl<S: ContactStore> Engine<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        Self {
            storage,
            clock: ContactClock::new(),
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Resolve an email and/or phone number into its identity cluster,
    /// recording any new fragment and merging clusters the request proves to
    /// be the same person.
    pub fn identify(&mut self, request: IdentifyRequest) -> Result<IdentityView, EngineError> {
        let request = request.normalized()?;
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.identify_once(&request) {
                Ok(view) => return Ok(view),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(attempt, error = %err, "identify conflicted, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(attempt, error = %err, "identify failed");
                    return Err(EngineError::StoreUnavailable(err));
                }
            }
        }
    }

    /// Read-only view of the cluster headed by `primary_id`.
    pub fn cluster(&mut self, primary_id: ContactId) -> Result<IdentityView, EngineError> {
        let tx = self.storage.begin()?;
        let members = tx.find_cluster(primary_id)?;
        let primary = members
            .iter()
            .find(|c| c.id == primary_id && c.is_primary())
            .ok_or(EngineError::ContactNotFound(primary_id))?;
        Ok(build_view(primary, &members))
    }

    /// One read-merge-write pass inside a single transaction. Any error drops
    /// the transaction, which rolls back everything this pass wrote.
    fn identify_once(&mut self, request: &IdentifyRequest) -> Result<IdentityView, StorageError> {
        let email = request.email.as_deref();
        let phone_number = request.phone_number.as_deref();

        let mut tx = self.storage.begin()?;
        let matches = tx.find_by_email_or_phone(email, phone_number)?;

        if matches.is_empty() {
            let now = self.clock.tick()?;
            let created = tx.insert(&NewContact::primary(
                request.email.clone(),
                request.phone_number.clone(),
                now,
            ))?;
            tx.commit()?;
            tracing::info!(contact_id = %created.id, "created primary contact");
            return Ok(build_view(&created, &[]));
        }

        for contact in &matches {
            self.clock.observe(contact.updated_at);
        }

        let roots = resolve_roots(&tx, &matches)?;
        let mut roots = roots.into_iter();
        let Some(survivor) = roots.next() else {
            return Err(StorageError::ConstraintViolation(
                "matched contacts resolved to no cluster".into(),
            ));
        };
        let survivor_id = survivor.contact.id;
        let mut now: Option<Timestamp> = None;

        if survivor.is_orphan() {
            let ts = stamp(&mut self.clock, &mut now)?;
            tx.update_precedence_and_link(survivor_id, LinkPrecedence::Primary, None, ts)?;
            tracing::warn!(
                contact_id = %survivor_id,
                stale = ?survivor.stale_targets,
                "promoted orphaned contact to primary"
            );
        }

        let mut relink_from = survivor.stale_targets;
        for demoted in roots {
            let ts = stamp(&mut self.clock, &mut now)?;
            tx.update_precedence_and_link(
                demoted.contact.id,
                LinkPrecedence::Secondary,
                Some(survivor_id),
                ts,
            )?;
            tracing::info!(
                primary = %survivor_id,
                demoted = %demoted.contact.id,
                "merged identity clusters"
            );
            relink_from.push(demoted.contact.id);
            relink_from.extend(demoted.stale_targets);
        }

        if !relink_from.is_empty() {
            let ts = stamp(&mut self.clock, &mut now)?;
            let moved = tx.relink(&relink_from, survivor_id, ts)?;
            tracing::debug!(primary = %survivor_id, moved = moved.len(), "relinked secondaries");
        }

        let mut members = tx.find_cluster(survivor_id)?;
        let primary = take_primary(&mut members, survivor_id)?;

        let email_known = |members: &[ContactRecord]| {
            email.is_some_and(|e| {
                primary.email.as_deref() == Some(e)
                    || members.iter().any(|m| m.email.as_deref() == Some(e))
            })
        };
        let phone_known = |members: &[ContactRecord]| {
            phone_number.is_some_and(|p| {
                primary.phone_number.as_deref() == Some(p)
                    || members.iter().any(|m| m.phone_number.as_deref() == Some(p))
            })
        };
        let new_email = email.filter(|_| !email_known(members.as_slice())).map(str::to_string);
        let new_phone = phone_number.filter(|_| !phone_known(members.as_slice())).map(str::to_string);

        if let Some(new_email) = new_email {
            let ts = self.clock.tick()?;
            let created = tx.insert(&NewContact::secondary(Some(new_email), None, survivor_id, ts))?;
            tracing::info!(primary = %survivor_id, contact_id = %created.id, "attached email");
            members.push(created);
        }
        if let Some(new_phone) = new_phone {
            let ts = self.clock.tick()?;
            let created = tx.insert(&NewContact::secondary(None, Some(new_phone), survivor_id, ts))?;
            tracing::info!(primary = %survivor_id, contact_id = %created.id, "attached phone number");
            members.push(created);
        }

        tx.commit()?;
        Ok(build_view(&primary, &members))
    }
}

/// One timestamp shared by every update of a merge.
fn stamp(clock: &mut ContactClock, now: &mut Option<Timestamp>) -> Result<Timestamp, StorageError> {
    match now {
        Some(ts) => Ok(*ts),
        None => {
            let ts = clock.tick()?;
            *now = Some(ts);
            Ok(ts)
        }
    }
}

fn take_primary(
    members: &mut Vec<ContactRecord>,
    primary_id: ContactId,
) -> Result<ContactRecord, StorageError> {
    let pos = members
        .iter()
        .position(|c| c.id == primary_id)
        .ok_or(StorageError::NotFound(primary_id))?;
    let primary = members.remove(pos);
    if !primary.is_primary() {
        return Err(StorageError::ConstraintViolation(format!(
            "cluster head {primary_id} is not primary"
        )));
    }
    Ok(primary)
}
