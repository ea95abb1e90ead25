//! Optimistic multi-entity transactions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{Db, DbError, Entity, Key};

/// Options controlling a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Allow the transaction to span several entity groups, up to the
    /// store's `max_entity_groups`. Single-group transactions may touch
    /// exactly one.
    pub cross_group: bool,
}

impl TransactionOptions {
    /// A transaction confined to one entity group.
    pub fn single_group() -> Self {
        Self { cross_group: false }
    }

    /// A cross-group (XG) transaction.
    pub fn cross_group() -> Self {
        Self { cross_group: true }
    }
}

type CommitHook = Box<dyn FnOnce() + Send + 'static>;

/// An open transaction.
///
/// Reads observe the latest committed version of each entity and remember
/// it; writes are buffered. On commit, every remembered version is checked
/// again and the commit fails with [`DbError::Conflict`] if any of them
/// moved. Dropping a transaction without committing rolls it back.
pub struct Transaction<'db> {
    db: &'db Db,
    options: TransactionOptions,
    pub(crate) reads: HashMap<Key, Option<u64>>,
    pub(crate) writes: BTreeMap<Key, Option<serde_json::Value>>,
    pub(crate) hooks: Vec<CommitHook>,
    groups: BTreeSet<Key>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Db, options: TransactionOptions) -> Self {
        Self {
            db,
            options,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
            hooks: Vec::new(),
            groups: BTreeSet::new(),
        }
    }

    /// Options this transaction was opened with.
    pub fn options(&self) -> TransactionOptions {
        self.options
    }

    /// Read an entity by id.
    ///
    /// Sees this transaction's own buffered writes.
    pub fn get<E: Entity>(&mut self, id: &str) -> Result<Option<E>, DbError> {
        let key = Key::of::<E>(id);
        self.touch(&key)?;

        if let Some(pending) = self.writes.get(&key) {
            return match pending {
                Some(data) => Ok(Some(serde_json::from_value(data.clone())?)),
                None => Ok(None),
            };
        }

        let record = self.db.read_record(&key);
        self.reads
            .entry(key)
            .or_insert_with(|| record.as_ref().map(|(version, _)| *version));

        match record {
            Some((_, data)) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    /// Read an entity that must exist.
    pub fn get_required<E: Entity>(&mut self, id: &str) -> Result<E, DbError> {
        self.get(id)?
            .ok_or_else(|| DbError::NotFound(Key::of::<E>(id)))
    }

    /// Buffer a write of an entity.
    pub fn put<E: Entity>(&mut self, entity: &E) -> Result<(), DbError> {
        let key = entity.key();
        self.touch(&key)?;
        self.observe(&key);
        let data = serde_json::to_value(entity)?;
        self.writes.insert(key, Some(data));
        Ok(())
    }

    /// Buffer a deletion.
    pub fn delete(&mut self, key: &Key) -> Result<(), DbError> {
        self.touch(key)?;
        self.observe(key);
        self.writes.insert(key.clone(), None);
        Ok(())
    }

    /// Register an action to run only if this transaction commits.
    ///
    /// Hooks run once, in registration order, after the commit is applied.
    /// They are discarded when the transaction rolls back or its commit
    /// fails, including attempts that are retried.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Number of entity groups touched so far.
    pub fn entity_groups(&self) -> usize {
        self.groups.len()
    }

    /// Whether the transaction has buffered any writes.
    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Explicitly discard the transaction.
    pub fn rollback(self) {}

    fn touch(&mut self, key: &Key) -> Result<(), DbError> {
        if self.groups.contains(key) {
            return Ok(());
        }
        let limit = if self.options.cross_group {
            self.db.options().max_entity_groups
        } else {
            1
        };
        if self.groups.len() >= limit {
            return Err(DbError::TooManyEntityGroups { limit });
        }
        self.groups.insert(key.clone());
        Ok(())
    }

    // Blind writes still take part in conflict detection.
    fn observe(&mut self, key: &Key) {
        if !self.reads.contains_key(key) {
            let version = self.db.read_record(key).map(|(version, _)| version);
            self.reads.insert(key.clone(), version);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("options", &self.options)
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
