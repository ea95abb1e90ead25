//! Store handle, commits and persistence.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Cursor, DbError, Entity, Filter, Key, Query, QueryPage, Transaction, TransactionOptions};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct DbOptions {
    /// Maximum entity groups a cross-group transaction may touch.
    pub max_entity_groups: usize,
    /// Automatic retries of a conflicting transaction before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub retry_backoff: Duration,
    /// Entities fetched per batch by lazy queries.
    pub query_batch_size: usize,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_entity_groups: 5,
            max_retries: 3,
            retry_backoff: Duration::ZERO,
            query_batch_size: 100,
        }
    }
}

/// Store activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DbStats {
    /// Successful commits, including single-entity writes.
    pub commits: u64,
    /// Commits rejected because of concurrent modification.
    pub conflicts: u64,
    /// Transaction attempts re-run after a conflict.
    pub retries: u64,
    /// Entities currently stored.
    pub entities: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    version: u64,
    data: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u64,
    entities: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    key: Key,
    version: u64,
    data: serde_json::Value,
}

#[derive(Default)]
struct Counters {
    commits: AtomicU64,
    conflicts: AtomicU64,
    retries: AtomicU64,
}

/// Handle to the entity store.
///
/// All state lives in memory behind a lock; a store opened with a path can
/// be written back to disk with [`Db::flush`]. The handle is `Sync` and is
/// meant to be shared behind an `Arc`.
pub struct Db {
    entities: RwLock<BTreeMap<Key, Record>>,
    version: AtomicU64,
    options: DbOptions,
    path: Option<PathBuf>,
    counters: Counters,
}

impl Db {
    /// Open an empty, non-persistent store.
    pub fn in_memory() -> Self {
        Self::with_options(DbOptions::default())
    }

    /// Open an empty, non-persistent store with custom options.
    pub fn with_options(options: DbOptions) -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            options,
            path: None,
            counters: Counters::default(),
        }
    }

    /// Open a store backed by a snapshot file.
    ///
    /// The file is loaded if it exists; otherwise the store starts empty and
    /// the file is created on the first [`Db::flush`].
    pub fn open(path: impl AsRef<Path>, options: DbOptions) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let mut db = Self::with_options(options);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| DbError::OpenError(format!("{}: {}", path.display(), e)))?;
            let snapshot: Snapshot = serde_json::from_str(&content)
                .map_err(|e| DbError::OpenError(format!("{}: {}", path.display(), e)))?;

            let mut entities = BTreeMap::new();
            let mut max_version = snapshot.version;
            for entry in snapshot.entities {
                max_version = max_version.max(entry.version);
                entities.insert(
                    entry.key,
                    Record {
                        version: entry.version,
                        data: entry.data,
                    },
                );
            }
            tracing::debug!(path = %path.display(), entities = entities.len(), "loaded store snapshot");
            db.entities = RwLock::new(entities);
            db.version = AtomicU64::new(max_version);
        }

        db.path = Some(path);
        Ok(db)
    }

    /// Write the store to its snapshot file, if it has one.
    pub fn flush(&self) -> Result<(), DbError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = {
            let entities = self.entities.read();
            Snapshot {
                version: self.version.load(Ordering::SeqCst),
                entities: entities
                    .iter()
                    .map(|(key, record)| SnapshotEntry {
                        key: key.clone(),
                        version: record.version,
                        data: record.data.clone(),
                    })
                    .collect(),
            }
        };

        let content = serde_json::to_string_pretty(&snapshot)?;
        write_atomically(path, &content)
            .map_err(|e| DbError::PersistError(format!("{}: {}", path.display(), e)))
    }

    /// Store options.
    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> DbStats {
        DbStats {
            commits: self.counters.commits.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            entities: self.entities.read().len(),
        }
    }

    /// Read an entity by id.
    pub fn get<E: Entity>(&self, id: &str) -> Result<Option<E>, DbError> {
        match self.read_record(&Key::of::<E>(id)) {
            Some((_, data)) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    /// Read several entities of one kind; missing ids yield `None`.
    pub fn get_multi<E: Entity>(&self, ids: &[&str]) -> Result<Vec<Option<E>>, DbError> {
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Write a single entity.
    pub fn put<E: Entity>(&self, entity: &E) -> Result<(), DbError> {
        let data = serde_json::to_value(entity)?;
        let version = self.next_version();
        self.entities
            .write()
            .insert(entity.key(), Record { version, data });
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Write several entities atomically.
    pub fn put_multi<E: Entity>(&self, entities: &[E]) -> Result<(), DbError> {
        let encoded = entities
            .iter()
            .map(|e| Ok((e.key(), serde_json::to_value(e)?)))
            .collect::<Result<Vec<_>, DbError>>()?;

        let version = self.next_version();
        let mut store = self.entities.write();
        for (key, data) in encoded {
            store.insert(key, Record { version, data });
        }
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Delete a single entity. Returns whether it existed.
    pub fn delete(&self, key: &Key) -> Result<bool, DbError> {
        let existed = self.entities.write().remove(key).is_some();
        if existed {
            self.counters.commits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(existed)
    }

    /// Delete several entities. Returns how many existed.
    pub fn delete_multi(&self, keys: &[Key]) -> Result<usize, DbError> {
        let mut store = self.entities.write();
        let removed = keys.iter().filter(|k| store.remove(k).is_some()).count();
        if removed > 0 {
            self.counters.commits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    /// Start a transaction.
    pub fn begin(&self, options: TransactionOptions) -> Transaction<'_> {
        Transaction::new(self, options)
    }

    /// Validate and apply a transaction, then run its commit hooks.
    pub fn commit(&self, tx: Transaction<'_>) -> Result<(), DbError> {
        let Transaction {
            reads,
            writes,
            hooks,
            ..
        } = tx;

        {
            let mut store = self.entities.write();
            for (key, observed) in &reads {
                let current = store.get(key).map(|r| r.version);
                if current != *observed {
                    self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                    return Err(DbError::Conflict(key.clone()));
                }
            }

            if !writes.is_empty() {
                let version = self.next_version();
                for (key, data) in writes {
                    match data {
                        Some(data) => {
                            store.insert(key, Record { version, data });
                        }
                        None => {
                            store.remove(&key);
                        }
                    }
                }
            }
        }

        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    /// Run `f` inside a transaction, retrying it on commit conflicts.
    ///
    /// An error returned by `f` rolls the attempt back and is returned as is.
    /// After `max_retries` conflicting retries the call fails with
    /// [`DbError::TransactionConflict`]. `f` may run several times and must
    /// not have side effects outside the transaction; use
    /// [`Transaction::on_commit`] for those.
    pub fn run_in_transaction<T, E, F>(&self, options: TransactionOptions, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut attempt: u32 = 0;
        loop {
            let mut tx = self.begin(options);
            let value = f(&mut tx)?;

            match self.commit(tx) {
                Ok(()) => return Ok(value),
                Err(DbError::Conflict(key)) if attempt < self.options.max_retries => {
                    attempt += 1;
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%key, attempt, "transaction conflict, retrying");
                    if !self.options.retry_backoff.is_zero() {
                        std::thread::sleep(self.options.retry_backoff * 2u32.saturating_pow(attempt - 1));
                    }
                }
                Err(DbError::Conflict(key)) => {
                    tracing::warn!(%key, attempts = attempt + 1, "transaction retries exhausted");
                    return Err(DbError::TransactionConflict {
                        attempts: attempt + 1,
                    }
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Lazily iterate entities of kind `E` matching `filter`.
    pub fn query<E: Entity>(&self, filter: Filter) -> Query<'_, E> {
        Query::new(self, filter, None)
    }

    /// Resume a query after `cursor`.
    pub fn query_from<E: Entity>(&self, filter: Filter, cursor: Cursor) -> Query<'_, E> {
        Query::new(self, filter, Some(cursor))
    }

    /// Keys of all entities of kind `E` matching `filter`.
    pub fn query_keys<E: Entity>(&self, filter: Filter) -> Result<Vec<Key>, DbError> {
        self.query::<E>(filter).keys()
    }

    /// Fetch one page of at most `limit` results.
    pub fn query_page<E: Entity>(
        &self,
        filter: &Filter,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> Result<QueryPage<E>, DbError> {
        let (batch, more) = self.scan(E::KIND, filter, limit.max(1), cursor);
        let next = if more {
            batch.last().map(|(key, _)| Cursor::after(key.clone()))
        } else {
            None
        };
        let items = batch
            .into_iter()
            .map(|(_, data)| serde_json::from_value(data).map_err(DbError::from))
            .collect::<Result<Vec<E>, DbError>>()?;
        Ok(QueryPage {
            items,
            cursor: next,
        })
    }

    pub(crate) fn read_record(&self, key: &Key) -> Option<(u64, serde_json::Value)> {
        self.entities
            .read()
            .get(key)
            .map(|r| (r.version, r.data.clone()))
    }

    /// Scan up to `limit` matches of `kind` after `cursor`; the flag tells
    /// whether more matches exist beyond them.
    pub(crate) fn scan(
        &self,
        kind: &str,
        filter: &Filter,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> (Vec<(Key, serde_json::Value)>, bool) {
        let start = match cursor {
            Some(c) => Bound::Excluded(c.key().clone()),
            None => Bound::Included(Key::new(kind, "")),
        };

        let store = self.entities.read();
        let mut matches = store
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.kind() == kind)
            .filter(|(_, record)| filter.matches(&record.data))
            .map(|(key, record)| (key.clone(), record.data.clone()));

        let batch: Vec<_> = matches.by_ref().take(limit).collect();
        let more = matches.next().is_some();
        (batch, more)
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish()
    }
}

fn write_atomically(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}
