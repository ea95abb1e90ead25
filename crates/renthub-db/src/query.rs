//! Lazily paged queries with restartable cursors.

use std::collections::VecDeque;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::{Db, DbError, Entity, Filter, Key};

/// Opaque position in a query's result stream.
///
/// A cursor points just past the last entity returned; passing it back to
/// [`Db::query_page`] or [`Db::query_from`] resumes after that entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(Key);

impl Cursor {
    pub(crate) fn after(key: Key) -> Self {
        Self(key)
    }

    pub(crate) fn key(&self) -> &Key {
        &self.0
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct QueryPage<E> {
    /// Entities on this page.
    pub items: Vec<E>,
    /// Cursor for the next page, if more results may follow.
    pub cursor: Option<Cursor>,
}

impl<E> QueryPage<E> {
    /// Whether another page may be available.
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }
}

/// Iterator over the entities of one kind matching a filter.
///
/// Results are fetched from the store in batches as the iterator advances,
/// so entities committed after the query started may or may not be seen.
pub struct Query<'db, E> {
    db: &'db Db,
    filter: Filter,
    fetch_cursor: Option<Cursor>,
    position: Option<Cursor>,
    buffer: VecDeque<(Key, serde_json::Value)>,
    exhausted: bool,
    batch_size: usize,
    _marker: PhantomData<E>,
}

impl<'db, E: Entity> Query<'db, E> {
    pub(crate) fn new(db: &'db Db, filter: Filter, cursor: Option<Cursor>) -> Self {
        Self {
            db,
            filter,
            fetch_cursor: cursor.clone(),
            position: cursor,
            buffer: VecDeque::new(),
            exhausted: false,
            batch_size: db.options().query_batch_size.max(1),
            _marker: PhantomData,
        }
    }

    /// Override the fetch batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Cursor positioned after the last entity yielded so far.
    pub fn cursor(&self) -> Option<Cursor> {
        self.position.clone()
    }

    /// Collect only the keys of the remaining results.
    pub fn keys(self) -> Result<Vec<Key>, DbError> {
        let mut keys: Vec<Key> = self.buffer.into_iter().map(|(key, _)| key).collect();
        if self.exhausted {
            return Ok(keys);
        }
        let mut cursor = self.fetch_cursor;
        loop {
            let (batch, more) =
                self.db
                    .scan(E::KIND, &self.filter, self.batch_size, cursor.as_ref());
            if let Some((key, _)) = batch.last() {
                cursor = Some(Cursor::after(key.clone()));
            }
            keys.extend(batch.into_iter().map(|(key, _)| key));
            if !more {
                return Ok(keys);
            }
        }
    }

    fn fill(&mut self) {
        let (batch, more) =
            self.db
                .scan(E::KIND, &self.filter, self.batch_size, self.fetch_cursor.as_ref());
        if let Some((key, _)) = batch.last() {
            self.fetch_cursor = Some(Cursor::after(key.clone()));
        }
        self.exhausted = !more;
        self.buffer.extend(batch);
    }
}

impl<E: Entity> Iterator for Query<'_, E> {
    type Item = Result<E, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill();
        }
        let (key, data) = self.buffer.pop_front()?;
        self.position = Some(Cursor::after(key));
        Some(serde_json::from_value(data).map_err(DbError::from))
    }
}
