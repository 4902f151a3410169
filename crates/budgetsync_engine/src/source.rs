//! Entity readers over the primary store.
//!
//! An [`EntitySource`] serves pages of one entity table ordered by id; an
//! [`EntityReader`] walks those pages lazily so a run never holds more than
//! one page per kind in memory. Readers are restartable: each call to
//! [`EntitySource::reader`] starts again from the first row.

use budgetsync_protocol::{EntityKind, RawRecord};
use budgetsync_store::PrimaryDatabase;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{StoreSide, SyncError, SyncResult};

/// Read access to the primary store's entity tables.
pub trait EntitySource {
    /// Reads up to `limit` rows of `kind` with id above `after_id`, in id
    /// order. `None` starts at the first row.
    fn read_page(
        &self,
        kind: EntityKind,
        after_id: Option<i64>,
        limit: usize,
    ) -> SyncResult<Vec<RawRecord>>;

    /// Releases the connection. Further reads fail.
    fn close(&mut self) -> SyncResult<()>;

    /// A fresh reader over every row of `kind`.
    fn reader(&self, kind: EntityKind, page_size: usize) -> EntityReader<'_, Self>
    where
        Self: Sized,
    {
        EntityReader::new(self, kind, page_size)
    }
}

/// Opens a primary-store handle for one run.
pub trait SourceConnector {
    /// Handle type.
    type Source: EntitySource;

    /// Connects. Failure aborts the run before anything is dispatched.
    fn connect(&self) -> SyncResult<Self::Source>;
}

/// Lazy, paged iteration over one entity table.
///
/// Yields pages; [`EntityReader::records`] flattens them. Iteration stops
/// after the first error.
pub struct EntityReader<'a, S: EntitySource> {
    source: &'a S,
    kind: EntityKind,
    page_size: usize,
    after_id: Option<i64>,
    done: bool,
}

impl<'a, S: EntitySource> EntityReader<'a, S> {
    /// Creates a reader positioned before the first row.
    pub fn new(source: &'a S, kind: EntityKind, page_size: usize) -> Self {
        Self {
            source,
            kind,
            page_size: page_size.max(1),
            after_id: None,
            done: false,
        }
    }

    /// Entity kind being read.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Iterates individual records instead of pages.
    pub fn records(self) -> impl Iterator<Item = SyncResult<RawRecord>> + 'a
    where
        S: 'a,
    {
        self.flat_map(|page| match page {
            Ok(records) => records.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })
    }
}

impl<S: EntitySource> Iterator for EntityReader<'_, S> {
    type Item = SyncResult<Vec<RawRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page = match self.source.read_page(self.kind, self.after_id, self.page_size) {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let last_id = page.iter().filter_map(RawRecord::id).max();
        match last_id {
            Some(id) if page.len() >= self.page_size => self.after_id = Some(id),
            _ => self.done = true,
        }

        if page.is_empty() {
            None
        } else {
            Some(Ok(page))
        }
    }
}

/// A read-only SQLite primary store.
pub struct SqliteSource {
    db: Option<PrimaryDatabase>,
}

impl SqliteSource {
    /// Wraps an open database.
    pub fn new(db: PrimaryDatabase) -> Self {
        Self { db: Some(db) }
    }

    fn db(&self, kind: EntityKind) -> SyncResult<&PrimaryDatabase> {
        self.db
            .as_ref()
            .ok_or_else(|| SyncError::read(kind, "primary store connection is closed"))
    }
}

impl EntitySource for SqliteSource {
    fn read_page(
        &self,
        kind: EntityKind,
        after_id: Option<i64>,
        limit: usize,
    ) -> SyncResult<Vec<RawRecord>> {
        let db = self.db(kind)?;
        db.read_page(kind, after_id, limit).map_err(|e| {
            if e.is_connection_error() {
                SyncError::ConnectionLost {
                    store: StoreSide::Primary,
                    message: e.to_string(),
                }
            } else {
                SyncError::read(kind, e.to_string())
            }
        })
    }

    fn close(&mut self) -> SyncResult<()> {
        if let Some(db) = self.db.take() {
            db.close()
                .map_err(|e| SyncError::connection(StoreSide::Primary, e.to_string()))?;
            debug!("Primary store closed");
        }
        Ok(())
    }
}

/// Opens the primary SQLite file read-only for each run.
#[derive(Debug, Clone)]
pub struct SqliteSourceConnector {
    path: PathBuf,
}

impl SqliteSourceConnector {
    /// Connector for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Database path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceConnector for SqliteSourceConnector {
    type Source = SqliteSource;

    fn connect(&self) -> SyncResult<SqliteSource> {
        let db = PrimaryDatabase::open_read_only(&self.path)
            .map_err(|e| SyncError::connection(StoreSide::Primary, e.to_string()))?;
        debug!(path = %self.path.display(), "Primary store opened");
        Ok(SqliteSource::new(db))
    }
}

#[derive(Default)]
struct MemoryTables {
    tables: BTreeMap<EntityKind, Vec<RawRecord>>,
    missing: BTreeSet<EntityKind>,
}

/// In-memory primary store for tests.
///
/// Clones share the same tables. Acts as its own connector; every connect
/// hands out another clone.
#[derive(Clone, Default)]
pub struct MemorySource {
    tables: Arc<RwLock<MemoryTables>>,
    unreachable: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl MemorySource {
    /// Creates an empty store with every table present.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row to `kind`'s table.
    pub fn insert(&self, kind: EntityKind, record: RawRecord) {
        let mut tables = self.tables.write();
        tables.missing.remove(&kind);
        tables.tables.entry(kind).or_default().push(record);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(self, kind: EntityKind, record: RawRecord) -> Self {
        self.insert(kind, record);
        self
    }

    /// Drops `kind`'s table so reads fail.
    pub fn drop_table(&self, kind: EntityKind) {
        let mut tables = self.tables.write();
        tables.tables.remove(&kind);
        tables.missing.insert(kind);
    }

    /// Makes subsequent connects fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Handles closed so far.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Rows currently stored for `kind`.
    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.tables.read().tables.get(&kind).map_or(0, Vec::len)
    }
}

impl EntitySource for MemorySource {
    fn read_page(
        &self,
        kind: EntityKind,
        after_id: Option<i64>,
        limit: usize,
    ) -> SyncResult<Vec<RawRecord>> {
        if self.closed {
            return Err(SyncError::read(kind, "primary store connection is closed"));
        }
        let tables = self.tables.read();
        if tables.missing.contains(&kind) {
            return Err(SyncError::read(kind, format!("no such table: {}", kind.table())));
        }

        let mut rows: Vec<RawRecord> = tables
            .tables
            .get(&kind)
            .map(|rows| {
                rows.iter()
                    .filter(|row| match (after_id, row.id()) {
                        (None, _) => true,
                        (Some(after), Some(id)) => id > after,
                        (Some(_), None) => false,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|row| row.id());
        rows.truncate(limit);
        Ok(rows)
    }

    fn close(&mut self) -> SyncResult<()> {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl SourceConnector for MemorySource {
    type Source = MemorySource;

    fn connect(&self) -> SyncResult<MemorySource> {
        if self.unreachable.load(Ordering::SeqCst) {
            warn!("Memory source is unreachable");
            return Err(SyncError::connection(StoreSide::Primary, "source unreachable"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let mut handle = self.clone();
        handle.closed = false;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> RawRecord {
        RawRecord::new().with("id", id).with("username", format!("user{id}"))
    }

    #[test]
    fn reader_pages_in_id_order() {
        let source = MemorySource::new();
        for id in [5, 1, 4, 2, 3] {
            source.insert(EntityKind::User, user(id));
        }

        let pages: Vec<Vec<RawRecord>> = source
            .reader(EntityKind::User, 2)
            .collect::<SyncResult<_>>()
            .unwrap();
        let ids: Vec<Vec<i64>> = pages
            .iter()
            .map(|page| page.iter().filter_map(RawRecord::id).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn reader_is_restartable() {
        let source = MemorySource::new().with(EntityKind::Budget, user(1));
        let first: Vec<_> = source.reader(EntityKind::Budget, 10).records().collect();
        let second: Vec<_> = source.reader(EntityKind::Budget, 10).records().collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_table_yields_nothing() {
        let source = MemorySource::new();
        assert_eq!(source.reader(EntityKind::Expense, 10).count(), 0);
    }

    #[test]
    fn missing_table_is_a_read_error() {
        let source = MemorySource::new();
        source.drop_table(EntityKind::Expense);
        let mut reader = source.reader(EntityKind::Expense, 10);
        assert!(matches!(reader.next(), Some(Err(SyncError::Read { .. }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn connector_tracks_handles() {
        let source = MemorySource::new();
        let mut handle = source.connect().unwrap();
        handle.close().unwrap();
        handle.close().unwrap();
        assert_eq!(source.connect_count(), 1);
        assert_eq!(source.close_count(), 1);
        assert!(handle.read_page(EntityKind::User, None, 1).is_err());

        source.set_unreachable(true);
        assert!(matches!(
            source.connect(),
            Err(SyncError::Connection {
                store: StoreSide::Primary,
                ..
            })
        ));
    }

    #[test]
    fn sqlite_source_reads_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.db");
        {
            let db = PrimaryDatabase::create(&path).unwrap();
            for name in ["ana", "ben", "cy"] {
                db.insert_user(&budgetsync_store::NewUser {
                    username: name.into(),
                    email: format!("{name}@example.com"),
                    password: "hash".into(),
                    created_at: None,
                })
                .unwrap();
            }
            db.close().unwrap();
        }

        let connector = SqliteSourceConnector::new(&path);
        let mut source = connector.connect().unwrap();
        let records: Vec<RawRecord> = source
            .reader(EntityKind::User, 2)
            .records()
            .collect::<SyncResult<_>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].id(), Some(3));

        source.close().unwrap();
        assert!(source.read_page(EntityKind::User, None, 10).is_err());
    }

    #[test]
    fn sqlite_connector_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteSourceConnector::new(dir.path().join("absent.db"));
        assert!(matches!(
            connector.connect(),
            Err(SyncError::Connection {
                store: StoreSide::Primary,
                ..
            })
        ));
    }
}
