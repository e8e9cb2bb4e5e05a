use std::io;
use std::path::{Path, PathBuf};

use heapdb_types::{
    BlockingObject, HeapObject, ObjectAddress, ReferenceEdge, RootReference, ThreadId,
    TypeDescriptor, TypeIndex,
};
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::encode::{
    encode_blocking_reason, encode_root_kind, encode_thread_ids, flag, optional_id, size_to_sql,
    write_references,
};
use crate::error::StoreError;
use crate::schema::{ReferenceEncoding, Table, indexes_for};

/// Name written for types that objects referenced but the type pass never enumerated.
pub const UNRESOLVED_TYPE_NAME: &str = "<unresolved>";

/// Files SQLite may leave next to a database.
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Rows written to each table by one writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub types: u64,
    pub objects: u64,
    pub references: u64,
    pub roots: u64,
    pub blocking_objects: u64,
}

/// Owns the SQLite handle for one snapshot file.
pub struct SnapshotStore {
    path: PathBuf,
    conn: Connection,
}

impl SnapshotStore {
    /// Opens a fresh snapshot at `path`, deleting whatever was there first.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        remove_stale(&path)?;
        let conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "opened snapshot database");
        Ok(Self { path, conn })
    }

    /// Removes a snapshot and its sidecar files without opening anything.
    /// Missing files are not an error.
    pub fn discard(path: &Path) -> Result<(), StoreError> {
        remove_stale(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts the single write transaction. Schema and data both go through it.
    pub fn begin(&mut self, encoding: ReferenceEncoding) -> Result<SnapshotWriter<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)
            .map_err(StoreError::Begin)?;
        Ok(SnapshotWriter {
            tx,
            encoding,
            counts: RowCounts::default(),
            refs_text: String::new(),
        })
    }

    /// Read access for inspecting a committed snapshot.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Releases cached statements, then the handle.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.flush_prepared_statement_cache();
        self.conn
            .close()
            .map_err(|(_conn, source)| StoreError::Close(source))
    }
}

fn remove_stale(path: &Path) -> Result<(), StoreError> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in SIDECAR_SUFFIXES {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        candidates.push(PathBuf::from(sidecar));
    }
    for candidate in candidates {
        match std::fs::remove_file(&candidate) {
            Ok(()) => info!(path = %candidate.display(), "removed previous snapshot file"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::RemoveStale {
                    path: candidate,
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Writes one snapshot inside one transaction.
///
/// Dropping the writer without [`SnapshotWriter::commit`] rolls everything
/// back, tables included.
pub struct SnapshotWriter<'conn> {
    tx: Transaction<'conn>,
    encoding: ReferenceEncoding,
    counts: RowCounts,
    // Reused for the packed ObjRefs column.
    refs_text: String,
}

impl SnapshotWriter<'_> {
    pub fn encoding(&self) -> ReferenceEncoding {
        self.encoding
    }

    pub fn counts(&self) -> RowCounts {
        self.counts
    }

    /// Creates every table of the encoding. Stops at the first failure.
    pub fn create_schema(&self) -> Result<(), StoreError> {
        for table in Table::for_encoding(self.encoding) {
            self.tx
                .execute_batch(table.create_sql(self.encoding))
                .map_err(|source| StoreError::Schema { table, source })?;
            debug!(%table, "created table");
        }
        Ok(())
    }

    /// Compiles each insert statement once; rows reuse the cached statement.
    pub fn begin_bulk_load(&self) -> Result<(), StoreError> {
        for table in Table::for_encoding(self.encoding) {
            self.tx
                .prepare_cached(table.insert_sql(self.encoding))
                .map_err(|source| StoreError::Prepare { table, source })?;
        }
        debug!(encoding = %self.encoding, "insert statements prepared");
        Ok(())
    }

    fn execute(&self, table: Table, params: impl rusqlite::Params) -> Result<(), StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached(table.insert_sql(self.encoding))
            .map_err(|source| StoreError::Prepare { table, source })?;
        stmt.execute(params)
            .map_err(|source| StoreError::Write { table, source })?;
        Ok(())
    }

    /// Writes the object row and its references in the writer's encoding.
    /// `references` may be empty; that yields no edge rows and an empty `ObjRefs`.
    pub fn insert_object(
        &mut self,
        object: &HeapObject,
        references: &[ObjectAddress],
    ) -> Result<(), StoreError> {
        match self.encoding {
            ReferenceEncoding::EdgeTable => {
                self.execute(
                    Table::Objects,
                    params![object.address, object.type_index, size_to_sql(object.size)],
                )?;
                for target in references {
                    self.insert_reference(ReferenceEdge {
                        source: object.address,
                        target: *target,
                    })?;
                }
            }
            ReferenceEncoding::Packed => {
                let mut text = std::mem::take(&mut self.refs_text);
                text.clear();
                write_references(&mut text, references);
                let result = self.execute(
                    Table::Objects,
                    params![
                        object.address,
                        object.type_index,
                        size_to_sql(object.size),
                        text.as_str()
                    ],
                );
                self.refs_text = text;
                result?;
            }
        }
        self.counts.objects += 1;
        Ok(())
    }

    /// One `ObjectReferences` row. Targets are not checked against `Objects`.
    /// Fails with [`StoreError::Prepare`] on a packed snapshot, which has no edge table.
    pub fn insert_reference(&mut self, edge: ReferenceEdge) -> Result<(), StoreError> {
        self.execute(Table::ObjectReferences, params![edge.source, edge.target])?;
        self.counts.references += 1;
        Ok(())
    }

    pub fn insert_type(&mut self, ty: &TypeDescriptor, count: u64) -> Result<(), StoreError> {
        self.execute(
            Table::Types,
            params![
                ty.index,
                size_to_sql(count),
                size_to_sql(ty.base_size),
                ty.name.as_str()
            ],
        )?;
        self.counts.types += 1;
        Ok(())
    }

    /// Row for a type seen on objects but missing from the type enumeration.
    pub fn insert_unresolved_type(
        &mut self,
        index: TypeIndex,
        count: u64,
    ) -> Result<(), StoreError> {
        self.execute(
            Table::Types,
            params![
                index,
                size_to_sql(count),
                optional_id(None),
                UNRESOLVED_TYPE_NAME
            ],
        )?;
        self.counts.types += 1;
        Ok(())
    }

    pub fn insert_root(&mut self, root: &RootReference) -> Result<(), StoreError> {
        self.execute(
            Table::Roots,
            params![
                optional_id(root.type_index.map(TypeIndex::to_sql_integer)),
                root.object,
                root.address as i64,
                optional_id(root.app_domain.map(|domain| domain.to_sql_integer())),
                optional_id(root.thread.map(ThreadId::to_sql_integer)),
                flag(root.is_interior),
                flag(root.is_pinned),
                flag(root.is_possible_false_positive),
                encode_root_kind(root.kind),
                root.name.as_deref().unwrap_or_default(),
            ],
        )?;
        self.counts.roots += 1;
        Ok(())
    }

    pub fn insert_blocking_object(&mut self, blocking: &BlockingObject) -> Result<(), StoreError> {
        self.execute(
            Table::BlockingObjects,
            params![
                blocking.object,
                flag(blocking.taken),
                i64::from(blocking.recursion_count),
                optional_id(blocking.owner.map(ThreadId::to_sql_integer)),
                flag(blocking.has_single_owner),
                encode_thread_ids(&blocking.owners),
                encode_thread_ids(&blocking.waiters),
                encode_blocking_reason(blocking.reason),
            ],
        )?;
        self.counts.blocking_objects += 1;
        Ok(())
    }

    /// Builds the secondary indexes. Cheaper after the load than during it.
    pub fn create_indexes(&self) -> Result<(), StoreError> {
        for index in indexes_for(self.encoding) {
            self.tx
                .execute_batch(index.sql)
                .map_err(|source| StoreError::Index {
                    name: index.name,
                    source,
                })?;
            debug!(index = index.name, table = %index.table, "created index");
        }
        Ok(())
    }

    /// The snapshot becomes valid only once this returns `Ok`.
    pub fn commit(self) -> Result<RowCounts, StoreError> {
        let counts = self.counts;
        self.tx.commit().map_err(StoreError::Commit)?;
        Ok(counts)
    }

    /// Discards every table and row written through this writer.
    pub fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().map_err(StoreError::Rollback)
    }
}
