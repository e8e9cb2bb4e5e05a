use std::path::Path;

use heapdb_types::{
    BlockingObject, BlockingReason, ObjectAddress, RootKind, RootReference, ThreadId,
    TypeDescriptor, TypeIndex,
};
use rusqlite::Connection;

use crate::source::MemoryHeap;
use crate::source::ExportError;
use crate::{
    CaptureConfig, CaptureError, ReferenceEncoding, StoreError, capture, capture_export,
};

const A: u64 = 0x1000;
const B: u64 = 0x1020;
const C: u64 = 0x1040;

fn addr(value: u64) -> ObjectAddress {
    ObjectAddress::new(value)
}

fn t(index: u32) -> TypeIndex {
    TypeIndex::new(index)
}

/// A→B, C→A, C→B over two types.
fn three_object_heap() -> MemoryHeap {
    let mut heap = MemoryHeap::new();
    heap.add_type(TypeDescriptor::new(t(1), "T1", 24))
        .add_type(TypeDescriptor::new(t(2), "T2", 40))
        .add_object(addr(A), t(1), vec![addr(B)])
        .add_object(addr(B), t(1), vec![])
        .add_object(addr(C), t(2), vec![addr(A), addr(B)]);
    heap
}

fn rows<T: rusqlite::types::FromSql>(conn: &Connection, sql: &str) -> Vec<T> {
    let mut stmt = conn.prepare(sql).expect(sql);
    stmt.query_map([], |row| row.get(0))
        .expect(sql)
        .collect::<Result<_, _>>()
        .expect(sql)
}

fn table_names(path: &Path) -> Vec<String> {
    let conn = Connection::open(path).expect("reopen snapshot");
    rows(
        &conn,
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
}

/// Every row of every table, rendered as text, for whole-file comparisons.
fn dump(path: &Path) -> Vec<String> {
    let conn = Connection::open(path).expect("reopen snapshot");
    let mut out = Vec::new();
    for (table, order) in [
        ("Types", "TypeIndex"),
        ("Objects", "ObjectId"),
        ("ObjectReferences", "ObjectId, ObjectReference"),
        ("Roots", "ObjectId"),
        ("BlockingObjects", "ObjectId"),
    ] {
        let sql = format!("SELECT * FROM {table} ORDER BY {order}");
        let mut stmt = conn.prepare(&sql).expect(&sql);
        let width = stmt.column_count();
        let mut query = stmt.query([]).expect(&sql);
        while let Some(row) = query.next().expect(&sql) {
            let cells: Vec<String> = (0..width)
                .map(|i| match row.get_ref(i).expect("cell") {
                    rusqlite::types::ValueRef::Null => "NULL".to_string(),
                    rusqlite::types::ValueRef::Integer(v) => v.to_string(),
                    rusqlite::types::ValueRef::Real(v) => v.to_string(),
                    rusqlite::types::ValueRef::Text(v) => String::from_utf8_lossy(v).into_owned(),
                    rusqlite::types::ValueRef::Blob(v) => format!("{v:?}"),
                })
                .collect();
            out.push(format!("{table}|{}", cells.join("|")));
        }
    }
    out
}

#[test]
fn three_object_heap_produces_expected_tables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let summary = capture(&three_object_heap(), &path, &CaptureConfig::default()).expect("capture");

    assert_eq!(summary.rows.types, 2);
    assert_eq!(summary.rows.objects, 3);
    assert_eq!(summary.rows.references, 3);
    assert_eq!(summary.skipped_objects, 0);

    let conn = Connection::open(&path).expect("reopen");
    let types: Vec<(i64, i64, i64, String)> = conn
        .prepare("SELECT TypeIndex, Count, Size, Name FROM Types ORDER BY TypeIndex")
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("types");
    assert_eq!(
        types,
        [(1, 2, 24, "T1".to_string()), (2, 1, 40, "T2".to_string())]
    );

    let edges: Vec<(i64, i64)> = conn
        .prepare(
            "SELECT ObjectId, ObjectReference FROM ObjectReferences
             ORDER BY ObjectId, ObjectReference",
        )
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("edges");
    assert_eq!(
        edges,
        [(A as i64, B as i64), (C as i64, A as i64), (C as i64, B as i64)]
    );
}

#[test]
fn type_counts_match_object_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let mut heap = three_object_heap();
    for i in 0..50 {
        heap.add_object(addr(0x10_0000 + i * 0x20), t(2), vec![]);
    }
    capture(&heap, &path, &CaptureConfig::default()).expect("capture");

    let conn = Connection::open(&path).expect("reopen");
    let mismatches: Vec<i64> = rows(
        &conn,
        "SELECT t.TypeIndex FROM Types t \
         WHERE t.Count != (SELECT COUNT(*) FROM Objects o WHERE o.TypeIndex = t.TypeIndex)",
    );
    assert!(mismatches.is_empty(), "{mismatches:?}");
    let orphans: Vec<i64> = rows(
        &conn,
        "SELECT ObjectId FROM Objects WHERE TypeIndex NOT IN (SELECT TypeIndex FROM Types)",
    );
    assert!(orphans.is_empty());
}

#[test]
fn unresolvable_objects_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let mut heap = three_object_heap();
    heap.add_unresolved_object(addr(0xdead_0000));

    let summary = capture(&heap, &path, &CaptureConfig::default()).expect("capture");
    assert_eq!(summary.skipped_objects, 1);
    assert_eq!(summary.rows.objects, 3);

    let conn = Connection::open(&path).expect("reopen");
    let ids: Vec<i64> = rows(&conn, "SELECT ObjectId FROM Objects ORDER BY ObjectId");
    assert_eq!(ids, [A as i64, B as i64, C as i64]);
}

#[test]
fn unowned_lock_and_unknown_tags_use_sentinels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let mut heap = three_object_heap();
    let mut waited = BlockingObject::new(addr(A), BlockingReason::Unrecognized);
    waited.waiters = vec![ThreadId::new(7), ThreadId::new(9)];
    heap.add_blocking_object(waited)
        .add_root(RootReference::new(addr(C), 0x7ffe_0010, RootKind::Unrecognized))
        .add_root(RootReference::new(addr(B), 0x7ffe_0018, RootKind::Pinning));

    let summary = capture(&heap, &path, &CaptureConfig::default()).expect("capture");
    assert_eq!(summary.unrecognized_root_kinds, 1);
    assert_eq!(summary.unrecognized_blocking_reasons, 1);

    let conn = Connection::open(&path).expect("reopen");
    let lock: (i64, String, String, String) = conn
        .query_row(
            "SELECT Owner, ThreadOwnerIds, ThreadWaiterIds, BlockingReason FROM BlockingObjects",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .expect("blocking row");
    assert_eq!(
        lock,
        (-1, "-1".to_string(), "7,9".to_string(), "Unknown".to_string())
    );

    let kinds: Vec<String> = rows(&conn, "SELECT GCRootKind FROM Roots ORDER BY ObjectId");
    assert_eq!(kinds, ["Pinning", "Unknown"]);
}

#[test]
fn rerun_replaces_file_with_identical_contents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let mut heap = three_object_heap();
    heap.add_root(RootReference::new(addr(A), 0x7ffe_0000, RootKind::StaticVar));

    capture(&heap, &path, &CaptureConfig::default()).expect("first capture");
    let first = dump(&path);
    capture(&heap, &path, &CaptureConfig::default()).expect("second capture");
    let second = dump(&path);

    assert_eq!(first, second);
    assert!(first.contains(&"Types|1|2|24|T1".to_string()), "{first:?}");
}

#[test]
fn unwalkable_heap_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let mut heap = three_object_heap();
    heap.mark_unwalkable();

    let err = capture(&heap, &path, &CaptureConfig::default()).expect_err("must refuse");
    assert!(matches!(err, CaptureError::HeapNotWalkable));
    assert!(!path.exists());
}

#[test]
fn unwalkable_rerun_removes_previous_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    capture(&three_object_heap(), &path, &CaptureConfig::default()).expect("good capture");
    assert_eq!(table_names(&path).len(), 5);

    let mut heap = three_object_heap();
    heap.mark_unwalkable();
    let err = capture(&heap, &path, &CaptureConfig::default()).expect_err("must refuse");
    assert!(matches!(err, CaptureError::HeapNotWalkable));
    assert!(!path.exists());
}

#[test]
fn progress_interval_does_not_change_the_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut dumps = Vec::new();
    for progress_every in [0, 1, 2, u64::MAX] {
        let path = dir.path().join(format!("heap-{progress_every}.sqlite"));
        let config = CaptureConfig {
            progress_every,
            ..CaptureConfig::default()
        };
        let summary = capture(&three_object_heap(), &path, &config).expect("capture");
        assert_eq!(summary.rows.objects, 3);
        dumps.push(dump(&path));
    }
    assert!(dumps.windows(2).all(|pair| pair[0] == pair[1]));
}

const EXPORT: &str = r#"{ "runtimes": [ {
    "types": [ { "index": 1, "name": "T1", "base_size": 24 } ],
    "objects": [
        { "address": 4096, "type_index": 1, "references": [4128] },
        { "address": 4128, "type_index": 1 }
    ],
    "roots": [ { "object": 4096, "address": 8192 } ]
} ] }"#;

#[test]
fn export_file_is_captured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("heap.json");
    let output = dir.path().join("heap.sqlite");
    std::fs::write(&input, EXPORT).expect("write export");

    let summary =
        capture_export(&input, 0, &output, &CaptureConfig::default()).expect("capture export");
    assert_eq!(summary.rows.objects, 2);
    assert_eq!(summary.rows.references, 1);
    assert_eq!(summary.unrecognized_root_kinds, 1);
}

#[test]
fn rejected_export_removes_previous_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("heap.json");
    let output = dir.path().join("heap.sqlite");
    capture(&three_object_heap(), &output, &CaptureConfig::default()).expect("good capture");
    assert!(output.exists());

    std::fs::write(&input, "{ \"runtimes\": [").expect("write truncated export");
    let err = capture_export(&input, 0, &output, &CaptureConfig::default())
        .expect_err("truncated export");
    assert!(matches!(err, CaptureError::Export(ExportError::Decode(_))), "{err}");
    assert!(!output.exists());

    let missing = dir.path().join("missing.json");
    let err = capture_export(&missing, 0, &output, &CaptureConfig::default())
        .expect_err("missing export");
    assert!(matches!(err, CaptureError::Export(ExportError::Read { .. })), "{err}");
}

#[test]
fn failed_load_leaves_no_tables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let mut heap = three_object_heap();
    // Same address twice violates the Objects primary key mid-pass.
    heap.add_object(addr(A), t(1), vec![]);

    let err = capture(&heap, &path, &CaptureConfig::default()).expect_err("duplicate object");
    match err {
        CaptureError::Store(StoreError::Write { table, .. }) => {
            assert_eq!(table, heapdb_sqlite::Table::Objects);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(table_names(&path).is_empty());
}

#[test]
fn failed_rerun_discards_previous_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    capture(&three_object_heap(), &path, &CaptureConfig::default()).expect("good capture");
    assert!(!table_names(&path).is_empty());

    let mut broken = three_object_heap();
    broken.add_object(addr(B), t(1), vec![]);
    capture(&broken, &path, &CaptureConfig::default()).expect_err("duplicate object");
    assert!(table_names(&path).is_empty());
}

#[test]
fn packed_encoding_keeps_references_on_the_object_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let config = CaptureConfig {
        encoding: ReferenceEncoding::Packed,
        ..CaptureConfig::default()
    };
    let summary = capture(&three_object_heap(), &path, &config).expect("capture");
    assert_eq!(summary.rows.references, 0);

    let conn = Connection::open(&path).expect("reopen");
    let refs: Vec<String> = rows(&conn, "SELECT ObjRefs FROM Objects ORDER BY ObjectId");
    assert_eq!(refs, [B.to_string(), String::new(), format!("{A},{B}")]);
    assert!(!table_names(&path).contains(&"ObjectReferences".to_string()));
}

#[test]
fn types_missing_from_enumeration_get_placeholders() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heap.sqlite");
    let mut heap = three_object_heap();
    heap.add_sized_object(addr(0x2000), t(5), 64, vec![])
        .add_sized_object(addr(0x2040), t(5), 64, vec![])
        .add_type(TypeDescriptor::new(t(1), "T1 again", 24));

    let config = CaptureConfig {
        index_references: false,
        ..CaptureConfig::default()
    };
    let summary = capture(&heap, &path, &config).expect("capture");
    assert_eq!(summary.unresolved_types, 1);
    assert_eq!(summary.duplicate_types, 1);
    assert_eq!(summary.rows.types, 3);

    let conn = Connection::open(&path).expect("reopen");
    let names: Vec<String> = rows(&conn, "SELECT Name FROM Types ORDER BY TypeIndex");
    assert_eq!(names, ["T1", "T2", heapdb_sqlite::UNRESOLVED_TYPE_NAME]);
    let sizes: Vec<i64> = rows(&conn, "SELECT Size FROM Objects WHERE TypeIndex = 5");
    assert_eq!(sizes, [64, 64]);
    let indexes: Vec<String> = rows(
        &conn,
        "SELECT name FROM sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%'",
    );
    assert!(indexes.is_empty());
}
