//! Fixed table set of a heap snapshot file.

use std::fmt;

/// How the object graph is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceEncoding {
    /// `ObjectReferences` holds one row per (object, reference) pair.
    #[default]
    EdgeTable,
    /// `Objects.ObjRefs` holds the references as comma-delimited text.
    Packed,
}

impl ReferenceEncoding {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "edges" | "edge-table" => Some(Self::EdgeTable),
            "packed" => Some(Self::Packed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EdgeTable => "edges",
            Self::Packed => "packed",
        }
    }
}

impl fmt::Display for ReferenceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Types,
    Objects,
    ObjectReferences,
    Roots,
    BlockingObjects,
}

impl Table {
    const ALL: [Self; 5] = [
        Self::Objects,
        Self::Types,
        Self::ObjectReferences,
        Self::Roots,
        Self::BlockingObjects,
    ];

    /// Tables present in a snapshot with the given encoding, in creation order.
    pub fn for_encoding(encoding: ReferenceEncoding) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |table| table.exists_in(encoding))
    }

    pub fn exists_in(self, encoding: ReferenceEncoding) -> bool {
        !(self == Self::ObjectReferences && encoding == ReferenceEncoding::Packed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Types => "Types",
            Self::Objects => "Objects",
            Self::ObjectReferences => "ObjectReferences",
            Self::Roots => "Roots",
            Self::BlockingObjects => "BlockingObjects",
        }
    }

    pub fn create_sql(self, encoding: ReferenceEncoding) -> &'static str {
        match (self, encoding) {
            (Self::Types, _) => {
                "CREATE TABLE Types(
                    TypeIndex INTEGER PRIMARY KEY,
                    Count INTEGER,
                    Size INTEGER,
                    Name TEXT
                );"
            }
            (Self::Objects, ReferenceEncoding::EdgeTable) => {
                "CREATE TABLE Objects(
                    ObjectId INTEGER PRIMARY KEY,
                    TypeIndex INTEGER,
                    Size INTEGER
                );"
            }
            (Self::Objects, ReferenceEncoding::Packed) => {
                "CREATE TABLE Objects(
                    ObjectId INTEGER PRIMARY KEY,
                    TypeIndex INTEGER,
                    Size INTEGER,
                    ObjRefs TEXT
                );"
            }
            // ObjectId is deliberately not a key: k references give k rows.
            (Self::ObjectReferences, _) => {
                "CREATE TABLE ObjectReferences(ObjectId INTEGER, ObjectReference INTEGER);"
            }
            (Self::Roots, _) => {
                "CREATE TABLE Roots(
                    TypeIndex INTEGER,
                    ObjectId INTEGER,
                    Address INTEGER,
                    AppDomainId INTEGER,
                    ManagedThreadId INTEGER,
                    IsInterior BOOLEAN,
                    IsPinned BOOLEAN,
                    IsPossibleFalsePositive BOOLEAN,
                    GCRootKind TEXT,
                    Name TEXT
                );"
            }
            (Self::BlockingObjects, _) => {
                "CREATE TABLE BlockingObjects(
                    ObjectId INTEGER,
                    Taken BOOLEAN,
                    RecursionCount INTEGER,
                    Owner INTEGER,
                    HasSingleOwner BOOLEAN,
                    ThreadOwnerIds TEXT,
                    ThreadWaiterIds TEXT,
                    BlockingReason TEXT
                );"
            }
        }
    }

    pub fn insert_sql(self, encoding: ReferenceEncoding) -> &'static str {
        match (self, encoding) {
            (Self::Types, _) => {
                "INSERT INTO Types(TypeIndex, Count, Size, Name) VALUES (?1, ?2, ?3, ?4)"
            }
            (Self::Objects, ReferenceEncoding::EdgeTable) => {
                "INSERT INTO Objects(ObjectId, TypeIndex, Size) VALUES (?1, ?2, ?3)"
            }
            (Self::Objects, ReferenceEncoding::Packed) => {
                "INSERT INTO Objects(ObjectId, TypeIndex, Size, ObjRefs) VALUES (?1, ?2, ?3, ?4)"
            }
            (Self::ObjectReferences, _) => {
                "INSERT INTO ObjectReferences(ObjectId, ObjectReference) VALUES (?1, ?2)"
            }
            (Self::Roots, _) => {
                "INSERT INTO Roots(
                    TypeIndex, ObjectId, Address, AppDomainId, ManagedThreadId,
                    IsInterior, IsPinned, IsPossibleFalsePositive, GCRootKind, Name
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            }
            (Self::BlockingObjects, _) => {
                "INSERT INTO BlockingObjects(
                    ObjectId, Taken, RecursionCount, Owner, HasSingleOwner,
                    ThreadOwnerIds, ThreadWaiterIds, BlockingReason
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            }
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Secondary index built after the bulk load, before commit.
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub name: &'static str,
    pub table: Table,
    pub sql: &'static str,
}

const INDEXES: [IndexSpec; 3] = [
    IndexSpec {
        name: "ObjectsByType",
        table: Table::Objects,
        sql: "CREATE INDEX ObjectsByType ON Objects(TypeIndex);",
    },
    IndexSpec {
        name: "ObjectReferencesBySource",
        table: Table::ObjectReferences,
        sql: "CREATE INDEX ObjectReferencesBySource ON ObjectReferences(ObjectId);",
    },
    IndexSpec {
        name: "ObjectReferencesByTarget",
        table: Table::ObjectReferences,
        sql: "CREATE INDEX ObjectReferencesByTarget ON ObjectReferences(ObjectReference);",
    },
];

pub fn indexes_for(encoding: ReferenceEncoding) -> impl Iterator<Item = IndexSpec> {
    INDEXES
        .into_iter()
        .filter(move |index| index.table.exists_in(encoding))
}
