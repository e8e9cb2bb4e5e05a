use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::schema::Table;

/// Failure of a storage operation. Every variant is fatal to the run.
#[derive(Debug)]
pub enum StoreError {
    /// A previous snapshot at the output path could not be removed.
    RemoveStale { path: PathBuf, source: io::Error },
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    Begin(rusqlite::Error),
    Schema {
        table: Table,
        source: rusqlite::Error,
    },
    Prepare {
        table: Table,
        source: rusqlite::Error,
    },
    Write {
        table: Table,
        source: rusqlite::Error,
    },
    Index {
        name: &'static str,
        source: rusqlite::Error,
    },
    Commit(rusqlite::Error),
    Rollback(rusqlite::Error),
    Close(rusqlite::Error),
}

impl StoreError {
    /// Name of the storage operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::RemoveStale { .. } => "remove stale snapshot",
            Self::Open { .. } => "open",
            Self::Begin(_) => "begin transaction",
            Self::Schema { .. } => "create table",
            Self::Prepare { .. } => "prepare insert",
            Self::Write { .. } => "insert row",
            Self::Index { .. } => "create index",
            Self::Commit(_) => "commit",
            Self::Rollback(_) => "rollback",
            Self::Close(_) => "close",
        }
    }

    pub fn sqlite(&self) -> Option<&rusqlite::Error> {
        match self {
            Self::RemoveStale { .. } => None,
            Self::Open { source, .. }
            | Self::Schema { source, .. }
            | Self::Prepare { source, .. }
            | Self::Write { source, .. }
            | Self::Index { source, .. } => Some(source),
            Self::Begin(source)
            | Self::Commit(source)
            | Self::Rollback(source)
            | Self::Close(source) => Some(source),
        }
    }

    /// Extended SQLite result code of the underlying failure, when SQLite produced one.
    pub fn sqlite_code(&self) -> Option<i32> {
        self.sqlite()
            .and_then(rusqlite::Error::sqlite_error)
            .map(|error| error.extended_code)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveStale { path, source } => {
                write!(f, "remove stale snapshot {}: {source}", path.display())?
            }
            Self::Open { path, source } => write!(f, "open {}: {source}", path.display())?,
            Self::Schema { table, source } => write!(f, "create table {table}: {source}")?,
            Self::Prepare { table, source } => write!(f, "prepare insert into {table}: {source}")?,
            Self::Write { table, source } => write!(f, "insert into {table}: {source}")?,
            Self::Index { name, source } => write!(f, "create index {name}: {source}")?,
            Self::Begin(source)
            | Self::Commit(source)
            | Self::Rollback(source)
            | Self::Close(source) => write!(f, "{}: {source}", self.operation())?,
        }
        if let Some(code) = self.sqlite_code() {
            write!(f, " (sqlite error code {code})")?;
        }
        Ok(())
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RemoveStale { source, .. } => Some(source),
            _ => self.sqlite().map(|error| error as &(dyn Error + 'static)),
        }
    }
}
