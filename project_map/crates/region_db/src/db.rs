use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::RegionDbError;
use crate::region::RegionRepo;
use crate::schema;
use crate::user::UserRepo;

/// Database handle wrapping a SQLite connection shared across tasks.
pub struct RegionDb {
    conn: Mutex<Connection>,
}

impl RegionDb {
    /// Open (or create) a database at the given file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegionDbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::create_tables(&conn)?;
        tracing::info!(path = %path.display(), "region database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, RegionDbError> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against the region repository while holding the connection.
    pub fn regions<T>(&self, f: impl FnOnce(RegionRepo<'_>) -> Result<T, RegionDbError>) -> Result<T, RegionDbError> {
        let conn = self.conn.lock().map_err(|_| RegionDbError::Poisoned)?;
        f(RegionRepo::new(&conn))
    }

    pub fn users<T>(&self, f: impl FnOnce(UserRepo<'_>) -> Result<T, RegionDbError>) -> Result<T, RegionDbError> {
        let conn = self.conn.lock().map_err(|_| RegionDbError::Poisoned)?;
        f(UserRepo::new(&conn))
    }
}

#[cfg(test)]
impl RegionDb {
    pub(crate) fn conn_for_test(&self, f: impl FnOnce(&Connection)) {
        f(&self.conn.lock().unwrap());
    }
}
