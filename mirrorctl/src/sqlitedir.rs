//! SQLite-backed implementation of `Directory`
//!
//! Every entry is one row of the `entries` table, its bytes stored as a
//! BLOB. This is the slow, persistent store that `mirrorctl` mirrors.

use mirrordir::io::LockTable;
use mirrordir::{Directory, EntryLock, EntryReader, EntryWriter, Result, StoreError};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Connection shared between the directory and its open writers;
/// `None` once the directory is closed
type SharedConnection = Arc<Mutex<Option<Connection>>>;

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn with_conn<T>(
    conn: &SharedConnection,
    f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> Result<T> {
    let guard = conn.lock();
    let conn = guard.as_ref().ok_or(StoreError::Closed)?;
    f(conn).map_err(backend)
}

/// SQLite-backed directory
pub struct SqliteDirectory {
    db_path: String,
    conn: SharedConnection,
    locks: LockTable,
}

impl SqliteDirectory {
    /// Open the database at the given path
    ///
    /// Creates the database and table if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or table creation fails.
    pub fn open<P: AsRef<Path>>(db_path: P) -> std::result::Result<Self, rusqlite::Error> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();
        let conn = Connection::open(&db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                name TEXT PRIMARY KEY,
                data BLOB NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(Some(conn))),
            locks: LockTable::new(),
        })
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        with_conn(&self.conn, |conn| {
            conn.query_row(
                "SELECT data FROM entries WHERE name = ?",
                params![name],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })?
        .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

impl Directory for SqliteDirectory {
    type Writer = SqliteWriter;

    async fn list(&self) -> Result<Vec<String>> {
        with_conn(&self.conn, |conn| {
            let mut stmt = conn.prepare("SELECT name FROM entries ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    async fn size(&self, name: &str) -> Result<u64> {
        with_conn(&self.conn, |conn| {
            conn.query_row(
                "SELECT length(data) FROM entries WHERE name = ?",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()
        })?
        .map(|len| u64::try_from(len).unwrap_or(0))
        .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn open_read(&self, name: &str) -> Result<EntryReader> {
        Ok(EntryReader::new(name, self.load(name)?))
    }

    async fn open_write(&self, name: &str) -> Result<SqliteWriter> {
        if self.conn.lock().is_none() {
            return Err(StoreError::Closed);
        }
        Ok(SqliteWriter {
            name: name.to_string(),
            data: Vec::new(),
            conn: Arc::clone(&self.conn),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let removed = with_conn(&self.conn, |conn| {
            conn.execute("DELETE FROM entries WHERE name = ?", params![name])
        })?;
        if removed == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let moved = with_conn(&self.conn, |conn| {
            let tx = conn.unchecked_transaction()?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM entries WHERE name = ?",
                    params![from],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if exists {
                tx.execute("DELETE FROM entries WHERE name = ?", params![to])?;
                tx.execute(
                    "UPDATE entries SET name = ? WHERE name = ?",
                    params![to, from],
                )?;
            }
            tx.commit()?;
            Ok(exists)
        })?;
        if !moved {
            return Err(StoreError::NotFound(from.to_string()));
        }
        Ok(())
    }

    async fn acquire_lock(&self, name: &str) -> Result<EntryLock> {
        self.locks.acquire(name)
    }

    async fn sync(&self, _names: &[String]) -> Result<()> {
        // Every statement commits on its own
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        match conn {
            Some(conn) => conn.close().map_err(|(_, e)| backend(e)),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("SqliteDirectory({})", self.db_path)
    }
}

/// Writer that stores the whole entry in one statement on `finish()`
pub struct SqliteWriter {
    name: String,
    data: Vec<u8>,
    conn: SharedConnection,
}

impl EntryWriter for SqliteWriter {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.data.len() as u64
    }

    fn checksum(&self) -> u32 {
        crc32c::crc32c(&self.data)
    }

    async fn finish(self) -> Result<()> {
        with_conn(&self.conn, |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO entries (name, data) VALUES (?, ?)",
                params![self.name, self.data],
            )
        })?;
        Ok(())
    }
}
