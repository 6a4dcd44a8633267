use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

/// Opens the reporting database. One connection is held per top-level
/// operation and released when the owning scope drops it.
pub fn open_db(database: &Path) -> Result<Connection> {
    let conn = Connection::open(database)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    Ok(conn)
}

/// Catalog probe: does an object of the given kind ("table", "view",
/// "index") exist under this name?
pub fn object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ? AND name = ?)",
        (kind, name),
        |row| row.get(0),
    )?;
    Ok(found)
}
