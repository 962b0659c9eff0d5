use rusqlite::Connection;

use crate::error::RegionDbError;

pub fn create_tables(conn: &Connection) -> Result<(), RegionDbError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS regions (
            id                  TEXT PRIMARY KEY,
            data                TEXT NOT NULL,
            city                TEXT NOT NULL DEFAULT '',
            username            TEXT NOT NULL DEFAULT '',
            buildings           INTEGER NOT NULL DEFAULT 0,
            search_display_name TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS users (
            sso_id         TEXT PRIMARY KEY,
            username       TEXT NOT NULL DEFAULT '',
            minecraft_uuid TEXT
        );
        ",
    )?;
    Ok(())
}
