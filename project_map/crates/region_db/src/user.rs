use rusqlite::{Connection, OptionalExtension};

use crate::error::RegionDbError;

/// Links between identity-provider subjects and in-game identities.
pub struct UserRepo<'a> {
    conn: &'a Connection,
}

impl<'a> UserRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create the user if needed and set (or replace) the linked game identity.
    pub fn link(&self, sso_id: &str, username: &str, minecraft_uuid: &str) -> Result<(), RegionDbError> {
        self.conn.execute(
            "INSERT INTO users (sso_id, username, minecraft_uuid) VALUES (?1, ?2, ?3)
             ON CONFLICT(sso_id) DO UPDATE SET username = excluded.username,
                                               minecraft_uuid = excluded.minecraft_uuid",
            rusqlite::params![sso_id, username, minecraft_uuid],
        )?;
        Ok(())
    }

    /// Game identity linked to `sso_id`; `None` for unknown or unlinked users.
    pub fn linked_player_uuid(&self, sso_id: &str) -> Result<Option<String>, RegionDbError> {
        let uuid: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT minecraft_uuid FROM users WHERE sso_id = ?1",
                rusqlite::params![sso_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(uuid.flatten().filter(|u| !u.is_empty()))
    }
}
