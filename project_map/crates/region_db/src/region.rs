use geo::LatLon;
use reconciler::RegionSnapshot;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::RegionDbError;

/// Columns in the order `from_row` reads them.
const COLUMNS: &str = "id, data, city, username, buildings, search_display_name";

/// Repository for region rows.
pub struct RegionRepo<'a> {
    conn: &'a Connection,
}

impl<'a> RegionRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, region: &RegionSnapshot) -> Result<(), RegionDbError> {
        if !region.vertices.iter().all(LatLon::is_finite) {
            return Err(RegionDbError::InvalidOutline(region.id.clone()));
        }
        if self.get(&region.id)?.is_some() {
            return Err(RegionDbError::RegionExists(region.id.clone()));
        }
        let data = serde_json::to_string(&region.vertices)?;
        self.conn.execute(
            "INSERT INTO regions (id, data, city, username, buildings, search_display_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                region.id,
                data,
                region.city,
                region.username,
                region.buildings_count as i64,
                region.search_display_name,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<RegionSnapshot>, RegionDbError> {
        let sql = format!("SELECT {COLUMNS} FROM regions WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, rusqlite::params![id], from_row)
            .optional()?)
    }

    pub fn count(&self) -> Result<usize, RegionDbError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM regions", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    /// One page in insertion order.
    pub fn page(&self, offset: usize, limit: usize) -> Result<Vec<RegionSnapshot>, RegionDbError> {
        let sql = format!("SELECT {COLUMNS} FROM regions ORDER BY rowid LIMIT ?1 OFFSET ?2");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params![limit as i64, offset as i64], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn all(&self) -> Result<Vec<RegionSnapshot>, RegionDbError> {
        let sql = format!("SELECT {COLUMNS} FROM regions ORDER BY rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_buildings(&self, id: &str, count: u64) -> Result<(), RegionDbError> {
        let changed = self.conn.execute(
            "UPDATE regions SET buildings = ?1 WHERE id = ?2",
            rusqlite::params![count as i64, id],
        )?;
        if changed == 0 {
            return Err(RegionDbError::RegionNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn set_search_display_name(&self, id: &str, name: &str) -> Result<(), RegionDbError> {
        let changed = self.conn.execute(
            "UPDATE regions SET search_display_name = ?1 WHERE id = ?2",
            rusqlite::params![name, id],
        )?;
        if changed == 0 {
            return Err(RegionDbError::RegionNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<RegionSnapshot> {
    let id: String = row.get(0)?;
    let data: String = row.get(1)?;
    // Unreadable outlines surface later as invalid geometry for that region only.
    let vertices: Vec<LatLon> = serde_json::from_str(&data).unwrap_or_else(|e| {
        tracing::warn!(region_id = %id, error = %e, "unreadable region outline");
        Vec::new()
    });
    Ok(RegionSnapshot {
        id,
        vertices,
        city: row.get(2)?,
        username: row.get(3)?,
        buildings_count: row.get::<_, i64>(4)?.max(0) as u64,
        search_display_name: row.get(5)?,
    })
}
