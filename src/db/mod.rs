//! Build history, kept in a SQLite database
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS builds (
    id TEXT PRIMARY KEY NOT NULL,
    arch TEXT NOT NULL,
    pkg TEXT NOT NULL,
    version TEXT NOT NULL,
    status TEXT NOT NULL,
    time_upload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS builds_pkg ON builds (pkg);";

/// One received build
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: String,
    pub arch: String,
    /// `<repo>/<name>`
    pub pkg: String,
    pub version: String,
    pub status: String,
    pub time_upload: DateTime<Utc>,
}

impl BuildRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let time: String = row.get(5)?;
        let time_upload = DateTime::parse_from_rfc3339(&time)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);
        Ok(BuildRecord {
            id: row.get(0)?,
            arch: row.get(1)?,
            pkg: row.get(2)?,
            version: row.get(3)?,
            status: row.get(4)?,
            time_upload,
        })
    }
}

pub struct BuildStore {
    conn: Connection,
}

impl BuildStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open build database {}", path.display()))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to set up build database")?;
        Ok(BuildStore { conn })
    }

    /// Record a successful build, returning its generated id
    pub fn insert_build(&self, arch: &str, pkg: &str, version: &str) -> Result<String> {
        self.insert_build_at(arch, pkg, version, Utc::now())
    }

    pub fn insert_build_at(
        &self,
        arch: &str,
        pkg: &str,
        version: &str,
        time: DateTime<Utc>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        // Fixed width UTC timestamps sort correctly as text
        let time = time.to_rfc3339_opts(SecondsFormat::Micros, true);
        self.conn.execute(
            "INSERT INTO builds (id, arch, pkg, version, status, time_upload)
             VALUES (?1, ?2, ?3, ?4, 'success', ?5)",
            params![id, arch, pkg, version, time],
        )?;
        Ok(id)
    }

    /// Most recent builds first. Unless `all`, only the latest build of each package.
    pub fn recent_builds(&self, count: u32, all: bool) -> Result<Vec<BuildRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, arch, pkg, version, status, time_upload FROM builds b
             WHERE ?2 OR b.rowid = (
                 SELECT l.rowid FROM builds l WHERE l.pkg = b.pkg
                 ORDER BY l.time_upload DESC, l.rowid DESC LIMIT 1
             )
             ORDER BY b.time_upload DESC, b.rowid DESC
             LIMIT ?1",
        )?;
        let builds = stmt
            .query_map(params![count, all], BuildRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(builds)
    }
}
