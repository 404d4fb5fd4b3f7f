/// The CutoutStore persists segmented clothing cutouts in a SQLite
/// database: one row per cutout with a generated identifier, a
/// creation timestamp, a comma-joined tag list and the encoded image
/// payload.
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use image::RgbaImage;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use super::transform;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("image transform error: {0}")]
    Transform(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not determine user data directory")]
    NoDataDir,
}

/// One persisted cutout, image decoded on read.
#[derive(Debug, Clone)]
pub struct CutoutRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub image: RgbaImage,
}

pub struct CutoutStore {
    conn: Connection,
    db_path: PathBuf,
}

impl CutoutStore {
    /// Open the store at its default location in the user's data
    /// directory:
    /// - Linux: ~/.local/share/wardrobe-studio/wardrobe_studio.db
    /// - macOS: ~/Library/Application Support/wardrobe-studio/wardrobe_studio.db
    /// - Windows: %APPDATA%\wardrobe-studio\wardrobe_studio.db
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&Self::default_db_path()?)
    }

    /// Open (or create) the store at an explicit path. Each
    /// collaborator gets its own connection to this path; SQLite
    /// connections do not cross threads here.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = CutoutStore {
            conn,
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;

        log::info!("📁 Cutout store initialized at: {}", path.display());
        Ok(store)
    }

    pub fn default_db_path() -> Result<PathBuf, StoreError> {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or(StoreError::NoDataDir)?;
        path.push("wardrobe-studio");
        path.push("wardrobe_studio.db");
        Ok(path)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cutouts (
                id              TEXT PRIMARY KEY,
                created_at      INTEGER NOT NULL,
                tags            TEXT NOT NULL,
                image           BLOB NOT NULL
            )",
            [],
        )?;

        // Index for newest-first reads
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cutouts_created_at
             ON cutouts(created_at DESC)",
            [],
        )?;

        Ok(())
    }

    /// Path to the database file.
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Persist a cutout under a fresh identifier.
    pub fn save(
        &self,
        image: &RgbaImage,
        tags: &[&str],
        created_at: DateTime<Utc>,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let payload = transform::encode(image)?;

        self.conn.execute(
            "INSERT INTO cutouts (id, created_at, tags, image) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                id.to_string(),
                created_at.timestamp(),
                tags.join(","),
                payload,
            ],
        )?;

        Ok(id)
    }

    /// All records whose tag list contains the given tag, newest
    /// first. Rows whose payload no longer decodes are skipped.
    pub fn query_by_tag(&self, tag: &str) -> Result<Vec<CutoutRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, tags, image FROM cutouts
             WHERE tags LIKE '%' || ?1 || '%'
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([tag], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, created_at, tags, payload) = row?;

            let Ok(id) = Uuid::parse_str(&id) else {
                log::warn!("Skipping cutout with malformed id: {id}");
                continue;
            };
            let image = match transform::decode(&payload) {
                Ok(image) => image,
                Err(e) => {
                    log::warn!("Skipping cutout {id}, payload no longer decodes: {e}");
                    continue;
                }
            };

            records.push(CutoutRecord {
                id,
                created_at: Utc
                    .timestamp_opt(created_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                tags: tags.split(',').map(str::to_string).collect(),
                image,
            });
        }

        Ok(records)
    }

    /// Number of stored cutouts.
    pub fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cutouts", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl std::fmt::Debug for CutoutStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CutoutStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    /// Fresh database path under the system temp directory.
    pub fn temp_db_path() -> PathBuf {
        std::env::temp_dir()
            .join("wardrobe-studio-tests")
            .join(format!("store-{}.db", uuid::Uuid::new_v4()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([180, 40, 40, 255]))
    }

    #[test]
    fn test_save_and_query_round_trip_dimensions() {
        let path = testing::temp_db_path();
        let store = CutoutStore::open(&path).unwrap();

        store
            .save(&sample_image(40, 30), &["cutout", "vision"], Utc::now())
            .unwrap();

        let records = store.query_by_tag("cutout").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image.width(), 40);
        assert_eq!(records[0].image.height(), 30);
        assert_eq!(records[0].tags, vec!["cutout", "vision"]);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_query_orders_newest_first() {
        let path = testing::temp_db_path();
        let store = CutoutStore::open(&path).unwrap();

        let earlier = Utc::now() - Duration::hours(2);
        let older = store
            .save(&sample_image(10, 10), &["cutout"], earlier)
            .unwrap();
        let newer = store
            .save(&sample_image(10, 10), &["cutout"], Utc::now())
            .unwrap();

        let records = store.query_by_tag("cutout").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, newer);
        assert_eq!(records[1].id, older);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_query_misses_other_tags() {
        let path = testing::temp_db_path();
        let store = CutoutStore::open(&path).unwrap();

        store
            .save(&sample_image(10, 10), &["cutout", "vision"], Utc::now())
            .unwrap();

        assert!(store.query_by_tag("shoes").unwrap().is_empty());
        assert_eq!(store.query_by_tag("vision").unwrap().len(), 1);
        assert_eq!(store.count().unwrap(), 1);

        let _ = std::fs::remove_file(path);
    }
}
