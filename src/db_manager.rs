use crate::model::{DiscoveryRecord, SeedAlbum};
use crate::providers::{DiscoveryHistoryStore, WallStore};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Album posted to the wall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallAlbum {
    pub user: String,
    pub url: String,
    pub artist: String,
    pub album_name: String,
    pub cover_url: Option<String>,
    pub platform: Option<String>,
    pub tags: Vec<String>,
}

/// History row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDiscovery {
    pub id: i64,
    pub record: DiscoveryRecord,
    pub discovered_at: String,
}

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        db_manager.migrate()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS albums (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                url TEXT NOT NULL,
                artist TEXT NOT NULL,
                album_name TEXT NOT NULL,
                cover_url TEXT,
                platform TEXT,
                tags TEXT NOT NULL,
                likes TEXT DEFAULT '[]',
                timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS album_discoveries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                base_artist TEXT NOT NULL,
                base_album TEXT NOT NULL,
                discovered_artist TEXT NOT NULL,
                discovered_album TEXT NOT NULL,
                discovered_url TEXT,
                cover_url TEXT,
                discovered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_discoveries_username ON album_discoveries(username)",
            [],
        )?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Older databases have no tags column on album_discoveries
        let mut stmt = self.conn.prepare("PRAGMA table_info(album_discoveries)")?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut has_tags = false;
        for col in columns {
            if col? == "tags" {
                has_tags = true;
                break;
            }
        }

        if !has_tags {
            self.conn.execute(
                "ALTER TABLE album_discoveries ADD COLUMN tags TEXT DEFAULT '[]'",
                [],
            )?;
        }
        Ok(())
    }

    pub fn insert_album(&self, album: &WallAlbum) -> Result<i64, rusqlite::Error> {
        let tags = serde_json::to_string(&album.tags).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO albums (username, url, artist, album_name, cover_url, platform, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                album.user,
                album.url,
                album.artist,
                album.album_name,
                album.cover_url,
                album.platform,
                tags
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn url_exists(&self, url: &str) -> Result<bool, rusqlite::Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM albums WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn album_count(&self) -> Result<usize, rusqlite::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Uniformly random wall album with a usable artist and title.
    pub fn random_album(&self) -> Result<Option<SeedAlbum>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT artist, album_name, cover_url, url FROM albums
                 WHERE TRIM(artist) != '' AND TRIM(album_name) != ''
                 ORDER BY RANDOM() LIMIT 1",
                [],
                |row| {
                    Ok(SeedAlbum {
                        artist: row.get(0)?,
                        album_title: row.get(1)?,
                        cover_url: row.get(2)?,
                        source_url: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    pub fn save_discovery(&self, record: &DiscoveryRecord) -> Result<i64, rusqlite::Error> {
        let tags = serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO album_discoveries
             (username, base_artist, base_album, discovered_artist, discovered_album, discovered_url, cover_url, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.user,
                record.seed_artist,
                record.seed_album,
                record.discovered_artist,
                record.discovered_album,
                record.url,
                record.cover_url,
                tags
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest first, optionally limited to one user.
    pub fn load_discoveries(
        &self,
        user: Option<&str>,
    ) -> Result<Vec<StoredDiscovery>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, base_artist, base_album, discovered_artist, discovered_album,
                    discovered_url, cover_url, tags, discovered_at
             FROM album_discoveries
             WHERE ?1 IS NULL OR username = ?1
             ORDER BY discovered_at DESC, id DESC",
        )?;
        let discovery_iter = stmt.query_map(params![user], |row| {
            let tags: Option<String> = row.get(8)?;
            Ok(StoredDiscovery {
                id: row.get(0)?,
                record: DiscoveryRecord {
                    user: row.get(1)?,
                    seed_artist: row.get(2)?,
                    seed_album: row.get(3)?,
                    discovered_artist: row.get(4)?,
                    discovered_album: row.get(5)?,
                    url: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    cover_url: row.get(7)?,
                    tags: tags
                        .and_then(|tags| serde_json::from_str(&tags).ok())
                        .unwrap_or_default(),
                },
                discovered_at: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            })
        })?;

        let mut discoveries = Vec::new();
        for discovery in discovery_iter {
            discoveries.push(discovery?);
        }
        Ok(discoveries)
    }
}

impl WallStore for DbManager {
    fn sample_random_album(&self) -> Option<SeedAlbum> {
        match self.random_album() {
            Ok(album) => album,
            Err(error) => {
                warn!("Failed to sample a wall album: {error}");
                None
            }
        }
    }
}

impl DiscoveryHistoryStore for DbManager {
    fn record_discovery(&self, record: &DiscoveryRecord) -> Result<(), String> {
        self.save_discovery(record)
            .map(|_| ())
            .map_err(|error| format!("Failed to save discovery: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_album(url: &str, artist: &str, album_name: &str) -> WallAlbum {
        WallAlbum {
            user: "kim".to_string(),
            url: url.to_string(),
            artist: artist.to_string(),
            album_name: album_name.to_string(),
            cover_url: None,
            platform: Some("Bandcamp".to_string()),
            tags: vec!["death metal".to_string()],
        }
    }

    fn record(user: &str, discovered_artist: &str) -> DiscoveryRecord {
        DiscoveryRecord {
            user: user.to_string(),
            seed_artist: "Cannibal Corpse".to_string(),
            seed_album: "Tomb of the Mutilated".to_string(),
            discovered_artist: discovered_artist.to_string(),
            discovered_album: "Destroy the Opposition".to_string(),
            url: "https://open.spotify.com/album/abc".to_string(),
            cover_url: None,
            tags: vec!["brutal death metal".to_string()],
        }
    }

    #[test]
    fn test_empty_wall_samples_nothing() {
        let db = DbManager::open_in_memory().expect("db");
        assert_eq!(db.sample_random_album(), None);
        assert_eq!(db.album_count().expect("count"), 0);
    }

    #[test]
    fn test_insert_and_sample_album() {
        let db = DbManager::open_in_memory().expect("db");
        db.insert_album(&wall_album(
            "https://cc.bandcamp.com/album/tomb",
            "Cannibal Corpse",
            "Tomb of the Mutilated",
        ))
        .expect("insert");
        let seed = db.sample_random_album().expect("seed");
        assert_eq!(seed.artist, "Cannibal Corpse");
        assert_eq!(seed.album_title, "Tomb of the Mutilated");
        assert_eq!(seed.source_url, "https://cc.bandcamp.com/album/tomb");
    }

    #[test]
    fn test_sample_skips_albums_without_artist() {
        let db = DbManager::open_in_memory().expect("db");
        db.insert_album(&wall_album("https://x.test/a", "  ", "Untitled"))
            .expect("insert");
        assert_eq!(db.sample_random_album(), None);
    }

    #[test]
    fn test_url_exists_detects_duplicates() {
        let db = DbManager::open_in_memory().expect("db");
        let url = "https://gorguts.bandcamp.com/album/obscura";
        assert!(!db.url_exists(url).expect("lookup"));
        db.insert_album(&wall_album(url, "Gorguts", "Obscura"))
            .expect("insert");
        assert!(db.url_exists(url).expect("lookup"));
    }

    #[test]
    fn test_discoveries_round_trip_and_filter_by_user() {
        let db = DbManager::open_in_memory().expect("db");
        db.record_discovery(&record("kim", "Dying Fetus")).expect("save");
        db.record_discovery(&record("lee", "Devourment")).expect("save");

        let all = db.load_discoveries(None).expect("load");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].record.discovered_artist, "Devourment");

        let kim = db.load_discoveries(Some("kim")).expect("load");
        assert_eq!(kim.len(), 1);
        assert_eq!(kim[0].record, record("kim", "Dying Fetus"));
    }

    #[test]
    fn test_migrate_adds_tags_column_to_old_schema() {
        let conn = Connection::open_in_memory().expect("conn");
        conn.execute(
            "CREATE TABLE album_discoveries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                base_artist TEXT NOT NULL,
                base_album TEXT NOT NULL,
                discovered_artist TEXT NOT NULL,
                discovered_album TEXT NOT NULL,
                discovered_url TEXT,
                cover_url TEXT,
                discovered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .expect("old schema");
        let db = DbManager::with_connection(conn).expect("migrated");
        db.record_discovery(&record("kim", "Dying Fetus")).expect("save");
        let loaded = db.load_discoveries(Some("kim")).expect("load");
        assert_eq!(loaded[0].record.tags, vec!["brutal death metal".to_string()]);
    }
}
