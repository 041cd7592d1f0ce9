//! Local filesystem storage implementation.
//!
//! Each manga lives in its own JSON document named after its identity, so
//! workers owning disjoint mangas never write the same file. Writes go to a
//! temporary file first and are renamed into place.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── activity.jsonl        # Append-only activity log (one JSON per line)
//! └── mangas/
//!     └── {id}.json         # One manga with its embedded chapters
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Activity, Manga, MangaId};
use crate::storage::{ActivityStore, MangaCursor, MangaStore};

const MANGAS_DIR: &str = "mangas";
const ACTIVITY_FILE: &str = "activity.jsonl";

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    append_lock: Arc<Mutex<()>>,
}

impl LocalStorage {
    /// Open (and create if needed) a storage rooted at the given directory.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self {
            root_dir: root_dir.into(),
            append_lock: Arc::new(Mutex::new(())),
        };
        tokio::fs::create_dir_all(storage.mangas_dir()).await?;
        Ok(storage)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn mangas_dir(&self) -> PathBuf {
        self.root_dir.join(MANGAS_DIR)
    }

    fn manga_path(dir: &Path, id: &MangaId) -> PathBuf {
        dir.join(format!("{id}.json"))
    }

    /// Identities of every stored manga, sorted.
    async fn stored_ids(&self) -> Result<Vec<MangaId>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.mangas_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(AppError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(MangaId::from(stem));
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Stream the given mangas lazily, skipping ids with no document.
    fn cursor(&self, ids: Vec<MangaId>) -> MangaCursor {
        let dir = self.mangas_dir();
        stream::iter(ids)
            .then(move |id| read_json::<Manga>(Self::manga_path(&dir, &id)))
            .filter_map(|result| future::ready(result.transpose()))
            .boxed()
    }

    async fn write_manga(&self, manga: &mut Manga) -> Result<()> {
        let id = manga.assign_identity();
        manga.touch();
        write_json(&Self::manga_path(&self.mangas_dir(), &id), manga).await
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &bytes).await
}

/// Read JSON data, returning None if the file doesn't exist.
async fn read_json<T: DeserializeOwned>(path: PathBuf) -> Result<Option<T>> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

#[async_trait]
impl MangaStore for LocalStorage {
    async fn save(&self, manga: &mut Manga) -> Result<()> {
        self.write_manga(manga).await
    }

    async fn save_all(&self, mangas: &mut [Manga]) -> Result<()> {
        for manga in mangas.iter_mut() {
            self.write_manga(manga).await?;
        }
        log::debug!("Saved {} mangas", mangas.len());
        Ok(())
    }

    async fn find_by_urls(&self, urls: &[String]) -> Result<Vec<Manga>> {
        let wanted: HashSet<&str> = urls.iter().map(String::as_str).collect();
        let mut cursor = self.find_all().await?;
        let mut found = Vec::new();

        while let Some(manga) = cursor.next().await {
            let manga = manga?;
            if wanted.contains(manga.url.as_str()) {
                found.push(manga);
            }
        }
        Ok(found)
    }

    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Manga>> {
        let wanted: HashSet<&str> = titles.iter().map(String::as_str).collect();
        let mut cursor = self.find_all().await?;
        let mut found = Vec::new();

        while let Some(manga) = cursor.next().await {
            let manga = manga?;
            if wanted.contains(manga.title.as_str()) {
                found.push(manga);
            }
        }
        Ok(found)
    }

    async fn browse(&self, ids: &[MangaId]) -> Result<MangaCursor> {
        Ok(self.cursor(ids.to_vec()))
    }

    async fn find_all(&self) -> Result<MangaCursor> {
        let ids = self.stored_ids().await?;
        Ok(self.cursor(ids))
    }

    async fn drop_all(&self) -> Result<()> {
        let dir = self.mangas_dir();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::Io(e)),
        }
        tokio::fs::create_dir_all(&dir).await?;
        log::info!("Dropped all mangas from {}", dir.display());
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.stored_ids().await?.len())
    }
}

#[async_trait]
impl ActivityStore for LocalStorage {
    async fn append(&self, activities: &[Activity]) -> Result<()> {
        if activities.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::new();
        for activity in activities {
            serde_json::to_writer(&mut buffer, activity)?;
            buffer.push(b'\n');
        }

        let _guard = self.append_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root_dir.join(ACTIVITY_FILE))
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;

        log::info!("Appended {} activities", activities.len());
        Ok(())
    }

    async fn load_activities(&self) -> Result<Vec<Activity>> {
        let path = self.root_dir.join(ACTIVITY_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }
}
