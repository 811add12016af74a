use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use urlshort_core::{Deletion, Result, ShortLink, StorageBackend, StorageError};

/// Append-only backend storing one JSON record per line.
///
/// Every read rewinds and scans the whole file, and the last line for an id
/// wins: deleting a link appends a copy with `deleted_flag` set. This keeps
/// the file trivially replayable at the cost of O(n) lookups, which is fine
/// for small and development deployments.
///
/// Ids are checked for collisions, urls are not deduplicated.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileBackend {
    /// Opens (creating if needed) the storage file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("cannot open '{}': {e}", path.display()))
            })?;

        debug!(path = %path.display(), "opened file storage");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the path of the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record, folding later lines over earlier ones by id.
    ///
    /// Records come back in order of first appearance.
    pub async fn load_all(&self) -> Result<Vec<ShortLink>> {
        let mut file = self.file.lock().await;
        read_folded(&mut file).await
    }

    /// Appends records without any collision checks.
    pub(crate) async fn append(&self, links: &[ShortLink]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }
        let mut file = self.file.lock().await;
        write_lines(&mut file, links).await
    }
}

async fn read_lines(file: &mut File, mut visit: impl FnMut(ShortLink)) -> Result<()> {
    file.seek(SeekFrom::Start(0)).await?;
    let mut lines = BufReader::new(file).lines();

    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ShortLink>(&line) {
            Ok(link) => visit(link),
            Err(err) => warn!(line = line_no, error = %err, "skipping unreadable record"),
        }
    }
    Ok(())
}

async fn read_folded(file: &mut File) -> Result<Vec<ShortLink>> {
    let mut links: Vec<ShortLink> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    read_lines(file, |link| match positions.entry(link.id.clone()) {
        Entry::Occupied(at) => links[*at.get()] = link,
        Entry::Vacant(slot) => {
            slot.insert(links.len());
            links.push(link);
        }
    })
    .await?;

    Ok(links)
}

async fn write_lines(file: &mut File, links: &[ShortLink]) -> Result<()> {
    let mut buf = Vec::new();
    for link in links {
        serde_json::to_writer(&mut buf, link)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        buf.push(b'\n');
    }
    file.write_all(&buf).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn insert(&self, link: ShortLink) -> Result<ShortLink> {
        let mut file = self.file.lock().await;

        let mut taken = false;
        read_lines(&mut file, |stored| taken |= stored.id == link.id).await?;
        if taken {
            return Err(StorageError::IdCollision(link.id));
        }

        write_lines(&mut file, std::slice::from_ref(&link)).await?;
        Ok(link)
    }

    async fn insert_many(&self, links: Vec<ShortLink>) -> Result<()> {
        let mut file = self.file.lock().await;

        let mut ids = HashSet::new();
        read_lines(&mut file, |stored| {
            ids.insert(stored.id);
        })
        .await?;
        for link in &links {
            if !ids.insert(link.id.clone()) {
                return Err(StorageError::IdCollision(link.id.clone()));
            }
        }

        write_lines(&mut file, &links).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ShortLink>> {
        let mut file = self.file.lock().await;

        let mut found = None;
        read_lines(&mut file, |stored| {
            if stored.id == id {
                found = Some(stored);
            }
        })
        .await?;
        Ok(found)
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortLink>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|link| link.original_url == original_url && !link.deleted))
    }

    async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<ShortLink>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|link| link.owner_id == owner_id && !link.deleted)
            .collect())
    }

    async fn tag_deleted(&self, deletions: &[Deletion]) -> Result<()> {
        let mut file = self.file.lock().await;
        let current = read_folded(&mut file).await?;

        let mut tombstones: Vec<ShortLink> = Vec::new();
        for deletion in deletions {
            let target = current
                .iter()
                .find(|link| link.is_deletable_by(deletion) && !link.deleted);
            match target {
                Some(link) if !tombstones.iter().any(|t| t.id == link.id) => {
                    let mut tombstone = link.clone();
                    tombstone.deleted = true;
                    tombstones.push(tombstone);
                }
                Some(_) => {}
                None => debug!(id = %deletion.link_id, "deletion did not match a live owned link"),
            }
        }

        if tombstones.is_empty() {
            return Ok(());
        }
        write_lines(&mut file, &tombstones).await
    }

    async fn close(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("links.json")).await.unwrap();
        (dir, backend)
    }

    fn link(id: &str, url: &str, owner: &str) -> ShortLink {
        ShortLink::new(id, url, owner)
    }

    #[tokio::test]
    async fn insert_and_get() {
        let (_dir, backend) = open_temp().await;

        backend
            .insert(link("abc123", "https://example.com", "u1"))
            .await
            .unwrap();

        let result = backend.get_by_id("abc123").await.unwrap().unwrap();
        assert_eq!(result.original_url, "https://example.com");
        assert_eq!(result.owner_id, "u1");
        assert!(backend.get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let (dir, backend) = open_temp().await;
        backend
            .insert(link("abc", "https://a.example", "u1"))
            .await
            .unwrap();
        backend
            .insert(link("def", "https://b.example", ""))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("links.json")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"id":"abc","original_url":"https://a.example","uuid":"u1","deleted_flag":false}"#
        );
    }

    #[tokio::test]
    async fn does_not_dedup_urls() {
        let (_dir, backend) = open_temp().await;
        backend
            .insert(link("one", "https://example.com", ""))
            .await
            .unwrap();
        backend
            .insert(link("two", "https://example.com", ""))
            .await
            .unwrap();

        assert!(backend.get_by_id("one").await.unwrap().is_some());
        assert!(backend.get_by_id("two").await.unwrap().is_some());
        let canonical = backend
            .get_by_original_url("https://example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(canonical.id, "one");
    }

    #[tokio::test]
    async fn rejects_id_collision() {
        let (_dir, backend) = open_temp().await;
        backend
            .insert(link("abc", "https://one.example", ""))
            .await
            .unwrap();

        let err = backend
            .insert(link("abc", "https://two.example", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::IdCollision(_)));

        let err = backend
            .insert_many(vec![
                link("new", "https://three.example", ""),
                link("new", "https://four.example", ""),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::IdCollision(_)));
        assert!(backend.get_by_id("new").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tag_deleted_appends_tombstone() {
        let (dir, backend) = open_temp().await;
        backend
            .insert(link("abc", "https://example.com", "owner"))
            .await
            .unwrap();
        backend
            .insert(link("def", "https://other.example", "owner"))
            .await
            .unwrap();

        backend
            .tag_deleted(&[
                Deletion::new("owner", "abc"),
                Deletion::new("owner", "abc"),
                Deletion::new("intruder", "def"),
            ])
            .await
            .unwrap();

        assert!(backend.get_by_id("abc").await.unwrap().unwrap().deleted);
        assert!(!backend.get_by_id("def").await.unwrap().unwrap().deleted);

        let owned = backend.get_by_owner("owner").await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, "def");

        let content = std::fs::read_to_string(dir.path().join("links.json")).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn reopen_sees_previous_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        {
            let backend = FileBackend::open(&path).await.unwrap();
            backend
                .insert(link("abc", "https://example.com", ""))
                .await
                .unwrap();
            backend.close().await.unwrap();
        }

        let backend = FileBackend::open(&path).await.unwrap();
        let all = backend.load_all().await.unwrap();
        assert_eq!(all, vec![link("abc", "https://example.com", "")]);
    }

    #[tokio::test]
    async fn skips_unreadable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        std::fs::write(
            &path,
            "not json\n{\"id\":\"abc\",\"original_url\":\"https://example.com\",\"uuid\":\"\",\"deleted_flag\":false}\n",
        )
        .unwrap();

        let backend = FileBackend::open(&path).await.unwrap();
        assert!(backend.get_by_id("abc").await.unwrap().is_some());
    }
}
