// src/store/file.rs
//! JSON snapshot store.
//!
//! Each mutation is applied to a copy of the table, the copy is written to a
//! temp file and renamed over the snapshot, and only then swapped in. A failed
//! write leaves both the file and the in-memory table at the previous state.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::Mutex;

use super::{PostingStore, PostingTable, StoreResult, UpsertOutcome};
use crate::posting::{Posting, PostingQuery};

pub struct JsonFileStore {
    path: PathBuf,
    table: Mutex<PostingTable>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it doesn't exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let table = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PostingTable::default(),
            Err(e) => return Err(e.into()),
        };
        let broken = table.iter().filter(|p| !p.invariants_hold()).count();
        if broken > 0 {
            tracing::warn!(path = %path.display(), broken, "snapshot holds postings with inconsistent flags");
        }
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Apply `f` to a copy, persist it, then commit. Skips the write when
    /// `f` reports no change.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut PostingTable) -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        let mut guard = self.table.lock().await;
        let mut next = guard.clone();
        let (out, changed) = f(&mut next)?;
        if changed {
            persist(&self.path, &next).await?;
            *guard = next;
        }
        Ok(out)
    }
}

async fn persist(path: &Path, table: &PostingTable) -> StoreResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    let bytes = serde_json::to_vec_pretty(table)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl PostingStore for JsonFileStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Posting>> {
        Ok(self.table.lock().await.get(id).cloned())
    }

    async fn upsert_if_absent(&self, posting: Posting) -> StoreResult<UpsertOutcome> {
        self.mutate(|t| {
            let out = t.upsert_if_absent(posting);
            Ok((out, out == UpsertOutcome::Inserted))
        })
        .await
    }

    async fn insert_batch(&self, postings: Vec<Posting>) -> StoreResult<Vec<UpsertOutcome>> {
        self.mutate(|t| {
            let out: Vec<UpsertOutcome> =
                postings.into_iter().map(|p| t.upsert_if_absent(p)).collect();
            let changed = out.contains(&UpsertOutcome::Inserted);
            Ok((out, changed))
        })
        .await
    }

    async fn append_location(&self, id: &str, location: &str) -> StoreResult<bool> {
        self.mutate(|t| {
            let added = t.append_location(id, location)?;
            Ok((added, added))
        })
        .await
    }

    async fn latest_posted_at(&self, location: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.table.lock().await.latest_posted_at(location))
    }

    async fn find_by_flags(&self, query: PostingQuery) -> StoreResult<Vec<Posting>> {
        Ok(self.table.lock().await.find_by_flags(query))
    }

    async fn set_processed(&self, id: &str, matched: bool) -> StoreResult<bool> {
        self.mutate(|t| {
            let changed = t.set_processed(id, matched)?;
            Ok((changed, changed))
        })
        .await
    }

    async fn mark_notified(&self, ids: &[String]) -> StoreResult<usize> {
        self.mutate(|t| {
            let n = t.mark_notified(ids);
            Ok((n, n > 0))
        })
        .await
    }
}
