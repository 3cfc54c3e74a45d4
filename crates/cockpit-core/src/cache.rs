//! The content-addressed cache store.
//!
//! On-disk layout under `<root>/.cockpit/.cache/`:
//!
//! ```text
//! manifest.json                          # task id -> currently active hash
//! results/
//!   <safe task id>/                      # ':' replaced by '__'
//!     registry.json                      # every cached hash of the task
//!     <input hash>/
//!       outputs/<relative paths>         # mirrors the workspace
//!       output.json                      # captured console chunks
//! ```
//!
//! The registry is the source of truth for what was cached; the manifest
//! records which hash is currently materialized in the workspace. Writes
//! are serialized behind an internal mutex — within this process only;
//! concurrent cockpit processes over one cache are not supported.
//!
//! Cache I/O never fails a run: per-file errors are logged and the file is
//! skipped; corrupt or missing state files read as empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use cockpit_glob::{walk, Pattern, WalkOptions};
use cockpit_types::{OutputChunk, TaskId};

/// Directory names never captured as outputs.
const STORE_EXCLUDES: [&str; 2] = ["node_modules", ".git"];

const MANIFEST_FILE: &str = "manifest.json";
const REGISTRY_FILE: &str = "registry.json";
const OUTPUTS_DIR: &str = "outputs";
const CHUNKS_FILE: &str = "output.json";

/// One file captured into a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFile {
    pub relative_path: String,
    pub size: u64,
}

/// One cached run of a task.
///
/// `cached_files` may legitimately be empty: the run succeeded and its
/// console output can be replayed, there is just nothing to restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub input_hash: String,
    pub timestamp: String,
    pub outputs: Vec<String>,
    pub cached_files: Vec<CachedFile>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

type Manifest = BTreeMap<String, String>;

/// Result of a cache probe.
#[derive(Debug)]
pub struct Lookup {
    pub found: bool,
    pub entry: Option<RegistryEntry>,
    /// True when the manifest says this hash is the one currently
    /// materialized in the workspace.
    pub is_active: bool,
}

/// Everything `store` needs.
#[derive(Debug)]
pub struct StoreRequest<'a> {
    pub task_id: &'a TaskId,
    pub input_hash: &'a str,
    pub outputs: &'a [String],
    pub workspace_path: &'a Path,
    pub output_chunks: &'a [OutputChunk],
}

/// Aggregate numbers for `cockpit cache stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub tasks: usize,
    pub total_entries: usize,
}

/// The store. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct CacheStore {
    cache_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir, write_lock: Mutex::new(()) }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join(MANIFEST_FILE)
    }

    fn task_dir(&self, task_id: &TaskId) -> PathBuf {
        self.cache_dir.join("results").join(task_id.safe_dir_name())
    }

    fn hash_dir(&self, task_id: &TaskId, input_hash: &str) -> PathBuf {
        self.task_dir(task_id).join(input_hash)
    }

    /// Probe the registry and manifest for one `(task, hash)` pair.
    pub async fn lookup(&self, task_id: &TaskId, input_hash: &str) -> Lookup {
        let registry = self.load_registry(task_id).await;
        let manifest = self.load_manifest().await;

        let entry = registry.entries.get(input_hash).cloned();
        let is_active = entry.is_some()
            && manifest.get(task_id.as_str()).map(String::as_str) == Some(input_hash);
        Lookup { found: entry.is_some(), entry, is_active }
    }

    /// Convenience over `lookup`.
    pub async fn has(&self, task_id: &TaskId, input_hash: &str) -> bool {
        self.lookup(task_id, input_hash).await.found
    }

    /// True when every cached file of the entry still exists in the
    /// workspace. Vacuously true for an entry with no cached files.
    pub async fn has_outputs_on_disk(
        &self,
        task_id: &TaskId,
        input_hash: &str,
        workspace_path: &Path,
    ) -> bool {
        let registry = self.load_registry(task_id).await;
        let Some(entry) = registry.entries.get(input_hash) else {
            return false;
        };
        for file in &entry.cached_files {
            if !workspace_path.join(&file.relative_path).exists() {
                return false;
            }
        }
        true
    }

    /// Copy an entry's files back into the workspace.
    ///
    /// Returns `None` when the entry has nothing restorable (no cached
    /// files, or its outputs directory is gone). Restoring at least one
    /// file marks the hash active in the manifest.
    pub async fn restore_outputs(
        &self,
        task_id: &TaskId,
        input_hash: &str,
        workspace_path: &Path,
    ) -> Option<usize> {
        let registry = self.load_registry(task_id).await;
        let entry = registry.entries.get(input_hash)?;
        if entry.cached_files.is_empty() {
            return None;
        }

        let outputs_dir = self.hash_dir(task_id, input_hash).join(OUTPUTS_DIR);
        if !outputs_dir.is_dir() {
            return None;
        }

        let mut restored = 0;
        for file in &entry.cached_files {
            let src = outputs_dir.join(&file.relative_path);
            let dst = workspace_path.join(&file.relative_path);
            match copy_file(&src, &dst).await {
                Ok(()) => restored += 1,
                Err(err) => {
                    tracing::warn!(
                        task = %task_id, file = %file.relative_path, %err,
                        "failed to restore cached file"
                    );
                }
            }
        }

        if restored > 0 {
            let _guard = self.write_lock.lock().await;
            let mut manifest = self.load_manifest().await;
            manifest.insert(task_id.to_string(), input_hash.to_string());
            self.save_manifest(&manifest).await;
        }
        Some(restored)
    }

    /// Capture a successful run: expand the output globs, copy matches
    /// into the hash directory, persist the console chunks, upsert the
    /// registry and activate the hash.
    ///
    /// Any existing entry for the hash is replaced wholesale.
    pub async fn store(&self, request: StoreRequest<'_>) {
        let _guard = self.write_lock.lock().await;

        let hash_dir = self.hash_dir(request.task_id, request.input_hash);
        if hash_dir.exists() {
            if let Err(err) = tokio::fs::remove_dir_all(&hash_dir).await {
                tracing::warn!(task = %request.task_id, %err, "failed to clear cache entry");
            }
        }
        let outputs_dir = hash_dir.join(OUTPUTS_DIR);
        if let Err(err) = tokio::fs::create_dir_all(&outputs_dir).await {
            tracing::warn!(task = %request.task_id, %err, "failed to create cache entry");
            return;
        }

        let mut cached_files = Vec::new();
        for file in self.expand_outputs(request.outputs, request.workspace_path).await {
            let src = request.workspace_path.join(&file.rel_path);
            let dst = outputs_dir.join(&file.rel_path);
            match copy_file(&src, &dst).await {
                Ok(()) => cached_files.push(CachedFile {
                    relative_path: file.rel_path,
                    size: file.size,
                }),
                Err(err) => {
                    tracing::warn!(
                        task = %request.task_id, file = %file.rel_path, %err,
                        "failed to cache output file"
                    );
                }
            }
        }

        match serde_json::to_vec_pretty(request.output_chunks) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(hash_dir.join(CHUNKS_FILE), bytes).await {
                    tracing::warn!(task = %request.task_id, %err, "failed to write output chunks");
                }
            }
            Err(err) => {
                tracing::warn!(task = %request.task_id, %err, "failed to encode output chunks")
            }
        }

        let mut registry = self.load_registry(request.task_id).await;
        registry.entries.insert(
            request.input_hash.to_string(),
            RegistryEntry {
                input_hash: request.input_hash.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                outputs: request.outputs.to_vec(),
                cached_files,
            },
        );
        self.save_registry(request.task_id, &registry).await;

        let mut manifest = self.load_manifest().await;
        manifest.insert(request.task_id.to_string(), request.input_hash.to_string());
        self.save_manifest(&manifest).await;
    }

    /// Drop one hash of a task, or the whole task when `input_hash` is
    /// `None`. The manifest entry is cleared only when it pointed at a
    /// removed hash.
    pub async fn invalidate(&self, task_id: &TaskId, input_hash: Option<&str>) {
        let _guard = self.write_lock.lock().await;

        match input_hash {
            Some(hash) => {
                let hash_dir = self.hash_dir(task_id, hash);
                if hash_dir.exists() {
                    if let Err(err) = tokio::fs::remove_dir_all(&hash_dir).await {
                        tracing::warn!(task = %task_id, %hash, %err, "failed to remove cache entry");
                    }
                }

                let mut registry = self.load_registry(task_id).await;
                registry.entries.remove(hash);
                self.save_registry(task_id, &registry).await;

                let mut manifest = self.load_manifest().await;
                if manifest.get(task_id.as_str()).map(String::as_str) == Some(hash) {
                    manifest.remove(task_id.as_str());
                    self.save_manifest(&manifest).await;
                }
            }
            None => {
                let task_dir = self.task_dir(task_id);
                if task_dir.exists() {
                    if let Err(err) = tokio::fs::remove_dir_all(&task_dir).await {
                        tracing::warn!(task = %task_id, %err, "failed to remove task cache");
                    }
                }

                let mut manifest = self.load_manifest().await;
                if manifest.remove(task_id.as_str()).is_some() {
                    self.save_manifest(&manifest).await;
                }
            }
        }
    }

    /// The captured console chunks of an entry, for replay.
    pub async fn output_chunks(
        &self,
        task_id: &TaskId,
        input_hash: &str,
    ) -> Option<Vec<OutputChunk>> {
        let path = self.hash_dir(task_id, input_hash).join(CHUNKS_FILE);
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// All registry entries of a task, newest first.
    pub async fn list_entries(&self, task_id: &TaskId) -> Vec<RegistryEntry> {
        let registry = self.load_registry(task_id).await;
        let mut entries: Vec<RegistryEntry> = registry.entries.into_values().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Count cached tasks and entries.
    pub async fn stats(&self) -> CacheStats {
        let results_dir = self.cache_dir.join("results");
        let mut stats = CacheStats::default();

        let Ok(mut dirs) = tokio::fs::read_dir(&results_dir).await else {
            return stats;
        };
        while let Ok(Some(dir)) = dirs.next_entry().await {
            let registry_path = dir.path().join(REGISTRY_FILE);
            let registry = load_registry_at(&registry_path).await;
            if !registry.entries.is_empty() {
                stats.tasks += 1;
                stats.total_entries += registry.entries.len();
            }
        }
        stats
    }

    /// Remove every cached entry and the manifest.
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        for path in [self.cache_dir.join("results"), self.manifest_path()] {
            if !path.exists() {
                continue;
            }
            let result = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            if let Err(err) = result {
                tracing::warn!(path = %path.display(), %err, "failed to clear cache");
            }
        }
    }

    async fn expand_outputs(
        &self,
        outputs: &[String],
        workspace_path: &Path,
    ) -> Vec<cockpit_glob::Walked> {
        let patterns: Vec<Pattern> = outputs
            .iter()
            .filter_map(|raw| Pattern::new(raw).ok())
            .collect();
        if patterns.is_empty() {
            return Vec::new();
        }
        let options = WalkOptions {
            patterns,
            exclude_dirs: STORE_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            include_hidden: true,
            ..Default::default()
        };
        walk(workspace_path, &options).await.unwrap_or_default()
    }

    async fn load_manifest(&self) -> Manifest {
        load_json_or_default(&self.manifest_path()).await
    }

    async fn save_manifest(&self, manifest: &Manifest) {
        save_json(&self.manifest_path(), manifest).await;
    }

    async fn load_registry(&self, task_id: &TaskId) -> TaskRegistry {
        load_registry_at(&self.task_dir(task_id).join(REGISTRY_FILE)).await
    }

    async fn save_registry(&self, task_id: &TaskId, registry: &TaskRegistry) {
        save_json(&self.task_dir(task_id).join(REGISTRY_FILE), registry).await;
    }
}

async fn load_registry_at(path: &Path) -> TaskRegistry {
    load_json_or_default(path).await
}

/// Missing and corrupt state files both read as the default value.
async fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "corrupt cache state file, treating as empty");
            T::default()
        }),
        Err(_) => T::default(),
    }
}

async fn save_json<T: Serialize>(path: &Path, value: &T) {
    let result = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        tokio::fs::write(path, bytes).await
    }
    .await;
    if let Err(err) = result {
        tracing::warn!(path = %path.display(), %err, "failed to persist cache state");
    }
}

async fn copy_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(src, dst).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        TaskId::parse(s)
    }

    fn store_in(tmp: &tempfile::TempDir) -> CacheStore {
        CacheStore::new(tmp.path().join(".cockpit/.cache"))
    }

    async fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, contents).await.unwrap();
    }

    async fn store_entry(cache: &CacheStore, task: &TaskId, hash: &str, ws: &Path) {
        cache
            .store(StoreRequest {
                task_id: task,
                input_hash: hash,
                outputs: &["dist/**".to_string()],
                workspace_path: ws,
                output_chunks: &[
                    OutputChunk::stdout("building\n"),
                    OutputChunk::stderr("warning: x\n"),
                    OutputChunk::stdout("done\n"),
                ],
            })
            .await;
    }

    #[tokio::test]
    async fn store_then_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/bundle.js", "bundle").await;
        let cache = store_in(&tmp);
        let task = id("web:build");

        store_entry(&cache, &task, "aaaa000011112222", &ws).await;

        let lookup = cache.lookup(&task, "aaaa000011112222").await;
        assert!(lookup.found);
        assert!(lookup.is_active);
        let entry = lookup.entry.unwrap();
        assert_eq!(entry.cached_files.len(), 1);
        assert_eq!(entry.cached_files[0].relative_path, "dist/bundle.js");
        assert_eq!(entry.cached_files[0].size, 6);

        assert!(cache.has(&task, "aaaa000011112222").await);
        assert!(!cache.has(&task, "ffff000011112222").await);
    }

    #[tokio::test]
    async fn restore_reproduces_deleted_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/bundle.js", "bundle").await;
        let cache = store_in(&tmp);
        let task = id("web:build");
        store_entry(&cache, &task, "aaaa000011112222", &ws).await;

        tokio::fs::remove_file(ws.join("dist/bundle.js")).await.unwrap();
        assert!(!cache.has_outputs_on_disk(&task, "aaaa000011112222", &ws).await);

        let restored = cache.restore_outputs(&task, "aaaa000011112222", &ws).await;
        assert_eq!(restored, Some(1));
        let contents = tokio::fs::read_to_string(ws.join("dist/bundle.js")).await.unwrap();
        assert_eq!(contents, "bundle");
        assert!(cache.has_outputs_on_disk(&task, "aaaa000011112222", &ws).await);
    }

    #[tokio::test]
    async fn entry_without_files_has_outputs_vacuously() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        tokio::fs::create_dir_all(&ws).await.unwrap();
        let cache = store_in(&tmp);
        let task = id("web:lint");

        cache
            .store(StoreRequest {
                task_id: &task,
                input_hash: "bbbb000011112222",
                outputs: &[],
                workspace_path: &ws,
                output_chunks: &[OutputChunk::stdout("clean\n")],
            })
            .await;

        assert!(cache.has_outputs_on_disk(&task, "bbbb000011112222", &ws).await);
        // Nothing restorable, but the entry itself is valid.
        assert_eq!(cache.restore_outputs(&task, "bbbb000011112222", &ws).await, None);
        assert!(cache.has(&task, "bbbb000011112222").await);
    }

    #[tokio::test]
    async fn chunks_replay_in_captured_order() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/a", "a").await;
        let cache = store_in(&tmp);
        let task = id("web:build");
        store_entry(&cache, &task, "cccc000011112222", &ws).await;

        let chunks = cache.output_chunks(&task, "cccc000011112222").await.unwrap();
        assert_eq!(
            chunks,
            vec![
                OutputChunk::stdout("building\n"),
                OutputChunk::stderr("warning: x\n"),
                OutputChunk::stdout("done\n"),
            ]
        );
    }

    #[tokio::test]
    async fn invalidate_specific_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/a", "a").await;
        let cache = store_in(&tmp);
        let task = id("web:build");
        store_entry(&cache, &task, "dddd000011112222", &ws).await;
        store_entry(&cache, &task, "eeee000011112222", &ws).await;

        cache.invalidate(&task, Some("dddd000011112222")).await;
        assert!(!cache.has(&task, "dddd000011112222").await);
        assert!(cache.has(&task, "eeee000011112222").await);
        // The second store is still the active hash.
        assert!(cache.lookup(&task, "eeee000011112222").await.is_active);
    }

    #[tokio::test]
    async fn invalidate_active_hash_clears_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/a", "a").await;
        let cache = store_in(&tmp);
        let task = id("web:build");
        store_entry(&cache, &task, "ffff000011112222", &ws).await;

        cache.invalidate(&task, Some("ffff000011112222")).await;
        let lookup = cache.lookup(&task, "ffff000011112222").await;
        assert!(!lookup.found);
        assert!(!lookup.is_active);
    }

    #[tokio::test]
    async fn invalidate_whole_task() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/a", "a").await;
        let cache = store_in(&tmp);
        let task = id("web:build");
        store_entry(&cache, &task, "aaaa111122223333", &ws).await;

        cache.invalidate(&task, None).await;
        assert!(!cache.has(&task, "aaaa111122223333").await);
        assert_eq!(cache.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn stats_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/a", "a").await;
        let cache = store_in(&tmp);
        store_entry(&cache, &id("web:build"), "aaaa111122223333", &ws).await;
        store_entry(&cache, &id("web:build"), "bbbb111122223333", &ws).await;
        store_entry(&cache, &id("core:build"), "cccc111122223333", &ws).await;

        let stats = cache.stats().await;
        assert_eq!(stats.tasks, 2);
        assert_eq!(stats.total_entries, 3);

        cache.clear().await;
        assert_eq!(cache.stats().await, CacheStats::default());
        assert!(!cache.has(&id("web:build"), "aaaa111122223333").await);
    }

    #[tokio::test]
    async fn corrupt_registry_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = store_in(&tmp);
        let task = id("web:build");
        let registry_path = cache.task_dir(&task).join(REGISTRY_FILE);
        tokio::fs::create_dir_all(registry_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&registry_path, "{not json").await.unwrap();

        let lookup = cache.lookup(&task, "aaaa111122223333").await;
        assert!(!lookup.found);
    }

    #[tokio::test]
    async fn colon_ids_map_to_safe_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/a", "a").await;
        let cache = store_in(&tmp);
        let task = id("web:build:prod");
        store_entry(&cache, &task, "abcd111122223333", &ws).await;

        assert!(cache
            .cache_dir()
            .join("results/web__build__prod/abcd111122223333/outputs/dist/a")
            .is_file());
    }

    #[tokio::test]
    async fn store_replaces_existing_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("ws");
        write(&ws, "dist/a", "first").await;
        let cache = store_in(&tmp);
        let task = id("web:build");
        store_entry(&cache, &task, "9999111122223333", &ws).await;

        write(&ws, "dist/a", "second-longer").await;
        store_entry(&cache, &task, "9999111122223333", &ws).await;

        let entry = cache.lookup(&task, "9999111122223333").await.entry.unwrap();
        assert_eq!(entry.cached_files.len(), 1);
        assert_eq!(entry.cached_files[0].size, "second-longer".len() as u64);
    }
}
