//! Durable index of cached clips, stored as `index.json` in the cache root.

use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ::time::OffsetDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::MediaBackend;
use crate::error::{EngineError, Result};
use crate::plan::ExtractionMode;

/// File name of the persisted index inside the cache root.
pub const INDEX_FILE_NAME: &str = "index.json";
/// Prefix of in-progress clip files; swept when the index is opened.
pub const STAGING_PREFIX: &str = ".staging-";

const INDEX_VERSION: u32 = 1;
const TRIMMED_MARKER: &str = "_trimmed";

/// Stable identity of one cached clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ClipId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ClipId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// One cached clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: ClipId,
    /// Final clip file; never rewritten in place.
    pub path: PathBuf,
    /// Source asset the clip was cut from.
    pub source: PathBuf,
    pub start_tl: i64,
    pub end_tl: i64,
    /// Duration of the written file as probed after extraction.
    pub duration_tl: i64,
    pub mode: ExtractionMode,
    #[serde(with = "::time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Insertion order; breaks `created_at` ties.
    pub seq: u64,
    /// Display name chosen by the user. The clip file keeps its name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Provenance embedded in a clip's container `comment` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipProvenance {
    pub id: ClipId,
    pub source: PathBuf,
    pub start_tl: i64,
    pub end_tl: i64,
    pub mode: ExtractionMode,
}

impl ClipProvenance {
    pub fn to_comment(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    pub fn from_comment(comment: &str) -> Option<Self> {
        serde_json::from_str(comment).ok()
    }
}

/// `{stem}_trimmed_{start_tl}_{end_tl}_{id}.{ext}`
pub fn clip_file_name(stem: &str, start_tl: i64, end_tl: i64, id: ClipId, extension: &str) -> String {
    format!("{stem}{TRIMMED_MARKER}_{start_tl}_{end_tl}_{id}.{extension}")
}

/// Fields recovered from a clip file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipFileName {
    pub stem: String,
    pub start_tl: i64,
    pub end_tl: i64,
    pub id: ClipId,
}

/// Parses a name produced by [`clip_file_name`].
pub fn parse_clip_file_name(name: &str) -> Option<ClipFileName> {
    let (base, _extension) = name.rsplit_once('.')?;
    let mut parts = base.rsplitn(4, '_');
    let id = parts.next()?.parse().ok()?;
    let end_tl = parts.next()?.parse().ok()?;
    let start_tl = parts.next()?.parse().ok()?;
    let stem = parts.next()?.strip_suffix(TRIMMED_MARKER)?;
    Some(ClipFileName {
        stem: stem.to_string(),
        start_tl,
        end_tl,
        id,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    next_seq: u64,
    entries: Vec<CacheEntry>,
}

/// Cached clips of one cache root.
///
/// Every mutation is written to disk before it returns; a failed write
/// leaves the in-memory state as it was.
#[derive(Debug)]
pub struct CacheIndex {
    root: PathBuf,
    entries: Vec<CacheEntry>,
    next_seq: u64,
}

impl CacheIndex {
    /// Opens `root`, creating it if needed.
    ///
    /// Leftover staging files are deleted. A missing or unreadable
    /// `index.json` is rebuilt from the clip files in `root`.
    pub fn open<M>(root: impl AsRef<Path>, backend: &M, prune_on_open: bool) -> Result<Self>
    where
        M: MediaBackend + ?Sized,
    {
        let root = std::path::absolute(root.as_ref()).map_err(|source| EngineError::IndexIo {
            context: "resolve cache directory",
            path: root.as_ref().to_path_buf(),
            source,
        })?;
        fs::create_dir_all(&root).map_err(|source| EngineError::IndexIo {
            context: "create cache directory",
            path: root.clone(),
            source,
        })?;
        sweep_staging_files(&root)?;

        let index_path = root.join(INDEX_FILE_NAME);
        let mut index = match read_index_file(&index_path) {
            Some(file) => Self {
                root,
                next_seq: file
                    .next_seq
                    .max(file.entries.iter().map(|entry| entry.seq + 1).max().unwrap_or(0)),
                entries: file.entries,
            },
            None => {
                let index = Self::recover(root, backend)?;
                index.save()?;
                index
            }
        };
        debug!(root = ?index.root, entries = index.entries.len(), "cache index opened");

        if prune_on_open {
            index.prune()?;
        }
        Ok(index)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ClipId) -> Option<&CacheEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Entries ordered most recent first; equal timestamps list the later
    /// insertion first.
    pub fn list(&self) -> Vec<CacheEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then(right.seq.cmp(&left.seq))
        });
        entries
    }

    /// Adds a new entry, assigning its insertion sequence number.
    pub fn register(&mut self, mut entry: CacheEntry) -> Result<CacheEntry> {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(entry.clone());
        if let Err(error) = self.save() {
            self.entries.pop();
            self.next_seq -= 1;
            return Err(error);
        }
        info!(id = %entry.id, path = ?entry.path, seq = entry.seq, "cache entry registered");
        Ok(entry)
    }

    /// Swaps the entry with the same id for `entry`. Returns the old entry.
    pub fn replace(&mut self, mut entry: CacheEntry) -> Result<CacheEntry> {
        let position = self
            .position(entry.id)
            .ok_or(EngineError::EntryNotFound { id: entry.id })?;
        entry.seq = self.next_seq;
        self.next_seq += 1;
        if entry.label.is_none() {
            entry.label = self.entries[position].label.clone();
        }
        let previous = std::mem::replace(&mut self.entries[position], entry);
        if let Err(error) = self.save() {
            self.entries[position] = previous;
            self.next_seq -= 1;
            return Err(error);
        }
        info!(id = %previous.id, path = ?self.entries[position].path, "cache entry replaced");
        Ok(previous)
    }

    /// Sets or clears the display label of an entry.
    pub fn set_label(&mut self, id: ClipId, label: Option<String>) -> Result<CacheEntry> {
        let position = self.position(id).ok_or(EngineError::EntryNotFound { id })?;
        let label = label
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty());
        let previous = std::mem::replace(&mut self.entries[position].label, label);
        if let Err(error) = self.save() {
            self.entries[position].label = previous;
            return Err(error);
        }
        let entry = self.entries[position].clone();
        info!(id = %entry.id, label = ?entry.label, "cache entry relabeled");
        Ok(entry)
    }

    /// Drops entries whose clip file no longer exists. Returns the dropped ones.
    pub fn prune(&mut self) -> Result<Vec<CacheEntry>> {
        let (kept, dropped): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .cloned()
            .partition(|entry| entry.path.exists());
        if dropped.is_empty() {
            return Ok(dropped);
        }

        let previous = std::mem::replace(&mut self.entries, kept);
        if let Err(error) = self.save() {
            self.entries = previous;
            return Err(error);
        }
        for entry in &dropped {
            info!(id = %entry.id, path = ?entry.path, "pruned cache entry with missing file");
        }
        Ok(dropped)
    }

    /// Deletes an entry and its clip file. A file that is already gone is fine.
    pub fn remove(&mut self, id: ClipId) -> Result<CacheEntry> {
        let position = self.position(id).ok_or(EngineError::EntryNotFound { id })?;
        let entry = self.entries.remove(position);
        if let Err(error) = self.save() {
            self.entries.insert(position, entry);
            return Err(error);
        }

        match fs::remove_file(&entry.path) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(EngineError::IndexIo {
                    context: "delete clip file",
                    path: entry.path,
                    source,
                });
            }
        }
        info!(id = %entry.id, path = ?entry.path, "cache entry removed");
        Ok(entry)
    }

    fn position(&self, id: ClipId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    /// Writes `index.json` through a temporary file and an atomic rename.
    fn save(&self) -> Result<()> {
        let index_path = self.index_path();
        let file = IndexFile {
            version: INDEX_VERSION,
            next_seq: self.next_seq,
            entries: self.entries.clone(),
        };
        let json =
            serde_json::to_vec_pretty(&file).map_err(|source| EngineError::IndexSerialization {
                path: index_path.clone(),
                source,
            })?;

        let io_error = |context: &'static str| {
            let path = index_path.clone();
            move |source| EngineError::IndexIo {
                context,
                path,
                source,
            }
        };
        let mut temp = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".json")
            .tempfile_in(&self.root)
            .map_err(io_error("create index temp file"))?;
        temp.write_all(&json)
            .map_err(io_error("write index temp file"))?;
        temp.as_file()
            .sync_all()
            .map_err(io_error("sync index temp file"))?;
        temp.persist(&index_path)
            .map_err(|error| error.error)
            .map_err(io_error("replace index file"))?;
        Ok(())
    }

    /// Rebuilds entries from clip file names and their embedded provenance.
    fn recover<M>(root: PathBuf, backend: &M) -> Result<Self>
    where
        M: MediaBackend + ?Sized,
    {
        let read_dir = fs::read_dir(&root).map_err(|source| EngineError::IndexIo {
            context: "scan cache directory",
            path: root.clone(),
            source,
        })?;

        let mut entries = Vec::new();
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(parsed) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_clip_file_name)
            else {
                continue;
            };
            entries.push(recovered_entry(path, parsed, backend));
        }

        entries.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        for (seq, entry) in entries.iter_mut().enumerate() {
            entry.seq = seq as u64;
        }
        warn!(root = ?root, recovered = entries.len(), "cache index rebuilt from directory scan");
        Ok(Self {
            root,
            next_seq: entries.len() as u64,
            entries,
        })
    }
}

fn recovered_entry<M>(path: PathBuf, parsed: ClipFileName, backend: &M) -> CacheEntry
where
    M: MediaBackend + ?Sized,
{
    let probed = backend
        .probe(&path)
        .inspect_err(|error| warn!(path = ?path, %error, "recovered clip could not be probed"))
        .ok();
    let provenance = probed
        .as_ref()
        .and_then(|media| media.comment.as_deref())
        .and_then(ClipProvenance::from_comment)
        .filter(|provenance| provenance.id == parsed.id);
    let created_at = fs::metadata(&path)
        .and_then(|metadata| metadata.modified())
        .map(OffsetDateTime::from)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());

    CacheEntry {
        id: parsed.id,
        source: provenance
            .as_ref()
            .map(|provenance| provenance.source.clone())
            .unwrap_or_else(|| PathBuf::from(&parsed.stem)),
        start_tl: parsed.start_tl,
        end_tl: parsed.end_tl,
        duration_tl: probed
            .and_then(|media| media.declared_duration_tl)
            .unwrap_or(parsed.end_tl - parsed.start_tl),
        mode: provenance
            .map(|provenance| provenance.mode)
            .unwrap_or(ExtractionMode::Reencode),
        created_at,
        seq: 0,
        label: None,
        path,
    }
}

fn read_index_file(index_path: &Path) -> Option<IndexFile> {
    let text = match fs::read_to_string(index_path) {
        Ok(text) => text,
        Err(error) if error.kind() == ErrorKind::NotFound => return None,
        Err(error) => {
            warn!(path = ?index_path, %error, "cache index unreadable; rebuilding");
            return None;
        }
    };
    match serde_json::from_str::<IndexFile>(&text) {
        Ok(file) => Some(file),
        Err(error) => {
            warn!(path = ?index_path, %error, "cache index corrupt; rebuilding");
            None
        }
    }
}

fn sweep_staging_files(root: &Path) -> Result<()> {
    let read_dir = fs::read_dir(root).map_err(|source| EngineError::IndexIo {
        context: "scan cache directory",
        path: root.to_path_buf(),
        source,
    })?;
    for dir_entry in read_dir.flatten() {
        let is_staging = dir_entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(STAGING_PREFIX));
        if !is_staging {
            continue;
        }
        let path = dir_entry.path();
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = ?path, "removed leftover staging file"),
            Err(error) => warn!(path = ?path, %error, "could not remove staging file"),
        }
    }
    Ok(())
}
