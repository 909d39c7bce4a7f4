//! Cache writer: turns a committed selection into a clip file and an index entry.
//!
//! Commits are queued per source path. Each queue is drained in FIFO order by
//! its own worker thread, so one asset never has two extractions in flight
//! while different assets commit concurrently.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use ::time::OffsetDateTime;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::asset::probe_asset;
use crate::backend::MediaBackend;
use crate::config::{EngineConfig, ExtractionStrategy};
use crate::error::{EngineError, Result};
use crate::index::{CacheEntry, CacheIndex, ClipId, ClipProvenance, STAGING_PREFIX, clip_file_name};
use crate::plan::{build_extraction_plan, choose_extraction_mode};
use crate::session::{CommitSnapshot, TrimSession};

/// Tool stderr fragments that point at the destination rather than the source.
const DESTINATION_FAILURE_MARKERS: [&str; 4] = [
    "No space left on device",
    "Permission denied",
    "Read-only file system",
    "Disk quota exceeded",
];

/// Per-commit overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Reuse this entry's identity instead of minting a new one.
    pub overwrite: Option<ClipId>,
    /// Overrides the configured strategy for this commit only.
    pub strategy: Option<ExtractionStrategy>,
}

impl CommitOptions {
    pub fn overwrite(id: ClipId) -> Self {
        Self {
            overwrite: Some(id),
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Pending result of a submitted commit.
#[derive(Debug)]
pub struct CommitTicket {
    source: PathBuf,
    start_tl: i64,
    end_tl: i64,
    receiver: Receiver<Result<CacheEntry>>,
}

impl CommitTicket {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.start_tl, self.end_tl)
    }

    /// Blocks until the commit resolves.
    pub fn wait(self) -> Result<CacheEntry> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(self.worker_lost()),
        }
    }

    /// Returns the result once it is available; `None` while still running.
    pub fn try_result(&self) -> Option<Result<CacheEntry>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.worker_lost())),
        }
    }

    fn worker_lost(&self) -> EngineError {
        EngineError::WriteFailure {
            asset: self.source.clone(),
            start_tl: self.start_tl,
            end_tl: self.end_tl,
            destination: PathBuf::new(),
            reason: "commit worker stopped before reporting a result".to_string(),
        }
    }
}

struct CommitJob {
    snapshot: CommitSnapshot,
    options: CommitOptions,
    reply: Sender<Result<CacheEntry>>,
}

struct WriterShared<M> {
    backend: Arc<M>,
    config: EngineConfig,
    root: PathBuf,
    index: Mutex<CacheIndex>,
    /// A lane is present exactly while its worker thread is running.
    lanes: Mutex<HashMap<PathBuf, VecDeque<CommitJob>>>,
}

/// Writes clips into the cache directory and registers them in the index.
pub struct CacheWriter<M> {
    shared: Arc<WriterShared<M>>,
}

impl<M> Clone for CacheWriter<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> std::fmt::Debug for CacheWriter<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriter")
            .field("root", &self.shared.root)
            .field("strategy", &self.shared.config.strategy)
            .finish_non_exhaustive()
    }
}

impl<M> CacheWriter<M>
where
    M: MediaBackend + 'static,
{
    /// Opens the cache directory named by `config.cache_dir`.
    pub fn open(backend: Arc<M>, config: EngineConfig) -> Result<Self> {
        let index = CacheIndex::open(&config.cache_dir, backend.as_ref(), config.prune_on_open)?;
        info!(root = ?index.root(), entries = index.len(), "cache writer ready");
        Ok(Self {
            shared: Arc::new(WriterShared {
                backend,
                root: index.root().to_path_buf(),
                config,
                index: Mutex::new(index),
                lanes: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Commits the session's selection and waits for the clip to be written.
    pub fn commit(&self, session: &TrimSession, options: CommitOptions) -> Result<CacheEntry> {
        self.submit(session, options)?.wait()
    }

    /// Queues the session's selection for writing.
    ///
    /// The asset and selection are captured now; later session changes do not
    /// affect the queued commit.
    pub fn submit(&self, session: &TrimSession, options: CommitOptions) -> Result<CommitTicket> {
        let snapshot = session.snapshot()?;
        self.submit_snapshot(snapshot, options)
    }

    pub fn submit_snapshot(
        &self,
        snapshot: CommitSnapshot,
        options: CommitOptions,
    ) -> Result<CommitTicket> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        let source = snapshot.asset.path.clone();
        let ticket = CommitTicket {
            source: source.clone(),
            start_tl: snapshot.selection.start_tl,
            end_tl: snapshot.selection.end_tl,
            receiver,
        };
        let job = CommitJob {
            snapshot,
            options,
            reply,
        };

        let mut lanes = self.shared.lanes.lock();
        if let Some(lane) = lanes.get_mut(&source) {
            lane.push_back(job);
            debug!(source = ?source, queued = lane.len(), "commit queued behind running lane");
            return Ok(ticket);
        }

        lanes.insert(source.clone(), VecDeque::from([job]));
        let shared = Arc::clone(&self.shared);
        let lane_source = source.clone();
        let spawned = thread::Builder::new()
            .name("commit-lane".to_string())
            .spawn(move || shared.drain_lane(&lane_source));
        if let Err(error) = spawned {
            lanes.remove(&source);
            return Err(EngineError::Io {
                context: "spawn commit worker",
                path: source,
                source: error,
            });
        }
        debug!(source = ?source, "commit lane started");
        Ok(ticket)
    }

    /// Entries most recent first.
    pub fn list(&self) -> Vec<CacheEntry> {
        self.shared.index.lock().list()
    }

    pub fn get(&self, id: ClipId) -> Option<CacheEntry> {
        self.shared.index.lock().get(id).cloned()
    }

    pub fn prune(&self) -> Result<Vec<CacheEntry>> {
        self.shared.index.lock().prune()
    }

    pub fn remove(&self, id: ClipId) -> Result<CacheEntry> {
        self.shared.index.lock().remove(id)
    }

    /// Renames an entry for display; `None` or a blank label clears it.
    pub fn set_label(&self, id: ClipId, label: Option<String>) -> Result<CacheEntry> {
        self.shared.index.lock().set_label(id, label)
    }
}

impl<M> WriterShared<M>
where
    M: MediaBackend + 'static,
{
    fn drain_lane(&self, source: &Path) {
        loop {
            let job = {
                let mut lanes = self.lanes.lock();
                match lanes.get_mut(source).and_then(VecDeque::pop_front) {
                    Some(job) => job,
                    None => {
                        lanes.remove(source);
                        debug!(source = ?source, "commit lane drained");
                        return;
                    }
                }
            };

            let result = self.write_clip(&job.snapshot, job.options);
            if let Err(error) = &result {
                warn!(source = ?source, %error, "commit failed");
            }
            // The ticket may have been dropped; the clip is cached regardless.
            let _ = job.reply.send(result);
        }
    }

    fn write_clip(&self, snapshot: &CommitSnapshot, options: CommitOptions) -> Result<CacheEntry> {
        let asset = &snapshot.asset;
        let selection = snapshot.selection;
        if asset.is_stale() {
            return Err(extraction_failure(
                snapshot,
                "source changed since it was probed".to_string(),
            ));
        }
        if let Some(id) = options.overwrite {
            if self.index.lock().get(id).is_none() {
                return Err(EngineError::EntryNotFound { id });
            }
        }

        let id = options.overwrite.unwrap_or_else(ClipId::new);
        let extension = asset.container_extension();
        let final_path = self.root.join(clip_file_name(
            &asset.stem(),
            selection.start_tl,
            selection.end_tl,
            id,
            &extension,
        ));
        let staging = self.create_staging_file(snapshot, &final_path, &extension)?;

        let strategy = options.strategy.unwrap_or(self.config.strategy);
        let mode = choose_extraction_mode(strategy, snapshot, self.backend.as_ref());
        let comment = ClipProvenance {
            id,
            source: asset.path.clone(),
            start_tl: selection.start_tl,
            end_tl: selection.end_tl,
            mode,
        }
        .to_comment();
        let plan = build_extraction_plan(
            snapshot,
            staging.to_path_buf(),
            mode,
            &self.config.reencode,
            comment,
        );
        debug!(
            source = ?asset.path,
            staging = ?plan.output,
            start_tl = selection.start_tl,
            end_tl = selection.end_tl,
            ?mode,
            "extracting clip"
        );
        self.backend
            .extract(&plan)
            .map_err(|error| classify_extract_error(snapshot, &final_path, error))?;

        let written = probe_asset(self.backend.as_ref(), &staging).map_err(|error| {
            extraction_failure(snapshot, format!("output is not decodable: {error}"))
        })?;

        let replaces_in_place = options.overwrite.is_some() && final_path.exists();
        let persisted = if replaces_in_place {
            staging.persist(&final_path)
        } else {
            staging.persist_noclobber(&final_path)
        };
        persisted.map_err(|error| {
            write_failure(
                snapshot,
                &final_path,
                format!("rename staging file: {}", error.error),
            )
        })?;

        let entry = CacheEntry {
            id,
            path: final_path.clone(),
            source: asset.path.clone(),
            start_tl: selection.start_tl,
            end_tl: selection.end_tl,
            duration_tl: written.duration_tl,
            mode,
            created_at: OffsetDateTime::now_utc(),
            seq: 0,
            label: None,
        };
        let recorded = {
            let mut index = self.index.lock();
            if options.overwrite.is_some() {
                index.replace(entry).and_then(|previous| {
                    let stored = index
                        .get(id)
                        .cloned()
                        .ok_or(EngineError::EntryNotFound { id })?;
                    Ok((stored, Some(previous)))
                })
            } else {
                index.register(entry).map(|stored| (stored, None))
            }
        };
        let (stored, previous) = match recorded {
            Ok(recorded) => recorded,
            Err(error) => {
                if !replaces_in_place {
                    if let Err(remove_error) = fs::remove_file(&final_path) {
                        warn!(path = ?final_path, %remove_error, "could not remove unregistered clip");
                    }
                }
                return Err(write_failure(
                    snapshot,
                    &final_path,
                    format!("update cache index: {error}"),
                ));
            }
        };

        if let Some(previous) = previous.filter(|previous| previous.path != stored.path) {
            match fs::remove_file(&previous.path) {
                Ok(()) => debug!(path = ?previous.path, "removed overwritten clip"),
                Err(error) => warn!(path = ?previous.path, %error, "could not remove overwritten clip"),
            }
        }
        info!(
            id = %stored.id,
            path = ?stored.path,
            duration_tl = stored.duration_tl,
            ?mode,
            "commit finished"
        );
        Ok(stored)
    }

    fn create_staging_file(
        &self,
        snapshot: &CommitSnapshot,
        final_path: &Path,
        extension: &str,
    ) -> Result<TempPath> {
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&format!(".{extension}"))
            .tempfile_in(&self.root)
            .map(|file| file.into_temp_path())
            .map_err(|error| write_failure(snapshot, final_path, format!("create staging file: {error}")))
    }
}

fn classify_extract_error(
    snapshot: &CommitSnapshot,
    destination: &Path,
    error: EngineError,
) -> EngineError {
    let destination_failed = match &error {
        EngineError::Media(media) => media.stderr().is_some_and(|stderr| {
            DESTINATION_FAILURE_MARKERS
                .iter()
                .any(|marker| stderr.contains(marker))
        }),
        _ => false,
    };
    if destination_failed {
        write_failure(snapshot, destination, error.to_string())
    } else {
        extraction_failure(snapshot, error.to_string())
    }
}

fn extraction_failure(snapshot: &CommitSnapshot, reason: String) -> EngineError {
    EngineError::ExtractionFailure {
        asset: snapshot.asset.path.clone(),
        start_tl: snapshot.selection.start_tl,
        end_tl: snapshot.selection.end_tl,
        reason,
    }
}

fn write_failure(snapshot: &CommitSnapshot, destination: &Path, reason: String) -> EngineError {
    EngineError::WriteFailure {
        asset: snapshot.asset.path.clone(),
        start_tl: snapshot.selection.start_tl,
        end_tl: snapshot.selection.end_tl,
        destination: destination.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use super::{CacheWriter, CommitOptions};
    use crate::config::{EngineConfig, ExtractionStrategy};
    use crate::error::{EngineError, NotCommittableReason};
    use crate::index::INDEX_FILE_NAME;
    use crate::plan::ExtractionMode;
    use crate::session::TrimSession;
    use crate::testing::{MockBackend, write_source};

    fn writer(backend: &MockBackend, cache_dir: &Path) -> CacheWriter<MockBackend> {
        let config = EngineConfig {
            cache_dir: cache_dir.to_path_buf(),
            ..EngineConfig::default()
        };
        CacheWriter::open(Arc::new(backend.clone()), config).expect("open writer")
    }

    fn selected(backend: &MockBackend, source: &Path, start_tl: i64, end_tl: i64) -> TrimSession {
        let mut session = TrimSession::new();
        session.load_path(backend, source).expect("load");
        session.set_start(start_tl).expect("set start");
        session.set_end(end_tl).expect("set end");
        session
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read cache dir")
            .map(|entry| {
                entry
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn commit_writes_clip_with_selected_duration() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);

        let entry = writer
            .commit(&session, CommitOptions::default())
            .expect("commit should succeed");

        assert_eq!(entry.duration_tl, 3_000_000);
        assert_eq!((entry.start_tl, entry.end_tl), (2_000_000, 5_000_000));
        assert_eq!(entry.mode, ExtractionMode::Reencode);
        assert!(entry.path.exists());
        let name = entry
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("clip name");
        assert_eq!(
            name,
            format!("demo_trimmed_2000000_5000000_{}.mp4", entry.id)
        );

        let plan = &backend.extract_calls()[0];
        assert_eq!(plan.input, source);
        assert!(
            plan.output
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(".staging-"))
        );
        assert!(plan.comment.as_deref().is_some_and(|comment| comment.contains("demo.mp4")));
    }

    #[test]
    fn committing_twice_yields_two_entries_newest_first() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);

        let first = writer
            .commit(&session, CommitOptions::default())
            .expect("first commit");
        let second = writer
            .commit(&session, CommitOptions::default())
            .expect("second commit");

        assert_ne!(first.id, second.id);
        assert_ne!(first.path, second.path);
        let ids: Vec<_> = writer.list().iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn commit_without_selection_is_rejected_and_index_unchanged() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let mut session = TrimSession::new();
        session.load_path(&backend, &source).expect("load");

        let error = writer
            .commit(&session, CommitOptions::default())
            .expect_err("commit must fail");

        assert!(matches!(
            error,
            EngineError::NotCommittable {
                reason: NotCommittableReason::SelectionIncomplete
            }
        ));
        assert!(writer.list().is_empty());
        assert!(backend.extract_calls().is_empty());
    }

    #[test]
    fn failed_extraction_leaves_no_clip_and_no_entry() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);
        backend.set_extract_failure(Some("Conversion failed!"));

        let error = writer
            .commit(&session, CommitOptions::default())
            .expect_err("commit must fail");

        assert!(matches!(error, EngineError::ExtractionFailure { .. }));
        assert_eq!(error.commit_context(), Some((&source, 2_000_000, 5_000_000)));
        assert!(writer.list().is_empty());
        assert_eq!(file_names(cache.path()), vec![INDEX_FILE_NAME.to_string()]);
    }

    #[test]
    fn full_destination_is_reported_as_write_failure() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);
        backend.set_extract_failure(Some("av_interleaved_write_frame(): No space left on device"));

        let error = writer
            .commit(&session, CommitOptions::default())
            .expect_err("commit must fail");

        assert!(matches!(error, EngineError::WriteFailure { .. }));
        assert!(writer.list().is_empty());
    }

    #[test]
    fn undecodable_output_is_an_extraction_failure() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);
        backend.set_corrupt_output(true);

        let error = writer
            .commit(&session, CommitOptions::default())
            .expect_err("commit must fail");

        assert!(matches!(error, EngineError::ExtractionFailure { .. }));
        assert_eq!(file_names(cache.path()), vec![INDEX_FILE_NAME.to_string()]);
    }

    #[test]
    fn overwrite_keeps_id_and_replaces_file() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let mut session = selected(&backend, &source, 2_000_000, 5_000_000);
        let original = writer
            .commit(&session, CommitOptions::default())
            .expect("first commit");

        session.set_start(1_000_000).expect("set start");
        session.set_end(4_000_000).expect("set end");
        let replaced = writer
            .commit(&session, CommitOptions::overwrite(original.id))
            .expect("overwrite commit");

        assert_eq!(replaced.id, original.id);
        assert_ne!(replaced.path, original.path);
        assert!(replaced.path.exists());
        assert!(!original.path.exists());
        assert_eq!(writer.list().len(), 1);
        assert_eq!(replaced.start_tl, 1_000_000);
    }

    #[test]
    fn failed_overwrite_keeps_original_clip() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);
        let original = writer
            .commit(&session, CommitOptions::default())
            .expect("first commit");

        backend.set_extract_failure(Some("Conversion failed!"));
        writer
            .commit(&session, CommitOptions::overwrite(original.id))
            .expect_err("overwrite must fail");

        assert!(original.path.exists());
        assert_eq!(writer.get(original.id), Some(original));
    }

    #[test]
    fn overwrite_of_unknown_entry_fails() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);

        let error = writer
            .commit(&session, CommitOptions::overwrite(crate::index::ClipId::new()))
            .expect_err("overwrite must fail");

        assert!(matches!(error, EngineError::EntryNotFound { .. }));
        assert!(backend.extract_calls().is_empty());
    }

    #[test]
    fn strategy_override_applies_to_one_commit() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);

        let copied = writer
            .commit(
                &session,
                CommitOptions::default().with_strategy(ExtractionStrategy::StreamCopy),
            )
            .expect("commit");
        let reencoded = writer
            .commit(&session, CommitOptions::default())
            .expect("commit");

        assert_eq!(copied.mode, ExtractionMode::StreamCopy);
        assert_eq!(reencoded.mode, ExtractionMode::Reencode);
    }

    #[test]
    fn submitted_commits_for_one_source_run_in_order() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let mut session = selected(&backend, &source, 1_000_000, 2_000_000);

        let mut tickets = Vec::new();
        for end_tl in [2_000_000, 3_000_000, 4_000_000] {
            session.set_end(end_tl).expect("set end");
            tickets.push(
                writer
                    .submit(&session, CommitOptions::default())
                    .expect("submit"),
            );
        }
        session.clear();

        let durations: Vec<i64> = tickets
            .into_iter()
            .map(|ticket| ticket.wait().expect("commit").duration_tl)
            .collect();
        assert_eq!(durations, vec![1_000_000, 2_000_000, 3_000_000]);
        let planned_ends: Vec<i64> = backend
            .extract_calls()
            .iter()
            .map(|plan| plan.end_tl)
            .collect();
        assert_eq!(planned_ends, vec![2_000_000, 3_000_000, 4_000_000]);
    }

    #[test]
    fn reopening_without_index_file_recovers_entries() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let committed = {
            let writer = writer(&backend, cache.path());
            let session = selected(&backend, &source, 2_000_000, 5_000_000);
            writer
                .commit(&session, CommitOptions::default())
                .expect("commit")
        };
        fs::remove_file(cache.path().join(INDEX_FILE_NAME)).expect("delete index");

        let reopened = writer(&backend, cache.path());

        let entries = reopened.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, committed.id);
        assert_eq!(entries[0].source, source);
        assert_eq!(entries[0].path, committed.path);
        assert_eq!(entries[0].duration_tl, 3_000_000);
    }

    #[test]
    fn prune_and_remove_go_through_the_index() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let session = selected(&backend, &source, 2_000_000, 5_000_000);
        let gone = writer
            .commit(&session, CommitOptions::default())
            .expect("commit");
        let kept = writer
            .commit(&session, CommitOptions::default())
            .expect("commit");

        fs::remove_file(&gone.path).expect("delete clip externally");
        assert_eq!(writer.prune().expect("prune").len(), 1);
        assert!(writer.prune().expect("prune again").is_empty());

        writer.remove(kept.id).expect("remove");
        assert!(writer.list().is_empty());
        assert!(!kept.path.exists());
    }

    #[test]
    fn overwrite_keeps_label_of_replaced_entry() {
        let sources = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let backend = MockBackend::default();
        let source = write_source(sources.path(), "demo.mp4");
        let writer = writer(&backend, cache.path());
        let first = writer
            .commit(
                &selected(&backend, &source, 2_000_000, 5_000_000),
                CommitOptions::default(),
            )
            .expect("commit");
        writer
            .set_label(first.id, Some("intro".to_string()))
            .expect("label");

        let second = writer
            .commit(
                &selected(&backend, &source, 1_000_000, 4_000_000),
                CommitOptions::overwrite(first.id),
            )
            .expect("overwrite");

        assert_eq!(second.id, first.id);
        assert_eq!(second.label.as_deref(), Some("intro"));
        assert_eq!(writer.list().len(), 1);
    }
}
