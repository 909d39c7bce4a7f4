use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::asset::Asset;
use crate::backend::{FfmpegMediaBackend, MediaBackend, PreviewFrame};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::index::{CacheEntry, ClipId};
use crate::playback::{PlaybackPosition, PreviewLoop};
use crate::session::{SessionState, TrimSession};
use crate::writer::{CacheWriter, CommitOptions, CommitTicket};

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Probes `path` and makes it the session asset, replacing any previous one.
    ///
    /// # Example
    /// ```no_run
    /// use std::path::PathBuf;
    /// use trim_engine::{Command, Engine, EngineConfig};
    ///
    /// let mut engine = Engine::with_ffmpeg(EngineConfig::default())?;
    /// let events = engine.handle_command(Command::Load {
    ///     path: PathBuf::from("demo.mp4"),
    /// })?;
    /// # let _ = events;
    /// # Ok::<(), trim_engine::EngineError>(())
    /// ```
    Load {
        path: PathBuf,
    },
    /// Sets the inclusive selection start in asset ticks.
    SetStart {
        t_tl: i64,
    },
    /// Sets the exclusive selection end in asset ticks.
    SetEnd {
        t_tl: i64,
    },
    SelectAll,
    ClearSelection,
    Play,
    Pause,
    Seek {
        t_tl: i64,
    },
    /// Moves the cursor by whole seek-granularity steps.
    Step {
        frames: i64,
    },
    /// Advances playback by host wall time.
    Tick {
        elapsed: Duration,
    },
    /// Queues the current selection for caching. The result arrives from
    /// [`Engine::poll`] as `CommitFinished` or `CommitFailed`.
    ///
    /// # Example
    /// ```no_run
    /// use std::path::PathBuf;
    /// use trim_engine::{CommitOptions, Command, Engine, EngineConfig};
    ///
    /// let mut engine = Engine::with_ffmpeg(EngineConfig::default())?;
    /// engine.handle_command(Command::Load { path: PathBuf::from("demo.mp4") })?;
    /// engine.handle_command(Command::SetStart { t_tl: 2_000_000 })?;
    /// engine.handle_command(Command::SetEnd { t_tl: 5_000_000 })?;
    /// engine.handle_command(Command::Commit { options: CommitOptions::default() })?;
    /// # Ok::<(), trim_engine::EngineError>(())
    /// ```
    Commit {
        options: CommitOptions,
    },
    RemoveEntry {
        id: ClipId,
    },
    /// Sets the display label of a cached clip; `None` clears it.
    LabelEntry {
        id: ClipId,
        label: Option<String>,
    },
    Prune,
    ListCache,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AssetLoaded(AssetSummary),
    SelectionChanged {
        start_tl: Option<i64>,
        end_tl: Option<i64>,
        state: SessionState,
    },
    PlaybackChanged(PlaybackPosition),
    PreviewFrameReady {
        frame: PreviewFrame,
    },
    CommitQueued {
        source: PathBuf,
        start_tl: i64,
        end_tl: i64,
    },
    CommitFinished(CacheEntry),
    CommitFailed {
        source: PathBuf,
        start_tl: i64,
        end_tl: i64,
        error: EngineErrorEvent,
    },
    CacheChanged(Vec<CacheEntry>),
    Error(EngineErrorEvent),
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    UnsupportedMedia,
    AssetUnavailable,
    NotCommittable,
    ExtractionFailure,
    WriteFailure,
    EntryNotFound,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::UnsupportedMedia { .. } => Self::UnsupportedMedia,
            EngineError::AssetUnavailable { .. } => Self::AssetUnavailable,
            EngineError::NotCommittable { .. } => Self::NotCommittable,
            EngineError::ExtractionFailure { .. } => Self::ExtractionFailure,
            EngineError::WriteFailure { .. } => Self::WriteFailure,
            EngineError::EntryNotFound { .. } => Self::EntryNotFound,
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Snapshot of the loaded asset consumed by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSummary {
    pub path: PathBuf,
    pub duration_tl: i64,
    pub granularity_tl: i64,
    pub container: Option<String>,
    pub has_video: bool,
    pub has_audio: bool,
}

impl From<&Asset> for AssetSummary {
    fn from(asset: &Asset) -> Self {
        Self {
            path: asset.path.clone(),
            duration_tl: asset.duration_tl,
            granularity_tl: asset.granularity_tl,
            container: asset.container.clone(),
            has_video: asset.video.is_some(),
            has_audio: asset.audio.is_some(),
        }
    }
}

/// Command/event facade over one trim session, its preview loop and the
/// clip cache.
#[derive(Debug)]
pub struct Engine<M> {
    backend: Arc<M>,
    session: TrimSession,
    preview: PreviewLoop,
    writer: CacheWriter<M>,
    pending: Vec<CommitTicket>,
    /// Tick of the last frame handed out as `PreviewFrameReady`.
    shown_frame_tl: Option<i64>,
}

impl<M> Engine<M>
where
    M: MediaBackend + 'static,
{
    /// Creates an engine with the provided media backend, opening the cache
    /// directory named in `config`.
    pub fn new(backend: M, config: EngineConfig) -> Result<Self> {
        let backend = Arc::new(backend);
        let decoder: Arc<dyn MediaBackend> = backend.clone();
        let preview = PreviewLoop::with_decoder(decoder, config.preview_cache_frames);
        let writer = CacheWriter::open(Arc::clone(&backend), config)?;
        Ok(Self {
            backend,
            session: TrimSession::new(),
            preview,
            writer,
            pending: Vec::new(),
            shown_frame_tl: None,
        })
    }

    pub fn session(&self) -> &TrimSession {
        &self.session
    }

    pub fn writer(&self) -> &CacheWriter<M> {
        &self.writer
    }

    pub fn position(&self) -> PlaybackPosition {
        self.preview.position()
    }

    /// Most recent decoded preview frame, if any.
    pub fn latest_frame(&self) -> Option<&PreviewFrame> {
        self.preview.latest_frame()
    }

    /// Number of commits whose result has not been polled yet.
    pub fn pending_commits(&self) -> usize {
        self.pending.len()
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::Load { path } => self.load(path),
            Command::SetStart { t_tl } => {
                self.session.set_start(t_tl)?;
                Ok(self.selection_events())
            }
            Command::SetEnd { t_tl } => {
                self.session.set_end(t_tl)?;
                Ok(self.selection_events())
            }
            Command::SelectAll => {
                self.session.select_all()?;
                Ok(self.selection_events())
            }
            Command::ClearSelection => {
                self.session.clear();
                Ok(self.selection_events())
            }
            Command::Play => {
                let position = self.preview.play(&self.session)?;
                Ok(self.playback_events(position))
            }
            Command::Pause => {
                let position = self.preview.pause();
                Ok(vec![Event::PlaybackChanged(position)])
            }
            Command::Seek { t_tl } => {
                let position = self.preview.seek(&self.session, t_tl)?;
                Ok(self.playback_events(position))
            }
            Command::Step { frames } => {
                let position = self.preview.step(&self.session, frames)?;
                Ok(self.playback_events(position))
            }
            Command::Tick { elapsed } => {
                let position = self.preview.tick(&self.session, elapsed);
                let mut events = vec![Event::PlaybackChanged(position)];
                if let Some(frame) = self.unseen_frame(position) {
                    events.push(Event::PreviewFrameReady { frame });
                }
                Ok(events)
            }
            Command::Commit { options } => self.commit(options),
            Command::RemoveEntry { id } => {
                self.writer.remove(id)?;
                Ok(vec![Event::CacheChanged(self.writer.list())])
            }
            Command::LabelEntry { id, label } => {
                self.writer.set_label(id, label)?;
                Ok(vec![Event::CacheChanged(self.writer.list())])
            }
            Command::Prune => {
                let dropped = self.writer.prune()?;
                if dropped.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![Event::CacheChanged(self.writer.list())])
            }
            Command::ListCache => Ok(vec![Event::CacheChanged(self.writer.list())]),
        }
    }

    /// Collects results of finished commits.
    pub fn poll(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut finished_any = false;
        self.pending.retain(|ticket| {
            let Some(result) = ticket.try_result() else {
                return true;
            };
            let (start_tl, end_tl) = ticket.bounds();
            match result {
                Ok(entry) => {
                    finished_any = true;
                    events.push(Event::CommitFinished(entry));
                }
                Err(error) => events.push(Event::CommitFailed {
                    source: ticket.source().to_path_buf(),
                    start_tl,
                    end_tl,
                    error: EngineErrorEvent::from_error(&error),
                }),
            }
            false
        });
        if finished_any {
            events.push(Event::CacheChanged(self.writer.list()));
        }
        events
    }

    fn load(&mut self, path: PathBuf) -> Result<Vec<Event>> {
        let handle = self.session.load_path(self.backend.as_ref(), &path)?;
        let asset = self.session.asset().ok_or(EngineError::AssetUnavailable {
            path: Some(path),
            source: None,
        })?;
        info!(path = ?handle.path, generation = handle.generation, "asset loaded");
        let summary = AssetSummary::from(asset);
        self.shown_frame_tl = None;
        let position = self.preview.tick(&self.session, Duration::ZERO);

        let mut events = vec![Event::AssetLoaded(summary)];
        events.extend(self.selection_events());
        events.push(Event::PlaybackChanged(position));
        Ok(events)
    }

    fn commit(&mut self, options: CommitOptions) -> Result<Vec<Event>> {
        let ticket = self.writer.submit(&self.session, options)?;
        let (start_tl, end_tl) = ticket.bounds();
        let source = ticket.source().to_path_buf();
        debug!(source = ?source, start_tl, end_tl, "commit submitted");
        self.pending.push(ticket);
        Ok(vec![Event::CommitQueued {
            source,
            start_tl,
            end_tl,
        }])
    }

    fn selection_events(&self) -> Vec<Event> {
        vec![Event::SelectionChanged {
            start_tl: self.session.start_tl(),
            end_tl: self.session.end_tl(),
            state: self.session.state(),
        }]
    }

    fn playback_events(&mut self, position: PlaybackPosition) -> Vec<Event> {
        let mut events = vec![Event::PlaybackChanged(position)];
        if !position.syncing {
            if let Some(frame) = self.preview.latest_frame().cloned() {
                self.shown_frame_tl = Some(frame.at_tl);
                events.push(Event::PreviewFrameReady { frame });
            }
        }
        events
    }

    /// A decoded frame that has not been reported yet, once the cursor is
    /// no longer held by a re-sync.
    fn unseen_frame(&mut self, position: PlaybackPosition) -> Option<PreviewFrame> {
        if position.syncing {
            return None;
        }
        let frame = self.preview.latest_frame()?;
        if self.shown_frame_tl == Some(frame.at_tl) {
            return None;
        }
        self.shown_frame_tl = Some(frame.at_tl);
        Some(frame.clone())
    }
}

impl Engine<FfmpegMediaBackend> {
    /// Creates an engine wired to the FFmpeg backend, locating the tools
    /// named in `config` or on `PATH`.
    pub fn with_ffmpeg(config: EngineConfig) -> Result<Self> {
        let tools = config.ffmpeg_tools()?;
        Self::new(FfmpegMediaBackend::new(tools), config)
    }
}
