//! Preview loop controller: a cooperative playback cursor bounded by the
//! trim selection.
//!
//! The host owns the clock and calls [`PreviewLoop::tick`] with the elapsed
//! wall time. Nothing here blocks; frame decoding after a seek runs on a
//! background thread and is picked up by later ticks.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, warn};

use crate::asset::Asset;
use crate::backend::{MediaBackend, PreviewFrame};
use crate::error::{EngineError, Result};
use crate::frame_cache::PreviewFrameCache;
use crate::session::TrimSession;
use crate::time::duration_to_tl;

const DEFAULT_FRAME_CACHE_CAPACITY: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Paused,
    Playing,
    /// Reached the last tick of an asset without a selection.
    Ended,
}

/// Cursor state reported to the host after every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub position_tl: i64,
    pub state: PlaybackState,
    /// A decoder re-sync is in flight; the position is the last known one.
    pub syncing: bool,
    /// Completed passes over the selection since playback was reset.
    pub loop_count: u64,
    /// The last tick wrapped from the selection end back to its start.
    pub wrapped: bool,
}

/// Range the cursor may occupy: `[start, end)` and whether it loops.
#[derive(Debug, Clone, Copy)]
struct ActiveRange {
    start_tl: i64,
    end_tl: i64,
    looping: bool,
}

impl ActiveRange {
    fn of(session: &TrimSession) -> Option<Self> {
        let asset = session.asset()?;
        Some(match session.current_selection() {
            Some(selection) => Self {
                start_tl: selection.start_tl,
                end_tl: selection.end_tl,
                looping: true,
            },
            None => Self {
                start_tl: 0,
                end_tl: asset.duration_tl,
                looping: false,
            },
        })
    }

    fn last_tick(&self) -> i64 {
        self.end_tl - 1
    }

    fn clamp(&self, t_tl: i64) -> i64 {
        t_tl.clamp(self.start_tl, self.last_tick())
    }
}

struct PendingSync {
    target_tl: i64,
    path: PathBuf,
    receiver: Receiver<Result<PreviewFrame>>,
    /// Seeks hold the cursor until their frame arrives; loop wraps do not.
    holds_cursor: bool,
}

/// Drives looped preview playback for one [`TrimSession`].
pub struct PreviewLoop {
    decoder: Option<Arc<dyn MediaBackend>>,
    frames: PreviewFrameCache,
    generation: Option<u64>,
    position_tl: i64,
    state: PlaybackState,
    loop_count: u64,
    pending: Option<PendingSync>,
    latest_frame: Option<PreviewFrame>,
}

impl std::fmt::Debug for PreviewLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewLoop")
            .field("has_decoder", &self.decoder.is_some())
            .field("generation", &self.generation)
            .field("position_tl", &self.position_tl)
            .field("state", &self.state)
            .field("loop_count", &self.loop_count)
            .field("syncing", &self.holds_cursor())
            .finish()
    }
}

impl Default for PreviewLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewLoop {
    /// Creates a controller that only tracks time.
    pub fn new() -> Self {
        Self {
            decoder: None,
            frames: PreviewFrameCache::new(DEFAULT_FRAME_CACHE_CAPACITY, 1),
            generation: None,
            position_tl: 0,
            state: PlaybackState::Paused,
            loop_count: 0,
            pending: None,
            latest_frame: None,
        }
    }

    /// Creates a controller that also decodes preview frames after seeks.
    pub fn with_decoder(decoder: Arc<dyn MediaBackend>, cache_frames: usize) -> Self {
        Self {
            decoder: Some(decoder),
            frames: PreviewFrameCache::new(cache_frames, 1),
            ..Self::new()
        }
    }

    pub fn position(&self) -> PlaybackPosition {
        self.report(false)
    }

    pub fn latest_frame(&self) -> Option<&PreviewFrame> {
        self.latest_frame.as_ref()
    }

    /// Starts playback. After `Ended` the cursor restarts from the range start.
    pub fn play(&mut self, session: &TrimSession) -> Result<PlaybackPosition> {
        self.sync_generation(session);
        let (asset, range) = loaded(session)?;
        let target = if self.state == PlaybackState::Ended {
            range.start_tl
        } else {
            range.clamp(self.position_tl)
        };
        self.state = PlaybackState::Playing;
        if target != self.position_tl || self.latest_frame.is_none() {
            self.position_tl = target;
            self.request_frame(asset, target, true);
        }
        debug!(position_tl = self.position_tl, "playback started");
        Ok(self.report(false))
    }

    /// Halts the cursor where it is.
    pub fn pause(&mut self) -> PlaybackPosition {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            debug!(position_tl = self.position_tl, "playback paused");
        }
        self.report(false)
    }

    /// Moves the cursor, clamping into the active range.
    pub fn seek(&mut self, session: &TrimSession, t_tl: i64) -> Result<PlaybackPosition> {
        self.sync_generation(session);
        let (asset, range) = loaded(session)?;
        let target = range.clamp(t_tl);
        if self.state == PlaybackState::Ended {
            self.state = PlaybackState::Paused;
        }
        self.position_tl = target;
        self.request_frame(asset, target, true);
        debug!(requested_tl = t_tl, position_tl = target, "preview seek");
        Ok(self.report(false))
    }

    /// Moves by whole seek-granularity steps; negative values step back.
    pub fn step(&mut self, session: &TrimSession, frames: i64) -> Result<PlaybackPosition> {
        self.sync_generation(session);
        let (asset, _) = loaded(session)?;
        let delta = frames.saturating_mul(asset.granularity_tl);
        let target = self.position_tl.saturating_add(delta);
        self.seek(session, target)
    }

    /// Advances the cursor by `elapsed` if playing.
    ///
    /// With a selection the cursor wraps from its end to its start carrying
    /// the overflow; without one it stops at the last tick of the asset.
    /// While a re-sync started by a seek is pending the cursor holds still.
    /// The decode started by a wrap runs behind a moving cursor.
    pub fn tick(&mut self, session: &TrimSession, elapsed: Duration) -> PlaybackPosition {
        self.sync_generation(session);
        let Some((asset, range)) = session.asset().zip(ActiveRange::of(session)) else {
            return self.report(false);
        };

        if self.poll_pending() {
            return self.report(false);
        }
        self.position_tl = range.clamp(self.position_tl);
        if self.state != PlaybackState::Playing {
            return self.report(false);
        }

        let advanced = self.position_tl.saturating_add(duration_to_tl(elapsed));
        if !range.looping {
            if advanced >= range.last_tick() {
                self.position_tl = range.last_tick();
                self.state = PlaybackState::Ended;
                debug!(position_tl = self.position_tl, "playback reached asset end");
            } else {
                self.position_tl = advanced;
            }
            self.refresh_from_cache(asset);
            return self.report(false);
        }

        if advanced < range.end_tl {
            self.position_tl = advanced;
            self.refresh_from_cache(asset);
            return self.report(false);
        }

        let length = range.end_tl - range.start_tl;
        let overflow = advanced - range.end_tl;
        let passes = 1 + overflow / length;
        self.position_tl = range.start_tl + overflow % length;
        self.loop_count = self.loop_count.saturating_add(passes as u64);
        debug!(
            position_tl = self.position_tl,
            loop_count = self.loop_count,
            "playback wrapped to selection start"
        );
        self.request_frame(asset, self.position_tl, false);
        self.report(true)
    }

    fn report(&self, wrapped: bool) -> PlaybackPosition {
        PlaybackPosition {
            position_tl: self.position_tl,
            state: self.state,
            syncing: self.holds_cursor(),
            loop_count: self.loop_count,
            wrapped,
        }
    }

    fn holds_cursor(&self) -> bool {
        self.pending.as_ref().is_some_and(|pending| pending.holds_cursor)
    }

    /// Resets everything when the session loaded a different asset.
    fn sync_generation(&mut self, session: &TrimSession) {
        let generation = session.generation();
        if self.generation == Some(generation) {
            return;
        }
        if self.generation.is_some() {
            debug!(generation, "session reloaded; preview loop reset");
        }
        self.generation = Some(generation);
        self.position_tl = 0;
        self.state = PlaybackState::Paused;
        self.loop_count = 0;
        self.pending = None;
        self.latest_frame = None;
        self.frames.clear();
        if let Some(asset) = session.asset() {
            self.frames.reconfigure_bucket_size(asset.granularity_tl);
        }
    }

    /// Collects a finished re-sync. Returns true while one that holds the
    /// cursor is still running.
    fn poll_pending(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        match pending.receiver.try_recv() {
            Err(TryRecvError::Empty) => {
                let holds_cursor = pending.holds_cursor;
                self.pending = Some(pending);
                holds_cursor
            }
            Ok(Ok(frame)) => {
                debug!(target_tl = pending.target_tl, "preview re-sync finished");
                self.frames.insert(&pending.path, frame.clone());
                self.latest_frame = Some(frame);
                false
            }
            Ok(Err(error)) => {
                warn!(target_tl = pending.target_tl, %error, "preview decode failed");
                false
            }
            Err(TryRecvError::Disconnected) => false,
        }
    }

    fn refresh_from_cache(&mut self, asset: &Asset) {
        if let Some(frame) = self.frames.get(&asset.path, self.position_tl) {
            self.latest_frame = Some(frame);
        }
    }

    /// Shows the frame at `target_tl`, decoding it in the background on a miss.
    fn request_frame(&mut self, asset: &Asset, target_tl: i64, holds_cursor: bool) {
        let Some(decoder) = self.decoder.as_ref() else {
            return;
        };
        if asset.video.is_none() {
            return;
        }
        if let Some(frame) = self.frames.get(&asset.path, target_tl) {
            self.pending = None;
            self.latest_frame = Some(frame);
            return;
        }

        let (sender, receiver) = crossbeam_channel::bounded(1);
        let decoder = Arc::clone(decoder);
        let asset_for_thread = asset.clone();
        let spawned = thread::Builder::new()
            .name("preview-resync".to_string())
            .spawn(move || {
                let result = decoder.decode_preview_frame(&asset_for_thread, target_tl);
                let _ = sender.send(result);
            });
        match spawned {
            Ok(_) => {
                debug!(target_tl, holds_cursor, "preview re-sync started");
                self.pending = Some(PendingSync {
                    target_tl,
                    path: asset.path.clone(),
                    receiver,
                    holds_cursor,
                });
            }
            Err(error) => warn!(target_tl, %error, "could not start preview re-sync"),
        }
    }
}

fn loaded(session: &TrimSession) -> Result<(&Asset, ActiveRange)> {
    session
        .asset()
        .zip(ActiveRange::of(session))
        .ok_or(EngineError::AssetUnavailable {
            path: None,
            source: None,
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{PlaybackPosition, PlaybackState, PreviewLoop};
    use crate::session::TrimSession;
    use crate::testing::{MockBackend, write_source};

    fn session_with_selection(
        backend: &MockBackend,
        selection: Option<(i64, i64)>,
    ) -> (tempfile::TempDir, TrimSession) {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = write_source(dir.path(), "demo.mp4");
        let mut session = TrimSession::new();
        session.load_path(backend, &source).expect("load");
        if let Some((start, end)) = selection {
            session.set_start(start).expect("set start");
            session.set_end(end).expect("set end");
        }
        (dir, session)
    }

    fn millis(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn wait_for_sync(controller: &mut PreviewLoop, session: &TrimSession) -> PlaybackPosition {
        let started = Instant::now();
        loop {
            let position = controller.tick(session, Duration::ZERO);
            if !position.syncing {
                return position;
            }
            assert!(
                started.elapsed() < Duration::from_secs(5),
                "re-sync did not finish"
            );
            thread::sleep(millis(5));
        }
    }

    #[test]
    fn ticking_past_selection_end_wraps_to_selection_start() {
        let (_dir, session) =
            session_with_selection(&MockBackend::default(), Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::new();
        controller.seek(&session, 4_900_000).expect("seek");
        controller.play(&session).expect("play");

        let position = controller.tick(&session, millis(200));

        assert!(position.wrapped);
        assert_eq!(position.position_tl, 2_100_000);
        assert_eq!(position.loop_count, 1);
        assert_eq!(position.state, PlaybackState::Playing);
    }

    #[test]
    fn long_tick_carries_overflow_modulo_selection_length() {
        let (_dir, session) =
            session_with_selection(&MockBackend::default(), Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::new();
        controller.play(&session).expect("play");
        assert_eq!(controller.position().position_tl, 2_000_000);

        let position = controller.tick(&session, millis(7_500));

        assert_eq!(position.position_tl, 3_500_000);
        assert_eq!(position.loop_count, 2);
    }

    #[test]
    fn position_never_leaves_selection_while_looping() {
        let (_dir, session) =
            session_with_selection(&MockBackend::default(), Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::new();
        controller.play(&session).expect("play");

        for step in [16_u64, 33, 250, 999, 3_000, 17, 4_321] {
            let position = controller.tick(&session, millis(step));
            assert!(
                (2_000_000..5_000_000).contains(&position.position_tl),
                "position {} escaped the selection",
                position.position_tl
            );
        }
    }

    #[test]
    fn playback_without_selection_stops_at_last_tick_and_restarts() {
        let (_dir, session) = session_with_selection(&MockBackend::default(), None);
        let mut controller = PreviewLoop::new();
        controller.play(&session).expect("play");

        let position = controller.tick(&session, millis(11_000));
        assert_eq!(position.state, PlaybackState::Ended);
        assert_eq!(position.position_tl, 9_999_999);
        assert!(!position.wrapped);

        let position = controller.tick(&session, millis(500));
        assert_eq!(position.position_tl, 9_999_999);

        let position = controller.play(&session).expect("play again");
        assert_eq!(position.state, PlaybackState::Playing);
        assert_eq!(position.position_tl, 0);
    }

    #[test]
    fn seek_outside_selection_is_clamped() {
        let (_dir, session) =
            session_with_selection(&MockBackend::default(), Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::new();

        assert_eq!(
            controller.seek(&session, 0).expect("seek").position_tl,
            2_000_000
        );
        assert_eq!(
            controller.seek(&session, 9_000_000).expect("seek").position_tl,
            4_999_999
        );
    }

    #[test]
    fn pause_holds_position() {
        let (_dir, session) =
            session_with_selection(&MockBackend::default(), Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::new();
        controller.play(&session).expect("play");
        controller.tick(&session, millis(400));

        let paused = controller.pause();
        let later = controller.tick(&session, millis(900));

        assert_eq!(paused.state, PlaybackState::Paused);
        assert_eq!(later.position_tl, 2_400_000);
    }

    #[test]
    fn step_moves_by_frames_and_clamps() {
        let (_dir, session) =
            session_with_selection(&MockBackend::default(), Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::new();
        controller.seek(&session, 2_000_000).expect("seek");

        assert_eq!(
            controller.step(&session, 3).expect("step").position_tl,
            2_120_000
        );
        assert_eq!(
            controller.step(&session, -100).expect("step").position_tl,
            2_000_000
        );
    }

    #[test]
    fn reloading_session_resets_controller() {
        let backend = MockBackend::default();
        let (dir, mut session) = session_with_selection(&backend, Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::new();
        controller.play(&session).expect("play");
        controller.tick(&session, millis(3_500));

        let other = write_source(dir.path(), "other.mp4");
        session.load_path(&backend, &other).expect("reload");
        let position = controller.tick(&session, millis(100));

        assert_eq!(position.position_tl, 0);
        assert_eq!(position.state, PlaybackState::Paused);
        assert_eq!(position.loop_count, 0);
    }

    #[test]
    fn controller_calls_fail_on_unloaded_session() {
        let session = TrimSession::new();
        let mut controller = PreviewLoop::new();

        assert!(controller.play(&session).is_err());
        assert!(controller.seek(&session, 0).is_err());
        let position = controller.tick(&session, millis(100));
        assert_eq!(position.position_tl, 0);
    }

    #[test]
    fn seek_cache_miss_reports_syncing_until_frame_arrives() {
        let (release, gate) = crossbeam_channel::unbounded();
        let backend = MockBackend::default().with_decode_gate(gate);
        let (_dir, session) = session_with_selection(&backend, Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::with_decoder(Arc::new(backend.clone()), 8);
        controller.play(&session).expect("play");
        release.send(()).expect("release first decode");
        wait_for_sync(&mut controller, &session);

        let position = controller.seek(&session, 3_000_000).expect("seek");
        assert!(position.syncing);
        let held = controller.tick(&session, millis(250));
        assert!(held.syncing);
        assert_eq!(held.position_tl, 3_000_000);

        release.send(()).expect("release decode");
        let position = wait_for_sync(&mut controller, &session);
        assert_eq!(position.position_tl, 3_000_000);
        let frame = controller.latest_frame().expect("frame decoded");
        assert_eq!(frame.at_tl, 3_000_000);

        let position = controller.seek(&session, 3_010_000).expect("seek within frame");
        assert!(!position.syncing);
        assert_eq!(backend.decode_calls(), vec![2_000_000, 3_000_000]);
    }

    #[test]
    fn wrap_decode_does_not_freeze_looping_cursor() {
        let (release, gate) = crossbeam_channel::unbounded();
        let backend = MockBackend::default().with_decode_gate(gate);
        let (_dir, session) = session_with_selection(&backend, Some((2_000_000, 5_000_000)));
        let mut controller = PreviewLoop::with_decoder(Arc::new(backend.clone()), 8);
        controller.seek(&session, 4_990_000).expect("seek");
        release.send(()).expect("release seek decode");
        wait_for_sync(&mut controller, &session);
        controller.play(&session).expect("play");

        let wrapped = controller.tick(&session, millis(20));
        assert!(wrapped.wrapped);
        assert!(!wrapped.syncing);
        assert_eq!(wrapped.position_tl, 2_010_000);

        let mut expected = 2_010_000;
        for _ in 0..3 {
            expected += 40_000;
            let position = controller.tick(&session, millis(40));
            assert!(!position.syncing);
            assert_eq!(position.position_tl, expected);
        }

        release.send(()).expect("release wrap decode");
        let started = Instant::now();
        while controller.latest_frame().map(|frame| frame.at_tl) != Some(2_010_000) {
            assert!(
                started.elapsed() < Duration::from_secs(5),
                "wrap decode never delivered"
            );
            controller.tick(&session, Duration::ZERO);
            thread::sleep(millis(5));
        }
        assert_eq!(backend.decode_calls(), vec![4_990_000, 2_010_000]);
    }
}
