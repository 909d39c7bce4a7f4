//! Trim session: one loaded asset plus the in/out selection against it.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::asset::{Asset, probe_asset};
use crate::backend::MediaBackend;
use crate::error::{EngineError, NotCommittableReason, Result};

/// Identifies one `load` of a session; a new load yields a new generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub generation: u64,
    pub path: PathBuf,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    NoSelection,
    /// Exactly one bound is set.
    Partial,
    /// Both bounds are set and ordered.
    Ready,
}

/// Half-open range `[start_tl, end_tl)` in asset-relative ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start_tl: i64,
    pub end_tl: i64,
}

impl Selection {
    pub fn duration_tl(&self) -> i64 {
        self.end_tl - self.start_tl
    }

    pub fn contains(&self, t_tl: i64) -> bool {
        (self.start_tl..self.end_tl).contains(&t_tl)
    }
}

/// Asset and selection captured by value for one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSnapshot {
    pub asset: Asset,
    pub selection: Selection,
    pub generation: u64,
}

/// Mutable trim state for one editing focus.
///
/// Every mutation keeps `0 <= start < end <= duration - 1`; a bound that
/// would cross the other pushes it away by one seek granularity step.
#[derive(Debug, Default)]
pub struct TrimSession {
    asset: Option<Asset>,
    start_tl: Option<i64>,
    end_tl: Option<i64>,
    generation: u64,
}

impl TrimSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any prior asset and selection.
    pub fn load(&mut self, asset: Asset) -> SessionHandle {
        self.generation += 1;
        self.start_tl = None;
        self.end_tl = None;
        info!(
            path = ?asset.path,
            duration_tl = asset.duration_tl,
            generation = self.generation,
            "asset loaded into trim session"
        );
        let handle = SessionHandle {
            generation: self.generation,
            path: asset.path.clone(),
        };
        self.asset = Some(asset);
        handle
    }

    /// Probes `path` and loads it. On failure the session is left unloaded.
    pub fn load_path<M>(&mut self, backend: &M, path: impl AsRef<Path>) -> Result<SessionHandle>
    where
        M: MediaBackend + ?Sized,
    {
        let path = path.as_ref();
        match probe_asset(backend, path) {
            Ok(asset) => Ok(self.load(asset)),
            Err(error) => {
                warn!(path = ?path, %error, "probe failed; session unloaded");
                self.unload();
                Err(EngineError::AssetUnavailable {
                    path: Some(path.to_path_buf()),
                    source: Some(Box::new(error)),
                })
            }
        }
    }

    pub fn unload(&mut self) {
        self.generation += 1;
        self.asset = None;
        self.start_tl = None;
        self.end_tl = None;
    }

    pub fn asset(&self) -> Option<&Asset> {
        self.asset.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> SessionState {
        if self.asset.is_none() {
            return SessionState::Unloaded;
        }
        match (self.start_tl, self.end_tl) {
            (None, None) => SessionState::NoSelection,
            (Some(_), Some(_)) => SessionState::Ready,
            _ => SessionState::Partial,
        }
    }

    pub fn start_tl(&self) -> Option<i64> {
        self.start_tl
    }

    pub fn end_tl(&self) -> Option<i64> {
        self.end_tl
    }

    /// Sets the in point. An in point at or past the out point moves the
    /// out point to `t + granularity`.
    pub fn set_start(&mut self, t_tl: i64) -> Result<()> {
        let asset = self.loaded_asset()?;
        let (max, step) = (asset.max_tick(), asset.granularity_tl);
        let start = t_tl.clamp(0, max);

        match self.end_tl {
            Some(end) if start >= end => {
                let end = start.saturating_add(step).min(max);
                let start = start.min(end - step).max(0);
                self.apply_bounds(start, end);
            }
            _ => self.start_tl = Some(start),
        }
        debug!(
            requested_tl = t_tl,
            start_tl = ?self.start_tl,
            end_tl = ?self.end_tl,
            "selection start set"
        );
        Ok(())
    }

    /// Sets the out point. An out point at or before the in point moves the
    /// in point to `t - granularity`.
    pub fn set_end(&mut self, t_tl: i64) -> Result<()> {
        let asset = self.loaded_asset()?;
        let (max, step) = (asset.max_tick(), asset.granularity_tl);
        let end = t_tl.clamp(0, max);

        match self.start_tl {
            Some(start) if end <= start => {
                let start = end.saturating_sub(step).max(0);
                let end = end.max(start.saturating_add(step)).min(max);
                self.apply_bounds(start, end);
            }
            _ => self.end_tl = Some(end),
        }
        debug!(
            requested_tl = t_tl,
            start_tl = ?self.start_tl,
            end_tl = ?self.end_tl,
            "selection end set"
        );
        Ok(())
    }

    /// Selects the whole decodable range.
    pub fn select_all(&mut self) -> Result<()> {
        let max = self.loaded_asset()?.max_tick();
        self.apply_bounds(0, max);
        Ok(())
    }

    /// Unsets both bounds; the asset stays loaded.
    pub fn clear(&mut self) {
        self.start_tl = None;
        self.end_tl = None;
    }

    pub fn current_selection(&self) -> Option<Selection> {
        match (self.start_tl, self.end_tl) {
            (Some(start_tl), Some(end_tl)) => Some(Selection { start_tl, end_tl }),
            _ => None,
        }
    }

    pub fn is_committable(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// Captures asset and selection by value for a commit.
    pub fn snapshot(&self) -> Result<CommitSnapshot> {
        let not_committable = |reason| EngineError::NotCommittable { reason };
        let asset = self
            .asset
            .as_ref()
            .ok_or(not_committable(NotCommittableReason::NoAsset))?;
        let selection = self
            .current_selection()
            .ok_or(not_committable(NotCommittableReason::SelectionIncomplete))?;
        if asset.is_stale() {
            return Err(not_committable(NotCommittableReason::AssetChanged));
        }
        Ok(CommitSnapshot {
            asset: asset.clone(),
            selection,
            generation: self.generation,
        })
    }

    /// Re-probes the asset when its file changed on disk.
    ///
    /// Returns `Ok(true)` when a new probe replaced the asset. The selection
    /// survives, clamped to the new duration.
    pub fn reprobe_if_stale<M>(&mut self, backend: &M) -> Result<bool>
    where
        M: MediaBackend + ?Sized,
    {
        let asset = self.loaded_asset()?;
        if !asset.is_stale() {
            return Ok(false);
        }
        let path = asset.path.clone();
        let asset = match probe_asset(backend, &path) {
            Ok(asset) => asset,
            Err(error) => {
                warn!(path = ?path, %error, "re-probe failed; session unloaded");
                self.unload();
                return Err(EngineError::AssetUnavailable {
                    path: Some(path),
                    source: Some(Box::new(error)),
                });
            }
        };

        let (start, end) = (self.start_tl.take(), self.end_tl.take());
        self.generation += 1;
        info!(
            path = ?asset.path,
            duration_tl = asset.duration_tl,
            generation = self.generation,
            "asset re-probed after change"
        );
        self.asset = Some(asset);
        if let Some(start) = start {
            self.set_start(start)?;
        }
        if let Some(end) = end {
            self.set_end(end)?;
        }
        Ok(true)
    }

    fn loaded_asset(&self) -> Result<&Asset> {
        self.asset.as_ref().ok_or(EngineError::AssetUnavailable {
            path: None,
            source: None,
        })
    }

    fn apply_bounds(&mut self, start: i64, end: i64) {
        self.start_tl = Some(start);
        // A one-tick asset cannot hold an ordered pair.
        self.end_tl = (end > start).then_some(end);
    }
}
