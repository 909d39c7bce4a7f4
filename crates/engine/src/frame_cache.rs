use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::backend::PreviewFrame;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FrameKey {
    path: PathBuf,
    bucket: i64,
}

/// LRU cache of decoded preview frames, bucketed by asset seek granularity.
///
/// Two timestamps in the same bucket share one frame, so stepping within a
/// frame never triggers a decoder re-sync.
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use trim_engine::frame_cache::PreviewFrameCache;
/// use trim_engine::{PreviewFrame, PreviewPixelFormat};
///
/// let mut cache = PreviewFrameCache::new(8, 40_000);
/// cache.insert(
///     "demo.mp4",
///     PreviewFrame {
///         width: 2,
///         height: 2,
///         format: PreviewPixelFormat::Rgba8,
///         bytes: Arc::from(vec![0; 16]),
///         at_tl: 1_500_000,
///     },
/// );
///
/// assert!(cache.get("demo.mp4", 1_510_000).is_some());
/// ```
#[derive(Debug)]
pub struct PreviewFrameCache {
    capacity: usize,
    bucket_size_tl: i64,
    entries: HashMap<FrameKey, PreviewFrame>,
    lru_order: VecDeque<FrameKey>,
}

impl PreviewFrameCache {
    /// Creates a frame cache. Zero values are raised to one.
    pub fn new(capacity: usize, bucket_size_tl: i64) -> Self {
        Self {
            capacity: capacity.max(1),
            bucket_size_tl: bucket_size_tl.max(1),
            entries: HashMap::new(),
            lru_order: VecDeque::new(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket_size_tl(&self) -> i64 {
        self.bucket_size_tl
    }

    /// Changes the bucket size; cached frames are dropped when it differs.
    pub fn reconfigure_bucket_size(&mut self, bucket_size_tl: i64) {
        let bucket_size_tl = bucket_size_tl.max(1);
        if bucket_size_tl != self.bucket_size_tl {
            self.bucket_size_tl = bucket_size_tl;
            self.clear();
        }
    }

    pub fn contains(&self, path: impl AsRef<Path>, at_tl: i64) -> bool {
        let key = self.make_key(path.as_ref(), at_tl);
        self.entries.contains_key(&key)
    }

    /// Returns one cached frame and marks it as recently used.
    pub fn get(&mut self, path: impl AsRef<Path>, at_tl: i64) -> Option<PreviewFrame> {
        let key = self.make_key(path.as_ref(), at_tl);
        let frame = self.entries.get(&key)?.clone();
        self.touch(&key);
        Some(frame)
    }

    /// Inserts a frame under the bucket of its own `at_tl`.
    pub fn insert(&mut self, path: impl AsRef<Path>, frame: PreviewFrame) {
        let key = self.make_key(path.as_ref(), frame.at_tl);
        self.entries.insert(key.clone(), frame);
        self.touch(&key);
        self.evict_if_needed();
    }

    fn make_key(&self, path: &Path, at_tl: i64) -> FrameKey {
        FrameKey {
            path: path.to_path_buf(),
            bucket: at_tl.max(0).div_euclid(self.bucket_size_tl),
        }
    }

    fn touch(&mut self, key: &FrameKey) {
        if let Some(index) = self.lru_order.iter().position(|existing| existing == key) {
            let _ = self.lru_order.remove(index);
        }
        self.lru_order.push_back(key.clone());
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.lru_order.pop_front() else {
                break;
            };
            let _ = self.entries.remove(&oldest);
        }
    }
}
