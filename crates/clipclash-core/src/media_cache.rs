use std::{
    collections::HashMap,
    mem,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::media::MediaError;

pub const MAX_CACHE_ENTRIES: usize = 500;
pub const MAX_CACHE_BYTES: usize = 150 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioData {
    pub raw_data: Vec<f32>,
    pub sample_rate: u32,
    pub duration: f64,
    pub global_max: f32,
}

impl AudioData {
    #[must_use]
    pub fn from_samples(raw_data: Vec<f32>, sample_rate: u32) -> Self {
        let duration = crate::time::samples_to_seconds(raw_data.len(), sample_rate);
        let global_max = raw_data.iter().copied().map(f32::abs).fold(0.0_f32, f32::max);
        Self {
            raw_data,
            sample_rate,
            duration,
            global_max,
        }
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.raw_data.len() * mem::size_of::<f32>()
    }
}

pub type DecodeResult = Result<Arc<AudioData>, MediaError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: MAX_CACHE_ENTRIES,
            max_bytes: MAX_CACHE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hit_rate: Option<f64>,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hit_rate = self
            .hit_rate
            .map_or_else(|| "N/A".to_string(), |rate| format!("{:.1}%", rate * 100.0));
        write!(
            f,
            "{}/{} entries | {}/{} | Hit rate: {hit_rate}",
            self.entries,
            self.max_entries,
            format_bytes(self.bytes),
            format_bytes(self.max_bytes),
        )
    }
}

#[derive(Clone, Default)]
pub struct PendingAudio {
    slot: Arc<PendingSlot>,
}

type PendingMap = Mutex<HashMap<String, PendingAudio>>;

#[derive(Default)]
struct PendingSlot {
    result: Mutex<Option<DecodeResult>>,
    ready: Condvar,
    registrations: Mutex<Vec<(Weak<PendingMap>, String)>>,
}

impl std::fmt::Debug for PendingAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAudio")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl PendingAudio {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, result: DecodeResult) {
        {
            let mut slot = self.slot.result.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(result);
            self.slot.ready.notify_all();
        }

        let registrations = mem::take(&mut *self.slot.registrations.lock());
        for (map, src) in registrations {
            let Some(map) = map.upgrade() else {
                continue;
            };
            let mut map = map.lock();
            if map.get(&src).is_some_and(|current| current.same_slot(self)) {
                map.remove(&src);
            }
        }
    }

    fn register(&self, map: &Arc<PendingMap>, src: &str) {
        self.slot
            .registrations
            .lock()
            .push((Arc::downgrade(map), src.to_string()));
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.result.lock().is_some()
    }

    #[must_use]
    pub fn try_result(&self) -> Option<DecodeResult> {
        self.slot.result.lock().clone()
    }

    #[must_use]
    pub fn wait(&self) -> DecodeResult {
        let mut slot = self.slot.result.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.slot.ready.wait(&mut slot);
        }
    }

    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<DecodeResult> {
        let mut slot = self.slot.result.lock();
        if slot.is_none() {
            let _ = self.slot.ready.wait_for(&mut slot, timeout);
        }
        slot.clone()
    }

    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

struct CacheEntry {
    data: Arc<AudioData>,
    byte_size: usize,
}

#[derive(Default)]
struct CacheTable {
    entries: IndexMap<String, CacheEntry>,
    total_bytes: usize,
}

pub struct MediaCache {
    limits: CacheLimits,
    table: RwLock<CacheTable>,
    pending: Arc<PendingMap>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for MediaCache {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

static GLOBAL_CACHE: OnceLock<Arc<MediaCache>> = OnceLock::new();

impl MediaCache {
    #[must_use]
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            table: RwLock::new(CacheTable::default()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_CACHE.get_or_init(|| Arc::new(Self::default())))
    }

    pub fn init_global(limits: CacheLimits) -> bool {
        GLOBAL_CACHE.set(Arc::new(Self::new(limits))).is_ok()
    }

    #[must_use]
    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn get_audio(&self, src: &str) -> Option<Arc<AudioData>> {
        let found = self
            .table
            .read()
            .entries
            .get(src)
            .map(|entry| Arc::clone(&entry.data));

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(src, "media cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn set_audio(&self, src: impl Into<String>, data: impl Into<Arc<AudioData>>) {
        let src = src.into();
        let data = data.into();
        let byte_size = data.byte_size();

        let mut table = self.table.write();
        if let Some(previous) = table.entries.shift_remove(&src) {
            table.total_bytes -= previous.byte_size;
        }
        table.entries.insert(src, CacheEntry { data, byte_size });
        table.total_bytes += byte_size;

        let evicted = self.evict_if_needed(&mut table);
        if evicted > 0 {
            info!(
                evicted,
                used = %format_bytes(table.total_bytes),
                "media cache evicted entries"
            );
        }
        info!(
            size = %format_bytes(byte_size),
            total = %format_bytes(table.total_bytes),
            entries = table.entries.len(),
            "audio cached"
        );
    }

    fn evict_if_needed(&self, table: &mut CacheTable) -> usize {
        let mut evicted = 0;
        while table.entries.len() > self.limits.max_entries
            || table.total_bytes > self.limits.max_bytes
        {
            let Some((_, entry)) = table.entries.shift_remove_index(0) else {
                break;
            };
            table.total_bytes -= entry.byte_size;
            evicted += 1;
        }
        evicted
    }

    #[must_use]
    pub fn get_pending_audio(&self, src: &str) -> Option<PendingAudio> {
        self.pending.lock().get(src).cloned()
    }

    pub fn set_pending_audio(&self, src: impl Into<String>, pending: PendingAudio) {
        let src = src.into();
        let mut map = self.pending.lock();
        pending.register(&self.pending, &src);
        if pending.is_resolved() {
            return;
        }
        map.insert(src, pending);
    }

    pub fn claim_pending_audio(&self, src: &str, pending: PendingAudio) -> (PendingAudio, bool) {
        let mut map = self.pending.lock();
        if let Some(existing) = map.get(src) {
            return (existing.clone(), false);
        }
        pending.register(&self.pending, src);
        map.insert(src.to_string(), pending.clone());
        (pending, true)
    }

    pub fn complete_pending(&self, src: &str, pending: &PendingAudio, result: DecodeResult) {
        if let Ok(data) = &result {
            self.set_audio(src, Arc::clone(data));
        }
        pending.resolve(result);
    }

    pub fn clear(&self) {
        let mut table = self.table.write();
        let previous_entries = table.entries.len();
        let previous_bytes = table.total_bytes;
        table.entries.clear();
        table.total_bytes = 0;
        info!(
            entries = previous_entries,
            freed = %format_bytes(previous_bytes),
            "media cache cleared"
        );
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let table = self.table.read();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            entries: table.entries.len(),
            bytes: table.total_bytes,
            max_entries: self.limits.max_entries,
            max_bytes: self.limits.max_bytes,
            #[allow(clippy::cast_precision_loss)]
            hit_rate: (total > 0).then(|| hits as f64 / total as f64),
        }
    }

    pub fn log_stats(&self) {
        info!(stats = %self.stats(), "media cache stats");
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.table.read().entries.keys().cloned().collect()
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;
    if bytes < KIB {
        format!("{bytes}B")
    } else if bytes < MIB {
        format!("{:.1}KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    }
}
