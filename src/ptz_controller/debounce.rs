//! Move debounce and preset TTL cache
//!
//! Both are plain state structs owned by a control session, driven with an
//! explicit `now` so they can be tested without a device.

use super::types::Preset;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between dispatched moves
pub const MOVE_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Preset list lifetime
pub const PRESET_CACHE_TTL: Duration = Duration::from_secs(30);

/// Coalesces rapid move commands
#[derive(Debug, Clone)]
pub struct MoveDebouncer {
    window: Duration,
    last_move: Option<Instant>,
}

impl MoveDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_move: None,
        }
    }

    /// True if a move at `now` should reach the device
    ///
    /// Only dispatched moves advance the window.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_move {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_move = Some(now);
        true
    }

    /// Called on stop so the next move is dispatched immediately
    pub fn reset(&mut self) {
        self.last_move = None;
    }
}

impl Default for MoveDebouncer {
    fn default() -> Self {
        Self::new(MOVE_DEBOUNCE_WINDOW)
    }
}

/// Cached preset list
#[derive(Debug, Clone)]
struct PresetCacheEntry {
    presets: Vec<Preset>,
    fetched_at: Instant,
}

/// TTL cache for a device's preset list
#[derive(Debug, Clone)]
pub struct PresetCache {
    ttl: Duration,
    entry: Option<PresetCacheEntry>,
}

impl PresetCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Cached list if still fresh at `now`
    pub fn get(&self, now: Instant) -> Option<Vec<Preset>> {
        self.entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.fetched_at) < self.ttl)
            .map(|e| e.presets.clone())
    }

    pub fn store(&mut self, presets: Vec<Preset>, now: Instant) {
        self.entry = Some(PresetCacheEntry {
            presets,
            fetched_at: now,
        });
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

impl Default for PresetCache {
    fn default() -> Self {
        Self::new(PRESET_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presets() -> Vec<Preset> {
        vec![
            Preset {
                id: "1".into(),
                name: "Altar".into(),
            },
            Preset {
                id: "2".into(),
                name: "Choir".into(),
            },
        ]
    }

    #[test]
    fn test_moves_inside_window_coalesced() {
        let mut debouncer = MoveDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.admit(t0));
        assert!(!debouncer.admit(t0 + Duration::from_millis(40)));
        assert!(!debouncer.admit(t0 + Duration::from_millis(99)));
        assert!(debouncer.admit(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_coalesced_moves_do_not_extend_window() {
        let mut debouncer = MoveDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.admit(t0));
        for ms in [30, 60, 90] {
            assert!(!debouncer.admit(t0 + Duration::from_millis(ms)));
        }
        assert!(debouncer.admit(t0 + Duration::from_millis(120)));
    }

    #[test]
    fn test_reset_rearms() {
        let mut debouncer = MoveDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.admit(t0));
        debouncer.reset();
        assert!(debouncer.admit(t0 + Duration::from_millis(10)));
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let mut cache = PresetCache::default();
        let t0 = Instant::now();
        assert!(cache.get(t0).is_none());

        cache.store(presets(), t0);
        assert_eq!(cache.get(t0 + Duration::from_secs(29)), Some(presets()));
        assert!(cache.get(t0 + Duration::from_secs(30)).is_none());
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = PresetCache::default();
        let t0 = Instant::now();
        cache.store(presets(), t0);
        cache.clear();
        assert!(cache.get(t0).is_none());
    }
}
