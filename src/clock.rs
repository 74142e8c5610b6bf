#[cfg(not(target_arch = "wasm32"))]
use std::sync::OnceLock;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

use crate::config::{MINIMAL_LOGGING, STATS_UPDATE_INTERVAL, STATS_WINDOW};

#[cfg(not(target_arch = "wasm32"))]
static HOST_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Host high-resolution time in milliseconds.
///
/// On the web this is `performance.now()`, natively the time since the first
/// call in this process. Used for the material phase, not for frame deltas.
pub fn host_time_ms() -> f64 {
    #[cfg(not(target_arch = "wasm32"))]
    {
        HOST_EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
    }

    #[cfg(target_arch = "wasm32")]
    {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

// Cross-platform monotonic clock.
pub struct Clock {
    #[cfg(not(target_arch = "wasm32"))]
    start: Instant,
    #[cfg(target_arch = "wasm32")]
    start_time_ms: f64,
    old_time: f32,
    elapsed_time: f32,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: Instant::now(),
            #[cfg(target_arch = "wasm32")]
            start_time_ms: host_time_ms(),
            old_time: 0.0,
            elapsed_time: 0.0,
        }
    }

    fn now_seconds(&self) -> f32 {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed().as_secs_f32()
        }

        #[cfg(target_arch = "wasm32")]
        {
            ((host_time_ms() - self.start_time_ms) / 1000.0) as f32
        }
    }

    /// Seconds since the previous call (or since construction).
    pub fn get_delta(&mut self) -> f32 {
        let now = self.now_seconds();
        let delta = (now - self.old_time).max(0.0);
        self.old_time = now;
        self.elapsed_time += delta;
        delta
    }

    /// Total time accumulated through `get_delta`.
    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }
}

/// Rolling frame-time window, reported through `log` every
/// `STATS_UPDATE_INTERVAL` seconds.
pub struct FrameStats {
    frame_times: [f32; STATS_WINDOW],
    frame_index: usize,
    filled: usize,
    update_timer: f32,
    pub frame_count: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frame_times: [0.0; STATS_WINDOW],
            frame_index: 0,
            filled: 0,
            update_timer: 0.0,
            frame_count: 0,
        }
    }
}

impl FrameStats {
    /// Records one frame. Returns `(fps, avg_frame_ms)` when a report is due.
    pub fn record(&mut self, delta: f32) -> Option<(f32, f32)> {
        self.frame_times[self.frame_index] = delta;
        self.frame_index = (self.frame_index + 1) % STATS_WINDOW;
        self.filled = (self.filled + 1).min(STATS_WINDOW);
        self.frame_count += 1;
        self.update_timer += delta;

        if self.update_timer < STATS_UPDATE_INTERVAL {
            return None;
        }
        self.update_timer = 0.0;

        let sum = self.frame_times[..self.filled].iter().sum::<f32>();
        let avg_frame_time = sum / self.filled as f32;
        if avg_frame_time <= 0.0 {
            return None;
        }
        let fps = 1.0 / avg_frame_time;

        if MINIMAL_LOGGING {
            log::info!("FPS: {:.1}, Frame: {:.2}ms", fps, avg_frame_time * 1000.0);
        }
        Some((fps, avg_frame_time * 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_non_negative_and_accumulates() {
        let mut clock = Clock::new();
        let a = clock.get_delta();
        let b = clock.get_delta();
        assert!(a >= 0.0 && b >= 0.0);
        assert!((clock.elapsed_time() - (a + b)).abs() < 1e-6);
    }

    #[test]
    fn host_time_is_monotonic() {
        let a = host_time_ms();
        let b = host_time_ms();
        assert!(b >= a);
    }

    #[test]
    fn stats_report_after_interval() {
        let mut stats = FrameStats::default();
        // 16ms frames: the 47th crosses 0.75s.
        let mut report = None;
        for _ in 0..47 {
            report = stats.record(0.016);
        }
        let (fps, ms) = report.expect("report due");
        assert!((fps - 62.5).abs() < 0.1);
        assert!((ms - 16.0).abs() < 0.01);
        assert_eq!(stats.frame_count, 47);
        assert!(stats.record(0.016).is_none());
    }
}
