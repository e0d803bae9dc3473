use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Trait for high-precision timers
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_count(&self) -> usize;
    fn calibration_stats(&self) -> CalibrationStats;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl CalibrationStats {
    pub fn from_frame_times<'a, I>(frame_times: I) -> Self
    where
        I: IntoIterator<Item = &'a Duration>,
    {
        let times: Vec<f64> = frame_times.into_iter().map(|d| d.as_nanos() as f64).collect();
        if times.is_empty() {
            return CalibrationStats {
                average_frame_time_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_time_ns: 0.0,
                max_frame_time_ns: 0.0,
                effective_fps: 0.0,
            };
        }
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("frame period {measured_ms:.4} ms differs from expected {expected_ms:.4} ms")]
pub struct FrameRateError {
    pub measured_ms: f64,
    pub expected_ms: f64,
}

/// Compares the measured mean frame period with the period of the expected
/// refresh rate; fails when they differ by more than `tolerance`.
pub fn check_refresh_rate(
    stats: &CalibrationStats,
    expected_hz: f64,
    tolerance: Duration,
) -> Result<(), FrameRateError> {
    let expected_ns = 1e9 / expected_hz;
    let measured_ns = stats.average_frame_time_ns;
    if (expected_ns - measured_ns).abs() > tolerance.as_nanos() as f64 {
        return Err(FrameRateError {
            measured_ms: measured_ns / 1e6,
            expected_ms: expected_ns / 1e6,
        });
    }
    Ok(())
}

const MAX_FRAME_SAMPLES: usize = 1000;

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    /// Most recent frame periods, oldest first
    pub frame_times: VecDeque<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        while self.frame_times.len() >= self.max_samples.max(1) {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }
    fn frame_count(&self) -> usize {
        self.frame_times.len()
    }
    fn calibration_stats(&self) -> CalibrationStats {
        CalibrationStats::from_frame_times(&self.frame_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_times: VecDeque::with_capacity(MAX_FRAME_SAMPLES),
            max_samples: MAX_FRAME_SAMPLES,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, INFINITE, SetWaitableTimer, WaitForSingleObject,
        };
        use windows::core::PCWSTR;

        // Negative due time is relative, in 100 ns intervals
        let due_time = -((duration.as_nanos() / 100) as i64);

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, true, PCWSTR::null()) else {
                std::thread::sleep(duration);
                return;
            };
            if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                WaitForSingleObject(timer, INFINITE);
            } else {
                std::thread::sleep(duration);
            }
            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);

                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;

                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(ns: &[u64]) -> Vec<Duration> {
        ns.iter().map(|&n| Duration::from_nanos(n)).collect()
    }

    #[test]
    fn stats_of_empty_buffer_are_zero() {
        let stats = CalibrationStats::from_frame_times(&Vec::<Duration>::new());
        assert_eq!(stats.effective_fps, 0.0);
        assert_eq!(stats.jitter_ns, 0.0);
    }

    #[test]
    fn stats_summarise_frame_times() {
        let stats = CalibrationStats::from_frame_times(&frames(&[8_000_000, 8_500_000, 9_000_000]));
        assert_eq!(stats.average_frame_time_ns, 8_500_000.0);
        assert_eq!(stats.min_frame_time_ns, 8_000_000.0);
        assert_eq!(stats.max_frame_time_ns, 9_000_000.0);
        assert!(stats.jitter_ns > 400_000.0 && stats.jitter_ns < 410_000.0);
    }

    #[test]
    fn refresh_rate_within_tolerance_passes() {
        // 120 Hz is 8.3333 ms per frame
        let stats = CalibrationStats::from_frame_times(&frames(&[8_333_300, 8_333_400]));
        assert!(check_refresh_rate(&stats, 120.0, Duration::from_micros(100)).is_ok());
    }

    #[test]
    fn refresh_rate_mismatch_is_an_error() {
        let stats = CalibrationStats::from_frame_times(&frames(&[16_666_667; 4]));
        let err = check_refresh_rate(&stats, 120.0, Duration::from_micros(100)).unwrap_err();
        assert!((err.measured_ms - 16.6667).abs() < 1e-3);
        assert!((err.expected_ms - 8.3333).abs() < 1e-3);
    }

    #[test]
    fn frame_buffer_is_bounded() {
        let mut timer = HighPrecisionTimer::new();
        timer.max_samples = 3;
        for n in 1..=5 {
            timer.record_frame(Duration::from_millis(n));
        }
        assert_eq!(timer.frame_count(), 3);
        assert_eq!(timer.frame_times[0], Duration::from_millis(3));
    }

    #[test]
    fn sleep_waits_at_least_the_requested_time() {
        let timer = HighPrecisionTimer::new();
        let t = timer.now();
        timer.sleep(Duration::from_millis(2));
        assert!(timer.elapsed(t) >= Duration::from_millis(2));
    }
}
