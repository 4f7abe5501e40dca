// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Trapezoidal step profiles.
//!
//! A profile is a lazy sequence of step intervals (µs) for one move. Speeds are planned per step
//! from `v² = 2·a·n`: step `k` of `d` runs at
//!
//! ```text
//! v(k) = min(v_peak, sqrt(2·a·k), sqrt(2·a·(d − k + 1)))
//! ```
//!
//! so consecutive steps never change `v²` by more than `2·a`, the first and last steps leave and
//! reach standstill at the configured acceleration, and `v_peak` is `max_speed` for long moves or
//! `sqrt(a·d)` for short (triangular) ones.
//!
//! Works in `no_std` and does not allocate memory.

use micromath::F32Ext;

use crate::config::{AxisConfig, AxisConfigError, MAX_PULSE_INTERVAL_US, MIN_PULSE_RATE};
use crate::drivers::stepper::Direction;

/// Plans moves for one axis with fixed speed and acceleration limits.
#[derive(Copy, Clone, Debug)]
pub struct MotionProfiler {
    /// Steps/s, already clamped to the pulse floor.
    max_speed: f32,
    /// Steps/s².
    acceleration: f32,
    min_interval_us: u32,
}

impl MotionProfiler {
    /// Create a profiler.
    ///
    /// `max_speed` above what `min_interval_us` allows is clamped to the floor. Limits the step
    /// timer cannot represent are rejected.
    pub fn new(
        max_speed: f32,
        acceleration: f32,
        min_interval_us: u32,
    ) -> Result<Self, AxisConfigError> {
        if !(acceleration > 0.0) || !acceleration.is_finite() {
            return Err(AxisConfigError::Acceleration);
        }
        if min_interval_us == 0 || min_interval_us > MAX_PULSE_INTERVAL_US {
            return Err(AxisConfigError::PulseFloor);
        }
        if !(max_speed >= MIN_PULSE_RATE) {
            return Err(AxisConfigError::MaxSpeedBelowPulseRate);
        }

        let floor_speed = 1_000_000.0 / min_interval_us as f32;
        let max_speed = if max_speed > floor_speed {
            warn!(
                "max speed {} steps/s clamped to pulse floor {} steps/s",
                max_speed, floor_speed
            );
            floor_speed
        } else {
            max_speed
        };

        Ok(Self {
            max_speed,
            acceleration,
            min_interval_us,
        })
    }

    pub fn from_config(cfg: &AxisConfig) -> Result<Self, AxisConfigError> {
        Self::new(cfg.max_speed, cfg.acceleration, cfg.min_pulse_interval_us)
    }

    /// Effective cruise speed in steps/s.
    #[inline]
    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    #[inline]
    pub fn acceleration(&self) -> f32 {
        self.acceleration
    }

    /// Steps needed to reach cruise speed from standstill.
    #[inline]
    pub fn accel_steps(&self) -> u32 {
        (self.max_speed * self.max_speed / (2.0 * self.acceleration)).ceil() as u32
    }

    /// Plan a move from `start_step` to `target_step`.
    pub fn profile(&self, start_step: i32, target_step: i32) -> MotionSegment {
        let delta = target_step as i64 - start_step as i64;
        let direction = if delta < 0 {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        let distance = delta.unsigned_abs().min(u32::MAX as u64) as u32;

        let peak = (self.acceleration * distance as f32).sqrt().min(self.max_speed);

        MotionSegment {
            direction,
            distance,
            emitted: 0,
            peak_speed: peak,
            two_accel: 2.0 * self.acceleration,
            min_interval_us: self.min_interval_us,
            triangular: 2 * self.accel_steps() as u64 > distance as u64,
        }
    }
}

/// One planned move: a direction and the interval before each step, in microseconds.
///
/// Yields exactly `distance()` intervals and then ends. It cannot be rewound; a new move needs a
/// fresh segment planned from the axis's current position.
#[derive(Debug)]
pub struct MotionSegment {
    direction: Direction,
    distance: u32,
    emitted: u32,
    peak_speed: f32,
    two_accel: f32,
    min_interval_us: u32,
    triangular: bool,
}

impl MotionSegment {
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Total steps in the move.
    #[inline]
    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// Steps not yet handed out.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.distance - self.emitted
    }

    /// Highest speed the move reaches, in steps/s.
    #[inline]
    pub fn peak_speed(&self) -> f32 {
        self.peak_speed
    }

    /// True if the move is too short to reach cruise speed.
    #[inline]
    pub fn is_triangular(&self) -> bool {
        self.triangular
    }

    /// Planned speed of step `k` (1-based).
    fn speed_at(&self, k: u32) -> f32 {
        let from_start = (self.two_accel * k as f32).sqrt();
        let to_end = (self.two_accel * (self.distance - k + 1) as f32).sqrt();
        self.peak_speed.min(from_start).min(to_end)
    }
}

impl Iterator for MotionSegment {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.emitted >= self.distance {
            return None;
        }
        self.emitted += 1;

        let speed = self.speed_at(self.emitted);
        let interval = (1_000_000.0 / speed).ceil();
        let interval = if interval >= MAX_PULSE_INTERVAL_US as f32 {
            MAX_PULSE_INTERVAL_US
        } else {
            interval as u32
        };

        Some(interval.max(self.min_interval_us))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for MotionSegment {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn speeds(intervals: &[u32]) -> Vec<f32> {
        intervals.iter().map(|&i| 1_000_000.0 / i as f32).collect()
    }

    /// Bound on the error in v² caused by rounding an interval up to whole microseconds
    /// (first order is 2·v³/1e6).
    fn quantization(v: f32) -> f32 {
        2.5 * v * v * v / 1_000_000.0
    }

    /// Check step count, speed and acceleration limits of a whole profile.
    fn check_profile(profiler: &MotionProfiler, distance: i32) {
        let seg = profiler.profile(0, distance);
        assert_eq!(seg.len(), distance as usize);
        let intervals: Vec<u32> = seg.collect();
        assert_eq!(intervals.len(), distance as usize);

        let v = speeds(&intervals);
        let a = profiler.acceleration();

        // Per-step kinematics: |v_k² − v_{k−1}²| ≤ 2·a, starting from standstill.
        let mut prev = 0.0f32;
        for (k, &s) in v.iter().enumerate() {
            assert!(
                s <= profiler.max_speed() * 1.0001,
                "d={} step {}: {} > {}",
                distance,
                k,
                s,
                profiler.max_speed()
            );
            let dv2 = (s * s - prev * prev).abs();
            let limit = 2.0 * a * 1.01 + quantization(s) + quantization(prev);
            assert!(
                dv2 <= limit,
                "d={} step {}: dv² {} > {}",
                distance,
                k,
                dv2,
                limit
            );
            prev = s;
        }
        // The last step decelerates into standstill.
        assert!(prev * prev <= 2.0 * a * 1.01);

        // Over longer windows rounding averages out and the bound is tight.
        const WINDOW: usize = 100;
        for k in WINDOW..v.len() {
            let dv2 = (v[k] * v[k] - v[k - WINDOW] * v[k - WINDOW]).abs();
            let limit = 2.0 * a * WINDOW as f32 * 1.01
                + quantization(v[k])
                + quantization(v[k - WINDOW]);
            assert!(dv2 <= limit, "d={} window at {}: {} > {}", distance, k, dv2, limit);
        }
    }

    #[test]
    fn profiles_respect_limits_for_all_lengths() {
        let profiler = MotionProfiler::new(800.0, 800.0, 50).unwrap();
        for d in [1, 2, 3, 7, 100, 799, 800, 801, 1_600, 5_000] {
            check_profile(&profiler, d);
        }

        let fast = MotionProfiler::new(5_000.0, 20_000.0, 50).unwrap();
        for d in [1, 10, 624, 625, 626, 1_251, 10_000] {
            check_profile(&fast, d);
        }
    }

    #[test]
    fn long_move_is_trapezoidal_and_cruises_at_max_speed() {
        let profiler = MotionProfiler::new(800.0, 800.0, 50).unwrap();
        // 800² / (2·800) = 400 steps to reach cruise.
        assert_eq!(profiler.accel_steps(), 400);

        let seg = profiler.profile(0, 2_000);
        assert!(!seg.is_triangular());
        assert_eq!(seg.peak_speed(), 800.0);

        let intervals: Vec<u32> = seg.collect();
        // 1e6 / 800
        assert_eq!(intervals[1_000], 1_250);
        assert!(intervals[0] > intervals[100]);
        assert_eq!(intervals.first(), intervals.last());
    }

    #[test]
    fn short_move_is_triangular() {
        let profiler = MotionProfiler::new(800.0, 800.0, 50).unwrap();
        let seg = profiler.profile(100, 300);
        assert!(seg.is_triangular());
        // sqrt(800 · 200) = 400 steps/s
        assert!((seg.peak_speed() - 400.0).abs() < 0.01);

        let intervals: Vec<u32> = seg.collect();
        let fastest = *intervals.iter().min().unwrap();
        assert!(fastest >= 2_500);
        // Symmetric accelerate/decelerate.
        let reversed: Vec<u32> = intervals.iter().rev().copied().collect();
        assert_eq!(intervals, reversed);
    }

    #[test]
    fn direction_follows_sign_of_distance() {
        let profiler = MotionProfiler::new(800.0, 800.0, 50).unwrap();
        let seg = profiler.profile(500, -250);
        assert_eq!(seg.direction(), Direction::Reverse);
        assert_eq!(seg.distance(), 750);
        assert_eq!(profiler.profile(-5, 5).direction(), Direction::Forward);
    }

    #[test]
    fn zero_distance_yields_nothing() {
        let profiler = MotionProfiler::new(800.0, 800.0, 50).unwrap();
        let mut seg = profiler.profile(42, 42);
        assert_eq!(seg.remaining(), 0);
        assert_eq!(seg.next(), None);
    }

    #[test]
    fn segment_is_not_restartable() {
        let profiler = MotionProfiler::new(800.0, 800.0, 50).unwrap();
        let mut seg = profiler.profile(0, 3);
        assert_eq!(seg.by_ref().count(), 3);
        assert_eq!(seg.next(), None);
        assert_eq!(seg.remaining(), 0);
    }

    #[test]
    fn max_speed_is_clamped_to_pulse_floor() {
        // 250 µs floor allows 4000 steps/s.
        let profiler = MotionProfiler::new(10_000.0, 1_000_000.0, 250).unwrap();
        assert_eq!(profiler.max_speed(), 4_000.0);
        assert!(profiler.profile(0, 10_000).all(|i| i >= 250));
    }

    #[test]
    fn rejects_unrepresentable_limits() {
        assert_eq!(
            MotionProfiler::new(0.0, 800.0, 50).unwrap_err(),
            AxisConfigError::MaxSpeedBelowPulseRate
        );
        assert_eq!(
            MotionProfiler::new(800.0, 800.0, 0).unwrap_err(),
            AxisConfigError::PulseFloor
        );
        assert_eq!(
            MotionProfiler::new(800.0, -1.0, 50).unwrap_err(),
            AxisConfigError::Acceleration
        );
    }
}
