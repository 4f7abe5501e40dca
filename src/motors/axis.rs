// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Angle/step conversion for one rotator axis.
//!
//! This module converts between the axis pointing angle and the motor's microstep count, using
//! the gear ratio, the motor's full-step angle and the driver's microstep factor.

use core::fmt;
use micromath::F32Ext;

use crate::config::AxisConfig;
use crate::error::Error;

/// Which of the two rotator axes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisId {
    Azimuth,
    Elevation,
}

impl AxisId {
    pub const ALL: [AxisId; 2] = [AxisId::Azimuth, AxisId::Elevation];
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisId::Azimuth => f.write_str("azimuth"),
            AxisId::Elevation => f.write_str("elevation"),
        }
    }
}

/// Unit model of one axis.
///
/// Geometry parameters:
/// - `gear_ratio`: motor revolutions per axis revolution.
/// - `degrees_per_step`: motor angle of one full step.
/// - `microsteps`: driver subdivision of one full step.
///
/// Positions outside `[min_angle, max_angle]` are never converted. Azimuth is a hard-limited
/// axis; 0° and 360° are distinct ends, not a wrap point.
#[derive(Copy, Clone, Debug)]
pub struct AxisModel {
    id: AxisId,
    steps_per_degree: f32,
    min_angle: f32,
    max_angle: f32,
}

impl AxisModel {
    /// Create a model from raw geometry.
    pub fn new(
        id: AxisId,
        gear_ratio: f32,
        degrees_per_step: f32,
        microsteps: u16,
        min_angle: f32,
        max_angle: f32,
    ) -> Self {
        Self {
            id,
            steps_per_degree: microsteps as f32 * gear_ratio / degrees_per_step,
            min_angle,
            max_angle,
        }
    }

    /// Create a model from a validated axis configuration.
    pub fn from_config(id: AxisId, cfg: &AxisConfig, degrees_per_step: f32) -> Self {
        Self::new(
            id,
            cfg.gear_ratio,
            degrees_per_step,
            cfg.microsteps,
            cfg.min_angle,
            cfg.max_angle,
        )
    }

    #[inline]
    pub fn id(&self) -> AxisId {
        self.id
    }

    #[inline]
    pub fn min_angle(&self) -> f32 {
        self.min_angle
    }

    #[inline]
    pub fn max_angle(&self) -> f32 {
        self.max_angle
    }

    /// Microsteps per degree of axis rotation.
    #[inline]
    pub fn steps_per_degree(&self) -> f32 {
        self.steps_per_degree
    }

    /// Axis angle covered by one microstep.
    #[inline]
    pub fn resolution(&self) -> f32 {
        1.0 / self.steps_per_degree
    }

    /// True if `angle` lies inside the axis limits. NaN never does.
    #[inline]
    pub fn contains(&self, angle: f32) -> bool {
        (self.min_angle..=self.max_angle).contains(&angle)
    }

    /// Convert an axis angle (degrees) into an absolute microstep position.
    pub fn degrees_to_steps(&self, angle: f32) -> Result<i32, Error> {
        if !self.contains(angle) {
            return Err(Error::OutOfRange {
                axis: self.id,
                angle,
            });
        }
        Ok((angle * self.steps_per_degree).round() as i32)
    }

    /// Convert an absolute microstep position back into degrees.
    #[inline]
    pub fn steps_to_degrees(&self, steps: i32) -> f32 {
        steps as f32 / self.steps_per_degree
    }
}
