// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Deployment configuration for the rotator.
//!
//! Everything the firmware needs to know about the mechanics and the driver boards lives in one
//! [`RotatorConfig`], handed to the controller at startup and validated once. `Default` carries
//! the values for the SatTracker build (TMC2208 drivers on both axes, 10:1 azimuth and 20:1
//! elevation gearing).

use core::fmt;

use crate::motors::AxisId;

/// Longest host-link line accepted, terminator excluded.
pub const MAX_LINE_LEN: usize = 80;

/// Longest step interval the tick scheduler can represent (half the `u32` microsecond range, so
/// wrapping comparisons stay unambiguous).
pub const MAX_PULSE_INTERVAL_US: u32 = i32::MAX as u32;

/// Slowest step rate that can still be scheduled, in steps/s.
pub const MIN_PULSE_RATE: f32 = 1_000_000.0 / MAX_PULSE_INTERVAL_US as f32;

/// Full-scale sense voltage with `vsense = 0`.
pub(crate) const VFS_HIGH: f32 = 0.325;

/// Full-scale sense voltage with `vsense = 1`.
pub(crate) const VFS_LOW: f32 = 0.180;

/// Internal sense resistance added to the external shunt by the TMC2208.
pub(crate) const R_SENSE_INTERNAL: f32 = 0.02;

/// Chopper timing triple written into CHOPCONF.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChopperTiming {
    /// Off time, 1..=15. Zero would disable the driver outputs.
    pub toff: u8,
    /// Hysteresis end (low) value, -3..=12.
    pub hend: i8,
    /// Hysteresis start value, 1..=8.
    pub hstrt: u8,
}

impl ChopperTiming {
    fn is_valid(&self) -> bool {
        (1..=15).contains(&self.toff)
            && (-3..=12).contains(&self.hend)
            && (1..=8).contains(&self.hstrt)
            && (self.hend as i16 + self.hstrt as i16) <= 16
    }
}

/// What an axis does once it has been standing still for `idle_timeout_us`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdlePolicy {
    /// Drop the enable line. The axis is free to back-drive.
    Disable,
    /// Stay enabled at the reduced holding current.
    Hold,
}

/// Per-axis stepper driver settings.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    /// RMS run current in mA.
    pub run_current_ma: u16,
    /// Fraction of the run current applied at standstill, 0.0..=1.0.
    pub hold_multiplier: f32,
    pub chopper: ChopperTiming,
    /// StealthChop when true, SpreadCycle otherwise.
    pub stealthchop: bool,
    /// Reverse the motor direction in the driver (GCONF.shaft).
    pub invert_direction: bool,
}

/// Mechanics and motion limits of one axis.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisConfig {
    /// Motor revolutions per axis revolution.
    pub gear_ratio: f32,
    /// Microsteps per full step. Power of two, 1..=256.
    pub microsteps: u16,
    pub min_angle: f32,
    pub max_angle: f32,
    /// Steps/s.
    pub max_speed: f32,
    /// Steps/s².
    pub acceleration: f32,
    /// Shortest allowed time between two STEP pulses.
    pub min_pulse_interval_us: u32,
    pub idle_timeout_us: u32,
    pub idle_policy: IdlePolicy,
    pub driver: DriverConfig,
}

/// Complete deployment configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotatorConfig {
    /// Degrees per full motor step, shared by both motors.
    pub degrees_per_step: f32,
    /// Measured sense resistance on the driver boards, in ohms.
    pub r_sense_ohm: f32,
    pub host_baud: u32,
    pub motor_baud: u32,
    /// A partial host line older than this is dropped.
    pub line_timeout_us: u32,
    /// How often DRV_STATUS is read from each driver.
    pub status_poll_interval_us: u32,
    pub azimuth: AxisConfig,
    pub elevation: AxisConfig,
}

impl Default for ChopperTiming {
    fn default() -> Self {
        Self {
            toff: 3,
            hend: -1,
            hstrt: 1,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            run_current_ma: 300,
            hold_multiplier: 0.2,
            chopper: ChopperTiming::default(),
            stealthchop: true,
            invert_direction: false,
        }
    }
}

impl AxisConfig {
    /// SatTracker azimuth axis: 10:1 gearing, hard limits at 0° and 360°.
    pub fn azimuth() -> Self {
        Self {
            gear_ratio: 10.0,
            microsteps: 4,
            min_angle: 0.0,
            max_angle: 360.0,
            max_speed: 800.0,
            acceleration: 800.0,
            min_pulse_interval_us: 50,
            idle_timeout_us: 2_000_000,
            idle_policy: IdlePolicy::Hold,
            driver: DriverConfig::default(),
        }
    }

    /// SatTracker elevation axis: 20:1 gearing, horizon to zenith.
    pub fn elevation() -> Self {
        Self {
            gear_ratio: 20.0,
            max_angle: 90.0,
            ..Self::azimuth()
        }
    }

    /// Check this axis on its own. `r_sense_ohm` bounds the achievable run current.
    pub fn validate(&self, r_sense_ohm: f32) -> Result<(), AxisConfigError> {
        if !(self.gear_ratio > 0.0) || !self.gear_ratio.is_finite() {
            return Err(AxisConfigError::GearRatio);
        }
        if !self.microsteps.is_power_of_two() || self.microsteps > 256 {
            return Err(AxisConfigError::Microsteps);
        }
        if !(self.min_angle <= self.max_angle) {
            return Err(AxisConfigError::AngleRange);
        }
        if !(self.acceleration > 0.0) || !self.acceleration.is_finite() {
            return Err(AxisConfigError::Acceleration);
        }
        if !(self.max_speed >= MIN_PULSE_RATE) {
            return Err(AxisConfigError::MaxSpeedBelowPulseRate);
        }
        if self.min_pulse_interval_us == 0 || self.min_pulse_interval_us > MAX_PULSE_INTERVAL_US {
            return Err(AxisConfigError::PulseFloor);
        }
        if !(0.0..=1.0).contains(&self.driver.hold_multiplier) {
            return Err(AxisConfigError::HoldMultiplier);
        }
        if self.driver.run_current_ma == 0
            || self.driver.run_current_ma as f32 > max_run_current_ma(r_sense_ohm)
        {
            return Err(AxisConfigError::RunCurrent);
        }
        if !self.driver.chopper.is_valid() {
            return Err(AxisConfigError::Chopper);
        }
        Ok(())
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            degrees_per_step: 1.8,
            r_sense_ohm: 0.109,
            host_baud: 19_200,
            motor_baud: 57_600,
            line_timeout_us: 2_000_000,
            status_poll_interval_us: 250_000,
            azimuth: AxisConfig::azimuth(),
            elevation: AxisConfig::elevation(),
        }
    }
}

impl RotatorConfig {
    /// Configuration for one axis.
    #[inline]
    pub fn axis(&self, id: AxisId) -> &AxisConfig {
        match id {
            AxisId::Azimuth => &self.azimuth,
            AxisId::Elevation => &self.elevation,
        }
    }

    /// Reject configurations the firmware cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.degrees_per_step > 0.0) || !self.degrees_per_step.is_finite() {
            return Err(ConfigError::DegreesPerStep);
        }
        if !(self.r_sense_ohm > 0.0) {
            return Err(ConfigError::SenseResistor);
        }
        for id in AxisId::ALL {
            self.axis(id)
                .validate(self.r_sense_ohm)
                .map_err(|e| ConfigError::Axis(id, e))?;
        }
        Ok(())
    }
}

/// Highest RMS current (mA) the driver can regulate with the given shunt.
pub(crate) fn max_run_current_ma(r_sense_ohm: f32) -> f32 {
    VFS_HIGH / (r_sense_ohm + R_SENSE_INTERNAL) / core::f32::consts::SQRT_2 * 1000.0
}

/// Reason a single axis configuration was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisConfigError {
    GearRatio,
    Microsteps,
    AngleRange,
    Acceleration,
    /// Max speed below the slowest rate the step scheduler can produce.
    MaxSpeedBelowPulseRate,
    PulseFloor,
    RunCurrent,
    HoldMultiplier,
    Chopper,
}

/// Startup-time configuration failure. Always fatal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    DegreesPerStep,
    SenseResistor,
    Axis(AxisId, AxisConfigError),
}

impl fmt::Display for AxisConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AxisConfigError::GearRatio => "gear ratio must be positive",
            AxisConfigError::Microsteps => "microsteps must be a power of two up to 256",
            AxisConfigError::AngleRange => "min angle exceeds max angle",
            AxisConfigError::Acceleration => "acceleration must be positive",
            AxisConfigError::MaxSpeedBelowPulseRate => "max speed below minimum pulse rate",
            AxisConfigError::PulseFloor => "minimum pulse interval out of timer range",
            AxisConfigError::RunCurrent => "run current out of range for sense resistor",
            AxisConfigError::HoldMultiplier => "hold multiplier outside 0..=1",
            AxisConfigError::Chopper => "invalid chopper timing",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DegreesPerStep => f.write_str("degrees per step must be positive"),
            ConfigError::SenseResistor => f.write_str("sense resistor must be positive"),
            ConfigError::Axis(id, e) => write!(f, "{:?}: {}", id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(RotatorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn elevation_inherits_azimuth_motion_limits() {
        let cfg = RotatorConfig::default();
        assert_eq!(cfg.elevation.gear_ratio, 20.0);
        assert_eq!(cfg.elevation.max_angle, 90.0);
        assert_eq!(cfg.elevation.max_speed, cfg.azimuth.max_speed);
        assert_eq!(cfg.elevation.microsteps, 4);
    }

    #[test]
    fn rejects_non_power_of_two_microsteps() {
        let mut cfg = RotatorConfig::default();
        cfg.elevation.microsteps = 6;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Axis(AxisId::Elevation, AxisConfigError::Microsteps))
        );
    }

    #[test]
    fn rejects_max_speed_below_pulse_rate() {
        let mut cfg = RotatorConfig::default();
        cfg.azimuth.max_speed = 0.0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Axis(
                AxisId::Azimuth,
                AxisConfigError::MaxSpeedBelowPulseRate
            ))
        );
    }

    #[test]
    fn rejects_inverted_angle_range_and_nan() {
        let mut cfg = RotatorConfig::default();
        cfg.azimuth.min_angle = 10.0;
        cfg.azimuth.max_angle = 5.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RotatorConfig::default();
        cfg.elevation.gear_ratio = f32::NAN;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Axis(AxisId::Elevation, AxisConfigError::GearRatio))
        );
    }

    #[test]
    fn rejects_current_the_shunt_cannot_regulate() {
        let mut cfg = RotatorConfig::default();
        // 0.109 ohm shunt tops out near 1.78 A RMS.
        cfg.azimuth.driver.run_current_ma = 2_000;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Axis(AxisId::Azimuth, AxisConfigError::RunCurrent))
        );
    }

    #[test]
    fn rejects_chopper_timing_outside_register_range() {
        let mut cfg = RotatorConfig::default();
        cfg.azimuth.driver.chopper.toff = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RotatorConfig::default();
        cfg.azimuth.driver.chopper = ChopperTiming {
            toff: 3,
            hend: 12,
            hstrt: 8,
        };
        assert!(cfg.validate().is_err());
    }
}
