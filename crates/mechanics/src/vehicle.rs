//! Vehicle road-load model
//!
//! Provides:
//! - Longitudinal forces (inertia, aerodynamic drag, rolling resistance, slope)
//! - Conversion from wheel power to mechanical and battery power, including
//!   drivetrain/electrical losses, regenerative braking and auxiliary load

use serde::{Deserialize, Serialize};

/// Physical constants of the reference vehicle and its powertrain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConstants {
    /// Air density (kg/m³), sea level at 15 °C
    pub air_density: f64,
    /// Aerodynamic drag coefficient
    pub drag_coefficient: f64,
    /// Frontal area (m²)
    pub frontal_area_m2: f64,
    /// Gravitational acceleration (m/s²)
    pub gravity: f64,
    /// Rolling resistance coefficient
    pub rolling_resistance: f64,
    /// Wheel to motor shaft efficiency
    pub drivetrain_efficiency: f64,
    /// Motor shaft to battery efficiency
    pub electrical_efficiency: f64,
    /// Share of negative wheel power returned to the battery
    pub regen_efficiency: f64,
    /// Constant auxiliary load: screens, lights, HVAC (W)
    pub aux_power_w: f64,
}

impl Default for VehicleConstants {
    fn default() -> Self {
        VehicleConstants {
            air_density: 1.225,
            drag_coefficient: 0.29,
            frontal_area_m2: 2.70726,
            gravity: 9.81,
            rolling_resistance: 0.01,
            drivetrain_efficiency: 0.95,
            electrical_efficiency: 0.89,
            regen_efficiency: 0.60,
            aux_power_w: 1000.0,
        }
    }
}

/// Per-run vehicle inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    /// Total vehicle mass (kg)
    pub mass_kg: f64,
    /// Road grade (rad), positive uphill
    pub grade_rad: f64,
    /// Headwind speed (m/s), subtracted from vehicle speed for drag
    pub headwind_ms: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        VehicleParams {
            mass_kg: 1502.0,
            grade_rad: 0.0,
            headwind_ms: 0.0,
        }
    }
}

impl VehicleParams {
    pub fn new(mass_kg: f64, grade_rad: f64, headwind_ms: f64) -> Self {
        VehicleParams {
            mass_kg,
            grade_rad,
            headwind_ms,
        }
    }

    pub fn with_mass(mut self, mass_kg: f64) -> Self {
        self.mass_kg = mass_kg;
        self
    }

    pub fn with_grade(mut self, grade_rad: f64) -> Self {
        self.grade_rad = grade_rad;
        self
    }

    pub fn with_headwind(mut self, headwind_ms: f64) -> Self {
        self.headwind_ms = headwind_ms;
        self
    }
}

/// Longitudinal force components (N) acting on the vehicle at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoadLoad {
    pub acceleration: f64,
    pub aero: f64,
    pub rolling: f64,
    pub slope: f64,
}

impl RoadLoad {
    pub fn total(&self) -> f64 {
        self.acceleration + self.aero + self.rolling + self.slope
    }
}

impl VehicleConstants {
    /// Forces needed to hold `speed_ms` while accelerating at `accel_ms2`
    pub fn road_load(&self, params: &VehicleParams, speed_ms: f64, accel_ms2: f64) -> RoadLoad {
        let airspeed = speed_ms - params.headwind_ms;
        RoadLoad {
            acceleration: params.mass_kg * accel_ms2,
            aero: 0.5 * self.air_density * self.drag_coefficient * self.frontal_area_m2 * airspeed.powi(2),
            rolling: self.rolling_resistance * params.mass_kg * self.gravity,
            slope: params.mass_kg * self.gravity * params.grade_rad.sin(),
        }
    }

    /// Motor shaft power for a given wheel power
    pub fn mechanical_power(&self, wheel_power_w: f64) -> f64 {
        wheel_power_w / self.drivetrain_efficiency
    }

    /// Power drawn from (positive) or returned to (negative) the battery.
    ///
    /// Traction passes through both drivetrain and electrical losses; braking
    /// recovers only `regen_efficiency` of the wheel power. The auxiliary load
    /// is always added.
    pub fn battery_power(&self, wheel_power_w: f64) -> f64 {
        if wheel_power_w >= 0.0 {
            wheel_power_w / (self.drivetrain_efficiency * self.electrical_efficiency) + self.aux_power_w
        } else {
            wheel_power_w * self.regen_efficiency + self.aux_power_w
        }
    }
}
