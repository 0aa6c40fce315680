//! Equivalent-circuit parameter extraction and pack discharge simulation.
//!
//! The pipeline runs leaves first: capacity and SoC from coulomb counting,
//! ohmic and relaxation pulses from step transitions, monotone SoC curves for
//! each circuit parameter, then 0th/1st-order discharge over a drive cycle.

pub mod capacity;
pub mod pulse;
pub mod fit;
pub mod interpolation;
pub mod parameters;
pub mod battery;
pub mod analysis;
pub mod health;

pub use analysis::{
    SimulationResult, SimulationSummary, Termination, run_discharge, simulate_0th_order, simulate_0th_order_with,
    simulate_1st_order, simulate_1st_order_with,
};
pub use battery::{FirstOrderCircuit, ZerothOrderCircuit, solve_power_balance};
pub use capacity::{CoulombBlock, SocPoint, coulomb_blocks, overall_capacity, soc_from_blocks, soc_trajectory};
pub use health::{RangeEstimate, range_vs_soh, soh_by_cell};
pub use interpolation::{Extrapolation, ParameterCurve};
pub use parameters::{CellModel, ParameterKind, PolarizationCurves, parameter_curve};
pub use pulse::{OhmicPulse, Pulse, RelaxationPulse, find_ohmic_pulses, find_relaxation_pulses};
