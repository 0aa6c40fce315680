use serde::{Deserialize, Serialize};

// Pack state shared between the circuit model and the discharge loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackState {
    /// State of charge (%)
    pub state_of_charge: f64,
    /// Terminal voltage of the pack (V)
    pub voltage: f64,
    /// Voltage across the RC polarization branch (V), zero for an R0-only circuit
    pub polarization_voltage: f64,
    /// Pack current (A), positive while delivering power
    pub current: f64,
}

impl PackState {
    pub fn at_soc(state_of_charge: f64) -> Self {
        PackState {
            state_of_charge,
            ..Default::default()
        }
    }
}

impl Default for PackState {
    fn default() -> Self {
        PackState {
            state_of_charge: 100.0,
            voltage: 0.0,
            polarization_voltage: 0.0,
            current: 0.0,
        }
    }
}

/// Result of solving one step of a circuit against a power demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Current and terminal voltage that deliver the demanded power
    Solved { current: f64, voltage: f64 },
    /// The power balance has no real solution at this operating point
    Unreachable { discriminant: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct SimContext {
    pub dt: f64,
    pub t: f64,
}

pub trait Model {
    fn reset(&mut self);
}

/// An equivalent circuit that can be stepped against a terminal power demand.
///
/// Implementations read the SoC from `state`, write `current`/`voltage` back
/// on success and advance any internal branch voltages. They never touch the
/// SoC itself; charge bookkeeping belongs to the caller.
pub trait CircuitModel: Model {
    fn step_circuit(&mut self, ctx: SimContext, demand_w: f64, state: &mut PackState) -> StepOutcome;
}
