//! Pack discharge over a repeating drive cycle
//!
//! The loop steps once per second: read the battery demand of the cycle
//! (wrapping around once it is exhausted), solve the circuit for current,
//! then count the charge out of the pack. The run ends when the SoC reaches
//! the cutoff, when the circuit can no longer deliver the demand, or when the
//! duration guard trips.

use mechanics::DriveCycleResult;
use serde::{Deserialize, Serialize};
use simcore::{CircuitModel, ModelError, PackConfig, PackState, Result, SimContext, SimulationConfig, StepOutcome};

use crate::battery::{FirstOrderCircuit, ZerothOrderCircuit};
use crate::parameters::CellModel;

const DT: f64 = 1.0;

/// Why a discharge run stopped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// SoC fell to the cutoff
    Depleted,
    /// The power balance had no real solution at `time_s`
    UnreachablePower {
        time_s: usize,
        soc_percent: f64,
        demand_w: f64,
        discriminant: f64,
    },
    /// Simulated time reached `SimulationConfig::max_duration_s`
    DurationLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Completed seconds, `1..=elapsed_s`
    pub time_s: Vec<f64>,
    /// Terminal voltage per completed second (V)
    pub voltage_v: Vec<f64>,
    /// Pack current per completed second (A)
    pub current_a: Vec<f64>,
    /// SoC, starting with the initial value (%)
    pub soc_percent: Vec<f64>,
    /// Distance travelled, starting at 0 (m)
    pub distance_m: Vec<f64>,
    /// Battery energy drawn (kWh)
    pub energy_kwh: f64,
    pub elapsed_s: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub elapsed_s: usize,
    pub energy_kwh: f64,
    pub final_soc: f64,
}

impl SimulationResult {
    pub fn final_soc(&self) -> f64 {
        self.soc_percent.last().copied().unwrap_or(f64::NAN)
    }

    pub fn range_m(&self) -> f64 {
        self.distance_m.last().copied().unwrap_or(0.0)
    }

    pub fn summary(&self) -> SimulationSummary {
        SimulationSummary {
            elapsed_s: self.elapsed_s,
            energy_kwh: self.energy_kwh,
            final_soc: self.final_soc(),
        }
    }
}

/// Discharge `circuit` against the battery demand of `demand`.
///
/// `pack_capacity_ah` is the capacity of the whole pack. SoC is not clamped,
/// so the last value may sit slightly below the cutoff.
pub fn run_discharge<C: CircuitModel>(
    circuit: &mut C,
    demand: &DriveCycleResult,
    pack_capacity_ah: f64,
    initial_soc: f64,
    sim: &SimulationConfig,
) -> Result<SimulationResult> {
    if demand.is_empty() {
        return Err(ModelError::InvalidConfig("drive cycle demand is empty".to_string()));
    }
    if !(pack_capacity_ah.is_finite() && pack_capacity_ah > 0.0) {
        return Err(ModelError::InvalidConfig(format!(
            "pack capacity must be positive, got {pack_capacity_ah} Ah"
        )));
    }

    circuit.reset();
    let mut state = PackState::at_soc(initial_soc);
    let mut result = SimulationResult {
        time_s: Vec::new(),
        voltage_v: Vec::new(),
        current_a: Vec::new(),
        soc_percent: vec![initial_soc],
        distance_m: vec![0.0],
        energy_kwh: 0.0,
        elapsed_s: 0,
        termination: Termination::Depleted,
    };

    let mut t = 0;
    let termination = loop {
        if !(state.state_of_charge > sim.soc_cutoff_percent) {
            break Termination::Depleted;
        }
        if t >= sim.max_duration_s {
            log::warn!("discharge stopped by the {} s duration limit at {:.2} %", t, state.state_of_charge);
            break Termination::DurationLimit;
        }

        let demand_w = demand.battery_power_at(t);
        let ctx = SimContext { dt: DT, t: t as f64 };
        let (current, voltage) = match circuit.step_circuit(ctx, demand_w, &mut state) {
            StepOutcome::Solved { current, voltage } => (current, voltage),
            StepOutcome::Unreachable { discriminant } => {
                log::warn!(
                    "demand of {:.0} W unreachable at t={} s, SoC {:.2} % (discriminant {:.3e})",
                    demand_w,
                    t,
                    state.state_of_charge,
                    discriminant
                );
                break Termination::UnreachablePower {
                    time_s: t,
                    soc_percent: state.state_of_charge,
                    demand_w,
                    discriminant,
                };
            }
        };

        let distance = result.range_m() + demand.speed_at(t);
        result.distance_m.push(distance);
        result.energy_kwh += demand_w / 3_600_000.0;
        state.state_of_charge -= current * DT / 3600.0 / pack_capacity_ah * 100.0;

        result.voltage_v.push(voltage);
        result.current_a.push(current);
        result.soc_percent.push(state.state_of_charge);
        t += 1;
        result.time_s.push(t as f64);
    };

    result.elapsed_s = t;
    result.termination = termination;
    log::info!(
        "discharge: {} s, {:.3} kWh, {:.0} m, final SoC {:.2} % ({:?})",
        result.elapsed_s,
        result.energy_kwh,
        result.range_m(),
        result.final_soc(),
        result.termination
    );
    Ok(result)
}

/// OCV + R0 discharge with the default 0.1 % cutoff.
pub fn simulate_0th_order(model: &CellModel, demand: &DriveCycleResult, pack: &PackConfig) -> Result<SimulationResult> {
    simulate_0th_order_with(model, demand, pack, &SimulationConfig::zeroth_order())
}

pub fn simulate_0th_order_with(
    model: &CellModel,
    demand: &DriveCycleResult,
    pack: &PackConfig,
    sim: &SimulationConfig,
) -> Result<SimulationResult> {
    pack.validate()?;
    let mut circuit = ZerothOrderCircuit::new(model, pack);
    run_discharge(
        &mut circuit,
        demand,
        pack.pack_capacity_ah(model.capacity_ah),
        pack.initial_soc_percent,
        sim,
    )
}

/// OCV + R0 + RC discharge with the default 5 % cutoff.
///
/// Fails when the model has no polarization curves.
pub fn simulate_1st_order(model: &CellModel, demand: &DriveCycleResult, pack: &PackConfig) -> Result<SimulationResult> {
    simulate_1st_order_with(model, demand, pack, &SimulationConfig::first_order())
}

pub fn simulate_1st_order_with(
    model: &CellModel,
    demand: &DriveCycleResult,
    pack: &PackConfig,
    sim: &SimulationConfig,
) -> Result<SimulationResult> {
    pack.validate()?;
    let polarization = model.polarization()?;
    let mut circuit = FirstOrderCircuit::new(model, pack, polarization);
    run_discharge(
        &mut circuit,
        demand,
        pack.pack_capacity_ah(model.capacity_ah),
        pack.initial_soc_percent,
        sim,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::solve_power_balance;
    use simcore::Model;

    /// Constant OCV and R0, no SoC dependence
    struct FixedCircuit {
        ocv: f64,
        r0: f64,
        resets: usize,
    }

    impl Model for FixedCircuit {
        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    impl CircuitModel for FixedCircuit {
        fn step_circuit(&mut self, _ctx: SimContext, demand_w: f64, state: &mut PackState) -> StepOutcome {
            match solve_power_balance(self.ocv, self.r0, demand_w) {
                Some(current) => {
                    let voltage = self.ocv - current * self.r0;
                    state.current = current;
                    state.voltage = voltage;
                    StepOutcome::Solved { current, voltage }
                }
                None => StepOutcome::Unreachable {
                    discriminant: self.ocv * self.ocv - 4.0 * demand_w * self.r0,
                },
            }
        }
    }

    fn demand(power_batt_w: Vec<f64>, speed_ms: Vec<f64>) -> DriveCycleResult {
        let n = power_batt_w.len();
        DriveCycleResult {
            time_s: (0..n).map(|t| t as f64).collect(),
            speed_ms,
            power_acc_roll_w: vec![0.0; n],
            power_acc_aero_roll_w: vec![0.0; n],
            power_total_w: vec![0.0; n],
            power_mech_w: vec![0.0; n],
            power_batt_w,
            energy_wh: vec![0.0; n],
        }
    }

    #[test]
    fn test_constant_current_depletes_on_schedule() {
        // 36 A from a 1 Ah pack with R0 = 0: 1 % per second
        let mut circuit = FixedCircuit {
            ocv: 100.0,
            r0: 0.0,
            resets: 0,
        };
        let cycle = demand(vec![3600.0; 3], vec![2.0, 3.0, 4.0]);
        let result = run_discharge(&mut circuit, &cycle, 1.0, 100.0, &SimulationConfig::first_order()).unwrap();

        assert_eq!(result.termination, Termination::Depleted);
        assert_eq!(result.elapsed_s, 95);
        assert_eq!(result.final_soc(), 5.0);
        assert_eq!(result.soc_percent.len(), result.elapsed_s + 1);
        assert_eq!(result.distance_m.len(), result.elapsed_s + 1);
        assert_eq!(result.time_s.first(), Some(&1.0));
        assert_eq!(result.time_s.last(), Some(&95.0));
        assert_eq!(circuit.resets, 1);
    }

    #[test]
    fn test_custom_cutoff_stops_early() {
        let mut circuit = FixedCircuit {
            ocv: 100.0,
            r0: 0.0,
            resets: 0,
        };
        let cycle = demand(vec![3600.0], vec![1.0]);
        let sim = SimulationConfig::zeroth_order().with_cutoff(50.0);
        let result = run_discharge(&mut circuit, &cycle, 1.0, 100.0, &sim).unwrap();

        assert_eq!(result.termination, Termination::Depleted);
        assert_eq!(result.elapsed_s, 50);
        assert_eq!(result.final_soc(), 50.0);
    }

    #[test]
    fn test_distance_and_energy_follow_the_cycle() {
        let mut circuit = FixedCircuit {
            ocv: 100.0,
            r0: 0.0,
            resets: 0,
        };
        let cycle = demand(vec![1000.0, 2000.0], vec![5.0, 7.0]);
        let sim = SimulationConfig::zeroth_order().with_max_duration(4);
        let result = run_discharge(&mut circuit, &cycle, 100.0, 100.0, &sim).unwrap();

        assert_eq!(result.termination, Termination::DurationLimit);
        assert_eq!(result.distance_m, vec![0.0, 5.0, 12.0, 17.0, 24.0]);
        assert!((result.energy_kwh - 6000.0 / 3_600_000.0).abs() < 1e-15);
        assert_eq!(result.current_a, vec![10.0, 20.0, 10.0, 20.0]);
    }

    #[test]
    fn test_unreachable_power_halts_with_partial_series() {
        // 4·P·R0 = 4·30·1 > OCV² = 100 on the second step
        let mut circuit = FixedCircuit {
            ocv: 10.0,
            r0: 1.0,
            resets: 0,
        };
        let cycle = demand(vec![5.0, 30.0], vec![1.0, 1.0]);
        let result = run_discharge(&mut circuit, &cycle, 10.0, 80.0, &SimulationConfig::zeroth_order()).unwrap();

        match result.termination {
            Termination::UnreachablePower {
                time_s,
                demand_w,
                discriminant,
                ..
            } => {
                assert_eq!(time_s, 1);
                assert_eq!(demand_w, 30.0);
                assert!(discriminant < 0.0);
            }
            other => panic!("unexpected termination {other:?}"),
        }
        assert_eq!(result.elapsed_s, 1);
        assert_eq!(result.voltage_v.len(), 1);
        assert_eq!(result.soc_percent.len(), 2);
        assert_eq!(result.distance_m.len(), 2);
    }

    #[test]
    fn test_empty_demand_is_rejected() {
        let mut circuit = FixedCircuit {
            ocv: 10.0,
            r0: 0.0,
            resets: 0,
        };
        let cycle = demand(Vec::new(), Vec::new());
        assert!(run_discharge(&mut circuit, &cycle, 1.0, 100.0, &SimulationConfig::default()).is_err());
    }

    #[test]
    fn test_start_below_cutoff_does_not_step() {
        let mut circuit = FixedCircuit {
            ocv: 10.0,
            r0: 0.0,
            resets: 0,
        };
        let cycle = demand(vec![10.0], vec![1.0]);
        let result = run_discharge(&mut circuit, &cycle, 1.0, 3.0, &SimulationConfig::first_order()).unwrap();
        assert_eq!(result.elapsed_s, 0);
        assert_eq!(result.summary().final_soc, 3.0);
        assert!(result.time_s.is_empty());
    }
}
