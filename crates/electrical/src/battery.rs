use simcore::{CircuitModel, Model, PackConfig, PackState, SimContext, StepOutcome};

use crate::parameters::{CellModel, PolarizationCurves};

/// Below this pack resistance the power balance is solved as `I = P / OCV`
const R0_EPSILON: f64 = 1e-12;
/// Below this current `P / I` is replaced by the circuit equation
const CURRENT_EPSILON: f64 = 1e-9;

/// Discriminant of `R0·I² − OCV·I + P = 0`
pub fn discriminant(ocv: f64, r0: f64, power_w: f64) -> f64 {
    ocv * ocv - 4.0 * power_w * r0
}

/// Current that delivers `power_w` at the terminals of an OCV + R0 source.
///
/// Takes the smaller root of the power balance, the one that tends to
/// `P / OCV` at light load. Returns `None` when the demand cannot be met.
pub fn solve_power_balance(ocv: f64, r0: f64, power_w: f64) -> Option<f64> {
    if r0.abs() < R0_EPSILON {
        return if ocv != 0.0 { Some(power_w / ocv) } else { None };
    }
    let d = discriminant(ocv, r0, power_w);
    if !(d >= 0.0) {
        return None;
    }
    Some((ocv - d.sqrt()) / (2.0 * r0))
}

/// OCV + R0 circuit. Regenerative steps use the charge-pulse R0 curve.
pub struct ZerothOrderCircuit<'a> {
    pub model: &'a CellModel,
    pub pack: &'a PackConfig,
}

impl<'a> ZerothOrderCircuit<'a> {
    pub fn new(model: &'a CellModel, pack: &'a PackConfig) -> Self {
        ZerothOrderCircuit { model, pack }
    }
}

impl Model for ZerothOrderCircuit<'_> {
    fn reset(&mut self) {
        // No internal state
    }
}

impl CircuitModel for ZerothOrderCircuit<'_> {
    fn step_circuit(&mut self, _ctx: SimContext, demand_w: f64, state: &mut PackState) -> StepOutcome {
        let soc = state.state_of_charge;
        let ocv = self.pack.pack_ocv(self.model.ocv.evaluate(soc));
        let r0_curve = if demand_w < 0.0 {
            &self.model.r0_charge
        } else {
            &self.model.r0_discharge
        };
        let r0 = self.pack.pack_r0(r0_curve.evaluate(soc));

        let Some(current) = solve_power_balance(ocv, r0, demand_w) else {
            return StepOutcome::Unreachable {
                discriminant: discriminant(ocv, r0, demand_w),
            };
        };
        let voltage = if current.abs() < CURRENT_EPSILON {
            ocv - current * r0
        } else {
            demand_w / current
        };

        state.current = current;
        state.voltage = voltage;
        state.polarization_voltage = 0.0;
        StepOutcome::Solved { current, voltage }
    }
}

/// OCV + R0 + one RC branch. Uses the discharge R0 curve in both directions.
pub struct FirstOrderCircuit<'a> {
    pub model: &'a CellModel,
    pub pack: &'a PackConfig,
    pub polarization: &'a PolarizationCurves,
}

impl<'a> FirstOrderCircuit<'a> {
    pub fn new(model: &'a CellModel, pack: &'a PackConfig, polarization: &'a PolarizationCurves) -> Self {
        FirstOrderCircuit {
            model,
            pack,
            polarization,
        }
    }
}

fn update_rc_branch_voltage(dt: f64, current: f64, branch_voltage: f64, resistance: f64, tau: f64) -> f64 {
    let alpha = if tau > 0.0 { (-dt / tau).exp() } else { 0.0 };
    branch_voltage * alpha + current * resistance * (1.0 - alpha)
}

impl Model for FirstOrderCircuit<'_> {
    fn reset(&mut self) {
        // Branch voltage lives in PackState
    }
}

impl CircuitModel for FirstOrderCircuit<'_> {
    fn step_circuit(&mut self, ctx: SimContext, demand_w: f64, state: &mut PackState) -> StepOutcome {
        let soc = state.state_of_charge;
        let v1 = state.polarization_voltage;

        let ocv = self.pack.pack_ocv(self.model.ocv.evaluate(soc));
        let r0 = self.pack.pack_r0(self.model.r0_discharge.evaluate(soc));
        let r1 = self.pack.pack_r1(self.polarization.r1.evaluate(soc));
        // tau does not scale with the pack layout
        let tau = self.polarization.tau.evaluate(soc);

        let ocv_eff = ocv - v1;
        let Some(current) = solve_power_balance(ocv_eff, r0, demand_w) else {
            return StepOutcome::Unreachable {
                discriminant: discriminant(ocv_eff, r0, demand_w),
            };
        };
        let voltage = ocv - current * r0 - v1;

        state.current = current;
        state.voltage = voltage;
        state.polarization_voltage = update_rc_branch_voltage(ctx.dt, current, v1, r1, tau);
        StepOutcome::Solved { current, voltage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_balance_recovers_current() {
        let ocv = 400.0;
        let r0 = 0.12;
        for target in [1.0, 50.0, 250.0, -80.0] {
            let p = ocv * target - r0 * target * target;
            let current = solve_power_balance(ocv, r0, p).unwrap();
            assert!((current - target).abs() < 1e-9, "target {target}, got {current}");

            // the other root carries the same power through a much larger current
            let other = ocv / r0 - target;
            assert!((current - other).abs() > 1.0);
        }
    }

    #[test]
    fn test_power_balance_unreachable() {
        let ocv = 10.0;
        let r0 = 1.0;
        // 4·P·R0 > OCV²
        assert!(solve_power_balance(ocv, r0, 26.0).is_none());
        assert!(discriminant(ocv, r0, 26.0) < 0.0);
        assert!(solve_power_balance(ocv, r0, f64::NAN).is_none());
    }

    #[test]
    fn test_zero_resistance_is_linear() {
        let current = solve_power_balance(400.0, 0.0, 4000.0).unwrap();
        assert!((current - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_rc_branch_update() {
        let dt: f64 = 1.0;
        let tau = 10.0;
        let alpha = (-dt / tau).exp();
        let v1 = update_rc_branch_voltage(dt, 100.0, 0.0, 0.01, tau);
        assert!((v1 - 100.0 * 0.01 * (1.0 - alpha)).abs() < 1e-12);

        // degenerate tau charges the branch fully in one step
        assert!((update_rc_branch_voltage(dt, 100.0, 0.3, 0.01, 0.0) - 1.0).abs() < 1e-12);
    }
}
