use mechanics::{
    DriveCycleTrace, VehicleConstants, VehicleParams, WLTC_CLASS3_SAMPLES, run_drive_cycle, simulate_drive_cycle,
};

/// Full-length trace as it would come out of the reference CSV: a few
/// trapezoidal speed bumps at 1 s spacing.
fn reference_csv() -> String {
    let mut csv = String::from("Total elapsed time ,\"WLTC class 3, version 5, vehicle speed\",Phase\n");
    for t in 0..WLTC_CLASS3_SAMPLES {
        let phase = t % 300;
        let speed_kmh = match phase {
            0..=49 => phase as f64,
            50..=199 => 50.0,
            200..=249 => (250 - phase) as f64,
            _ => 0.0,
        };
        csv.push_str(&format!("{t},{speed_kmh},low\n"));
    }
    csv
}

fn trace() -> DriveCycleTrace {
    DriveCycleTrace::from_reader("wltc.csv", reference_csv().as_bytes()).unwrap()
}

#[test]
fn reference_length_trace_loads() {
    let trace = trace();
    assert_eq!(trace.len(), WLTC_CLASS3_SAMPLES);
    assert_eq!(trace.time_s()[1800], 1800.0);
    assert!((trace.speed_ms()[100] - 50.0 / 3.6).abs() < 1e-12);
}

#[test]
fn energy_is_positive_and_reproducible() {
    let trace = trace();
    let a = run_drive_cycle(&trace, 1502.0, 0.0, 0.0);
    let b = run_drive_cycle(&trace, 1502.0, 0.0, 0.0);

    assert_eq!(a.len(), WLTC_CLASS3_SAMPLES);
    assert_eq!(a.power_batt_w[0], 1000.0);
    assert_eq!(a.power_total_w[0], 0.0);
    assert_eq!(a.energy_wh[0], 0.0);
    assert!(a.total_energy_wh() > 0.0);
    assert_eq!(a.total_energy_wh().to_bits(), b.total_energy_wh().to_bits());
}

#[test]
fn heavier_uphill_and_headwind_cost_more() {
    let trace = trace();
    let constants = VehicleConstants::default();
    let base = VehicleParams::default();
    let flat = simulate_drive_cycle(&trace, &constants, &base).total_energy_wh();

    let heavy = simulate_drive_cycle(&trace, &constants, &base.with_mass(2000.0)).total_energy_wh();
    let uphill = simulate_drive_cycle(&trace, &constants, &base.with_grade(0.02)).total_energy_wh();
    let windy = simulate_drive_cycle(&trace, &constants, &base.with_headwind(-5.0)).total_energy_wh();

    assert!(heavy > flat);
    assert!(uphill > flat);
    // aero term uses (v - headwind), so a negative headwind adds drag
    assert!(windy > flat);
}
