pub mod vehicle;
pub mod drive_cycle;

pub use vehicle::{RoadLoad, VehicleConstants, VehicleParams};
pub use drive_cycle::{
    DriveCycleResult, DriveCycleTrace, WLTC_CLASS3_SAMPLES, WLTC_SPEED_COLUMN, WLTC_TIME_COLUMN, run_drive_cycle,
    simulate_drive_cycle,
};
