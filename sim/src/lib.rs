//! `sim` — Synthetic camera/LIDAR samples, scenarios and raw batch replay.

pub mod replay;
pub mod scenarios;
pub mod sensor_sim;
pub mod target;

pub use replay::{load_replay, save_replay, Recorder, ReplayLog, ReplayProvider, ReplaySource};
pub use scenarios::{Scenario, ScenarioKind};
pub use sensor_sim::{SensorSimulator, SimSensor, SimulatedProvider, SimulatedSource};
pub use target::{MotionSpec, Target};
