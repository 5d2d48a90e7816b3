//! `sensor_models` — Angular sensor geometry shared by the tracker and simulator.

pub mod observation;
pub mod sensor;

pub use observation::PolarFix;
pub use sensor::{AngularRange, GeometryError, RangeBounds, SensorKind};
