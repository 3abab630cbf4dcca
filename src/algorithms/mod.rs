//! Location algorithms: propagation model, three-point solver and
//! least-squares refinement

pub mod least_squares;
pub mod signal_velocity;
pub mod three_point;

pub use least_squares::{FitParameter, FitParameters, LeastSquareFit};
pub use signal_velocity::SignalVelocity;
pub use three_point::{angle_to_azimuth, azimuth_to_angle, GeometryLimits, ThreePointSolution, ThreePointSolver};
