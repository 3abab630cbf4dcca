//! Physical constants and system parameters

/// WGS84 semi-major axis (meters)
pub const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// WGS84 flattening
pub const WGS84_FLATTENING: f64 = 1.0 / 298.257223563;

/// WGS84 semi-minor axis (meters)
pub const WGS84_SEMI_MINOR_AXIS: f64 = WGS84_SEMI_MAJOR_AXIS * (1.0 - WGS84_FLATTENING);

/// WGS84 first eccentricity squared
pub const WGS84_ECCENTRICITY_SQUARED: f64 =
    2.0 * WGS84_FLATTENING - WGS84_FLATTENING * WGS84_FLATTENING;

/// Calibrated propagation speed of the ground wave (meters per nanosecond).
///
/// About 0.25 % below free-space light speed.
pub const SIGNAL_VELOCITY_M_PER_NS: f64 = 0.29904;

/// Events dated in or before this year are rejected
pub const MIN_VALID_YEAR: i32 = 1900;

/// Minimum number of stations for a two-dimensional fix
pub const MIN_STATIONS: usize = 3;

/// Widest accepted spread of arrival times within one pulse (nanoseconds).
///
/// 100 ms is the ground-wave travel time over roughly 30 000 km.
pub const MAX_ARRIVAL_SPAN_NS: i64 = 100_000_000;
