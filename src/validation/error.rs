//! Error types for strike location

use std::fmt;

use crate::utils::config::ConfigError;

/// Result type for locator operations
pub type LocatorResult<T> = Result<T, LocatorError>;

/// Why a set of stations cannot be used for a three-point solution
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryIssue {
    /// Not enough events were supplied
    TooFewEvents { available: usize, required: usize },
    /// More events than the solver takes
    TooManyEvents { available: usize, allowed: usize },
    /// Two stations share (almost) the same location
    CoincidentStations { distance_m: f64 },
    /// All stations lie on one geodesic
    CollinearStations { sine: f64 },
}

impl fmt::Display for GeometryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryIssue::TooFewEvents { available, required } => {
                write!(f, "{} events available, {} required", available, required)
            }
            GeometryIssue::TooManyEvents { available, allowed } => {
                write!(f, "{} events given, at most {} allowed", available, allowed)
            }
            GeometryIssue::CoincidentStations { distance_m } => {
                write!(f, "stations coincide ({:.3} m apart)", distance_m)
            }
            GeometryIssue::CollinearStations { sine } => {
                write!(f, "stations are collinear (sine of enclosed angle {:.3e})", sine)
            }
        }
    }
}

/// Errors raised by the location engine
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorError {
    /// Station set cannot define a solution
    InvalidInputGeometry { issue: GeometryIssue },
    /// Normal equations of a fit step are (nearly) singular
    DegenerateFit { determinant: f64 },
    /// Malformed coordinates or timestamp
    InvalidEvent { reason: String },
    /// Timestamp arithmetic left the representable range
    TimestampOutOfRange { offset_ns: i64 },
    /// Arrival times of one pulse lie further apart than allowed
    ArrivalSpanExceeded { span_ns: i128, allowed_ns: i64 },
    /// No station triple produced a candidate location
    NoSolution { triples_tried: usize },
    /// Invalid engine parameter
    Configuration { parameter: String, value: String, reason: String },
}

impl LocatorError {
    /// Whether the caller can carry on with a different station triple or an
    /// unrefined candidate
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LocatorError::NoSolution { .. }
                | LocatorError::DegenerateFit { .. }
                | LocatorError::InvalidInputGeometry {
                    issue: GeometryIssue::CoincidentStations { .. }
                        | GeometryIssue::CollinearStations { .. }
                }
        )
    }
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorError::InvalidInputGeometry { issue } => {
                write!(f, "Invalid input geometry: {}", issue)
            }
            LocatorError::DegenerateFit { determinant } => {
                write!(f, "Degenerate fit: normal equations determinant {:.3e}", determinant)
            }
            LocatorError::InvalidEvent { reason } => {
                write!(f, "Invalid event: {}", reason)
            }
            LocatorError::TimestampOutOfRange { offset_ns } => {
                write!(f, "Timestamp out of range after offset of {} ns", offset_ns)
            }
            LocatorError::ArrivalSpanExceeded { span_ns, allowed_ns } => {
                write!(f, "Arrival times span {} ns, at most {} ns allowed", span_ns, allowed_ns)
            }
            LocatorError::NoSolution { triples_tried } => {
                write!(f, "No solution found in {} station triples", triples_tried)
            }
            LocatorError::Configuration { parameter, value, reason } => {
                write!(f, "Configuration error: invalid {} = {} ({})", parameter, value, reason)
            }
        }
    }
}

impl std::error::Error for LocatorError {}

impl From<ConfigError> for LocatorError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::InvalidParameter { parameter, value, reason } => {
                LocatorError::Configuration { parameter, value, reason }
            }
            other => LocatorError::Configuration {
                parameter: "file".to_string(),
                value: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
