use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::algorithms::least_squares::DEFAULT_SINGULAR_DETERMINANT;
use crate::algorithms::signal_velocity::SignalVelocity;
use crate::algorithms::three_point::GeometryLimits;
use crate::core::constants::{MAX_ARRIVAL_SPAN_NS, MIN_STATIONS, SIGNAL_VELOCITY_M_PER_NS};

/// Engine parameters of the strike locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Ground-wave propagation speed (m/ns)
    pub signal_velocity_m_per_ns: f64,
    /// Minimum number of distinct stations for a fix
    pub min_stations: usize,
    /// Maximum number of station triples tried for a seed
    pub max_triples: usize,
    /// Widest accepted spread of arrival times within one pulse (ns)
    pub max_arrival_span_ns: i64,
    /// Stop condition of the least-squares loop
    pub fit: FitTermination,
    /// Stations closer than this count as one place (meters)
    pub coincident_distance_m: f64,
    /// Sine of the enclosed angle below which a triple is collinear
    pub collinear_sine_threshold: f64,
    /// Scaled normal-equation determinant below which a fit step is refused
    pub singular_determinant_threshold: f64,
}

/// When the fit loop stops iterating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitTermination {
    /// Upper bound on Gauss-Newton steps
    pub max_iterations: usize,
    /// Relative decrease of the least-square sum that counts as converged
    pub epsilon: f64,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid parameter value
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Configuration file I/O error
    IoError { message: String },
    /// JSON serialization/deserialization error
    SerializationError { message: String },
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            signal_velocity_m_per_ns: SIGNAL_VELOCITY_M_PER_NS,
            min_stations: MIN_STATIONS,
            max_triples: 10,
            max_arrival_span_ns: MAX_ARRIVAL_SPAN_NS,
            fit: FitTermination::default(),
            coincident_distance_m: 1.0,
            collinear_sine_threshold: 1e-6,
            singular_determinant_threshold: DEFAULT_SINGULAR_DETERMINANT,
        }
    }
}

impl Default for FitTermination {
    fn default() -> Self {
        Self { max_iterations: 20, epsilon: 1e-9 }
    }
}

impl FitTermination {
    /// Whether a step from `previous` to `current` no longer pays off
    pub fn is_converged(&self, previous: f64, current: f64) -> bool {
        if previous <= 0.0 {
            return true;
        }
        (previous - current) / previous <= self.epsilon
    }
}

impl LocatorConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config: LocatorConfig = serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to parse config file '{}': {}", path_str, e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Check every parameter, reporting the first invalid one
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.signal_velocity_m_per_ns.is_finite() && self.signal_velocity_m_per_ns > 0.0) {
            return Err(invalid(
                "signal_velocity_m_per_ns",
                self.signal_velocity_m_per_ns,
                "must be a positive speed",
            ));
        }
        if self.min_stations < MIN_STATIONS {
            return Err(invalid(
                "min_stations",
                self.min_stations,
                &format!("at least {} stations are needed", MIN_STATIONS),
            ));
        }
        if self.max_triples == 0 {
            return Err(invalid("max_triples", self.max_triples, "must allow one triple"));
        }
        if self.max_arrival_span_ns <= 0 {
            return Err(invalid(
                "max_arrival_span_ns",
                self.max_arrival_span_ns,
                "must be a positive duration",
            ));
        }
        if self.fit.max_iterations == 0 {
            return Err(invalid("fit.max_iterations", self.fit.max_iterations, "must allow one step"));
        }
        for (parameter, value) in [
            ("fit.epsilon", self.fit.epsilon),
            ("coincident_distance_m", self.coincident_distance_m),
            ("collinear_sine_threshold", self.collinear_sine_threshold),
            ("singular_determinant_threshold", self.singular_determinant_threshold),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(parameter, value, "must be zero or positive"));
            }
        }
        Ok(())
    }

    pub fn velocity(&self) -> SignalVelocity {
        SignalVelocity::new(self.signal_velocity_m_per_ns)
    }

    pub fn geometry_limits(&self) -> GeometryLimits {
        GeometryLimits {
            coincident_distance_m: self.coincident_distance_m,
            collinear_sine: self.collinear_sine_threshold,
        }
    }
}

fn invalid<T: ToString>(parameter: &str, value: T, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } => {
                write!(f, "Invalid parameter '{}' = '{}': {}", parameter, value, reason)
            }
            ConfigError::IoError { message } => {
                write!(f, "I/O error: {}", message)
            }
            ConfigError::SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LocatorConfig::default();
        assert_eq!(config.signal_velocity_m_per_ns, 0.29904);
        assert_eq!(config.min_stations, 3);
        assert_eq!(config.fit.max_iterations, 20);
        assert!(config.validate().is_ok());
        assert_eq!(config.velocity(), SignalVelocity::default());
    }

    #[test]
    fn test_invalid_parameters() {
        let mut config = LocatorConfig::default();
        config.signal_velocity_m_per_ns = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { ref parameter, .. }) if parameter == "signal_velocity_m_per_ns"
        ));

        let mut config = LocatorConfig::default();
        config.min_stations = 2;
        assert!(config.validate().is_err());

        let mut config = LocatorConfig::default();
        config.fit.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = LocatorConfig::default();
        config.max_arrival_span_ns = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { ref parameter, .. }) if parameter == "max_arrival_span_ns"
        ));

        let mut config = LocatorConfig::default();
        config.collinear_sine_threshold = -1.0;
        let error = config.validate().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid parameter 'collinear_sine_threshold' = '-1': must be zero or positive"
        );
    }

    #[test]
    fn test_save_and_load() {
        let mut config = LocatorConfig::default();
        config.max_triples = 4;
        config.fit.epsilon = 1e-6;

        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();
        let loaded = LocatorConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), r#"{"min_stations": 5, "fit": {"max_iterations": 8}}"#).unwrap();

        let loaded = LocatorConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.min_stations, 5);
        assert_eq!(loaded.fit.max_iterations, 8);
        assert_eq!(loaded.fit.epsilon, 1e-9);
        assert_eq!(loaded.max_triples, 10);
        assert_eq!(loaded.max_arrival_span_ns, 100_000_000);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            LocatorConfig::from_file("/nonexistent/locator.json"),
            Err(ConfigError::IoError { .. })
        ));

        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "not json").unwrap();
        assert!(matches!(
            LocatorConfig::from_file(file.path()),
            Err(ConfigError::SerializationError { .. })
        ));

        fs::write(file.path(), r#"{"signal_velocity_m_per_ns": -1.0}"#).unwrap();
        assert!(matches!(
            LocatorConfig::from_file(file.path()),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_fit_termination() {
        let termination = FitTermination { max_iterations: 5, epsilon: 1e-3 };
        assert!(!termination.is_converged(100.0, 50.0));
        assert!(termination.is_converged(100.0, 99.95));
        assert!(termination.is_converged(100.0, 120.0));
        assert!(termination.is_converged(0.0, 0.0));
    }
}
