//! Strike output formatting
//!
//! Text follows the classic one-line strike format, JSON mirrors the serde
//! representation of [`Strike`], and CSV is meant for data logging.

use crate::core::types::{Event, Strike};
use serde::{Deserialize, Serialize};

/// Output formats for located strikes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// `<timestamp> <x> <y> <altitude> <amplitude> <lateral error> <stations>`
    Text,
    Json,
    Csv,
}

/// Renders strikes in one of the supported output formats
#[derive(Debug, Clone)]
pub struct StrikeFormatter {
    /// Output format
    pub format: OutputFormat,
    /// Pretty print JSON
    pub pretty: bool,
}

impl Default for StrikeFormatter {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            pretty: false,
        }
    }
}

impl StrikeFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format, ..Default::default() }
    }

    /// Create a pretty-printing JSON formatter
    pub fn pretty_json() -> Self {
        Self {
            format: OutputFormat::Json,
            pretty: true,
        }
    }

    /// CSV header row, `None` for formats without one
    pub fn header(&self) -> Option<String> {
        match self.format {
            OutputFormat::Csv => Some(
                "uuid,timestamp,longitude,latitude,altitude,amplitude,lateral_error,station_count,refined"
                    .to_string(),
            ),
            OutputFormat::Text | OutputFormat::Json => None,
        }
    }

    pub fn format(&self, strike: &Strike) -> Result<String, serde_json::Error> {
        match self.format {
            OutputFormat::Text => Ok(strike.to_string()),
            OutputFormat::Json if self.pretty => serde_json::to_string_pretty(strike),
            OutputFormat::Json => serde_json::to_string(strike),
            OutputFormat::Csv => Ok(self.format_csv(strike)),
        }
    }

    fn format_csv(&self, strike: &Strike) -> String {
        format!(
            "{},{},{:.6},{:.6},{},{},{:.3},{},{}",
            strike.uuid(),
            strike.timestamp,
            strike.location.x,
            strike.location.y,
            strike.altitude,
            strike.amplitude.map(|amplitude| format!("{:.1}", amplitude)).unwrap_or_default(),
            strike.lateral_error,
            strike.station_count,
            strike.refined
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geodesy::Point;

    fn strike() -> Strike {
        Strike {
            id: Some(42),
            timestamp: "2012-02-10 12:56:18.096651423".parse().unwrap(),
            location: Point::new(11.3, 49.5),
            altitude: 0,
            amplitude: None,
            lateral_error: 0.734,
            station_count: 4,
            stations: vec![1, 2, 3, 4],
            refined: true,
        }
    }

    #[test]
    fn test_text_format() {
        let formatter = StrikeFormatter::default();
        assert_eq!(
            formatter.format(&strike()).unwrap(),
            "2012-02-10 12:56:18.096651423 11.3000 49.5000 0 0.0 1 4"
        );
        assert!(formatter.header().is_none());
    }

    #[test]
    fn test_json_format() {
        let text = StrikeFormatter::new(OutputFormat::Json).format(&strike()).unwrap();
        let back: Strike = serde_json::from_str(&text).unwrap();
        assert_eq!(back, strike());

        let pretty = StrikeFormatter::pretty_json().format(&strike()).unwrap();
        assert!(pretty.contains("\n  \"timestamp\": \"2012-02-10 12:56:18.096651423\""));
    }

    #[test]
    fn test_csv_format() {
        let formatter = StrikeFormatter::new(OutputFormat::Csv);
        let row = formatter.format(&strike()).unwrap();
        let header = formatter.header().unwrap();

        assert_eq!(row.split(',').count(), header.split(',').count());
        assert!(row.ends_with(",11.300000,49.500000,0,,0.734,4,true"));
        assert!(row.starts_with(&strike().uuid()));
    }
}
