//! Core data types for strike location

use std::fmt;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::constants::MIN_VALID_YEAR;
use crate::core::geodesy::Point;
use crate::core::timestamp::NanosecondTimestamp;
use crate::validation::error::{LocatorError, LocatorResult};

/// Anything that happened at a place and a precise time
pub trait Event {
    fn location(&self) -> &Point;

    fn timestamp(&self) -> &NanosecondTimestamp;

    /// Signed nanoseconds from this event to `other`
    fn ns_difference_to(&self, other: &dyn Event) -> i64 {
        self.timestamp().ns_difference_to(other.timestamp())
    }

    /// Microsecond-resolution difference from this event to `other`
    fn difference_to(&self, other: &dyn Event) -> TimeDelta {
        self.timestamp().difference_to(other.timestamp())
    }

    fn has_same_location(&self, other: &dyn Event) -> bool {
        self.location() == other.location()
    }

    /// Valid WGS84 location other than (0, 0) and a plausible year
    fn is_valid(&self) -> bool {
        let location = self.location();
        (location.x != 0.0 || location.y != 0.0)
            && location.is_valid_wgs84()
            && self.timestamp().timestamp().year() > MIN_VALID_YEAR
    }

    /// Identifier derived from time and position
    fn uuid(&self) -> String {
        format!(
            "{}-{:05.0}-{:05.0}",
            self.timestamp().unix_nanos(),
            self.location().x * 100.0,
            self.location().y * 100.0
        )
    }
}

/// Arrival of a pulse at one station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    location: Point,
    timestamp: NanosecondTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    station: Option<u32>,
}

impl DetectionEvent {
    /// Builds a validated event
    pub fn new(location: Point, timestamp: NanosecondTimestamp) -> LocatorResult<Self> {
        let event = Self { location, timestamp, station: None };
        event.check()?;
        Ok(event)
    }

    /// Tags the event with the reporting station number
    pub fn with_station(mut self, station: u32) -> Self {
        self.station = Some(station);
        self
    }

    pub fn station(&self) -> Option<u32> {
        self.station
    }

    /// Rejects events that deserialized into invalid coordinates or times
    pub fn check(&self) -> LocatorResult<()> {
        if !self.location.is_valid_wgs84() || (self.location.x == 0.0 && self.location.y == 0.0) {
            return Err(LocatorError::InvalidEvent {
                reason: format!("location {} is not a valid station position", self.location),
            });
        }
        if self.timestamp.timestamp().year() <= MIN_VALID_YEAR {
            return Err(LocatorError::InvalidEvent {
                reason: format!("timestamp {} predates {}", self.timestamp, MIN_VALID_YEAR),
            });
        }
        Ok(())
    }
}

impl Event for DetectionEvent {
    fn location(&self) -> &Point {
        &self.location
    }

    fn timestamp(&self) -> &NanosecondTimestamp {
        &self.timestamp
    }
}

impl fmt::Display for DetectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.4} {:.4}", self.timestamp, self.location.x, self.location.y)
    }
}

/// A located lightning stroke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strike {
    /// Storage identifier, assigned by the persistence layer
    pub id: Option<i64>,
    /// Origin time
    pub timestamp: NanosecondTimestamp,
    pub location: Point,
    /// Altitude in meters; ground-wave fixes are two-dimensional
    pub altitude: i32,
    pub amplitude: Option<f64>,
    /// Final least-square sum of the residual times (ns²)
    pub lateral_error: f64,
    /// Number of contributing stations
    pub station_count: usize,
    /// Numbers of the contributing stations, where known
    pub stations: Vec<u32>,
    /// False when the fit degenerated and the three-point candidate was kept
    pub refined: bool,
}

impl Strike {
    pub fn has_participant(&self, station: u32) -> bool {
        self.stations.contains(&station)
    }

    /// The `(location, time)` pair consumed by spatial aggregation
    pub fn grid_sample(&self) -> (Point, DateTime<Utc>) {
        (self.location, self.timestamp.to_datetime())
    }
}

impl Event for Strike {
    fn location(&self) -> &Point {
        &self.location
    }

    fn timestamp(&self) -> &NanosecondTimestamp {
        &self.timestamp
    }
}

impl fmt::Display for Strike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.4} {:.4} {} {:.1} {:.0} {}",
            self.timestamp,
            self.location.x,
            self.location.y,
            self.altitude,
            self.amplitude.unwrap_or(0.0),
            self.lateral_error,
            self.station_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamp(text: &str) -> NanosecondTimestamp {
        text.parse().unwrap()
    }

    fn event(x: f64, y: f64, time: &str) -> DetectionEvent {
        DetectionEvent::new(Point::new(x, y), timestamp(time)).unwrap()
    }

    #[test]
    fn test_ns_difference_between_events() {
        let first = event(11.0, 49.0, "2012-02-10 12:56:18.096651423");
        let second = event(12.0, 49.0, "2012-02-10 12:56:18.096652120");

        assert_eq!(first.ns_difference_to(&second), 697);
        assert_eq!(second.ns_difference_to(&first), -697);
        assert_eq!(first.difference_to(&second), TimeDelta::microseconds(1));
    }

    #[test]
    fn test_same_location() {
        let first = event(11.0, 49.0, "2012-02-10 12:56:18.1");
        let second = event(11.0, 49.0, "2012-02-10 12:56:19.1");
        let third = event(11.0, 49.5, "2012-02-10 12:56:18.1");
        assert!(first.has_same_location(&second));
        assert!(!first.has_same_location(&third));
    }

    #[test]
    fn test_invalid_events_are_rejected() {
        let time = timestamp("2012-02-10 12:56:18");
        assert!(DetectionEvent::new(Point::new(0.0, 0.0), time).is_err());
        assert!(DetectionEvent::new(Point::new(181.0, 10.0), time).is_err());
        assert!(DetectionEvent::new(Point::new(10.0, -90.0), time).is_err());
        assert!(DetectionEvent::new(Point::new(10.0, 10.0), timestamp("1900-12-31 23:59:59")).is_err());
        assert!(DetectionEvent::new(Point::new(10.0, 10.0), time).unwrap().is_valid());
    }

    #[test]
    fn test_uuid() {
        let first = event(11.0, 49.0, "1970-01-01 00:00:01.000000002");
        assert_eq!(first.uuid(), "1000000002-01100-04900");
    }

    #[test]
    fn test_strike_text_and_grid_sample() {
        let strike = Strike {
            id: None,
            timestamp: timestamp("2012-02-10 12:56:18.096651423"),
            location: Point::new(11.5, 49.25),
            altitude: 0,
            amplitude: Some(12.34),
            lateral_error: 41.6,
            station_count: 6,
            stations: vec![12, 17],
            refined: true,
        };

        assert_eq!(strike.to_string(), "2012-02-10 12:56:18.096651423 11.5000 49.2500 0 12.3 42 6");
        assert!(strike.has_participant(17));
        assert!(!strike.has_participant(3));

        let (location, time) = strike.grid_sample();
        assert_eq!(location, Point::new(11.5, 49.25));
        assert_eq!(time, strike.timestamp.to_datetime());
    }

    #[test]
    fn test_event_json() {
        let json = r#"{"location":{"x":11.0,"y":49.0},"timestamp":"2012-02-10 12:56:18.096651423","station":4}"#;
        let parsed: DetectionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.station(), Some(4));
        assert_eq!(parsed.timestamp().nanoseconds(), 423);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }
}
