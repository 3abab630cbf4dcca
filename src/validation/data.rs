use tracing::{debug, warn};

use crate::core::constants::{MAX_ARRIVAL_SPAN_NS, MIN_STATIONS};
use crate::core::types::{DetectionEvent, Event};
use crate::validation::error::{GeometryIssue, LocatorError, LocatorResult};

/// Why an event was left out of a fix
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Coordinates or timestamp are unusable
    Invalid(LocatorError),
    /// The station already reported earlier in the batch
    DuplicateStation,
}

/// Outcome of screening a batch of detection events
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Usable events ordered by arrival time
    pub valid_events: Vec<DetectionEvent>,
    pub rejected_events: Vec<(DetectionEvent, Rejection)>,
}

/// Screens detection events before they reach the solver
#[derive(Debug, Clone)]
pub struct EventValidator {
    min_stations: usize,
    max_arrival_span_ns: i64,
}

impl Default for EventValidator {
    fn default() -> Self {
        Self::new(MIN_STATIONS)
    }
}

impl EventValidator {
    pub fn new(min_stations: usize) -> Self {
        Self { min_stations, max_arrival_span_ns: MAX_ARRIVAL_SPAN_NS }
    }

    /// Sets the widest accepted spread between the first and last arrival
    pub fn with_max_arrival_span(mut self, max_arrival_span_ns: i64) -> Self {
        self.max_arrival_span_ns = max_arrival_span_ns;
        self
    }

    pub fn min_stations(&self) -> usize {
        self.min_stations
    }

    pub fn max_arrival_span_ns(&self) -> i64 {
        self.max_arrival_span_ns
    }

    /// Sorts `events` by arrival time and separates the usable ones.
    ///
    /// A station reporting twice keeps its earliest report. Events without a
    /// station number are told apart by location.
    pub fn inspect(&self, events: &[DetectionEvent]) -> ValidationResult {
        let mut sorted = events.to_vec();
        sorted.sort_by_key(|event| *event.timestamp());

        let mut valid_events: Vec<DetectionEvent> = Vec::with_capacity(sorted.len());
        let mut rejected_events = Vec::new();
        for event in sorted {
            if let Err(error) = event.check() {
                rejected_events.push((event, Rejection::Invalid(error)));
            } else if valid_events.iter().any(|kept| Self::same_station(kept, &event)) {
                rejected_events.push((event, Rejection::DuplicateStation));
            } else {
                valid_events.push(event);
            }
        }

        ValidationResult { valid_events, rejected_events }
    }

    /// Usable events ordered by arrival time.
    ///
    /// Fails with `TooFewEvents` when fewer than the required number of
    /// stations remain, and with `ArrivalSpanExceeded` when the remaining
    /// arrivals cannot belong to one pulse.
    pub fn validate(&self, events: &[DetectionEvent]) -> LocatorResult<Vec<DetectionEvent>> {
        let result = self.inspect(events);
        for (event, rejection) in &result.rejected_events {
            match rejection {
                Rejection::Invalid(error) => warn!(%event, %error, "dropping invalid event"),
                Rejection::DuplicateStation => debug!(%event, "dropping repeated station report"),
            }
        }

        if result.valid_events.len() < self.min_stations {
            return Err(LocatorError::InvalidInputGeometry {
                issue: GeometryIssue::TooFewEvents {
                    available: result.valid_events.len(),
                    required: self.min_stations,
                },
            });
        }

        if let (Some(first), Some(last)) = (result.valid_events.first(), result.valid_events.last()) {
            let span_ns = last.timestamp().unix_nanos() - first.timestamp().unix_nanos();
            if span_ns > self.max_arrival_span_ns as i128 {
                warn!(span_ns, allowed_ns = self.max_arrival_span_ns, "arrival times too far apart");
                return Err(LocatorError::ArrivalSpanExceeded {
                    span_ns,
                    allowed_ns: self.max_arrival_span_ns,
                });
            }
        }
        Ok(result.valid_events)
    }

    fn same_station(first: &DetectionEvent, second: &DetectionEvent) -> bool {
        match (first.station(), second.station()) {
            (Some(a), Some(b)) => a == b,
            _ => first.has_same_location(second),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geodesy::Point;
    use crate::core::timestamp::NanosecondTimestamp;
    use serde_json::json;

    fn at(offset_ns: i64) -> NanosecondTimestamp {
        let base: NanosecondTimestamp = "2012-02-10 12:56:18.096651000".parse().unwrap();
        base.checked_add_ns(offset_ns).unwrap()
    }

    fn event(station: u32, x: f64, y: f64, offset_ns: i64) -> DetectionEvent {
        DetectionEvent::new(Point::new(x, y), at(offset_ns)).unwrap().with_station(station)
    }

    #[test]
    fn test_sorts_by_arrival() {
        let validator = EventValidator::default();
        let events = vec![
            event(3, 11.0, 50.0, 900),
            event(1, 11.0, 49.0, 100),
            event(2, 12.0, 49.0, 500),
        ];

        let valid = validator.validate(&events).unwrap();
        let stations: Vec<_> = valid.iter().filter_map(|event| event.station()).collect();
        assert_eq!(stations, vec![1, 2, 3]);
    }

    #[test]
    fn test_keeps_earliest_report_per_station() {
        let validator = EventValidator::default();
        let events = vec![
            event(1, 11.0, 49.0, 700),
            event(1, 11.0, 49.0, 100),
            event(2, 12.0, 49.0, 500),
            event(3, 11.0, 50.0, 900),
        ];

        let result = validator.inspect(&events);
        assert_eq!(result.valid_events.len(), 3);
        assert_eq!(result.valid_events[0].timestamp(), &at(100));
        assert_eq!(result.rejected_events.len(), 1);
        assert_eq!(result.rejected_events[0].1, Rejection::DuplicateStation);
        assert_eq!(result.rejected_events[0].0.timestamp(), &at(700));
    }

    #[test]
    fn test_unnumbered_stations_compare_by_location() {
        let validator = EventValidator::default();
        let events = vec![
            DetectionEvent::new(Point::new(11.0, 49.0), at(0)).unwrap(),
            DetectionEvent::new(Point::new(11.0, 49.0), at(10)).unwrap(),
            DetectionEvent::new(Point::new(12.0, 49.0), at(20)).unwrap(),
        ];

        let error = validator.validate(&events).unwrap_err();
        assert_eq!(
            error,
            LocatorError::InvalidInputGeometry {
                issue: GeometryIssue::TooFewEvents { available: 2, required: 3 }
            }
        );
    }

    #[test]
    fn test_drops_invalid_events() {
        // deserialized events bypass the constructor checks
        let broken: DetectionEvent = serde_json::from_value(json!({
            "location": {"x": 0.0, "y": 0.0},
            "timestamp": "2012-02-10 12:56:18.096651000",
            "station": 9
        }))
        .unwrap();
        let events = vec![
            broken,
            event(1, 11.0, 49.0, 100),
            event(2, 12.0, 49.0, 500),
            event(3, 11.0, 50.0, 900),
        ];

        let result = EventValidator::default().inspect(&events);
        assert_eq!(result.valid_events.len(), 3);
        assert!(matches!(
            result.rejected_events[0].1,
            Rejection::Invalid(LocatorError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn test_minimum_station_count() {
        let validator = EventValidator::new(4);
        let events = vec![
            event(1, 11.0, 49.0, 100),
            event(2, 12.0, 49.0, 500),
            event(3, 11.0, 50.0, 900),
        ];
        assert!(validator.validate(&events).is_err());
        assert!(EventValidator::default().validate(&events).is_ok());
    }

    #[test]
    fn test_rejects_arrivals_centuries_apart() {
        let validator = EventValidator::default();
        let at = |text: &str| text.parse::<NanosecondTimestamp>().unwrap();
        let events = vec![
            DetectionEvent::new(Point::new(11.0, 49.0), at("1901-01-01 00:00:00")).unwrap(),
            DetectionEvent::new(Point::new(12.0, 49.0), at("2200-01-01 00:00:00")).unwrap(),
            DetectionEvent::new(Point::new(11.0, 50.0), at("2200-01-01 00:00:00")).unwrap(),
        ];

        match validator.validate(&events).unwrap_err() {
            LocatorError::ArrivalSpanExceeded { span_ns, allowed_ns } => {
                assert!(span_ns > i64::MAX as i128);
                assert_eq!(allowed_ns, MAX_ARRIVAL_SPAN_NS);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_arrival_span_limit() {
        let events = vec![
            event(1, 11.0, 49.0, 0),
            event(2, 12.0, 49.0, 500),
            event(3, 11.0, 50.0, 2_000),
        ];

        assert!(EventValidator::default().with_max_arrival_span(2_000).validate(&events).is_ok());
        assert_eq!(
            EventValidator::default().with_max_arrival_span(1_999).validate(&events).unwrap_err(),
            LocatorError::ArrivalSpanExceeded { span_ns: 2_000, allowed_ns: 1_999 }
        );
    }
}
