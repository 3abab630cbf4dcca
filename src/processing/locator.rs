//! From a batch of detection events to a located strike
//!
//! Events are screened and ordered by arrival. Station triples, earliest
//! first, are fed to the three-point solver until one yields a candidate; the
//! candidate agreeing best with every station seeds the least-squares fit.

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::algorithms::least_squares::LeastSquareFit;
use crate::algorithms::signal_velocity::SignalVelocity;
use crate::algorithms::three_point::{GeometryLimits, ThreePointSolution, ThreePointSolver};
use crate::core::types::{DetectionEvent, Strike};
use crate::utils::config::LocatorConfig;
use crate::validation::data::EventValidator;
use crate::validation::error::{LocatorError, LocatorResult};

/// Receiver of located strikes, e.g. a persistence layer
pub trait StrikeSink {
    fn store(&mut self, strike: &Strike);
}

impl StrikeSink for Vec<Strike> {
    fn store(&mut self, strike: &Strike) {
        self.push(strike.clone());
    }
}

/// Counts of a batch run through [`StrikeLocator::process_into`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    pub located: usize,
    pub failed: usize,
}

/// Locates strikes with a fixed set of engine parameters
#[derive(Debug, Clone)]
pub struct StrikeLocator {
    config: LocatorConfig,
    validator: EventValidator,
    velocity: SignalVelocity,
    limits: GeometryLimits,
}

impl StrikeLocator {
    pub fn new(config: LocatorConfig) -> LocatorResult<Self> {
        config.validate()?;
        Ok(Self {
            validator: EventValidator::new(config.min_stations)
                .with_max_arrival_span(config.max_arrival_span_ns),
            velocity: config.velocity(),
            limits: config.geometry_limits(),
            config,
        })
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Locates the strike that the detection events of one pulse report
    pub fn locate(&self, events: &[DetectionEvent]) -> LocatorResult<Strike> {
        let events = self.validator.validate(events)?;
        let candidate = self.seed(&events)?;
        self.refine(&candidate, &events)
    }

    /// Locates independent pulses in parallel, keeping the input order
    pub fn locate_all(&self, groups: &[Vec<DetectionEvent>]) -> Vec<LocatorResult<Strike>> {
        groups.par_iter().map(|events| self.locate(events)).collect()
    }

    /// Locates every group and hands the strikes to `sink`
    pub fn process_into<S: StrikeSink + ?Sized>(
        &self,
        groups: &[Vec<DetectionEvent>],
        sink: &mut S,
    ) -> ProcessingSummary {
        let mut summary = ProcessingSummary::default();
        for result in self.locate_all(groups) {
            match result {
                Ok(strike) => {
                    sink.store(&strike);
                    summary.located += 1;
                }
                Err(error) => {
                    debug!(%error, "pulse not located");
                    summary.failed += 1;
                }
            }
        }
        info!(located = summary.located, failed = summary.failed, "batch processed");
        summary
    }

    /// Best three-point candidate of the earliest triple that has any
    fn seed(&self, events: &[DetectionEvent]) -> LocatorResult<ThreePointSolution> {
        let mut triples_tried = 0;
        for triple in triples(events.len()).take(self.config.max_triples) {
            triples_tried += 1;
            let stations = triple.map(|index| events[index]);
            let solutions = match ThreePointSolver::with_limits(&stations, &self.velocity, &self.limits) {
                Ok(solver) => solver.into_solutions(),
                Err(error) => {
                    debug!(?triple, %error, "skipping station triple");
                    continue;
                }
            };

            let mut best: Option<(f64, ThreePointSolution)> = None;
            for solution in solutions {
                let sum = LeastSquareFit::new(&solution, events, self.velocity)?.calculate_least_square_sum();
                trace!(location = %solution.get_location(), sum, "three point candidate");
                if best.as_ref().map_or(true, |(best_sum, _)| sum < *best_sum) {
                    best = Some((sum, solution));
                }
            }
            if let Some((sum, solution)) = best {
                debug!(?triple, location = %solution.get_location(), sum, "seed selected");
                return Ok(solution);
            }
        }
        Err(LocatorError::NoSolution { triples_tried })
    }

    /// Runs the fit loop from `candidate`, keeping the candidate when the fit
    /// degenerates
    fn refine(&self, candidate: &ThreePointSolution, events: &[DetectionEvent]) -> LocatorResult<Strike> {
        let termination = self.config.fit;
        let mut fit = LeastSquareFit::new(candidate, events, self.velocity)?
            .with_singular_determinant(self.config.singular_determinant_threshold);
        let initial = *fit.parameters();
        let mut sum = fit.calculate_least_square_sum();
        let mut refined = true;

        for iteration in 0..termination.max_iterations {
            let previous = *fit.parameters();
            match fit.perform_fit_step() {
                Ok(current) if current <= sum => {
                    trace!(iteration, sum = current, "fit step");
                    let converged = termination.is_converged(sum, current);
                    sum = current;
                    if converged {
                        break;
                    }
                }
                Ok(current) => {
                    debug!(iteration, sum, rejected = current, "fit step made things worse");
                    fit.set_parameters(previous);
                    break;
                }
                Err(LocatorError::DegenerateFit { determinant }) => {
                    warn!(determinant, "degenerate fit, keeping three point candidate");
                    refined = false;
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        if refined && !fit.get_location().is_valid_wgs84() {
            warn!(location = %fit.get_location(), "fit left the ellipsoid, keeping three point candidate");
            refined = false;
        }
        if !refined {
            fit.set_parameters(initial);
            sum = fit.calculate_least_square_sum();
        }

        let strike = Strike {
            id: None,
            timestamp: fit.origin_timestamp()?,
            location: fit.get_location(),
            altitude: 0,
            amplitude: None,
            lateral_error: sum,
            station_count: events.len(),
            stations: events.iter().filter_map(|event| event.station()).collect(),
            refined,
        };
        debug!(%strike, refined, "strike located");
        Ok(strike)
    }
}

/// Index triples `i < j < k` in lexicographic order
fn triples(count: usize) -> impl Iterator<Item = [usize; 3]> {
    (0..count).flat_map(move |i| {
        (i + 1..count).flat_map(move |j| (j + 1..count).map(move |k| [i, j, k]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geodesy::Point;
    use crate::core::timestamp::NanosecondTimestamp;
    use crate::core::types::Event;
    use crate::validation::error::GeometryIssue;
    use assert_approx_eq::assert_approx_eq;

    fn origin_time() -> NanosecondTimestamp {
        "2013-06-20 15:44:02.761093000".parse().unwrap()
    }

    fn network() -> Vec<Point> {
        vec![
            Point::new(11.0, 49.0),
            Point::new(12.0, 49.0),
            Point::new(11.0, 50.0),
            Point::new(12.0, 50.0),
            Point::new(11.6, 48.6),
        ]
    }

    fn events_from(origin: Point, stations: &[Point]) -> Vec<DetectionEvent> {
        let velocity = SignalVelocity::default();
        stations
            .iter()
            .enumerate()
            .map(|(number, station)| {
                let delay = velocity.get_distance_time(origin.distance_to(station)).round() as i64;
                DetectionEvent::new(*station, origin_time().checked_add_ns(delay).unwrap())
                    .unwrap()
                    .with_station(number as u32 + 1)
            })
            .collect()
    }

    fn locator() -> StrikeLocator {
        StrikeLocator::new(LocatorConfig::default()).unwrap()
    }

    #[test]
    fn test_locate_with_all_stations() {
        let origin = Point::new(11.45, 49.35);
        let strike = locator().locate(&events_from(origin, &network())).unwrap();

        assert!(strike.refined);
        assert_approx_eq!(strike.location.x, origin.x, 1e-4);
        assert_approx_eq!(strike.location.y, origin.y, 1e-4);
        assert!(strike.timestamp.ns_difference_to(&origin_time()).abs() < 10);
        assert_eq!(strike.station_count, 5);
        assert!(strike.has_participant(5));
        assert!(strike.lateral_error < 5.0);
    }

    #[test]
    fn test_fourth_station_resolves_ambiguity() {
        // the earliest triple alone has two roots for this origin
        let origin = Point::new(11.1, 49.1);
        let strike = locator().locate(&events_from(origin, &network()[..4])).unwrap();

        assert_approx_eq!(strike.location.x, origin.x, 1e-4);
        assert_approx_eq!(strike.location.y, origin.y, 1e-4);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let origin = Point::new(11.7, 49.6);
        let mut events = events_from(origin, &network());
        let ordered = locator().locate(&events).unwrap();
        events.reverse();
        let reversed = locator().locate(&events).unwrap();

        assert_eq!(ordered.location, reversed.location);
        assert_eq!(ordered.timestamp, reversed.timestamp);
    }

    #[test]
    fn test_too_few_stations() {
        let events = events_from(Point::new(11.5, 49.5), &network()[..2]);
        let error = locator().locate(&events).unwrap_err();

        assert!(matches!(
            error,
            LocatorError::InvalidInputGeometry { issue: GeometryIssue::TooFewEvents { available: 2, .. } }
        ));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_no_solution() {
        let mut events = events_from(Point::new(11.5, 49.5), &network()[..3]);
        let early = origin_time().checked_add_ns(-400_000).unwrap();
        events[1] = DetectionEvent::new(*events[1].location(), early).unwrap().with_station(2);

        let error = locator().locate(&events).unwrap_err();
        assert_eq!(error, LocatorError::NoSolution { triples_tried: 1 });
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_arrivals_centuries_apart_are_rejected() {
        let at = |text: &str| text.parse::<NanosecondTimestamp>().unwrap();
        let stray = vec![
            DetectionEvent::new(network()[0], at("1901-01-01 00:00:00")).unwrap().with_station(1),
            DetectionEvent::new(network()[1], at("2200-01-01 00:00:00")).unwrap().with_station(2),
            DetectionEvent::new(network()[2], at("2200-01-01 00:00:00")).unwrap().with_station(3),
        ];

        let error = locator().locate(&stray).unwrap_err();
        assert!(matches!(error, LocatorError::ArrivalSpanExceeded { allowed_ns: 100_000_000, .. }));
        assert!(!error.is_recoverable());

        let groups = vec![stray, events_from(Point::new(11.2, 49.3), &network())];
        let results = locator().locate_all(&groups);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_collinear_network_has_no_solution() {
        let stations = vec![Point::new(11.0, 49.0), Point::new(11.0, 49.5), Point::new(11.0, 50.0)];
        let events = events_from(Point::new(11.3, 49.2), &stations);

        assert_eq!(locator().locate(&events).unwrap_err(), LocatorError::NoSolution { triples_tried: 1 });
    }

    #[test]
    fn test_degenerate_fit_keeps_candidate() {
        // no normal matrix with unit diagonal has a determinant above one
        let config = LocatorConfig { singular_determinant_threshold: 1.0, ..LocatorConfig::default() };
        let origin = Point::new(11.45, 49.35);
        let events = events_from(origin, &network());

        let strike = StrikeLocator::new(config).unwrap().locate(&events).unwrap();
        assert!(!strike.refined);
        assert!(strike.location.distance_to(&origin) < 100.0);
        assert!(strike.lateral_error.is_finite());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = LocatorConfig { min_stations: 1, ..LocatorConfig::default() };
        assert!(matches!(StrikeLocator::new(config), Err(LocatorError::Configuration { .. })));
    }

    #[test]
    fn test_locate_all_keeps_order() {
        let origins = [Point::new(11.2, 49.3), Point::new(11.8, 49.7), Point::new(11.5, 49.1)];
        let groups: Vec<_> = origins.iter().map(|origin| events_from(*origin, &network())).collect();

        let results = locator().locate_all(&groups);
        assert_eq!(results.len(), 3);
        for (result, origin) in results.iter().zip(origins.iter()) {
            let strike = result.as_ref().unwrap();
            assert!(strike.location.distance_to(origin) < 10.0);
        }
    }

    #[test]
    fn test_process_into_sink() {
        let groups = vec![
            events_from(Point::new(11.2, 49.3), &network()),
            events_from(Point::new(11.5, 49.5), &network()[..2]),
            events_from(Point::new(11.8, 49.7), &network()),
        ];

        let mut stored: Vec<Strike> = Vec::new();
        let summary = locator().process_into(&groups, &mut stored);

        assert_eq!(summary, ProcessingSummary { located: 2, failed: 1 });
        assert_eq!(stored.len(), 2);
        assert!(stored[1].location.distance_to(&Point::new(11.8, 49.7)) < 10.0);
    }

    #[test]
    fn test_triples_order() {
        let all: Vec<_> = triples(4).collect();
        assert_eq!(all, vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]]);
        assert_eq!(triples(2).count(), 0);
    }
}
