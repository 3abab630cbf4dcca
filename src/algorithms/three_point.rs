//! Closed-form location from the arrival times at three stations
//!
//! The unknown origin is described relative to the reference station
//! `E0` by a direction `θ` (counter-clockwise from east) and a distance `r`.
//! With `b`, `α` the distance and direction of `E1` from `E0`, and `g` the
//! extra path length implied by the arrival-time difference, the law of
//! cosines gives
//!
//! ```text
//! (r + g)² = r² + b² - 2·r·b·cos(θ - α)   =>   r = (b² - g²) / (2·(g + b·cos(θ - α)))
//! ```
//!
//! Equating `r` for `E1` and `E2` leaves `P·cos θ + Q·sin θ = S`, solved with
//! `θ = atan2(Q, P) ± acos(S / √(P² + Q²))`. The planar relation is exact
//! for the distances and directions from `E0`, but not for the remaining
//! sides of the triangles; each root is therefore polished with a few damped
//! Newton iterations on the ellipsoid.
//!
//! Near a tangent discriminant the ellipsoid equations may miss an exact
//! intersection by a few meters. Such grazing roots are kept at their point
//! of least mismatch, and a grazing pair closer than
//! `GRAZING_SEPARATION_M` is reported once.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Matrix2, Vector2};
use tracing::{debug, trace, warn};

use crate::algorithms::signal_velocity::SignalVelocity;
use crate::core::geodesy::{normalize_azimuth, Point};
use crate::core::timestamp::NanosecondTimestamp;
use crate::core::types::{DetectionEvent, Event};
use crate::validation::error::{GeometryIssue, LocatorError, LocatorResult};

/// Relative discriminant below which the two roots are treated as one
const TANGENT_DISCRIMINANT: f64 = 1e-12;

/// Newton iteration limit for polishing a root
const MAX_POLISH_ITERATIONS: usize = 12;

/// Path-length mismatch below which a polished root is exact (meters)
const POLISH_TOLERANCE_M: f64 = 1e-3;

/// Largest mismatch kept for a grazing root (meters), about 33 ns of timing
const GRAZING_TOLERANCE_M: f64 = 10.0;

/// Grazing roots closer than this are one solution (meters)
const GRAZING_SEPARATION_M: f64 = 1_000.0;

/// Smallest fraction of a Newton step tried before polishing gives up
const MIN_STEP_FRACTION: f64 = 1.0 / 1024.0;

/// Finite-difference step along the arc and the radius (meters)
const POLISH_STEP_M: f64 = 1e-2;

/// Converts a planar direction (counter-clockwise from east) to a compass
/// azimuth (clockwise from north)
pub fn angle_to_azimuth(angle: f64) -> f64 {
    normalize_azimuth(FRAC_PI_2 - angle)
}

/// Converts a compass azimuth to a planar direction; the mapping is its own
/// inverse
pub fn azimuth_to_angle(azimuth: f64) -> f64 {
    normalize_azimuth(FRAC_PI_2 - azimuth)
}

/// A candidate origin at direction `angle` and `distance` from a reference event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreePointSolution {
    location: Point,
    timestamp: NanosecondTimestamp,
    angle: f64,
    distance: f64,
}

impl ThreePointSolution {
    /// Places the candidate and dates it back by the propagation delay to
    /// the reference station
    pub fn new(
        reference: &dyn Event,
        angle: f64,
        distance: f64,
        velocity: &SignalVelocity,
    ) -> LocatorResult<Self> {
        let location = reference.location().destination(angle_to_azimuth(angle), distance);
        let offset_ns = -velocity.get_distance_time(distance).round() as i64;
        let timestamp = reference
            .timestamp()
            .checked_add_ns(offset_ns)
            .ok_or(LocatorError::TimestampOutOfRange { offset_ns })?;

        Ok(Self { location, timestamp, angle, distance })
    }

    pub fn get_location(&self) -> &Point {
        &self.location
    }

    pub fn get_timestamp(&self) -> &NanosecondTimestamp {
        &self.timestamp
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Distance from the reference station in meters
    pub fn distance(&self) -> f64 {
        self.distance
    }
}

impl Event for ThreePointSolution {
    fn location(&self) -> &Point {
        &self.location
    }

    fn timestamp(&self) -> &NanosecondTimestamp {
        &self.timestamp
    }
}

/// Limits below which a station triple counts as degenerate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryLimits {
    /// Stations closer than this are the same place (meters)
    pub coincident_distance_m: f64,
    /// Stations whose directions from the reference differ by an angle with
    /// a smaller sine lie on one geodesic
    pub collinear_sine: f64,
}

impl Default for GeometryLimits {
    fn default() -> Self {
        Self {
            coincident_distance_m: 1.0,
            collinear_sine: 1e-6,
        }
    }
}

/// Path-length geometry of one station relative to the reference
#[derive(Debug, Clone, Copy)]
struct Baseline {
    location: Point,
    /// Geodesic distance from the reference (meters)
    length: f64,
    /// Planar direction from the reference
    angle: f64,
    /// Extra path length from the arrival-time difference (meters)
    path_difference: f64,
}

impl Baseline {
    fn squared_difference(&self) -> f64 {
        self.length * self.length - self.path_difference * self.path_difference
    }

    /// Distance of the origin from the reference along direction `angle`
    fn origin_distance(&self, angle: f64) -> f64 {
        let denominator = self.path_difference + self.length * (angle - self.angle).cos();
        if denominator <= 0.0 {
            return f64::NAN;
        }
        self.squared_difference() / (2.0 * denominator)
    }
}

/// `P·cos θ + Q·sin θ = S` for the two baselines of a triple
#[derive(Debug, Clone, Copy)]
struct AngleEquation {
    p: f64,
    q: f64,
    s: f64,
}

impl AngleEquation {
    fn new(first: &Baseline, second: &Baseline) -> Self {
        let k1 = first.squared_difference();
        let k2 = second.squared_difference();
        Self {
            p: k2 * first.length * first.angle.cos() - k1 * second.length * second.angle.cos(),
            q: k2 * first.length * first.angle.sin() - k1 * second.length * second.angle.sin(),
            s: k1 * second.path_difference - k2 * first.path_difference,
        }
    }

    fn norm_squared(&self) -> f64 {
        self.p * self.p + self.q * self.q
    }

    /// `(P² + Q² - S²) / (P² + Q²)`: negative without a root, zero at a
    /// tangent
    fn discriminant(&self) -> f64 {
        let norm_squared = self.norm_squared();
        (norm_squared - self.s * self.s) / norm_squared
    }
}

/// A root after polishing on the ellipsoid
#[derive(Debug, Clone, Copy)]
struct SettledRoot {
    angle: f64,
    distance: f64,
    /// Largest remaining path-length mismatch (meters)
    mismatch: f64,
}

impl SettledRoot {
    fn is_grazing(&self) -> bool {
        self.mismatch >= POLISH_TOLERANCE_M
    }
}

/// Solves the arrival times of exactly three stations for 0, 1 or 2 origins
#[derive(Debug, Clone)]
pub struct ThreePointSolver {
    solutions: Vec<ThreePointSolution>,
}

impl ThreePointSolver {
    /// Solves with the default degeneracy limits
    pub fn new(events: &[DetectionEvent], velocity: &SignalVelocity) -> LocatorResult<Self> {
        Self::with_limits(events, velocity, &GeometryLimits::default())
    }

    /// Solves `events`, using the first one as reference.
    ///
    /// Fails for any count other than three and for coincident or collinear
    /// stations. Timing that no origin can explain is not an error; it yields
    /// an empty solution list.
    pub fn with_limits(
        events: &[DetectionEvent],
        velocity: &SignalVelocity,
        limits: &GeometryLimits,
    ) -> LocatorResult<Self> {
        let [reference, first, second] = match events {
            [a, b, c] => [a, b, c],
            _ if events.len() < 3 => {
                return Err(LocatorError::InvalidInputGeometry {
                    issue: GeometryIssue::TooFewEvents { available: events.len(), required: 3 },
                })
            }
            _ => {
                return Err(LocatorError::InvalidInputGeometry {
                    issue: GeometryIssue::TooManyEvents { available: events.len(), allowed: 3 },
                })
            }
        };

        let first = Self::baseline(reference, first, velocity);
        let second = Self::baseline(reference, second, velocity);
        Self::check_geometry(&first, &second, limits)?;

        let mut roots = Vec::with_capacity(2);
        for angle in Self::candidate_angles(&first, &second) {
            let distance = first.origin_distance(angle);
            if distance.is_nan() || distance <= 0.0 {
                trace!(angle, distance, "root on the wrong hyperbola branch");
                continue;
            }
            match Self::polish(reference.location(), &first, &second, angle, distance) {
                Some(root) => roots.push(root),
                None => warn!(angle, distance, "dropping root that does not settle on the ellipsoid"),
            }
        }
        Self::merge_grazing(reference.location(), &mut roots);

        let solutions = roots
            .iter()
            .map(|root| ThreePointSolution::new(reference, root.angle, root.distance, velocity))
            .collect::<LocatorResult<Vec<_>>>()?;
        debug!(count = solutions.len(), "three point solutions");
        Ok(Self { solutions })
    }

    pub fn get_solutions(&self) -> &[ThreePointSolution] {
        &self.solutions
    }

    pub fn into_solutions(self) -> Vec<ThreePointSolution> {
        self.solutions
    }

    fn baseline(reference: &DetectionEvent, station: &DetectionEvent, velocity: &SignalVelocity) -> Baseline {
        let (length, azimuth) = reference.location().geodesic_relation_to(station.location());
        let path_difference = velocity.get_time_distance(reference.ns_difference_to(station) as f64);
        Baseline {
            location: *station.location(),
            length,
            angle: azimuth_to_angle(azimuth),
            path_difference,
        }
    }

    fn check_geometry(first: &Baseline, second: &Baseline, limits: &GeometryLimits) -> LocatorResult<()> {
        let between = first.location.distance_to(&second.location);
        let closest = first.length.min(second.length).min(between);
        if closest < limits.coincident_distance_m {
            return Err(LocatorError::InvalidInputGeometry {
                issue: GeometryIssue::CoincidentStations { distance_m: closest },
            });
        }

        let sine = (second.angle - first.angle).sin();
        if sine.abs() < limits.collinear_sine {
            return Err(LocatorError::InvalidInputGeometry {
                issue: GeometryIssue::CollinearStations { sine },
            });
        }
        Ok(())
    }

    /// Directions solving `P·cos θ + Q·sin θ = S`, positive branch first
    fn candidate_angles(first: &Baseline, second: &Baseline) -> Vec<f64> {
        // a path difference at least as long as the baseline has no origin
        if first.path_difference.abs() >= first.length || second.path_difference.abs() >= second.length {
            debug!(
                first = first.path_difference,
                second = second.path_difference,
                "arrival time difference exceeds baseline"
            );
            return Vec::new();
        }

        let equation = AngleEquation::new(first, second);
        if equation.norm_squared() == 0.0 {
            return Vec::new();
        }
        let discriminant = equation.discriminant();
        debug!(discriminant, "three point discriminant");

        let phase = equation.q.atan2(equation.p);
        if discriminant.abs() <= TANGENT_DISCRIMINANT {
            vec![phase]
        } else if discriminant < 0.0 {
            Vec::new()
        } else {
            let spread = (equation.s / equation.norm_squared().sqrt()).clamp(-1.0, 1.0).acos();
            vec![phase + spread, phase - spread]
        }
    }

    /// Keeps one of two grazing roots that settled next to each other
    fn merge_grazing(reference: &Point, roots: &mut Vec<SettledRoot>) {
        if let [a, b] = roots.as_slice() {
            if !(a.is_grazing() || b.is_grazing()) {
                return;
            }
            let place = |root: &SettledRoot| reference.destination(angle_to_azimuth(root.angle), root.distance);
            let separation = place(a).distance_to(&place(b));
            if separation < GRAZING_SEPARATION_M {
                debug!(separation, "grazing roots merged");
                let keep = if b.mismatch < a.mismatch { *b } else { *a };
                *roots = vec![keep];
            }
        }
    }

    /// Damped Newton iterations on the true path-length differences.
    ///
    /// Only steps that shrink the mismatch are taken. The root is kept if the
    /// final mismatch stays below `GRAZING_TOLERANCE_M`.
    fn polish(
        reference: &Point,
        first: &Baseline,
        second: &Baseline,
        angle: f64,
        distance: f64,
    ) -> Option<SettledRoot> {
        let mismatch = |angle: f64, distance: f64| {
            let origin = reference.destination(angle_to_azimuth(angle), distance);
            Vector2::new(
                origin.distance_to(&first.location) - distance - first.path_difference,
                origin.distance_to(&second.location) - distance - second.path_difference,
            )
        };
        let worst = |mismatch: &Vector2<f64>| {
            if mismatch.iter().all(|value| value.is_finite()) {
                mismatch.amax()
            } else {
                f64::INFINITY
            }
        };

        let (mut angle, mut distance) = (angle, distance);
        let mut current = mismatch(angle, distance);
        if worst(&current).is_infinite() {
            return None;
        }

        for _ in 0..MAX_POLISH_ITERATIONS {
            let angle_step = POLISH_STEP_M / distance.max(1.0);
            let by_angle = (mismatch(angle + angle_step, distance) - current) / angle_step;
            let by_distance = (mismatch(angle, distance + POLISH_STEP_M) - current) / POLISH_STEP_M;
            let jacobian = Matrix2::from_columns(&[by_angle, by_distance]);
            let Some(inverse) = jacobian.try_inverse() else {
                break;
            };
            let step = inverse * current;

            let mut fraction = 1.0;
            let mut accepted = None;
            while fraction >= MIN_STEP_FRACTION {
                let (next_angle, next_distance) = (angle - fraction * step[0], distance - fraction * step[1]);
                if next_angle.is_finite() && next_distance.is_finite() && next_distance > 0.0 {
                    let next = mismatch(next_angle, next_distance);
                    if worst(&next) < worst(&current) {
                        accepted = Some((next_angle, next_distance, next));
                        break;
                    }
                }
                fraction *= 0.5;
            }
            let Some((next_angle, next_distance, next)) = accepted else {
                break;
            };

            let settled = (fraction * step[1]).abs() < 1e-6 && (fraction * step[0] * next_distance).abs() < 1e-6;
            angle = next_angle;
            distance = next_distance;
            current = next;
            if settled {
                break;
            }
        }

        let root = SettledRoot { angle, distance, mismatch: worst(&current) };
        if root.is_grazing() {
            trace!(angle, distance, mismatch = root.mismatch, "grazing root");
        }
        (root.mismatch < GRAZING_TOLERANCE_M).then_some(root)
    }
}
