//! Gauss-Newton refinement of a candidate location against all stations
//!
//! The fit state is longitude and latitude in degrees plus a time offset in
//! nanoseconds relative to the candidate's origin time. Every station
//! contributes one residual: its observed delay after the fitted origin time
//! minus the propagation time from the fitted location.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use tracing::{debug, trace};

use crate::algorithms::signal_velocity::SignalVelocity;
use crate::core::geodesy::{radii_of_curvature, Point};
use crate::core::timestamp::NanosecondTimestamp;
use crate::core::types::{DetectionEvent, Event};
use crate::validation::error::{GeometryIssue, LocatorError, LocatorResult};

/// Scaled normal-equation determinant below which a step is refused
pub const DEFAULT_SINGULAR_DETERMINANT: f64 = 1e-12;

/// Components of the fit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitParameter {
    Longitude,
    Latitude,
    TimeOffset,
}

/// Fit state: location in degrees, time offset in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParameters {
    pub longitude: f64,
    pub latitude: f64,
    pub time_offset: f64,
}

impl FitParameters {
    pub fn get(&self, parameter: FitParameter) -> f64 {
        match parameter {
            FitParameter::Longitude => self.longitude,
            FitParameter::Latitude => self.latitude,
            FitParameter::TimeOffset => self.time_offset,
        }
    }

    pub fn location(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }

    fn shifted(&self, delta: &Vector3<f64>) -> Self {
        Self {
            longitude: self.longitude + delta[0],
            latitude: self.latitude + delta[1],
            time_offset: self.time_offset + delta[2],
        }
    }
}

/// Least-squares fit of one strike candidate
#[derive(Debug, Clone)]
pub struct LeastSquareFit<'a> {
    reference_time: NanosecondTimestamp,
    velocity: SignalVelocity,
    events: &'a [DetectionEvent],
    parameters: FitParameters,
    singular_determinant: f64,
}

impl<'a> LeastSquareFit<'a> {
    /// Seeds the fit at `candidate` and measures time from its origin time
    pub fn new(
        candidate: &dyn Event,
        events: &'a [DetectionEvent],
        velocity: SignalVelocity,
    ) -> LocatorResult<Self> {
        if events.len() < 3 {
            return Err(LocatorError::InvalidInputGeometry {
                issue: GeometryIssue::TooFewEvents { available: events.len(), required: 3 },
            });
        }

        let location = candidate.location();
        Ok(Self {
            reference_time: *candidate.timestamp(),
            velocity,
            events,
            parameters: FitParameters {
                longitude: location.x,
                latitude: location.y,
                time_offset: 0.0,
            },
            singular_determinant: DEFAULT_SINGULAR_DETERMINANT,
        })
    }

    pub fn with_singular_determinant(mut self, threshold: f64) -> Self {
        self.singular_determinant = threshold;
        self
    }

    /// Delay of `timestamp` after the fitted origin time, in nanoseconds
    pub fn calculate_time_value(&self, timestamp: &NanosecondTimestamp) -> f64 {
        self.time_value(&self.parameters, timestamp)
    }

    /// Observed minus predicted delay at the station of `event`, in nanoseconds
    pub fn calculate_residual_time(&self, event: &dyn Event) -> f64 {
        self.residual_time(&self.parameters, event)
    }

    /// Sum of squared residual times over all events (ns²)
    pub fn calculate_least_square_sum(&self) -> f64 {
        self.least_square_sum(&self.parameters)
    }

    pub fn least_square_sum(&self, parameters: &FitParameters) -> f64 {
        self.events
            .iter()
            .map(|event| self.residual_time(parameters, event).powi(2))
            .sum()
    }

    /// One Gauss-Newton step from `parameters`, leaving the fit untouched
    pub fn next_parameters(&self, parameters: &FitParameters) -> LocatorResult<FitParameters> {
        let (normal, gradient) = self.normal_equations(parameters);

        let determinant = self.scaled_determinant(&normal);
        if !(determinant.is_finite() && determinant > self.singular_determinant) {
            debug!(determinant, "normal equations are singular");
            return Err(LocatorError::DegenerateFit { determinant });
        }

        let inverse = normal
            .try_inverse()
            .ok_or(LocatorError::DegenerateFit { determinant })?;
        let delta = -(inverse * gradient);
        if delta.iter().any(|value| !value.is_finite()) {
            return Err(LocatorError::DegenerateFit { determinant });
        }

        trace!(
            longitude = delta[0],
            latitude = delta[1],
            time_offset = delta[2],
            "fit step"
        );
        Ok(parameters.shifted(&delta))
    }

    /// Applies one Gauss-Newton step and returns the new least-square sum
    pub fn perform_fit_step(&mut self) -> LocatorResult<f64> {
        self.parameters = self.next_parameters(&self.parameters)?;
        Ok(self.calculate_least_square_sum())
    }

    pub fn get_location(&self) -> Point {
        self.parameters.location()
    }

    pub fn get_parameter(&self, parameter: FitParameter) -> f64 {
        self.parameters.get(parameter)
    }

    pub fn parameters(&self) -> &FitParameters {
        &self.parameters
    }

    /// Replaces the fit state, e.g. to undo a step that made things worse
    pub fn set_parameters(&mut self, parameters: FitParameters) {
        self.parameters = parameters;
    }

    pub fn events(&self) -> &[DetectionEvent] {
        self.events
    }

    /// Fitted origin time
    pub fn origin_timestamp(&self) -> LocatorResult<NanosecondTimestamp> {
        let offset_ns = self.parameters.time_offset.round() as i64;
        self.reference_time
            .checked_add_ns(offset_ns)
            .ok_or(LocatorError::TimestampOutOfRange { offset_ns })
    }

    fn time_value(&self, parameters: &FitParameters, timestamp: &NanosecondTimestamp) -> f64 {
        self.reference_time.ns_difference_to(timestamp) as f64 - parameters.time_offset
    }

    fn residual_time(&self, parameters: &FitParameters, event: &dyn Event) -> f64 {
        let distance = parameters.location().distance_to(event.location());
        self.time_value(parameters, event.timestamp()) - self.velocity.get_distance_time(distance)
    }

    /// Normal matrix `JᵀJ` and gradient `Jᵀr` of the residuals, with the
    /// partial derivatives by longitude, latitude and time offset
    fn normal_equations(&self, parameters: &FitParameters) -> (Matrix3<f64>, Vector3<f64>) {
        let origin = parameters.location();
        let (meridional, prime_vertical) = radii_of_curvature(parameters.latitude);
        let meters_per_degree_north = meridional * PI / 180.0;
        let meters_per_degree_east = prime_vertical * parameters.latitude.to_radians().cos() * PI / 180.0;

        let mut normal = Matrix3::zeros();
        let mut gradient = Vector3::zeros();
        for event in self.events {
            let (distance, azimuth) = origin.geodesic_relation_to(event.location());
            let residual = self.time_value(parameters, event.timestamp())
                - self.velocity.get_distance_time(distance);

            // moving the origin towards the station shortens the path
            let row = Vector3::new(
                self.velocity.get_distance_time(azimuth.sin() * meters_per_degree_east),
                self.velocity.get_distance_time(azimuth.cos() * meters_per_degree_north),
                -1.0,
            );
            normal += row * row.transpose();
            gradient += row * residual;
        }
        (normal, gradient)
    }

    /// Determinant of the normal matrix with unit diagonal, which is
    /// independent of the units of the three parameters
    fn scaled_determinant(&self, normal: &Matrix3<f64>) -> f64 {
        let diagonal = normal.diagonal();
        if diagonal.iter().any(|value| !(value.is_finite() && *value > 0.0)) {
            return 0.0;
        }
        let scale = Matrix3::from_diagonal(&diagonal.map(|value| 1.0 / value.sqrt()));
        (scale * normal * scale).determinant()
    }
}
