//! Points on the WGS84 ellipsoid and the geodesic problems between them
//!
//! Distances and azimuths are solved on the ellipsoid with Vincenty's
//! iterative formulae, which are accurate to well below a millimetre for the
//! baselines of a lightning detection network. Azimuths follow the compass
//! convention: 0 is north, clockwise positive, in radians within (-π, π].

use std::f64::consts::{PI, TAU};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    WGS84_ECCENTRICITY_SQUARED, WGS84_FLATTENING, WGS84_SEMI_MAJOR_AXIS, WGS84_SEMI_MINOR_AXIS,
};

/// Iteration limit for the Vincenty loops
const MAX_GEODESIC_ITERATIONS: usize = 200;

/// Convergence limit on the auxiliary sphere (radians, about 0.06 mm)
const GEODESIC_TOLERANCE: f64 = 1e-12;

/// Longitude/latitude pair in degrees (SRID 4326)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Longitude in degrees
    pub x: f64,
    /// Latitude in degrees
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Geodesic distance in meters
    pub fn distance_to(&self, other: &Point) -> f64 {
        self.geodesic_relation_to(other).0
    }

    /// Forward azimuth towards `other` in radians
    pub fn azimuth_to(&self, other: &Point) -> f64 {
        self.geodesic_relation_to(other).1
    }

    /// Solves the inverse geodesic problem, returning `(distance_m, azimuth_rad)`.
    ///
    /// Coincident points yield `(0.0, 0.0)`. For nearly antipodal points the
    /// iteration may not settle; the last iterate is used in that case.
    pub fn geodesic_relation_to(&self, other: &Point) -> (f64, f64) {
        if self.x == other.x && self.y == other.y {
            return (0.0, 0.0);
        }

        let f = WGS84_FLATTENING;
        let l = (other.x - self.x).to_radians();
        let u1 = ((1.0 - f) * self.y.to_radians().tan()).atan();
        let u2 = ((1.0 - f) * other.y.to_radians().tan()).atan();
        let (sin_u1, cos_u1) = u1.sin_cos();
        let (sin_u2, cos_u2) = u2.sin_cos();

        let mut lambda = l;
        let mut sin_sigma = 0.0;
        let mut cos_sigma = 1.0;
        let mut sigma = 0.0;
        let mut cos_sq_alpha = 1.0;
        let mut cos_2sigma_m = 0.0;
        let mut sin_lambda = 0.0;
        let mut cos_lambda = 1.0;

        for _ in 0..MAX_GEODESIC_ITERATIONS {
            (sin_lambda, cos_lambda) = lambda.sin_cos();
            let a = cos_u2 * sin_lambda;
            let b = cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda;
            sin_sigma = (a * a + b * b).sqrt();
            if sin_sigma == 0.0 {
                return (0.0, 0.0);
            }
            cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
            sigma = sin_sigma.atan2(cos_sigma);
            let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
            cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
            // equatorial line
            cos_2sigma_m = if cos_sq_alpha != 0.0 {
                cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
            } else {
                0.0
            };
            let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
            let previous = lambda;
            lambda = l
                + (1.0 - c)
                    * f
                    * sin_alpha
                    * (sigma
                        + c * sin_sigma
                            * (cos_2sigma_m
                                + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));
            if (lambda - previous).abs() < GEODESIC_TOLERANCE {
                break;
            }
        }

        let (big_a, big_b) = series_coefficients(cos_sq_alpha);
        let delta_sigma = delta_sigma(big_b, sin_sigma, cos_sigma, cos_2sigma_m);
        let distance = WGS84_SEMI_MINOR_AXIS * big_a * (sigma - delta_sigma);

        let azimuth = (cos_u2 * sin_lambda).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);

        (distance, normalize_azimuth(azimuth))
    }

    /// Solves the direct geodesic problem: the point `distance` meters away
    /// along the compass `azimuth` (radians).
    pub fn destination(&self, azimuth: f64, distance: f64) -> Point {
        let f = WGS84_FLATTENING;
        let (sin_alpha1, cos_alpha1) = azimuth.sin_cos();
        let tan_u1 = (1.0 - f) * self.y.to_radians().tan();
        let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
        let sin_u1 = tan_u1 * cos_u1;

        let sigma1 = tan_u1.atan2(cos_alpha1);
        let sin_alpha = cos_u1 * sin_alpha1;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        let (big_a, big_b) = series_coefficients(cos_sq_alpha);

        let first_sigma = distance / (WGS84_SEMI_MINOR_AXIS * big_a);
        let mut sigma = first_sigma;
        for _ in 0..MAX_GEODESIC_ITERATIONS {
            let (sin_sigma, cos_sigma) = sigma.sin_cos();
            let cos_2sigma_m = (2.0 * sigma1 + sigma).cos();
            let next = first_sigma + delta_sigma(big_b, sin_sigma, cos_sigma, cos_2sigma_m);
            let settled = (next - sigma).abs() < GEODESIC_TOLERANCE;
            sigma = next;
            if settled {
                break;
            }
        }
        let (sin_sigma, cos_sigma) = sigma.sin_cos();
        let cos_2sigma_m = (2.0 * sigma1 + sigma).cos();

        let tmp = sin_u1 * sin_sigma - cos_u1 * cos_sigma * cos_alpha1;
        let latitude = (sin_u1 * cos_sigma + cos_u1 * sin_sigma * cos_alpha1)
            .atan2((1.0 - f) * sin_alpha.hypot(tmp));
        let lambda =
            (sin_sigma * sin_alpha1).atan2(cos_u1 * cos_sigma - sin_u1 * sin_sigma * cos_alpha1);
        let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
        let l = lambda
            - (1.0 - c)
                * f
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        Point::new(normalize_longitude(self.x + l.to_degrees()), latitude.to_degrees())
    }

    /// Whether the coordinates lie in the valid WGS84 range
    pub fn is_valid_wgs84(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && (-180.0..=180.0).contains(&self.x)
            && self.y > -90.0
            && self.y < 90.0
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.x, self.y)
    }
}

/// Meridional and prime vertical radii of curvature at `latitude` (degrees)
pub fn radii_of_curvature(latitude: f64) -> (f64, f64) {
    let sin_lat = latitude.to_radians().sin();
    let w = (1.0 - WGS84_ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt();
    let meridional = WGS84_SEMI_MAJOR_AXIS * (1.0 - WGS84_ECCENTRICITY_SQUARED) / (w * w * w);
    let prime_vertical = WGS84_SEMI_MAJOR_AXIS / w;
    (meridional, prime_vertical)
}

/// Wraps an angle into (-π, π]
pub fn normalize_azimuth(angle: f64) -> f64 {
    let mut wrapped = angle % TAU;
    if wrapped <= -PI {
        wrapped += TAU;
    } else if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

fn normalize_longitude(longitude: f64) -> f64 {
    let mut wrapped = (longitude + 180.0) % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    wrapped - 180.0
}

fn series_coefficients(cos_sq_alpha: f64) -> (f64, f64) {
    let a = WGS84_SEMI_MAJOR_AXIS;
    let b = WGS84_SEMI_MINOR_AXIS;
    let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
    let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    (big_a, big_b)
}

fn delta_sigma(big_b: f64, sin_sigma: f64, cos_sigma: f64, cos_2sigma_m: f64) -> f64 {
    big_b
        * sin_sigma
        * (cos_2sigma_m
            + big_b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                    - big_b / 6.0
                        * cos_2sigma_m
                        * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                        * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)))
}
