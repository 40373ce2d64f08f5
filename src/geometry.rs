// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Vector and great-circle helpers.
//!
//! Positions are carried as a unit vector from the Earth's centre plus a
//! radius in km. Cartesian positions (`unit_vector * radius`) are used for
//! chord lengths and the bending kernels. Latitudes are geocentric.

use serde::{Deserialize, Serialize};

/// Geographic location: geocentric latitude and longitude in degrees, depth
/// below the model surface in km.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Depth in km; negative above the surface.
    pub depth: f64,
}

impl GeoPoint {
    /// New location.
    pub fn new(lat: f64, lon: f64, depth: f64) -> Self {
        GeoPoint { lat, lon, depth }
    }

    /// Unit vector of the location.
    pub fn unit_vector(&self) -> [f64; 3] {
        from_lat_lon(self.lat, self.lon)
    }
}

/// Dot product.
#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product.
#[inline]
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Component-wise sum.
#[inline]
pub fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Component-wise difference `a - b`.
#[inline]
pub fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Scale a vector.
#[inline]
pub fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Euclidean length.
#[inline]
pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Distance between two Cartesian points.
#[inline]
pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    norm(sub(a, b))
}

/// Normalize to unit length. The zero vector is returned unchanged.
#[inline]
pub fn normalize(a: [f64; 3]) -> [f64; 3] {
    let n = norm(a);
    if n > 0.0 {
        scale(a, 1.0 / n)
    } else {
        a
    }
}

/// Cartesian position (km) of a point given as unit vector and radius.
#[inline]
pub fn to_cartesian(unit_vector: [f64; 3], radius: f64) -> [f64; 3] {
    scale(unit_vector, radius)
}

/// Split a Cartesian position into unit vector and radius.
#[inline]
pub fn from_cartesian(x: [f64; 3]) -> ([f64; 3], f64) {
    let r = norm(x);
    (normalize(x), r)
}

/// Linear interpolation between two Cartesian points.
#[inline]
pub fn lerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    add(a, scale(sub(b, a), t))
}

/// Angle in radians between two unit vectors, accurate for small and large
/// separations.
pub fn angle(a: [f64; 3], b: [f64; 3]) -> f64 {
    norm(cross(a, b)).atan2(dot(a, b))
}

/// Spherical linear interpolation along the great circle from `a` to `b`.
/// `t = 0` returns `a`, `t = 1` returns `b`.
pub fn slerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    let omega = angle(a, b);
    if omega.abs() < 1e-12 {
        return normalize(lerp(a, b, t));
    }
    let sin_omega = omega.sin();
    let fa = ((1.0 - t) * omega).sin() / sin_omega;
    let fb = (t * omega).sin() / sin_omega;
    normalize(add(scale(a, fa), scale(b, fb)))
}

/// Rotate `v` about the unit `axis` by `theta` radians (Rodrigues).
pub fn rotate(v: [f64; 3], axis: [f64; 3], theta: f64) -> [f64; 3] {
    let (s, c) = theta.sin_cos();
    let kxv = cross(axis, v);
    let kdv = dot(axis, v);
    [
        v[0] * c + kxv[0] * s + axis[0] * kdv * (1.0 - c),
        v[1] * c + kxv[1] * s + axis[1] * kdv * (1.0 - c),
        v[2] * c + kxv[2] * s + axis[2] * kdv * (1.0 - c),
    ]
}

/// Unit vector from geocentric latitude and longitude in degrees.
pub fn from_lat_lon(lat_deg: f64, lon_deg: f64) -> [f64; 3] {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// Geocentric latitude and longitude in degrees of a unit vector.
pub fn lat_lon(u: [f64; 3]) -> (f64, f64) {
    let lat = u[2].clamp(-1.0, 1.0).asin().to_degrees();
    let lon = u[1].atan2(u[0]).to_degrees();
    (lat, lon)
}

/// Local east and north unit vectors at `u`. At the poles east is taken
/// along the y axis.
pub fn east_north(u: [f64; 3]) -> ([f64; 3], [f64; 3]) {
    let z = [0.0, 0.0, 1.0];
    let e = cross(z, u);
    let east = if norm(e) < 1e-12 {
        [0.0, 1.0, 0.0]
    } else {
        normalize(e)
    };
    let north = cross(u, east);
    (east, north)
}

/// Azimuth in degrees, clockwise from north in `[0, 360)`, of the great circle
/// leaving `from` toward `to`.
pub fn azimuth(from: [f64; 3], to: [f64; 3]) -> f64 {
    let (east, north) = east_north(from);
    let az = dot(to, east).atan2(dot(to, north)).to_degrees();
    if az < 0.0 {
        az + 360.0
    } else {
        az
    }
}

/// Unit normal of the great-circle plane through `a` and `b`. Falls back to a
/// vector perpendicular to `a` when the two points coincide or are antipodal.
pub fn great_circle_pole(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    let c = cross(a, b);
    if norm(c) > 1e-12 {
        return normalize(c);
    }
    let (east, _) = east_north(a);
    east
}
