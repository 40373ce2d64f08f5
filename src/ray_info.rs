// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{BenderError, Result};
use crate::geometry::{self, GeoPoint};
use crate::model::LayeredModelPosition;
use crate::ray::Ray;

/// Marker for scalars that are unavailable.
pub const NA_VALUE: f64 = -999999.0;

/// Classification of a computed ray.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RayType {
    /// Turns within a layer or travels directly.
    Refraction,
    /// Reflects off an interface.
    Reflection,
    /// Travels along an interface.
    Diffraction,
    /// No admissible geometry exists for the phase.
    Invalid,
    /// Relaxation failed numerically.
    Error,
}

impl RayType {
    /// Name used in the binary format.
    pub fn name(&self) -> &'static str {
        match self {
            RayType::Refraction => "REFRACTION",
            RayType::Reflection => "REFLECTION",
            RayType::Diffraction => "DIFFRACTION",
            RayType::Invalid => "INVALID",
            RayType::Error => "ERROR",
        }
    }

    /// Inverse of [`RayType::name`].
    pub fn from_name(name: &str) -> Option<RayType> {
        match name {
            "REFRACTION" => Some(RayType::Refraction),
            "REFLECTION" => Some(RayType::Reflection),
            "DIFFRACTION" => Some(RayType::Diffraction),
            "INVALID" => Some(RayType::Invalid),
            "ERROR" => Some(RayType::Error),
            _ => None,
        }
    }

    /// Whether the ray carries a travel time.
    pub fn is_valid(&self) -> bool {
        !matches!(self, RayType::Invalid | RayType::Error)
    }
}

impl fmt::Display for RayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional outputs of a [`RayInfo`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RayInfoOptions {
    /// Keep the resampled ray path.
    pub path: bool,
    /// Accumulate model-node weights.
    pub weights: bool,
    /// Compute travel-time derivatives with respect to the source.
    pub derivatives: bool,
}

/// Result of a ray computation.
#[derive(Clone, Debug, PartialEq)]
pub struct RayInfo {
    /// Phase name.
    pub phase: String,
    /// Classification.
    pub ray_type: RayType,
    /// Layer of the deepest point, or -1.
    pub bottom_layer: i32,
    /// Travel time in seconds, rounded to milliseconds.
    pub travel_time: f64,
    /// Epicentral distance in degrees.
    pub distance: f64,
    /// Source-to-receiver azimuth in degrees.
    pub azimuth: f64,
    /// Receiver-to-source azimuth in degrees.
    pub back_azimuth: f64,
    /// Horizontal slowness at the source in s/degree.
    pub slowness: f64,
    /// Depth of the deepest point in km.
    pub turning_depth: f64,
    /// Ray path length in km.
    pub path_length: f64,
    /// Weights of active model nodes, by node index.
    pub weights: BTreeMap<usize, f64>,
    /// Total weight falling on fixed model nodes.
    pub inactive_node_weight: f64,
    /// Named scalar attributes.
    pub attributes: BTreeMap<String, f64>,
    /// Diagnostic message.
    pub status_message: String,
    /// Resampled path, when requested. Not serialized.
    pub ray_path: Option<Vec<GeoPoint>>,
}

/// Equal-interval samples along a ray with their segment and trapezoid weight.
struct PathSample {
    position: [f64; 3],
    segment: usize,
    weight: f64,
}

fn resample_ray(ray: &Ray, spacing: f64) -> Vec<PathSample> {
    let path = ray.path();
    let mut edges = Vec::with_capacity(path.nodes.len());
    for (index, segment) in path.segments.iter().enumerate() {
        if !segment.active {
            continue;
        }
        for i in segment.first..segment.last {
            let (a, b) = (path.nodes[i].position(), path.nodes[i + 1].position());
            let length = geometry::distance(a, b);
            if length > 0.0 {
                edges.push((a, b, length, index));
            }
        }
    }
    let total: f64 = edges.iter().map(|e| e.2).sum();
    if edges.is_empty() {
        return Vec::new();
    }
    let n = (total / spacing).ceil().max(1.0) as usize;
    let step = total / n as f64;

    let mut samples = Vec::with_capacity(n + 1);
    let mut edge = 0;
    let mut walked = 0.0;
    for k in 0..=n {
        let target = k as f64 * step;
        while edge + 1 < edges.len() && walked + edges[edge].2 < target {
            walked += edges[edge].2;
            edge += 1;
        }
        let (a, b, length, segment) = edges[edge];
        let f = ((target - walked) / length).clamp(0.0, 1.0);
        let weight = if k == 0 || k == n { 0.5 * step } else { step };
        samples.push(PathSample {
            position: geometry::lerp(a, b, f),
            segment,
            weight,
        });
    }
    samples
}

impl RayInfo {
    /// Result for a ray without an admissible or converged solution.
    pub fn failed(
        phase: &str,
        ray_type: RayType,
        source: &GeoPoint,
        receiver: &GeoPoint,
        message: String,
    ) -> RayInfo {
        let (us, ur) = (source.unit_vector(), receiver.unit_vector());
        RayInfo {
            phase: phase.to_string(),
            ray_type,
            bottom_layer: -1,
            travel_time: NA_VALUE,
            distance: geometry::angle(us, ur).to_degrees(),
            azimuth: geometry::azimuth(us, ur),
            back_azimuth: geometry::azimuth(ur, us),
            slowness: NA_VALUE,
            turning_depth: NA_VALUE,
            path_length: NA_VALUE,
            weights: BTreeMap::new(),
            inactive_node_weight: 0.0,
            attributes: BTreeMap::new(),
            status_message: message,
            ray_path: None,
        }
    }

    /// Result of a converged ray. The path is resampled at `spacing` km
    /// (shortened so equal intervals span it exactly) when a path or weights
    /// are requested.
    pub fn from_ray<P: LayeredModelPosition>(
        phase: &str,
        ray: &Ray,
        pos: &mut P,
        options: RayInfoOptions,
        spacing: f64,
    ) -> RayInfo {
        let mut attributes = BTreeMap::new();
        let turning_depth = ray.turning_depth(pos);
        let path_length = ray.path_length();
        attributes.insert("TURNING_DEPTH".to_string(), turning_depth);
        attributes.insert("PATH_LENGTH".to_string(), path_length);
        attributes.insert("RELAXATIONS".to_string(), ray.relaxation_iterations() as f64);

        let source = ray.source();
        let mut slowness = NA_VALUE;
        if let Some((direction, s)) = ray.takeoff(pos) {
            let u = source.unit_vector;
            let horizontal = geometry::sub(direction, geometry::scale(u, geometry::dot(direction, u)));
            slowness = s * source.radius * geometry::norm(horizontal) * std::f64::consts::PI / 180.0;
            if options.derivatives {
                // moving the source along the ray shortens it
                let grad = geometry::scale(direction, -s);
                let (east, north) = geometry::east_north(u);
                let (lat, _) = geometry::lat_lon(u);
                let r = source.radius;
                attributes.insert(
                    "DTT_DLAT".to_string(),
                    r * geometry::dot(grad, north),
                );
                attributes.insert(
                    "DTT_DLON".to_string(),
                    r * lat.to_radians().cos() * geometry::dot(grad, east),
                );
                attributes.insert("DTT_DR".to_string(), geometry::dot(grad, u));
            }
        }

        let mut weights = BTreeMap::new();
        let mut inactive_node_weight = 0.0;
        let mut ray_path = None;
        if options.path || options.weights {
            let samples = resample_ray(ray, spacing);
            let path = ray.path();
            if options.weights {
                let mut active = 0.0;
                for sample in &samples {
                    let (u, r) = geometry::from_cartesian(sample.position);
                    pos.set_in_layer(u, r, path.segments[sample.segment].layer);
                    for (node, c) in pos.coefficients() {
                        let w = sample.weight * c;
                        if pos.is_active_node(node) {
                            *weights.entry(node).or_insert(0.0) += w;
                            active += w;
                        } else {
                            inactive_node_weight += w;
                        }
                    }
                }
                let total = active + inactive_node_weight;
                attributes.insert(
                    "ACTIVE_FRACTION".to_string(),
                    if total > 0.0 { active / total } else { NA_VALUE },
                );
            }
            if options.path {
                ray_path = Some(
                    samples
                        .iter()
                        .map(|sample| {
                            let (u, r) = geometry::from_cartesian(sample.position);
                            pos.set(u, r);
                            let (lat, lon) = geometry::lat_lon(u);
                            GeoPoint::new(lat, lon, pos.depth())
                        })
                        .collect(),
                );
            }
        }

        RayInfo {
            phase: phase.to_string(),
            ray_type: ray.ray_type(),
            bottom_layer: ray.bottom_layer() as i32,
            travel_time: (ray.travel_time() * 1000.0).round() / 1000.0,
            distance: ray.distance_degrees(),
            azimuth: ray.azimuth(),
            back_azimuth: ray.back_azimuth(),
            slowness,
            turning_depth,
            path_length,
            weights,
            inactive_node_weight,
            attributes,
            status_message: ray.status_log().message(),
            ray_path,
        }
    }

    /// Named attribute, or [`NA_VALUE`].
    pub fn attribute(&self, name: &str) -> f64 {
        self.attributes.get(name).copied().unwrap_or(NA_VALUE)
    }

    /// Release the resampled path.
    pub fn nullify_ray_path(&mut self) {
        self.ray_path = None;
    }

    /// Release the per-node weights. The inactive weight and
    /// `ACTIVE_FRACTION` are kept.
    pub fn nullify_active_node_weights(&mut self) {
        self.weights.clear();
    }

    /// Write the record in the fixed big-endian layout.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_i32::<BigEndian>(self.bottom_layer)?;
        write_string(w, self.ray_type.name())?;
        write_string(w, &self.phase)?;
        for value in [
            self.travel_time,
            self.distance,
            self.azimuth,
            self.back_azimuth,
            self.slowness,
            self.turning_depth,
            self.path_length,
        ] {
            w.write_f64::<BigEndian>(value)?;
        }
        w.write_i32::<BigEndian>(count(self.weights.len())?)?;
        for (&index, &weight) in &self.weights {
            w.write_i32::<BigEndian>(count(index)?)?;
            w.write_f64::<BigEndian>(weight)?;
        }
        w.write_f64::<BigEndian>(self.inactive_node_weight)?;
        w.write_i32::<BigEndian>(count(self.attributes.len())?)?;
        for (name, &value) in &self.attributes {
            write_string(w, name)?;
            w.write_f64::<BigEndian>(value)?;
        }
        write_string(w, &self.status_message)?;
        Ok(())
    }

    /// Read a record written by [`RayInfo::write_to`].
    pub fn read_from<R: Read>(r: &mut R) -> Result<RayInfo> {
        let bottom_layer = r.read_i32::<BigEndian>()?;
        let type_name = read_string(r)?;
        let ray_type = RayType::from_name(&type_name)
            .ok_or_else(|| BenderError::Format(format!("unknown ray type '{}'", type_name)))?;
        let phase = read_string(r)?;
        let mut scalars = [0.0; 7];
        for value in scalars.iter_mut() {
            *value = r.read_f64::<BigEndian>()?;
        }
        let [travel_time, distance, azimuth, back_azimuth, slowness, turning_depth, path_length] =
            scalars;

        let n = read_count(r)?;
        let mut weights = BTreeMap::new();
        for _ in 0..n {
            let index = read_count(r)?;
            let weight = r.read_f64::<BigEndian>()?;
            weights.insert(index, weight);
        }
        let inactive_node_weight = r.read_f64::<BigEndian>()?;
        let m = read_count(r)?;
        let mut attributes = BTreeMap::new();
        for _ in 0..m {
            let name = read_string(r)?;
            let value = r.read_f64::<BigEndian>()?;
            attributes.insert(name, value);
        }
        let status_message = read_string(r)?;

        Ok(RayInfo {
            phase,
            ray_type,
            bottom_layer,
            travel_time,
            distance,
            azimuth,
            back_azimuth,
            slowness,
            turning_depth,
            path_length,
            weights,
            inactive_node_weight,
            attributes,
            status_message,
            ray_path: None,
        })
    }
}

fn count(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| BenderError::Format(format!("{} does not fit in an i32", n)))
}

fn read_count<R: Read>(r: &mut R) -> Result<usize> {
    let n = r.read_i32::<BigEndian>()?;
    usize::try_from(n).map_err(|_| BenderError::Format(format!("negative count {}", n)))
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_i32::<BigEndian>(count(s.len())?)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = read_count(r)?;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| BenderError::Format(format!("invalid UTF-8: {}", e)))
}
