// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BenderError, Result};
use crate::geometry;

/// Point query interface into a layered Earth model.
///
/// This is the only channel through which the ray-bending engine reads the
/// model. Implementations cache lateral interpolation state and are therefore
/// not shared between threads; clone one per worker.
pub trait LayeredModelPosition {
    /// Move to a position; the layer is the lowest layer whose top lies at or
    /// above `radius`.
    fn set(&mut self, unit_vector: [f64; 3], radius: f64);

    /// Move to a position and force the layer used for attribute lookups.
    /// Values are evaluated from that layer's profile even if `radius` lies
    /// slightly outside it.
    fn set_in_layer(&mut self, unit_vector: [f64; 3], radius: f64, layer: usize);

    /// Current unit vector.
    fn unit_vector(&self) -> [f64; 3];

    /// Current radius in km.
    fn radius(&self) -> f64;

    /// Index of the current layer (0 is the innermost layer).
    fn layer_index(&self) -> usize;

    /// Number of layers in the model.
    fn n_layers(&self) -> usize;

    /// Radius of the top of `layer` at the current lateral position.
    fn layer_radius_top(&self, layer: usize) -> f64;

    /// Interpolated attribute value at the current position and layer.
    fn value(&self, attribute: usize) -> f64;

    /// Model node indices and interpolation weights contributing to
    /// [`LayeredModelPosition::value`] at the current position.
    fn coefficients(&self) -> Vec<(usize, f64)>;

    /// Whether a model node (as indexed by [`LayeredModelPosition::coefficients`])
    /// is free in tomography. Nodes of inactive layers are fixed.
    fn is_active_node(&self, _node: usize) -> bool {
        true
    }

    /// Radius of the top of the current layer.
    fn radius_top(&self) -> f64 {
        self.layer_radius_top(self.layer_index())
    }

    /// Radius of the bottom of the current layer.
    fn radius_bottom(&self) -> f64 {
        self.layer_radius_bottom(self.layer_index())
    }

    /// Radius of the bottom of `layer` at the current lateral position.
    fn layer_radius_bottom(&self, layer: usize) -> f64 {
        if layer == 0 {
            0.0
        } else {
            self.layer_radius_top(layer - 1)
        }
    }

    /// Radius of the model surface at the current lateral position.
    fn surface_radius(&self) -> f64 {
        self.layer_radius_top(self.n_layers() - 1)
    }

    /// Depth below the model surface in km.
    fn depth(&self) -> f64 {
        self.surface_radius() - self.radius()
    }

    /// Cartesian gradient of an attribute (per km) by central differences,
    /// evaluated inside the current layer. The position is restored afterwards.
    fn gradient(&mut self, attribute: usize) -> [f64; 3] {
        const H: f64 = 0.5;
        let u = self.unit_vector();
        let r = self.radius();
        let layer = self.layer_index();
        let x = geometry::to_cartesian(u, r);
        let mut g = [0.0; 3];
        for (axis, gi) in g.iter_mut().enumerate() {
            let mut xp = x;
            let mut xm = x;
            xp[axis] += H;
            xm[axis] -= H;
            let (up, rp) = geometry::from_cartesian(xp);
            self.set_in_layer(up, rp, layer);
            let vp = self.value(attribute);
            let (um, rm) = geometry::from_cartesian(xm);
            self.set_in_layer(um, rm, layer);
            let vm = self.value(attribute);
            *gi = (vp - vm) / (2.0 * H);
        }
        self.set_in_layer(u, r, layer);
        g
    }
}

/// Radial profile of one layer beneath one vertex.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerProfile {
    /// Node radii in km, ascending. A single radius marks a pinched-out layer.
    pub radii: Vec<f64>,
    /// Attribute values per node: `values[node][attribute]`.
    pub values: Vec<Vec<f64>>,
}

/// A grid vertex and its stack of layer profiles (innermost first).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelVertex {
    /// Geocentric latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// One profile per layer.
    pub layers: Vec<LayerProfile>,
}

/// Serializable description of a layered model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDescription {
    /// Model name.
    pub name: String,
    /// Layer names, innermost first. Each layer is named after the interface
    /// at its top (e.g. `CMB` is the outer core).
    pub layers: Vec<String>,
    /// Attribute names, e.g. `PSLOWNESS`, `SSLOWNESS`.
    pub attributes: Vec<String>,
    /// Layers whose nodes are fixed (not part of a tomographic inversion).
    #[serde(default)]
    pub inactive_layers: Vec<String>,
    /// Grid vertices.
    pub vertices: Vec<ModelVertex>,
}

/// Velocity description of one layer of a radially symmetric model.
#[derive(Clone, Debug)]
pub struct RadialLayer {
    /// Interface name at the top of the layer.
    pub name: String,
    /// Radius of the top of the layer in km.
    pub top_radius: f64,
    /// P velocity (km/s) at the bottom and top of the layer.
    pub vp: (f64, f64),
    /// S velocity (km/s) at the bottom and top of the layer.
    pub vs: (f64, f64),
}

impl RadialLayer {
    /// Layer with velocities varying linearly in slowness from bottom to top.
    pub fn new(name: &str, top_radius: f64, vp: (f64, f64), vs: (f64, f64)) -> Self {
        RadialLayer {
            name: name.to_string(),
            top_radius,
            vp,
            vs,
        }
    }
}

/// A radially layered, laterally heterogeneous Earth model: a set of grid
/// vertices, each carrying one radial profile per layer.
#[derive(Debug)]
pub struct LayeredModel {
    description: ModelDescription,
    unit_vectors: Vec<[f64; 3]>,
    node_offsets: Vec<Vec<usize>>,
    node_layers: Vec<usize>,
    active_layers: Vec<bool>,
}

impl LayeredModel {
    /// Validate a description and build the model.
    ///
    /// # Errors
    /// Returns [`BenderError::InvalidModel`] if the layer stack is empty or
    /// inconsistent between vertices, a profile is not ascending, layers are
    /// not contiguous, or an attribute value is not positive and finite.
    pub fn new(description: ModelDescription) -> Result<Self> {
        let n_layers = description.layers.len();
        let n_attributes = description.attributes.len();
        if n_layers == 0 {
            return Err(BenderError::InvalidModel("model has no layers".into()));
        }
        if n_attributes == 0 {
            return Err(BenderError::InvalidModel("model has no attributes".into()));
        }
        if description.vertices.is_empty() {
            return Err(BenderError::InvalidModel("model has no vertices".into()));
        }

        let mut unit_vectors = Vec::with_capacity(description.vertices.len());
        let mut node_offsets = Vec::with_capacity(description.vertices.len());
        let mut node_layers = Vec::new();

        for (iv, vertex) in description.vertices.iter().enumerate() {
            if vertex.layers.len() != n_layers {
                return Err(BenderError::InvalidModel(format!(
                    "vertex {} has {} layer profiles, expected {}",
                    iv,
                    vertex.layers.len(),
                    n_layers
                )));
            }
            let mut offsets = Vec::with_capacity(n_layers);
            let mut previous_top = 0.0;
            for (layer, profile) in vertex.layers.iter().enumerate() {
                validate_profile(iv, layer, profile, n_attributes)?;
                let bottom = profile.radii[0];
                if layer == 0 {
                    if bottom < 0.0 {
                        return Err(BenderError::InvalidModel(format!(
                            "vertex {} layer 0 starts at negative radius {}",
                            iv, bottom
                        )));
                    }
                } else if (bottom - previous_top).abs() > 1e-6 {
                    return Err(BenderError::InvalidModel(format!(
                        "vertex {} layer {} bottom {} does not meet the top {} of layer {}",
                        iv,
                        layer,
                        bottom,
                        previous_top,
                        layer - 1
                    )));
                }
                previous_top = profile.radii[profile.radii.len() - 1];
                offsets.push(node_layers.len());
                node_layers.extend(std::iter::repeat(layer).take(profile.radii.len()));
            }
            node_offsets.push(offsets);
            unit_vectors.push(geometry::from_lat_lon(vertex.lat, vertex.lon));
        }

        let mut active_layers = vec![true; n_layers];
        let mut unknown = Vec::new();
        for name in &description.inactive_layers {
            match description.layers.iter().position(|l| l == name) {
                Some(i) => active_layers[i] = false,
                None => unknown.push(name.clone()),
            }
        }
        if !unknown.is_empty() {
            return Err(BenderError::UnknownInterface { names: unknown });
        }

        Ok(LayeredModel {
            description,
            unit_vectors,
            node_offsets,
            node_layers,
            active_layers,
        })
    }

    /// Radially symmetric model with a single vertex. Layers are given
    /// innermost first; slowness varies linearly between the layer's bottom and
    /// top.
    ///
    /// # Errors
    /// Returns an error if the top radii are not strictly ascending or a
    /// velocity is not positive.
    pub fn radial(name: &str, layers: &[RadialLayer]) -> Result<Self> {
        let mut profiles = Vec::with_capacity(layers.len());
        let mut bottom = 0.0;
        for layer in layers {
            let slowness = |v: f64| if v > 0.0 { 1.0 / v } else { f64::NAN };
            let mut radii = vec![bottom, layer.top_radius];
            let mut values = vec![
                vec![slowness(layer.vp.0), slowness(layer.vs.0)],
                vec![slowness(layer.vp.1), slowness(layer.vs.1)],
            ];
            if (layer.top_radius - bottom).abs() < 1e-9 {
                radii.truncate(1);
                values.truncate(1);
            }
            profiles.push(LayerProfile { radii, values });
            bottom = layer.top_radius;
        }
        LayeredModel::new(ModelDescription {
            name: name.to_string(),
            layers: layers.iter().map(|l| l.name.clone()).collect(),
            attributes: vec!["PSLOWNESS".to_string(), "SSLOWNESS".to_string()],
            inactive_layers: Vec::new(),
            vertices: vec![ModelVertex {
                lat: 90.0,
                lon: 0.0,
                layers: profiles,
            }],
        })
    }

    /// Radially symmetric model with constant velocities in every layer.
    /// `interfaces` lists `(name, top radius)` innermost first.
    pub fn homogeneous(interfaces: &[(&str, f64)], vp: f64, vs: f64) -> Result<Self> {
        let layers: Vec<RadialLayer> = interfaces
            .iter()
            .map(|&(name, top)| RadialLayer::new(name, top, (vp, vp), (vs, vs)))
            .collect();
        LayeredModel::radial("homogeneous", &layers)
    }

    /// Coarse six-layer reference Earth (ak135-like velocities).
    pub fn reference_earth() -> Result<Self> {
        LayeredModel::radial(
            "reference_earth",
            &[
                RadialLayer::new("ICB", 1217.5, (11.26, 11.04), (3.67, 3.50)),
                // No shear waves in the outer core; P values stand in.
                RadialLayer::new("CMB", 3479.5, (10.29, 8.00), (10.29, 8.00)),
                RadialLayer::new("M660", 5711.0, (13.66, 10.79), (7.28, 5.96)),
                RadialLayer::new("M410", 5961.0, (10.20, 9.03), (5.61, 4.87)),
                RadialLayer::new("MOHO", 6336.0, (8.93, 8.04), (4.77, 4.48)),
                RadialLayer::new("SURFACE", 6371.0, (6.50, 5.80), (3.75, 3.46)),
            ],
        )
    }

    /// A query position bound to this model.
    pub fn position(self: &Arc<Self>) -> ModelPosition {
        ModelPosition::new(Arc::clone(self))
    }

    /// The description the model was built from.
    pub fn description(&self) -> &ModelDescription {
        &self.description
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.description.name
    }

    /// Number of layers.
    pub fn n_layers(&self) -> usize {
        self.description.layers.len()
    }

    /// Layer names, innermost first.
    pub fn layer_names(&self) -> &[String] {
        &self.description.layers
    }

    /// Attribute names.
    pub fn attribute_names(&self) -> &[String] {
        &self.description.attributes
    }

    /// Index of the layer named after an interface (case-insensitive).
    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.description
            .layers
            .iter()
            .position(|l| l.eq_ignore_ascii_case(name.trim()))
    }

    /// Index of an attribute (case-insensitive).
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.description
            .attributes
            .iter()
            .position(|a| a.eq_ignore_ascii_case(name.trim()))
    }

    /// Number of grid vertices.
    pub fn n_vertices(&self) -> usize {
        self.unit_vectors.len()
    }

    /// Unit vector of a grid vertex.
    pub fn vertex(&self, vertex: usize) -> [f64; 3] {
        self.unit_vectors[vertex]
    }

    /// Radius of the top of `layer` at a vertex.
    pub fn layer_top(&self, vertex: usize, layer: usize) -> f64 {
        let radii = &self.description.vertices[vertex].layers[layer].radii;
        radii[radii.len() - 1]
    }

    /// Radius of the bottom of `layer` at a vertex.
    pub fn layer_bottom(&self, vertex: usize, layer: usize) -> f64 {
        self.description.vertices[vertex].layers[layer].radii[0]
    }

    /// Radius of the model surface at a vertex.
    pub fn surface_radius(&self, vertex: usize) -> f64 {
        self.layer_top(vertex, self.n_layers() - 1)
    }

    /// Total number of profile nodes.
    pub fn n_nodes(&self) -> usize {
        self.node_layers.len()
    }

    /// Whether a layer takes part in tomographic inversion.
    pub fn is_active_layer(&self, layer: usize) -> bool {
        self.active_layers[layer]
    }

    /// Whether a profile node takes part in tomographic inversion.
    pub fn is_active_node(&self, node: usize) -> bool {
        self.node_layers
            .get(node)
            .map(|&layer| self.active_layers[layer])
            .unwrap_or(false)
    }

    fn profile(&self, vertex: usize, layer: usize) -> &LayerProfile {
        &self.description.vertices[vertex].layers[layer]
    }
}

fn validate_profile(
    vertex: usize,
    layer: usize,
    profile: &LayerProfile,
    n_attributes: usize,
) -> Result<()> {
    if profile.radii.is_empty() {
        return Err(BenderError::InvalidModel(format!(
            "vertex {} layer {} has an empty profile",
            vertex, layer
        )));
    }
    if profile.values.len() != profile.radii.len() {
        return Err(BenderError::InvalidModel(format!(
            "vertex {} layer {}: {} radii but {} value rows",
            vertex,
            layer,
            profile.radii.len(),
            profile.values.len()
        )));
    }
    for pair in profile.radii.windows(2) {
        if pair[1] <= pair[0] {
            return Err(BenderError::InvalidModel(format!(
                "vertex {} layer {}: radii must be strictly ascending",
                vertex, layer
            )));
        }
    }
    for row in &profile.values {
        if row.len() != n_attributes {
            return Err(BenderError::InvalidModel(format!(
                "vertex {} layer {}: expected {} attribute values per node, got {}",
                vertex,
                layer,
                n_attributes,
                row.len()
            )));
        }
        if let Some(v) = row.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(BenderError::InvalidModel(format!(
                "vertex {} layer {}: attribute value {} must be positive and finite",
                vertex, layer, v
            )));
        }
    }
    Ok(())
}

/// Radial interpolation within one profile: the bracketing node pair and the
/// fraction toward the upper node. Radii outside the profile clamp to its ends.
fn bracket(radii: &[f64], radius: f64) -> (usize, usize, f64) {
    let last = radii.len() - 1;
    if radius <= radii[0] {
        return (0, 0, 0.0);
    }
    if radius >= radii[last] {
        return (last, last, 0.0);
    }
    let upper = radii.partition_point(|&r| r <= radius).min(last);
    let lower = upper - 1;
    let f = (radius - radii[lower]) / (radii[upper] - radii[lower]);
    (lower, upper, f)
}

/// [`LayeredModelPosition`] over a [`LayeredModel`].
///
/// Lateral interpolation uses inverse angular distance weights over the three
/// nearest vertices; radial interpolation is linear within the layer profile.
#[derive(Clone, Debug)]
pub struct ModelPosition {
    model: Arc<LayeredModel>,
    unit_vector: [f64; 3],
    radius: f64,
    layer: usize,
    lateral: Vec<(usize, f64)>,
}

impl ModelPosition {
    /// New position at the model's first vertex, on the surface.
    pub fn new(model: Arc<LayeredModel>) -> Self {
        let mut pos = ModelPosition {
            unit_vector: model.vertex(0),
            radius: model.surface_radius(0),
            layer: model.n_layers() - 1,
            lateral: Vec::new(),
            model,
        };
        pos.update_lateral(pos.unit_vector);
        pos
    }

    /// The model this position samples.
    pub fn model(&self) -> &Arc<LayeredModel> {
        &self.model
    }

    fn update_lateral(&mut self, unit_vector: [f64; 3]) {
        if unit_vector == self.unit_vector && !self.lateral.is_empty() {
            return;
        }
        self.unit_vector = unit_vector;
        self.lateral.clear();

        let n = self.model.n_vertices();
        if n == 1 {
            self.lateral.push((0, 1.0));
            return;
        }

        let mut nearest: [(usize, f64); 3] = [(usize::MAX, f64::INFINITY); 3];
        for v in 0..n {
            let a = geometry::angle(unit_vector, self.model.vertex(v));
            if a < nearest[2].1 {
                nearest[2] = (v, a);
                nearest.sort_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(std::cmp::Ordering::Equal));
            }
        }
        if nearest[0].1 < 1e-9 {
            self.lateral.push((nearest[0].0, 1.0));
            return;
        }
        let mut total = 0.0;
        for &(v, a) in nearest.iter().filter(|(v, _)| *v != usize::MAX) {
            let w = 1.0 / a;
            total += w;
            self.lateral.push((v, w));
        }
        for entry in &mut self.lateral {
            entry.1 /= total;
        }
    }
}

impl LayeredModelPosition for ModelPosition {
    fn set(&mut self, unit_vector: [f64; 3], radius: f64) {
        self.update_lateral(unit_vector);
        self.radius = radius;
        let n_layers = self.model.n_layers();
        self.layer = (0..n_layers)
            .find(|&layer| radius <= self.layer_radius_top(layer))
            .unwrap_or(n_layers - 1);
    }

    fn set_in_layer(&mut self, unit_vector: [f64; 3], radius: f64, layer: usize) {
        self.update_lateral(unit_vector);
        self.radius = radius;
        self.layer = layer.min(self.model.n_layers() - 1);
    }

    fn unit_vector(&self) -> [f64; 3] {
        self.unit_vector
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn layer_index(&self) -> usize {
        self.layer
    }

    fn n_layers(&self) -> usize {
        self.model.n_layers()
    }

    fn layer_radius_top(&self, layer: usize) -> f64 {
        self.lateral
            .iter()
            .map(|&(v, w)| w * self.model.layer_top(v, layer))
            .sum()
    }

    fn value(&self, attribute: usize) -> f64 {
        self.lateral
            .iter()
            .map(|&(v, w)| {
                let profile = self.model.profile(v, self.layer);
                let (lo, hi, f) = bracket(&profile.radii, self.radius);
                w * ((1.0 - f) * profile.values[lo][attribute] + f * profile.values[hi][attribute])
            })
            .sum()
    }

    fn coefficients(&self) -> Vec<(usize, f64)> {
        let mut coefficients = Vec::with_capacity(2 * self.lateral.len());
        for &(v, w) in &self.lateral {
            let profile = self.model.profile(v, self.layer);
            let offset = self.model.node_offsets[v][self.layer];
            let (lo, hi, f) = bracket(&profile.radii, self.radius);
            if lo == hi {
                coefficients.push((offset + lo, w));
            } else {
                coefficients.push((offset + lo, w * (1.0 - f)));
                coefficients.push((offset + hi, w * f));
            }
        }
        coefficients
    }

    fn is_active_node(&self, node: usize) -> bool {
        self.model.is_active_node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_layer() -> Arc<LayeredModel> {
        Arc::new(
            LayeredModel::homogeneous(
                &[
                    ("CMB", 3479.5),
                    ("M660", 5711.0),
                    ("M410", 5961.0),
                    ("MOHO", 6336.0),
                    ("SURFACE", 6371.0),
                ],
                8.0,
                4.5,
            )
            .unwrap(),
        )
    }

    fn two_vertex() -> LayeredModel {
        let profile = |top: f64, sp: f64| LayerProfile {
            radii: vec![0.0, top],
            values: vec![vec![sp, 2.0 * sp], vec![sp, 2.0 * sp]],
        };
        LayeredModel::new(ModelDescription {
            name: "two".into(),
            layers: vec!["SURFACE".into()],
            attributes: vec!["PSLOWNESS".into(), "SSLOWNESS".into()],
            inactive_layers: vec![],
            vertices: vec![
                ModelVertex {
                    lat: 0.0,
                    lon: 0.0,
                    layers: vec![profile(6371.0, 0.1)],
                },
                ModelVertex {
                    lat: 0.0,
                    lon: 10.0,
                    layers: vec![profile(6381.0, 0.2)],
                },
            ],
        })
        .unwrap()
    }

    #[test]
    fn layer_lookup_by_radius() {
        let model = five_layer();
        let mut pos = model.position();
        let u = geometry::from_lat_lon(10.0, 20.0);
        pos.set(u, 6371.0);
        assert_eq!(pos.layer_index(), 4);
        pos.set(u, 6000.0);
        assert_eq!(pos.layer_index(), 3);
        pos.set(u, 5000.0);
        assert_eq!(pos.layer_index(), 1);
        pos.set(u, 100.0);
        assert_eq!(pos.layer_index(), 0);
        assert!((pos.radius_top() - 3479.5).abs() < 1e-9);
        assert_eq!(pos.radius_bottom(), 0.0);
    }

    #[test]
    fn depth_and_value() {
        let model = five_layer();
        let mut pos = model.position();
        pos.set(geometry::from_lat_lon(0.0, 0.0), 6271.0);
        assert!((pos.depth() - 100.0).abs() < 1e-9);
        assert!((pos.value(0) - 1.0 / 8.0).abs() < 1e-12);
        assert!((pos.value(1) - 1.0 / 4.5).abs() < 1e-12);
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let model = five_layer();
        assert_eq!(model.layer_index("moho"), Some(3));
        assert_eq!(model.attribute_index("sslowness"), Some(1));
        assert_eq!(model.layer_index("ICB"), None);
    }

    #[test]
    fn lateral_interpolation_between_vertices() {
        let model = Arc::new(two_vertex());
        let mut pos = model.position();
        pos.set(geometry::from_lat_lon(0.0, 5.0), 6000.0);
        assert!((pos.value(0) - 0.15).abs() < 1e-9);
        assert!((pos.surface_radius() - 6376.0).abs() < 1e-9);
        pos.set(geometry::from_lat_lon(0.0, 0.0), 6000.0);
        assert!((pos.value(0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn coefficients_sum_to_one() {
        let model = Arc::new(LayeredModel::reference_earth().unwrap());
        let mut pos = model.position();
        pos.set(geometry::from_lat_lon(30.0, 40.0), 5000.0);
        let total: f64 = pos.coefficients().iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12);
        let interpolated: f64 = pos
            .coefficients()
            .iter()
            .map(|&(node, w)| {
                let layer = model.node_layers[node];
                assert_eq!(layer, pos.layer_index());
                w
            })
            .sum();
        assert!((interpolated - 1.0).abs() < 1e-12);
    }

    #[test]
    fn gradient_of_linear_profile_is_radial() {
        let model = Arc::new(LayeredModel::reference_earth().unwrap());
        let mut pos = model.position();
        let u = geometry::from_lat_lon(0.0, 0.0);
        pos.set(u, 5000.0);
        let g = pos.gradient(0);
        // slowness increases outward in the lower mantle
        assert!(g[0] > 0.0);
        assert!(g[1].abs() < 1e-9 && g[2].abs() < 1e-9);
        assert_eq!(pos.layer_index(), 2);
        assert_eq!(pos.radius(), 5000.0);
    }

    #[test]
    fn rejects_non_contiguous_layers() {
        let mut description = two_vertex().description().clone();
        description.layers.push("EXTRA".into());
        for v in &mut description.vertices {
            v.layers.push(LayerProfile {
                radii: vec![6500.0, 6600.0],
                values: vec![vec![0.1, 0.2], vec![0.1, 0.2]],
            });
        }
        assert!(matches!(
            LayeredModel::new(description),
            Err(BenderError::InvalidModel(_))
        ));
    }

    #[test]
    fn rejects_non_positive_values() {
        let mut description = two_vertex().description().clone();
        description.vertices[0].layers[0].values[0][0] = 0.0;
        assert!(matches!(
            LayeredModel::new(description),
            Err(BenderError::InvalidModel(_))
        ));
    }

    #[test]
    fn inactive_layers_mark_nodes() {
        let mut description = five_layer().description().clone();
        description.inactive_layers = vec!["SURFACE".into()];
        let model = LayeredModel::new(description).unwrap();
        assert!(!model.is_active_layer(4));
        assert!(model.is_active_node(0));
        assert!(!model.is_active_node(model.n_nodes() - 1));
    }

    #[test]
    fn zero_thickness_layer_is_accepted() {
        let model = LayeredModel::homogeneous(
            &[("CMB", 3479.5), ("PINCH", 3479.5), ("SURFACE", 6371.0)],
            8.0,
            4.5,
        )
        .unwrap();
        assert_eq!(model.n_layers(), 3);
        let mut pos = Arc::new(model).position();
        pos.set(geometry::from_lat_lon(0.0, 0.0), 3479.5);
        assert_eq!(pos.layer_index(), 0);
        assert_eq!(pos.layer_radius_top(1), 3479.5);
    }
}
