// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::BenderConfig;
use crate::error::{BenderError, Result};
use crate::model::LayeredModel;
use crate::wave_type::{resolve_interface, InterfaceAliases};

const CRUST_INTERFACES: [&str; 5] = [
    "SURFACE",
    "CRUST_TOP",
    "UPPER_CRUST_TOP",
    "MIDDLE_CRUST_TOP",
    "LOWER_CRUST_TOP",
];

/// A candidate turning level of a refracted ray.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerLevel {
    /// Level name: the interface name for a major level, `NAME+k` for the
    /// k-th sub-level below it.
    pub name: String,
    /// Model layer the ray turns in.
    pub layer: usize,
    /// Index of the major level this level belongs to (0 is the surface).
    pub major: usize,
    /// Nominal turning depth in km.
    pub depth: f64,
    /// Whether this is the major level at the top of its layer.
    pub is_major: bool,
}

/// Distance-banded turning-level rules for one phase family.
///
/// Levels are ordered from the surface downward. The major level with index
/// `k` sits at the top of model layer `n_layers - 1 - k`; the sub-levels of
/// that layer follow it.
#[derive(Clone, Debug)]
pub struct PhaseLayerLevelDefinition {
    interface: String,
    levels: Vec<LayerLevel>,
    major_positions: Vec<usize>,
    bottom: Vec<(f64, usize)>,
    top: Vec<(f64, usize)>,
}

fn lookup(bands: &[(f64, usize)], distance: f64) -> Option<usize> {
    bands
        .iter()
        .find(|&&(key, _)| key >= distance)
        .map(|&(_, level)| level)
}

impl PhaseLayerLevelDefinition {
    /// Interface name the definition was built for.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Deepest major level a phase may turn at for a source-receiver distance
    /// in degrees, or `None` when the distance lies beyond every band.
    pub fn bottom_layer(&self, distance: f64) -> Option<usize> {
        lookup(&self.bottom, distance)
    }

    /// Shallowest major level a phase may turn at, as for
    /// [`PhaseLayerLevelDefinition::bottom_layer`].
    pub fn top_layer(&self, distance: f64) -> Option<usize> {
        lookup(&self.top, distance)
    }

    /// Every level, surface first.
    pub fn levels(&self) -> &[LayerLevel] {
        &self.levels
    }

    /// Number of major levels (equal to the number of model layers).
    pub fn n_major_levels(&self) -> usize {
        self.major_positions.len()
    }

    /// The major level with index `major`.
    pub fn major_level(&self, major: usize) -> &LayerLevel {
        &self.levels[self.major_positions[major]]
    }

    /// Position of a named level in [`PhaseLayerLevelDefinition::levels`].
    pub fn level_index(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Major index of the level named after an interface.
    pub fn major_level_index(&self, name: &str) -> Option<usize> {
        self.level_index(name)
            .map(|i| &self.levels[i])
            .filter(|level| level.is_major)
            .map(|level| level.major)
    }

    /// Levels to try for a distance: from the top major level down to the last
    /// sub-level of the bottom major level's layer. Empty when no band covers
    /// the distance.
    pub fn candidate_levels(&self, distance: f64) -> &[LayerLevel] {
        let (Some(top), Some(bottom)) = (self.top_layer(distance), self.bottom_layer(distance))
        else {
            return &[];
        };
        let (top, bottom) = (top.min(bottom), top.max(bottom));
        let start = self.major_positions[top];
        let end = self
            .major_positions
            .get(bottom + 1)
            .copied()
            .unwrap_or(self.levels.len());
        &self.levels[start..end]
    }
}

/// Builds [`PhaseLayerLevelDefinition`]s for one model.
///
/// The level list depends only on the model and the sub-layer spacing and is
/// computed once; each [`PhaseLayerLevelBuilder::build`] call then attaches the
/// distance bands of one phase family.
pub struct PhaseLayerLevelBuilder<'a> {
    model: &'a LayeredModel,
    aliases: &'a InterfaceAliases,
    levels: Vec<LayerLevel>,
    major_positions: Vec<usize>,
}

impl<'a> PhaseLayerLevelBuilder<'a> {
    /// Discretize every layer of `model` into major and sub-layer levels.
    ///
    /// For each layer the depth range covered anywhere in the grid (shallowest
    /// top to deepest bottom) is split into equal steps no larger than the
    /// configured spacing; sub-levels closer to the top than the minimum top
    /// width are dropped.
    pub fn new(model: &'a LayeredModel, config: &'a BenderConfig) -> Self {
        let n_layers = model.n_layers();
        let mut levels = Vec::new();
        let mut major_positions = Vec::with_capacity(n_layers);

        for major in 0..n_layers {
            let layer = n_layers - 1 - major;
            let name = model.layer_names()[layer].to_ascii_uppercase();

            let mut top_depth = f64::INFINITY;
            let mut bottom_depth = f64::NEG_INFINITY;
            for v in 0..model.n_vertices() {
                let surface = model.surface_radius(v);
                top_depth = top_depth.min(surface - model.layer_top(v, layer));
                bottom_depth = bottom_depth.max(surface - model.layer_bottom(v, layer));
            }
            let span = (bottom_depth - top_depth).max(0.0);

            let n = (span / config.sublayer_spacing_km).ceil() as usize;
            let step = if n > 0 { span / n as f64 } else { 0.0 };

            major_positions.push(levels.len());
            levels.push(LayerLevel {
                name: name.clone(),
                layer,
                major,
                depth: top_depth + 0.5 * config.min_top_level_width_km.min(step),
                is_major: true,
            });
            for k in 1..n {
                let offset = k as f64 * step;
                if offset < config.min_top_level_width_km {
                    continue;
                }
                levels.push(LayerLevel {
                    name: format!("{}+{}", name, k),
                    layer,
                    major,
                    depth: top_depth + offset,
                    is_major: false,
                });
            }
        }

        PhaseLayerLevelBuilder {
            model,
            aliases: &config.interface_aliases,
            levels,
            major_positions,
        }
    }

    fn major_index(&self, name: &str) -> Option<usize> {
        resolve_interface(self.model, name, self.aliases)
            .map(|layer| self.model.n_layers() - 1 - layer)
    }

    fn require(&self, names: &[&str]) -> Result<Vec<usize>> {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for &name in names {
            match self.major_index(name) {
                Some(major) => found.push(major),
                None => missing.push(name.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(BenderError::UnknownInterface { names: missing })
        }
    }

    /// Level definition for the phase family named by `interface`.
    ///
    /// `M660` and `M410` phases widen their turning range with distance;
    /// crustal interface names test every crustal layer; any other name
    /// (e.g. `CMB`, `ICB`, `MOHO`) tests that single interface.
    ///
    /// # Errors
    /// [`BenderError::UnknownInterface`] naming every interface the family
    /// needs that the model does not define.
    pub fn build(&self, interface: &str) -> Result<PhaseLayerLevelDefinition> {
        let key = interface.trim().to_ascii_uppercase();
        let (bottom, top) = match key.as_str() {
            "M660" => {
                let m = self.require(&["M410", "M660", "MOHO"])?;
                let (m410, m660, moho) = (m[0], m[1], m[2]);
                (
                    vec![(10.0, m410), (180.0, m660)],
                    vec![(20.0, moho), (180.0, m660)],
                )
            }
            "M410" => {
                let m = self.require(&["M410", "M660", "MOHO"])?;
                let (m410, m660, moho) = (m[0], m[1], m[2]);
                (vec![(15.0, m410), (180.0, m660)], vec![(180.0, moho)])
            }
            name if CRUST_INTERFACES.contains(&name) => {
                let moho = self.require(&["MOHO"])?[0];
                let deepest_crust = moho.checked_sub(1).ok_or_else(|| {
                    BenderError::InvalidModel("MOHO is the model surface".to_string())
                })?;
                (vec![(180.0, deepest_crust)], vec![(180.0, 0)])
            }
            name => {
                let major = self.require(&[name])?[0];
                (vec![(180.0, major)], vec![(180.0, major)])
            }
        };

        Ok(PhaseLayerLevelDefinition {
            interface: key,
            levels: self.levels.clone(),
            major_positions: self.major_positions.clone(),
            bottom,
            top,
        })
    }
}
