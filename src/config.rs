// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BenderError, Result};

/// How [`crate::snell::EvaluateSnellsLaw`] locates a node on an interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Bisection on the Snell residual (tangential slowness mismatch).
    Bisection,
    /// Golden-section minimisation of the local travel time.
    GoldenSection,
}

/// Tunable parameters of the ray bender.
///
/// The iteration cap and tolerances are empirical; they bound effort rather
/// than guarantee a convergence rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenderConfig {
    /// Maximum spacing of sub-layer levels (km).
    pub sublayer_spacing_km: f64,
    /// Minimum offset of the first sub-layer level below a layer top (km).
    pub min_top_level_width_km: f64,
    /// Node spacing of a freshly built ray (km).
    pub max_node_spacing_km: f64,
    /// Finest node spacing; refinement stops once halving would go below it (km).
    pub min_node_spacing_km: f64,
    /// Relaxation sweep budget per candidate ray.
    pub max_iterations: usize,
    /// Travel-time change (s) below which a relaxation stage has converged.
    pub convergence_tolerance: f64,
    /// Over-relaxation factor applied to pseudo-bending updates.
    pub bending_enhancement: f64,
    /// Interface search method.
    pub search_method: SearchMethod,
    /// Parameter tolerance of the interface search.
    pub snell_tolerance: f64,
    /// Radius tolerance (km) of the depth-phase monotonicity check.
    pub depth_phase_tolerance_km: f64,
    /// Path resampling spacing for [`crate::ray_info::RayInfo`] (km).
    pub resample_spacing_km: f64,
    /// Longest admissible diffracted leg (degrees).
    pub max_diffraction_deg: f64,
    /// Diffracted legs shorter than this are not diffractions (degrees).
    pub min_diffraction_deg: f64,
    /// Maximum length in bytes of a ray's diagnostic log.
    pub status_log_max_len: usize,
    /// Interface names to try when the model does not define a name.
    pub interface_aliases: BTreeMap<String, String>,
}

impl Default for BenderConfig {
    fn default() -> Self {
        let sublayer_spacing_km = 30.0;
        let mut interface_aliases = BTreeMap::new();
        interface_aliases.insert("SURFACE".to_string(), "UPPER_CRUST_TOP".to_string());
        interface_aliases.insert("CRUST_TOP".to_string(), "UPPER_CRUST_TOP".to_string());
        BenderConfig {
            sublayer_spacing_km,
            min_top_level_width_km: sublayer_spacing_km / 3.0,
            max_node_spacing_km: 400.0,
            min_node_spacing_km: 25.0,
            max_iterations: 1000,
            convergence_tolerance: 1e-4,
            bending_enhancement: 1.5,
            search_method: SearchMethod::Bisection,
            snell_tolerance: 1e-9,
            depth_phase_tolerance_km: 0.5,
            resample_spacing_km: 10.0,
            max_diffraction_deg: 40.0,
            min_diffraction_deg: 0.05,
            status_log_max_len: 4000,
            interface_aliases,
        }
    }
}

impl BenderConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: BenderConfig = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| BenderError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    /// Returns [`BenderError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("sublayer_spacing_km", self.sublayer_spacing_km),
            ("max_node_spacing_km", self.max_node_spacing_km),
            ("min_node_spacing_km", self.min_node_spacing_km),
            ("convergence_tolerance", self.convergence_tolerance),
            ("bending_enhancement", self.bending_enhancement),
            ("snell_tolerance", self.snell_tolerance),
            ("resample_spacing_km", self.resample_spacing_km),
            ("max_diffraction_deg", self.max_diffraction_deg),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(BenderError::InvalidConfig(format!(
                    "{} = {} (must be positive and finite)",
                    name, value
                )));
            }
        }
        let non_negative = [
            ("min_top_level_width_km", self.min_top_level_width_km),
            ("depth_phase_tolerance_km", self.depth_phase_tolerance_km),
            ("min_diffraction_deg", self.min_diffraction_deg),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(BenderError::InvalidConfig(format!(
                    "{} = {} (must be non-negative and finite)",
                    name, value
                )));
            }
        }
        if self.min_node_spacing_km > self.max_node_spacing_km {
            return Err(BenderError::InvalidConfig(format!(
                "min_node_spacing_km {} exceeds max_node_spacing_km {}",
                self.min_node_spacing_km, self.max_node_spacing_km
            )));
        }
        if self.bending_enhancement >= 2.0 {
            return Err(BenderError::InvalidConfig(format!(
                "bending_enhancement = {} (must be below 2)",
                self.bending_enhancement
            )));
        }
        if self.status_log_max_len < 64 {
            return Err(BenderError::InvalidConfig(format!(
                "status_log_max_len = {} (must be at least 64)",
                self.status_log_max_len
            )));
        }
        if self.max_iterations == 0 {
            return Err(BenderError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BenderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sublayer_spacing_km, 30.0);
        assert_eq!(config.min_top_level_width_km, 10.0);
        assert_eq!(config.resample_spacing_km, 10.0);
        assert_eq!(
            config.interface_aliases.get("SURFACE").map(String::as_str),
            Some("UPPER_CRUST_TOP")
        );
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: BenderConfig =
            serde_json::from_str(r#"{"max_iterations": 50, "search_method": "golden_section"}"#)
                .unwrap();
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.search_method, SearchMethod::GoldenSection);
        assert_eq!(config.sublayer_spacing_km, 30.0);
    }

    #[test]
    fn rejects_bad_values() {
        let config = BenderConfig {
            convergence_tolerance: -1.0,
            ..BenderConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("convergence_tolerance"));

        let config = BenderConfig {
            min_node_spacing_km: 500.0,
            ..BenderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenderError::InvalidConfig(_))
        ));

        let config = BenderConfig {
            status_log_max_len: 2,
            ..BenderConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("status_log_max_len"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bender.json");
        std::fs::write(&path, r#"{"sublayer_spacing_km": 60.0}"#).unwrap();
        let config = BenderConfig::from_json_file(&path).unwrap();
        assert_eq!(config.sublayer_spacing_km, 60.0);
        assert_eq!(config.max_iterations, 1000);
    }
}
