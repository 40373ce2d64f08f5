// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{BenderError, Result};
use crate::model::LayeredModel;

/// Table remapping generic interface names (e.g. `SURFACE`) to names a
/// particular model defines (e.g. `UPPER_CRUST_TOP`). Keys are uppercase.
pub type InterfaceAliases = BTreeMap<String, String>;

/// Resolve an interface name to the index of the layer it tops, trying the
/// alias table when the model does not define the name itself.
pub fn resolve_interface(
    model: &LayeredModel,
    name: &str,
    aliases: &InterfaceAliases,
) -> Option<usize> {
    let key = name.trim().to_ascii_uppercase();
    model
        .layer_index(&key)
        .or_else(|| aliases.get(&key).and_then(|alias| model.layer_index(alias)))
}

/// One entry of a wave-type conversion schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveTypeEntry {
    /// Interface name (`SOURCE` and `RECEIVER` for the bookends).
    pub interface: String,
    /// Layer topped by the interface; `None` for the bookends.
    pub layer: Option<usize>,
    /// Attribute index of the wave speed used after this point.
    pub attribute: usize,
}

/// Ordered wave-type conversion schedule of a phase.
///
/// Built from a specification such as `"PSLOWNESS, CMB, SSLOWNESS"`: the
/// starting wave type, then alternating interface and wave type for each
/// conversion. The schedule is bracketed by synthetic `SOURCE` and `RECEIVER`
/// entries and is immutable after construction.
#[derive(Clone, Debug)]
pub struct PhaseWaveTypeModel {
    phase: String,
    spec: String,
    entries: Vec<WaveTypeEntry>,
}

impl PhaseWaveTypeModel {
    /// Parse a wave-type specification against a model's metadata.
    ///
    /// # Errors
    /// - [`BenderError::MalformedWaveTypeSpec`] for empty tokens or an
    ///   interface without a following wave type
    /// - [`BenderError::UnknownAttribute`] for an unknown wave-type name
    /// - [`BenderError::UnknownInterface`] naming every unresolvable interface
    pub fn new(
        phase: &str,
        spec: &str,
        model: &LayeredModel,
        aliases: &InterfaceAliases,
    ) -> Result<Self> {
        let tokens: Vec<&str> = spec.split(',').map(str::trim).collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(BenderError::MalformedWaveTypeSpec {
                spec: spec.to_string(),
                reason: "empty token".to_string(),
            });
        }
        if tokens.len() % 2 == 0 {
            return Err(BenderError::MalformedWaveTypeSpec {
                spec: spec.to_string(),
                reason: format!(
                    "interface '{}' is not followed by a wave type",
                    tokens[tokens.len() - 1]
                ),
            });
        }

        let attribute = |name: &str| {
            model
                .attribute_index(name)
                .ok_or_else(|| BenderError::UnknownAttribute(name.to_string()))
        };

        let first = attribute(tokens[0])?;
        let mut entries = vec![WaveTypeEntry {
            interface: "SOURCE".to_string(),
            layer: None,
            attribute: first,
        }];
        let mut unknown = Vec::new();
        for pair in tokens[1..].chunks(2) {
            let wave = attribute(pair[1])?;
            match resolve_interface(model, pair[0], aliases) {
                Some(layer) => entries.push(WaveTypeEntry {
                    interface: pair[0].to_ascii_uppercase(),
                    layer: Some(layer),
                    attribute: wave,
                }),
                None => unknown.push(pair[0].to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(BenderError::UnknownInterface { names: unknown });
        }
        let last = entries[entries.len() - 1].attribute;
        entries.push(WaveTypeEntry {
            interface: "RECEIVER".to_string(),
            layer: None,
            attribute: last,
        });

        Ok(PhaseWaveTypeModel {
            phase: phase.to_string(),
            spec: spec.to_string(),
            entries,
        })
    }

    /// Phase name.
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// The specification string this schedule was parsed from.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Number of true conversion points (excluding `SOURCE` and `RECEIVER`).
    pub fn size(&self) -> usize {
        self.entries.len() - 2
    }

    /// All entries including the bookends.
    pub fn entries(&self) -> &[WaveTypeEntry] {
        &self.entries
    }

    /// Wave-type attribute at the source.
    pub fn initial_attribute(&self) -> usize {
        self.entries[0].attribute
    }
}

/// Cursor into a [`PhaseWaveTypeModel`] that follows a ray traversal.
///
/// The traversal reports every interface event (crossing or bounce) once,
/// with the index of the layer topped by that interface.
#[derive(Clone, Debug)]
pub struct PhaseWaveTypeTracker {
    model: Arc<PhaseWaveTypeModel>,
    index: usize,
}

impl PhaseWaveTypeTracker {
    /// New tracker positioned before the first conversion.
    pub fn new(model: Arc<PhaseWaveTypeModel>) -> Self {
        PhaseWaveTypeTracker { model, index: 1 }
    }

    /// Return to the initial state; call before building a brand-new ray.
    pub fn reset_index(&mut self) {
        self.index = 1;
    }

    /// Cursor position: the entry holding the next scheduled conversion.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The schedule being tracked.
    pub fn model(&self) -> &Arc<PhaseWaveTypeModel> {
        &self.model
    }

    /// Wave-type attribute in effect at the current traversal position.
    pub fn current_attribute(&self) -> usize {
        self.model.entries[self.index - 1].attribute
    }

    /// Advance past the next conversion if `layer` is the layer it is
    /// scheduled at, then return the wave-type attribute in effect.
    pub fn update_next_wave_speed_index(&mut self, layer: usize) -> usize {
        let entries = &self.model.entries;
        if self.index < entries.len() - 1 && entries[self.index].layer == Some(layer) {
            self.index += 1;
        }
        self.current_attribute()
    }
}
