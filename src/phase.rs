// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{BenderError, Result};

/// Ray geometry a phase follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseKind {
    /// Turns within a layer (or travels directly when the endpoints allow).
    Refracted,
    /// Reflects off the top side of an interface.
    Reflected,
    /// Bounces off the underside of the surface above the source, then
    /// refracts to the receiver.
    DepthPhase,
    /// Travels along the top of an interface between two critical points.
    Diffracted,
}

/// A supported seismic phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Phase {
    /// Phase name, e.g. `PcP`.
    pub name: &'static str,
    /// Ray geometry.
    pub kind: PhaseKind,
    /// Wave-type conversion schedule.
    pub wave_spec: &'static str,
    /// Interface whose level definition supplies turning candidates.
    pub level_interface: &'static str,
    /// Interface the phase reflects, bounces or diffracts at.
    pub event_interface: Option<&'static str>,
}

const fn refracted(name: &'static str, wave_spec: &'static str, level: &'static str) -> Phase {
    Phase {
        name,
        kind: PhaseKind::Refracted,
        wave_spec,
        level_interface: level,
        event_interface: None,
    }
}

const fn reflected(name: &'static str, wave_spec: &'static str) -> Phase {
    Phase {
        name,
        kind: PhaseKind::Reflected,
        wave_spec,
        level_interface: "CMB",
        event_interface: Some("CMB"),
    }
}

const fn depth_phase(name: &'static str, wave_spec: &'static str) -> Phase {
    Phase {
        name,
        kind: PhaseKind::DepthPhase,
        wave_spec,
        level_interface: "M660",
        event_interface: Some("SURFACE"),
    }
}

const fn diffracted(name: &'static str, wave_spec: &'static str) -> Phase {
    Phase {
        name,
        kind: PhaseKind::Diffracted,
        wave_spec,
        level_interface: "CMB",
        event_interface: Some("CMB"),
    }
}

/// Every phase the bender can compute.
pub const PHASES: [Phase; 16] = [
    refracted("P", "PSLOWNESS", "M660"),
    refracted("S", "SSLOWNESS", "M660"),
    refracted("Pg", "PSLOWNESS", "SURFACE"),
    refracted("Sg", "SSLOWNESS", "SURFACE"),
    refracted("Pn", "PSLOWNESS", "MOHO"),
    refracted("Sn", "SSLOWNESS", "MOHO"),
    reflected("PcP", "PSLOWNESS"),
    reflected("ScS", "SSLOWNESS"),
    reflected("PcS", "PSLOWNESS, CMB, SSLOWNESS"),
    reflected("ScP", "SSLOWNESS, CMB, PSLOWNESS"),
    depth_phase("pP", "PSLOWNESS"),
    depth_phase("sP", "SSLOWNESS, SURFACE, PSLOWNESS"),
    depth_phase("pS", "PSLOWNESS, SURFACE, SSLOWNESS"),
    depth_phase("sS", "SSLOWNESS"),
    diffracted("Pdiff", "PSLOWNESS"),
    diffracted("Sdiff", "SSLOWNESS"),
];

impl Phase {
    /// Look up a phase by its exact (case-sensitive) name; `pP` and `PP` are
    /// different phases.
    pub fn from_name(name: &str) -> Result<Phase> {
        PHASES
            .iter()
            .find(|p| p.name == name.trim())
            .copied()
            .ok_or_else(|| BenderError::UnknownPhase(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_sensitive() {
        assert_eq!(Phase::from_name("pP").unwrap().kind, PhaseKind::DepthPhase);
        assert!(matches!(
            Phase::from_name("PP"),
            Err(BenderError::UnknownPhase(_))
        ));
    }

    #[test]
    fn converted_reflections_name_their_interface() {
        let pcs = Phase::from_name("PcS").unwrap();
        assert_eq!(pcs.kind, PhaseKind::Reflected);
        assert_eq!(pcs.event_interface, Some("CMB"));
        assert_eq!(pcs.wave_spec, "PSLOWNESS, CMB, SSLOWNESS");
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in PHASES.iter().enumerate() {
            for b in &PHASES[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
