// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Two-point seismic ray bending through radially layered, laterally
//! heterogeneous Earth models.
//!
//! A ray between a source and a receiver is represented as a chain of
//! branches (down-going, up-going, reflection, diffraction), each made of
//! segments confined to one model layer. Node positions are relaxed until
//! Snell's law holds at every interface crossing and the pseudo-bending
//! equations hold inside each layer. Candidate turning levels for each phase
//! are enumerated per layer, and the fastest converged candidate wins.

#![warn(missing_docs)]

/// Ray bender driver, candidate search and batch computation.
pub mod bender;
/// Branches, segments and nodes of a ray path.
pub mod branch;
/// Tunable parameters.
pub mod config;
/// Error types for the library.
pub mod error;
/// Vector and great-circle helpers.
pub mod geometry;
/// File I/O for models, ray results and ray paths.
pub mod io;
/// Layered Earth model and point queries.
pub mod model;
/// Supported seismic phases.
pub mod phase;
/// Candidate turning levels per phase family.
pub mod phase_level;
/// A single candidate ray and its relaxation loop.
pub mod ray;
/// Ray results and their binary format.
pub mod ray_info;
/// Interface search and pseudo-bending kernels.
pub mod snell;
/// Wave-type conversion schedules.
pub mod wave_type;

pub use crate::bender::{Bender, PhaseCache, ProgressInfo, RayRequest};
pub use crate::config::{BenderConfig, SearchMethod};
pub use crate::error::{BenderError, Result};
pub use crate::geometry::GeoPoint;
pub use crate::model::{LayeredModel, LayeredModelPosition, ModelPosition};
pub use crate::phase::{Phase, PhaseKind};
pub use crate::ray::{Ray, RayOutcome, RayTopology};
pub use crate::ray_info::{RayInfo, RayInfoOptions, RayType, NA_VALUE};
