// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use approx::assert_relative_eq;

use ray_bender::bender::{Bender, RayRequest};
use ray_bender::branch::{BranchKind, NodeKind};
use ray_bender::config::BenderConfig;
use ray_bender::geometry::{self, GeoPoint};
use ray_bender::io;
use ray_bender::model::{LayeredModel, RadialLayer};
use ray_bender::phase_level::PhaseLayerLevelBuilder;
use ray_bender::ray::{Ray, RayEndpoint, RayOutcome, RayTopology};
use ray_bender::ray_info::{RayInfoOptions, RayType};
use ray_bender::wave_type::{InterfaceAliases, PhaseWaveTypeModel, PhaseWaveTypeTracker};

const R: f64 = 6371.0;
const RC: f64 = 3479.5;
const VP: f64 = 10.0;
const VS: f64 = 5.0;

fn homogeneous_earth() -> Arc<LayeredModel> {
    Arc::new(
        LayeredModel::homogeneous(
            &[
                ("CMB", RC),
                ("M660", 5711.0),
                ("M410", 5961.0),
                ("MOHO", 6336.0),
                ("SURFACE", R),
            ],
            VP,
            VS,
        )
        .unwrap(),
    )
}

fn coarse() -> BenderConfig {
    BenderConfig {
        sublayer_spacing_km: 500.0,
        min_top_level_width_km: 20.0,
        max_node_spacing_km: 800.0,
        min_node_spacing_km: 200.0,
        max_iterations: 20000,
        convergence_tolerance: 1e-5,
        ..BenderConfig::default()
    }
}

/// Point on the equator at longitude `lon` degrees and radius `r`.
fn equator(lon: f64, r: f64) -> [f64; 3] {
    geometry::to_cartesian(geometry::from_lat_lon(0.0, lon), r)
}

/// Minimum of a unimodal function on [a, b] by golden-section search.
fn golden_min(f: impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    for _ in 0..200 {
        let c = b - inv_phi * (b - a);
        let d = a + inv_phi * (b - a);
        if f(c) < f(d) {
            b = d;
        } else {
            a = c;
        }
    }
    f(0.5 * (a + b))
}

fn compute(bender: &Bender, source: GeoPoint, receiver: GeoPoint, phase: &str) -> ray_bender::RayInfo {
    let mut pos = bender.model().position();
    bender
        .compute_ray(&RayRequest::new(source, receiver, phase), &mut pos)
        .unwrap()
}

/// Test 1: P in a homogeneous Earth
/// Every layer has the same velocity, so the ray is the straight chord.
#[test]
fn homogeneous_p_follows_the_chord() {
    let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
    let info = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, 0.0),
        GeoPoint::new(0.0, 60.0, 0.0),
        "P",
    );
    assert_eq!(info.ray_type, RayType::Refraction);
    // 2 R sin(30 deg) = R
    assert_relative_eq!(info.travel_time, R / VP, max_relative = 1e-3);
    let chord_depth = R * (1.0 - 30f64.to_radians().cos());
    assert_relative_eq!(info.turning_depth, chord_depth, max_relative = 2e-2);
    assert_relative_eq!(info.azimuth, 90.0, epsilon = 1e-9);
    assert_relative_eq!(info.back_azimuth, 270.0, epsilon = 1e-9);
}

/// Test 2: PcP reflection off the CMB of a homogeneous Earth
/// The bounce sits midway; tt = 2 sqrt(R^2 + rc^2 - 2 R rc cos(d/2)) / v.
#[test]
fn homogeneous_pcp_matches_geometry() {
    let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
    let delta: f64 = 40.0;
    let info = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, 0.0),
        GeoPoint::new(0.0, delta, 0.0),
        "PcP",
    );
    assert_eq!(info.ray_type, RayType::Reflection);
    let leg = (R * R + RC * RC - 2.0 * R * RC * (0.5 * delta).to_radians().cos()).sqrt();
    assert_relative_eq!(info.travel_time, 2.0 * leg / VP, max_relative = 1e-4);
    assert_relative_eq!(info.turning_depth, R - RC, epsilon = 1e-3);
}

/// Test 3: PcS conversion at the CMB
/// The down leg travels at VP and the up leg at VS; the bounce point
/// minimises the total time.
#[test]
fn homogeneous_pcs_converts_at_the_cmb() {
    let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
    let delta: f64 = 50.0;
    let info = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, 0.0),
        GeoPoint::new(0.0, delta, 0.0),
        "PcS",
    );
    assert_eq!(info.ray_type, RayType::Reflection);
    let (xs, xr) = (equator(0.0, R), equator(delta, R));
    let expected = golden_min(
        |phi| {
            let xb = equator(phi, RC);
            geometry::distance(xs, xb) / VP + geometry::distance(xb, xr) / VS
        },
        0.0,
        delta,
    );
    assert_relative_eq!(info.travel_time, expected, max_relative = 1e-4);

    // the up-going S leg makes PcS slower than PcP
    let pcp = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, 0.0),
        GeoPoint::new(0.0, delta, 0.0),
        "PcP",
    );
    assert!(info.travel_time > pcp.travel_time);
}

/// Test 4: Pdiff along the CMB
/// Tangent legs from each endpoint plus the arc between the tangent points.
#[test]
fn homogeneous_pdiff_hugs_the_core() {
    let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
    let delta: f64 = 130.0;
    let info = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, 0.0),
        GeoPoint::new(0.0, delta, 0.0),
        "Pdiff",
    );
    assert_eq!(info.ray_type, RayType::Diffraction);
    let tangent = (R * R - RC * RC).sqrt();
    let theta = (RC / R).acos();
    let arc = delta.to_radians() - 2.0 * theta;
    let expected = (2.0 * tangent + RC * arc) / VP;
    assert_relative_eq!(info.travel_time, expected, max_relative = 1e-3);

    // too close for the tangent points to part
    let short = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, 0.0),
        GeoPoint::new(0.0, 100.0, 0.0),
        "Pdiff",
    );
    assert_eq!(short.ray_type, RayType::Invalid);
    assert!(!short.status_message.is_empty());
}

/// Test 5: pP bounce under the surface
/// Up to a surface point, then down and back up to the receiver.
#[test]
fn homogeneous_pp_bounces_under_the_surface() {
    let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
    let (delta, depth): (f64, f64) = (70.0, 100.0);
    let info = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, depth),
        GeoPoint::new(0.0, delta, 0.0),
        "pP",
    );
    assert_eq!(info.ray_type, RayType::Refraction);
    let (xs, xr) = (equator(0.0, R - depth), equator(delta, R));
    let expected = golden_min(
        |phi| {
            let xb = equator(phi, R);
            (geometry::distance(xs, xb) + geometry::distance(xb, xr)) / VP
        },
        0.0,
        0.5 * delta,
    );
    assert_relative_eq!(info.travel_time, expected, max_relative = 1e-3);

    let p = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, depth),
        GeoPoint::new(0.0, delta, 0.0),
        "P",
    );
    assert!(info.travel_time > p.travel_time);

    // no depth phase from a surface source
    let surface = compute(
        &bender,
        GeoPoint::new(0.0, 0.0, 0.0),
        GeoPoint::new(0.0, delta, 0.0),
        "pP",
    );
    assert_eq!(surface.ray_type, RayType::Invalid);
}

/// Test 6: Snell's law at a velocity contrast
/// A direct ray from a slow-over-fast boundary crossing obeys
/// s1 sin(i1) = s2 sin(i2) at the interface node.
#[test]
fn direct_ray_obeys_snells_law() {
    let model = Arc::new(
        LayeredModel::radial(
            "two_layer",
            &[
                RadialLayer::new("LOWER", 6271.0, (8.0, 8.0), (4.5, 4.5)),
                RadialLayer::new("SURFACE", R, (5.0, 5.0), (3.0, 3.0)),
            ],
        )
        .unwrap(),
    );
    let mut pos = model.position();
    let waves = PhaseWaveTypeModel::new("P", "PSLOWNESS", &model, &InterfaceAliases::new()).unwrap();
    let mut tracker = PhaseWaveTypeTracker::new(Arc::new(waves));
    let config = BenderConfig {
        max_node_spacing_km: 100.0,
        min_node_spacing_km: 25.0,
        max_iterations: 20000,
        convergence_tolerance: 1e-6,
        ..BenderConfig::default()
    };
    let source = RayEndpoint {
        unit_vector: geometry::from_lat_lon(0.0, 0.0),
        radius: R - 300.0,
    };
    let receiver = RayEndpoint {
        unit_vector: geometry::from_lat_lon(0.0, 2.0),
        radius: R,
    };
    let mut ray = Ray::new(source, receiver, RayTopology::Direct, &mut tracker, &mut pos, &config);
    assert_eq!(ray.optimize(&mut pos), RayOutcome::Converged);

    let path = ray.path();
    let j = path
        .nodes
        .iter()
        .position(|n| n.kind == NodeKind::Interface)
        .unwrap();
    assert_relative_eq!(path.nodes[j].radius, 6271.0, epsilon = 1e-9);
    let x = path.nodes[j].position();
    let normal = path.nodes[j].unit_vector;
    let sin = |a: [f64; 3], b: [f64; 3]| {
        let t = geometry::normalize(geometry::sub(b, a));
        geometry::norm(geometry::cross(t, normal))
    };
    let below = sin(path.nodes[j - 1].position(), x) / 8.0;
    let above = sin(x, path.nodes[j + 1].position()) / 5.0;
    assert_relative_eq!(below, above, max_relative = 1e-3);
    assert_eq!(ray.branches().len(), 1);
    assert_eq!(ray.branches()[0].kind, BranchKind::UpGoing);
}

/// Test 7: M660 level bands
#[test]
fn m660_level_bands() {
    let model = homogeneous_earth();
    let config = BenderConfig::default();
    let def = PhaseLayerLevelBuilder::new(&model, &config).build("M660").unwrap();
    let m410 = def.major_level_index("M410");
    let m660 = def.major_level_index("M660");
    let moho = def.major_level_index("MOHO");
    assert_eq!(def.bottom_layer(5.0), m410);
    assert_eq!(def.bottom_layer(50.0), m660);
    assert_eq!(def.top_layer(15.0), moho);
    assert_eq!(def.top_layer(50.0), m660);

    let mut previous = 0;
    for d in 0..=180 {
        let bottom = def.bottom_layer(d as f64).unwrap();
        assert!(bottom >= previous, "bottom layer decreased at {} deg", d);
        previous = bottom;
    }
}

/// Test 8: PcS wave-type schedule
#[test]
fn pcs_wave_type_schedule() {
    let model = homogeneous_earth();
    let waves = PhaseWaveTypeModel::new(
        "PcS",
        "PSLOWNESS, CMB, SSLOWNESS",
        &model,
        &InterfaceAliases::new(),
    )
    .unwrap();
    assert_eq!(waves.size(), 1);
    let p = model.attribute_index("PSLOWNESS").unwrap();
    let s = model.attribute_index("SSLOWNESS").unwrap();
    let cmb = model.layer_index("CMB").unwrap();
    let m660 = model.layer_index("M660").unwrap();

    let mut tracker = PhaseWaveTypeTracker::new(Arc::new(waves));
    let traversal = [m660, m660, cmb, m660];
    let run = |tracker: &mut PhaseWaveTypeTracker| -> Vec<usize> {
        traversal
            .iter()
            .map(|&layer| tracker.update_next_wave_speed_index(layer))
            .collect()
    };
    let first = run(&mut tracker);
    assert_eq!(first, vec![p, p, s, s]);
    tracker.reset_index();
    assert_eq!(tracker.index(), 1);
    assert_eq!(run(&mut tracker), first);
}

/// Test 9: Binary round trip of computed results with weights and derivatives
#[test]
fn computed_results_round_trip_through_a_file() {
    let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
    let options = RayInfoOptions {
        path: true,
        weights: true,
        derivatives: true,
    };
    let requests: Vec<RayRequest> = ["P", "PcP", "Pdiff"]
        .iter()
        .map(|phase| {
            RayRequest::new(GeoPoint::new(5.0, 0.0, 10.0), GeoPoint::new(-5.0, 60.0, 0.0), phase)
                .with_options(options)
        })
        .collect();
    let results = bender.compute_rays(&requests).unwrap();
    assert!(!results[0].weights.is_empty());
    assert!(results[0].attributes.contains_key("DTT_DLAT"));
    assert_eq!(results[2].ray_type, RayType::Invalid);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rays.bin");
    io::write_ray_infos(&path, &results).unwrap();
    let back = io::read_ray_infos(&path).unwrap();
    assert_eq!(back.len(), results.len());
    for (a, b) in back.iter().zip(&results) {
        assert!(a.ray_path.is_none());
        let mut b = b.clone();
        b.ray_path = None;
        assert_eq!(*a, b);
    }
}

/// Test 10: Batch results do not depend on the thread count
#[test]
fn batch_is_deterministic_across_thread_counts() {
    let model = Arc::new(LayeredModel::reference_earth().unwrap());
    let requests: Vec<RayRequest> = [(25.0, "P"), (40.0, "PcP"), (55.0, "S"), (35.0, "ScS")]
        .iter()
        .map(|&(lon, phase)| {
            RayRequest::new(GeoPoint::new(0.0, 0.0, 15.0), GeoPoint::new(10.0, lon, 0.0), phase)
        })
        .collect();
    let one = Bender::new(Arc::clone(&model), coarse())
        .unwrap()
        .with_threads(1)
        .compute_rays(&requests)
        .unwrap();
    let four = Bender::new(model, coarse())
        .unwrap()
        .with_threads(4)
        .compute_rays(&requests)
        .unwrap();
    assert_eq!(one, four);
    for (info, request) in one.iter().zip(&requests) {
        assert_eq!(info.phase, request.phase);
    }
}
