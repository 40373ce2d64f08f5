// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ray_bender::bender::{Bender, RayRequest};
use ray_bender::config::BenderConfig;
use ray_bender::geometry::GeoPoint;
use ray_bender::model::LayeredModel;

fn make_bender(threads: usize) -> Bender {
    let model = Arc::new(LayeredModel::reference_earth().unwrap());
    Bender::new(model, BenderConfig::default())
        .unwrap()
        .with_threads(threads)
}

fn make_requests(n: usize, phase: &str) -> Vec<RayRequest> {
    (0..n)
        .map(|i| {
            let lon = 20.0 + 60.0 * i as f64 / n.max(1) as f64;
            RayRequest::new(
                GeoPoint::new(0.0, 0.0, 10.0),
                GeoPoint::new(5.0, lon, 0.0),
                phase,
            )
        })
        .collect()
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Single ray baseline per phase family.
fn bench_single_ray(c: &mut Criterion) {
    let bender = make_bender(1);
    let mut pos = bender.model().position();
    for phase in ["P", "PcP", "pP", "Pdiff"] {
        let request = RayRequest::new(
            GeoPoint::new(0.0, 0.0, 50.0),
            GeoPoint::new(0.0, if phase == "Pdiff" { 120.0 } else { 60.0 }, 0.0),
            phase,
        );
        c.bench_function(&format!("single_{}", phase), |b| {
            b.iter(|| black_box(bender.compute_ray(&request, &mut pos).unwrap()));
        });
    }
}

/// Thread scaling: a batch of P rays with varying thread counts.
fn bench_thread_scaling(c: &mut Criterion) {
    let requests = make_requests(64, "P");
    let cpus = num_cpus();
    let mut group = c.benchmark_group("batch_64_P");
    group.sample_size(10);
    for &threads in &[1, 2, 4, 8] {
        if threads <= cpus {
            let bender = make_bender(threads);
            group.bench_function(format!("{}threads", threads), |b| {
                b.iter(|| black_box(bender.compute_rays(&requests).unwrap()));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_single_ray, bench_thread_scaling);
criterion_main!(benches);
