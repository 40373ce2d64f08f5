// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::BenderConfig;
use crate::error::{BenderError, Result};
use crate::geometry::{self, GeoPoint};
use crate::model::{LayeredModel, LayeredModelPosition, ModelPosition};
use crate::phase::{Phase, PhaseKind};
use crate::phase_level::{PhaseLayerLevelBuilder, PhaseLayerLevelDefinition};
use crate::ray::{Ray, RayEndpoint, RayOutcome, RayTopology, StatusLog};
use crate::ray_info::{RayInfo, RayInfoOptions, RayType};
use crate::wave_type::{resolve_interface, PhaseWaveTypeModel, PhaseWaveTypeTracker};

/// Progress information passed to the optional callback.
#[derive(Clone, Debug)]
pub struct ProgressInfo {
    /// Number of rays finished so far.
    pub rays_completed: u64,
    /// Requests not yet picked up by a worker.
    pub queued: usize,
    /// Number of worker threads currently computing a ray.
    pub in_flight: usize,
    /// Elapsed time since the batch started.
    pub elapsed: Duration,
}

/// One source-receiver-phase request.
#[derive(Clone, Debug, PartialEq)]
pub struct RayRequest {
    /// Source location.
    pub source: GeoPoint,
    /// Receiver location.
    pub receiver: GeoPoint,
    /// Phase name.
    pub phase: String,
    /// Latitude and longitude of a fixed bounce point.
    pub fixed_bounce: Option<(f64, f64)>,
    /// Optional outputs.
    pub options: RayInfoOptions,
}

impl RayRequest {
    /// Request with default outputs.
    pub fn new(source: GeoPoint, receiver: GeoPoint, phase: &str) -> Self {
        RayRequest {
            source,
            receiver,
            phase: phase.to_string(),
            fixed_bounce: None,
            options: RayInfoOptions::default(),
        }
    }

    /// Set the optional outputs (builder method).
    pub fn with_options(mut self, options: RayInfoOptions) -> Self {
        self.options = options;
        self
    }

    /// Pin the reflection point of a reflected or depth phase (builder method).
    pub fn with_fixed_bounce(mut self, lat: f64, lon: f64) -> Self {
        self.fixed_bounce = Some((lat, lon));
        self
    }
}

/// Shared cache of layer-level definitions (by interface) and wave-type
/// models (by phase), built on first use.
#[derive(Debug, Default)]
pub struct PhaseCache {
    levels: RwLock<HashMap<String, Arc<PhaseLayerLevelDefinition>>>,
    waves: RwLock<HashMap<String, Arc<PhaseWaveTypeModel>>>,
}

impl PhaseCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Level definition for `interface`, built on first request. Names are
    /// matched case-insensitively.
    pub fn level_definition(
        &self,
        interface: &str,
        model: &LayeredModel,
        config: &BenderConfig,
    ) -> Result<Arc<PhaseLayerLevelDefinition>> {
        let key = interface.trim().to_ascii_uppercase();
        if let Some(definition) = self.levels.read().get(&key) {
            return Ok(Arc::clone(definition));
        }
        let mut levels = self.levels.write();
        if let Some(definition) = levels.get(&key) {
            return Ok(Arc::clone(definition));
        }
        let definition = Arc::new(PhaseLayerLevelBuilder::new(model, config).build(&key)?);
        levels.insert(key, Arc::clone(&definition));
        Ok(definition)
    }

    /// Wave-type model of `phase`, built on first request.
    pub fn wave_types(
        &self,
        phase: &Phase,
        model: &LayeredModel,
        config: &BenderConfig,
    ) -> Result<Arc<PhaseWaveTypeModel>> {
        if let Some(waves) = self.waves.read().get(phase.name) {
            return Ok(Arc::clone(waves));
        }
        let mut map = self.waves.write();
        if let Some(waves) = map.get(phase.name) {
            return Ok(Arc::clone(waves));
        }
        let waves = Arc::new(PhaseWaveTypeModel::new(
            phase.name,
            phase.wave_spec,
            model,
            &config.interface_aliases,
        )?);
        map.insert(phase.name.to_string(), Arc::clone(&waves));
        Ok(waves)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.levels.read().len() + self.waves.read().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.levels.write().clear();
        self.waves.write().clear();
    }
}

/// Two-point ray bender over one Earth model.
pub struct Bender {
    model: Arc<LayeredModel>,
    config: BenderConfig,
    cache: PhaseCache,
    num_threads: Option<usize>,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl Bender {
    /// Create a bender for `model`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(model: Arc<LayeredModel>, config: BenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Bender {
            model,
            config,
            cache: PhaseCache::new(),
            num_threads: None,
            progress_callback: None,
        })
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads.max(1));
        self
    }

    /// Set a progress callback invoked about every 500ms during
    /// [`Bender::compute_rays`] (builder method).
    pub fn with_progress(mut self, callback: Box<dyn Fn(ProgressInfo) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// The Earth model.
    pub fn model(&self) -> &Arc<LayeredModel> {
        &self.model
    }

    /// The configuration.
    pub fn config(&self) -> &BenderConfig {
        &self.config
    }

    /// The phase cache.
    pub fn cache(&self) -> &PhaseCache {
        &self.cache
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn check_location(&self, point: &GeoPoint, pos: &mut ModelPosition) -> Result<f64> {
        let invalid = |reason: &str| BenderError::InvalidLocation {
            lat: point.lat,
            lon: point.lon,
            depth: point.depth,
            reason: reason.to_string(),
        };
        if !(point.lat.is_finite() && point.lon.is_finite() && point.depth.is_finite()) {
            return Err(invalid("coordinates must be finite"));
        }
        if !(-90.0..=90.0).contains(&point.lat) {
            return Err(invalid("latitude outside [-90, 90]"));
        }
        if point.depth < -10.0 {
            return Err(invalid("more than 10 km above the surface"));
        }
        pos.set(point.unit_vector(), 0.0);
        let radius = pos.surface_radius() - point.depth;
        if radius <= 0.0 {
            return Err(invalid("deeper than the model"));
        }
        Ok(radius)
    }

    fn interface(&self, name: &str) -> Result<usize> {
        resolve_interface(&self.model, name, &self.config.interface_aliases).ok_or_else(|| {
            BenderError::UnknownInterface {
                names: vec![name.to_string()],
            }
        })
    }

    /// Candidate topologies in search order. Refracted candidates carry the
    /// layer they turn in so later sub-levels of a converged layer are skipped.
    fn candidates(
        &self,
        phase: &Phase,
        request: &RayRequest,
        source: &RayEndpoint,
        receiver: &RayEndpoint,
    ) -> Result<Vec<(Option<usize>, RayTopology)>> {
        let fixed_bounce = request
            .fixed_bounce
            .map(|(lat, lon)| geometry::from_lat_lon(lat, lon));
        if fixed_bounce.is_some()
            && !matches!(phase.kind, PhaseKind::Reflected | PhaseKind::DepthPhase)
        {
            return Err(BenderError::InvalidLocation {
                lat: request.fixed_bounce.map_or(f64::NAN, |b| b.0),
                lon: request.fixed_bounce.map_or(f64::NAN, |b| b.1),
                depth: 0.0,
                reason: format!("phase {} has no bounce point", phase.name),
            });
        }
        let event = || {
            phase
                .event_interface
                .ok_or_else(|| BenderError::Other(format!("phase {} has no event interface", phase.name)))
                .and_then(|name| self.interface(name))
        };

        let distance = geometry::angle(source.unit_vector, receiver.unit_vector).to_degrees();
        let deepest_endpoint = request.source.depth.max(request.receiver.depth);
        let turning_levels = || -> Result<Vec<(usize, f64)>> {
            let definition =
                self.cache
                    .level_definition(phase.level_interface, &self.model, &self.config)?;
            Ok(definition
                .candidate_levels(distance)
                .iter()
                .filter(|level| level.depth > deepest_endpoint)
                .map(|level| (level.layer, level.depth))
                .collect())
        };

        let mut candidates = Vec::new();
        match phase.kind {
            PhaseKind::Refracted => {
                if (source.radius - receiver.radius).abs() > 1e-9 {
                    candidates.push((None, RayTopology::Direct));
                }
                for (layer, depth) in turning_levels()? {
                    candidates.push((
                        Some(layer),
                        RayTopology::Refracted {
                            turning_layer: layer,
                            turning_depth: depth,
                        },
                    ));
                }
            }
            PhaseKind::DepthPhase => {
                let surface = event()?;
                for (layer, depth) in turning_levels()? {
                    candidates.push((
                        Some(layer),
                        RayTopology::DepthPhase {
                            surface,
                            turning_layer: layer,
                            turning_depth: depth,
                            fixed_bounce,
                        },
                    ));
                }
            }
            PhaseKind::Reflected => candidates.push((
                None,
                RayTopology::Reflected {
                    interface: event()?,
                    fixed_bounce,
                },
            )),
            PhaseKind::Diffracted => candidates.push((
                None,
                RayTopology::Diffracted {
                    interface: event()?,
                },
            )),
        }
        Ok(candidates)
    }

    /// Compute the fastest admissible ray for one request.
    ///
    /// Rays without an admissible or converged solution are returned as
    /// [`RayType::Invalid`] or [`RayType::Error`] results.
    ///
    /// # Errors
    /// Returns an error for an unknown phase, an unusable location or an
    /// interface the model does not define.
    pub fn compute_ray(&self, request: &RayRequest, pos: &mut ModelPosition) -> Result<RayInfo> {
        let phase = Phase::from_name(&request.phase)?;
        let source = RayEndpoint {
            unit_vector: request.source.unit_vector(),
            radius: self.check_location(&request.source, pos)?,
        };
        let receiver = RayEndpoint {
            unit_vector: request.receiver.unit_vector(),
            radius: self.check_location(&request.receiver, pos)?,
        };
        let waves = self.cache.wave_types(&phase, &self.model, &self.config)?;
        let mut tracker = PhaseWaveTypeTracker::new(waves);
        let candidates = self.candidates(&phase, request, &source, &receiver)?;

        let mut best: Option<Ray> = None;
        let mut converged_layer = None;
        let mut reasons = StatusLog::new(self.config.status_log_max_len);
        let mut numerical_failure = false;
        for (layer, topology) in candidates {
            if layer.is_some() && layer == converged_layer {
                continue;
            }
            let mut ray = Ray::new(source, receiver, topology, &mut tracker, pos, &self.config);
            let outcome = ray.optimize(pos);
            debug!(
                phase = phase.name,
                topology = ?topology,
                outcome = ?outcome,
                travel_time = ray.travel_time(),
                iterations = ray.iterations(),
                "candidate ray"
            );
            match outcome {
                RayOutcome::Converged => {
                    converged_layer = layer;
                    if best
                        .as_ref()
                        .map_or(true, |b| ray.travel_time() < b.travel_time())
                    {
                        best = Some(ray);
                    }
                }
                RayOutcome::Invalid(reason) => reasons.push(format!("{:?}: {}", topology, reason)),
                RayOutcome::Error(reason) => {
                    numerical_failure = true;
                    reasons.push(format!("{:?}: {}", topology, reason));
                }
            }
        }

        if let Some(ray) = best {
            return Ok(RayInfo::from_ray(
                phase.name,
                &ray,
                pos,
                request.options,
                self.config.resample_spacing_km,
            ));
        }
        let ray_type = if numerical_failure {
            RayType::Error
        } else {
            RayType::Invalid
        };
        if reasons.is_empty() {
            reasons.push("no candidate rays at this distance");
        }
        warn!(
            phase = phase.name,
            distance = geometry::angle(source.unit_vector, receiver.unit_vector).to_degrees(),
            ray_type = %ray_type,
            "no candidate ray converged"
        );
        Ok(RayInfo::failed(
            phase.name,
            ray_type,
            &request.source,
            &request.receiver,
            reasons.message(),
        ))
    }

    /// Compute many rays in parallel. Results are returned in request order
    /// and do not depend on the number of threads.
    ///
    /// A request that [`Bender::compute_ray`] rejects (unknown phase, unusable
    /// location) yields a [`RayType::Invalid`] result carrying the error
    /// message; the rest of the batch is unaffected.
    ///
    /// # Errors
    /// Returns an error if the thread pool cannot be built.
    pub fn compute_rays(&self, requests: &[RayRequest]) -> Result<Vec<RayInfo>> {
        let queue = SegQueue::new();
        for index in 0..requests.len() {
            queue.push(index);
        }
        let results: Mutex<Vec<Option<RayInfo>>> =
            Mutex::new((0..requests.len()).map(|_| None).collect());

        let num_threads = self.get_num_threads().min(requests.len().max(1));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| BenderError::Other(e.to_string()))?;

        let in_flight = AtomicUsize::new(0);
        let completed = AtomicU64::new(0);
        let start_time = Instant::now();
        let last_progress = AtomicU64::new(0);

        pool.scope(|s| {
            for _ in 0..num_threads {
                s.spawn(|_| {
                    let mut pos = self.model.position();
                    while let Some(index) = queue.pop() {
                        in_flight.fetch_add(1, Ordering::AcqRel);
                        let request = &requests[index];
                        let info = self.compute_ray(request, &mut pos).unwrap_or_else(|e| {
                            warn!(index, phase = %request.phase, error = %e, "request rejected");
                            RayInfo::failed(
                                &request.phase,
                                RayType::Invalid,
                                &request.source,
                                &request.receiver,
                                e.to_string(),
                            )
                        });
                        results.lock()[index] = Some(info);
                        in_flight.fetch_sub(1, Ordering::AcqRel);
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;

                        if let Some(cb) = &self.progress_callback {
                            let elapsed_ms = start_time.elapsed().as_millis() as u64;
                            let last = last_progress.load(Ordering::Relaxed);
                            if elapsed_ms >= last + 500
                                && last_progress
                                    .compare_exchange(
                                        last,
                                        elapsed_ms,
                                        Ordering::Relaxed,
                                        Ordering::Relaxed,
                                    )
                                    .is_ok()
                            {
                                cb(ProgressInfo {
                                    rays_completed: done,
                                    queued: queue.len(),
                                    in_flight: in_flight.load(Ordering::Relaxed),
                                    elapsed: start_time.elapsed(),
                                });
                            }
                        }
                    }
                });
            }
        });

        info!(
            rays = requests.len(),
            threads = num_threads,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "ray batch complete"
        );

        results
            .into_inner()
            .into_iter()
            .enumerate()
            .map(|(index, info)| {
                info.ok_or_else(|| BenderError::Other(format!("request {} was not computed", index)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ray_info::NA_VALUE;
    use approx::assert_relative_eq;

    fn homogeneous_earth() -> Arc<LayeredModel> {
        Arc::new(
            LayeredModel::homogeneous(
                &[
                    ("CMB", 3479.5),
                    ("M660", 5711.0),
                    ("M410", 5961.0),
                    ("MOHO", 6336.0),
                    ("SURFACE", 6371.0),
                ],
                10.0,
                5.0,
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

    #[test]
    fn unknown_phase_is_an_error() {
        let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
        let mut pos = bender.model().position();
        let request = RayRequest::new(GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.0, 10.0, 0.0), "PKP");
        assert!(matches!(
            bender.compute_ray(&request, &mut pos),
            Err(BenderError::UnknownPhase(_))
        ));
    }

    #[test]
    fn bad_locations_are_rejected() {
        let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
        let mut pos = bender.model().position();
        for source in [
            GeoPoint::new(95.0, 0.0, 0.0),
            GeoPoint::new(0.0, f64::NAN, 0.0),
            GeoPoint::new(0.0, 0.0, -20.0),
            GeoPoint::new(0.0, 0.0, 7000.0),
        ] {
            let request = RayRequest::new(source, GeoPoint::new(0.0, 10.0, 0.0), "P");
            assert!(matches!(
                bender.compute_ray(&request, &mut pos),
                Err(BenderError::InvalidLocation { .. })
            ));
        }
    }

    #[test]
    fn fixed_bounce_needs_a_bounce() {
        let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
        let mut pos = bender.model().position();
        let request = RayRequest::new(GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.0, 10.0, 0.0), "P")
            .with_fixed_bounce(0.0, 5.0);
        assert!(bender.compute_ray(&request, &mut pos).is_err());
    }

    #[test]
    fn homogeneous_p_is_the_chord() {
        let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
        let mut pos = bender.model().position();
        let request = RayRequest::new(GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.0, 20.0, 0.0), "P");
        let info = bender.compute_ray(&request, &mut pos).unwrap();
        assert_eq!(info.ray_type, RayType::Refraction);
        let chord = 2.0 * 6371.0 * 10f64.to_radians().sin();
        assert_relative_eq!(info.travel_time, chord / 10.0, max_relative = 1e-3);
        assert_relative_eq!(info.distance, 20.0, epsilon = 1e-9);
        assert!(!bender.cache().is_empty());
        bender.cache().clear();
        assert!(bender.cache().is_empty());
    }

    #[test]
    fn pcp_with_fixed_bounce_stays_put() {
        let bender = Bender::new(homogeneous_earth(), coarse()).unwrap();
        let mut pos = bender.model().position();
        let request = RayRequest::new(GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.0, 30.0, 0.0), "PcP")
            .with_fixed_bounce(0.0, 10.0);
        let info = bender.compute_ray(&request, &mut pos).unwrap();
        assert_eq!(info.ray_type, RayType::Reflection);
        let bounce = geometry::to_cartesian(geometry::from_lat_lon(0.0, 10.0), 3479.5);
        let source = geometry::to_cartesian(geometry::from_lat_lon(0.0, 0.0), 6371.0);
        let receiver = geometry::to_cartesian(geometry::from_lat_lon(0.0, 30.0), 6371.0);
        let expected = (geometry::distance(source, bounce) + geometry::distance(bounce, receiver)) / 10.0;
        assert_relative_eq!(info.travel_time, expected, max_relative = 1e-4);
    }

    #[test]
    fn batch_preserves_order_and_reports_progress() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let bender = Bender::new(homogeneous_earth(), coarse())
            .unwrap()
            .with_threads(2)
            .with_progress(Box::new(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            }));
        let requests: Vec<RayRequest> = [10.0, 25.0, 40.0]
            .iter()
            .map(|&lon| {
                RayRequest::new(GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.0, lon, 0.0), "PcP")
            })
            .collect();
        let results = bender.compute_rays(&requests).unwrap();
        assert_eq!(results.len(), 3);
        for (info, lon) in results.iter().zip([10.0, 25.0, 40.0]) {
            assert_relative_eq!(info.distance, lon, epsilon = 1e-9);
        }
        assert!(results[0].travel_time < results[2].travel_time);
        assert!(calls.load(Ordering::Relaxed) <= 3);
    }

    #[test]
    fn rejected_requests_do_not_abort_the_batch() {
        let bender = Bender::new(homogeneous_earth(), coarse()).unwrap().with_threads(2);
        let source = GeoPoint::new(0.0, 0.0, 0.0);
        let requests = vec![
            RayRequest::new(source, GeoPoint::new(0.0, 20.0, 0.0), "PcP"),
            RayRequest::new(GeoPoint::new(95.0, 0.0, 0.0), GeoPoint::new(0.0, 20.0, 0.0), "PcP"),
            RayRequest::new(source, GeoPoint::new(0.0, 30.0, 0.0), "PcP"),
            RayRequest::new(source, GeoPoint::new(0.0, 30.0, 0.0), "PKP"),
        ];
        let results = bender.compute_rays(&requests).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].ray_type, RayType::Reflection);
        assert_eq!(results[2].ray_type, RayType::Reflection);
        assert!(results[0].travel_time < results[2].travel_time);

        assert_eq!(results[1].ray_type, RayType::Invalid);
        assert_eq!(results[1].travel_time, NA_VALUE);
        assert!(results[1].status_message.contains("latitude"));
        assert_eq!(results[3].ray_type, RayType::Invalid);
        assert_eq!(results[3].phase, "PKP");
        assert!(results[3].status_message.contains("PKP"));
    }

    #[test]
    fn level_cache_ignores_case() {
        let model = homogeneous_earth();
        let config = coarse();
        let cache = PhaseCache::new();
        let lower = cache.level_definition("m660", &model, &config).unwrap();
        let upper = cache.level_definition("M660", &model, &config).unwrap();
        assert!(Arc::ptr_eq(&lower, &upper));
        assert_eq!(cache.len(), 1);
    }
}
