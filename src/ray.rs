// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::branch::{BranchKind, BranchStatus, Node, NodeKind, NodeStatus, RayBranch, RayPath, RaySegment};
use crate::config::BenderConfig;
use crate::geometry;
use crate::model::LayeredModelPosition;
use crate::ray_info::RayType;
use crate::snell::{slowness_at, EvaluateSnellsLaw};
use crate::wave_type::PhaseWaveTypeTracker;

/// A ray endpoint: unit vector and radius in km.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayEndpoint {
    /// Direction from the Earth's centre.
    pub unit_vector: [f64; 3],
    /// Radius in km.
    pub radius: f64,
}

/// Shape of a candidate ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RayTopology {
    /// A single monotonic branch from source to receiver.
    Direct,
    /// Down to a turning point in `turning_layer`, then up.
    Refracted {
        /// Layer the ray turns in.
        turning_layer: usize,
        /// Initial turning depth in km.
        turning_depth: f64,
    },
    /// Down to the top of `interface`, reflect, then up.
    Reflected {
        /// Index of the layer topped by the reflecting interface.
        interface: usize,
        /// Unit vector of a reflection point that must not move.
        fixed_bounce: Option<[f64; 3]>,
    },
    /// Up to the underside of `surface`, reflect, then refract to the receiver.
    DepthPhase {
        /// Index of the layer topped by the surface.
        surface: usize,
        /// Layer the ray turns in after the bounce.
        turning_layer: usize,
        /// Initial turning depth in km.
        turning_depth: f64,
        /// Unit vector of a bounce point that must not move.
        fixed_bounce: Option<[f64; 3]>,
    },
    /// Down to the top of `interface`, along it, then up.
    Diffracted {
        /// Index of the layer topped by the diffracting interface.
        interface: usize,
    },
}

/// Result of relaxing one ray.
#[derive(Clone, Debug, PartialEq)]
pub enum RayOutcome {
    /// The ray satisfies Snell's law everywhere within tolerance.
    Converged,
    /// The ray is geometrically inadmissible for its phase.
    Invalid(String),
    /// Relaxation failed numerically.
    Error(String),
}

impl RayOutcome {
    /// Whether the ray converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, RayOutcome::Converged)
    }
}

/// Per-ray diagnostic log with a bounded rendered length.
#[derive(Clone, Debug, Default)]
pub struct StatusLog {
    max_len: usize,
    lines: Vec<String>,
}

impl StatusLog {
    /// Empty log rendering to at most `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        StatusLog {
            max_len,
            lines: Vec::new(),
        }
    }

    /// Append a line.
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Whether nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The log as one string. When longer than the bound, the middle is cut
    /// and the head and tail kept.
    pub fn message(&self) -> String {
        const MARK: &str = "\n...\n";
        let text = self.lines.join("\n");
        if text.len() <= self.max_len {
            return text;
        }
        if self.max_len < MARK.len() {
            let mut end = self.max_len;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            return text[..end].to_string();
        }
        let keep = (self.max_len - MARK.len()) / 2;
        let mut head = keep;
        while !text.is_char_boundary(head) {
            head -= 1;
        }
        let mut tail = text.len() - keep;
        while !text.is_char_boundary(tail) {
            tail += 1;
        }
        format!("{}{}{}", &text[..head], MARK, &text[tail..])
    }
}

#[derive(Clone, Debug)]
struct Settings {
    max_spacing: f64,
    min_spacing: f64,
    max_iterations: usize,
    tolerance: f64,
    depth_phase_tolerance: f64,
    min_diffraction_deg: f64,
    max_diffraction_deg: f64,
}

#[derive(Clone, Debug)]
struct Waypoint {
    node: Node,
}

impl Waypoint {
    fn new(unit_vector: [f64; 3], radius: f64, layer: usize, kind: NodeKind) -> Self {
        Waypoint {
            node: Node::new(unit_vector, radius, layer, kind),
        }
    }

    fn on_interface(mut self, interface: usize) -> Self {
        self.node.interface = Some(interface);
        self
    }
}

#[derive(Clone, Debug)]
struct Piece {
    first: usize,
    last: usize,
    layer: usize,
    along_interface: Option<usize>,
}

#[derive(Clone, Debug)]
struct Leg {
    kind: BranchKind,
    nodes: Vec<Node>,
    pieces: Vec<Piece>,
}

/// Parameter where a monotonic curve meets the top of `interface`.
fn crossing<P, F>(pos: &mut P, curve: &F, interface: usize, lo: f64) -> f64
where
    P: LayeredModelPosition,
    F: Fn(f64) -> ([f64; 3], f64),
{
    let mut gap = |t: f64| {
        let (u, r) = curve(t);
        pos.set(u, r);
        r - pos.layer_radius_top(interface)
    };
    let (mut a, mut b) = (lo, 1.0);
    let ga = gap(a);
    if ga == 0.0 {
        return a;
    }
    if ga * gap(b) > 0.0 {
        return b;
    }
    for _ in 0..60 {
        let mid = 0.5 * (a + b);
        if gap(mid) * ga > 0.0 {
            a = mid;
        } else {
            b = mid;
        }
    }
    0.5 * (a + b)
}

/// Initial nodes of a monotonic leg between two waypoints.
///
/// The leg follows the straight chord when radius varies monotonically along
/// it, otherwise a curve linear in angle and radius.
fn monotonic_leg<P: LayeredModelPosition>(
    pos: &mut P,
    a: &Waypoint,
    b: &Waypoint,
    spacing: f64,
) -> Result<Leg, String> {
    let (ua, ra, la) = (a.node.unit_vector, a.node.radius, a.node.layer);
    let (ub, rb, lb) = (b.node.unit_vector, b.node.radius, b.node.layer);
    let xa = geometry::to_cartesian(ua, ra);
    let xb = geometry::to_cartesian(ub, rb);
    let d = geometry::sub(xb, xa);
    let dd = geometry::dot(d, d);
    let chord = geometry::dot(xa, d) * geometry::dot(xb, d) >= -1e-9 * dd * dd;
    let curve = |t: f64| {
        if chord {
            geometry::from_cartesian(geometry::lerp(xa, xb, t))
        } else {
            (geometry::slerp(ua, ub, t), ra + t * (rb - ra))
        }
    };

    let down = rb < ra;
    let layers: Vec<usize> = if down {
        if lb > la {
            return Err(format!("down-going leg cannot climb from layer {} to {}", la, lb));
        }
        (lb..=la).rev().collect()
    } else {
        if lb < la {
            return Err(format!("up-going leg cannot descend from layer {} to {}", la, lb));
        }
        (la..=lb).collect()
    };

    let mut ts = vec![0.0];
    let mut interfaces = Vec::with_capacity(layers.len());
    for pair in layers.windows(2) {
        let interface = pair[0].min(pair[1]);
        let lo = ts[ts.len() - 1];
        ts.push(crossing(pos, &curve, interface, lo));
        interfaces.push(interface);
    }
    ts.push(1.0);

    let mut nodes = vec![a.node.clone()];
    let mut pieces = Vec::with_capacity(layers.len());
    for (k, &layer) in layers.iter().enumerate() {
        let (t0, t1) = (ts[k], ts[k + 1]);
        let first = nodes.len() - 1;
        let (u1, r1) = curve(t1);
        let end = geometry::to_cartesian(u1, r1);
        let n = (geometry::distance(nodes[first].position(), end) / spacing)
            .ceil()
            .max(1.0) as usize;
        for i in 1..n {
            let (u, r) = curve(t0 + (t1 - t0) * i as f64 / n as f64);
            nodes.push(Node::new(u, r, layer, NodeKind::Interior));
        }
        if k + 1 < layers.len() {
            let interface = interfaces[k];
            pos.set(u1, r1);
            let r = pos.layer_radius_top(interface);
            nodes.push(Node::new(u1, r, interface, NodeKind::Interface).on_interface(interface));
        } else {
            nodes.push(b.node.clone());
        }
        pieces.push(Piece {
            first,
            last: nodes.len() - 1,
            layer,
            along_interface: None,
        });
    }

    Ok(Leg {
        kind: if down {
            BranchKind::DownGoing
        } else {
            BranchKind::UpGoing
        },
        nodes,
        pieces,
    })
}

/// Leg running along the top of `interface` between two edge waypoints.
fn diffracted_leg<P: LayeredModelPosition>(
    pos: &mut P,
    a: &Waypoint,
    b: &Waypoint,
    interface: usize,
    spacing: f64,
) -> Leg {
    let (ua, ub) = (a.node.unit_vector, b.node.unit_vector);
    let arc = geometry::angle(ua, ub) * a.node.radius;
    let n = (arc / spacing).ceil().max(1.0) as usize;
    let mut nodes = vec![a.node.clone()];
    for i in 1..n {
        let u = geometry::slerp(ua, ub, i as f64 / n as f64);
        pos.set(u, a.node.radius);
        let r = pos.layer_radius_top(interface);
        nodes.push(Node::new(u, r, a.node.layer, NodeKind::Diffraction).on_interface(interface));
    }
    nodes.push(b.node.clone());
    Leg {
        kind: BranchKind::Diffraction,
        pieces: vec![Piece {
            first: 0,
            last: nodes.len() - 1,
            layer: a.node.layer,
            along_interface: Some(interface),
        }],
        nodes,
    }
}

/// Mirror image of a leg across the plane with unit normal `normal`, traversed
/// in reverse and ending at `end`.
fn mirrored_leg<P: LayeredModelPosition>(
    pos: &mut P,
    donor: &Leg,
    normal: [f64; 3],
    end: &Waypoint,
) -> Leg {
    let last = donor.nodes.len() - 1;
    let mut nodes: Vec<Node> = donor
        .nodes
        .iter()
        .rev()
        .map(|node| {
            let x = node.position();
            let reflected = geometry::sub(x, geometry::scale(normal, 2.0 * geometry::dot(x, normal)));
            let (u, mut r) = geometry::from_cartesian(reflected);
            if let Some(interface) = node.interface {
                pos.set(u, r);
                r = pos.layer_radius_top(interface);
            }
            let mut mirrored = node.clone();
            mirrored.unit_vector = u;
            mirrored.radius = r;
            mirrored
        })
        .collect();
    nodes[0] = donor.nodes[last].clone();
    nodes[last] = end.node.clone();
    let pieces = donor
        .pieces
        .iter()
        .rev()
        .map(|p| Piece {
            first: last - p.last,
            last: last - p.first,
            layer: p.layer,
            along_interface: p.along_interface,
        })
        .collect();
    Leg {
        kind: match donor.kind {
            BranchKind::DownGoing => BranchKind::UpGoing,
            BranchKind::UpGoing => BranchKind::DownGoing,
            other => other,
        },
        nodes,
        pieces,
    }
}

/// Concatenate legs into a path, assigning wave types in traversal order.
fn assemble(legs: Vec<Leg>, tracker: &mut PhaseWaveTypeTracker) -> (RayPath, Vec<RayBranch>) {
    let mut path = RayPath::default();
    let mut branches = Vec::with_capacity(legs.len() * 2);
    let mut wave = tracker.current_attribute();

    for (li, leg) in legs.iter().enumerate() {
        let offset = if li == 0 {
            path.nodes.push(leg.nodes[0].clone());
            0
        } else {
            path.nodes.len() - 1
        };
        let junction = &leg.nodes[0];
        if li > 0 && matches!(junction.kind, NodeKind::Bounce | NodeKind::FixedBounce) {
            if let Some(interface) = junction.interface {
                wave = tracker.update_next_wave_speed_index(interface);
            }
            let kind = if junction.kind == NodeKind::FixedBounce {
                BranchKind::FixedReflection
            } else {
                BranchKind::Reflection
            };
            let at = path.segments.len();
            branches.push(RayBranch::new(kind, at..at));
        }

        let start = path.segments.len();
        for (pi, piece) in leg.pieces.iter().enumerate() {
            if pi > 0 {
                if let Some(interface) = leg.nodes[piece.first].interface {
                    wave = tracker.update_next_wave_speed_index(interface);
                }
            }
            path.nodes
                .extend(leg.nodes[piece.first + 1..=piece.last].iter().cloned());
            let mut segment =
                RaySegment::new(piece.layer, wave, offset + piece.first, offset + piece.last);
            segment.along_interface = piece.along_interface;
            path.segments.push(segment);
        }
        branches.push(RayBranch::new(leg.kind, start..path.segments.len()));
    }

    path.link_active();
    for branch in &mut branches {
        branch.status = BranchStatus::InitialGeometry;
    }
    (path, branches)
}

/// One candidate ray between a source and a receiver.
///
/// A ray owns its path arena and its branches, and is confined to one
/// thread. Per-ray failures are reported through [`RayOutcome`], never as
/// errors.
#[derive(Clone, Debug)]
pub struct Ray {
    source: RayEndpoint,
    receiver: RayEndpoint,
    topology: RayTopology,
    path: RayPath,
    branches: Vec<RayBranch>,
    snell: EvaluateSnellsLaw,
    settings: Settings,
    current_bottom_layer: usize,
    iterations: usize,
    relaxation_iterations: usize,
    travel_time: f64,
    outcome: Option<RayOutcome>,
    log: StatusLog,
}

impl Ray {
    /// Build the initial geometry of a candidate. The wave-type tracker is
    /// reset first and then advanced along the new path. Geometrically
    /// impossible candidates are built anyway and report
    /// [`RayOutcome::Invalid`] from [`Ray::optimize`].
    pub fn new<P: LayeredModelPosition>(
        source: RayEndpoint,
        receiver: RayEndpoint,
        topology: RayTopology,
        tracker: &mut PhaseWaveTypeTracker,
        pos: &mut P,
        config: &BenderConfig,
    ) -> Ray {
        tracker.reset_index();
        let mut ray = Ray {
            source,
            receiver,
            topology,
            path: RayPath::default(),
            branches: Vec::new(),
            snell: EvaluateSnellsLaw::new(config),
            settings: Settings {
                max_spacing: config.max_node_spacing_km,
                min_spacing: config.min_node_spacing_km,
                max_iterations: config.max_iterations,
                tolerance: config.convergence_tolerance,
                depth_phase_tolerance: config.depth_phase_tolerance_km,
                min_diffraction_deg: config.min_diffraction_deg,
                max_diffraction_deg: config.max_diffraction_deg,
            },
            current_bottom_layer: 0,
            iterations: 0,
            relaxation_iterations: 0,
            travel_time: f64::NAN,
            outcome: None,
            log: StatusLog::new(config.status_log_max_len),
        };
        ray.log.push(format!("{:?}", topology));
        match ray.build_legs(pos) {
            Ok(legs) => {
                let (path, branches) = assemble(legs, tracker);
                ray.path = path;
                ray.branches = branches;
                ray.current_bottom_layer = ray.path.nodes[ray.path.deepest_node()].layer;
                ray.log.push(format!(
                    "initial geometry: {} nodes, {} segments, {} branches",
                    ray.path.nodes.len(),
                    ray.path.segments.len(),
                    ray.branches.len()
                ));
            }
            Err(reason) => {
                ray.log.push(reason.clone());
                ray.outcome = Some(RayOutcome::Invalid(reason));
            }
        }
        ray
    }

    fn endpoint_waypoint<P: LayeredModelPosition>(
        pos: &mut P,
        endpoint: &RayEndpoint,
        kind: NodeKind,
    ) -> (Waypoint, f64) {
        pos.set(endpoint.unit_vector, endpoint.radius);
        let depth = pos.depth();
        (
            Waypoint::new(endpoint.unit_vector, endpoint.radius, pos.layer_index(), kind),
            depth,
        )
    }

    fn turning_waypoint<P: LayeredModelPosition>(
        pos: &mut P,
        unit_vector: [f64; 3],
        layer: usize,
        depth: f64,
    ) -> Waypoint {
        pos.set(unit_vector, 0.0);
        let top = pos.layer_radius_top(layer);
        let bottom = pos.layer_radius_bottom(layer);
        let radius = (pos.surface_radius() - depth).clamp(bottom, top);
        Waypoint::new(unit_vector, radius, layer, NodeKind::Turning)
    }

    fn interface_waypoint<P: LayeredModelPosition>(
        pos: &mut P,
        unit_vector: [f64; 3],
        interface: usize,
        layer: usize,
        kind: NodeKind,
    ) -> Waypoint {
        pos.set(unit_vector, 0.0);
        let radius = pos.layer_radius_top(interface);
        Waypoint::new(unit_vector, radius, layer, kind).on_interface(interface)
    }

    fn build_legs<P: LayeredModelPosition>(&self, pos: &mut P) -> Result<Vec<Leg>, String> {
        let spacing = self.settings.max_spacing;
        let (src, ds) = Self::endpoint_waypoint(pos, &self.source, NodeKind::Source);
        let (rcv, dr) = Self::endpoint_waypoint(pos, &self.receiver, NodeKind::Receiver);
        let (us, ur) = (self.source.unit_vector, self.receiver.unit_vector);
        let n_layers = pos.n_layers();

        match self.topology {
            RayTopology::Direct => Ok(vec![monotonic_leg(pos, &src, &rcv, spacing)?]),

            RayTopology::Refracted {
                turning_layer,
                turning_depth,
            } => {
                if turning_depth <= ds.max(dr) {
                    return Err(format!(
                        "turning depth {:.1} km is not below both endpoints",
                        turning_depth
                    ));
                }
                let f = ((turning_depth - ds) / (2.0 * turning_depth - ds - dr)).clamp(0.05, 0.95);
                let turn =
                    Self::turning_waypoint(pos, geometry::slerp(us, ur, f), turning_layer, turning_depth);
                let down = monotonic_leg(pos, &src, &turn, spacing)?;
                let symmetric = (self.source.radius - self.receiver.radius).abs() < 1e-9
                    && geometry::angle(us, ur) > 1e-9;
                let up = if symmetric {
                    let normal = geometry::normalize(geometry::sub(ur, us));
                    mirrored_leg(pos, &down, normal, &rcv)
                } else {
                    monotonic_leg(pos, &turn, &rcv, spacing)?
                };
                Ok(vec![down, up])
            }

            RayTopology::Reflected {
                interface,
                fixed_bounce,
            } => {
                let side = interface + 1;
                if side >= n_layers || src.node.layer < side || rcv.node.layer < side {
                    return Err(format!(
                        "endpoints must lie above interface {} for a top-side reflection",
                        interface
                    ));
                }
                let height = |pos: &mut P, e: &RayEndpoint| {
                    pos.set(e.unit_vector, e.radius);
                    e.radius - pos.layer_radius_top(interface)
                };
                let hs = height(&mut *pos, &self.source);
                let hr = height(&mut *pos, &self.receiver);
                let (u, kind) = match fixed_bounce {
                    Some(u) => (u, NodeKind::FixedBounce),
                    None => {
                        let f = if hs + hr > 0.0 { hs / (hs + hr) } else { 0.5 };
                        (geometry::slerp(us, ur, f), NodeKind::Bounce)
                    }
                };
                let bounce = Self::interface_waypoint(pos, u, interface, side, kind);
                Ok(vec![
                    monotonic_leg(pos, &src, &bounce, spacing)?,
                    monotonic_leg(pos, &bounce, &rcv, spacing)?,
                ])
            }

            RayTopology::DepthPhase {
                surface,
                turning_layer,
                turning_depth,
                fixed_bounce,
            } => {
                if ds < 1e-3 {
                    return Err("source at the surface has no depth phase".to_string());
                }
                if src.node.layer > surface {
                    return Err(format!("source lies above interface {}", surface));
                }
                if turning_depth <= ds.max(dr) {
                    return Err(format!(
                        "turning depth {:.1} km is not below both endpoints",
                        turning_depth
                    ));
                }
                let (u, kind) = match fixed_bounce {
                    Some(u) => (u, NodeKind::FixedBounce),
                    None => (
                        geometry::slerp(us, ur, ds / (ds + 2.0 * turning_depth)),
                        NodeKind::Bounce,
                    ),
                };
                let bounce = Self::interface_waypoint(pos, u, surface, surface, kind);
                let f = (turning_depth / (2.0 * turning_depth - dr)).clamp(0.05, 0.95);
                let turn = Self::turning_waypoint(
                    pos,
                    geometry::slerp(u, ur, f),
                    turning_layer,
                    turning_depth,
                );
                Ok(vec![
                    monotonic_leg(pos, &src, &bounce, spacing)?,
                    monotonic_leg(pos, &bounce, &turn, spacing)?,
                    monotonic_leg(pos, &turn, &rcv, spacing)?,
                ])
            }

            RayTopology::Diffracted { interface } => {
                let side = interface + 1;
                if side >= n_layers || src.node.layer < side || rcv.node.layer < side {
                    return Err(format!(
                        "endpoints must lie above interface {} for a diffraction",
                        interface
                    ));
                }
                let delta = geometry::angle(us, ur);
                pos.set(geometry::slerp(us, ur, 0.5), 0.0);
                let rc = pos.layer_radius_top(interface);
                let theta_s = (rc / self.source.radius).min(1.0).acos();
                let theta_r = (rc / self.receiver.radius).min(1.0).acos();
                let arc = (delta - theta_s - theta_r).to_degrees();
                if arc < self.settings.min_diffraction_deg {
                    return Err(format!(
                        "diffracted leg of {:.3} deg is shorter than {:.3} deg",
                        arc, self.settings.min_diffraction_deg
                    ));
                }
                if arc > self.settings.max_diffraction_deg {
                    return Err(format!(
                        "diffracted leg of {:.3} deg exceeds {:.3} deg",
                        arc, self.settings.max_diffraction_deg
                    ));
                }
                let entry = Self::interface_waypoint(
                    pos,
                    geometry::slerp(us, ur, theta_s / delta),
                    interface,
                    side,
                    NodeKind::DiffractionEdge,
                );
                let exit = Self::interface_waypoint(
                    pos,
                    geometry::slerp(us, ur, (delta - theta_r) / delta),
                    interface,
                    side,
                    NodeKind::DiffractionEdge,
                );
                Ok(vec![
                    monotonic_leg(pos, &src, &entry, spacing)?,
                    diffracted_leg(pos, &entry, &exit, interface, spacing),
                    monotonic_leg(pos, &exit, &rcv, spacing)?,
                ])
            }
        }
    }

    fn sweep<P: LayeredModelPosition>(&mut self, pos: &mut P, even: bool) {
        if even {
            for branch in self.branches.iter_mut().rev() {
                branch.enforce_snells_law(&mut self.path, pos, &self.snell, true);
            }
        } else {
            for branch in self.branches.iter_mut() {
                branch.enforce_snells_law(&mut self.path, pos, &self.snell, false);
            }
        }
    }

    fn finish(&mut self, outcome: RayOutcome) -> RayOutcome {
        let status = match outcome {
            RayOutcome::Converged => BranchStatus::Converged,
            RayOutcome::Invalid(_) => BranchStatus::Invalid,
            RayOutcome::Error(_) => BranchStatus::Error,
        };
        for branch in &mut self.branches {
            branch.status = status;
        }
        match &outcome {
            RayOutcome::Converged => self.log.push(format!(
                "converged: tt {:.4} s after {} sweeps ({} relaxations)",
                self.travel_time, self.iterations, self.relaxation_iterations
            )),
            RayOutcome::Invalid(reason) => self.log.push(format!("invalid: {}", reason)),
            RayOutcome::Error(reason) => self.log.push(format!("error: {}", reason)),
        }
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Relax the ray to convergence.
    ///
    /// Each stage sweeps until the travel time changes by less than the
    /// tolerance; the node spacing is then halved and every segment
    /// resampled, down to the minimum spacing. Calling this again returns the
    /// stored outcome.
    pub fn optimize<P: LayeredModelPosition>(&mut self, pos: &mut P) -> RayOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let mut spacing = self.settings.max_spacing;
        let mut previous = self.path.travel_time(pos);

        loop {
            loop {
                let even = self.iterations % 2 == 0;
                self.sweep(pos, even);
                self.iterations += 1;

                let tt = self.path.travel_time(pos);
                if !tt.is_finite() || self.path.nodes.iter().any(|n| !n.is_finite()) {
                    let reason = format!("non-finite geometry after {} sweeps", self.iterations);
                    return self.finish(RayOutcome::Error(reason));
                }
                let change = (tt - previous).abs();
                previous = tt;
                if change < self.settings.tolerance {
                    break;
                }
                self.relaxation_iterations += 1;
                if self.iterations >= self.settings.max_iterations {
                    let reason = format!(
                        "no convergence after {} sweeps (last change {:.3e} s)",
                        self.iterations, change
                    );
                    return self.finish(RayOutcome::Error(reason));
                }
            }
            self.current_bottom_layer = self.path.nodes[self.path.deepest_node()].layer;
            self.log.push(format!(
                "spacing {:.1} km: tt {:.4} s, {} nodes, {} sweeps",
                spacing,
                previous,
                self.path.nodes.len(),
                self.iterations
            ));
            if 0.5 * spacing < self.settings.min_spacing {
                break;
            }
            spacing *= 0.5;
            self.path = self.path.resample(spacing, pos);
            previous = self.path.travel_time(pos);
        }

        self.travel_time = previous;
        let outcome = self.check_geometry(pos);
        self.finish(outcome)
    }

    fn check_geometry<P: LayeredModelPosition>(&self, pos: &mut P) -> RayOutcome {
        if matches!(
            self.topology,
            RayTopology::Refracted { .. } | RayTopology::DepthPhase { .. }
        ) {
            let node = &self.path.nodes[self.path.deepest_node()];
            if node.status == NodeStatus::Clamped {
                pos.set(node.unit_vector, node.radius);
                let side = if node.radius >= pos.layer_radius_top(node.layer) - 1e-9 {
                    "top"
                } else {
                    "bottom"
                };
                return RayOutcome::Invalid(format!(
                    "turning point pinned to the {} of layer {}",
                    side, node.layer
                ));
            }
        }
        if let RayTopology::DepthPhase { .. } = self.topology {
            let valid = self.branches.first().map_or(true, |b| {
                b.is_valid_depth_phase(&self.path, self.settings.depth_phase_tolerance)
            });
            if !valid {
                return RayOutcome::Invalid("depth phase leaves the source downward".to_string());
            }
        }
        if let RayTopology::Diffracted { .. } = self.topology {
            for branch in self.branches.iter().filter(|b| b.kind == BranchKind::Diffraction) {
                let arc = branch.arc_degrees(&self.path);
                if arc < self.settings.min_diffraction_deg || arc > self.settings.max_diffraction_deg {
                    return RayOutcome::Invalid(format!(
                        "diffracted leg of {:.3} deg outside [{:.3}, {:.3}] deg",
                        arc, self.settings.min_diffraction_deg, self.settings.max_diffraction_deg
                    ));
                }
            }
        }
        RayOutcome::Converged
    }

    /// Outcome of [`Ray::optimize`], or the construction verdict.
    pub fn outcome(&self) -> Option<&RayOutcome> {
        self.outcome.as_ref()
    }

    /// Candidate shape.
    pub fn topology(&self) -> RayTopology {
        self.topology
    }

    /// Ray classification reported in results.
    pub fn ray_type(&self) -> RayType {
        match self.outcome {
            Some(RayOutcome::Invalid(_)) => return RayType::Invalid,
            Some(RayOutcome::Error(_)) => return RayType::Error,
            _ => {}
        }
        match self.topology {
            RayTopology::Direct | RayTopology::Refracted { .. } | RayTopology::DepthPhase { .. } => {
                RayType::Refraction
            }
            RayTopology::Reflected { .. } => RayType::Reflection,
            RayTopology::Diffracted { .. } => RayType::Diffraction,
        }
    }

    /// Node and segment arena.
    pub fn path(&self) -> &RayPath {
        &self.path
    }

    /// Branches from source to receiver.
    pub fn branches(&self) -> &[RayBranch] {
        &self.branches
    }

    /// Source endpoint.
    pub fn source(&self) -> &RayEndpoint {
        &self.source
    }

    /// Receiver endpoint.
    pub fn receiver(&self) -> &RayEndpoint {
        &self.receiver
    }

    /// Travel time in seconds; NaN before convergence.
    pub fn travel_time(&self) -> f64 {
        self.travel_time
    }

    /// Total relaxation sweeps performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Sweeps that changed the travel time by at least the tolerance.
    pub fn relaxation_iterations(&self) -> usize {
        self.relaxation_iterations
    }

    /// Layer of the deepest node.
    pub fn bottom_layer(&self) -> usize {
        self.current_bottom_layer
    }

    /// Epicentral distance in degrees.
    pub fn distance_degrees(&self) -> f64 {
        geometry::angle(self.source.unit_vector, self.receiver.unit_vector).to_degrees()
    }

    /// Azimuth from source to receiver in degrees.
    pub fn azimuth(&self) -> f64 {
        geometry::azimuth(self.source.unit_vector, self.receiver.unit_vector)
    }

    /// Azimuth from receiver to source in degrees.
    pub fn back_azimuth(&self) -> f64 {
        geometry::azimuth(self.receiver.unit_vector, self.source.unit_vector)
    }

    /// Depth of the deepest node in km.
    pub fn turning_depth<P: LayeredModelPosition>(&self, pos: &mut P) -> f64 {
        self.path
            .nodes
            .iter()
            .map(|n| {
                pos.set(n.unit_vector, n.radius);
                pos.depth()
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Path length in km.
    pub fn path_length(&self) -> f64 {
        self.path.length()
    }

    /// Unit direction in which the ray leaves the source and the slowness
    /// there, or `None` for a degenerate path.
    pub fn takeoff<P: LayeredModelPosition>(&self, pos: &mut P) -> Option<([f64; 3], f64)> {
        let segment = self.path.segments.iter().find(|s| s.active)?;
        let x0 = self.path.nodes[0].position();
        let x1 = self.path.nodes[segment.first + 1].position();
        let direction = geometry::normalize(geometry::sub(x1, x0));
        if geometry::norm(direction) == 0.0 {
            return None;
        }
        Some((direction, slowness_at(pos, x0, segment.layer, segment.wave)))
    }

    /// Diagnostic log.
    pub fn status_log(&self) -> &StatusLog {
        &self.log
    }
}
