// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::ops::{Range, RangeInclusive};

use crate::geometry;
use crate::model::LayeredModelPosition;
use crate::snell::{slowness_at, EvaluateSnellsLaw, Side};

/// Role of a node in the ray path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Ray start; never moves.
    Source,
    /// Ray end; never moves.
    Receiver,
    /// Free node inside a layer.
    Interior,
    /// Crossing of a layer interface.
    Interface,
    /// Deepest point of a refracted branch pair.
    Turning,
    /// Reflection point on an interface.
    Bounce,
    /// Reflection point held at a requested location.
    FixedBounce,
    /// Where a ray joins or leaves a diffracted leg.
    DiffractionEdge,
    /// Node of a diffracted leg, kept on the interface.
    Diffraction,
}

/// What the last relaxation sweep did to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not yet visited.
    Initial,
    /// Moved by the bending kernel.
    Bent,
    /// Placed by the Snell's-law search.
    Snell,
    /// Pinned against the top or bottom of its layer.
    Clamped,
    /// Never moves.
    Fixed,
}

/// A point of the ray path.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Direction from the Earth's centre.
    pub unit_vector: [f64; 3],
    /// Radius in km.
    pub radius: f64,
    /// Layer the node belongs to.
    pub layer: usize,
    /// Interface (index of the layer it tops) for nodes that sit on one.
    pub interface: Option<usize>,
    /// Role in the path.
    pub kind: NodeKind,
    /// Outcome of the last relaxation.
    pub status: NodeStatus,
}

impl Node {
    /// New node.
    pub fn new(unit_vector: [f64; 3], radius: f64, layer: usize, kind: NodeKind) -> Self {
        let status = match kind {
            NodeKind::Source | NodeKind::Receiver | NodeKind::FixedBounce => NodeStatus::Fixed,
            _ => NodeStatus::Initial,
        };
        Node {
            unit_vector,
            radius,
            layer,
            interface: None,
            kind,
            status,
        }
    }

    /// The same node sitting on an interface.
    pub fn on_interface(mut self, interface: usize) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Cartesian position in km.
    pub fn position(&self) -> [f64; 3] {
        geometry::to_cartesian(self.unit_vector, self.radius)
    }

    /// Whether every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.radius.is_finite() && self.unit_vector.iter().all(|c| c.is_finite())
    }
}

/// A run of nodes confined to one layer.
///
/// `first` and `last` index the owning [`RayPath`]'s node list; adjacent
/// segments share their boundary node.
#[derive(Clone, Debug, PartialEq)]
pub struct RaySegment {
    /// Layer the segment lies in.
    pub layer: usize,
    /// Wave-type attribute used for slowness lookups.
    pub wave: usize,
    /// First node.
    pub first: usize,
    /// Last node.
    pub last: usize,
    /// Inactive segments (zero-thickness layers) are skipped by relaxation.
    pub active: bool,
    /// Interface a diffracted segment runs along.
    pub along_interface: Option<usize>,
    /// Nearest active segment before this one.
    pub prev_active: Option<usize>,
    /// Nearest active segment after this one.
    pub next_active: Option<usize>,
}

impl RaySegment {
    /// New active segment.
    pub fn new(layer: usize, wave: usize, first: usize, last: usize) -> Self {
        RaySegment {
            layer,
            wave,
            first,
            last,
            active: true,
            along_interface: None,
            prev_active: None,
            next_active: None,
        }
    }

    /// Node indices of the segment.
    pub fn nodes(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }

    fn side(&self) -> Side {
        Side {
            layer: self.layer,
            wave: self.wave,
        }
    }
}

/// Arena holding the nodes and segments of one ray, in path order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RayPath {
    /// Nodes from source to receiver.
    pub nodes: Vec<Node>,
    /// Segments from source to receiver.
    pub segments: Vec<RaySegment>,
}

impl RayPath {
    /// Segment owning the edge from node `edge` to node `edge + 1`.
    pub fn edge_segment(&self, edge: usize) -> usize {
        self.segments.partition_point(|s| s.last <= edge)
    }

    /// Refresh the active flags and the prev/next active links.
    pub fn link_active(&mut self) {
        for segment in &mut self.segments {
            let length: f64 = (segment.first..segment.last)
                .map(|i| geometry::distance(self.nodes[i].position(), self.nodes[i + 1].position()))
                .sum();
            segment.active = length > 1e-6;
        }
        let mut previous = None;
        for i in 0..self.segments.len() {
            self.segments[i].prev_active = previous;
            if self.segments[i].active {
                previous = Some(i);
            }
        }
        let mut next = None;
        for i in (0..self.segments.len()).rev() {
            self.segments[i].next_active = next;
            if self.segments[i].active {
                next = Some(i);
            }
        }
    }

    /// Travel time of one segment by trapezoidal integration of slowness.
    pub fn segment_travel_time<P: LayeredModelPosition>(&self, segment: usize, pos: &mut P) -> f64 {
        let s = &self.segments[segment];
        let mut previous = slowness_at(pos, self.nodes[s.first].position(), s.layer, s.wave);
        let mut total = 0.0;
        for i in s.first..s.last {
            let x0 = self.nodes[i].position();
            let x1 = self.nodes[i + 1].position();
            let next = slowness_at(pos, x1, s.layer, s.wave);
            total += geometry::distance(x0, x1) * 0.5 * (previous + next);
            previous = next;
        }
        total
    }

    /// Total travel time in seconds.
    pub fn travel_time<P: LayeredModelPosition>(&self, pos: &mut P) -> f64 {
        (0..self.segments.len())
            .map(|s| self.segment_travel_time(s, pos))
            .sum()
    }

    /// Length of one segment in km.
    pub fn segment_length(&self, segment: usize) -> f64 {
        let s = &self.segments[segment];
        (s.first..s.last)
            .map(|i| geometry::distance(self.nodes[i].position(), self.nodes[i + 1].position()))
            .sum()
    }

    /// Path length in km.
    pub fn length(&self) -> f64 {
        (0..self.segments.len()).map(|s| self.segment_length(s)).sum()
    }

    /// Index of the node with the smallest radius.
    pub fn deepest_node(&self) -> usize {
        deepest(&self.nodes, 0..=self.nodes.len() - 1)
    }

    /// Copy of the path with every segment resampled to equal node spacing no
    /// larger than `spacing`. Boundary nodes are kept; segment indices are
    /// unchanged.
    pub fn resample<P: LayeredModelPosition>(&self, spacing: f64, pos: &mut P) -> RayPath {
        let mut nodes = Vec::with_capacity(self.nodes.len() * 2);
        let mut segments = Vec::with_capacity(self.segments.len());
        nodes.push(self.nodes[0].clone());

        for s in &self.segments {
            let first = nodes.len() - 1;
            if s.active {
                let points: Vec<[f64; 3]> =
                    s.nodes().map(|i| self.nodes[i].position()).collect();
                let n = (polyline_length(&points) / spacing).ceil().max(1.0) as usize;
                for k in 1..n {
                    let node = match s.along_interface {
                        Some(interface) => {
                            let u = geometry::slerp(
                                self.nodes[s.first].unit_vector,
                                self.nodes[s.last].unit_vector,
                                k as f64 / n as f64,
                            );
                            pos.set(u, self.nodes[s.first].radius);
                            Node::new(u, pos.layer_radius_top(interface), s.layer, NodeKind::Diffraction)
                                .on_interface(interface)
                        }
                        None => {
                            let (u, r) =
                                geometry::from_cartesian(point_at(&points, k as f64 / n as f64));
                            Node::new(u, r, s.layer, NodeKind::Interior)
                        }
                    };
                    nodes.push(node);
                }
            }
            nodes.push(self.nodes[s.last].clone());
            let mut segment = s.clone();
            segment.first = first;
            segment.last = nodes.len() - 1;
            segments.push(segment);
        }

        let mut path = RayPath { nodes, segments };
        path.link_active();
        path
    }

    fn side_before(&self, node: usize) -> Option<(usize, Side)> {
        let s = self.edge_segment(node.checked_sub(1)?);
        Some((s, self.segments[s].side()))
    }

    /// Move a node on an interface (and any nodes stacked on it across
    /// zero-thickness layers) to the Snell's-law point between its neighbours.
    fn relax_interface_node<P: LayeredModelPosition>(
        &mut self,
        j: usize,
        pos: &mut P,
        snell: &EvaluateSnellsLaw,
    ) {
        let last_node = self.nodes.len() - 1;
        if j == 0 || j >= last_node {
            return;
        }
        let Some(interface) = self.nodes[j].interface else {
            return;
        };
        let Some((prev, side_a)) = self.side_before(j) else {
            return;
        };
        if !self.segments[prev].active {
            return;
        }
        let mut end = j;
        let mut next = self.edge_segment(j);
        while !self.segments[next].active {
            end = self.segments[next].last;
            if end >= last_node {
                return;
            }
            next = self.edge_segment(end);
        }
        let side_b = self.segments[next].side();
        let a = self.nodes[j - 1].position();
        let b = self.nodes[end + 1].position();
        let (u, r) = snell.locate(pos, a, b, interface, side_a, side_b);
        for k in j..=end {
            let node = &mut self.nodes[k];
            node.unit_vector = u;
            node.radius = match node.interface {
                Some(i) if i != interface => {
                    pos.set(u, r);
                    pos.layer_radius_top(i)
                }
                _ => r,
            };
            node.status = NodeStatus::Snell;
        }
    }

    /// Bend an interior (or turning) node and confine it to its layer.
    fn relax_interior_node<P: LayeredModelPosition>(
        &mut self,
        j: usize,
        pos: &mut P,
        snell: &EvaluateSnellsLaw,
    ) {
        if j == 0 || j + 1 >= self.nodes.len() {
            return;
        }
        let Some((_, side)) = self.side_before(j) else {
            return;
        };
        let layer = self.nodes[j].layer;
        let x = snell.bend(
            pos,
            self.nodes[j - 1].position(),
            self.nodes[j].position(),
            self.nodes[j + 1].position(),
            layer,
            side.wave,
        );
        let (u, r) = geometry::from_cartesian(x);
        pos.set_in_layer(u, r, layer);
        let top = pos.layer_radius_top(layer);
        let bottom = pos.layer_radius_bottom(layer);
        let node = &mut self.nodes[j];
        node.unit_vector = u;
        if r > top {
            node.radius = top;
            node.status = NodeStatus::Clamped;
        } else if r < bottom {
            node.radius = bottom;
            node.status = NodeStatus::Clamped;
        } else {
            node.radius = r;
            node.status = NodeStatus::Bent;
        }
    }

    /// Relax one node according to its kind.
    pub fn relax_node<P: LayeredModelPosition>(
        &mut self,
        j: usize,
        pos: &mut P,
        snell: &EvaluateSnellsLaw,
    ) {
        match self.nodes[j].kind {
            NodeKind::Interior | NodeKind::Turning => self.relax_interior_node(j, pos, snell),
            NodeKind::Interface | NodeKind::Bounce | NodeKind::DiffractionEdge => {
                self.relax_interface_node(j, pos, snell)
            }
            NodeKind::Source
            | NodeKind::Receiver
            | NodeKind::FixedBounce
            | NodeKind::Diffraction => {}
        }
    }
}

fn deepest(nodes: &[Node], range: RangeInclusive<usize>) -> usize {
    let start = *range.start();
    range.fold(start, |best, i| {
        if nodes[i].radius < nodes[best].radius {
            i
        } else {
            best
        }
    })
}

fn polyline_length(points: &[[f64; 3]]) -> f64 {
    points
        .windows(2)
        .map(|w| geometry::distance(w[0], w[1]))
        .sum()
}

/// Point at fraction `f` of the arc length of a polyline.
fn point_at(points: &[[f64; 3]], f: f64) -> [f64; 3] {
    let total = polyline_length(points);
    let target = f * total;
    let mut walked = 0.0;
    for w in points.windows(2) {
        let step = geometry::distance(w[0], w[1]);
        if walked + step >= target && step > 0.0 {
            return geometry::lerp(w[0], w[1], (target - walked) / step);
        }
        walked += step;
    }
    points[points.len() - 1]
}

/// Direction and topology of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchKind {
    /// Radius increases from first to last node.
    UpGoing,
    /// Radius decreases from first to last node.
    DownGoing,
    /// A movable reflection point; holds no segments.
    Reflection,
    /// A reflection point held in place; holds no segments.
    FixedReflection,
    /// A leg running along the top of an interface.
    Diffraction,
}

/// Lifecycle of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchStatus {
    /// Not yet built.
    Uninitialized,
    /// Initial geometry in place.
    InitialGeometry,
    /// At least one relaxation sweep done.
    SnellRelaxed,
    /// Final geometry accepted.
    Converged,
    /// Geometrically inadmissible.
    Invalid,
    /// Numerical failure.
    Error,
}

/// A maximal monotonic piece of a ray (or a reflection point between two).
///
/// Reflection branches own an empty segment range positioned at the segment
/// that follows the reflection point, so their single node is that segment's
/// first node.
#[derive(Clone, Debug, PartialEq)]
pub struct RayBranch {
    /// Direction and topology.
    pub kind: BranchKind,
    /// Segment indices in the owning [`RayPath`].
    pub segments: Range<usize>,
    /// Lifecycle state.
    pub status: BranchStatus,
}

impl RayBranch {
    /// New branch over a segment range.
    pub fn new(kind: BranchKind, segments: Range<usize>) -> Self {
        RayBranch {
            kind,
            segments,
            status: BranchStatus::Uninitialized,
        }
    }

    /// Entry node of the branch.
    pub fn first_node(&self, path: &RayPath) -> usize {
        path.segments[self.segments.start].first
    }

    /// Exit node of the branch.
    pub fn last_node(&self, path: &RayPath) -> usize {
        if self.segments.is_empty() {
            self.first_node(path)
        } else {
            path.segments[self.segments.end - 1].last
        }
    }

    /// Node indices of the branch.
    pub fn nodes(&self, path: &RayPath) -> RangeInclusive<usize> {
        self.first_node(path)..=self.last_node(path)
    }

    /// Node with the smallest radius.
    pub fn deepest_node(&self, path: &RayPath) -> usize {
        deepest(&path.nodes, self.nodes(path))
    }

    /// Depth of the deepest node in km.
    pub fn max_depth<P: LayeredModelPosition>(&self, path: &RayPath, pos: &mut P) -> f64 {
        let node = &path.nodes[self.deepest_node(path)];
        pos.set(node.unit_vector, node.radius);
        pos.depth()
    }

    /// Layer of the deepest node.
    pub fn bottom_layer(&self, path: &RayPath) -> usize {
        path.nodes[self.deepest_node(path)].layer
    }

    /// Layer of the shallowest node.
    pub fn top_layer(&self, path: &RayPath) -> usize {
        let nodes = self.nodes(path);
        let start = *nodes.start();
        let top = nodes.fold(start, |best, i| {
            if path.nodes[i].radius > path.nodes[best].radius {
                i
            } else {
                best
            }
        });
        path.nodes[top].layer
    }

    /// Whether the branch leaves its first node in its own direction: for an
    /// up-going branch the second node must not lie deeper than the first
    /// (within `tolerance` km), and the reverse for a down-going branch.
    pub fn is_valid_depth_phase(&self, path: &RayPath, tolerance: f64) -> bool {
        let first = self.first_node(path);
        if first >= self.last_node(path) {
            return true;
        }
        let r0 = path.nodes[first].radius;
        let r1 = path.nodes[first + 1].radius;
        match self.kind {
            BranchKind::UpGoing => r1 + tolerance >= r0,
            BranchKind::DownGoing => r1 <= r0 + tolerance,
            _ => true,
        }
    }

    /// Angular length in degrees between the entry and exit nodes.
    pub fn arc_degrees(&self, path: &RayPath) -> f64 {
        geometry::angle(
            path.nodes[self.first_node(path)].unit_vector,
            path.nodes[self.last_node(path)].unit_vector,
        )
        .to_degrees()
    }

    /// One relaxation sweep over the nodes this branch owns. Even sweeps run
    /// from the exit end back toward the entry, odd sweeps forward.
    ///
    /// Monotonic branches own their interior nodes plus a turning node at
    /// their exit; reflection branches own their reflection point;
    /// diffraction branches own their edge nodes and keep their interior
    /// nodes spread evenly along the interface.
    pub fn enforce_snells_law<P: LayeredModelPosition>(
        &mut self,
        path: &mut RayPath,
        pos: &mut P,
        snell: &EvaluateSnellsLaw,
        even: bool,
    ) {
        let first = self.first_node(path);
        let last = self.last_node(path);
        let owned: Vec<usize> = match self.kind {
            BranchKind::UpGoing | BranchKind::DownGoing => {
                let end = if path.nodes[last].kind == NodeKind::Turning {
                    last
                } else {
                    last.saturating_sub(1)
                };
                (first + 1..=end).collect()
            }
            BranchKind::Reflection => vec![first],
            BranchKind::FixedReflection => Vec::new(),
            BranchKind::Diffraction => vec![first, last],
        };
        if even {
            for &j in owned.iter().rev() {
                path.relax_node(j, pos, snell);
            }
        } else {
            for &j in &owned {
                path.relax_node(j, pos, snell);
            }
        }
        if self.kind == BranchKind::Diffraction {
            self.spread_along_interface(path, pos);
        }
        self.status = BranchStatus::SnellRelaxed;
    }

    fn spread_along_interface<P: LayeredModelPosition>(&self, path: &mut RayPath, pos: &mut P) {
        let first = self.first_node(path);
        let last = self.last_node(path);
        let (ua, ub) = (path.nodes[first].unit_vector, path.nodes[last].unit_vector);
        let n = (last - first) as f64;
        for j in first + 1..last {
            let u = geometry::slerp(ua, ub, (j - first) as f64 / n);
            let node = &mut path.nodes[j];
            if let Some(interface) = node.interface {
                pos.set(u, node.radius);
                node.radius = pos.layer_radius_top(interface);
            }
            node.unit_vector = u;
        }
    }
}
