// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Local node updates used by the relaxation sweeps.
//!
//! Nodes on an interface are moved by a one-dimensional search along the
//! interface between the node's two neighbours. Interior nodes are moved by
//! the three-point pseudo-bending update of Um & Thurber (1987).

use crate::config::{BenderConfig, SearchMethod};
use crate::geometry;
use crate::model::LayeredModelPosition;

const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Upper bound on interface search steps, reached only when the tolerance is
/// below the resolution of the search parameter.
const MAX_SEARCH_ITERATIONS: usize = 200;

/// Layer and wave type of the ray on one side of an interface node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Side {
    /// Layer the adjoining segment lies in.
    pub layer: usize,
    /// Wave-type attribute of the adjoining segment.
    pub wave: usize,
}

/// Slowness of a wave type at a point, evaluated inside `layer`.
pub fn slowness_at<P: LayeredModelPosition>(pos: &mut P, x: [f64; 3], layer: usize, wave: usize) -> f64 {
    let (u, r) = geometry::from_cartesian(x);
    pos.set_in_layer(u, r, layer);
    pos.value(wave)
}

/// Snell's-law enforcement for interface nodes plus the bending kernel for
/// interior nodes.
#[derive(Clone, Debug)]
pub struct EvaluateSnellsLaw {
    method: SearchMethod,
    tolerance: f64,
    enhancement: f64,
}

impl EvaluateSnellsLaw {
    /// Helper configured from the bender settings.
    pub fn new(config: &BenderConfig) -> Self {
        EvaluateSnellsLaw {
            method: config.search_method,
            tolerance: config.snell_tolerance,
            enhancement: config.bending_enhancement,
        }
    }

    /// Search method in use.
    pub fn method(&self) -> SearchMethod {
        self.method
    }

    /// Point on the top of `interface` between the lateral positions of `a`
    /// and `b` where the ray from `a` to `b` obeys Snell's law (or reflects,
    /// when both sides are the same layer). Returns unit vector and radius.
    pub fn locate<P: LayeredModelPosition>(
        &self,
        pos: &mut P,
        a: [f64; 3],
        b: [f64; 3],
        interface: usize,
        side_a: Side,
        side_b: Side,
    ) -> ([f64; 3], f64) {
        let ua = geometry::normalize(a);
        let ub = geometry::normalize(b);
        let search = InterfaceSearch {
            ua,
            ub,
            a,
            b,
            interface,
            side_a,
            side_b,
        };
        let t = match self.method {
            SearchMethod::Bisection => search.bisect(pos, self.tolerance),
            SearchMethod::GoldenSection => search.golden(pos, self.tolerance),
        };
        search.point(pos, t)
    }

    /// Pseudo-bending update of the interior node `x2` between `x1` and `x3`,
    /// over-relaxed by the enhancement factor. The result is not yet confined
    /// to the layer.
    pub fn bend<P: LayeredModelPosition>(
        &self,
        pos: &mut P,
        x1: [f64; 3],
        x2: [f64; 3],
        x3: [f64; 3],
        layer: usize,
        wave: usize,
    ) -> [f64; 3] {
        let xm = geometry::scale(geometry::add(x1, x3), 0.5);
        let d = geometry::sub(x3, x1);
        let half = 0.5 * geometry::norm(d);
        if half < 1e-9 {
            return xm;
        }

        let s1 = slowness_at(pos, x1, layer, wave);
        let s3 = slowness_at(pos, x3, layer, wave);
        let sm = slowness_at(pos, xm, layer, wave);
        let grad_s = pos.gradient(wave);

        // velocity gradient perpendicular to the chord
        let grad_v = geometry::scale(grad_s, -1.0 / (sm * sm));
        let along = geometry::scale(d, 1.0 / (2.0 * half));
        let perp = geometry::sub(grad_v, geometry::scale(along, geometry::dot(grad_v, along)));
        let g = geometry::norm(perp);

        let target = if g < 1e-12 {
            xm
        } else {
            let n = geometry::scale(perp, 1.0 / g);
            let c = 0.5 * (s1 + s3);
            let vm = 1.0 / sm;
            let q = (c * vm + 1.0) / (4.0 * c * g);
            let shift = -q + (q * q + half * half / (2.0 * c * vm)).sqrt();
            geometry::add(xm, geometry::scale(n, shift))
        };
        geometry::add(
            x2,
            geometry::scale(geometry::sub(target, x2), self.enhancement),
        )
    }
}

struct InterfaceSearch {
    ua: [f64; 3],
    ub: [f64; 3],
    a: [f64; 3],
    b: [f64; 3],
    interface: usize,
    side_a: Side,
    side_b: Side,
}

impl InterfaceSearch {
    fn point<P: LayeredModelPosition>(&self, pos: &mut P, t: f64) -> ([f64; 3], f64) {
        let u = geometry::slerp(self.ua, self.ub, t);
        pos.set(u, pos.radius());
        (u, pos.layer_radius_top(self.interface))
    }

    fn cartesian<P: LayeredModelPosition>(&self, pos: &mut P, t: f64) -> [f64; 3] {
        let (u, r) = self.point(pos, t);
        geometry::to_cartesian(u, r)
    }

    fn travel_time<P: LayeredModelPosition>(&self, pos: &mut P, t: f64) -> f64 {
        let x = self.cartesian(pos, t);
        let (la, wa) = (self.side_a.layer, self.side_a.wave);
        let (lb, wb) = (self.side_b.layer, self.side_b.wave);
        let ta = geometry::distance(self.a, x)
            * 0.5
            * (slowness_at(pos, self.a, la, wa) + slowness_at(pos, x, la, wa));
        let tb = geometry::distance(x, self.b)
            * 0.5
            * (slowness_at(pos, x, lb, wb) + slowness_at(pos, self.b, lb, wb));
        ta + tb
    }

    /// Derivative of the local travel time along the interface, with the
    /// slowness on each side frozen at the node: the tangential slowness
    /// mismatch.
    fn residual<P: LayeredModelPosition>(&self, pos: &mut P, t: f64) -> f64 {
        const H: f64 = 1e-6;
        let lo = (t - H).max(0.0);
        let hi = (t + H).min(1.0);
        let tangent = geometry::scale(
            geometry::sub(self.cartesian(pos, hi), self.cartesian(pos, lo)),
            1.0 / (hi - lo),
        );
        let x = self.cartesian(pos, t);
        let ea = geometry::normalize(geometry::sub(x, self.a));
        let eb = geometry::normalize(geometry::sub(self.b, x));
        let sa = slowness_at(pos, x, self.side_a.layer, self.side_a.wave);
        let sb = slowness_at(pos, x, self.side_b.layer, self.side_b.wave);
        geometry::dot(
            tangent,
            geometry::sub(geometry::scale(ea, sa), geometry::scale(eb, sb)),
        )
    }

    fn bisect<P: LayeredModelPosition>(&self, pos: &mut P, tolerance: f64) -> f64 {
        let g0 = self.residual(pos, 0.0);
        let g1 = self.residual(pos, 1.0);
        if g0 >= 0.0 && g1 >= 0.0 {
            return 0.0;
        }
        if g0 <= 0.0 && g1 <= 0.0 {
            return 1.0;
        }
        if g0 > 0.0 {
            // local maximum inside; take the cheaper end
            return if self.travel_time(pos, 0.0) <= self.travel_time(pos, 1.0) {
                0.0
            } else {
                1.0
            };
        }
        let (mut lo, mut hi) = (0.0, 1.0);
        for _ in 0..MAX_SEARCH_ITERATIONS {
            if hi - lo <= tolerance {
                break;
            }
            let mid = 0.5 * (lo + hi);
            if self.residual(pos, mid) < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    fn golden<P: LayeredModelPosition>(&self, pos: &mut P, tolerance: f64) -> f64 {
        let (mut lo, mut hi) = (0.0, 1.0);
        let mut c = hi - INV_PHI * (hi - lo);
        let mut d = lo + INV_PHI * (hi - lo);
        let mut fc = self.travel_time(pos, c);
        let mut fd = self.travel_time(pos, d);
        for _ in 0..MAX_SEARCH_ITERATIONS {
            if hi - lo <= tolerance {
                break;
            }
            if fc < fd {
                hi = d;
                d = c;
                fd = fc;
                c = hi - INV_PHI * (hi - lo);
                fc = self.travel_time(pos, c);
            } else {
                lo = c;
                c = d;
                fc = fd;
                d = lo + INV_PHI * (hi - lo);
                fd = self.travel_time(pos, d);
            }
        }
        0.5 * (lo + hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LayeredModel, RadialLayer};
    use std::sync::Arc;

    fn two_layer() -> Arc<LayeredModel> {
        Arc::new(
            LayeredModel::radial(
                "two",
                &[
                    RadialLayer::new("CMB", 6000.0, (10.0, 10.0), (5.0, 5.0)),
                    RadialLayer::new("SURFACE", 6371.0, (5.0, 5.0), (2.5, 2.5)),
                ],
            )
            .unwrap(),
        )
    }

    fn snell_residual(u: [f64; 3], r: f64, a: [f64; 3], b: [f64; 3], sa: f64, sb: f64) -> f64 {
        // tangential slowness mismatch in the plane of the three points
        let x = geometry::to_cartesian(u, r);
        let normal = geometry::normalize(geometry::cross(a, b));
        let tangent = geometry::normalize(geometry::cross(normal, u));
        let ea = geometry::normalize(geometry::sub(x, a));
        let eb = geometry::normalize(geometry::sub(b, x));
        sa * geometry::dot(ea, tangent) - sb * geometry::dot(eb, tangent)
    }

    #[test]
    fn refraction_obeys_snell_with_both_methods() {
        let model = two_layer();
        let a = geometry::to_cartesian(geometry::from_lat_lon(0.0, 0.0), 6300.0);
        let b = geometry::to_cartesian(geometry::from_lat_lon(0.0, 3.0), 5800.0);
        for method in [SearchMethod::Bisection, SearchMethod::GoldenSection] {
            let config = BenderConfig {
                search_method: method,
                ..BenderConfig::default()
            };
            let snell = EvaluateSnellsLaw::new(&config);
            let mut pos = model.position();
            let (u, r) = snell.locate(
                &mut pos,
                a,
                b,
                0,
                Side { layer: 1, wave: 0 },
                Side { layer: 0, wave: 0 },
            );
            assert!((r - 6000.0).abs() < 1e-9);
            let residual = snell_residual(u, r, a, b, 0.2, 0.1);
            assert!(residual.abs() < 1e-5, "{:?}: residual {}", method, residual);
        }
    }

    #[test]
    fn search_terminates_below_parameter_resolution() {
        let model = two_layer();
        let a = geometry::to_cartesian(geometry::from_lat_lon(0.0, 0.0), 6300.0);
        let b = geometry::to_cartesian(geometry::from_lat_lon(0.0, 3.0), 5800.0);
        for method in [SearchMethod::Bisection, SearchMethod::GoldenSection] {
            let config = BenderConfig {
                search_method: method,
                snell_tolerance: 1e-18,
                ..BenderConfig::default()
            };
            let snell = EvaluateSnellsLaw::new(&config);
            let mut pos = model.position();
            let (u, r) = snell.locate(
                &mut pos,
                a,
                b,
                0,
                Side { layer: 1, wave: 0 },
                Side { layer: 0, wave: 0 },
            );
            assert!((r - 6000.0).abs() < 1e-9);
            let residual = snell_residual(u, r, a, b, 0.2, 0.1);
            assert!(residual.abs() < 1e-5, "{:?}: residual {}", method, residual);
        }
    }

    #[test]
    fn reflection_is_symmetric() {
        let model = two_layer();
        let config = BenderConfig::default();
        let snell = EvaluateSnellsLaw::new(&config);
        let mut pos = model.position();
        let a = geometry::to_cartesian(geometry::from_lat_lon(0.0, -2.0), 6371.0);
        let b = geometry::to_cartesian(geometry::from_lat_lon(0.0, 2.0), 6371.0);
        let side = Side { layer: 1, wave: 0 };
        let (u, _) = snell.locate(&mut pos, a, b, 0, side, side);
        let (lat, lon) = geometry::lat_lon(u);
        assert!(lat.abs() < 1e-9);
        assert!(lon.abs() < 1e-6);
    }

    #[test]
    fn bending_leaves_straight_line_in_homogeneous_layer() {
        let model = two_layer();
        let config = BenderConfig::default();
        let snell = EvaluateSnellsLaw::new(&config);
        let mut pos = model.position();
        let x1 = [6200.0, 0.0, 0.0];
        let x3 = [6200.0, 100.0, 0.0];
        let x2 = [6200.0, 50.0, 0.0];
        let x = snell.bend(&mut pos, x1, x2, x3, 1, 0);
        assert!(geometry::distance(x, x2) < 1e-9);
    }

    #[test]
    fn bending_moves_toward_faster_material() {
        let model = Arc::new(
            LayeredModel::radial(
                "gradient",
                &[RadialLayer::new("SURFACE", 6371.0, (12.0, 6.0), (7.0, 3.5))],
            )
            .unwrap(),
        );
        let config = BenderConfig::default();
        let snell = EvaluateSnellsLaw::new(&config);
        let mut pos = model.position();
        let x1 = geometry::to_cartesian(geometry::from_lat_lon(0.0, 0.0), 6300.0);
        let x3 = geometry::to_cartesian(geometry::from_lat_lon(0.0, 2.0), 6300.0);
        let x2 = geometry::scale(geometry::add(x1, x3), 0.5);
        let x = snell.bend(&mut pos, x1, x2, x3, 0, 0);
        // velocity increases with depth, so the node sinks
        assert!(geometry::norm(x) < geometry::norm(x2) - 0.1);
    }
}
