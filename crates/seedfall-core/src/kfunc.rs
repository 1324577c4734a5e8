//! Border-corrected Ripley's K estimators.
//!
//! For each radius `r` only reference points whose distance to the window
//! boundary is at least `r` contribute. The estimate is the mean neighbour
//! count within `r` over those points, divided by the intensity of the
//! pattern being counted. With no eligible point the value is undefined
//! (`None`), which is a normal outcome pruned downstream.
//!
//!   K̂(r) = Σ_{i: b_i ≥ r} #{j ≠ i : d_ij ≤ r} / (λ · #{i : b_i ≥ r})
//!
//! The complete-spatial-randomness reference in the plane is `π·r²`.
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point2, WindowId};
use crate::pattern::PointPattern;

// ── Radii ─────────────────────────────────────────────────────────────────────

/// Ascending radius sequence shared by every curve of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Radii(Vec<f64>);

impl Radii {
    /// `0, 1, …, rmax`.
    pub fn up_to(rmax: u32) -> Self {
        Self((0..=rmax).map(f64::from).collect())
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Curves ────────────────────────────────────────────────────────────────────

/// Windows a curve was estimated on: where reference points sit and where
/// their neighbours were counted. Equal for univariate curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSupport {
    pub reference: WindowId,
    pub comparison: WindowId,
}

impl std::fmt::Display for CurveSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reference == self.comparison {
            write!(f, "{}", self.reference)
        } else {
            write!(f, "{} -> {}", self.reference, self.comparison)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KValue {
    pub r: f64,
    /// `None` when no reference point is border-eligible at `r`.
    pub empirical: Option<f64>,
    pub theoretical: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KCurve {
    pub support: CurveSupport,
    pub values: Vec<KValue>,
}

impl KCurve {
    /// The CSR curve itself: empirical equals theoretical `π·r²` everywhere.
    pub fn csr(support: CurveSupport, radii: &Radii) -> Self {
        let values = radii
            .values()
            .iter()
            .map(|&r| KValue { r, empirical: Some(PI * r * r), theoretical: PI * r * r })
            .collect();
        Self { support, values }
    }

    /// Every radius carries a defined empirical value.
    pub fn is_defined(&self) -> bool {
        self.values.iter().all(|v| v.empirical.is_some())
    }

    pub fn radii(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().map(|v| v.r)
    }
}

// ── Estimators ────────────────────────────────────────────────────────────────

/// Sorted distances from one reference point to its countable neighbours
/// within the largest radius.
struct Neighbourhood {
    border: f64,
    distances: Vec<f64>,
}

/// Sorted distances from `from` to every point of `others` no farther than
/// `reach`. Pairs beyond the largest radius never count, so they are not kept.
fn neighbour_distances(
    from: Point2,
    others: impl Iterator<Item = Point2>,
    reach: f64,
) -> Vec<f64> {
    let mut distances: Vec<f64> =
        others.map(|q| from.distance(q)).filter(|&d| d <= reach).collect();
    distances.sort_by(|a, b| a.total_cmp(b));
    distances
}

fn reach(radii: &Radii) -> f64 {
    radii.values().last().copied().unwrap_or(0.0)
}

fn border_estimate(
    points: &[Neighbourhood],
    intensity: f64,
    radii: &Radii,
) -> Vec<Option<f64>> {
    radii
        .values()
        .iter()
        .map(|&r| {
            if intensity <= 0.0 {
                return None;
            }
            let (eligible, neighbours) = points
                .iter()
                .filter(|p| p.border >= r)
                .fold((0usize, 0usize), |(e, n), p| {
                    (e + 1, n + p.distances.partition_point(|&d| d <= r))
                });
            (eligible > 0).then(|| neighbours as f64 / (eligible as f64 * intensity))
        })
        .collect()
}

fn assemble(support: CurveSupport, radii: &Radii, empirical: Vec<Option<f64>>) -> KCurve {
    let values = radii
        .values()
        .iter()
        .zip(empirical)
        .map(|(&r, empirical)| KValue { r, empirical, theoretical: PI * r * r })
        .collect();
    KCurve { support, values }
}

/// Univariate border-corrected K of `pattern` against itself.
pub fn univariate(pattern: &PointPattern, radii: &Radii) -> KCurve {
    let window = pattern.window();
    let points = pattern.points();
    let reach = reach(radii);
    let hoods: Vec<Neighbourhood> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let others =
                points.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, q)| q.at);
            Neighbourhood {
                border: window.boundary_distance(p.at),
                distances: neighbour_distances(p.at, others, reach),
            }
        })
        .collect();
    let support =
        CurveSupport { reference: window.id().clone(), comparison: window.id().clone() };
    assemble(support, radii, border_estimate(&hoods, pattern.intensity(), radii))
}

/// Cross-type border-corrected K: neighbours of `reference` points found in
/// `comparison`, normalised by the comparison intensity.
///
/// Border distances are measured to the comparison window, the region where
/// neighbours are observed. When that window is a buffer around the reference
/// window (plus-sampling) reference points near the core edge stay eligible.
/// A reference point outside the comparison window is never eligible, and a
/// comparison point sharing the reference point's tag is never its neighbour.
pub fn cross_type(reference: &PointPattern, comparison: &PointPattern, radii: &Radii) -> KCurve {
    let window = comparison.window();
    let reach = reach(radii);
    let hoods: Vec<Neighbourhood> = reference
        .points()
        .iter()
        .map(|p| {
            let others = comparison.points().iter().filter(|q| q.tag != p.tag).map(|q| q.at);
            let distances = neighbour_distances(p.at, others, reach);
            let border = if window.contains(p.at) {
                window.boundary_distance(p.at)
            } else {
                f64::NEG_INFINITY
            };
            Neighbourhood { border, distances }
        })
        .collect();
    let support = CurveSupport {
        reference: reference.window().id().clone(),
        comparison: window.id().clone(),
    };
    assemble(support, radii, border_estimate(&hoods, comparison.intensity(), radii))
}
