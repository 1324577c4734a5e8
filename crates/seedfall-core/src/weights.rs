//! Per-radius reliability weights for K-curves.
//!
//! The weighting formula belongs to a collaborating module and is consumed
//! through [`WeightFunction`]. Any implementation must be deterministic,
//! return one non-negative weight per radius, grow with point counts and
//! shrink with window area.
use serde::{Deserialize, Serialize};

use crate::kfunc::Radii;
use crate::pattern::PointPattern;

/// Edge-correction the curve was estimated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightType {
    /// Point counts only, constant over radii.
    Intensity,
    /// Scale by the number of border-eligible reference points at each radius.
    BorderEligible,
}

pub trait WeightFunction: Send + Sync {
    /// Weights for a curve of `x` (univariate) or `x` against `y` (cross-type),
    /// aligned index-for-index with `radii`.
    fn weights(
        &self,
        x: &PointPattern,
        y: Option<&PointPattern>,
        radii: &Radii,
        correction: Correction,
        weight_type: WeightType,
    ) -> Vec<f64>;
}

/// Count-over-area weights: `n_ref(r) · n_partner / |W|`.
///
/// `n_partner` is the comparison pattern size for cross-type curves and
/// `n − 1` for univariate ones; `|W|` is the reference pattern's window area.
/// With [`WeightType::BorderEligible`], `n_ref(r)` counts only reference
/// points eligible under the border correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountAreaWeights;

impl WeightFunction for CountAreaWeights {
    fn weights(
        &self,
        x: &PointPattern,
        y: Option<&PointPattern>,
        radii: &Radii,
        correction: Correction,
        weight_type: WeightType,
    ) -> Vec<f64> {
        let n_x = x.len() as f64;
        let partner = match y {
            Some(y) => y.len() as f64,
            None => (n_x - 1.0).max(0.0),
        };
        let scale = partner / x.window().area();
        let observed = y.map_or(x.window(), |y| y.window());

        let borders: Vec<f64> = match (weight_type, correction) {
            (WeightType::Intensity, _) => Vec::new(),
            (WeightType::BorderEligible, Correction::Border) => x
                .points()
                .iter()
                .filter(|p| observed.contains(p.at))
                .map(|p| observed.boundary_distance(p.at))
                .collect(),
        };

        radii
            .values()
            .iter()
            .map(|&r| {
                let n_ref = match weight_type {
                    WeightType::Intensity => n_x,
                    WeightType::BorderEligible => {
                        borders.iter().filter(|&&b| b >= r).count() as f64
                    }
                };
                n_ref * scale
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point2, Polygon, Window, WindowId, WindowKind};
    use crate::pattern::{Mark, PatternPoint};
    use std::sync::Arc;

    fn pattern(side: f64, pts: &[(f64, f64)]) -> PointPattern {
        let w = Arc::new(Window::polygon(
            WindowId::new("s", WindowKind::Core),
            Polygon::rectangle(0.0, 0.0, side, side).unwrap(),
        ));
        let points = pts
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| PatternPoint::new(format!("p{i}"), Point2::new(x, y)))
            .collect();
        PointPattern::new(w, Mark::Focal, points).unwrap()
    }

    fn weigh(x: &PointPattern, y: Option<&PointPattern>, t: WeightType) -> Vec<f64> {
        CountAreaWeights.weights(x, y, &Radii::up_to(5), Correction::Border, t)
    }

    #[test]
    fn length_matches_radii_and_is_non_negative() {
        let x = pattern(10.0, &[(5.0, 5.0)]);
        let w = weigh(&x, None, WeightType::BorderEligible);
        assert_eq!(w.len(), 6);
        assert!(w.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn deterministic() {
        let x = pattern(10.0, &[(5.0, 5.0), (2.0, 3.0), (8.0, 1.0)]);
        let first = weigh(&x, None, WeightType::BorderEligible);
        assert_eq!(first, weigh(&x, None, WeightType::BorderEligible));
    }

    #[test]
    fn grows_with_counts() {
        let few = pattern(10.0, &[(5.0, 5.0), (4.0, 4.0)]);
        let many = pattern(10.0, &[(5.0, 5.0), (4.0, 4.0), (6.0, 6.0)]);
        let a = weigh(&few, None, WeightType::Intensity);
        let b = weigh(&many, None, WeightType::Intensity);
        assert!(a.iter().zip(&b).all(|(a, b)| b > a));
    }

    #[test]
    fn shrinks_with_area() {
        let small = pattern(10.0, &[(5.0, 5.0), (4.0, 4.0)]);
        let large = pattern(20.0, &[(5.0, 5.0), (4.0, 4.0)]);
        let a = weigh(&small, None, WeightType::Intensity);
        let b = weigh(&large, None, WeightType::Intensity);
        assert!(a.iter().zip(&b).all(|(a, b)| b < a));
    }

    #[test]
    fn border_eligible_weights_decline_with_radius() {
        let x = pattern(10.0, &[(5.0, 5.0), (1.0, 1.0)]);
        let w = weigh(&x, None, WeightType::BorderEligible);
        // Both eligible at r ≤ 1, only the centre point beyond.
        assert_eq!(w[0], 2.0 * 1.0 / 100.0);
        assert_eq!(w[1], 2.0 * 1.0 / 100.0);
        assert_eq!(w[2], 1.0 * 1.0 / 100.0);
        assert_eq!(w[5], 1.0 * 1.0 / 100.0);
    }

    #[test]
    fn cross_type_uses_partner_count() {
        let x = pattern(10.0, &[(5.0, 5.0)]);
        let y = pattern(10.0, &[(5.0, 6.0), (5.0, 4.0), (4.0, 5.0)]);
        let w = weigh(&x, Some(&y), WeightType::Intensity);
        assert!(w.iter().all(|&v| v == 3.0 / 100.0));
    }
}
