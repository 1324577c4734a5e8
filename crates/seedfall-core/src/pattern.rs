//! Immutable 2-D point patterns bound to a window.
//!
//! A pattern can only be built from points inside its window: [`PointPattern::new`]
//! rejects strays and [`PointPattern::clip`] drops them. Deserialization goes
//! through the same check.
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeedfallError};
use crate::geometry::{Point2, Window};

/// Type label carried by a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    /// The focal species.
    Focal,
    /// Everything that is not the focal species.
    Other,
    /// A named size cohort.
    Cohort(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPoint {
    /// Stem tag; used to stop a stem counting as its own neighbour.
    pub tag: String,
    pub at: Point2,
}

impl PatternPoint {
    pub fn new(tag: impl Into<String>, at: Point2) -> Self {
        Self { tag: tag.into(), at }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPattern", into = "RawPattern")]
pub struct PointPattern {
    mark: Mark,
    window: Arc<Window>,
    points: Vec<PatternPoint>,
}

#[derive(Serialize, Deserialize)]
struct RawPattern {
    mark: Mark,
    window: Window,
    points: Vec<PatternPoint>,
}

impl PointPattern {
    /// Fails on the first point outside `window`.
    pub fn new(window: Arc<Window>, mark: Mark, points: Vec<PatternPoint>) -> Result<Self> {
        if let Some(p) = points.iter().find(|p| !window.contains(p.at)) {
            return Err(SeedfallError::PointOutsideWindow {
                x: p.at.x,
                y: p.at.y,
                window: window.id().to_string(),
            });
        }
        Ok(Self { mark, window, points })
    }

    /// Keep the candidates inside `window`; returns the pattern and the number dropped.
    pub fn clip(
        window: Arc<Window>,
        mark: Mark,
        candidates: impl IntoIterator<Item = PatternPoint>,
    ) -> (Self, usize) {
        let mut dropped = 0;
        let points = candidates
            .into_iter()
            .filter(|p| {
                let inside = window.contains(p.at);
                if !inside {
                    dropped += 1;
                }
                inside
            })
            .collect();
        (Self { mark, window, points }, dropped)
    }

    /// Remove exactly coincident points, keeping the first of each location.
    pub fn without_coincident(mut self) -> Self {
        let mut seen = HashSet::new();
        self.points.retain(|p| seen.insert((p.at.x.to_bits(), p.at.y.to_bits())));
        self
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn points(&self) -> &[PatternPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points per unit area.
    pub fn intensity(&self) -> f64 {
        self.points.len() as f64 / self.window.area()
    }
}

impl TryFrom<RawPattern> for PointPattern {
    type Error = SeedfallError;

    fn try_from(raw: RawPattern) -> Result<Self> {
        Self::new(Arc::new(raw.window), raw.mark, raw.points)
    }
}

impl From<PointPattern> for RawPattern {
    fn from(p: PointPattern) -> Self {
        RawPattern {
            mark: p.mark,
            window: Arc::unwrap_or_clone(p.window),
            points: p.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Polygon, WindowId, WindowKind};

    fn window() -> Arc<Window> {
        Arc::new(Window::polygon(
            WindowId::new("s", WindowKind::Core),
            Polygon::rectangle(0.0, 0.0, 10.0, 10.0).unwrap(),
        ))
    }

    fn pt(tag: &str, x: f64, y: f64) -> PatternPoint {
        PatternPoint::new(tag, Point2::new(x, y))
    }

    #[test]
    fn new_rejects_points_outside_window() {
        let points = vec![pt("a", 1.0, 1.0), pt("b", 11.0, 1.0)];
        let err = PointPattern::new(window(), Mark::Focal, points).unwrap_err();
        assert!(matches!(err, SeedfallError::PointOutsideWindow { x, .. } if x == 11.0));
    }

    #[test]
    fn clip_drops_and_counts_strays() {
        let (p, dropped) = PointPattern::clip(
            window(),
            Mark::Other,
            vec![pt("a", 1.0, 1.0), pt("b", -0.5, 3.0), pt("c", 10.0, 10.0)],
        );
        assert_eq!(p.len(), 2);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn coincident_points_are_removed_not_moved() {
        let p = PointPattern::new(
            window(),
            Mark::Other,
            vec![pt("a", 1.0, 1.0), pt("b", 1.0, 1.0), pt("c", 1.0, 1.000001)],
        )
        .unwrap()
        .without_coincident();
        let tags: Vec<&str> = p.points().iter().map(|p| p.tag.as_str()).collect();
        assert_eq!(tags, vec!["a", "c"]);
        assert_eq!(p.points()[1].at, Point2::new(1.0, 1.000001));
    }

    #[test]
    fn intensity_is_count_over_area() {
        let points = vec![pt("a", 1.0, 1.0), pt("b", 2.0, 2.0)];
        let p = PointPattern::new(window(), Mark::Focal, points).unwrap();
        assert_eq!(p.intensity(), 0.02);
    }

    #[test]
    fn deserialization_revalidates_membership() {
        let p = PointPattern::new(window(), Mark::Focal, vec![pt("a", 1.0, 1.0)]).unwrap();
        let json = serde_json::to_string(&p).unwrap().replace("1.0,\"y\"", "12.0,\"y\"");
        assert!(serde_json::from_str::<PointPattern>(&json).is_err());
        let ok: PointPattern = serde_json::from_str(&serde_json::to_string(&p).unwrap()).unwrap();
        assert_eq!(ok, p);
    }
}
