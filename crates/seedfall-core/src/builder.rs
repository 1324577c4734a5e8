//! Point-pattern construction for one site.
//!
//! Juvenile cohorts are minus-sampled: only stems inside the core window enter
//! their patterns. Adults are plus-sampled: stems inside the core window
//! buffered by `rmax` are kept so adult neighbours just outside the core are
//! still counted.
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cohort::{AssignedStem, CohortCounts, CohortScheme};
use crate::geometry::Window;
use crate::pattern::{Mark, PatternPoint, PointPattern};

/// Focal and heterospecific patterns of one juvenile cohort.
#[derive(Debug, Clone)]
pub struct CohortPatterns {
    pub cohort: usize,
    pub conspecific: PointPattern,
    pub heterospecific: PointPattern,
}

/// Reference-cohort patterns on the buffered window.
#[derive(Debug, Clone)]
pub struct AdultPatterns {
    pub conspecific: PointPattern,
    pub heterospecific: PointPattern,
}

pub struct PointPatternBuilder<'a> {
    scheme: &'a CohortScheme,
    stems: &'a [AssignedStem],
    core: Arc<Window>,
    buffered: Arc<Window>,
}

fn to_point(s: &AssignedStem) -> PatternPoint {
    PatternPoint::new(s.stem.tag.clone(), s.stem.position())
}

impl<'a> PointPatternBuilder<'a> {
    pub fn new(
        scheme: &'a CohortScheme,
        stems: &'a [AssignedStem],
        core: Arc<Window>,
        buffered: Arc<Window>,
    ) -> Self {
        Self { scheme, stems, core, buffered }
    }

    /// Species present at the site, sorted.
    pub fn species(&self) -> BTreeSet<&'a str> {
        self.stems.iter().map(|s| s.stem.species.as_str()).collect()
    }

    /// Usable stems per cohort for `species`: juvenile cohorts count stems
    /// inside the core window, the reference cohort counts adults inside the
    /// buffered window.
    pub fn counts(&self, species: &str) -> CohortCounts {
        let reference = self.scheme.reference();
        CohortCounts::tally(
            self.scheme.len(),
            self.stems.iter().filter(|s| {
                let window = if s.cohort == reference { &self.buffered } else { &self.core };
                s.stem.species == species && window.contains(s.stem.position())
            }),
        )
    }

    /// Usable adults of `species` anywhere at the site.
    pub fn site_adults(&self, species: &str) -> usize {
        self.adults_of(|sp| sp == species).count()
    }

    /// Smallest and interior cohorts holding more than one stem.
    pub fn qualifying_cohorts(&self, counts: &CohortCounts) -> Vec<usize> {
        self.scheme.juvenile().filter(|&c| counts.get(c) > 1).collect()
    }

    fn juveniles_of<'s>(
        &'s self,
        cohort: usize,
        keep: impl Fn(&str) -> bool + 's,
    ) -> impl Iterator<Item = PatternPoint> + 's {
        self.stems
            .iter()
            .filter(move |s| s.cohort == cohort && s.is_usable() && keep(&s.stem.species))
            .map(to_point)
    }

    fn adults_of<'s>(
        &'s self,
        keep: impl Fn(&str) -> bool + 's,
    ) -> impl Iterator<Item = PatternPoint> + 's {
        let reference = self.scheme.reference();
        self.stems
            .iter()
            .filter(move |s| s.cohort == reference && s.is_usable() && keep(&s.stem.species))
            .map(to_point)
    }

    pub fn conspecific(&self, species: &str, cohort: usize) -> PointPattern {
        let mark = Mark::Cohort(self.scheme.label(cohort).to_string());
        let points = self.juveniles_of(cohort, |sp| sp == species);
        PointPattern::clip(Arc::clone(&self.core), mark, points).0
    }

    /// All other species of `pool` in `cohort`, coincident points removed.
    pub fn heterospecific(
        &self,
        species: &str,
        cohort: usize,
        pool: &BTreeSet<&str>,
    ) -> PointPattern {
        let others = self.juveniles_of(cohort, |sp| sp != species && pool.contains(sp));
        PointPattern::clip(Arc::clone(&self.core), Mark::Other, others).0.without_coincident()
    }

    /// Patterns for every qualifying juvenile cohort of `species`.
    pub fn cohorts(
        &self,
        species: &str,
        counts: &CohortCounts,
        pool: &BTreeSet<&str>,
    ) -> Vec<CohortPatterns> {
        self.qualifying_cohorts(counts)
            .into_iter()
            .map(|cohort| CohortPatterns {
                cohort,
                conspecific: self.conspecific(species, cohort),
                heterospecific: self.heterospecific(species, cohort, pool),
            })
            .collect()
    }

    /// Adult patterns on the buffered window, or `None` when no adult of
    /// `species` lies inside the buffer.
    pub fn adults(&self, species: &str) -> Option<AdultPatterns> {
        let (conspecific, _) = PointPattern::clip(
            Arc::clone(&self.buffered),
            Mark::Focal,
            self.adults_of(|sp| sp == species),
        );
        if conspecific.is_empty() {
            return None;
        }
        let (heterospecific, _) = PointPattern::clip(
            Arc::clone(&self.buffered),
            Mark::Other,
            self.adults_of(|sp| sp != species),
        );
        Some(AdultPatterns { conspecific, heterospecific: heterospecific.without_coincident() })
    }
}
