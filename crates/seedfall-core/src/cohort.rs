//! Size-cohort assignment and replication-sufficiency rules.
//!
//! Stems are binned by diameter into ordered cohorts. The last cohort is the
//! reference (adult) cohort; within it, stems below a per-species capped
//! median diameter are sub-adults and never serve as adults.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::census::{LifeStage, Stem};
use crate::error::{Result, SeedfallError};

// ── Scheme ────────────────────────────────────────────────────────────────────

/// Ordered diameter intervals `(breaks[i], breaks[i+1]]`, the first one
/// closed on the left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScheme", into = "RawScheme")]
pub struct CohortScheme {
    breaks: Vec<f64>,
    labels: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct RawScheme {
    breaks: Vec<f64>,
    labels: Vec<String>,
}

impl CohortScheme {
    pub fn new(breaks: Vec<f64>, labels: Vec<String>) -> Result<Self> {
        if labels.len() < 3 {
            return Err(SeedfallError::InvalidConfig {
                reason: format!(
                    "cohort scheme needs a smallest, an interior and a reference cohort, got {}",
                    labels.len()
                ),
            });
        }
        if breaks.len() != labels.len() + 1 {
            return Err(SeedfallError::InvalidConfig {
                reason: format!(
                    "{} cohort labels need {} breaks, got {}",
                    labels.len(),
                    labels.len() + 1,
                    breaks.len()
                ),
            });
        }
        if breaks.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(SeedfallError::InvalidConfig {
                reason: "cohort breaks must be strictly ascending".into(),
            });
        }
        Ok(Self { breaks, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, cohort: usize) -> &str {
        &self.labels[cohort]
    }

    pub fn smallest(&self) -> usize {
        0
    }

    pub fn reference(&self) -> usize {
        self.labels.len() - 1
    }

    /// Neither the smallest nor the reference cohort.
    pub fn is_interior(&self, cohort: usize) -> bool {
        cohort > self.smallest() && cohort < self.reference()
    }

    /// Cohorts analysed as focal (everything but the reference cohort).
    pub fn juvenile(&self) -> std::ops::Range<usize> {
        0..self.reference()
    }

    /// Cohort holding `dbh`, or `None` outside every interval.
    pub fn bin(&self, dbh: f64) -> Option<usize> {
        if !dbh.is_finite() || dbh < self.breaks[0] {
            return None;
        }
        self.breaks.windows(2).position(|w| dbh <= w[1])
    }
}

impl Default for CohortScheme {
    fn default() -> Self {
        Self {
            breaks: vec![0.0, 0.99, 1.99, 3.99, 9.99, 300.0],
            labels: ["0-1", "1-2", "2-4", "4-10", "10+"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TryFrom<RawScheme> for CohortScheme {
    type Error = SeedfallError;

    fn try_from(raw: RawScheme) -> Result<Self> {
        Self::new(raw.breaks, raw.labels)
    }
}

impl From<CohortScheme> for RawScheme {
    fn from(s: CohortScheme) -> Self {
        RawScheme { breaks: s.breaks, labels: s.labels }
    }
}

// ── Assignment ────────────────────────────────────────────────────────────────

/// A stem with its resolved diameter and cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedStem {
    pub stem: Stem,
    pub dbh: f64,
    pub cohort: usize,
    /// Reference-cohort stem below its species' adult cutoff.
    pub sub_adult: bool,
}

impl AssignedStem {
    /// Counts toward its cohort (sub-adults do not count as adults).
    pub fn is_usable(&self) -> bool {
        !self.sub_adult
    }
}

#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub stems: Vec<AssignedStem>,
    /// Stems with no diameter or a diameter outside every interval.
    pub unbinned: usize,
    /// Adult cutoff per species (capped median of reference-cohort diameters).
    pub adult_cutoffs: BTreeMap<String, f64>,
}

pub struct CohortAssigner<'a> {
    scheme: &'a CohortScheme,
    sapling_dbh: f64,
    median_cap: f64,
}

impl<'a> CohortAssigner<'a> {
    pub fn new(scheme: &'a CohortScheme, sapling_dbh: f64, median_cap: f64) -> Self {
        Self { scheme, sapling_dbh, median_cap }
    }

    /// Bin one site's stems and mark reference-cohort sub-adults.
    pub fn assign(&self, stems: &[Stem]) -> Assignment {
        let mut out = Assignment::default();
        for stem in stems {
            let dbh = match stem.stage {
                LifeStage::Sapling => Some(self.sapling_dbh),
                LifeStage::Stem => stem.dbh,
            };
            match dbh.and_then(|d| self.scheme.bin(d).map(|c| (d, c))) {
                Some((dbh, cohort)) => out.stems.push(AssignedStem {
                    stem: stem.clone(),
                    dbh,
                    cohort,
                    sub_adult: false,
                }),
                None => out.unbinned += 1,
            }
        }

        let reference = self.scheme.reference();
        let mut adult_dbh: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for s in out.stems.iter().filter(|s| s.cohort == reference) {
            adult_dbh.entry(s.stem.species.clone()).or_default().push(s.dbh);
        }
        for (species, mut dbhs) in adult_dbh {
            let cutoff = median(&mut dbhs).min(self.median_cap);
            out.adult_cutoffs.insert(species, cutoff);
        }
        for s in out.stems.iter_mut().filter(|s| s.cohort == reference) {
            let cutoff = out.adult_cutoffs[&s.stem.species];
            s.sub_adult = s.dbh < cutoff;
        }

        if out.unbinned > 0 {
            debug!(unbinned = out.unbinned, "stems outside every cohort interval");
        }
        out
    }
}

/// Median with the mean of the two middle values for even lengths.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

// ── Replication ───────────────────────────────────────────────────────────────

/// Usable stem counts per cohort for one (site, species).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortCounts(pub Vec<usize>);

impl CohortCounts {
    pub fn tally<'s>(n_cohorts: usize, stems: impl IntoIterator<Item = &'s AssignedStem>) -> Self {
        let mut counts = vec![0; n_cohorts];
        for s in stems.into_iter().filter(|s| s.is_usable()) {
            counts[s.cohort] += 1;
        }
        Self(counts)
    }

    pub fn get(&self, cohort: usize) -> usize {
        self.0.get(cohort).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationFlags {
    /// Enough juvenile replication and dispersal data for the univariate track.
    pub quni: bool,
    /// `quni` plus enough adults for the bivariate track.
    pub qbi: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRule {
    /// Interior cohorts that must hold more than one stem.
    pub min_interior_cohorts: usize,
}

impl ReplicationRule {
    /// Smallest cohort qualifies and at least `min_interior_cohorts` interior
    /// cohorts qualify.
    pub fn juvenile_coverage(
        &self,
        scheme: &CohortScheme,
        qualifies: impl Fn(usize) -> bool,
    ) -> bool {
        let interior = (0..scheme.len())
            .filter(|&c| scheme.is_interior(c) && qualifies(c))
            .count();
        qualifies(scheme.smallest()) && interior >= self.min_interior_cohorts
    }

    pub fn evaluate(
        &self,
        scheme: &CohortScheme,
        counts: &CohortCounts,
        has_dispersal: bool,
    ) -> ReplicationFlags {
        let quni = has_dispersal && self.juvenile_coverage(scheme, |c| counts.get(c) > 1);
        let qbi = quni && counts.get(scheme.reference()) > 1;
        ReplicationFlags { quni, qbi }
    }
}
