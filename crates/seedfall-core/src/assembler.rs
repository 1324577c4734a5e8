//! Analysis-table assembly.
//!
//! Every qualifying (site, species, cohort) unit becomes one row holding its
//! patterns, its inhomogeneity-corrected K-curve and its per-radius weights.
//! Units are independent, so sites and species fan out across threads when the
//! `threading` feature is on. Output order is fixed by sorting afterwards, so
//! results do not depend on scheduling.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::builder::{AdultPatterns, CohortPatterns, PointPatternBuilder};
use crate::census::{partition_by_site, DispersalTraits, SiteCovariates, Stem};
use crate::cohort::{CohortAssigner, CohortScheme, ReplicationFlags, ReplicationRule};
use crate::config::AnalysisConfig;
use crate::correction::correct;
use crate::error::{Result, SeedfallError};
use crate::kfunc::{self, KCurve, Radii};
use crate::pattern::PointPattern;
use crate::registry::WindowRegistry;
use crate::weights::WeightFunction;

#[cfg(feature = "threading")]
use rayon::prelude::*;

// ── Rows ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Juvenile cohort against itself, corrected by heterospecific juveniles.
    Univariate,
    /// Juvenile cohort against conspecific adults, corrected by other adults.
    Bivariate,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::Univariate => f.write_str("univariate"),
            Track::Bivariate => f.write_str("bivariate"),
        }
    }
}

/// One (site, species, cohort) unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub site: String,
    pub species: String,
    pub cohort: String,
    pub cohort_index: usize,
    pub covariates: SiteCovariates,
    /// Conspecific stems in the cohort.
    pub n_focal: usize,
    /// Heterospecific juveniles (univariate) or conspecific adults (bivariate).
    pub n_comparison: usize,
    pub focal: PointPattern,
    /// Conspecific adults on the buffered window; bivariate rows only.
    pub partner: Option<PointPattern>,
    /// Pattern the correction curve was estimated from.
    pub background: PointPattern,
    pub curve: KCurve,
    pub weights: Vec<f64>,
}

impl AnalysisRow {
    fn key(&self) -> (&str, &str, usize) {
        (&self.site, &self.species, self.cohort_index)
    }
}

// ── Run report ────────────────────────────────────────────────────────────────

/// A unit whose computation failed. The rest of the run is unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub site: String,
    pub species: Option<String>,
    pub cohort: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No conspecific adult inside the buffered window.
    AdultsOutsideBuffer,
    /// Some radius had no border-eligible reference point.
    UndefinedCurve,
    /// Surviving cohorts no longer satisfy the replication rule.
    LostCoverage,
    /// Listed as a known bivariate outlier.
    Outlier,
}

/// A unit removed on purpose, as opposed to one that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedUnit {
    pub track: Track,
    pub site: String,
    pub species: String,
    /// `None` when every cohort of the species went at once.
    pub cohort: Option<String>,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub failures: Vec<UnitFailure>,
    pub dropped: Vec<DroppedUnit>,
    /// Stems moved off a duplicated coordinate before assembly.
    #[serde(default)]
    pub jittered: usize,
    /// Stems whose diameter fell outside every cohort interval.
    #[serde(default)]
    pub unbinned: usize,
}

impl RunReport {
    pub fn dropped_by(&self, reason: DropReason) -> impl Iterator<Item = &DroppedUnit> {
        self.dropped.iter().filter(move |d| d.reason == reason)
    }
}

// ── Outliers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteSpecies {
    pub site: String,
    pub species: String,
}

/// (site, species) pairs excluded from the bivariate table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutlierList(BTreeSet<SiteSpecies>);

impl OutlierList {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().map(|(site, species)| SiteSpecies { site, species }).collect())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn contains(&self, site: &str, species: &str) -> bool {
        self.0.contains(&SiteSpecies { site: site.to_string(), species: species.to_string() })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Inputs and outputs ────────────────────────────────────────────────────────

/// Tabular inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct CensusInput {
    pub stems: Vec<Stem>,
    pub traits: Vec<DispersalTraits>,
    pub covariates: Vec<SiteCovariates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTables {
    pub univariate: Vec<AnalysisRow>,
    pub bivariate: Vec<AnalysisRow>,
    pub report: RunReport,
}

impl AnalysisTables {
    pub fn rows(&self, track: Track) -> &[AnalysisRow] {
        match track {
            Track::Univariate => &self.univariate,
            Track::Bivariate => &self.bivariate,
        }
    }
}

/// Everything one site contributes before pruning.
#[derive(Default)]
struct SiteOutcome {
    univariate: Vec<AnalysisRow>,
    bivariate: Vec<AnalysisRow>,
    failures: Vec<UnitFailure>,
    dropped: Vec<DroppedUnit>,
    unbinned: usize,
}

impl SiteOutcome {
    fn failed(site: &str, err: SeedfallError) -> Self {
        warn!(site, error = %err, "site skipped");
        Self {
            failures: vec![UnitFailure {
                site: site.to_string(),
                species: None,
                cohort: None,
                reason: err.to_string(),
            }],
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: SiteOutcome) {
        self.univariate.extend(other.univariate);
        self.bivariate.extend(other.bivariate);
        self.failures.extend(other.failures);
        self.dropped.extend(other.dropped);
        self.unbinned += other.unbinned;
    }
}

// ── Fan-out ───────────────────────────────────────────────────────────────────

#[cfg(feature = "threading")]
fn map_units<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    items.par_iter().map(f).collect()
}

#[cfg(not(feature = "threading"))]
fn map_units<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    F: Fn(&T) -> R,
{
    items.iter().map(f).collect()
}

// ── Assembler ─────────────────────────────────────────────────────────────────

/// Per-site context shared by every species at that site.
struct SiteContext<'a> {
    site: &'a str,
    covariates: &'a SiteCovariates,
    builder: PointPatternBuilder<'a>,
    flags: BTreeMap<&'a str, ReplicationFlags>,
    univariate_pool: BTreeSet<&'a str>,
}

pub struct AnalysisTableAssembler<'a, W: WeightFunction> {
    config: &'a AnalysisConfig,
    registry: &'a WindowRegistry,
    weights: &'a W,
    outliers: &'a OutlierList,
    radii: Radii,
    rule: ReplicationRule,
}

impl<'a, W: WeightFunction> AnalysisTableAssembler<'a, W> {
    pub fn new(
        config: &'a AnalysisConfig,
        registry: &'a WindowRegistry,
        weights: &'a W,
        outliers: &'a OutlierList,
    ) -> Self {
        Self {
            config,
            registry,
            weights,
            outliers,
            radii: config.radii(),
            rule: config.replication_rule(),
        }
    }

    fn scheme(&self) -> &CohortScheme {
        &self.config.cohorts
    }

    /// Build, prune and return both tables.
    ///
    /// Unit-level problems (unknown site key, missing covariates, incompatible
    /// curves) land in the report. The run fails only when nothing survives.
    pub fn assemble(&self, input: &CensusInput) -> Result<AnalysisTables> {
        let dispersal: HashMap<&str, bool> =
            input.traits.iter().map(|t| (t.species.as_str(), t.is_present())).collect();
        let covariates: HashMap<&str, &SiteCovariates> =
            input.covariates.iter().map(|c| (c.site.as_str(), c)).collect();
        let sites: Vec<(String, Vec<Stem>)> =
            partition_by_site(input.stems.clone()).into_iter().collect();
        info!(
            sites = sites.len(),
            stems = input.stems.len(),
            rmax = self.config.rmax,
            "assembling analysis tables"
        );

        let mut all = SiteOutcome::default();
        let outcomes =
            map_units(&sites, |(site, stems)| self.site(site, stems, &dispersal, &covariates));
        for outcome in outcomes {
            all.absorb(outcome);
        }

        all.univariate.sort_by(|a, b| a.key().cmp(&b.key()));
        all.bivariate.sort_by(|a, b| a.key().cmp(&b.key()));

        let mut report = RunReport {
            failures: all.failures,
            dropped: all.dropped,
            jittered: 0,
            unbinned: all.unbinned,
        };
        let univariate = self.prune(Track::Univariate, all.univariate, &mut report);
        let mut bivariate = self.prune(Track::Bivariate, all.bivariate, &mut report);
        self.remove_outliers(&mut bivariate, &mut report);

        for (track, rows) in [(Track::Univariate, &univariate), (Track::Bivariate, &bivariate)] {
            if rows.is_empty() {
                warn!(%track, "track has no rows after filtering");
            }
        }
        if univariate.is_empty() && bivariate.is_empty() {
            return Err(SeedfallError::EmptyTable);
        }
        info!(
            univariate = univariate.len(),
            bivariate = bivariate.len(),
            failures = report.failures.len(),
            dropped = report.dropped.len(),
            "analysis tables assembled"
        );
        Ok(AnalysisTables { univariate, bivariate, report })
    }

    fn site(
        &self,
        site: &str,
        stems: &[Stem],
        dispersal: &HashMap<&str, bool>,
        covariates: &HashMap<&str, &SiteCovariates>,
    ) -> SiteOutcome {
        let windows = self.registry.core_window(site).and_then(|core| {
            let buffered = self.registry.buffered_window(site, self.config.buffer_radius())?;
            Ok((core, buffered))
        });
        let (core, buffered) = match windows {
            Ok(w) => w,
            Err(err) => return SiteOutcome::failed(site, err),
        };
        let Some(&covariates) = covariates.get(site) else {
            let err = SeedfallError::MissingCovariates { site: site.to_string() };
            return SiteOutcome::failed(site, err);
        };

        let (sapling_dbh, median_cap) = (self.config.sapling_dbh, self.config.adult_median_cap);
        let assignment = CohortAssigner::new(self.scheme(), sapling_dbh, median_cap).assign(stems);
        let builder = PointPatternBuilder::new(self.scheme(), &assignment.stems, core, buffered);

        let flags: BTreeMap<&str, ReplicationFlags> = builder
            .species()
            .into_iter()
            .map(|sp| {
                let has_dispersal = dispersal.get(sp).copied().unwrap_or(false);
                (sp, self.rule.evaluate(self.scheme(), &builder.counts(sp), has_dispersal))
            })
            .collect();
        let univariate_pool: BTreeSet<&str> =
            flags.iter().filter(|(_, f)| f.quni).map(|(&sp, _)| sp).collect();
        debug!(
            site,
            species = flags.len(),
            quni = univariate_pool.len(),
            qbi = flags.values().filter(|f| f.qbi).count(),
            "replication flags"
        );

        let ctx = SiteContext { site, covariates, builder, flags, univariate_pool };
        let species: Vec<&str> = ctx.univariate_pool.iter().copied().collect();
        let mut outcome = SiteOutcome { unbinned: assignment.unbinned, ..SiteOutcome::default() };
        for part in map_units(&species, |sp| self.species(&ctx, sp)) {
            outcome.absorb(part);
        }
        outcome
    }

    fn species(&self, ctx: &SiteContext<'_>, species: &str) -> SiteOutcome {
        let mut out = SiteOutcome::default();
        let counts = ctx.builder.counts(species);
        let cohorts = ctx.builder.cohorts(species, &counts, &ctx.univariate_pool);

        for patterns in &cohorts {
            match self.univariate_row(ctx, species, patterns) {
                Ok(row) => out.univariate.push(row),
                Err(err) => {
                    out.failures.push(self.unit_failure(ctx.site, species, patterns.cohort, err))
                }
            }
        }

        // Adult replication is counted inside the buffer. A species with
        // enough adults at the site but none in the buffer is reported.
        let qbi = ctx.flags.get(species).is_some_and(|f| f.qbi);
        if !qbi {
            let reference = self.scheme().reference();
            if counts.get(reference) == 0 && ctx.builder.site_adults(species) > 1 {
                debug!(site = ctx.site, species, "no conspecific adults inside the buffer");
                out.dropped.push(DroppedUnit {
                    track: Track::Bivariate,
                    site: ctx.site.to_string(),
                    species: species.to_string(),
                    cohort: None,
                    reason: DropReason::AdultsOutsideBuffer,
                });
            }
            return out;
        }
        let Some(adults) = ctx.builder.adults(species) else {
            return out;
        };
        for patterns in &cohorts {
            match self.bivariate_row(ctx, species, patterns, &adults) {
                Ok(row) => out.bivariate.push(row),
                Err(err) => {
                    out.failures.push(self.unit_failure(ctx.site, species, patterns.cohort, err))
                }
            }
        }
        out
    }

    fn unit_failure(
        &self,
        site: &str,
        species: &str,
        cohort: usize,
        err: SeedfallError,
    ) -> UnitFailure {
        warn!(site, species, cohort = self.scheme().label(cohort), error = %err, "unit failed");
        UnitFailure {
            site: site.to_string(),
            species: Some(species.to_string()),
            cohort: Some(self.scheme().label(cohort).to_string()),
            reason: err.to_string(),
        }
    }

    fn univariate_row(
        &self,
        ctx: &SiteContext<'_>,
        species: &str,
        p: &CohortPatterns,
    ) -> Result<AnalysisRow> {
        let conspecific = kfunc::univariate(&p.conspecific, &self.radii);
        let heterospecific = if p.heterospecific.is_empty() {
            KCurve::csr(conspecific.support.clone(), &self.radii)
        } else {
            kfunc::univariate(&p.heterospecific, &self.radii)
        };
        let curve = correct(&conspecific, &heterospecific)?;
        let weights = self.weights.weights(
            &p.conspecific,
            None,
            &self.radii,
            self.config.correction,
            self.config.weight_type,
        );
        Ok(self.row(
            ctx,
            species,
            p,
            None,
            p.heterospecific.clone(),
            p.heterospecific.len(),
            curve,
            weights,
        ))
    }

    fn bivariate_row(
        &self,
        ctx: &SiteContext<'_>,
        species: &str,
        p: &CohortPatterns,
        adults: &AdultPatterns,
    ) -> Result<AnalysisRow> {
        let conspecific = kfunc::cross_type(&p.conspecific, &adults.conspecific, &self.radii);
        let heterospecific = if adults.heterospecific.is_empty() {
            KCurve::csr(conspecific.support.clone(), &self.radii)
        } else {
            kfunc::cross_type(&p.conspecific, &adults.heterospecific, &self.radii)
        };
        let curve = correct(&conspecific, &heterospecific)?;
        let weights = self.weights.weights(
            &p.conspecific,
            Some(&adults.conspecific),
            &self.radii,
            self.config.correction,
            self.config.weight_type,
        );
        Ok(self.row(
            ctx,
            species,
            p,
            Some(adults.conspecific.clone()),
            adults.heterospecific.clone(),
            adults.conspecific.len(),
            curve,
            weights,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn row(
        &self,
        ctx: &SiteContext<'_>,
        species: &str,
        p: &CohortPatterns,
        partner: Option<PointPattern>,
        background: PointPattern,
        n_comparison: usize,
        curve: KCurve,
        weights: Vec<f64>,
    ) -> AnalysisRow {
        AnalysisRow {
            site: ctx.site.to_string(),
            species: species.to_string(),
            cohort: self.scheme().label(p.cohort).to_string(),
            cohort_index: p.cohort,
            covariates: ctx.covariates.clone(),
            n_focal: p.conspecific.len(),
            n_comparison,
            focal: p.conspecific.clone(),
            partner,
            background,
            curve,
            weights,
        }
    }

    // ── Pruning ───────────────────────────────────────────────────────────────

    /// Drop rows with undefined curves, then drop every row of a (site,
    /// species) whose surviving cohorts no longer meet the replication rule.
    fn prune(
        &self,
        track: Track,
        rows: Vec<AnalysisRow>,
        report: &mut RunReport,
    ) -> Vec<AnalysisRow> {
        let (mut kept, undefined): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|r| r.curve.is_defined());
        for r in &undefined {
            report.dropped.push(DroppedUnit {
                track,
                site: r.site.clone(),
                species: r.species.clone(),
                cohort: Some(r.cohort.clone()),
                reason: DropReason::UndefinedCurve,
            });
        }

        let mut surviving: BTreeMap<(String, String), BTreeSet<usize>> = BTreeMap::new();
        for r in &kept {
            surviving
                .entry((r.site.clone(), r.species.clone()))
                .or_default()
                .insert(r.cohort_index);
        }
        let uncovered: BTreeSet<(String, String)> = surviving
            .into_iter()
            .filter(|(_, cohorts)| {
                !self.rule.juvenile_coverage(self.scheme(), |c| cohorts.contains(&c))
            })
            .map(|(key, _)| key)
            .collect();
        for (site, species) in &uncovered {
            report.dropped.push(DroppedUnit {
                track,
                site: site.clone(),
                species: species.clone(),
                cohort: None,
                reason: DropReason::LostCoverage,
            });
        }
        kept.retain(|r| !uncovered.contains(&(r.site.clone(), r.species.clone())));

        debug!(
            %track,
            undefined = undefined.len(),
            uncovered = uncovered.len(),
            kept = kept.len(),
            "pruned"
        );
        kept
    }

    fn remove_outliers(&self, rows: &mut Vec<AnalysisRow>, report: &mut RunReport) {
        if self.outliers.is_empty() {
            return;
        }
        let mut removed: BTreeSet<(String, String)> = BTreeSet::new();
        rows.retain(|r| {
            let outlier = self.outliers.contains(&r.site, &r.species);
            if outlier {
                removed.insert((r.site.clone(), r.species.clone()));
            }
            !outlier
        });
        for (site, species) in removed {
            report.dropped.push(DroppedUnit {
                track: Track::Bivariate,
                site,
                species,
                cohort: None,
                reason: DropReason::Outlier,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::census::LifeStage;
    use crate::geometry::{Polygon, WindowKind};
    use crate::registry::SiteWindowDef;
    use crate::weights::CountAreaWeights;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn stem(site: &str, species: &str, tag: &str, dbh: Option<f64>, x: f64, y: f64) -> Stem {
        Stem {
            site: site.into(),
            species: species.into(),
            tag: tag.into(),
            dbh,
            stage: if dbh.is_some() { LifeStage::Stem } else { LifeStage::Sapling },
            x,
            y,
        }
    }

    /// Two saplings, two interior stems and two adults. One of each juvenile
    /// pair sits at the core centre, so every radius up to 5 is defined.
    fn minimal_site(site: &str, species: &str) -> Vec<Stem> {
        vec![
            stem(site, species, &format!("{site}-s1"), None, 5.0, 5.0),
            stem(site, species, &format!("{site}-s2"), None, 5.0, 6.0),
            stem(site, species, &format!("{site}-i1"), Some(1.5), 5.0, 5.0),
            stem(site, species, &format!("{site}-i2"), Some(1.5), 4.0, 5.0),
            stem(site, species, &format!("{site}-a1"), Some(20.0), 2.0, 2.0),
            stem(site, species, &format!("{site}-a2"), Some(20.0), 8.0, 8.0),
        ]
    }

    fn registry(sites: &[&str]) -> WindowRegistry {
        let defs = sites
            .iter()
            .map(|s| SiteWindowDef {
                site: s.to_string(),
                core: Polygon::rectangle(0.0, 0.0, 10.0, 10.0).unwrap(),
                full: Polygon::rectangle(-10.0, -10.0, 20.0, 20.0).unwrap(),
            })
            .collect();
        WindowRegistry::new(defs, 128).unwrap()
    }

    fn covariates(site: &str) -> SiteCovariates {
        SiteCovariates {
            site: site.into(),
            forest: "f".into(),
            plot: format!("{site}-plot"),
            hunting_pressure: 0.4,
            disperser_density: BTreeMap::new(),
        }
    }

    fn traits(species: &str) -> DispersalTraits {
        DispersalTraits {
            species: species.into(),
            guilds: [("birds".to_string(), Some(true))].into_iter().collect(),
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig { rmax: 5, ..AnalysisConfig::default() }
    }

    fn input(sites: &[&str]) -> CensusInput {
        CensusInput {
            stems: sites.iter().flat_map(|s| minimal_site(s, "sp")).collect(),
            traits: vec![traits("sp")],
            covariates: sites.iter().map(|s| covariates(s)).collect(),
        }
    }

    fn run(
        cfg: &AnalysisConfig,
        reg: &WindowRegistry,
        outliers: &OutlierList,
        input: &CensusInput,
    ) -> Result<AnalysisTables> {
        AnalysisTableAssembler::new(cfg, reg, &CountAreaWeights, outliers).assemble(input)
    }

    #[test]
    fn minimal_sites_yield_two_rows_per_site_on_both_tracks() {
        let cfg = config();
        let reg = registry(&["A", "B"]);
        let tables = run(&cfg, &reg, &OutlierList::default(), &input(&["A", "B"])).unwrap();

        for track in [Track::Univariate, Track::Bivariate] {
            let rows = tables.rows(track);
            assert_eq!(rows.len(), 4, "{track}");
            for site in ["A", "B"] {
                let cohorts: Vec<&str> =
                    rows.iter().filter(|r| r.site == site).map(|r| r.cohort.as_str()).collect();
                assert_eq!(cohorts, vec!["0-1", "1-2"], "{track} {site}");
            }
            for r in rows {
                assert_eq!(r.curve.values.len(), 6);
                assert!(r.curve.is_defined());
                assert_eq!(r.weights.len(), 6);
                assert_eq!(r.n_focal, 2);
                assert_eq!(r.covariates.site, r.site);
            }
        }
        assert!(tables.report.failures.is_empty());
    }

    #[test]
    fn lone_species_is_corrected_against_csr() {
        let cfg = config();
        let reg = registry(&["A"]);
        let tables = run(&cfg, &reg, &OutlierList::default(), &input(&["A"])).unwrap();
        let row = &tables.univariate[0];
        assert!(row.background.is_empty());
        // Saplings at (5,5) and (5,6): only (5,5) is eligible at r = 5 and it
        // sees its partner, so K = 1 / (2 / 100) = 50.
        let k5 = row.curve.values[5];
        assert_relative_eq!(k5.empirical.unwrap(), 50.0 - 25.0 * PI, epsilon = 1e-9);
        assert_eq!(k5.theoretical, 0.0);
    }

    #[test]
    fn bivariate_rows_carry_buffered_adults() {
        let cfg = config();
        let reg = registry(&["A"]);
        let tables = run(&cfg, &reg, &OutlierList::default(), &input(&["A"])).unwrap();
        let row = &tables.bivariate[0];
        let partner = row.partner.as_ref().unwrap();
        assert_eq!(partner.len(), 2);
        assert_eq!(row.n_comparison, 2);
        assert!(matches!(partner.window().id().kind, WindowKind::Buffered { .. }));
        assert_eq!(row.curve.support.reference.kind, WindowKind::Core);
    }

    #[test]
    fn outlier_removal_leaves_other_rows_untouched() {
        let cfg = config();
        let reg = registry(&["A", "B"]);
        let census = input(&["A", "B"]);
        let full = run(&cfg, &reg, &OutlierList::default(), &census).unwrap();
        let outliers = OutlierList::new([("B".to_string(), "sp".to_string())]);
        let filtered = run(&cfg, &reg, &outliers, &census).unwrap();

        assert!(filtered.bivariate.iter().all(|r| r.site == "A"));
        let kept: Vec<&AnalysisRow> = full.bivariate.iter().filter(|r| r.site == "A").collect();
        assert_eq!(filtered.bivariate.iter().collect::<Vec<_>>(), kept);
        assert_eq!(filtered.univariate, full.univariate);
        assert_eq!(filtered.report.dropped_by(DropReason::Outlier).count(), 1);
    }

    #[test]
    fn unknown_site_fails_alone() {
        let cfg = config();
        let reg = registry(&["A"]);
        let mut census = input(&["A"]);
        census.stems.extend(minimal_site("ghost", "sp"));
        census.covariates.push(covariates("ghost"));
        let tables = run(&cfg, &reg, &OutlierList::default(), &census).unwrap();

        assert_eq!(tables.univariate.len(), 2);
        assert_eq!(tables.report.failures.len(), 1);
        let failure = &tables.report.failures[0];
        assert_eq!(failure.site, "ghost");
        assert!(failure.reason.contains("ghost"));
    }

    #[test]
    fn missing_covariates_fail_the_site() {
        let cfg = config();
        let reg = registry(&["A", "B"]);
        let mut census = input(&["A", "B"]);
        census.covariates.retain(|c| c.site == "A");
        let tables = run(&cfg, &reg, &OutlierList::default(), &census).unwrap();
        assert!(tables.univariate.iter().all(|r| r.site == "A"));
        assert_eq!(tables.report.failures[0].site, "B");
    }

    #[test]
    fn species_without_dispersal_data_is_skipped() {
        let cfg = config();
        let reg = registry(&["A"]);
        let mut census = input(&["A"]);
        census.traits = vec![DispersalTraits { species: "sp".into(), guilds: BTreeMap::new() }];
        assert!(matches!(
            run(&cfg, &reg, &OutlierList::default(), &census),
            Err(SeedfallError::EmptyTable)
        ));
    }

    #[test]
    fn adults_outside_buffer_drop_only_the_bivariate_track() {
        let cfg = config();
        let reg = registry(&["A"]);
        let mut census = input(&["A"]);
        // Both adults sit in the full window but more than 5 m from the core.
        census.stems[4].x = -8.0;
        census.stems[4].y = -8.0;
        census.stems[5].x = -9.0;
        census.stems[5].y = -8.0;
        let tables = run(&cfg, &reg, &OutlierList::default(), &census).unwrap();
        assert_eq!(tables.univariate.len(), 2);
        assert!(tables.bivariate.is_empty());
        assert_eq!(tables.report.dropped_by(DropReason::AdultsOutsideBuffer).count(), 1);
    }

    #[test]
    fn adults_outside_the_buffer_do_not_count_toward_bivariate_replication() {
        let cfg = config();
        let reg = registry(&["A"]);
        let mut census = input(&["A"]);
        // One adult inside the core and two in the full window but more than
        // 5 m from the core: three at the site, one inside the buffer.
        census.stems[5].x = -8.0;
        census.stems[5].y = -8.0;
        census.stems.push(stem("A", "sp", "A-a3", Some(20.0), -9.0, -8.0));
        let tables = run(&cfg, &reg, &OutlierList::default(), &census).unwrap();
        assert_eq!(tables.univariate.len(), 2);
        assert!(tables.bivariate.is_empty());
        assert_eq!(tables.report.dropped_by(DropReason::AdultsOutsideBuffer).count(), 0);
    }

    #[test]
    fn undefined_smallest_cohort_takes_the_species_down() {
        let cfg = config();
        let reg = registry(&["A"]);
        let mut census = input(&["A"]);
        // Move both saplings near the edge: nothing is eligible at r = 5.
        census.stems[0].x = 1.0;
        census.stems[1].x = 1.0;
        census.stems[1].y = 7.0;
        let tables = run(&cfg, &reg, &OutlierList::default(), &census).unwrap();
        // Univariate rows vanish; the bivariate track uses the buffered window
        // for eligibility, so its curves stay defined.
        assert!(tables.univariate.is_empty());
        assert_eq!(tables.bivariate.len(), 2);
        assert_eq!(tables.report.dropped_by(DropReason::UndefinedCurve).count(), 1);
        assert_eq!(tables.report.dropped_by(DropReason::LostCoverage).count(), 1);
    }

    #[test]
    fn rows_are_sorted_by_site_species_cohort() {
        let cfg = config();
        let reg = registry(&["B", "A"]);
        let tables = run(&cfg, &reg, &OutlierList::default(), &input(&["B", "A"])).unwrap();
        let keys: Vec<(&str, usize)> =
            tables.univariate.iter().map(|r| (r.site.as_str(), r.cohort_index)).collect();
        assert_eq!(keys, vec![("A", 0), ("A", 1), ("B", 0), ("B", 1)]);
    }

    #[test]
    fn outlier_list_reads_json_pairs() {
        let list = OutlierList::from_json(r#"[{"site": "X", "species": "y"}]"#).unwrap();
        assert!(list.contains("X", "y"));
        assert!(!list.contains("X", "z"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn outlier_lookup_matches_exact_pairs_only() {
        let list = OutlierList::new(
            (0..200).map(|i| (format!("site{i}"), format!("sp{}", i % 7))),
        );
        assert_eq!(list.len(), 200);
        assert!(list.contains("site13", "sp6"));
        assert!(!list.contains("site13", "sp5"));
        assert!(!list.contains("sp6", "site13"));
        assert!(!list.contains("site200", "sp4"));
    }
}
