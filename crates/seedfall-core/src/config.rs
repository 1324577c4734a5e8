use serde::{Deserialize, Serialize};

use crate::cohort::{CohortScheme, ReplicationRule};
use crate::error::{Result, SeedfallError};
use crate::kfunc::Radii;
use crate::weights::{Correction, WeightType};

/// Run-wide analysis constants.
/// Defaults are the production values; a JSON config may override any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Largest K radius (metres). Radii run 0..=rmax in 1 m steps; the adult
    /// plus-sampling buffer uses the same distance.
    pub rmax: u32,
    pub cohorts: CohortScheme,
    /// Nominal diameter (cm) given to sapling-stage stems.
    pub sapling_dbh: f64,
    /// Ceiling (cm) on the per-species median that separates adults from sub-adults.
    pub adult_median_cap: f64,
    /// Interior cohorts that must hold more than one stem.
    pub min_interior_cohorts: usize,
    pub correction: Correction,
    pub weight_type: WeightType,
    /// Grid resolution for areas of buffered non-convex windows.
    pub raster_cells: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rmax: 15,
            cohorts: CohortScheme::default(),
            sapling_dbh: 0.5,
            adult_median_cap: 30.0,
            min_interior_cohorts: 1,
            correction: Correction::Border,
            weight_type: WeightType::BorderEligible,
            raster_cells: 512,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sapling_dbh.is_finite() && self.adult_median_cap.is_finite()) {
            return Err(SeedfallError::InvalidConfig {
                reason: "diameters must be finite".into(),
            });
        }
        if self.cohorts.bin(self.sapling_dbh) != Some(self.cohorts.smallest()) {
            return Err(SeedfallError::InvalidConfig {
                reason: format!(
                    "sapling diameter {} is not in the smallest cohort",
                    self.sapling_dbh
                ),
            });
        }
        Ok(())
    }

    pub fn radii(&self) -> Radii {
        Radii::up_to(self.rmax)
    }

    pub fn buffer_radius(&self) -> f64 {
        f64::from(self.rmax)
    }

    pub fn replication_rule(&self) -> ReplicationRule {
        ReplicationRule { min_interior_cohorts: self.min_interior_cohorts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = AnalysisConfig::from_json(r#"{"rmax": 5}"#).unwrap();
        assert_eq!(cfg.rmax, 5);
        assert_eq!(cfg.adult_median_cap, 30.0);
        assert_eq!(cfg.radii().len(), 6);
    }

    #[test]
    fn sapling_outside_smallest_cohort_is_rejected() {
        assert!(AnalysisConfig::from_json(r#"{"sapling_dbh": 1.5}"#).is_err());
    }

    #[test]
    fn custom_scheme_is_validated() {
        let json = r#"{"cohorts": {"breaks": [0, 1, 1], "labels": ["a", "b"]}}"#;
        assert!(AnalysisConfig::from_json(json).is_err());
    }
}
