//! On-disk snapshot of a finished run.
//!
//! The snapshot carries both tables, the run report and the constants they
//! were built with, so later model fitting never needs to recompute curves.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assembler::{AnalysisRow, AnalysisTables, RunReport};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::kfunc::Radii;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub config: AnalysisConfig,
    pub radii: Radii,
    pub univariate: Vec<AnalysisRow>,
    pub bivariate: Vec<AnalysisRow>,
    pub report: RunReport,
}

impl AnalysisSnapshot {
    pub fn new(config: AnalysisConfig, tables: AnalysisTables) -> Self {
        let radii = config.radii();
        Self {
            config,
            radii,
            univariate: tables.univariate,
            bivariate: tables.bivariate,
            report: tables.report,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a snapshot and rejects one whose stored config is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.config.validate()?;
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Self = serde_json::from_reader(reader)?;
        snapshot.config.validate()?;
        Ok(snapshot)
    }
}
