//! Spatial point-pattern statistics for tree-census plots: cohort assignment,
//! border-corrected Ripley's K, inhomogeneity correction and assembly of the
//! per-(site, species, cohort) analysis tables.
pub mod assembler;
pub mod builder;
pub mod census;
pub mod cohort;
pub mod config;
pub mod correction;
pub mod error;
pub mod geometry;
pub mod kfunc;
pub mod pattern;
pub mod registry;
pub mod simulate;
pub mod snapshot;
pub mod weights;

pub use assembler::{
    AnalysisRow, AnalysisTableAssembler, AnalysisTables, CensusInput, DropReason, OutlierList,
    RunReport, Track,
};
pub use config::AnalysisConfig;
pub use error::{Result, SeedfallError};
pub use kfunc::{KCurve, Radii};
pub use registry::WindowRegistry;
pub use snapshot::AnalysisSnapshot;
pub use weights::{CountAreaWeights, WeightFunction};
