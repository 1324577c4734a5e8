//! Builds both analysis tables from cleaned census tables and writes one
//! snapshot JSON. Unit failures and dropped units are printed at the end.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use std::{fs, path::{Path, PathBuf}};
use tracing::info;
use tracing_subscriber::EnvFilter;

use seedfall_core::assembler::{AnalysisTables, DropReason, Track};
use seedfall_core::census::{
    jitter_duplicates, DispersalTraits, SiteCovariates, Stem, DEFAULT_JITTER,
};
use seedfall_core::{
    AnalysisConfig, AnalysisSnapshot, AnalysisTableAssembler, CensusInput, CountAreaWeights,
    OutlierList, WindowRegistry,
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "assemble",
    about = "Assemble univariate and bivariate K-function tables from census data"
)]
struct Args {
    /// Stem records (JSON array).
    #[arg(short, long)]
    stems: PathBuf,

    /// Dispersal-syndrome table (JSON array, guild flags as bool or 0/1).
    #[arg(short, long)]
    traits: PathBuf,

    /// Site covariates (JSON array).
    #[arg(short, long)]
    covariates: PathBuf,

    /// Core and full polygons per site (JSON array).
    #[arg(short, long)]
    windows: PathBuf,

    /// Analysis constants; defaults apply to any field left out.
    #[arg(long)]
    config: Option<PathBuf>,

    /// (site, species) pairs excluded from the bivariate table.
    #[arg(long, default_value = "data/bivariate_outliers.json")]
    outliers: PathBuf,

    /// Snapshot output path.
    #[arg(short, long, default_value = "data/analysis_snapshot.json")]
    output: PathBuf,

    /// Jitter exact duplicate stems with this seed before assembly.
    #[arg(long)]
    jitter_seed: Option<u64>,
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = read_text(path, what)?;
    serde_json::from_str(&text).with_context(|| format!("parsing {what} {}", path.display()))
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {what} {}", path.display()))
}

// ── Summary ───────────────────────────────────────────────────────────────────

fn print_summary(tables: &AnalysisTables) {
    eprintln!("\n{:<12} {:>6} {:>8} {:>8}", "Track", "Rows", "Sites", "Species");
    eprintln!("{}", "-".repeat(37));
    for track in [Track::Univariate, Track::Bivariate] {
        let rows = tables.rows(track);
        let mut sites: Vec<&str> = rows.iter().map(|r| r.site.as_str()).collect();
        sites.sort_unstable();
        sites.dedup();
        let mut species: Vec<(&str, &str)> =
            rows.iter().map(|r| (r.site.as_str(), r.species.as_str())).collect();
        species.sort_unstable();
        species.dedup();
        eprintln!(
            "{:<12} {:>6} {:>8} {:>8}",
            track.to_string(),
            rows.len(),
            sites.len(),
            species.len()
        );
    }

    let report = &tables.report;
    eprintln!("\nDropped:");
    for (reason, label) in [
        (DropReason::UndefinedCurve, "undefined curve"),
        (DropReason::LostCoverage, "lost cohort coverage"),
        (DropReason::AdultsOutsideBuffer, "adults outside buffer"),
        (DropReason::Outlier, "outlier"),
    ] {
        eprintln!("  {:<24} {:>5}", label, report.dropped_by(reason).count());
    }
    if report.jittered > 0 || report.unbinned > 0 {
        eprintln!("  jittered stems {}  unbinned stems {}", report.jittered, report.unbinned);
    }

    if !report.failures.is_empty() {
        eprintln!("\n{} unit(s) failed:", report.failures.len());
        for f in &report.failures {
            eprintln!(
                "  {:<10} {:<20} {:<6} {}",
                f.site,
                f.species.as_deref().unwrap_or("*"),
                f.cohort.as_deref().unwrap_or("*"),
                f.reason
            );
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json(&read_text(path, "config")?)
            .with_context(|| format!("invalid config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let registry =
        WindowRegistry::from_json(&read_text(&args.windows, "windows")?, config.raster_cells)
            .with_context(|| format!("invalid windows {}", args.windows.display()))?;
    let outliers = if args.outliers.exists() {
        OutlierList::from_json(&read_text(&args.outliers, "outlier list")?)
            .with_context(|| format!("invalid outlier list {}", args.outliers.display()))?
    } else {
        OutlierList::default()
    };

    let mut stems: Vec<Stem> = read_json(&args.stems, "stems")?;
    let traits: Vec<DispersalTraits> = read_json(&args.traits, "traits")?;
    let covariates: Vec<SiteCovariates> = read_json(&args.covariates, "covariates")?;
    if stems.is_empty() {
        bail!("no stems in {}", args.stems.display());
    }

    let jittered = match args.jitter_seed {
        Some(seed) => jitter_duplicates(&mut stems, seed, DEFAULT_JITTER),
        None => 0,
    };
    info!(
        stems = stems.len(),
        species = traits.len(),
        sites = covariates.len(),
        outliers = outliers.len(),
        jittered,
        "inputs loaded"
    );

    let input = CensusInput { stems, traits, covariates };
    let mut tables = AnalysisTableAssembler::new(&config, &registry, &CountAreaWeights, &outliers)
        .assemble(&input)
        .context("assembling analysis tables")?;
    tables.report.jittered = jittered;

    print_summary(&tables);

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    AnalysisSnapshot::new(config, tables)
        .save(&args.output)
        .with_context(|| format!("writing snapshot {}", args.output.display()))?;
    eprintln!("\nSnapshot written to {}", args.output.display());
    Ok(())
}
