//! Prints per-site summaries of a saved analysis snapshot.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

use seedfall_core::{AnalysisRow, AnalysisSnapshot, Track};

#[derive(Parser, Debug)]
#[command(name = "inspect", about = "Summarise an analysis snapshot without recomputing it")]
struct Args {
    /// Snapshot written by `assemble`.
    #[arg(default_value = "data/analysis_snapshot.json")]
    snapshot: PathBuf,

    /// Only this site.
    #[arg(short, long)]
    site: Option<String>,

    /// Print every row's corrected curve.
    #[arg(short, long)]
    curves: bool,
}

#[derive(Default)]
struct SiteSummary {
    species: usize,
    rows: usize,
    focal: usize,
    /// Corrected K at the largest radius, summed over rows.
    tail_sum: f64,
}

fn summarise<'a>(rows: impl Iterator<Item = &'a AnalysisRow>) -> BTreeMap<&'a str, SiteSummary> {
    let mut by_site: BTreeMap<&str, (SiteSummary, Vec<&str>)> = BTreeMap::new();
    for r in rows {
        let (s, species) = by_site.entry(r.site.as_str()).or_default();
        s.rows += 1;
        s.focal += r.n_focal;
        s.tail_sum += r.curve.values.last().and_then(|v| v.empirical).unwrap_or(0.0);
        if !species.contains(&r.species.as_str()) {
            species.push(r.species.as_str());
        }
    }
    by_site
        .into_iter()
        .map(|(site, (mut s, species))| {
            s.species = species.len();
            (site, s)
        })
        .collect()
}

fn print_curve(row: &AnalysisRow) {
    let values: Vec<String> = row
        .curve
        .values
        .iter()
        .map(|v| v.empirical.map_or_else(|| "NA".to_string(), |k| format!("{k:.2}")))
        .collect();
    println!("    {:<20} {:<6} [{}]", row.species, row.cohort, values.join(", "));
}

fn main() -> Result<()> {
    let args = Args::parse();
    let snapshot = AnalysisSnapshot::load(&args.snapshot)
        .with_context(|| format!("loading snapshot {}", args.snapshot.display()))?;

    println!(
        "rmax {}  radii {}  cohorts [{}]  min interior cohorts {}",
        snapshot.config.rmax,
        snapshot.radii.len(),
        snapshot.config.cohorts.labels().join(", "),
        snapshot.config.min_interior_cohorts
    );

    let keep = |r: &&AnalysisRow| args.site.as_deref().map_or(true, |s| r.site == s);
    let tracks =
        [(Track::Univariate, &snapshot.univariate), (Track::Bivariate, &snapshot.bivariate)];
    for (track, rows) in tracks {
        println!("\n{track}");
        println!(
            "  {:<12} {:>8} {:>6} {:>8} {:>12}",
            "Site", "Species", "Rows", "Stems", "Mean K(rmax)"
        );
        println!("  {}", "-".repeat(50));
        for (site, s) in summarise(rows.iter().filter(keep)) {
            let mean = if s.rows > 0 { s.tail_sum / s.rows as f64 } else { 0.0 };
            println!("  {:<12} {:>8} {:>6} {:>8} {:>12.2}", site, s.species, s.rows, s.focal, mean);
        }
        if args.curves {
            for row in rows.iter().filter(keep) {
                print_curve(row);
            }
        }
    }

    let report = &snapshot.report;
    println!(
        "\n{} dropped unit(s), {} failed unit(s)",
        report.dropped.len(),
        report.failures.len()
    );
    for f in report.failures.iter().filter(|f| args.site.as_deref().map_or(true, |s| f.site == s)) {
        println!(
            "  {} {} {}: {}",
            f.site,
            f.species.as_deref().unwrap_or("*"),
            f.cohort.as_deref().unwrap_or("*"),
            f.reason
        );
    }
    Ok(())
}
