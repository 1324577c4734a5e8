//! Census input tables: stems, dispersal traits and site covariates.
//!
//! Column cleaning happens upstream; these types only describe the cleaned
//! rows. The one cleaning step kept here is duplicate jitter, which must run
//! once before cohort assignment.
use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::geometry::Point2;

// ── Stems ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    /// Unmeasured juvenile; diameter is nominal.
    Sapling,
    /// Stem with a measured diameter.
    Stem,
}

/// One cleaned census record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stem {
    pub site: String,
    pub species: String,
    /// Unique stem id.
    pub tag: String,
    /// Diameter in cm. Null for saplings.
    #[serde(default)]
    pub dbh: Option<f64>,
    pub stage: LifeStage,
    /// Easting, plot metres.
    #[serde(alias = "e")]
    pub x: f64,
    /// Northing, plot metres.
    #[serde(alias = "n")]
    pub y: f64,
}

impl Stem {
    #[inline]
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// Group stems by site, preserving input order within each site.
pub fn partition_by_site(stems: Vec<Stem>) -> BTreeMap<String, Vec<Stem>> {
    let mut by_site: BTreeMap<String, Vec<Stem>> = BTreeMap::new();
    for stem in stems {
        by_site.entry(stem.site.clone()).or_default().push(stem);
    }
    by_site
}

/// Half-width of the uniform jitter applied to exact duplicates (metres).
pub const DEFAULT_JITTER: f64 = 0.01;

/// Jitter exact duplicates on (site, coordinates, species, stage).
///
/// The first record of each duplicate group keeps its position; every later
/// one is moved by an independent uniform offset in `[-amount, amount]` on
/// both axes. Deterministic for a given `seed`. Returns the number of stems
/// moved.
pub fn jitter_duplicates(stems: &mut [Stem], seed: u64, amount: f64) -> usize {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x9E37_79B9_7F4A_7C15);
    let mut seen: HashMap<(String, String, LifeStage, u64, u64), usize> = HashMap::new();
    let mut moved = 0;
    for stem in stems.iter_mut() {
        let key = (
            stem.site.clone(),
            stem.species.clone(),
            stem.stage,
            stem.x.to_bits(),
            stem.y.to_bits(),
        );
        let count = seen.entry(key).or_insert(0);
        if *count > 0 {
            stem.x += rng.gen_range(-amount..=amount);
            stem.y += rng.gen_range(-amount..=amount);
            moved += 1;
        }
        *count += 1;
    }
    moved
}

// ── Dispersal traits ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
}

/// Guild columns arrive as booleans, 0/1 integers or nulls.
fn guild_flags<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<BTreeMap<String, Option<bool>>, D::Error> {
    let raw: BTreeMap<String, Option<RawFlag>> = BTreeMap::deserialize(d)?;
    raw.into_iter()
        .map(|(guild, flag)| {
            let value = match flag {
                None => None,
                Some(RawFlag::Bool(b)) => Some(b),
                Some(RawFlag::Int(0)) => Some(false),
                Some(RawFlag::Int(1)) => Some(true),
                Some(RawFlag::Int(other)) => {
                    return Err(D::Error::custom(format!(
                        "guild `{guild}` must be 0 or 1, got {other}"
                    )))
                }
            };
            Ok((guild, value))
        })
        .collect()
}

/// One row of the dispersal-syndrome table: species plus one flag per
/// disperser guild (e.g. large primates, birds, bats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersalTraits {
    pub species: String,
    #[serde(flatten, deserialize_with = "guild_flags")]
    pub guilds: BTreeMap<String, Option<bool>>,
}

impl DispersalTraits {
    /// At least one guild column is recorded.
    pub fn is_present(&self) -> bool {
        self.guilds.values().any(Option::is_some)
    }
}

// ── Site covariates ───────────────────────────────────────────────────────────

/// Site-level covariates, passed through unchanged into analysis rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteCovariates {
    pub site: String,
    pub forest: String,
    pub plot: String,
    /// Hunting-pressure index.
    pub hunting_pressure: f64,
    /// Disperser-density covariates by guild.
    #[serde(default)]
    pub disperser_density: BTreeMap<String, f64>,
}
