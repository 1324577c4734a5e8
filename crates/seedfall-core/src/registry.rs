//! Per-site window registry.
//!
//! Each site owns a *full* census window and a smaller *core* window used for
//! minus-sampling. The plus-sampling window for adults is derived on demand by
//! buffering the core window; it is never stored.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeedfallError};
use crate::geometry::{Polygon, Window, WindowId, WindowKind};

/// Raw per-site window definition as read from the windows file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteWindowDef {
    pub site: String,
    pub core: Polygon,
    pub full: Polygon,
}

#[derive(Debug, Clone)]
struct SiteWindows {
    core: Arc<Window>,
    full: Arc<Window>,
}

/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct WindowRegistry {
    sites: BTreeMap<String, SiteWindows>,
    raster_cells: usize,
}

impl WindowRegistry {
    /// Build the registry, checking that every core window lies inside its
    /// full window.
    pub fn new(defs: Vec<SiteWindowDef>, raster_cells: usize) -> Result<Self> {
        let mut sites = BTreeMap::new();
        for def in defs {
            if let Some(v) = def.core.vertices().iter().find(|&&v| !def.full.contains(v)) {
                return Err(SeedfallError::InvalidWindow {
                    reason: format!(
                        "site `{}`: core vertex ({}, {}) lies outside the full window",
                        def.site, v.x, v.y
                    ),
                });
            }
            let core = Window::polygon(WindowId::new(def.site.clone(), WindowKind::Core), def.core);
            let full = Window::polygon(WindowId::new(def.site.clone(), WindowKind::Full), def.full);
            let windows = SiteWindows { core: Arc::new(core), full: Arc::new(full) };
            if sites.insert(def.site.clone(), windows).is_some() {
                return Err(SeedfallError::InvalidWindow {
                    reason: format!("site `{}` is defined twice", def.site),
                });
            }
        }
        Ok(Self { sites, raster_cells })
    }

    /// Parse a JSON array of [`SiteWindowDef`].
    pub fn from_json(json: &str, raster_cells: usize) -> Result<Self> {
        let defs: Vec<SiteWindowDef> = serde_json::from_str(json)?;
        Self::new(defs, raster_cells)
    }

    fn site(&self, site: &str) -> Result<&SiteWindows> {
        self.sites
            .get(site)
            .ok_or_else(|| SeedfallError::UnknownSite { site: site.to_string() })
    }

    pub fn core_window(&self, site: &str) -> Result<Arc<Window>> {
        Ok(Arc::clone(&self.site(site)?.core))
    }

    pub fn full_window(&self, site: &str) -> Result<Arc<Window>> {
        Ok(Arc::clone(&self.site(site)?.full))
    }

    /// Core window dilated by `radius`.
    pub fn buffered_window(&self, site: &str, radius: f64) -> Result<Arc<Window>> {
        let core = &self.site(site)?.core;
        Ok(Arc::new(core.buffered(radius, self.raster_cells)?))
    }

    pub fn sites(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }
}
