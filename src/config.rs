use std::path::Path;

use anyhow::Context as _;

use crate::document::model::CoverageThreshold;
use crate::foundation::error::{SplashError, SplashResult};
use crate::rank::{AreaModel, RankConfig};
use crate::raster::classify::BandTable;
use crate::raster::composite::CompositeConfig;
use crate::raster::grid::{DEFAULT_MAX_GRID_CELLS, Resolution};

/// Run-wide settings, loadable from JSON. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplashConfig {
    /// Mask values above this count as covered.
    pub coverage_threshold: CoverageThreshold,
    /// Cell size of the shared merge grid.
    pub resolution: Resolution,
    /// Upper bound on shared grid cells.
    pub max_grid_cells: u64,
    /// Overlap count → color table for merge output.
    pub bands: BandTable,
    /// Pixel → square mile conversion used by rank.
    pub area: AreaModel,
    /// Worker threads (`None` = rayon default).
    pub threads: Option<usize>,
}

impl Default for SplashConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: CoverageThreshold::default(),
            resolution: Resolution::default(),
            max_grid_cells: DEFAULT_MAX_GRID_CELLS,
            bands: BandTable::default(),
            area: AreaModel::default(),
            threads: None,
        }
    }
}

impl SplashConfig {
    pub fn from_json_file(path: &Path) -> SplashResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            SplashError::validation(format!("config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SplashResult<()> {
        self.composite_config().validate()?;
        self.bands.validate()?;
        self.area.validate()?;
        if self.threads == Some(0) {
            return Err(SplashError::validation("'threads' must be >= 1 when set"));
        }
        Ok(())
    }

    pub fn composite_config(&self) -> CompositeConfig {
        CompositeConfig {
            resolution: self.resolution,
            max_grid_cells: self.max_grid_cells,
            threshold: self.coverage_threshold,
            threads: self.threads,
        }
    }

    pub fn rank_config(&self) -> RankConfig {
        RankConfig {
            threshold: self.coverage_threshold,
            area: self.area,
            threads: self.threads,
        }
    }
}
