use rayon::prelude::*;

use crate::document::model::{CoverageThreshold, SplashDocument};
use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::parallel::build_thread_pool;
use crate::foundation::report::SkipReport;
use crate::raster::grid::{DEFAULT_MAX_GRID_CELLS, GridSpec, Placement, Resolution};

/// Controls for [`composite`].
#[derive(Clone, Debug)]
pub struct CompositeConfig {
    pub resolution: Resolution,
    pub max_grid_cells: u64,
    pub threshold: CoverageThreshold,
    /// Worker threads; `None` uses rayon's default.
    pub threads: Option<usize>,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            max_grid_cells: DEFAULT_MAX_GRID_CELLS,
            threshold: CoverageThreshold::default(),
            threads: None,
        }
    }
}

impl CompositeConfig {
    pub fn validate(&self) -> SplashResult<()> {
        self.resolution.validate()?;
        if self.max_grid_cells == 0 {
            return Err(SplashError::validation("max_grid_cells must be > 0"));
        }
        Ok(())
    }
}

/// Per-cell count of how many documents cover each cell of a shared grid.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlapRaster {
    grid: GridSpec,
    counts: Vec<u32>,
    sources: usize,
}

impl OverlapRaster {
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Row-major counts, row 0 at the northern edge.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Number of documents that were composited.
    pub fn sources(&self) -> usize {
        self.sources
    }

    pub fn get(&self, col: u32, row: u32) -> u32 {
        self.counts[(row as usize) * (self.grid.width as usize) + (col as usize)]
    }

    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// `histogram()[k]` is the number of cells covered by exactly `k` documents.
    pub fn histogram(&self) -> Vec<u64> {
        let mut out = vec![0u64; self.sources + 1];
        for &c in &self.counts {
            out[c as usize] += 1;
        }
        out
    }
}

#[derive(Debug)]
pub struct CompositeOutcome {
    pub raster: OverlapRaster,
    /// Documents rejected for their geometry.
    pub skipped: SkipReport,
}

/// Resample every document onto one grid over the union of their boxes and count overlaps.
///
/// Documents with a degenerate box or an empty mask are skipped; when none remain the call
/// fails with [`SplashError::NoValidInput`].
#[tracing::instrument(skip_all, fields(documents = documents.len()))]
pub fn composite(
    documents: &[SplashDocument],
    cfg: &CompositeConfig,
) -> SplashResult<CompositeOutcome> {
    cfg.validate()?;

    let mut skipped = SkipReport::new();
    let mut valid = Vec::with_capacity(documents.len());
    for doc in documents {
        match doc.validate_geometry() {
            Ok(()) => valid.push(doc),
            Err(e) => skipped.push(doc.id.clone(), e),
        }
    }
    let Some((first, rest)) = valid.split_first() else {
        return Err(SplashError::no_valid_input(format!(
            "none of the {} documents has usable geometry",
            documents.len()
        )));
    };

    let union = rest
        .iter()
        .fold(first.bounding_box, |acc, d| acc.union(&d.bounding_box));
    let (cell_h, cell_w) = cfg
        .resolution
        .cell_size(valid.iter().map(|d| (&d.bounding_box, &d.mask)))?;
    let grid = GridSpec::covering(union, cell_h, cell_w, cfg.max_grid_cells)?;
    tracing::debug!(
        width = grid.width,
        height = grid.height,
        north = union.north,
        south = union.south,
        east = union.east,
        west = union.west,
        "shared grid"
    );

    let pool = build_thread_pool(cfg.threads)?;
    let threshold = cfg.threshold;
    let counts = pool.install(|| {
        let placements = valid
            .par_iter()
            .map(|d| Placement::new(&grid, &d.bounding_box, &d.mask))
            .collect::<Vec<_>>();

        let mut counts = vec![0u32; grid.len()];
        counts
            .par_chunks_mut(grid.width as usize)
            .enumerate()
            .for_each(|(row, out)| accumulate_row(row as u32, out, &placements, threshold));
        counts
    });

    let raster = OverlapRaster {
        grid,
        counts,
        sources: valid.len(),
    };
    tracing::info!(
        composited = raster.sources,
        skipped = skipped.len(),
        max_count = raster.max_count(),
        "composite complete"
    );
    Ok(CompositeOutcome { raster, skipped })
}

/// Each row is owned by exactly one worker, which visits documents one after another.
fn accumulate_row(row: u32, out: &mut [u32], placements: &[Placement<'_>], t: CoverageThreshold) {
    for p in placements {
        let Some(src_row) = p.source_row(row) else {
            continue;
        };
        let values = p.mask.row(src_row);
        for (cell, src_col) in out.iter_mut().zip(&p.cols) {
            if let Some(c) = *src_col
                && t.covers(values[c as usize])
            {
                *cell += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/composite.rs"]
mod tests;
