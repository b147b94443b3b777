use crate::document::model::Mask;
use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::geo::BoundingBox;

/// Largest shared grid built unless configured otherwise (400 MB of `u32` counts).
pub const DEFAULT_MAX_GRID_CELLS: u64 = 100_000_000;

/// Spans within this many cells of a whole multiple do not gain an extra column or row.
const ALIGN_EPS: f64 = 1e-9;

/// How the shared grid's cell size is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Resolution {
    /// The smallest source cell height and width among the inputs.
    #[default]
    FinestInput,
    /// A fixed density in cells per degree.
    PixelsPerDegree { lat: f64, lon: f64 },
}

impl Resolution {
    pub fn validate(&self) -> SplashResult<()> {
        if let Self::PixelsPerDegree { lat, lon } = *self
            && !(lat.is_finite() && lon.is_finite() && lat > 0.0 && lon > 0.0)
        {
            return Err(SplashError::validation(format!(
                "pixels per degree must be finite and > 0 (got lat={lat}, lon={lon})"
            )));
        }
        Ok(())
    }

    /// Cell `(height, width)` in degrees for the given sources.
    ///
    /// Sources must already have valid boxes and non-empty masks.
    pub fn cell_size<'a>(
        &self,
        sources: impl IntoIterator<Item = (&'a BoundingBox, &'a Mask)>,
    ) -> SplashResult<(f64, f64)> {
        match *self {
            Self::PixelsPerDegree { lat, lon } => Ok((1.0 / lat, 1.0 / lon)),
            Self::FinestInput => {
                let mut cell_h = f64::INFINITY;
                let mut cell_w = f64::INFINITY;
                for (bbox, mask) in sources {
                    cell_h = cell_h.min(bbox.height_deg() / f64::from(mask.height()));
                    cell_w = cell_w.min(bbox.width_deg() / f64::from(mask.width()));
                }
                if !(cell_h.is_finite() && cell_w.is_finite() && cell_h > 0.0 && cell_w > 0.0) {
                    return Err(SplashError::invalid_geometry(
                        "cannot derive a grid resolution without sources",
                    ));
                }
                Ok((cell_h, cell_w))
            }
        }
    }
}

/// A regular equirectangular grid over a bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    pub bounding_box: BoundingBox,
    pub width: u32,
    pub height: u32,
}

impl GridSpec {
    /// Smallest grid over `bbox` whose cells are no larger than `cell_h × cell_w` degrees.
    ///
    /// The final cell size is stretched so the grid covers `bbox` exactly.
    pub fn covering(
        bbox: BoundingBox,
        cell_h: f64,
        cell_w: f64,
        max_cells: u64,
    ) -> SplashResult<Self> {
        bbox.validate()?;
        let width = cells_along(bbox.width_deg(), cell_w)?;
        let height = cells_along(bbox.height_deg(), cell_h)?;
        let cells = u64::from(width) * u64::from(height);
        if cells > max_cells {
            return Err(SplashError::validation(format!(
                "shared grid of {width}x{height} cells exceeds the limit of {max_cells}"
            )));
        }
        Ok(Self {
            bounding_box: bbox,
            width,
            height,
        })
    }

    pub fn len(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_width_deg(&self) -> f64 {
        self.bounding_box.width_deg() / f64::from(self.width)
    }

    pub fn cell_height_deg(&self) -> f64 {
        self.bounding_box.height_deg() / f64::from(self.height)
    }

    pub fn cell_center_lon(&self, col: u32) -> f64 {
        self.bounding_box.west + (f64::from(col) + 0.5) * self.cell_width_deg()
    }

    pub fn cell_center_lat(&self, row: u32) -> f64 {
        self.bounding_box.north - (f64::from(row) + 0.5) * self.cell_height_deg()
    }
}

fn cells_along(span: f64, cell: f64) -> SplashResult<u32> {
    if !(cell.is_finite() && cell > 0.0) {
        return Err(SplashError::validation(format!(
            "grid cell size must be finite and > 0 (got {cell})"
        )));
    }
    let n = ((span / cell) - ALIGN_EPS).ceil().max(1.0);
    if n > f64::from(u32::MAX) {
        return Err(SplashError::validation(format!(
            "{span} degrees at {cell} degrees per cell is too many cells"
        )));
    }
    Ok(n as u32)
}

/// Index of the source pixel containing `offset` along an axis of `span` degrees split into
/// `n` pixels, or `None` outside `[0, span)`.
#[inline]
fn source_index(offset: f64, span: f64, n: u32) -> Option<u32> {
    if !(offset >= 0.0 && offset < span) || n == 0 {
        return None;
    }
    let idx = (offset / span * f64::from(n)).floor() as u32;
    Some(idx.min(n - 1))
}

/// A source mask positioned on a shared grid.
///
/// The projection is equirectangular, so the source column depends only on the shared column
/// and the source row only on the shared row; both are precomputed once.
pub(crate) struct Placement<'a> {
    pub(crate) mask: &'a Mask,
    pub(crate) cols: Vec<Option<u32>>,
    rows: Vec<Option<u32>>,
}

impl<'a> Placement<'a> {
    pub(crate) fn new(grid: &GridSpec, bbox: &BoundingBox, mask: &'a Mask) -> Self {
        let cols = (0..grid.width)
            .map(|c| {
                let offset = grid.cell_center_lon(c) - bbox.west;
                source_index(offset, bbox.width_deg(), mask.width())
            })
            .collect();
        let rows = (0..grid.height)
            .map(|r| {
                let offset = bbox.north - grid.cell_center_lat(r);
                source_index(offset, bbox.height_deg(), mask.height())
            })
            .collect();
        Self { mask, cols, rows }
    }

    #[inline]
    pub(crate) fn source_row(&self, row: u32) -> Option<u32> {
        self.rows[row as usize]
    }

    pub(crate) fn sample(&self, col: u32, row: u32) -> Option<u8> {
        let src_row = self.source_row(row)?;
        let src_col = self.cols[col as usize]?;
        Some(self.mask.get(src_col, src_row))
    }
}

/// Assemble adjacent tiles into one mask over their union at the finest tile resolution.
///
/// Overlapping pixels keep the highest value. A single tile is returned as is.
pub fn mosaic(
    tiles: &[(BoundingBox, &Mask)],
    max_cells: u64,
) -> SplashResult<(BoundingBox, Mask)> {
    let Some(((first_box, first_mask), rest)) = tiles.split_first() else {
        return Err(SplashError::invalid_geometry("no tiles to mosaic"));
    };
    for (bbox, mask) in tiles {
        bbox.validate()?;
        if mask.is_empty() {
            return Err(SplashError::invalid_geometry("tile has an empty mask"));
        }
    }
    if rest.is_empty() {
        return Ok((*first_box, (*first_mask).clone()));
    }

    let union = rest.iter().fold(*first_box, |acc, (bbox, _)| acc.union(bbox));
    let (cell_h, cell_w) = Resolution::FinestInput.cell_size(tiles.iter().map(|(b, m)| (b, *m)))?;
    let grid = GridSpec::covering(union, cell_h, cell_w, max_cells)?;

    let mut out = Mask::filled(grid.width, grid.height, 0);
    for (bbox, mask) in tiles {
        let placement = Placement::new(&grid, bbox, mask);
        for row in 0..grid.height {
            if placement.source_row(row).is_none() {
                continue;
            }
            for col in 0..grid.width {
                if let Some(v) = placement.sample(col, row)
                    && v > out.get(col, row)
                {
                    out.set(col, row, v);
                }
            }
        }
    }
    Ok((union, out))
}

#[cfg(test)]
#[path = "../../tests/unit/raster/grid.rs"]
mod tests;
