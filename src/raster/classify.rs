use rayon::prelude::*;

use crate::foundation::error::{SplashError, SplashResult};
use crate::raster::composite::OverlapRaster;

pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];
pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const YELLOW: [u8; 4] = [255, 255, 0, 255];
pub const GREEN: [u8; 4] = [0, 255, 0, 255];

/// Color used for every count from `min_count` up to the next band's threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColorBand {
    pub min_count: u32,
    /// Straight (non-premultiplied) RGBA8.
    pub rgba: [u8; 4],
}

/// Ordered count → color table; the last band is open-ended.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BandTable {
    bands: Vec<ColorBand>,
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            bands: vec![
                ColorBand {
                    min_count: 1,
                    rgba: RED,
                },
                ColorBand {
                    min_count: 2,
                    rgba: YELLOW,
                },
                ColorBand {
                    min_count: 3,
                    rgba: GREEN,
                },
            ],
        }
    }
}

impl BandTable {
    pub fn new(bands: Vec<ColorBand>) -> SplashResult<Self> {
        let table = Self { bands };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> SplashResult<()> {
        let Some(first) = self.bands.first() else {
            return Err(SplashError::validation("band table must not be empty"));
        };
        if first.min_count == 0 {
            return Err(SplashError::validation(
                "band min_count must be >= 1; count 0 is always transparent",
            ));
        }
        for pair in self.bands.windows(2) {
            if pair[1].min_count <= pair[0].min_count {
                return Err(SplashError::validation(format!(
                    "band thresholds must be strictly ascending ({} then {})",
                    pair[0].min_count, pair[1].min_count
                )));
            }
        }
        Ok(())
    }

    pub fn bands(&self) -> &[ColorBand] {
        &self.bands
    }

    /// Color for `count`: the band with the greatest `min_count <= count`, or transparent.
    #[inline]
    pub fn classify(&self, count: u32) -> [u8; 4] {
        if count == 0 {
            return TRANSPARENT;
        }
        match self.bands.partition_point(|b| b.min_count <= count) {
            0 => TRANSPARENT,
            i => self.bands[i - 1].rgba,
        }
    }
}

/// Render an overlap raster as a straight-alpha RGBA image, one pixel per grid cell.
pub fn render(raster: &OverlapRaster, bands: &BandTable) -> SplashResult<image::RgbaImage> {
    let grid = raster.grid();
    let mut data = vec![0u8; raster.counts().len() * 4];
    data.par_chunks_exact_mut(4)
        .zip(raster.counts().par_iter())
        .for_each(|(px, &count)| px.copy_from_slice(&bands.classify(count)));

    image::RgbaImage::from_raw(grid.width, grid.height, data).ok_or_else(|| {
        SplashError::validation(format!(
            "rendered buffer does not fit a {}x{} image",
            grid.width, grid.height
        ))
    })
}

#[cfg(test)]
#[path = "../../tests/unit/raster/classify.rs"]
mod tests;
