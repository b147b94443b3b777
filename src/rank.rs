//! Per-document coverage statistics and the ordered ranking report.

use std::io::Write;

use rayon::prelude::*;

use crate::document::model::{CoverageThreshold, SplashDocument};
use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::parallel::build_thread_pool;
use crate::foundation::report::SkipReport;

/// Square miles per pixel assumed by the first generation of ranking scripts.
pub const LEGACY_SQ_MI_PER_PIXEL: f64 = 1.5625e-3 / 2.0;

/// How covered pixels are converted to ground area.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum AreaModel {
    /// Cell size from the document's box and mask, longitude scaled by the cosine of the
    /// box's mid latitude.
    #[default]
    Geodesic,
    /// The same area for every pixel, regardless of where the document is.
    FixedPerPixel { sq_mi: f64 },
}

impl AreaModel {
    pub fn validate(&self) -> SplashResult<()> {
        if let Self::FixedPerPixel { sq_mi } = *self
            && !(sq_mi.is_finite() && sq_mi >= 0.0)
        {
            return Err(SplashError::validation(format!(
                "fixed area per pixel must be finite and >= 0 (got {sq_mi})"
            )));
        }
        Ok(())
    }

    fn cell_area_sq_mi(&self, doc: &SplashDocument) -> f64 {
        match *self {
            Self::Geodesic => doc
                .bounding_box
                .cell_area_sq_mi(doc.mask.width(), doc.mask.height()),
            Self::FixedPerPixel { sq_mi } => sq_mi,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RankConfig {
    pub threshold: CoverageThreshold,
    pub area: AreaModel,
    pub threads: Option<usize>,
}

/// Coverage of one document.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CoverageStat {
    pub id: String,
    pub pixel_count: u64,
    pub area_sq_mi: f64,
}

impl CoverageStat {
    pub fn of(doc: &SplashDocument, threshold: CoverageThreshold, area: AreaModel) -> Self {
        let pixel_count = doc.mask.covered_count(threshold);
        Self {
            id: doc.id.clone(),
            pixel_count,
            area_sq_mi: pixel_count as f64 * area.cell_area_sq_mi(doc),
        }
    }

    /// Most pixels first, then largest area, then id.
    fn rank_cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .pixel_count
            .cmp(&self.pixel_count)
            .then_with(|| other.area_sq_mi.total_cmp(&self.area_sq_mi))
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug)]
pub struct RankReport {
    /// Rows in rank order (best coverage first).
    pub rows: Vec<CoverageStat>,
    pub skipped: SkipReport,
}

impl RankReport {
    /// Header line, then `id,pixels,area_sq_mi` for each row in rank order.
    pub fn write_csv(&self, mut w: impl Write) -> SplashResult<()> {
        let write_err = |e: std::io::Error| SplashError::write(format!("rank report: {e}"));
        writeln!(w, "id,pixels,area_sq_mi").map_err(write_err)?;
        for row in &self.rows {
            writeln!(
                w,
                "{},{},{:.4}",
                csv_field(&row.id),
                row.pixel_count,
                row.area_sq_mi
            )
            .map_err(write_err)?;
        }
        w.flush().map_err(write_err)
    }
}

fn csv_field(s: &str) -> std::borrow::Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        std::borrow::Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        std::borrow::Cow::Borrowed(s)
    }
}

/// Rank documents by coverage. Documents whose geometry cannot be measured are skipped.
#[tracing::instrument(skip_all, fields(documents = documents.len()))]
pub fn rank(documents: &[SplashDocument], cfg: &RankConfig) -> SplashResult<RankReport> {
    cfg.area.validate()?;

    let mut skipped = SkipReport::new();
    let mut valid = Vec::with_capacity(documents.len());
    for doc in documents {
        match doc.validate_geometry() {
            Ok(()) => valid.push(doc),
            Err(e) => skipped.push(doc.id.clone(), e),
        }
    }
    if valid.is_empty() {
        return Err(SplashError::no_valid_input(format!(
            "none of the {} documents can be ranked",
            documents.len()
        )));
    }

    let pool = build_thread_pool(cfg.threads)?;
    let mut rows = pool.install(|| {
        valid
            .par_iter()
            .map(|doc| CoverageStat::of(doc, cfg.threshold, cfg.area))
            .collect::<Vec<_>>()
    });
    rows.sort_by(CoverageStat::rank_cmp);

    tracing::info!(ranked = rows.len(), skipped = skipped.len(), "rank complete");
    Ok(RankReport { rows, skipped })
}

#[cfg(test)]
#[path = "../tests/unit/rank.rs"]
mod tests;
