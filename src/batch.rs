//! Directory-level runs: discovery, parallel loading and the five batch operations.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rayon::prelude::*;

use crate::config::SplashConfig;
use crate::container::{self, sanitize_file_stem};
use crate::document::model::SplashDocument;
use crate::document::redact::Redactor;
use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::parallel::build_thread_pool;
use crate::foundation::report::SkipReport;
use crate::rank::rank;
use crate::raster::classify::render;
use crate::raster::composite::composite;
use crate::raster::grid::DEFAULT_MAX_GRID_CELLS;
use crate::unmerge::unmerge_with_limit;

/// File name merge writes when no output is given.
pub const DEFAULT_MERGE_OUTPUT: &str = "CombinedSanitized.kmz";
/// Document name of merge output.
pub const DEFAULT_MERGE_TITLE: &str = "CombinedMap";

/// What a batch run did.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Documents or files handled successfully.
    pub processed: usize,
    pub skipped: SkipReport,
}

impl BatchSummary {
    pub fn succeeded(&self) -> bool {
        self.processed > 0
    }
}

/// `*.kmz` files (any case) directly inside `dir`, sorted by path.
pub fn discover_containers(dir: &Path) -> SplashResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read directory '{}'", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read directory '{}'", dir.display()))?;
        let path = entry.path();
        let is_kmz = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("kmz"));
        if is_kmz && path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    tracing::debug!(dir = %dir.display(), found = out.len(), "discovered containers");
    Ok(out)
}

/// Documents that loaded, in input order, plus what did not.
#[derive(Debug, Default)]
pub struct LoadedBatch {
    pub documents: Vec<SplashDocument>,
    pub skipped: SkipReport,
}

/// Load containers in parallel with `cfg.threads` workers. Order follows `paths`; repeated ids
/// get a `-2`, `-3`, ... suffix.
#[tracing::instrument(skip_all, fields(paths = paths.len()))]
pub fn load_documents(paths: &[PathBuf], cfg: &SplashConfig) -> SplashResult<LoadedBatch> {
    let pool = build_thread_pool(cfg.threads)?;
    let results = pool.install(|| {
        paths
            .par_iter()
            .map(|p| container::load_with_limit(p, cfg.max_grid_cells))
            .collect::<Vec<_>>()
    });

    let mut batch = LoadedBatch::default();
    let mut seen = HashSet::new();
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(mut doc) => {
                if !seen.insert(doc.id.clone()) {
                    let base = doc.id.clone();
                    let mut n = 2;
                    while !seen.insert(format!("{base}-{n}")) {
                        n += 1;
                    }
                    doc.id = format!("{base}-{n}");
                    tracing::debug!(%base, id = %doc.id, "renamed duplicate id");
                }
                batch.documents.push(doc);
            }
            Err(e) => batch.skipped.push(path.display().to_string(), e),
        }
    }
    Ok(batch)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Composite every input into one overlap image and write it to `output`.
///
/// `output` is never read as an input, even when it is listed.
#[tracing::instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
pub fn run_merge(
    inputs: &[PathBuf],
    output: &Path,
    title: &str,
    cfg: &SplashConfig,
) -> SplashResult<BatchSummary> {
    cfg.validate()?;
    let inputs = inputs
        .iter()
        .filter(|p| !same_file(p, output))
        .cloned()
        .collect::<Vec<_>>();

    let LoadedBatch {
        documents,
        mut skipped,
    } = load_documents(&inputs, cfg)?;
    if documents.is_empty() {
        return Err(SplashError::no_valid_input(format!(
            "none of the {} containers could be loaded ({})",
            inputs.len(),
            skipped.summary()
        )));
    }

    let outcome = composite(&documents, &cfg.composite_config())?;
    skipped.extend(outcome.skipped);
    let raster = outcome.raster;
    let image = render(&raster, &cfg.bands)?;
    container::save_composite(&image, &raster.grid().bounding_box, title, output)?;

    tracing::info!(
        merged = raster.sources(),
        width = raster.grid().width,
        height = raster.grid().height,
        max_overlap = raster.max_count(),
        "merge written"
    );
    Ok(BatchSummary {
        processed: raster.sources(),
        skipped,
    })
}

/// Rank every input by coverage and write the CSV report to `out`.
#[tracing::instrument(skip_all, fields(inputs = inputs.len()))]
pub fn run_rank(
    inputs: &[PathBuf],
    cfg: &SplashConfig,
    out: impl Write,
) -> SplashResult<BatchSummary> {
    cfg.validate()?;
    let LoadedBatch {
        documents,
        mut skipped,
    } = load_documents(inputs, cfg)?;
    if documents.is_empty() {
        return Err(SplashError::no_valid_input(format!(
            "none of the {} containers could be loaded ({})",
            inputs.len(),
            skipped.summary()
        )));
    }

    let report = rank(&documents, &cfg.rank_config())?;
    report.write_csv(out)?;
    let processed = report.rows.len();
    skipped.extend(report.skipped);
    Ok(BatchSummary { processed, skipped })
}

/// Strip identifying metadata from every input in place.
#[tracing::instrument(skip_all, fields(inputs = inputs.len()))]
pub fn run_strip(inputs: &[PathBuf], redactor: &Redactor) -> SplashResult<BatchSummary> {
    let mut summary = BatchSummary::default();
    let mut removed = 0;
    for path in inputs {
        match container::strip_in_place(path, redactor) {
            Ok(n) => {
                summary.processed += 1;
                removed += n;
            }
            Err(e) => summary.skipped.push(path.display().to_string(), e),
        }
    }
    tracing::info!(
        files = summary.processed,
        removed,
        skipped = summary.skipped.len(),
        "strip complete"
    );
    Ok(summary)
}

#[derive(Clone, Debug)]
pub struct UnmergeOptions {
    /// Replace files that already exist instead of leaving them alone.
    pub overwrite: bool,
    /// Redact recovered documents before writing them.
    pub redact: Option<Redactor>,
    /// Cap on the mosaic of one entry's tiles.
    pub max_grid_cells: u64,
}

impl Default for UnmergeOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            redact: None,
            max_grid_cells: DEFAULT_MAX_GRID_CELLS,
        }
    }
}

/// Output path for one entry, suffixed `-2`, `-3`, ... when an earlier entry of this run
/// already took it.
fn entry_path(dir: &Path, id: &str, taken: &mut HashSet<PathBuf>) -> PathBuf {
    let stem = sanitize_file_stem(id);
    let mut path = dir.join(format!("{stem}.kmz"));
    let mut n = 2;
    while !taken.insert(path.clone()) {
        path = dir.join(format!("{stem}-{n}.kmz"));
        n += 1;
    }
    path
}

/// Split a combined container into `<out_dir>/<group>/<id>.kmz` files, one per entry.
///
/// Files that existed before the run count as processed and are left untouched unless
/// `overwrite` is set.
#[tracing::instrument(skip_all, fields(input = %input.display(), out_dir = %out_dir.display()))]
pub fn run_unmerge(
    input: &Path,
    out_dir: &Path,
    opts: &UnmergeOptions,
) -> SplashResult<BatchSummary> {
    let combined = container::load_combined(input)?;
    let outcome = unmerge_with_limit(&combined, opts.max_grid_cells)?;

    let mut summary = BatchSummary {
        processed: 0,
        skipped: outcome.skipped,
    };
    let mut taken = HashSet::new();
    for recovered in outcome.documents {
        let mut doc = recovered.document;
        let dir = out_dir.join(sanitize_file_stem(&recovered.group));
        let path = entry_path(&dir, &doc.id, &mut taken);
        if path.exists() && !opts.overwrite {
            tracing::info!(path = %path.display(), "already exists, leaving it");
            summary.processed += 1;
            continue;
        }
        if let Some(redactor) = &opts.redact {
            redactor.redact(&mut doc);
        }
        container::save(&doc, &path)?;
        tracing::info!(path = %path.display(), "wrote entry");
        summary.processed += 1;
    }
    Ok(summary)
}

/// Pack single containers into one combined container under `group`.
#[tracing::instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
pub fn run_bundle(
    inputs: &[PathBuf],
    group: &str,
    output: &Path,
    cfg: &SplashConfig,
) -> SplashResult<BatchSummary> {
    cfg.validate()?;
    let inputs = inputs
        .iter()
        .filter(|p| !same_file(p, output))
        .cloned()
        .collect::<Vec<_>>();
    let LoadedBatch { documents, skipped } = load_documents(&inputs, cfg)?;
    if documents.is_empty() {
        return Err(SplashError::no_valid_input(format!(
            "none of the {} containers could be loaded ({})",
            inputs.len(),
            skipped.summary()
        )));
    }
    container::save_combined(group, &documents, output)?;
    tracing::info!(bundled = documents.len(), "bundle written");
    Ok(BatchSummary {
        processed: documents.len(),
        skipped,
    })
}

#[cfg(test)]
#[path = "../tests/unit/batch.rs"]
mod tests;
