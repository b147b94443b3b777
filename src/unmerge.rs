//! Splitting a combined multi-entry document back into independent splash documents.
//!
//! This is the structural inverse of bundling entries into one container. It never tries to
//! recover per-document masks from an [`OverlapRaster`](crate::OverlapRaster); that information
//! is gone once counts are summed.

use crate::document::model::{Mask, Metadata, MetadataKey, SplashDocument};
use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::geo::BoundingBox;
use crate::foundation::report::SkipReport;
use crate::raster::grid::{DEFAULT_MAX_GRID_CELLS, mosaic};

/// A container holding several overlays, grouped the way the exporting tool nests folders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CombinedDocument {
    pub name: String,
    pub groups: Vec<EntryGroup>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryGroup {
    pub name: String,
    pub entries: Vec<NestedEntry>,
}

/// One overlay inside a combined document, as found (possibly incomplete).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NestedEntry {
    pub name: Option<String>,
    pub metadata: Metadata,
    pub tiles: Vec<EntryTile>,
}

/// One raster tile of an entry. `mask` is `None` when the referenced asset could not be found.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryTile {
    pub label: String,
    pub href: Option<String>,
    pub bounding_box: Option<BoundingBox>,
    pub mask: Option<Mask>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnmergedDocument {
    /// Name of the group the entry was nested under.
    pub group: String,
    pub document: SplashDocument,
}

#[derive(Debug)]
pub struct UnmergeOutcome {
    pub documents: Vec<UnmergedDocument>,
    pub skipped: SkipReport,
}

/// Emit one self-contained document per well-formed entry, in container order.
pub fn unmerge(combined: &CombinedDocument) -> SplashResult<UnmergeOutcome> {
    unmerge_with_limit(combined, DEFAULT_MAX_GRID_CELLS)
}

/// [`unmerge`], mosaicking each entry's tiles onto at most `max_grid_cells` cells.
#[tracing::instrument(skip_all, fields(container = %combined.name))]
pub fn unmerge_with_limit(
    combined: &CombinedDocument,
    max_grid_cells: u64,
) -> SplashResult<UnmergeOutcome> {
    let mut documents = Vec::new();
    let mut skipped = SkipReport::new();

    for group in &combined.groups {
        for (idx, entry) in group.entries.iter().enumerate() {
            let label = entry
                .name
                .clone()
                .unwrap_or_else(|| format!("{}[{idx}]", group.name));
            match entry_document(entry, max_grid_cells) {
                Ok(document) => documents.push(UnmergedDocument {
                    group: group.name.clone(),
                    document,
                }),
                Err(e) => skipped.push(label, e),
            }
        }
    }

    if documents.is_empty() {
        return Err(SplashError::no_valid_entries(format!(
            "'{}' has no complete entries ({})",
            combined.name,
            skipped.summary()
        )));
    }
    tracing::info!(
        recovered = documents.len(),
        skipped = skipped.len(),
        "unmerge complete"
    );
    Ok(UnmergeOutcome { documents, skipped })
}

fn entry_document(entry: &NestedEntry, max_grid_cells: u64) -> SplashResult<SplashDocument> {
    let name = entry
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SplashError::incomplete_entry("entry has no name"))?;
    if entry.tiles.is_empty() {
        return Err(SplashError::incomplete_entry(format!(
            "'{name}' has no overlay tiles"
        )));
    }

    let mut parts = Vec::with_capacity(entry.tiles.len());
    for tile in &entry.tiles {
        let bbox = tile.bounding_box.ok_or_else(|| {
            SplashError::incomplete_entry(format!(
                "'{name}' tile '{}' has no bounding box",
                tile.label
            ))
        })?;
        let mask = tile.mask.as_ref().ok_or_else(|| {
            SplashError::incomplete_entry(format!(
                "'{name}' tile '{}' has no mask ({})",
                tile.label,
                tile.href.as_deref().unwrap_or("no href")
            ))
        })?;
        parts.push((bbox, mask));
    }

    let (bounding_box, mask) = mosaic(&parts, max_grid_cells)
        .map_err(|e| SplashError::invalid_geometry(format!("'{name}': {e}")))?;

    let mut metadata = entry.metadata.clone();
    metadata.insert(MetadataKey::Title, name.to_string());
    Ok(SplashDocument {
        id: name.to_string(),
        bounding_box,
        mask,
        metadata,
    })
}

#[cfg(test)]
#[path = "../tests/unit/unmerge.rs"]
mod tests;
