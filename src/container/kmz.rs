//! Zipped splash containers: loading, saving, stripping, and the combined multi-entry form.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use zip::write::SimpleFileOptions;

use crate::container::kml::{self, OverlayRef};
use crate::container::tile::{TileName, base_name, image_name_for, is_overlay_image, sanitize_file_stem};
use crate::document::model::{Mask, SplashDocument};
use crate::document::redact::Redactor;
use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::geo::BoundingBox;
use crate::raster::grid::{DEFAULT_MAX_GRID_CELLS, mosaic};
use crate::unmerge::{CombinedDocument, EntryGroup, EntryTile, NestedEntry};

/// Marker entry written into merge output so it is never read back as a source.
pub const GENERATED_FLAG: &str = "DO_NOT_USE_AS_INPUT.flag";
const GENERATED_FLAG_TEXT: &str =
    "This KMZ was generated as output and should not be used as input.";
/// Root KML entry name of merge output.
pub const COMPOSITE_KML: &str = "combined.kml";

fn zip_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

/// All file entries of an archive, in archive order.
struct Archive {
    entries: Vec<(String, Vec<u8>)>,
}

impl Archive {
    fn read(bytes: &[u8]) -> SplashResult<Self> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| SplashError::corrupt_container(format!("not a readable zip: {e}")))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| SplashError::corrupt_container(format!("zip entry {i}: {e}")))?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).map_err(|e| {
                SplashError::corrupt_container(format!("zip entry '{name}': {e}"))
            })?;
            entries.push((name, data));
        }
        Ok(Self { entries })
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    fn is_generated(&self) -> bool {
        self.names().any(|n| base_name(n) == GENERATED_FLAG)
    }

    fn root_kml(&self) -> SplashResult<(&str, String)> {
        let name = root_kml_name(self.names())
            .ok_or_else(|| SplashError::corrupt_container("archive holds no KML entry"))?;
        let data = self.get(name).unwrap_or_default();
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| SplashError::corrupt_container(format!("'{name}' is not UTF-8: {e}")))?;
        Ok((name, text))
    }

    fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Entry an overlay `href` points at: the exact path first, then the base name.
    fn find_asset(&self, href: &str) -> Option<&[u8]> {
        let href = href.trim().trim_start_matches("./");
        self.get(href).or_else(|| {
            let wanted = base_name(href);
            self.entries
                .iter()
                .find(|(n, _)| base_name(n).eq_ignore_ascii_case(wanted))
                .map(|(_, d)| d.as_slice())
        })
    }
}

/// First `*.kml` at the archive root, otherwise the first anywhere.
fn root_kml_name<'a>(names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let kml = names
        .filter(|n| n.to_ascii_lowercase().ends_with(".kml"))
        .collect::<Vec<_>>();
    kml.iter()
        .find(|n| !n.contains('/'))
        .or_else(|| kml.first())
        .copied()
}

fn decode_mask(bytes: &[u8]) -> SplashResult<Mask> {
    let rgba = image::load_from_memory(bytes)
        .map_err(|e| SplashError::corrupt_container(format!("undecodable overlay image: {e}")))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Mask::from_rgba8_alpha(width, height, rgba.as_raw())
}

fn encode_png(img: image::RgbaImage) -> SplashResult<Vec<u8>> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| SplashError::write(format!("encode png: {e}")))?;
    Ok(buf)
}

/// White image whose alpha channel is the mask.
fn mask_png(mask: &Mask) -> SplashResult<Vec<u8>> {
    let data = mask
        .values()
        .iter()
        .flat_map(|&a| [255, 255, 255, a])
        .collect::<Vec<u8>>();
    let img = image::RgbaImage::from_raw(mask.width(), mask.height(), data).ok_or_else(|| {
        SplashError::write(format!(
            "mask of {}x{} does not fit an image",
            mask.width(),
            mask.height()
        ))
    })?;
    encode_png(img)
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> SplashError {
    SplashError::write(format!("'{}': {e}", path.display()))
}

fn write_archive(path: &Path, entries: &[(String, Vec<u8>)]) -> SplashResult<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir).map_err(|e| write_error(path, e))?;
    }
    let file = File::create(path).map_err(|e| write_error(path, e))?;
    let mut out = zip::ZipWriter::new(file);
    for (name, data) in entries {
        out.start_file(name.as_str(), zip_options())
            .map_err(|e| write_error(path, e))?;
        out.write_all(data).map_err(|e| write_error(path, e))?;
    }
    out.finish().map_err(|e| write_error(path, e))?;
    Ok(())
}

fn file_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load one splash container from disk; its id is the file stem.
pub fn load(path: &Path) -> SplashResult<SplashDocument> {
    load_with_limit(path, DEFAULT_MAX_GRID_CELLS)
}

/// [`load`], with multi-tile overlays mosaicked onto at most `max_grid_cells` cells.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_with_limit(path: &Path, max_grid_cells: u64) -> SplashResult<SplashDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read container '{}'", path.display()))?;
    load_bytes_with_limit(file_id(path), &bytes, max_grid_cells)
}

/// Load a splash container from memory.
pub fn load_bytes(id: impl Into<String>, bytes: &[u8]) -> SplashResult<SplashDocument> {
    load_bytes_with_limit(id, bytes, DEFAULT_MAX_GRID_CELLS)
}

/// Load a splash container from memory, capping the mosaic of its tiles at `max_grid_cells`.
///
/// Combined containers (entry folders nested in group folders) are refused; they hold several
/// documents and go through [`load_combined`] instead.
pub fn load_bytes_with_limit(
    id: impl Into<String>,
    bytes: &[u8],
    max_grid_cells: u64,
) -> SplashResult<SplashDocument> {
    let id = id.into();
    let archive = Archive::read(bytes)?;
    if archive.is_generated() {
        return Err(SplashError::generated_output(format!(
            "'{id}' carries {GENERATED_FLAG}"
        )));
    }
    let (kml_name, text) = archive.root_kml()?;
    let parsed = kml::parse_document(&text)?;
    if parsed.nested_entries > 0 {
        return Err(SplashError::corrupt_container(format!(
            "'{id}' is a combined container with {} entries; unmerge it first",
            parsed.nested_entries
        )));
    }

    let overlays = if parsed.overlays.is_empty() {
        archive
            .names()
            .filter(|n| is_overlay_image(n))
            .map(|n| OverlayRef {
                name: Some(base_name(n).to_string()),
                href: Some(n.to_string()),
                bounding_box: TileName::parse(base_name(n)).map(|t| t.bounding_box()),
            })
            .collect()
    } else {
        parsed.overlays
    };
    if overlays.is_empty() {
        return Err(SplashError::missing_asset(format!(
            "'{id}' has no overlay image"
        )));
    }

    let mut tiles = Vec::with_capacity(overlays.len());
    for (idx, overlay) in overlays.iter().enumerate() {
        let label = overlay.label(idx);
        let bbox = overlay.bounding_box.ok_or_else(|| {
            SplashError::invalid_geometry(format!("'{id}' overlay '{label}' has no bounding box"))
        })?;
        let href = overlay.href.as_deref().ok_or_else(|| {
            SplashError::missing_asset(format!("'{id}' overlay '{label}' has no image href"))
        })?;
        let data = archive.find_asset(href).ok_or_else(|| {
            SplashError::missing_asset(format!("'{id}' has no entry for '{href}'"))
        })?;
        let mask = decode_mask(data)
            .map_err(|e| SplashError::corrupt_container(format!("'{id}' {href}: {e}")))?;
        tiles.push((bbox, mask));
    }
    let parts = tiles.iter().map(|(b, m)| (*b, m)).collect::<Vec<_>>();
    let (bounding_box, mask) = mosaic(&parts, max_grid_cells)?;

    tracing::debug!(%id, kml = kml_name, tiles = tiles.len(), "loaded container");
    Ok(SplashDocument {
        id,
        bounding_box,
        mask,
        metadata: parsed.metadata,
    })
}

/// Write `doc` as a single-document container: `<stem>.kml` plus one overlay image.
#[tracing::instrument(skip_all, fields(id = %doc.id, path = %path.display()))]
pub fn save(doc: &SplashDocument, path: &Path) -> SplashResult<()> {
    doc.validate_geometry()?;
    let stem = sanitize_file_stem(&file_id(path));
    let image = image_name_for(&doc.bounding_box);
    let entries = vec![
        (
            format!("{stem}.kml"),
            kml::document_kml(doc, &image).into_bytes(),
        ),
        (image, mask_png(&doc.mask)?),
    ];
    write_archive(path, &entries)
}

/// Write merge output: the rendered image over `bbox`, a title, and the generated-output marker.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn save_composite(
    image: &image::RgbaImage,
    bbox: &BoundingBox,
    title: &str,
    path: &Path,
) -> SplashResult<()> {
    bbox.validate()?;
    let href = image_name_for(bbox);
    let entries = vec![
        (
            COMPOSITE_KML.to_string(),
            kml::composite_kml(title, bbox, &href).into_bytes(),
        ),
        (href, encode_png(image.clone())?),
        (
            GENERATED_FLAG.to_string(),
            GENERATED_FLAG_TEXT.as_bytes().to_vec(),
        ),
    ];
    write_archive(path, &entries)
}

/// Remove the identifying KML elements `redactor` selects, leaving every other entry untouched.
///
/// Returns the number of elements removed. When there is nothing to remove the file is not
/// rewritten.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn strip_in_place(path: &Path, redactor: &Redactor) -> SplashResult<usize> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read container '{}'", path.display()))?;
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes.as_slice()))
        .map_err(|e| SplashError::corrupt_container(format!("not a readable zip: {e}")))?;

    let kml_name = root_kml_name(zip.file_names())
        .map(str::to_string)
        .ok_or_else(|| SplashError::corrupt_container("archive holds no KML entry"))?;
    let mut text = String::new();
    zip.by_name(&kml_name)
        .map_err(|e| SplashError::corrupt_container(format!("'{kml_name}': {e}")))?
        .read_to_string(&mut text)
        .map_err(|e| SplashError::corrupt_container(format!("'{kml_name}': {e}")))?;

    let ranges = kml::identifying_ranges(&text, redactor)?;
    if ranges.is_empty() {
        tracing::debug!("nothing to strip");
        return Ok(0);
    }
    let stripped = kml::cut_ranges(&text, &ranges);

    let tmp = tmp_sibling(path);
    let result = rewrite_archive(&mut zip, &kml_name, &stripped, &tmp)
        .and_then(|()| {
            std::fs::rename(&tmp, path).map_err(|e| {
                SplashError::write(format!("replace '{}': {e}", path.display()))
            })
        });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result?;

    tracing::info!(removed = ranges.len(), "stripped identifying metadata");
    Ok(ranges.len())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Copy every entry of `src` into `dest` as stored, except `kml_name`, which becomes `kml_text`.
fn rewrite_archive<R: Read + std::io::Seek>(
    src: &mut zip::ZipArchive<R>,
    kml_name: &str,
    kml_text: &str,
    dest: &Path,
) -> SplashResult<()> {
    let file = File::create(dest).map_err(|e| write_error(dest, e))?;
    let mut out = zip::ZipWriter::new(file);
    for i in 0..src.len() {
        let entry = src
            .by_index_raw(i)
            .map_err(|e| SplashError::corrupt_container(format!("zip entry {i}: {e}")))?;
        if entry.name() == kml_name {
            drop(entry);
            out.start_file(kml_name, zip_options())
                .map_err(|e| write_error(dest, e))?;
            out.write_all(kml_text.as_bytes())
                .map_err(|e| write_error(dest, e))?;
        } else {
            out.raw_copy_file(entry).map_err(|e| write_error(dest, e))?;
        }
    }
    out.finish().map_err(|e| write_error(dest, e))?;
    Ok(())
}

/// Read a multi-entry container: a `.kmz`, or a bare `.kml` whose images sit beside it.
///
/// Images that cannot be found or decoded leave the tile without a mask; remote hrefs are
/// never fetched.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_combined(path: &Path) -> SplashResult<CombinedDocument> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "kmz" => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read container '{}'", path.display()))?;
            let archive = Archive::read(&bytes)?;
            if archive.is_generated() {
                return Err(SplashError::generated_output(format!(
                    "'{}' carries {GENERATED_FLAG}",
                    path.display()
                )));
            }
            let (_, text) = archive.root_kml()?;
            combined_from(&text, |href| archive.find_asset(href).map(<[u8]>::to_vec))
        }
        "kml" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read '{}'", path.display()))?;
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            combined_from(&text, |href| {
                if href.contains("://") {
                    tracing::debug!(href, "remote image left unresolved");
                    return None;
                }
                std::fs::read(dir.join(href)).ok()
            })
        }
        _ => Err(SplashError::corrupt_container(format!(
            "'{}' is neither .kmz nor .kml",
            path.display()
        ))),
    }
}

fn combined_from(
    text: &str,
    mut resolve: impl FnMut(&str) -> Option<Vec<u8>>,
) -> SplashResult<CombinedDocument> {
    let parsed = kml::parse_combined(text)?;
    let mut groups = Vec::with_capacity(parsed.groups.len());
    for group in parsed.groups {
        let mut entries = Vec::with_capacity(group.entries.len());
        for entry in group.entries {
            let mut tiles = Vec::with_capacity(entry.overlays.len());
            for (idx, overlay) in entry.overlays.into_iter().enumerate() {
                let mask = overlay
                    .href
                    .as_deref()
                    .and_then(&mut resolve)
                    .and_then(|bytes| match decode_mask(&bytes) {
                        Ok(mask) => Some(mask),
                        Err(e) => {
                            tracing::warn!(href = ?overlay.href, error = %e, "overlay image unusable");
                            None
                        }
                    });
                tiles.push(EntryTile {
                    label: overlay.label(idx),
                    href: overlay.href,
                    bounding_box: overlay.bounding_box,
                    mask,
                });
            }
            entries.push(NestedEntry {
                name: entry.name,
                metadata: entry.metadata,
                tiles,
            });
        }
        groups.push(EntryGroup {
            name: group.name,
            entries,
        });
    }
    Ok(CombinedDocument {
        name: parsed.name,
        groups,
    })
}

/// Write `documents` as entries of one group in a multi-entry container, each entry's image
/// stored under its own folder.
#[tracing::instrument(skip_all, fields(group = %group, documents = documents.len(), path = %path.display()))]
pub fn save_combined(group: &str, documents: &[SplashDocument], path: &Path) -> SplashResult<()> {
    let mut folders = HashSet::new();
    let mut refs = Vec::with_capacity(documents.len());
    let mut images = Vec::with_capacity(documents.len());
    for doc in documents {
        doc.validate_geometry()?;
        let stem = sanitize_file_stem(&doc.id);
        let mut folder = stem.clone();
        let mut n = 2;
        while !folders.insert(folder.clone()) {
            folder = format!("{stem}-{n}");
            n += 1;
        }
        let href = format!("{folder}/{}", image_name_for(&doc.bounding_box));
        images.push((href.clone(), mask_png(&doc.mask)?));
        refs.push((doc, href));
    }

    let mut entries = Vec::with_capacity(images.len() + 1);
    entries.push((
        format!("{}.kml", sanitize_file_stem(group)),
        kml::combined_kml(group, &refs).into_bytes(),
    ));
    entries.extend(images);
    write_archive(path, &entries)
}

#[cfg(test)]
#[path = "../../tests/unit/container/kmz.rs"]
mod tests;
