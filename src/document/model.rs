use std::collections::BTreeMap;

use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::geo::BoundingBox;

/// Coverage values above this level count as covered.
///
/// The default (`254`) only counts fully opaque pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CoverageThreshold(pub u8);

impl Default for CoverageThreshold {
    fn default() -> Self {
        Self(254)
    }
}

impl CoverageThreshold {
    #[inline]
    pub fn covers(self, value: u8) -> bool {
        value > self.0
    }
}

/// Row-major coverage raster. Row 0 is the northern edge, column 0 the western edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32, values: Vec<u8>) -> SplashResult<Self> {
        let expected = (width as usize) * (height as usize);
        if values.len() != expected {
            return Err(SplashError::invalid_geometry(format!(
                "mask of {width}x{height} needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            values: vec![value; (width as usize) * (height as usize)],
        }
    }

    /// Take the alpha channel of a straight RGBA8 buffer.
    pub fn from_rgba8_alpha(width: u32, height: u32, rgba: &[u8]) -> SplashResult<Self> {
        if !rgba.len().is_multiple_of(4) {
            return Err(SplashError::invalid_geometry(
                "rgba buffer length must be a multiple of 4",
            ));
        }
        let alpha = rgba.chunks_exact(4).map(|px| px[3]).collect::<Vec<_>>();
        Self::new(width, height, alpha)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn get(&self, col: u32, row: u32) -> u8 {
        self.values[(row as usize) * (self.width as usize) + (col as usize)]
    }

    pub fn set(&mut self, col: u32, row: u32, value: u8) {
        let idx = (row as usize) * (self.width as usize) + (col as usize);
        self.values[idx] = value;
    }

    pub fn row(&self, row: u32) -> &[u8] {
        let w = self.width as usize;
        let start = (row as usize) * w;
        &self.values[start..start + w]
    }

    pub fn covered_count(&self, threshold: CoverageThreshold) -> u64 {
        self.values.iter().filter(|&&v| threshold.covers(v)).count() as u64
    }
}

/// The fixed set of metadata fields a splash container may carry.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    /// Document display name.
    Title,
    /// Author of the export.
    Owner,
    /// Street address.
    Address,
    /// Free-text notes.
    Description,
    /// Name given to the observer position.
    ObserverName,
    /// Observer coordinates (`lon,lat[,alt]`).
    ObserverPosition,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 6] = [
        MetadataKey::Title,
        MetadataKey::Owner,
        MetadataKey::Address,
        MetadataKey::Description,
        MetadataKey::ObserverName,
        MetadataKey::ObserverPosition,
    ];
}

pub type Metadata = BTreeMap<MetadataKey, String>;

/// One splash overlay: where it is, what it covers, and who it describes.
#[derive(Clone, Debug, PartialEq)]
pub struct SplashDocument {
    pub id: String,
    pub bounding_box: BoundingBox,
    pub mask: Mask,
    pub metadata: Metadata,
}

impl SplashDocument {
    pub fn new(id: impl Into<String>, bounding_box: BoundingBox, mask: Mask) -> Self {
        Self {
            id: id.into(),
            bounding_box,
            mask,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: MetadataKey, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }

    pub fn title(&self) -> &str {
        self.metadata
            .get(&MetadataKey::Title)
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    /// Check that the document can be placed on a grid: a valid box and a non-empty mask.
    pub fn validate_geometry(&self) -> SplashResult<()> {
        self.bounding_box
            .validate()
            .map_err(|e| SplashError::invalid_geometry(format!("document '{}': {e}", self.id)))?;
        if self.mask.is_empty() {
            return Err(SplashError::invalid_geometry(format!(
                "document '{}' has an empty {}x{} mask",
                self.id,
                self.mask.width(),
                self.mask.height()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/document/model.rs"]
mod tests;
