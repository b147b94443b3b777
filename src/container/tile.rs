//! One-degree tile names (`N44W094`, `cloakpN44W094.png`) and output file stems.

use std::fmt;

use crate::foundation::geo::BoundingBox;

const IMAGE_PREFIX: &str = "cloakp";
const IMAGE_SUFFIX: &str = ".png";

/// A whole-degree tile identified by its south-west corner.
///
/// `N44W094` covers 44°..45° N and 94°..93° W; `S12E010` covers 12°..11° S and 10°..11° E.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileName {
    pub south: i32,
    pub west: i32,
}

impl TileName {
    /// Parse `N44W094`, with or without the `cloakp` prefix and `.png` suffix (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = strip_prefix_ci(s, IMAGE_PREFIX).unwrap_or(s);
        let s = strip_suffix_ci(s, IMAGE_SUFFIX).unwrap_or(s);

        let lat_sign = match s.chars().next()?.to_ascii_uppercase() {
            'N' => 1,
            'S' => -1,
            _ => return None,
        };
        let lat_start = 1;
        let lat_end = s[lat_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|i| i + lat_start)?;
        let lat: i32 = s[lat_start..lat_end].parse().ok()?;
        let lon_sign = match s[lat_end..].chars().next()?.to_ascii_uppercase() {
            'E' => 1,
            'W' => -1,
            _ => return None,
        };
        let lon_digits = &s[lat_end + 1..];
        if lon_digits.is_empty() || !lon_digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let lon: i32 = lon_digits.parse().ok()?;
        if lat > 90 || lon > 180 {
            return None;
        }
        Some(Self {
            south: lat_sign * lat,
            west: lon_sign * lon,
        })
    }

    /// The tile exactly matching `bbox`, when it is a whole-degree tile.
    pub fn from_bounding_box(bbox: &BoundingBox) -> Option<Self> {
        if !bbox.is_whole_degree_tile() {
            return None;
        }
        Some(Self {
            south: bbox.south as i32,
            west: bbox.west as i32,
        })
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let south = f64::from(self.south);
        let west = f64::from(self.west);
        BoundingBox::new(south + 1.0, south, west + 1.0, west)
    }

    /// Archive entry name of the tile image, e.g. `cloakpN44W094.png`.
    pub fn image_name(&self) -> String {
        format!("{IMAGE_PREFIX}{self}{IMAGE_SUFFIX}")
    }
}

impl fmt::Display for TileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.south < 0 { 'S' } else { 'N' };
        let ew = if self.west < 0 { 'W' } else { 'E' };
        write!(
            f,
            "{ns}{:02}{ew}{:03}",
            self.south.unsigned_abs(),
            self.west.unsigned_abs()
        )
    }
}

/// `true` for archive entries that look like overlay images (`cloakp*.png`, any directory).
pub fn is_overlay_image(entry_name: &str) -> bool {
    let base = base_name(entry_name);
    strip_prefix_ci(base, IMAGE_PREFIX)
        .and_then(|rest| strip_suffix_ci(rest, IMAGE_SUFFIX))
        .is_some()
}

/// Image entry name for an overlay with this box: the tile name when it is a whole-degree
/// tile, otherwise the bare prefix.
pub fn image_name_for(bbox: &BoundingBox) -> String {
    TileName::from_bounding_box(bbox)
        .map(|t| t.image_name())
        .unwrap_or_else(|| format!("{IMAGE_PREFIX}{IMAGE_SUFFIX}"))
}

/// Last path component of an archive entry or href (either separator).
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// File stem safe for any filesystem: alphanumerics, space, `_` and `-` survive; trailing
/// spaces are trimmed; nothing left becomes `unnamed`.
pub fn sanitize_file_stem(name: &str) -> String {
    let kept = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect::<String>();
    let trimmed = kept.trim_end();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let at = s.len().checked_sub(suffix.len())?;
    let tail = s.get(at..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..at])
}

#[cfg(test)]
#[path = "../../tests/unit/container/tile.rs"]
mod tests;
