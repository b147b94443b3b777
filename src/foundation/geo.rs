use crate::foundation::error::{SplashError, SplashResult};

/// Statute miles per degree of latitude (treated as constant).
pub const MILES_PER_DEGREE_LAT: f64 = 69.0;
/// Statute miles per degree of longitude at the equator.
pub const MILES_PER_DEGREE_LON_EQUATOR: f64 = 69.172;

/// Geographic extent in degrees (equirectangular; antimeridian wraparound is not handled).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Reject non-finite edges and zero or negative spans.
    pub fn validate(&self) -> SplashResult<()> {
        let edges = [self.north, self.south, self.east, self.west];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(SplashError::invalid_geometry(format!(
                "bounding box has non-finite edges: {self:?}"
            )));
        }
        if self.north <= self.south {
            return Err(SplashError::invalid_geometry(format!(
                "bounding box north ({}) must be greater than south ({})",
                self.north, self.south
            )));
        }
        if self.east <= self.west {
            return Err(SplashError::invalid_geometry(format!(
                "bounding box east ({}) must be greater than west ({})",
                self.east, self.west
            )));
        }
        Ok(())
    }

    pub fn width_deg(&self) -> f64 {
        self.east - self.west
    }

    pub fn height_deg(&self) -> f64 {
        self.north - self.south
    }

    pub fn center_lat(&self) -> f64 {
        (self.north + self.south) * 0.5
    }

    pub fn center_lon(&self) -> f64 {
        (self.east + self.west) * 0.5
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            north: self.north.max(other.north),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            west: self.west.min(other.west),
        }
    }

    /// Half-open containment: the north and west edges belong to the box, the south and east
    /// edges belong to the neighbour.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat <= self.north && lat > self.south && lon >= self.west && lon < self.east
    }

    /// Ground area in square miles of one cell when this box is split into `cols × rows` cells.
    ///
    /// Longitude distortion is evaluated once at the vertical midpoint of the box.
    pub fn cell_area_sq_mi(&self, cols: u32, rows: u32) -> f64 {
        if cols == 0 || rows == 0 {
            return 0.0;
        }
        let cell_h = self.height_deg() / f64::from(rows);
        let cell_w = self.width_deg() / f64::from(cols);
        let miles_per_lon = MILES_PER_DEGREE_LON_EQUATOR * self.center_lat().to_radians().cos();
        cell_h * MILES_PER_DEGREE_LAT * cell_w * miles_per_lon
    }

    /// `true` when the box is exactly one whole-degree tile (the layout splash exports use).
    pub fn is_whole_degree_tile(&self) -> bool {
        self.north - self.south == 1.0
            && self.east - self.west == 1.0
            && self.south.fract() == 0.0
            && self.west.fract() == 0.0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/geo.rs"]
mod tests;
