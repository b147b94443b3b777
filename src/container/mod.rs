//! Reading and writing splash containers (zipped KML plus overlay images).

pub(crate) mod kml;
pub mod kmz;
pub mod tile;

pub use kmz::{
    COMPOSITE_KML, GENERATED_FLAG, load, load_bytes, load_bytes_with_limit, load_combined,
    load_with_limit, save, save_combined, save_composite, strip_in_place,
};
pub use tile::{TileName, sanitize_file_stem};
