#![forbid(unsafe_code)]

pub mod batch;
pub mod config;
pub mod container;
pub mod document;
pub mod foundation;
pub mod rank;
pub mod raster;
pub mod unmerge;

pub use batch::BatchSummary;
pub use config::SplashConfig;
pub use document::model::{CoverageThreshold, Mask, Metadata, MetadataKey, SplashDocument};
pub use document::redact::Redactor;
pub use foundation::error::{ErrorKind, SplashError, SplashResult};
pub use foundation::geo::BoundingBox;
pub use foundation::report::{SkipReport, Skipped};
pub use rank::{AreaModel, CoverageStat, RankConfig, RankReport, rank};
pub use raster::classify::{BandTable, ColorBand, render};
pub use raster::composite::{CompositeConfig, CompositeOutcome, OverlapRaster, composite};
pub use raster::grid::{GridSpec, Resolution};
pub use unmerge::{
    CombinedDocument, EntryGroup, EntryTile, NestedEntry, UnmergedDocument, unmerge,
    unmerge_with_limit,
};
