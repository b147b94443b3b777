use super::*;
use crate::document::model::{Mask, SplashDocument};
use crate::foundation::geo::BoundingBox;
use crate::raster::composite::{CompositeConfig, composite};

#[test]
fn default_bands_follow_count() {
    let t = BandTable::default();
    assert_eq!(t.classify(0), TRANSPARENT);
    assert_eq!(t.classify(1), RED);
    assert_eq!(t.classify(2), YELLOW);
    assert_eq!(t.classify(3), GREEN);
    assert_eq!(t.classify(4), GREEN);
    assert_eq!(t.classify(u32::MAX), GREEN);
}

#[test]
fn classification_is_monotonic_in_band_index() {
    let t = BandTable::default();
    let band_of = |c: u32| {
        t.bands()
            .iter()
            .rposition(|b| b.min_count <= c)
            .map_or(-1, |i| i as i64)
    };
    for c in 0..64 {
        assert!(band_of(c) <= band_of(c + 1));
        assert_eq!(t.classify(c), t.classify(c), "deterministic");
    }
}

#[test]
fn custom_table_leaves_counts_below_first_band_transparent() {
    let t = BandTable::new(vec![
        ColorBand {
            min_count: 2,
            rgba: [0, 0, 255, 128],
        },
        ColorBand {
            min_count: 5,
            rgba: [255, 255, 255, 255],
        },
    ])
    .unwrap();
    assert_eq!(t.classify(1), TRANSPARENT);
    assert_eq!(t.classify(2), [0, 0, 255, 128]);
    assert_eq!(t.classify(4), [0, 0, 255, 128]);
    assert_eq!(t.classify(5), [255, 255, 255, 255]);
}

#[test]
fn invalid_tables_are_rejected() {
    assert!(BandTable::new(vec![]).is_err());
    assert!(
        BandTable::new(vec![ColorBand {
            min_count: 0,
            rgba: RED
        }])
        .is_err()
    );
    assert!(
        BandTable::new(vec![
            ColorBand {
                min_count: 2,
                rgba: RED
            },
            ColorBand {
                min_count: 2,
                rgba: GREEN
            },
        ])
        .is_err()
    );
}

#[test]
fn band_table_json_is_a_plain_list() {
    let json = serde_json::to_value(BandTable::default()).unwrap();
    assert_eq!(json[0]["min_count"], 1);
    assert_eq!(json[2]["rgba"], serde_json::json!([0, 255, 0, 255]));
    let back: BandTable = serde_json::from_value(json).unwrap();
    assert_eq!(back, BandTable::default());
}

#[test]
fn render_colors_overlap_cells() {
    let a = SplashDocument::new(
        "a",
        BoundingBox::new(1.0, 0.0, 1.0, 0.0),
        Mask::filled(10, 10, 255),
    );
    let b = SplashDocument::new(
        "b",
        BoundingBox::new(1.0, 0.0, 1.5, 0.5),
        Mask::filled(10, 10, 255),
    );
    let raster = composite(&[a, b], &CompositeConfig::default())
        .unwrap()
        .raster;
    let img = render(&raster, &BandTable::default()).unwrap();

    assert_eq!(img.dimensions(), (15, 10));
    assert_eq!(img.get_pixel(0, 0).0, RED);
    assert_eq!(img.get_pixel(7, 3).0, YELLOW);
    assert_eq!(img.get_pixel(14, 9).0, RED);
}
