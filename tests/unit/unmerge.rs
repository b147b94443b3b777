use super::*;

fn tile(label: &str, bbox: Option<BoundingBox>, mask: Option<Mask>) -> EntryTile {
    EntryTile {
        label: label.to_string(),
        href: Some(format!("cloakp{label}.png")),
        bounding_box: bbox,
        mask,
    }
}

fn entry(name: &str, tiles: Vec<EntryTile>) -> NestedEntry {
    let mut metadata = Metadata::new();
    metadata.insert(MetadataKey::ObserverPosition, "-93.2,44.9,10".to_string());
    NestedEntry {
        name: Some(name.to_string()),
        metadata,
        tiles,
    }
}

fn degree(south: f64, west: f64) -> Option<BoundingBox> {
    Some(BoundingBox::new(south + 1.0, south, west + 1.0, west))
}

#[test]
fn each_complete_entry_becomes_a_document() {
    let m1 = Mask::new(2, 1, vec![255, 0]).unwrap();
    let m2 = Mask::new(1, 1, vec![255]).unwrap();
    let combined = CombinedDocument {
        name: "Everyone".to_string(),
        groups: vec![EntryGroup {
            name: "Club".to_string(),
            entries: vec![
                entry("Alpha", vec![tile("N44W094", degree(44.0, -94.0), Some(m1.clone()))]),
                entry("Bravo", vec![tile("N45W094", degree(45.0, -94.0), Some(m2.clone()))]),
            ],
        }],
    };

    let out = unmerge(&combined).unwrap();
    assert!(out.skipped.is_empty());
    assert_eq!(out.documents.len(), 2);

    let alpha = &out.documents[0];
    assert_eq!(alpha.group, "Club");
    assert_eq!(alpha.document.id, "Alpha");
    assert_eq!(alpha.document.title(), "Alpha");
    assert_eq!(alpha.document.bounding_box, degree(44.0, -94.0).unwrap());
    assert_eq!(alpha.document.mask, m1);
    assert_eq!(
        alpha.document.metadata.get(&MetadataKey::ObserverPosition).map(String::as_str),
        Some("-93.2,44.9,10")
    );
    assert_eq!(out.documents[1].document.mask, m2);
}

#[test]
fn incomplete_entries_are_skipped() {
    let m = Mask::filled(1, 1, 255);
    let combined = CombinedDocument {
        name: "Mixed".to_string(),
        groups: vec![EntryGroup {
            name: "G".to_string(),
            entries: vec![
                entry("NoMask", vec![tile("N44W094", degree(44.0, -94.0), None)]),
                entry("NoBox", vec![tile("x", None, Some(m.clone()))]),
                entry("NoTiles", vec![]),
                NestedEntry {
                    name: None,
                    metadata: Metadata::new(),
                    tiles: vec![tile("N44W094", degree(44.0, -94.0), Some(m.clone()))],
                },
                entry("Good", vec![tile("N44W094", degree(44.0, -94.0), Some(m))]),
            ],
        }],
    };

    let out = unmerge(&combined).unwrap();
    assert_eq!(out.documents.len(), 1);
    assert_eq!(out.documents[0].document.id, "Good");
    assert_eq!(out.skipped.len(), 4);
    assert!(
        out.skipped
            .entries()
            .iter()
            .all(|s| matches!(s.error, SplashError::IncompleteEntry(_)))
    );
    assert_eq!(out.skipped.entries()[3].source, "G[3]");
}

#[test]
fn degenerate_tile_geometry_is_invalid_geometry() {
    let combined = CombinedDocument {
        name: "Flat".to_string(),
        groups: vec![EntryGroup {
            name: "G".to_string(),
            entries: vec![
                entry(
                    "Flat",
                    vec![tile(
                        "x",
                        Some(BoundingBox::new(1.0, 1.0, 1.0, 0.0)),
                        Some(Mask::filled(1, 1, 255)),
                    )],
                ),
                entry("Good", vec![tile("y", degree(0.0, 0.0), Some(Mask::filled(1, 1, 255)))]),
            ],
        }],
    };
    let out = unmerge(&combined).unwrap();
    assert_eq!(out.skipped.len(), 1);
    assert!(matches!(
        out.skipped.entries()[0].error,
        SplashError::InvalidGeometry(_)
    ));
}

#[test]
fn no_complete_entries_is_fatal() {
    let combined = CombinedDocument {
        name: "Empty".to_string(),
        groups: vec![EntryGroup {
            name: "G".to_string(),
            entries: vec![entry("NoTiles", vec![])],
        }],
    };
    assert!(matches!(
        unmerge(&combined),
        Err(SplashError::NoValidEntries(_))
    ));
    assert!(matches!(
        unmerge(&CombinedDocument::default()),
        Err(SplashError::NoValidEntries(_))
    ));
}

#[test]
fn multi_tile_entries_are_mosaicked() {
    let combined = CombinedDocument {
        name: "Wide".to_string(),
        groups: vec![EntryGroup {
            name: "G".to_string(),
            entries: vec![entry(
                "Wide",
                vec![
                    tile("N44W094", degree(44.0, -94.0), Some(Mask::filled(2, 2, 255))),
                    tile("N44W093", degree(44.0, -93.0), Some(Mask::filled(2, 2, 0))),
                ],
            )],
        }],
    };
    let doc = &unmerge(&combined).unwrap().documents[0].document;
    assert_eq!(doc.bounding_box, BoundingBox::new(45.0, 44.0, -92.0, -94.0));
    assert_eq!((doc.mask.width(), doc.mask.height()), (4, 2));
    assert_eq!(doc.mask.values(), &[255, 255, 0, 0, 255, 255, 0, 0]);
}

#[test]
fn entry_mosaic_honors_the_grid_limit() {
    let combined = CombinedDocument {
        name: "Everyone".to_string(),
        groups: vec![EntryGroup {
            name: "Club".to_string(),
            entries: vec![entry(
                "Wide",
                vec![
                    tile("N44W094", degree(44.0, -94.0), Some(Mask::filled(2, 2, 255))),
                    tile("N44W093", degree(44.0, -93.0), Some(Mask::filled(2, 2, 255))),
                ],
            )],
        }],
    };

    assert!(matches!(
        unmerge_with_limit(&combined, 4),
        Err(SplashError::NoValidEntries(_))
    ));
    let out = unmerge_with_limit(&combined, 8).unwrap();
    assert_eq!(out.documents[0].document.mask, Mask::filled(4, 2, 255));
}
