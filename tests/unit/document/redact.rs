use super::*;
use crate::document::model::Mask;
use crate::foundation::geo::BoundingBox;

fn identified_doc() -> SplashDocument {
    let mask = Mask::new(3, 2, vec![0, 255, 128, 255, 255, 0]).unwrap();
    SplashDocument::new("tower", BoundingBox::new(45.0, 44.0, -93.0, -94.0), mask)
        .with_metadata(MetadataKey::Title, "Tower on the hill")
        .with_metadata(MetadataKey::Owner, "J. Doe")
        .with_metadata(MetadataKey::Address, "1 Main St")
        .with_metadata(MetadataKey::Description, "roof, 30 ft mast")
        .with_metadata(MetadataKey::ObserverName, "J. Doe house")
        .with_metadata(MetadataKey::ObserverPosition, "-93.25,44.98,10")
}

#[test]
fn removes_identifying_fields_only() {
    let mut doc = identified_doc();
    let removed = Redactor::new().redact(&mut doc);
    assert_eq!(removed, 5);
    assert_eq!(doc.metadata.len(), 1);
    assert_eq!(doc.title(), "Tower on the hill");
}

#[test]
fn redaction_is_idempotent_and_keeps_geometry() {
    let original = identified_doc();
    let redactor = Redactor::new();

    let mut once = original.clone();
    redactor.redact(&mut once);
    let mut twice = once.clone();
    assert_eq!(redactor.redact(&mut twice), 0);

    assert_eq!(once, twice);
    assert_eq!(once.id, original.id);
    assert_eq!(once.bounding_box, original.bounding_box);
    assert_eq!(once.mask.values(), original.mask.values());
}

#[test]
fn missing_fields_are_skipped() {
    let mut doc = SplashDocument::new(
        "bare",
        BoundingBox::new(1.0, 0.0, 1.0, 0.0),
        Mask::filled(1, 1, 255),
    );
    assert_eq!(Redactor::new().redact(&mut doc), 0);
}

#[test]
fn custom_key_set() {
    let mut doc = identified_doc();
    let redactor = Redactor::with_keys([MetadataKey::ObserverPosition]);
    assert!(redactor.redacts(MetadataKey::ObserverPosition));
    assert!(!redactor.redacts(MetadataKey::Owner));
    assert_eq!(redactor.redact(&mut doc), 1);
    assert!(doc.metadata.contains_key(&MetadataKey::Owner));
}
