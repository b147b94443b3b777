use super::*;
use crate::document::model::{Mask, MetadataKey};
use crate::foundation::geo::BoundingBox;

fn write_doc(dir: &Path, id: &str, west: f64, east: f64) -> PathBuf {
    let doc = SplashDocument::new(
        id,
        BoundingBox::new(1.0, 0.0, east, west),
        Mask::filled(4, 4, 255),
    )
    .with_metadata(MetadataKey::Title, id)
    .with_metadata(MetadataKey::Address, "somewhere");
    let path = dir.join(format!("{id}.kmz"));
    container::save(&doc, &path).unwrap();
    path
}

fn single_threaded() -> SplashConfig {
    SplashConfig {
        threads: Some(1),
        ..SplashConfig::default()
    }
}

#[test]
fn discovery_lists_kmz_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.kmz"), b"").unwrap();
    std::fs::write(dir.path().join("A.KMZ"), b"").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
    std::fs::create_dir(dir.path().join("folder.kmz")).unwrap();

    let found = discover_containers(dir.path()).unwrap();
    let names = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["A.KMZ", "b.kmz"]);
}

#[test]
fn loading_keeps_order_skips_failures_and_renames_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("other");
    let first = write_doc(dir.path(), "site", 0.0, 1.0);
    let second = write_doc(&sub, "site", 0.5, 1.5);
    let broken = dir.path().join("broken.kmz");
    std::fs::write(&broken, b"not a zip").unwrap();
    let third = write_doc(dir.path(), "tower", 2.0, 3.0);

    let cfg = SplashConfig {
        threads: Some(2),
        ..SplashConfig::default()
    };
    let batch = load_documents(&[first, broken, second, third], &cfg).unwrap();
    let ids = batch
        .documents
        .iter()
        .map(|d| d.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["site", "site-2", "tower"]);
    assert_eq!(batch.skipped.len(), 1);
    assert!(matches!(
        batch.skipped.entries()[0].error,
        SplashError::CorruptContainer(_)
    ));
}

#[test]
fn merge_writes_flagged_output_that_is_never_an_input() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", 0.0, 1.0);
    write_doc(dir.path(), "b", 0.5, 1.5);
    std::fs::write(dir.path().join("junk.kmz"), b"junk").unwrap();
    let output = dir.path().join(DEFAULT_MERGE_OUTPUT);

    let inputs = discover_containers(dir.path()).unwrap();
    let summary = run_merge(&inputs, &output, DEFAULT_MERGE_TITLE, &single_threaded()).unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert!(matches!(
        container::load(&output),
        Err(SplashError::GeneratedOutput(_))
    ));

    let inputs = discover_containers(dir.path()).unwrap();
    assert_eq!(inputs.len(), 4);
    let again = run_merge(&inputs, &output, DEFAULT_MERGE_TITLE, &single_threaded()).unwrap();
    assert_eq!(again.processed, 2);
    assert_eq!(again.skipped.len(), 1);
}

#[test]
fn merge_of_a_previous_merge_is_skipped_as_generated() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "a", 0.0, 1.0);
    let first_out = dir.path().join("first.kmz");
    let inputs = discover_containers(dir.path()).unwrap();
    run_merge(&inputs, &first_out, "first", &single_threaded()).unwrap();

    let inputs = discover_containers(dir.path()).unwrap();
    let summary = run_merge(&inputs, &dir.path().join("second.kmz"), "second", &single_threaded())
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert!(matches!(
        summary.skipped.entries()[0].error,
        SplashError::GeneratedOutput(_)
    ));
}

#[test]
fn merge_without_loadable_inputs_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let junk = dir.path().join("junk.kmz");
    std::fs::write(&junk, b"junk").unwrap();
    let err = run_merge(&[junk], &dir.path().join("out.kmz"), "x", &single_threaded()).unwrap_err();
    assert!(err.is_batch_fatal());
    assert!(!dir.path().join("out.kmz").exists());
}

#[test]
fn rank_writes_csv_rows() {
    let dir = tempfile::tempdir().unwrap();
    let wide = write_doc(dir.path(), "wide", 0.0, 2.0);
    let narrow = write_doc(dir.path(), "narrow", 0.0, 1.0);
    let mut out = Vec::new();
    let summary = run_rank(&[narrow, wide], &single_threaded(), &mut out).unwrap();
    assert_eq!(summary.processed, 2);

    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "id,pixels,area_sq_mi");
    assert!(lines[1].starts_with("wide,16,"));
    assert!(lines[2].starts_with("narrow,16,"));
}

#[test]
fn strip_handles_each_file_and_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_doc(dir.path(), "good", 0.0, 1.0);
    let bad = dir.path().join("bad.kmz");
    std::fs::write(&bad, b"bad").unwrap();

    let summary = run_strip(&[good.clone(), bad], &Redactor::default()).unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped.len(), 1);
    let doc = container::load(&good).unwrap();
    assert!(!doc.metadata.contains_key(&MetadataKey::Address));
}

#[test]
fn bundle_then_unmerge_restores_files() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_doc(dir.path(), "a", 0.0, 1.0);
    let b = write_doc(dir.path(), "b", 2.0, 3.0);
    let bundle = dir.path().join("club.kmz");
    let summary = run_bundle(&[a.clone(), b], "Club", &bundle, &single_threaded()).unwrap();
    assert_eq!(summary.processed, 2);

    let out_dir = dir.path().join("out");
    let opts = UnmergeOptions::default();
    let summary = run_unmerge(&bundle, &out_dir, &opts).unwrap();
    assert_eq!(summary.processed, 2);
    let restored = container::load(&out_dir.join("Club").join("a.kmz")).unwrap();
    assert_eq!(restored, container::load(&a).unwrap());

    std::fs::write(out_dir.join("Club").join("b.kmz"), b"keep me").unwrap();
    run_unmerge(&bundle, &out_dir, &opts).unwrap();
    assert_eq!(std::fs::read(out_dir.join("Club").join("b.kmz")).unwrap(), b"keep me");

    let opts = UnmergeOptions {
        overwrite: true,
        redact: Some(Redactor::default()),
        ..UnmergeOptions::default()
    };
    run_unmerge(&bundle, &out_dir, &opts).unwrap();
    let redacted = container::load(&out_dir.join("Club").join("b.kmz")).unwrap();
    assert_eq!(
        redacted.metadata.keys().copied().collect::<Vec<_>>(),
        vec![MetadataKey::Title]
    );
}

#[test]
fn bundle_left_among_the_inputs_is_not_merged() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_doc(dir.path(), "a", 0.0, 1.0);
    let b = write_doc(dir.path(), "b", 0.5, 1.5);
    run_bundle(&[a, b], "Club", &dir.path().join("club.kmz"), &single_threaded()).unwrap();

    let inputs = discover_containers(dir.path()).unwrap();
    assert_eq!(inputs.len(), 3);
    let output = dir.path().join(DEFAULT_MERGE_OUTPUT);
    let summary = run_merge(&inputs, &output, DEFAULT_MERGE_TITLE, &single_threaded()).unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped.entries()[0].source, dir.path().join("club.kmz").display().to_string());
    assert!(matches!(
        summary.skipped.entries()[0].error,
        SplashError::CorruptContainer(_)
    ));

    let mut out = Vec::new();
    let ranked = run_rank(&inputs, &single_threaded(), &mut out).unwrap();
    assert_eq!(ranked.processed, 2);
}

#[test]
fn unmerge_writes_every_entry_even_when_names_clash() {
    let dir = tempfile::tempdir().unwrap();
    let bob = |west: f64| {
        SplashDocument::new(
            "Bob",
            BoundingBox::new(1.0, 0.0, west + 1.0, west),
            Mask::filled(2, 2, 255),
        )
    };
    let bundle = dir.path().join("club.kmz");
    container::save_combined("Club", &[bob(0.0), bob(4.0)], &bundle).unwrap();

    let out_dir = dir.path().join("out");
    let summary = run_unmerge(&bundle, &out_dir, &UnmergeOptions::default()).unwrap();
    assert_eq!(summary.processed, 2);
    let first = out_dir.join("Club").join("Bob.kmz");
    let second = out_dir.join("Club").join("Bob-2.kmz");
    assert_eq!(container::load(&first).unwrap().bounding_box.west, 0.0);
    assert_eq!(container::load(&second).unwrap().bounding_box.west, 4.0);

    let opts = UnmergeOptions {
        overwrite: true,
        ..UnmergeOptions::default()
    };
    let again = run_unmerge(&bundle, &out_dir, &opts).unwrap();
    assert_eq!(again.processed, 2);
    assert_eq!(container::load(&first).unwrap().bounding_box.west, 0.0);
    assert_eq!(container::load(&second).unwrap().bounding_box.west, 4.0);
}

#[test]
fn configured_grid_limit_reaches_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two-tiles.kmz");
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("doc.kml", options).unwrap();
    zip.write_all(b"<kml><Document><name>two</name></Document></kml>").unwrap();
    for name in ["cloakpN10W001.png", "cloakpN10E000.png"] {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 255, 255, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        zip.start_file(name, options).unwrap();
        zip.write_all(&png).unwrap();
    }
    zip.finish().unwrap();

    let tight = SplashConfig {
        max_grid_cells: 4,
        ..single_threaded()
    };
    let batch = load_documents(std::slice::from_ref(&path), &tight).unwrap();
    assert!(batch.documents.is_empty());
    assert!(matches!(
        batch.skipped.entries()[0].error,
        SplashError::Validation(_)
    ));

    let roomy = SplashConfig {
        max_grid_cells: 8,
        ..single_threaded()
    };
    let batch = load_documents(&[path], &roomy).unwrap();
    assert_eq!(batch.documents[0].mask, Mask::filled(4, 2, 255));
}
