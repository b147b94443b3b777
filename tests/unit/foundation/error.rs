use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        SplashError::corrupt_container("x")
            .to_string()
            .contains("corrupt container:")
    );
    assert!(
        SplashError::missing_asset("x")
            .to_string()
            .contains("missing asset:")
    );
    assert!(
        SplashError::invalid_geometry("x")
            .to_string()
            .contains("invalid geometry:")
    );
    assert!(
        SplashError::incomplete_entry("x")
            .to_string()
            .contains("incomplete entry:")
    );
    assert!(SplashError::write("x").to_string().contains("write error:"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = SplashError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), ErrorKind::Other);
}

#[test]
fn only_empty_batches_are_fatal() {
    assert!(SplashError::no_valid_input("x").is_batch_fatal());
    assert!(SplashError::no_valid_entries("x").is_batch_fatal());
    assert!(!SplashError::invalid_geometry("x").is_batch_fatal());
    assert!(!SplashError::corrupt_container("x").is_batch_fatal());
}

#[test]
fn kind_labels_match_display_prefix() {
    let err = SplashError::generated_output("merge.kmz");
    assert!(err.to_string().starts_with(err.kind().label()));
}
