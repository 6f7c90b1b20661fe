//! Property-based tests for tusk core

use proptest::prelude::*;
use tusk_core::*;

proptest! {
    #[test]
    fn props_metadata_survives_header_roundtrip(
        meta in prop::collection::btree_map("[a-z][a-z0-9_.-]{0,15}", ".{0,40}", 0..8)
    ) {
        let header = serialize_metadata_header(&meta);
        let decoded = parse_metadata_header(&header).unwrap();
        prop_assert_eq!(decoded, meta);
    }

    #[test]
    fn props_concat_final_keeps_partial_order(
        ids in prop::collection::vec("[A-Za-z0-9]{1,26}", 1..10)
    ) {
        let header = format!(
            "final;{}",
            ids.iter().map(|id| format!("/files/{}", id)).collect::<Vec<_>>().join(" ")
        );
        let role = parse_concat(&header).unwrap();
        prop_assert!(role.is_final);
        prop_assert_eq!(role.partial_uploads, ids);
    }
}

#[test]
fn test_image_metadata_roundtrip() {
    let mut meta = MetaData::new();
    meta.insert("name".to_string(), "a.png".to_string());
    meta.insert("type".to_string(), "image/png".to_string());

    let header = serialize_metadata_header(&meta);
    assert_eq!(parse_metadata_header(&header).unwrap(), meta);
}
