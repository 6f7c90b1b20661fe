//! `Upload-Metadata` header codec
//!
//! The header is a comma separated list of `key base64(value)` pairs. A key
//! may appear alone, which stands for an empty value.

use base64::{engine::general_purpose, Engine};

use crate::{MetaData, Result, TusError};

/// Parse an `Upload-Metadata` header value. Malformed entries are rejected.
pub fn parse_metadata_header(header: &str) -> Result<MetaData> {
    let mut meta = MetaData::new();

    if header.trim().is_empty() {
        return Ok(meta);
    }

    for element in header.split(',') {
        let element = element.trim();
        if element.is_empty() {
            return Err(TusError::InvalidMetadata("empty entry".to_string()));
        }

        let mut parts = element.split_whitespace();
        let key = parts.next().unwrap_or_default();
        let encoded = parts.next();
        if parts.next().is_some() {
            return Err(TusError::InvalidMetadata(format!(
                "too many values for key '{}'",
                key
            )));
        }

        let value = match encoded {
            Some(encoded) => {
                let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
                    TusError::InvalidMetadata(format!("value of '{}' is not base64: {}", key, e))
                })?;
                String::from_utf8(bytes).map_err(|_| {
                    TusError::InvalidMetadata(format!("value of '{}' is not UTF-8", key))
                })?
            }
            None => String::new(),
        };

        if meta.insert(key.to_string(), value).is_some() {
            return Err(TusError::InvalidMetadata(format!("duplicate key '{}'", key)));
        }
    }

    Ok(meta)
}

/// Serialize metadata back into header form
pub fn serialize_metadata_header(meta: &MetaData) -> String {
    meta.iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{} {}", key, general_purpose::STANDARD.encode(value))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs_and_bare_keys() {
        let meta = parse_metadata_header("filename d29ybGRfZG9taW5hdGlvbl9wbGFuLnBkZg==, is_confidential").unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta["filename"], "world_domination_plan.pdf");
        assert_eq!(meta["is_confidential"], "");
    }

    #[test]
    fn test_empty_header_is_empty_map() {
        assert!(parse_metadata_header("").unwrap().is_empty());
        assert!(parse_metadata_header("   ").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_entries_are_rejected() {
        assert!(parse_metadata_header("name !!!notbase64").is_err());
        assert!(parse_metadata_header("name YQ== extra").is_err());
        assert!(parse_metadata_header("name YQ==,,type YQ==").is_err());
        assert!(parse_metadata_header("name YQ==,name Yg==").is_err());
        // 0xff is not valid UTF-8
        assert!(parse_metadata_header("name /w==").is_err());
    }

    #[test]
    fn test_serialize_bare_key_for_empty_value() {
        let mut meta = MetaData::new();
        meta.insert("flag".to_string(), String::new());
        meta.insert("name".to_string(), "a".to_string());
        assert_eq!(serialize_metadata_header(&meta), "flag,name YQ==");
    }
}
