//! Upload identity and concatenation header parsing

use crate::{Result, TusError};

/// Role of an upload in the concatenation extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcatRole {
    pub is_partial: bool,
    pub is_final: bool,
    /// IDs of the partial uploads referenced by a final upload
    pub partial_uploads: Vec<String>,
}

/// Extract the upload ID from a request path or URL: its last non-empty segment
pub fn extract_id_from_path(path: &str) -> Result<String> {
    let path = path.strip_suffix('/').unwrap_or(path);
    match path.rsplit('/').next() {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(TusError::NotFound),
    }
}

/// Parse an `Upload-Concat` header value
pub fn parse_concat(header: &str) -> Result<ConcatRole> {
    let header = header.trim();
    if header.is_empty() {
        return Ok(ConcatRole::default());
    }

    if header == "partial" {
        return Ok(ConcatRole {
            is_partial: true,
            ..Default::default()
        });
    }

    let list = header.strip_prefix("final;").ok_or(TusError::InvalidConcat)?;

    let mut partial_uploads = Vec::new();
    for value in list.split(' ').map(str::trim).filter(|v| !v.is_empty()) {
        partial_uploads.push(extract_id_from_path(value).map_err(|_| TusError::InvalidConcat)?);
    }

    if partial_uploads.is_empty() {
        return Err(TusError::InvalidConcat);
    }

    Ok(ConcatRole {
        is_partial: false,
        is_final: true,
        partial_uploads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_id_from_path() {
        assert_eq!(extract_id_from_path("/files/abc").unwrap(), "abc");
        assert_eq!(extract_id_from_path("/files/abc/").unwrap(), "abc");
        assert_eq!(extract_id_from_path("http://tus.io/files/xyz").unwrap(), "xyz");
        assert_eq!(extract_id_from_path("plain").unwrap(), "plain");

        assert!(matches!(extract_id_from_path("/files//"), Err(TusError::NotFound)));
        assert!(matches!(extract_id_from_path(""), Err(TusError::NotFound)));
    }

    #[test]
    fn test_parse_partial_and_final() {
        assert_eq!(parse_concat("").unwrap(), ConcatRole::default());
        assert!(parse_concat("partial").unwrap().is_partial);

        let role = parse_concat("final;http://tus.io/files/a /files/b  c").unwrap();
        assert!(role.is_final);
        assert!(!role.is_partial);
        assert_eq!(role.partial_uploads, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_malformed_concat_is_rejected() {
        assert!(matches!(parse_concat("final;"), Err(TusError::InvalidConcat)));
        assert!(matches!(parse_concat("final; "), Err(TusError::InvalidConcat)));
        assert!(matches!(parse_concat("whatever"), Err(TusError::InvalidConcat)));
        assert!(matches!(parse_concat("final;/ //"), Err(TusError::InvalidConcat)));
    }
}
