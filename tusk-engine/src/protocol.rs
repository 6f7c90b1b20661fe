//! Protocol header names and derivations from request and upload state

use hyper::header::{HeaderName, HOST};
use tusk_core::{Capabilities, FileInfo};

use crate::request::RequestHead;

pub const TUS_RESUMABLE: HeaderName = HeaderName::from_static("tus-resumable");
pub const TUS_VERSION_HEADER: HeaderName = HeaderName::from_static("tus-version");
pub const TUS_EXTENSION: HeaderName = HeaderName::from_static("tus-extension");
pub const TUS_MAX_SIZE: HeaderName = HeaderName::from_static("tus-max-size");
pub const UPLOAD_LENGTH: HeaderName = HeaderName::from_static("upload-length");
pub const UPLOAD_DEFER_LENGTH: HeaderName = HeaderName::from_static("upload-defer-length");
pub const UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub const UPLOAD_METADATA: HeaderName = HeaderName::from_static("upload-metadata");
pub const UPLOAD_CONCAT: HeaderName = HeaderName::from_static("upload-concat");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Types a browser may render inline when the upload is downloaded
const INLINE_MIME_TYPES: &[&str] = &[
    "text/plain",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/webp",
    "audio/wave",
    "audio/wav",
    "audio/x-wav",
    "audio/x-pn-wav",
    "audio/webm",
    "video/webm",
    "audio/ogg",
    "video/ogg",
    "application/ogg",
];

/// Value of the `Tus-Extension` header for a capability set
pub fn extensions(caps: Capabilities) -> String {
    let mut extensions = vec!["creation", "creation-with-upload"];
    if caps.terminate {
        extensions.push("termination");
    }
    if caps.concatenate {
        extensions.push("concatenation");
    }
    if caps.defer_length {
        extensions.push("creation-defer-length");
    }
    extensions.join(",")
}

/// Host and scheme the client used to reach us
pub fn host_and_protocol(head: &RequestHead, respect_forwarded: bool) -> (String, String) {
    let mut proto = head.uri.scheme_str().unwrap_or("http").to_string();
    let mut host = match head.header_str(&HOST) {
        "" => head
            .uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "localhost".to_string()),
        host => host.to_string(),
    };

    if !respect_forwarded {
        return (host, proto);
    }

    let forwarded_host = head.header_str(&X_FORWARDED_HOST);
    if !forwarded_host.is_empty() {
        host = forwarded_host.to_string();
    }

    let forwarded_proto = head.header_str(&X_FORWARDED_PROTO);
    if forwarded_proto == "http" || forwarded_proto == "https" {
        proto = forwarded_proto.to_string();
    }

    // RFC 7239 takes precedence over the de-facto X-Forwarded-* headers
    let forwarded = head.header_str(&hyper::header::FORWARDED);
    for pair in forwarded.split([';', ',']) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "host" if !value.is_empty() => host = value.to_string(),
            "proto" if value == "http" || value == "https" => proto = value.to_string(),
            _ => {}
        }
    }

    (host, proto)
}

/// Content-Type and Content-Disposition for downloading an upload
pub fn content_headers(info: &FileInfo) -> (String, String) {
    let filetype = info
        .meta_data
        .get("filetype")
        .map(String::as_str)
        .unwrap_or_default();

    let (content_type, mut disposition) = if INLINE_MIME_TYPES.contains(&filetype) {
        (filetype.to_string(), "inline".to_string())
    } else {
        ("application/octet-stream".to_string(), "attachment".to_string())
    };

    if let Some(filename) = info.meta_data.get("filename") {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        disposition.push_str(&format!("; filename=\"{}\"", escaped));
    }

    (content_type, disposition)
}
