//! Protocol handlers for the upload resource

use hyper::header::{
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION,
};
use hyper::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};
use tusk_core::*;

use crate::hooks::{hook_channels, HookEvent, HookReceivers, HookSenders};
use crate::metrics::Metrics;
use crate::protocol::{self, *};
use crate::request::{Body, GuardedReader, RequestHead, ResponseBody, UploadRequest, UploadResponse};
use crate::Config;

/// Resumable upload engine
///
/// Each operation consumes an [`UploadRequest`] and always produces an
/// [`UploadResponse`]; failures are rendered as error responses carrying a
/// JSON body with the message and a machine-readable reason.
pub struct Handler {
    pub(crate) config: Config,
    pub(crate) composer: StoreComposer,
    pub(crate) capabilities: Capabilities,
    base_path: String,
    is_base_path_abs: bool,
    extensions: String,
    pub(crate) hooks: HookSenders,
    pub(crate) metrics: Arc<Metrics>,
}

impl Handler {
    /// Build a handler and the receivers of its enabled hook channels
    pub fn new(mut config: Config) -> Result<(Self, HookReceivers)> {
        let is_base_path_abs = config.validate()?;
        let composer = config.store_composer.clone();
        let capabilities = composer.capabilities();
        let (hooks, receivers) = hook_channels(&config);

        info!(
            base_path = %config.base_path,
            terminate = capabilities.terminate,
            concatenate = capabilities.concatenate,
            defer_length = capabilities.defer_length,
            lock = capabilities.lock,
            "upload handler configured"
        );

        let handler = Handler {
            base_path: config.base_path.clone(),
            is_base_path_abs,
            extensions: protocol::extensions(capabilities),
            config,
            composer,
            capabilities,
            hooks,
            metrics: Arc::new(Metrics::default()),
        };

        Ok((handler, receivers))
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Normalized base path or URL
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Dispatch on the request method
    pub async fn handle(&self, req: UploadRequest) -> UploadResponse {
        match req.head.method {
            Method::OPTIONS => self.options(req),
            Method::POST => self.post_file(req).await,
            Method::HEAD => self.head_file(req).await,
            Method::PATCH => self.patch_file(req).await,
            Method::GET => self.get_file(req).await,
            Method::DELETE => self.del_file(req).await,
            _ => {
                let mut resp = UploadResponse::new();
                resp.set_header(hyper::header::ALLOW, "OPTIONS, POST, HEAD, PATCH, GET, DELETE");
                resp.set_header(TUS_RESUMABLE, TUS_VERSION);
                resp.status = StatusCode::METHOD_NOT_ALLOWED;
                resp
            }
        }
    }

    /// Advertise protocol version, extensions and size limit
    pub fn options(&self, req: UploadRequest) -> UploadResponse {
        let mut resp = UploadResponse::new();
        resp.set_header(TUS_VERSION_HEADER, TUS_VERSION);
        resp.set_header(TUS_EXTENSION, &self.extensions);
        if let Some(max_size) = self.config.max_size {
            resp.set_header(TUS_MAX_SIZE, max_size.to_string());
        }
        self.respond(&req.head, resp, Ok(StatusCode::NO_CONTENT))
    }

    /// Create a new upload, optionally with its first chunk
    pub async fn post_file(&self, req: UploadRequest) -> UploadResponse {
        let UploadRequest { head, body } = req;
        let mut resp = UploadResponse::new();
        let result = self.create_upload(&head, body, &mut resp).await;
        self.respond(&head, resp, result)
    }

    /// Report an upload's length, offset and metadata
    pub async fn head_file(&self, req: UploadRequest) -> UploadResponse {
        let mut resp = UploadResponse::new();
        let result = self.describe_upload(&req.head, &mut resp).await;
        self.respond(&req.head, resp, result)
    }

    /// Append a chunk to an upload
    pub async fn patch_file(&self, req: UploadRequest) -> UploadResponse {
        let UploadRequest { head, body } = req;
        let mut resp = UploadResponse::new();
        let result = self.append_chunk(&head, body, &mut resp).await;
        self.respond(&head, resp, result)
    }

    /// Stream the bytes received so far
    pub async fn get_file(&self, req: UploadRequest) -> UploadResponse {
        let mut resp = UploadResponse::new();
        let result = self.download_upload(&req.head, &mut resp).await;
        self.respond(&req.head, resp, result)
    }

    /// Terminate an upload
    pub async fn del_file(&self, req: UploadRequest) -> UploadResponse {
        let result = self.delete_upload(&req.head).await;
        self.respond(&req.head, UploadResponse::new(), result)
    }

    async fn create_upload(
        &self,
        head: &RequestHead,
        body: Option<Body>,
        resp: &mut UploadResponse,
    ) -> Result<StatusCode> {
        self.check_version(head)?;

        // Other content types are treated as no chunk at all
        let contains_chunk = head.header_str(&CONTENT_TYPE) == CHUNK_CONTENT_TYPE;

        let concat_header = if self.capabilities.concatenate {
            head.header_str(&UPLOAD_CONCAT)
        } else {
            ""
        };
        let role = parse_concat(concat_header)?;

        let (size, size_is_deferred, partials) = if role.is_final {
            if contains_chunk {
                return Err(TusError::ModifyFinal);
            }
            let (partials, size) = self.size_of_uploads(&role.partial_uploads).await?;
            (size, false, partials)
        } else {
            let (size, deferred) = self.validate_new_upload_length_headers(
                head.header_str(&UPLOAD_LENGTH),
                head.header_str(&UPLOAD_DEFER_LENGTH),
            )?;
            (size, deferred, Vec::new())
        };

        if self.config.max_size.is_some_and(|max| size > max) {
            return Err(TusError::MaxSizeExceeded);
        }

        let meta_data = parse_metadata_header(head.header_str(&UPLOAD_METADATA))?;

        let is_final = role.is_final;
        let info = FileInfo {
            size,
            size_is_deferred,
            meta_data,
            is_partial: role.is_partial,
            is_final,
            partial_uploads: role.partial_uploads,
            ..Default::default()
        };

        if let Some(callback) = &self.config.pre_upload_create_callback {
            callback(&HookEvent::new(info.clone(), head.clone()))?;
        }

        let upload = self.composer.core.new_upload(info).await?;
        let mut info = upload.get_info().await?;
        let id = info.id.clone();

        // Set right away so that error responses carry it too
        let url = self.abs_file_url(head, &id);
        resp.set_header(LOCATION, &url);

        self.metrics.inc_uploads_created();
        info!(id = %id, size, deferred = size_is_deferred, url = %url, "upload created");

        if let Some(sender) = &self.hooks.created {
            sender.send(HookEvent::new(info.clone(), head.clone())).await;
        }

        if is_final {
            let concater = self
                .composer
                .concater
                .as_ref()
                .ok_or(TusError::NotImplemented)?;
            concater.concat_uploads(upload.as_ref(), &partials).await?;
            info.offset = size;

            // Empty finals are announced by the completion check below
            if size > 0 {
                if let Some(sender) = &self.hooks.complete {
                    sender.send(HookEvent::new(info.clone(), head.clone())).await;
                }
            }
        }

        if contains_chunk {
            let _guard = self.lock_upload(&id)?;
            self.write_chunk(upload.as_ref(), info, head, body, resp).await?;
        } else if !size_is_deferred && size == 0 {
            self.finish_upload_if_complete(upload.as_ref(), &info, head).await?;
        }

        Ok(StatusCode::CREATED)
    }

    async fn describe_upload(
        &self,
        head: &RequestHead,
        resp: &mut UploadResponse,
    ) -> Result<StatusCode> {
        self.check_version(head)?;
        let id = extract_id_from_path(head.path())?;
        let _guard = self.lock_upload(&id)?;

        let upload = self.composer.core.get_upload(&id).await?;
        let info = upload.get_info().await?;

        if info.is_partial {
            resp.set_header(UPLOAD_CONCAT, "partial");
        }
        if info.is_final {
            let urls: Vec<String> = info
                .partial_uploads
                .iter()
                .map(|partial| self.abs_file_url(head, partial))
                .collect();
            resp.set_header(UPLOAD_CONCAT, format!("final;{}", urls.join(" ")));
        }

        if !info.meta_data.is_empty() {
            resp.set_header(UPLOAD_METADATA, serialize_metadata_header(&info.meta_data));
        }

        if info.size_is_deferred {
            resp.set_header(UPLOAD_DEFER_LENGTH, UPLOAD_LENGTH_DEFERRED);
        } else {
            resp.set_header(UPLOAD_LENGTH, info.size.to_string());
            resp.set_header(CONTENT_LENGTH, info.size.to_string());
        }

        resp.set_header(CACHE_CONTROL, "no-store");
        resp.set_header(UPLOAD_OFFSET, info.offset.to_string());
        Ok(StatusCode::OK)
    }

    async fn append_chunk(
        &self,
        head: &RequestHead,
        body: Option<Body>,
        resp: &mut UploadResponse,
    ) -> Result<StatusCode> {
        self.check_version(head)?;

        if head.header_str(&CONTENT_TYPE) != CHUNK_CONTENT_TYPE {
            return Err(TusError::InvalidContentType);
        }

        let offset: u64 = head
            .header_str(&UPLOAD_OFFSET)
            .parse()
            .map_err(|_| TusError::InvalidOffset)?;

        let id = extract_id_from_path(head.path())?;
        let _guard = self.lock_upload(&id)?;

        let upload = self.composer.core.get_upload(&id).await?;
        let mut info = upload.get_info().await?;

        if info.is_final {
            return Err(TusError::ModifyFinal);
        }
        if offset != info.offset {
            return Err(TusError::MismatchOffset);
        }

        // Nothing to store once complete, answer without touching the store
        if info.is_complete() {
            resp.set_header(UPLOAD_OFFSET, offset.to_string());
            return Ok(StatusCode::NO_CONTENT);
        }

        let length_header = head.header_str(&UPLOAD_LENGTH);
        if !length_header.is_empty() {
            let deferrer = self
                .composer
                .length_deferrer
                .as_ref()
                .ok_or(TusError::NotImplemented)?;
            if !info.size_is_deferred {
                return Err(TusError::InvalidUploadLength);
            }

            let length: u64 = length_header
                .parse()
                .map_err(|_| TusError::InvalidUploadLength)?;
            if length < info.offset {
                return Err(TusError::InvalidUploadLength);
            }
            if self.config.max_size.is_some_and(|max| length > max) {
                return Err(TusError::MaxSizeExceeded);
            }

            deferrer.declare_length(upload.as_ref(), length).await?;
            debug!(id = %id, length, "upload length declared");
            info.size = length;
            info.size_is_deferred = false;
        }

        self.write_chunk(upload.as_ref(), info, head, body, resp).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn download_upload(
        &self,
        head: &RequestHead,
        resp: &mut UploadResponse,
    ) -> Result<StatusCode> {
        let id = extract_id_from_path(head.path())?;
        let guard = self.lock_upload(&id)?;

        let upload = self.composer.core.get_upload(&id).await?;
        let info = upload.get_info().await?;

        let reader = match info.offset {
            0 => None,
            _ => Some(upload.get_reader().await?),
        };

        let (content_type, disposition) = content_headers(&info);
        resp.set_header(CONTENT_LENGTH, info.offset.to_string());
        resp.set_header(CONTENT_TYPE, content_type);
        resp.set_header(CONTENT_DISPOSITION, disposition);

        match reader {
            Some(reader) => {
                resp.body = ResponseBody::Reader(GuardedReader::new(reader, guard));
                Ok(StatusCode::OK)
            }
            None => Ok(StatusCode::NO_CONTENT),
        }
    }

    async fn delete_upload(&self, head: &RequestHead) -> Result<StatusCode> {
        self.check_version(head)?;

        if !self.capabilities.terminate {
            return Err(TusError::NotImplemented);
        }

        let id = extract_id_from_path(head.path())?;
        let _guard = self.lock_upload(&id)?;

        let upload = self.composer.core.get_upload(&id).await?;

        let info = if self.config.notify_terminated_uploads {
            upload.get_info().await?
        } else {
            FileInfo {
                id: id.clone(),
                ..Default::default()
            }
        };

        self.terminate_upload(upload.as_ref(), &info, head).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// Turn an operation outcome into the final response
    fn respond(
        &self,
        head: &RequestHead,
        mut resp: UploadResponse,
        result: Result<StatusCode>,
    ) -> UploadResponse {
        resp.set_header(TUS_RESUMABLE, TUS_VERSION);

        match result {
            Ok(status) => {
                resp.status = status;
                debug!(method = %head.method, path = %head.path(), status = status.as_u16(), "request handled");
            }
            Err(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!(method = %head.method, path = %head.path(), error = %err, "request failed");
                } else {
                    debug!(method = %head.method, path = %head.path(), error = %err, "request rejected");
                }

                resp.status = status;
                resp.headers.remove(CONTENT_LENGTH);
                resp.headers.remove(CONTENT_DISPOSITION);
                if head.method == Method::HEAD {
                    resp.body = ResponseBody::Empty;
                } else {
                    let body = json!({
                        "error": err.to_string(),
                        "code": err.reason(),
                    });
                    resp.set_header(CONTENT_TYPE, "application/json");
                    resp.body = ResponseBody::Bytes(body.to_string().into_bytes());
                }
            }
        }

        resp
    }

    /// Reject requests speaking another protocol version. A missing header
    /// is tolerated.
    fn check_version(&self, head: &RequestHead) -> Result<()> {
        match head.header_str(&TUS_RESUMABLE) {
            "" | TUS_VERSION => Ok(()),
            _ => Err(TusError::UnsupportedVersion),
        }
    }

    /// Load the partial uploads of a final upload and sum their sizes. Every
    /// partial must be complete.
    async fn size_of_uploads(&self, ids: &[String]) -> Result<(Vec<Box<dyn Upload>>, u64)> {
        let mut uploads = Vec::with_capacity(ids.len());
        let mut size: u64 = 0;

        for id in ids {
            let upload = self.composer.core.get_upload(id).await?;
            let info = upload.get_info().await?;

            if !info.is_complete() {
                return Err(TusError::UploadNotFinished);
            }

            size = size
                .checked_add(info.size)
                .ok_or(TusError::MaxSizeExceeded)?;
            uploads.push(upload);
        }

        Ok((uploads, size))
    }

    /// Interpret `Upload-Length` and `Upload-Defer-Length` of a creation
    /// request as (size, deferred)
    fn validate_new_upload_length_headers(
        &self,
        length: &str,
        defer_length: &str,
    ) -> Result<(u64, bool)> {
        let is_deferred = defer_length == UPLOAD_LENGTH_DEFERRED;

        if is_deferred && !self.capabilities.defer_length {
            Err(TusError::NotImplemented)
        } else if !length.is_empty() && !defer_length.is_empty() {
            Err(TusError::ConflictingLengthHeaders)
        } else if !defer_length.is_empty() && !is_deferred {
            Err(TusError::InvalidDeferLength)
        } else if is_deferred {
            Ok((0, true))
        } else {
            let size = length.parse().map_err(|_| TusError::InvalidUploadLength)?;
            Ok((size, false))
        }
    }

    /// Absolute URL of an upload
    fn abs_file_url(&self, head: &RequestHead, id: &str) -> String {
        if self.is_base_path_abs {
            return format!("{}{}", self.base_path, id);
        }

        let (host, proto) = host_and_protocol(head, self.config.respect_forwarded_headers);
        format!("{}://{}{}{}", proto, host, self.base_path, id)
    }
}
