//! Chunk writing, completion and termination shared by the handlers

use tracing::{debug, info, warn};
use tusk_core::{FileInfo, Result, TusError, Upload};

use crate::body::BodyReader;
use crate::hooks::{stop_channel, HookEvent, ProgressEmitter};
use crate::protocol::UPLOAD_OFFSET;
use crate::request::{Body, RequestHead, UploadResponse};
use crate::Handler;

impl Handler {
    /// Copy the request body into `upload` at its current offset, then set
    /// `Upload-Offset` on the response and finish the upload if it is now
    /// complete.
    ///
    /// A progress event's [`HookEvent::stop_upload`] aborts the write; the
    /// partial upload is then terminated if the store supports it and the
    /// request fails with `UploadStoppedByServer`.
    pub(crate) async fn write_chunk(
        &self,
        upload: &dyn Upload,
        mut info: FileInfo,
        head: &RequestHead,
        body: Option<Body>,
        resp: &mut UploadResponse,
    ) -> Result<()> {
        let id = info.id.clone();
        let offset = info.offset;
        let length = head.content_length();

        if !info.size_is_deferred {
            if let Some(length) = length {
                if offset.saturating_add(length) > info.size {
                    return Err(TusError::SizeExceeded);
                }
            }
        }

        let mut max_size = match info.remaining() {
            Some(remaining) => remaining,
            None => self
                .config
                .max_size
                .map_or(u64::MAX, |max| max.saturating_sub(offset)),
        };
        if let Some(length) = length.filter(|l| *l > 0) {
            max_size = max_size.min(length);
        }

        debug!(id = %id, offset, max_size, "chunk write started");

        let mut bytes_written = 0;
        let mut result: Result<()> = Ok(());

        if let Some(body) = body.filter(|_| max_size > 0) {
            let mut reader = BodyReader::new(body, max_size);
            let stats = reader.stats();
            let (stop_handle, mut stop_signal) = stop_channel();

            let progress = self.hooks.progress.as_ref().map(|sender| {
                let event = HookEvent::new(info.clone(), head.clone())
                    .with_stop_handle(stop_handle.clone());
                ProgressEmitter::start(
                    sender.clone(),
                    event,
                    stats.clone(),
                    self.config.progress_interval,
                )
            });

            let written = tokio::select! {
                res = upload.write_chunk(offset, &mut reader) => res,
                _ = stop_signal.stopped() => Ok(0),
            };
            let stopped = stop_handle.is_stopped();

            if let Some(progress) = progress {
                progress.stop().await;
            }

            match written {
                Ok(n) => bytes_written = n,
                Err(e) => result = Err(e),
            }

            if stopped && self.capabilities.terminate {
                if let Err(e) = self.terminate_upload(upload, &info, head).await {
                    warn!(id = %id, error = %e, "failed to terminate stopped upload");
                }
            }

            if let Some(e) = stats.take_error() {
                warn!(id = %id, error = %e, "error reading request body");
                if result.is_ok() {
                    result = Err(e.into());
                }
            }

            if stopped {
                result = Err(TusError::UploadStoppedByServer);
            }
        }

        debug!(id = %id, bytes_written, "chunk write complete");
        result?;

        let new_offset = offset + bytes_written;
        resp.set_header(UPLOAD_OFFSET, new_offset.to_string());
        self.metrics.inc_bytes_received(bytes_written);
        info.offset = new_offset;

        self.finish_upload_if_complete(upload, &info, head).await
    }

    /// Finish the upload and announce it when every declared byte is stored
    pub(crate) async fn finish_upload_if_complete(
        &self,
        upload: &dyn Upload,
        info: &FileInfo,
        head: &RequestHead,
    ) -> Result<()> {
        if !info.is_complete() {
            return Ok(());
        }

        upload.finish_upload().await?;

        if let Some(callback) = &self.config.pre_finish_response_callback {
            callback(&HookEvent::new(info.clone(), head.clone()))?;
        }

        self.metrics.inc_uploads_finished();
        info!(id = %info.id, size = info.size, "upload finished");

        if let Some(sender) = &self.hooks.complete {
            sender.send(HookEvent::new(info.clone(), head.clone())).await;
        }

        Ok(())
    }

    /// Terminate through the store and announce it. `info` is only used for
    /// the hook event.
    pub(crate) async fn terminate_upload(
        &self,
        upload: &dyn Upload,
        info: &FileInfo,
        head: &RequestHead,
    ) -> Result<()> {
        let terminater = self
            .composer
            .terminater
            .as_ref()
            .ok_or(TusError::NotImplemented)?;

        terminater.terminate(upload).await?;
        info!(id = %upload.id(), "upload terminated");

        if let Some(sender) = &self.hooks.terminated {
            sender.send(HookEvent::new(info.clone(), head.clone())).await;
        }

        self.metrics.inc_uploads_terminated();
        Ok(())
    }
}
