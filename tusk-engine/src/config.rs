//! Engine configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tusk_core::{Result, StoreComposer, TusError};

use crate::hooks::{DeliveryPolicy, HookEvent};

/// Callback run before an upload is created or before a finished upload is
/// answered. Returning an error aborts the request with that error.
pub type HookCallback = Arc<dyn Fn(&HookEvent) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub struct Config {
    pub store_composer: StoreComposer,
    /// Path prefix or absolute URL under which uploads are addressed
    pub base_path: String,
    /// Largest upload accepted, unlimited when `None`
    pub max_size: Option<u64>,
    pub notify_complete_uploads: bool,
    pub notify_terminated_uploads: bool,
    pub notify_upload_progress: bool,
    pub notify_created_uploads: bool,
    /// Trust `X-Forwarded-*` and `Forwarded` when building upload URLs
    pub respect_forwarded_headers: bool,
    pub hook_channel_capacity: usize,
    pub hook_delivery: DeliveryPolicy,
    /// Period between progress events during a chunk write
    pub progress_interval: Duration,
    pub pre_upload_create_callback: Option<HookCallback>,
    pub pre_finish_response_callback: Option<HookCallback>,
}

impl Config {
    pub fn new(store_composer: StoreComposer) -> Self {
        Config {
            store_composer,
            base_path: "/files/".to_string(),
            max_size: None,
            notify_complete_uploads: false,
            notify_terminated_uploads: false,
            notify_upload_progress: false,
            notify_created_uploads: false,
            respect_forwarded_headers: false,
            hook_channel_capacity: 64,
            hook_delivery: DeliveryPolicy::Block,
            progress_interval: Duration::from_secs(1),
            pre_upload_create_callback: None,
            pre_finish_response_callback: None,
        }
    }

    /// Check settings and normalize the base path. Returns whether the base
    /// path is an absolute URL.
    pub(crate) fn validate(&mut self) -> Result<bool> {
        if self.hook_channel_capacity == 0 {
            return Err(TusError::InvalidConfig(
                "hook channel capacity must be positive".to_string(),
            ));
        }
        if self.progress_interval.is_zero() {
            return Err(TusError::InvalidConfig(
                "progress interval must be positive".to_string(),
            ));
        }

        let is_abs = url::Url::parse(&self.base_path)
            .map(|url| url.has_host())
            .unwrap_or(false);

        if !is_abs && !self.base_path.starts_with('/') {
            self.base_path.insert(0, '/');
        }
        if !self.base_path.ends_with('/') {
            self.base_path.push('/');
        }

        Ok(is_abs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("store_composer", &self.store_composer)
            .field("base_path", &self.base_path)
            .field("max_size", &self.max_size)
            .field("notify_complete_uploads", &self.notify_complete_uploads)
            .field("notify_terminated_uploads", &self.notify_terminated_uploads)
            .field("notify_upload_progress", &self.notify_upload_progress)
            .field("notify_created_uploads", &self.notify_created_uploads)
            .field("respect_forwarded_headers", &self.respect_forwarded_headers)
            .field("hook_channel_capacity", &self.hook_channel_capacity)
            .field("hook_delivery", &self.hook_delivery)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}
