//! Capability composition for storage backends

use std::fmt;
use std::sync::Arc;

use crate::{Concater, DataStore, LengthDeferrer, Locker, Terminater};

/// Set of extensions an engine may advertise, resolved once from a composer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub terminate: bool,
    pub concatenate: bool,
    pub defer_length: bool,
    pub lock: bool,
}

/// Core store plus the optional extension implementations it supports.
///
/// A single backend usually fills several slots with clones of the same
/// `Arc`:
///
/// ```ignore
/// let store = Arc::new(MemoryStore::new());
/// let composer = StoreComposer::new(store.clone())
///     .with_terminater(store.clone())
///     .with_locker(Arc::new(MemoryLocker::new()));
/// ```
#[derive(Clone)]
pub struct StoreComposer {
    pub core: Arc<dyn DataStore>,
    pub terminater: Option<Arc<dyn Terminater>>,
    pub concater: Option<Arc<dyn Concater>>,
    pub length_deferrer: Option<Arc<dyn LengthDeferrer>>,
    pub locker: Option<Arc<dyn Locker>>,
}

impl StoreComposer {
    /// Composer with only the core store
    pub fn new(core: Arc<dyn DataStore>) -> Self {
        StoreComposer {
            core,
            terminater: None,
            concater: None,
            length_deferrer: None,
            locker: None,
        }
    }

    pub fn with_terminater(mut self, terminater: Arc<dyn Terminater>) -> Self {
        self.terminater = Some(terminater);
        self
    }

    pub fn with_concater(mut self, concater: Arc<dyn Concater>) -> Self {
        self.concater = Some(concater);
        self
    }

    pub fn with_length_deferrer(mut self, length_deferrer: Arc<dyn LengthDeferrer>) -> Self {
        self.length_deferrer = Some(length_deferrer);
        self
    }

    pub fn with_locker(mut self, locker: Arc<dyn Locker>) -> Self {
        self.locker = Some(locker);
        self
    }

    /// Snapshot of which extensions are wired
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            terminate: self.terminater.is_some(),
            concatenate: self.concater.is_some(),
            defer_length: self.length_deferrer.is_some(),
            lock: self.locker.is_some(),
        }
    }
}

impl fmt::Debug for StoreComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreComposer")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
