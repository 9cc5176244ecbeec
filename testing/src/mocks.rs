//! Mocks for the storage and notification ports.

use request_desk_core::event::{DispatchError, Event, LifecycleEvent, NotificationDispatcher};
use request_desk_core::request::Attachment;
use request_desk_core::storage::{
    ObjectStorage, PresignedUpload, StorageError, StorageFuture, StoredObject, UploadSlot,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct StorageState {
    objects: HashMap<String, StoredObject>,
    slots: Vec<UploadSlot>,
    unavailable: bool,
}

/// Object storage held in memory.
///
/// Presigning records the slot and returns a `mock://` URL; nothing is uploaded until a test
/// calls [`MockObjectStorage::put_object`] or [`MockObjectStorage::upload`], which plays the
/// client's direct-to-storage upload.
///
/// # Example
///
/// ```
/// use request_desk_testing::MockObjectStorage;
///
/// let storage = MockObjectStorage::new();
/// storage.put_object("requests/r/a/deck.pdf", 1024, Some("abc"));
/// assert_eq!(storage.object_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockObjectStorage {
    state: Arc<Mutex<StorageState>>,
}

impl MockObjectStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StorageState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Place an object at `key`.
    pub fn put_object(&self, key: &str, size_bytes: u64, checksum_sha256: Option<&str>) {
        self.with_state(|s| {
            s.objects.insert(
                key.to_string(),
                StoredObject {
                    size_bytes,
                    content_type: None,
                    checksum_sha256: checksum_sha256.map(str::to_string),
                },
            );
        });
    }

    /// Upload `size_bytes` to the slot of a staged attachment.
    pub fn upload(&self, attachment: &Attachment, size_bytes: u64) {
        self.with_state(|s| {
            s.objects.insert(
                attachment.storage_key.clone(),
                StoredObject {
                    size_bytes,
                    content_type: Some(attachment.content_type.clone()),
                    checksum_sha256: None,
                },
            );
        });
    }

    /// Remove the object at `key`.
    pub fn remove(&self, key: &str) {
        self.with_state(|s| {
            s.objects.remove(key);
        });
    }

    /// Make every call fail with [`StorageError::Unavailable`] (or stop doing so).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.with_state(|s| s.unavailable = unavailable);
    }

    /// Slots presigned so far, in order.
    #[must_use]
    pub fn presigned_slots(&self) -> Vec<UploadSlot> {
        self.with_state(|s| s.slots.clone())
    }

    /// Number of stored objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.with_state(|s| s.objects.len())
    }
}

impl ObjectStorage for MockObjectStorage {
    fn presign_upload(&self, slot: UploadSlot) -> StorageFuture<'_, PresignedUpload> {
        let result = self.with_state(|s| {
            if s.unavailable {
                return Err(StorageError::Unavailable("mock storage offline".to_string()));
            }
            let upload = PresignedUpload {
                url: format!(
                    "mock://storage/{}?expires={}&max-size={}",
                    slot.key,
                    slot.expires_at.timestamp(),
                    slot.max_size_bytes
                ),
                headers: BTreeMap::from([("content-type".to_string(), slot.content_type.clone())]),
            };
            s.slots.push(slot);
            Ok(upload)
        });
        Box::pin(std::future::ready(result))
    }

    fn head(&self, key: String) -> StorageFuture<'_, Option<StoredObject>> {
        let result = self.with_state(|s| {
            if s.unavailable {
                Err(StorageError::Unavailable("mock storage offline".to_string()))
            } else {
                Ok(s.objects.get(&key).cloned())
            }
        });
        Box::pin(std::future::ready(result))
    }
}

/// Dispatcher that records every event it is handed.
///
/// A failing recorder still records, then returns [`DispatchError::Failed`]; tests use it to check
/// that dispatch failures never undo a committed mutation.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
    fail: bool,
}

impl RecordingDispatcher {
    /// Create a recorder that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder that rejects every event after recording it.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Versioned type names of the events received so far.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(Event::event_type).collect()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(
        &self,
        event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + '_>> {
        let event_type = event.event_type();
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);

        let result = if self.fail {
            Err(DispatchError::Failed(format!("recorder rejects {event_type}")))
        } else {
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }
}
