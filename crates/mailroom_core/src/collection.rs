//! Collections: a store plus load/save transforms.

use crate::document::{Document, DocumentCore};
use crate::error::{MailroomError, MailroomResult, TransformError};
use crate::mailroom::Shared;
use crate::types::{CollectionId, DocumentId, DocumentValue};
use bytes::Bytes;
use mailroom_store::{DataStore, StoredValue, VersionToken};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Decodes stored bytes into a value.
pub type LoadTransform<T> = Arc<dyn Fn(&[u8]) -> Result<T, TransformError> + Send + Sync>;

/// Encodes a value into bytes for storage.
pub type SaveTransform<T> = Arc<dyn Fn(&T) -> Result<Bytes, TransformError> + Send + Sync>;

/// What a collection does when a requested key has never been written.
#[derive(Debug, Clone)]
pub enum MissingKeyPolicy<T> {
    /// Start from this value. The first commit creates the key.
    UseDefault(T),
    /// Fail acquisition with [`MailroomError::DocumentAbsent`].
    Reject,
}

/// A decoded store read.
pub(crate) struct Loaded<T> {
    pub(crate) value: T,
    pub(crate) version: Option<VersionToken>,
    /// Bytes the value was decoded from; `None` for a missing key.
    pub(crate) raw: Option<Bytes>,
}

pub(crate) struct CollectionCore<T> {
    pub(crate) id: CollectionId,
    pub(crate) name: String,
    pub(crate) store: Arc<dyn DataStore>,
    pub(crate) shared: Arc<Shared>,
    load: LoadTransform<T>,
    save: SaveTransform<T>,
    missing: MissingKeyPolicy<T>,
    documents: Mutex<HashMap<String, Weak<DocumentCore<T>>>>,
}

impl<T: DocumentValue> CollectionCore<T> {
    /// Turns a raw store read into a value according to the missing-key policy.
    pub(crate) fn decode(
        &self,
        key: &str,
        stored: Option<StoredValue>,
    ) -> MailroomResult<Loaded<T>> {
        match stored {
            Some(stored) => {
                let value = (self.load)(&stored.raw)
                    .map_err(|e| MailroomError::transform_failed(key, e))?;
                Ok(Loaded {
                    value,
                    version: Some(stored.version),
                    raw: Some(stored.raw),
                })
            }
            None => match &self.missing {
                MissingKeyPolicy::UseDefault(value) => Ok(Loaded {
                    value: value.clone(),
                    version: None,
                    raw: None,
                }),
                MissingKeyPolicy::Reject => Err(MailroomError::DocumentAbsent {
                    collection: self.name.clone(),
                    key: key.to_string(),
                }),
            },
        }
    }

    pub(crate) fn encode(&self, key: &str, value: &T) -> MailroomResult<Bytes> {
        (self.save)(value).map_err(|e| MailroomError::transform_failed(key, e))
    }

    fn cached(&self, key: &str) -> Option<Arc<DocumentCore<T>>> {
        self.documents.lock().get(key).and_then(Weak::upgrade)
    }
}

/// A named binding of a [`DataStore`] to a value type.
///
/// Collections are cheap to clone; clones share the document cache.
pub struct Collection<T> {
    core: Arc<CollectionCore<T>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("store", &self.core.store.name())
            .finish()
    }
}

impl<T: DocumentValue> Collection<T> {
    pub(crate) fn from_parts(
        shared: Arc<Shared>,
        name: String,
        store: Arc<dyn DataStore>,
        load: LoadTransform<T>,
        save: SaveTransform<T>,
        missing: MissingKeyPolicy<T>,
    ) -> Self {
        let id = shared.next_collection_id();
        debug!(collection = %id, name = %name, store = store.name(), "collection created");
        Self {
            core: Arc::new(CollectionCore {
                id,
                name,
                store,
                shared,
                load,
                save,
                missing,
                documents: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the collection ID.
    pub fn id(&self) -> CollectionId {
        self.core.id
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.core.store
    }

    /// Acquires the document for `key`.
    ///
    /// While any handle to a key's document is alive, every call for that
    /// key returns the same document, so all transactions on it share one
    /// commit lock. Otherwise the key is read from the store.
    ///
    /// # Errors
    ///
    /// Returns `LoadFailed` if the read fails, `TransformFailed` if the load
    /// transform rejects the bytes, or `DocumentAbsent` if the key is missing
    /// and the collection rejects missing keys.
    pub async fn document(&self, key: &str) -> MailroomResult<Document<T>> {
        if let Some(core) = self.core.cached(key) {
            return Ok(Document { core });
        }

        let stored = self
            .core
            .store
            .get(key)
            .await
            .map_err(|source| MailroomError::LoadFailed {
                key: key.to_string(),
                source,
            })?;
        let loaded = self.core.decode(key, stored)?;

        let mut documents = self.core.documents.lock();
        // Another task may have loaded the key while we were reading.
        if let Some(core) = documents.get(key).and_then(Weak::upgrade) {
            return Ok(Document { core });
        }
        documents.retain(|_, weak| weak.strong_count() > 0);

        let id = DocumentId::new(self.core.shared.next_document_id());
        let core = Arc::new(DocumentCore::new(
            id,
            key.to_string(),
            Arc::clone(&self.core),
            loaded,
        ));
        documents.insert(key.to_string(), Arc::downgrade(&core));
        drop(documents);

        self.core.shared.stats.record_document_loaded();
        debug!(
            collection = %self.core.name,
            key,
            document = %id,
            version = ?core.version(),
            "document loaded"
        );
        Ok(Document { core })
    }

    /// Returns the live document for `key` without touching the store.
    pub fn cached(&self, key: &str) -> Option<Document<T>> {
        self.core.cached(key).map(|core| Document { core })
    }

    /// Returns how many documents of this collection are currently alive.
    pub fn cached_count(&self) -> usize {
        self.core
            .documents
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Builder for a [`Collection`] with explicit settings.
///
/// ```rust
/// use mailroom_core::{codec, Mailroom};
/// use mailroom_store::InMemoryStore;
/// use std::sync::Arc;
///
/// let mailroom = Mailroom::default();
/// let scores = mailroom
///     .collection_builder::<u32>()
///     .name("scores")
///     .store(Arc::new(InMemoryStore::new()))
///     .load_transform(codec::cbor_load::<u32>)
///     .save_transform(codec::cbor_save::<u32>)
///     .default_value(0)
///     .build()
///     .unwrap();
///
/// assert_eq!(scores.name(), "scores");
/// ```
pub struct CollectionBuilder<T> {
    shared: Arc<Shared>,
    name: Option<String>,
    store: Option<Arc<dyn DataStore>>,
    load: Option<LoadTransform<T>>,
    save: Option<SaveTransform<T>>,
    missing: MissingKeyPolicy<T>,
}

impl<T: DocumentValue> CollectionBuilder<T> {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            name: None,
            store: None,
            load: None,
            save: None,
            missing: MissingKeyPolicy::Reject,
        }
    }

    /// Sets the collection name. Defaults to the store's name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the backing store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the load transform.
    #[must_use]
    pub fn load_transform<F>(mut self, load: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, TransformError> + Send + Sync + 'static,
    {
        self.load = Some(Arc::new(load));
        self
    }

    /// Sets the save transform.
    #[must_use]
    pub fn save_transform<F>(mut self, save: F) -> Self
    where
        F: Fn(&T) -> Result<Bytes, TransformError> + Send + Sync + 'static,
    {
        self.save = Some(Arc::new(save));
        self
    }

    /// Missing keys start from `value`.
    #[must_use]
    pub fn default_value(mut self, value: T) -> Self {
        self.missing = MissingKeyPolicy::UseDefault(value);
        self
    }

    /// Missing keys fail acquisition. This is the builder's default.
    #[must_use]
    pub fn reject_missing(mut self) -> Self {
        self.missing = MissingKeyPolicy::Reject;
        self
    }

    /// Builds the collection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the store or either transform was not set.
    pub fn build(self) -> MailroomResult<Collection<T>> {
        let store = self
            .store
            .ok_or_else(|| MailroomError::invalid_argument("collection requires a store"))?;
        let load = self
            .load
            .ok_or_else(|| MailroomError::invalid_argument("collection requires a load transform"))?;
        let save = self
            .save
            .ok_or_else(|| MailroomError::invalid_argument("collection requires a save transform"))?;
        let name = self.name.unwrap_or_else(|| store.name().to_string());

        Ok(Collection::from_parts(
            self.shared,
            name,
            store,
            load,
            save,
            self.missing,
        ))
    }
}
