//! Models: single server-backed records.
//!
//! A [`Model`] is a cheap handle over shared state. Clones refer to the same
//! record, so a model handed to a listener or stored in a collection is the
//! same model the caller holds.
//!
//! Attribute writes go through [`Model::apply_changes`], which records the
//! previous value of every key it changes and then notifies listeners. Locks
//! are released before any listener runs.

use crate::collection::{Collection, CollectionInner};
use crate::events::{Emitter, Event, ListenerId};
use crate::{error::Result, lock, Cid, CidFactory, Crud, Error, Method, RequestParams, Transport};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use url::form_urlencoded;

/// Attribute name to value.
pub type Attributes = serde_json::Map<String, Value>;

/// Attribute name to the value it held before its latest change. `None`
/// means the attribute was not set.
pub type Previous = BTreeMap<String, Option<Value>>;

pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Notifications published by a model.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// One attribute changed.
    Change { model: Model, key: String },
    /// A `set` call changed at least one attribute. Carries the full
    /// previous-value map.
    Changed { model: Model, previous: Previous },
    /// A fetch or save completed and the response was applied.
    Sync { model: Model },
    /// The model was destroyed locally.
    Destroy { model: Model },
    /// The model was removed from its collection.
    Remove { model: Model },
    /// A fetch was attempted without a usable URL.
    InvalidFetch { model: Model },
}

impl ModelEvent {
    pub const CHANGE: &'static str = "change";
    pub const CHANGED: &'static str = "changed";
    pub const SYNC: &'static str = "sync";
    pub const DESTROY: &'static str = "destroy";
    pub const REMOVE: &'static str = "remove";
    pub const INVALID_FETCH: &'static str = "invalid.fetch";

    pub fn model(&self) -> &Model {
        match self {
            ModelEvent::Change { model, .. }
            | ModelEvent::Changed { model, .. }
            | ModelEvent::Sync { model }
            | ModelEvent::Destroy { model }
            | ModelEvent::Remove { model }
            | ModelEvent::InvalidFetch { model } => model,
        }
    }
}

impl Event for ModelEvent {
    fn name(&self) -> &'static str {
        match self {
            ModelEvent::Change { .. } => Self::CHANGE,
            ModelEvent::Changed { .. } => Self::CHANGED,
            ModelEvent::Sync { .. } => Self::SYNC,
            ModelEvent::Destroy { .. } => Self::DESTROY,
            ModelEvent::Remove { .. } => Self::REMOVE,
            ModelEvent::InvalidFetch { .. } => Self::INVALID_FETCH,
        }
    }
}

/// Behaviour a model type may override.
pub trait ModelHooks: Send + Sync {
    /// Called once, after construction.
    fn initialize(&self, _model: &Model) {}

    /// Apply a response body to the model.
    ///
    /// `method` is the method of the request that produced the body. The
    /// default is [`default_parse_response`].
    fn parse_response(&self, model: &Model, method: Method, body: Value) -> Result<()> {
        default_parse_response(model, method, body)
    }
}

/// Hooks with every default in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ModelHooks for DefaultHooks {}

/// Reads replace the attributes wholesale; writes merge the returned object
/// into the current attributes. An empty (`null`) body leaves the model
/// untouched.
pub fn default_parse_response(model: &Model, method: Method, body: Value) -> Result<()> {
    match body {
        Value::Null => Ok(()),
        Value::Object(attrs) => {
            if method == Method::Get {
                model.replace(attrs);
            } else {
                model.set_many(attrs);
            }
            Ok(())
        }
        other => Err(Error::InvalidResponse(format!(
            "expected an attribute object, got {other}"
        ))),
    }
}

/// A model "subtype": the id attribute, the hooks and the id source shared by
/// every model built from it.
#[derive(Clone)]
pub struct ModelType {
    id_attribute: String,
    hooks: Arc<dyn ModelHooks>,
    cids: Option<Arc<CidFactory>>,
}

impl ModelType {
    pub fn new() -> Self {
        Self {
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            hooks: Arc::new(DefaultHooks),
            cids: None,
        }
    }

    pub fn id_attribute(mut self, id_attribute: impl Into<String>) -> Self {
        self.id_attribute = id_attribute.into();
        self
    }

    pub fn hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Draw cids from `factory` instead of the process-wide one.
    pub fn cid_factory(mut self, factory: Arc<CidFactory>) -> Self {
        self.cids = Some(factory);
        self
    }

    pub fn id_attribute_name(&self) -> &str {
        &self.id_attribute
    }

    /// Start building a model of this type.
    pub fn builder(&self) -> ModelBuilder {
        ModelBuilder::new(self.clone())
    }

    fn next_cid(&self) -> Cid {
        match &self.cids {
            Some(factory) => factory.next("model"),
            None => CidFactory::global().next("model"),
        }
    }
}

impl Default for ModelType {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("id_attribute", &self.id_attribute)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Model`].
pub struct ModelBuilder {
    model_type: ModelType,
    attributes: Attributes,
    url: Option<String>,
    page: u64,
    transport: Option<Arc<dyn Transport>>,
    collection: Weak<CollectionInner>,
}

impl ModelBuilder {
    fn new(model_type: ModelType) -> Self {
        Self {
            model_type,
            attributes: Attributes::new(),
            url: None,
            page: 0,
            transport: None,
            collection: Weak::new(),
        }
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Endpoint for this model, preferred over the owning collection's URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub(crate) fn collection(mut self, collection: Weak<CollectionInner>) -> Self {
        self.collection = collection;
        self
    }

    /// Build the model. Initial attributes are not recorded as changes.
    pub fn build(self) -> Model {
        let cid = self.model_type.next_cid();
        let ModelType {
            id_attribute,
            hooks,
            ..
        } = self.model_type;
        let model = Model {
            inner: Arc::new(ModelInner {
                cid,
                id_attribute,
                hooks,
                transport: self.transport,
                state: RwLock::new(ModelState {
                    attributes: self.attributes,
                    changed: Previous::new(),
                    url: self.url,
                    page: self.page,
                    collection: self.collection,
                }),
                events: Emitter::new(),
            }),
        };
        model.inner.hooks.initialize(&model);
        model
    }
}

struct ModelInner {
    cid: Cid,
    id_attribute: String,
    hooks: Arc<dyn ModelHooks>,
    transport: Option<Arc<dyn Transport>>,
    state: RwLock<ModelState>,
    events: Emitter<ModelEvent>,
}

struct ModelState {
    attributes: Attributes,
    changed: Previous,
    url: Option<String>,
    page: u64,
    collection: Weak<CollectionInner>,
}

/// Options for [`Model::save`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Send only changed attributes with a `patch` request.
    pub patch: bool,
    pub params: RequestParams,
}

impl SaveOptions {
    pub fn patch() -> Self {
        Self {
            patch: true,
            ..Self::default()
        }
    }
}

/// Options for [`Model::destroy`].
#[derive(Debug, Clone, Default)]
pub struct DestroyOptions {
    /// Keep the model in its collection until the server confirms the delete.
    pub wait: bool,
    pub params: RequestParams,
}

impl DestroyOptions {
    pub fn wait() -> Self {
        Self {
            wait: true,
            ..Self::default()
        }
    }
}

/// A single server-backed record.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// A model of the default type with the given attributes.
    pub fn new(attributes: Attributes) -> Self {
        Self::builder().attributes(attributes).build()
    }

    /// Builder for a model of the default type.
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new(ModelType::new())
    }

    pub fn cid(&self) -> &Cid {
        &self.inner.cid
    }

    pub fn id_attribute(&self) -> &str {
        &self.inner.id_attribute
    }

    /// Whether both handles refer to the same model.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn events(&self) -> &Emitter<ModelEvent> {
        &self.inner.events
    }

    pub fn on<F>(&self, name: &'static str, listener: F) -> ListenerId
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(name, listener)
    }

    fn emit(&self, event: ModelEvent) {
        self.inner.events.emit(&event);
    }

    // Attributes

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        lock::read(&self.inner.state).attributes.get(key).cloned()
    }

    /// Current values of several keys; unset keys map to `None`.
    pub fn get_many<I, K>(&self, keys: I) -> BTreeMap<String, Option<Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let state = lock::read(&self.inner.state);
        keys.into_iter()
            .map(|key| {
                let key = key.into();
                let value = state.attributes.get(&key).cloned();
                (key, value)
            })
            .collect()
    }

    pub fn has(&self, key: &str) -> bool {
        lock::read(&self.inner.state).attributes.contains_key(key)
    }

    /// Server-assigned id, if known.
    pub fn id(&self) -> Option<Value> {
        self.get(&self.inner.id_attribute)
    }

    /// True until the id attribute is set.
    pub fn is_new(&self) -> bool {
        !self.has(&self.inner.id_attribute)
    }

    /// Copy of the current attributes.
    pub fn to_json(&self) -> Attributes {
        lock::read(&self.inner.state).attributes.clone()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.apply_changes([(key.into(), Some(value.into()))])
    }

    pub fn set_many(&self, attributes: Attributes) -> &Self {
        self.apply_changes(attributes.into_iter().map(|(k, v)| (k, Some(v))))
    }

    /// Unset the given attributes.
    pub fn remove<I, K>(&self, keys: I) -> &Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.apply_changes(keys.into_iter().map(|k| (k.into(), None)))
    }

    /// Make `attributes` the complete attribute set: keys it holds are set,
    /// every other key is removed.
    pub fn replace(&self, attributes: Attributes) -> &Self {
        let stale: Vec<String> = lock::read(&self.inner.state)
            .attributes
            .keys()
            .filter(|k| !attributes.contains_key(*k))
            .cloned()
            .collect();
        self.apply_changes(
            attributes
                .into_iter()
                .map(|(k, v)| (k, Some(v)))
                .chain(stale.into_iter().map(|k| (k, None))),
        )
    }

    /// Apply a batch of changes. `None` unsets a key.
    ///
    /// Keys whose value is unchanged are skipped. For every other key the old
    /// value is recorded in the previous-value map and a `change` event is
    /// published; one `changed` event follows if anything changed.
    pub fn apply_changes<I, K>(&self, changes: I) -> &Self
    where
        I: IntoIterator<Item = (K, Option<Value>)>,
        K: Into<String>,
    {
        let (keys, previous) = {
            let mut state = lock::write(&self.inner.state);
            let mut keys = Vec::new();
            for (key, value) in changes {
                let key = key.into();
                if state.attributes.get(&key) == value.as_ref() {
                    continue;
                }
                let old = match value {
                    Some(value) => state.attributes.insert(key.clone(), value),
                    None => state.attributes.remove(&key),
                };
                state.changed.insert(key.clone(), old);
                keys.push(key);
            }
            if keys.is_empty() {
                return self;
            }
            (keys, state.changed.clone())
        };

        for key in keys {
            self.emit(ModelEvent::Change {
                model: self.clone(),
                key,
            });
        }
        self.emit(ModelEvent::Changed {
            model: self.clone(),
            previous,
        });
        self
    }

    /// Values held before the latest change of each changed key.
    pub fn previous(&self) -> Previous {
        lock::read(&self.inner.state).changed.clone()
    }

    /// Current values of every changed key. Keys that have since been unset
    /// map to `null`, which is how a partial update clears a field.
    pub fn changes(&self) -> Attributes {
        let state = lock::read(&self.inner.state);
        state
            .changed
            .keys()
            .map(|k| {
                let value = state.attributes.get(k).cloned().unwrap_or(Value::Null);
                (k.clone(), value)
            })
            .collect()
    }

    pub fn has_changed(&self) -> bool {
        !lock::read(&self.inner.state).changed.is_empty()
    }

    /// Forget recorded changes.
    pub fn clear_changes(&self) {
        lock::write(&self.inner.state).changed.clear();
    }

    // Membership

    /// Page of the owning collection this model was last merged on; 0 when
    /// not associated with a page.
    pub fn page(&self) -> u64 {
        lock::read(&self.inner.state).page
    }

    pub(crate) fn set_page(&self, page: u64) {
        lock::write(&self.inner.state).page = page;
    }

    /// The model's own endpoint, if it has one.
    pub fn url_override(&self) -> Option<String> {
        lock::read(&self.inner.state).url.clone()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        lock::write(&self.inner.state).url = Some(url.into());
    }

    pub fn collection(&self) -> Option<Collection> {
        self.collection_inner().map(Collection::from_inner)
    }

    pub(crate) fn collection_inner(&self) -> Option<Arc<CollectionInner>> {
        lock::read(&self.inner.state).collection.upgrade()
    }

    pub(crate) fn attach(&self, collection: Weak<CollectionInner>, page: u64) {
        let mut state = lock::write(&self.inner.state);
        state.collection = collection;
        state.page = page;
    }

    pub(crate) fn release(&self) {
        lock::write(&self.inner.state).collection = Weak::new();
    }

    /// Called by the owning collection after it dropped this model.
    pub(crate) fn removed(&self) {
        self.release();
        self.emit(ModelEvent::Remove {
            model: self.clone(),
        });
    }

    // Sync

    /// Endpoint for this model.
    ///
    /// The base is the model's own URL, else its collection's. New models use
    /// the base as-is; saved models append the percent-encoded id:
    /// `/items` with id 7 becomes `/items/7/`.
    pub fn url(&self) -> Result<String> {
        let (own, id, collection) = {
            let state = lock::read(&self.inner.state);
            (
                state.url.clone(),
                state.attributes.get(&self.inner.id_attribute).cloned(),
                state.collection.upgrade(),
            )
        };
        let base = own
            .or_else(|| collection.and_then(|c| Collection::from_inner(c).url()))
            .ok_or(Error::MissingUrl)?;

        match id {
            None => Ok(base),
            Some(id) => {
                let mut url = base;
                if !url.ends_with('/') {
                    url.push('/');
                }
                url.push_str(&encode_id(&id));
                url.push('/');
                Ok(url)
            }
        }
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = &self.inner.transport {
            return Ok(Arc::clone(transport));
        }
        self.collection()
            .and_then(|c| c.transport())
            .ok_or(Error::MissingTransport)
    }

    /// Read the model from the server.
    ///
    /// Without a resolvable URL this fails with [`Error::NoFetchUrl`] and an
    /// `invalid.fetch` event, and no request is made.
    pub async fn fetch(&self, params: RequestParams) -> Result<()> {
        let url = match params.url.clone().map_or_else(|| self.url(), Ok) {
            Ok(url) if !url.is_empty() => url,
            _ => {
                self.emit(ModelEvent::InvalidFetch {
                    model: self.clone(),
                });
                return Err(Error::NoFetchUrl);
            }
        };
        let request = params.assemble(url, Crud::Read.as_str(), None)?;
        let transport = self.transport()?;
        let sent = self.pending_changes();

        tracing::debug!(cid = %self.cid(), url = %request.url, method = %request.method, "fetching model");
        let method = request.method;
        let response = transport.sync(request).await?;
        self.finish_sync(method, response.body, &sent)
    }

    /// Write the model to the server.
    ///
    /// `attrs`, if given, are applied first. New models are created, others
    /// updated in full, or patched with only their changes when
    /// `options.patch` is set.
    pub async fn save(&self, attrs: Option<Attributes>, options: SaveOptions) -> Result<()> {
        if let Some(attrs) = attrs {
            self.set_many(attrs);
        }

        let crud = if self.is_new() {
            Crud::Create
        } else if options.patch {
            Crud::Patch
        } else {
            Crud::Update
        };
        let mut request = options.params.assemble(self.url()?, crud.as_str(), None)?;
        let payload = if request.method == Method::Patch {
            self.changes()
        } else {
            self.to_json()
        };
        request.body = Some(Value::Object(payload));
        let transport = self.transport()?;
        let sent = self.pending_changes();

        tracing::debug!(cid = %self.cid(), url = %request.url, method = %request.method, "saving model");
        let method = request.method;
        let response = transport.sync(request).await?;
        self.finish_sync(method, response.body, &sent)
    }

    /// Current value of every changed key.
    fn pending_changes(&self) -> BTreeMap<String, Option<Value>> {
        let state = lock::read(&self.inner.state);
        state
            .changed
            .keys()
            .map(|k| (k.clone(), state.attributes.get(k).cloned()))
            .collect()
    }

    /// Apply a response and forget the changes it settled. Keys edited while
    /// the request was in flight stay changed unless the response overwrote
    /// them.
    fn finish_sync(
        &self,
        method: Method,
        body: Value,
        sent: &BTreeMap<String, Option<Value>>,
    ) -> Result<()> {
        let unsent: BTreeMap<String, Option<Value>> = {
            let state = lock::read(&self.inner.state);
            state
                .changed
                .keys()
                .filter_map(|k| {
                    let now = state.attributes.get(k).cloned();
                    (sent.get(k) != Some(&now)).then(|| (k.clone(), now))
                })
                .collect()
        };

        self.inner.hooks.parse_response(self, method, body)?;

        {
            let mut guard = lock::write(&self.inner.state);
            let state = &mut *guard;
            let attributes = &state.attributes;
            state
                .changed
                .retain(|k, _| unsent.get(k).is_some_and(|v| attributes.get(k) == v.as_ref()));
        }
        self.emit(ModelEvent::Sync {
            model: self.clone(),
        });
        Ok(())
    }

    /// Delete the model.
    ///
    /// New models never reached the server: they are detached and the call
    /// resolves without a request. Saved models are detached before the
    /// delete request, or after it succeeds when `options.wait` is set.
    pub async fn destroy(&self, options: DestroyOptions) -> Result<()> {
        if self.is_new() {
            self.detach();
            return Ok(());
        }

        // Resolve everything that depends on the collection before detaching.
        let request = options
            .params
            .assemble(self.url()?, Crud::Delete.as_str(), None)?;
        let transport = self.transport()?;

        if !options.wait {
            self.detach();
        }
        tracing::debug!(cid = %self.cid(), url = %request.url, wait = options.wait, "destroying model");
        transport.sync(request).await?;
        if options.wait {
            self.detach();
        }
        Ok(())
    }

    /// Local half of a destroy: leave the collection and publish `destroy`.
    pub fn detach(&self) {
        if let Some(collection) = self.collection() {
            collection.remove([self.clone()]);
        }
        self.emit(ModelEvent::Destroy {
            model: self.clone(),
        });
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock::read(&self.inner.state);
        f.debug_struct("Model")
            .field("cid", &self.inner.cid)
            .field("attributes", &state.attributes)
            .field("page", &state.page)
            .finish()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_json()))
    }
}

/// Percent-encode an id for use as a path segment.
fn encode_id(id: &Value) -> String {
    let raw = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
