//! Collections: ordered, paginated sets of models.
//!
//! A [`Collection`] owns its models and a [`PageState`]. Server data enters
//! through [`Collection::set`], which resolves each incoming record against
//! the models already held (by id, then by cid) so that a record fetched
//! twice stays one model.
//!
//! Every fetch takes a token from a per-collection generation counter.
//! Resetting the collection or invalidating its query advances the counter;
//! a response that arrives for an outdated token is dropped and the fetch
//! fails with [`Error::Superseded`].

use crate::events::{Emitter, Event, ListenerId};
use crate::model::{Attributes, DestroyOptions, Model, ModelType, SaveOptions};
use crate::pagination::{
    Filters, LinkUpdate, PageState, PageUpdate, Pagination, QueryContext, StateUpdate,
};
use crate::{error::Result, lock, Cid, CidFactory, Crud, Error, Method, RequestParams};
use crate::{SyncResponse, Transport};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Notifications published by a collection.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    /// A `set` call finished merging.
    Set { collection: Collection },
    Reset { collection: Collection },
    /// A fetch completed and its results were merged.
    Sync { collection: Collection },
    /// A `fetch_page` completed; emitted before `sync`.
    PageSync { collection: Collection, page: u64 },
    /// A fetch was attempted with no URL to fetch.
    InvalidFetch { collection: Collection },
    /// A page was requested before the page count was known.
    UnknownPage { collection: Collection },
    /// A page outside the known range was requested.
    InvalidPage { collection: Collection, page: u64 },
}

impl CollectionEvent {
    pub const SET: &'static str = "set";
    pub const RESET: &'static str = "reset";
    pub const SYNC: &'static str = "sync";
    pub const PAGE_SYNC: &'static str = "pagesync";
    pub const INVALID_FETCH: &'static str = "invalid.fetch";
    pub const UNKNOWN_PAGE: &'static str = "unknownpage.fetch";
    pub const INVALID_PAGE: &'static str = "invalidpage.fetch";

    pub fn collection(&self) -> &Collection {
        match self {
            CollectionEvent::Set { collection }
            | CollectionEvent::Reset { collection }
            | CollectionEvent::Sync { collection }
            | CollectionEvent::PageSync { collection, .. }
            | CollectionEvent::InvalidFetch { collection }
            | CollectionEvent::UnknownPage { collection }
            | CollectionEvent::InvalidPage { collection, .. } => collection,
        }
    }
}

impl Event for CollectionEvent {
    fn name(&self) -> &'static str {
        match self {
            CollectionEvent::Set { .. } => Self::SET,
            CollectionEvent::Reset { .. } => Self::RESET,
            CollectionEvent::Sync { .. } => Self::SYNC,
            CollectionEvent::PageSync { .. } => Self::PAGE_SYNC,
            CollectionEvent::InvalidFetch { .. } => Self::INVALID_FETCH,
            CollectionEvent::UnknownPage { .. } => Self::UNKNOWN_PAGE,
            CollectionEvent::InvalidPage { .. } => Self::INVALID_PAGE,
        }
    }
}

/// Records and total count extracted from one page response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponsePage {
    pub results: Vec<Value>,
    pub count: Option<u64>,
}

/// Behaviour a collection may override.
///
/// `filters` and `ordering` are called while the collection's state is
/// locked and only see the data they are given.
pub trait CollectionHooks: Send + Sync {
    /// Called once, after construction and the initial `set`.
    fn initialize(&self, _collection: &Collection) {}

    /// Extract the page from a fetch response. The default is
    /// [`default_parse_response`].
    fn parse_response(&self, response: &SyncResponse) -> Result<ResponsePage> {
        default_parse_response(response)
    }

    /// Filters as sent with requests.
    fn filters(&self, filters: &Filters) -> Filters {
        filters.clone()
    }

    /// Ordering parameter value.
    fn ordering(&self, ordering: &[String]) -> String {
        ordering.join(",")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCollectionHooks;

impl CollectionHooks for DefaultCollectionHooks {}

/// Accepts `{"count": n, "results": [...]}`, a bare array of records, or an
/// empty body.
pub fn default_parse_response(response: &SyncResponse) -> Result<ResponsePage> {
    match &response.body {
        Value::Null => Ok(ResponsePage::default()),
        Value::Array(items) => Ok(ResponsePage {
            results: items.clone(),
            count: None,
        }),
        Value::Object(body) => {
            let results = match body.get("results") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(other) => {
                    return Err(Error::InvalidResponse(format!(
                        "expected a results array, got {other}"
                    )))
                }
            };
            Ok(ResponsePage {
                results,
                count: body.get("count").and_then(Value::as_u64),
            })
        }
        other => Err(Error::InvalidResponse(format!(
            "expected a page object, got {other}"
        ))),
    }
}

/// One record handed to [`Collection::set`].
#[derive(Debug, Clone)]
pub enum Incoming {
    Data(Attributes),
    Model(Model),
    /// Anything that is not an attribute object; skipped.
    Other(Value),
}

impl From<Attributes> for Incoming {
    fn from(attributes: Attributes) -> Self {
        Incoming::Data(attributes)
    }
}

impl From<Model> for Incoming {
    fn from(model: Model) -> Self {
        Incoming::Model(model)
    }
}

impl From<&Model> for Incoming {
    fn from(model: &Model) -> Self {
        Incoming::Model(model.clone())
    }
}

impl From<Value> for Incoming {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(attributes) => Incoming::Data(attributes),
            other => Incoming::Other(other),
        }
    }
}

/// Options for [`Collection::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Reset the collection before merging.
    pub reset: bool,
    /// Treat the records as the first page of a fresh collection.
    pub bootstrap: bool,
}

/// Options for the fetch family.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub params: RequestParams,
    /// Drop the models held before merging the fetched page.
    pub replace: bool,
}

/// Options for [`Collection::set_unclean`] and the filter and ordering
/// mutators.
#[derive(Debug, Clone, Copy)]
pub struct UncleanOptions {
    /// Clear `clean`, `next` and `prev`. Defaults to true.
    pub reset: bool,
    /// Fetch immediately afterwards.
    pub fetch: bool,
}

impl Default for UncleanOptions {
    fn default() -> Self {
        Self {
            reset: true,
            fetch: false,
        }
    }
}

impl UncleanOptions {
    pub fn fetch() -> Self {
        Self {
            fetch: true,
            ..Self::default()
        }
    }

    pub fn keep() -> Self {
        Self {
            reset: false,
            fetch: false,
        }
    }
}

/// Options for [`Collection::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Save the new model right away. Defaults to true.
    pub sync: bool,
    pub save: SaveOptions,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            sync: true,
            save: SaveOptions::default(),
        }
    }
}

/// Ordering entry to remove: by position, or by token with or without its
/// `-` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Index(usize),
    Token(String),
}

impl From<usize> for OrderRef {
    fn from(index: usize) -> Self {
        OrderRef::Index(index)
    }
}

impl From<&str> for OrderRef {
    fn from(token: &str) -> Self {
        OrderRef::Token(token.to_string())
    }
}

impl From<String> for OrderRef {
    fn from(token: String) -> Self {
        OrderRef::Token(token)
    }
}

pub(crate) struct CollectionInner {
    cid: Cid,
    model_type: ModelType,
    pagination: Pagination,
    transport: Option<Arc<dyn Transport>>,
    hooks: Arc<dyn CollectionHooks>,
    data: RwLock<CollectionData>,
    generation: AtomicU64,
    events: Emitter<CollectionEvent>,
}

struct CollectionData {
    url: Option<String>,
    models: Vec<Model>,
    state: PageState,
    filters: Filters,
    ordering: Vec<String>,
}

/// Owned inputs for building a [`QueryContext`].
struct Query {
    base: Option<String>,
    ordering: String,
    filters: Filters,
}

impl Query {
    fn ctx(&self) -> QueryContext<'_> {
        QueryContext {
            base: self.base.as_deref(),
            ordering: &self.ordering,
            filters: &self.filters,
        }
    }
}

/// Which stored link a fetch follows.
#[derive(Debug, Clone, Copy)]
enum Target {
    Next,
    Prev,
    Page(u64),
}

/// Builder for [`Collection`].
pub struct CollectionBuilder {
    url: Option<String>,
    model_type: ModelType,
    pagination: Pagination,
    transport: Option<Arc<dyn Transport>>,
    hooks: Arc<dyn CollectionHooks>,
    state: PageState,
    cids: Option<Arc<CidFactory>>,
    models: Vec<Incoming>,
    bootstrap: bool,
}

impl CollectionBuilder {
    fn new() -> Self {
        Self {
            url: None,
            model_type: ModelType::new(),
            pagination: Pagination::default(),
            transport: None,
            hooks: Arc::new(DefaultCollectionHooks),
            state: PageState::default(),
            cids: None,
            models: Vec::new(),
            bootstrap: false,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Type of the models the collection creates.
    pub fn model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn page_size(mut self, page_size: u64) -> Self {
        self.pagination.page_size = page_size;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn hooks(mut self, hooks: impl CollectionHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Initial pagination state, e.g. a count known ahead of time.
    pub fn state(mut self, state: PageState) -> Self {
        self.state = state;
        self
    }

    pub fn cid_factory(mut self, factory: Arc<CidFactory>) -> Self {
        self.cids = Some(factory);
        self
    }

    /// Records to hold from the start.
    pub fn models<I>(mut self, models: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Incoming>,
    {
        self.models.extend(models.into_iter().map(Into::into));
        self
    }

    /// Treat the initial records as the first page already fetched.
    pub fn bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn build(self) -> Collection {
        let cid = match &self.cids {
            Some(factory) => factory.next("collection"),
            None => CidFactory::global().next("collection"),
        };
        let collection = Collection {
            inner: Arc::new(CollectionInner {
                cid,
                model_type: self.model_type,
                pagination: self.pagination,
                transport: self.transport,
                hooks: self.hooks,
                data: RwLock::new(CollectionData {
                    url: self.url,
                    models: Vec::new(),
                    state: self.state,
                    filters: Filters::new(),
                    ordering: Vec::new(),
                }),
                generation: AtomicU64::new(0),
                events: Emitter::new(),
            }),
        };
        collection.set(
            self.models,
            SetOptions {
                reset: false,
                bootstrap: self.bootstrap,
            },
        );
        collection.inner.hooks.initialize(&collection);
        collection
    }
}

/// An ordered, paginated set of models backed by one remote resource.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// A collection of default models at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::builder().url(url).build()
    }

    pub fn builder() -> CollectionBuilder {
        CollectionBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<CollectionInner>) -> Self {
        Self { inner }
    }

    pub fn cid(&self) -> &Cid {
        &self.inner.cid
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn events(&self) -> &Emitter<CollectionEvent> {
        &self.inner.events
    }

    pub fn on<F>(&self, name: &'static str, listener: F) -> ListenerId
    where
        F: Fn(&CollectionEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(name, listener)
    }

    fn emit(&self, event: CollectionEvent) {
        self.inner.events.emit(&event);
    }

    pub fn url(&self) -> Option<String> {
        lock::read(&self.inner.data).url.clone()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        lock::write(&self.inner.data).url = Some(url.into());
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.transport.clone()
    }

    pub fn pagination(&self) -> &Pagination {
        &self.inner.pagination
    }

    pub fn model_type(&self) -> &ModelType {
        &self.inner.model_type
    }

    // Models

    /// Snapshot of the models, in order.
    pub fn models(&self) -> Vec<Model> {
        lock::read(&self.inner.data).models.clone()
    }

    pub fn len(&self) -> usize {
        lock::read(&self.inner.data).models.len()
    }

    pub fn is_empty(&self) -> bool {
        lock::read(&self.inner.data).models.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<Model> {
        lock::read(&self.inner.data).models.get(index).cloned()
    }

    /// First model whose id matches `key` or whose cid equals it. Ids compare
    /// loosely, so `1` finds a model with id `"1"`.
    pub fn get(&self, key: impl Into<Value>) -> Option<Model> {
        let key = key.into();
        lock::read(&self.inner.data)
            .models
            .iter()
            .find(|m| {
                key.as_str() == Some(m.cid().as_str())
                    || m.id().is_some_and(|id| loose_eq(&id, &key))
            })
            .cloned()
    }

    /// Models holding every given attribute value.
    pub fn where_attrs(&self, attrs: &Attributes) -> Vec<Model> {
        lock::read(&self.inner.data)
            .models
            .iter()
            .filter(|m| attrs.iter().all(|(k, v)| m.get(k).as_ref() == Some(v)))
            .cloned()
            .collect()
    }

    pub fn where_one(&self, attrs: &Attributes) -> Option<Model> {
        self.where_attrs(attrs).into_iter().next()
    }

    /// Models last merged on page `page`.
    pub fn page(&self, page: u64) -> Vec<Model> {
        lock::read(&self.inner.data)
            .models
            .iter()
            .filter(|m| m.page() == page)
            .cloned()
            .collect()
    }

    /// First to last page number, once the page count is known.
    pub fn page_range(&self) -> Option<RangeInclusive<u64>> {
        let total = lock::read(&self.inner.data).state.total_pages;
        (total > 0).then(|| self.inner.pagination.page_start..=total)
    }

    /// Merge records into the collection.
    ///
    /// Each record is matched to a held model by id, or by cid for model
    /// instances without an id. Matches receive the record's attributes;
    /// everything else is appended. Touched models are tagged with the
    /// current page. Publishes `set` once at the end.
    pub fn set<I>(&self, items: I, options: SetOptions) -> &Self
    where
        I: IntoIterator,
        I::Item: Into<Incoming>,
    {
        if options.reset {
            self.reset();
        }

        let page = {
            let mut data = lock::write(&self.inner.data);
            if options.bootstrap {
                let pagination = &self.inner.pagination;
                data.state.clean = true;
                data.state.current_page = pagination.page_start;
                let query = self.query(&data);
                let next = pagination
                    .page_start
                    .checked_add(pagination.page_increment)
                    .and_then(|page| {
                        pagination
                            .rebuild_url(&query.ctx(), None, PageUpdate::page(page))
                            .ok()
                    });
                if let Some(next) = next {
                    data.state.next = Some(next);
                }
            }
            data.state.current_page
        };

        let id_attribute = self.inner.model_type.id_attribute_name();
        let (mut merged, mut added) = (0usize, 0usize);

        for item in items {
            match item.into() {
                Incoming::Other(value) => {
                    tracing::warn!(collection = %self.cid(), %value, "skipping non-object record");
                }
                Incoming::Data(attributes) => {
                    let existing = attributes
                        .get(id_attribute)
                        .filter(|id| !id.is_null())
                        .and_then(|id| self.find_by_id(id));
                    match existing {
                        Some(target) => {
                            target.set_many(attributes);
                            target.set_page(page);
                            merged += 1;
                        }
                        None => {
                            let model = self.build_model(attributes, page);
                            lock::write(&self.inner.data).models.push(model);
                            added += 1;
                        }
                    }
                }
                Incoming::Model(model) => {
                    let existing = match model.id() {
                        Some(id) => self.find_by_id(&id),
                        None => self.find_by_cid(model.cid()),
                    };
                    match existing {
                        Some(target) => {
                            if let Some(url) = model.url_override() {
                                target.set_url(url);
                            }
                            if !target.ptr_eq(&model) {
                                target.set_many(model.to_json());
                            }
                            target.set_page(page);
                            merged += 1;
                        }
                        None => {
                            let model = if self.can_adopt(&model) {
                                model.attach(Arc::downgrade(&self.inner), page);
                                model
                            } else {
                                let copy = self.build_model(model.to_json(), page);
                                if let Some(url) = model.url_override() {
                                    copy.set_url(url);
                                }
                                copy
                            };
                            lock::write(&self.inner.data).models.push(model);
                            added += 1;
                        }
                    }
                }
            }
        }

        tracing::debug!(collection = %self.cid(), page, merged, added, "merged records");
        self.emit(CollectionEvent::Set {
            collection: self.clone(),
        });
        self
    }

    /// Add one record. Invalidates the current links first.
    pub fn add(&self, item: impl Into<Incoming>) -> &Self {
        self.mark_unclean();
        self.set([item.into()], SetOptions::default())
    }

    /// Create a model in this collection, saving it unless `options.sync` is
    /// false. The model stays in the collection if the save fails.
    pub async fn create(&self, attributes: Attributes, options: CreateOptions) -> Result<Model> {
        let page = lock::read(&self.inner.data).state.current_page;
        let model = self.build_model(attributes, page);
        self.mark_unclean();
        self.set([&model], SetOptions::default());
        if options.sync {
            model.save(None, options.save).await?;
        }
        Ok(model)
    }

    /// Save every model concurrently. Fails with the first error.
    pub async fn save_all(&self, options: SaveOptions) -> Result<()> {
        let models = self.models();
        let saves = models.iter().map(|m| m.save(None, options.clone()));
        futures::future::join_all(saves).await.into_iter().collect()
    }

    /// Destroy every model concurrently. Fails with the first error.
    pub async fn destroy_all(&self, options: DestroyOptions) -> Result<()> {
        let models = self.models();
        let destroys = models.iter().map(|m| m.destroy(options.clone()));
        futures::future::join_all(destroys).await.into_iter().collect()
    }

    /// Drop models without destroying them remotely. Each removed model
    /// loses its collection reference and publishes `remove`.
    pub fn remove<I>(&self, models: I) -> Vec<Model>
    where
        I: IntoIterator<Item = Model>,
    {
        let cids: HashSet<Cid> = models.into_iter().map(|m| m.cid().clone()).collect();
        self.remove_where(|m| cids.contains(m.cid()))
    }

    /// Drop the models with the given ids.
    pub fn remove_ids<I>(&self, ids: I) -> Vec<Model>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        self.remove_where(|m| {
            m.id()
                .is_some_and(|id| ids.iter().any(|wanted| loose_eq(&id, wanted)))
        })
    }

    fn remove_where(&self, matches: impl Fn(&Model) -> bool) -> Vec<Model> {
        let removed: Vec<Model> = {
            let mut data = lock::write(&self.inner.data);
            let (removed, kept): (Vec<Model>, Vec<Model>) = std::mem::take(&mut data.models)
                .into_iter()
                .partition(|m| matches(m));
            data.models = kept;
            removed
        };
        for model in &removed {
            model.removed();
        }
        removed
    }

    /// Drop every model and return to the dirty first-page state. The count
    /// and page total are kept.
    pub fn reset(&self) -> &Self {
        let dropped = {
            let mut data = lock::write(&self.inner.data);
            data.state.reset();
            std::mem::take(&mut data.models)
        };
        self.advance();
        self.release_all(dropped);
        self.emit(CollectionEvent::Reset {
            collection: self.clone(),
        });
        self
    }

    fn release_all(&self, models: Vec<Model>) {
        for model in models {
            if self.owns(&model) {
                model.release();
            }
        }
    }

    fn find_by_id(&self, id: &Value) -> Option<Model> {
        lock::read(&self.inner.data)
            .models
            .iter()
            .find(|m| m.id().as_ref() == Some(id))
            .cloned()
    }

    fn find_by_cid(&self, cid: &Cid) -> Option<Model> {
        lock::read(&self.inner.data)
            .models
            .iter()
            .find(|m| m.cid() == cid)
            .cloned()
    }

    fn owns(&self, model: &Model) -> bool {
        model
            .collection_inner()
            .is_some_and(|c| Arc::ptr_eq(&c, &self.inner))
    }

    fn can_adopt(&self, model: &Model) -> bool {
        model.collection_inner().is_none() || self.owns(model)
    }

    fn build_model(&self, attributes: Attributes, page: u64) -> Model {
        self.inner
            .model_type
            .builder()
            .attributes(attributes)
            .page(page)
            .collection(Arc::downgrade(&self.inner))
            .build()
    }

    // Pagination state

    pub fn state(&self) -> PageState {
        lock::read(&self.inner.data).state.clone()
    }

    /// Apply a partial state update; link rebuilds use the current filters
    /// and ordering.
    pub fn update_state(&self, update: StateUpdate) -> Result<()> {
        let mut data = lock::write(&self.inner.data);
        let query = self.query(&data);
        data.state.apply(update, &self.inner.pagination, &query.ctx())
    }

    /// Build a fetch URL from the current filters and ordering.
    pub fn rebuild_url(&self, old: Option<&str>, update: PageUpdate) -> Result<String> {
        let data = lock::read(&self.inner.data);
        let query = self.query(&data);
        self.inner.pagination.rebuild_url(&query.ctx(), old, update)
    }

    /// Filters as sent with requests.
    pub fn filters(&self) -> Filters {
        let data = lock::read(&self.inner.data);
        self.inner.hooks.filters(&data.filters)
    }

    /// Ordering parameter value as sent with requests.
    pub fn ordering(&self) -> String {
        let data = lock::read(&self.inner.data);
        self.inner.hooks.ordering(&data.ordering)
    }

    pub fn ordering_tokens(&self) -> Vec<String> {
        lock::read(&self.inner.data).ordering.clone()
    }

    fn query(&self, data: &CollectionData) -> Query {
        Query {
            base: data.url.clone(),
            ordering: self.inner.hooks.ordering(&data.ordering),
            filters: self.inner.hooks.filters(&data.filters),
        }
    }

    fn advance(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn mark_unclean(&self) {
        {
            let mut data = lock::write(&self.inner.data);
            data.state.clean = false;
            data.state.next = None;
            data.state.prev = None;
        }
        self.advance();
    }

    /// Invalidate the current links so the next fetch starts over from the
    /// first page, unless `options.reset` is false. Fetches right away when
    /// `options.fetch` is set.
    pub async fn set_unclean(&self, options: UncleanOptions) -> Result<()> {
        if options.reset {
            self.mark_unclean();
        }
        if options.fetch {
            self.fetch(FetchOptions::default()).await?;
        }
        Ok(())
    }

    /// Add or overwrite filters.
    pub async fn add_filter(&self, filters: Filters, options: UncleanOptions) -> Result<()> {
        lock::write(&self.inner.data).filters.extend(filters);
        self.set_unclean(options).await
    }

    pub async fn remove_filter<I, K>(&self, keys: I, options: UncleanOptions) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        {
            let mut data = lock::write(&self.inner.data);
            for key in keys {
                data.filters.remove(key.as_ref());
            }
        }
        self.set_unclean(options).await
    }

    /// Insert an ordering token at `position` (clamped; `None` appends).
    pub async fn add_order(
        &self,
        token: impl Into<String>,
        position: Option<usize>,
        options: UncleanOptions,
    ) -> Result<()> {
        {
            let mut data = lock::write(&self.inner.data);
            let position = position.unwrap_or(data.ordering.len()).min(data.ordering.len());
            data.ordering.insert(position, token.into());
        }
        self.set_unclean(options).await
    }

    /// Remove an ordering token by position, or by token. A token matches
    /// itself first, then its descending `-` form.
    pub async fn remove_order(
        &self,
        order: impl Into<OrderRef>,
        options: UncleanOptions,
    ) -> Result<()> {
        {
            let mut data = lock::write(&self.inner.data);
            let position = match order.into() {
                OrderRef::Index(index) => Some(index),
                OrderRef::Token(token) => {
                    let descending = format!("-{token}");
                    data.ordering
                        .iter()
                        .position(|t| *t == token)
                        .or_else(|| data.ordering.iter().position(|t| *t == descending))
                }
            };
            if let Some(position) = position.filter(|p| *p < data.ordering.len()) {
                data.ordering.remove(position);
            }
        }
        self.set_unclean(options).await
    }

    // Fetching

    /// Fetch the next page.
    ///
    /// A dirty collection is reset and fetches its first page, built from the
    /// current filters and ordering. A clean one follows its `next` link and
    /// fails with [`Error::NoFetchUrl`] when there is none.
    pub async fn fetch(&self, options: FetchOptions) -> Result<()> {
        self.fetch_target(Target::Next, options).await
    }

    /// Fetch the page behind the `prev` link.
    pub async fn fetch_prev(&self, options: FetchOptions) -> Result<()> {
        self.fetch_target(Target::Prev, options).await
    }

    /// Fetch page `page`. Needs a known page total and a page within
    /// `page_start..=total_pages`; publishes `pagesync` after the merge.
    pub async fn fetch_page(&self, page: u64, options: FetchOptions) -> Result<()> {
        let start = self.inner.pagination.page_start;
        let total = lock::read(&self.inner.data).state.total_pages;

        if total == 0 {
            self.emit(CollectionEvent::UnknownPage {
                collection: self.clone(),
            });
            return Err(Error::UnknownPageCount);
        }
        if page < start || page > total {
            self.emit(CollectionEvent::InvalidPage {
                collection: self.clone(),
                page,
            });
            return Err(Error::PageOutOfRange {
                page,
                start,
                end: total,
            });
        }

        let prev = match page.checked_sub(1).filter(|p| *p >= start) {
            Some(p) => LinkUpdate::Rebuild(PageUpdate::page(p)),
            None => LinkUpdate::Url(None),
        };
        self.update_state(StateUpdate {
            next: Some(LinkUpdate::Rebuild(PageUpdate::page(page))),
            prev: Some(prev),
            ..StateUpdate::default()
        })?;

        self.fetch_target(Target::Page(page), options).await
    }

    async fn fetch_target(&self, target: Target, options: FetchOptions) -> Result<()> {
        let transport = self.transport().ok_or(Error::MissingTransport)?;
        Method::resolve(
            options
                .params
                .verb
                .as_deref()
                .unwrap_or(Crud::Read.as_str()),
        )?;

        let (url, dropped) = {
            let mut data = lock::write(&self.inner.data);
            let mut dropped = None;
            let was_clean = data.state.clean;
            if !was_clean {
                let next = match options.params.url {
                    Some(_) => None,
                    None => {
                        let page = match target {
                            Target::Page(page) => PageUpdate::page(page),
                            Target::Next | Target::Prev => PageUpdate::default(),
                        };
                        let query = self.query(&data);
                        Some(self.inner.pagination.rebuild_url(&query.ctx(), None, page)?)
                    }
                };
                data.state.reset();
                data.state.next = next;
                dropped = Some(std::mem::take(&mut data.models));
            }
            let link = match target {
                Target::Prev if was_clean => data.state.prev.clone(),
                _ => data.state.next.clone(),
            };
            (options.params.url.clone().or(link), dropped)
        };

        if let Some(dropped) = dropped {
            self.advance();
            self.release_all(dropped);
            self.emit(CollectionEvent::Reset {
                collection: self.clone(),
            });
        }

        let Some(url) = url.filter(|u| !u.is_empty()) else {
            self.emit(CollectionEvent::InvalidFetch {
                collection: self.clone(),
            });
            return Err(Error::NoFetchUrl);
        };
        let request = options.params.assemble(url, Crud::Read.as_str(), None)?;
        let url = request.url.clone();

        // Only a request that is actually sent supersedes the ones in flight.
        let token = self.advance();
        tracing::debug!(collection = %self.cid(), %url, generation = token, "fetching page");
        let response = transport.sync(request).await?;

        let current = self.inner.generation.load(Ordering::SeqCst);
        if current != token {
            tracing::warn!(
                collection = %self.cid(),
                %url,
                generation = token,
                current,
                "discarding stale response"
            );
            return Err(Error::Superseded);
        }

        let page = self.inner.hooks.parse_response(&response)?;
        let pagination = &self.inner.pagination;
        {
            let mut data = lock::write(&self.inner.data);
            let query = self.query(&data);
            let current_page = pagination.page_from_url(&url).unwrap_or(pagination.page_start);
            data.state.apply(
                StateUpdate {
                    clean: Some(true),
                    current_page: Some(current_page),
                    count: page.count,
                    ..StateUpdate::default()
                },
                pagination,
                &query.ctx(),
            )?;
            let links = pagination.links_from_response(
                &response,
                &query.ctx(),
                &data.state,
                page.results.len(),
            )?;
            data.state.next = links.next;
            data.state.prev = links.prev;
        }

        if options.replace {
            let dropped = std::mem::take(&mut lock::write(&self.inner.data).models);
            self.release_all(dropped);
        }
        self.set(page.results, SetOptions::default());

        if let Target::Page(page) = target {
            self.emit(CollectionEvent::PageSync {
                collection: self.clone(),
                page,
            });
        }
        self.emit(CollectionEvent::Sync {
            collection: self.clone(),
        });
        Ok(())
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = lock::read(&self.inner.data);
        f.debug_struct("Collection")
            .field("cid", &self.inner.cid)
            .field("url", &data.url)
            .field("len", &data.models.len())
            .field("state", &data.state)
            .finish()
    }
}

/// Id comparison across JSON types: numbers and strings with the same text
/// are equal.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim() == n.to_string()
        }
        _ => a == b,
    }
}
