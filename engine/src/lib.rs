//! # Mirror Engine
//!
//! Client-side models and collections kept in step with a REST resource.
//!
//! This crate holds the synchronization logic: attribute change tracking,
//! identity resolution when server data is merged into records already held,
//! CRUD-to-HTTP verb mapping and the pagination state machine. It performs no
//! IO of its own; requests go through a [`Transport`].
//!
//! ## Core Concepts
//!
//! ### Models
//!
//! A [`Model`] is one server-backed record: a JSON attribute map plus the
//! previous value of every attribute changed since the last sync. Models
//! publish `change`, `changed`, `sync`, `destroy` and `remove` events.
//!
//! - [`Model::save`] - create, update or patch the record
//! - [`Model::fetch`] - replace the attributes with the server's copy
//! - [`Model::destroy`] - delete, optimistically or after confirmation
//!
//! ### Collections
//!
//! A [`Collection`] is an ordered set of models fetched page by page. Records
//! that arrive again are merged into the model already held instead of being
//! duplicated. Filters and ordering are sent with every request; changing
//! either makes the collection *dirty*, so the next fetch starts over from
//! the first page.
//!
//! ### Links
//!
//! After each fetch the collection learns its `next`/`prev` links from the
//! response body, a `Link` response header, or page arithmetic, depending on
//! its [`Pagination`] settings.
//!
//! ## Quick Start
//!
//! ```rust
//! use mirror_engine::{Collection, FetchOptions, MemoryTransport};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! // 1. Script the server
//! let transport = Arc::new(MemoryTransport::new());
//! transport.push_json(json!({
//!     "count": 3,
//!     "results": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}],
//!     "next": "/items?page=2",
//! }));
//!
//! // 2. Create a collection
//! let items = Collection::builder()
//!     .url("/items")
//!     .page_size(2)
//!     .transport(transport.clone())
//!     .build();
//!
//! // 3. Fetch the first page
//! futures::executor::block_on(items.fetch(FetchOptions::default())).unwrap();
//!
//! assert_eq!(items.len(), 2);
//! assert_eq!(items.state().total_pages, 2);
//! assert_eq!(
//!     transport.last_request().unwrap().url,
//!     "/items?page=1&page_size=2"
//! );
//! ```

pub mod cid;
pub mod collection;
pub mod error;
pub mod events;
pub mod method;
pub mod model;
pub mod pagination;
pub mod transport;

pub(crate) mod lock;

// Re-export main types at crate root
pub use cid::{Cid, CidFactory};
pub use collection::{
    default_parse_response as default_parse_page, Collection, CollectionBuilder,
    CollectionEvent, CollectionHooks, CreateOptions, DefaultCollectionHooks, FetchOptions,
    Incoming, OrderRef, ResponsePage, SetOptions, UncleanOptions,
};
pub use error::{Error, Result, TransportError};
pub use events::{Emitter, Event, ListenerId};
pub use method::{Crud, Method};
pub use model::{
    default_parse_response, Attributes, DefaultHooks, DestroyOptions, Model, ModelBuilder,
    ModelEvent, ModelHooks, ModelType, Previous, SaveOptions, DEFAULT_ID_ATTRIBUTE,
};
pub use pagination::{
    parse_link_header, Filters, HeaderLink, LinkUpdate, Links, PageState, PageUpdate,
    Pagination, QueryContext, StateUpdate,
};
pub use transport::{
    MemoryTransport, RequestParams, SyncRequest, SyncResponse, Transport,
    DEFAULT_CONTENT_TYPE, DEFAULT_DATA_TYPE,
};
