//! Pagination state and request URL construction.
//!
//! A collection is either *dirty* (`clean == false`, the initial state) or
//! *clean*. A dirty collection rebuilds its `next` URL from the configured
//! page, ordering and filters before fetching; a clean collection reuses the
//! `next`/`prev` links learned from the last response. Changing filters or
//! ordering makes the collection dirty again.
//!
//! Links are learned through one of three strategies, in order of precedence:
//! response body fields, a `Link`-style response header, or page-number
//! arithmetic when neither is enabled.

use crate::error::Result;
use crate::{Error, SyncResponse};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use url::form_urlencoded;

/// Filter key to value, serialized into every fetch URL.
pub type Filters = BTreeMap<String, Value>;

/// Reads links out of a response body.
pub type ResponseLinkParser = Arc<dyn Fn(&Value) -> Links + Send + Sync>;

/// Reads links out of response headers. Receives the configured header name.
pub type HeaderLinkParser = Arc<dyn Fn(&str, &SyncResponse) -> Links + Send + Sync>;

/// URLs of the neighbouring pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    pub next: Option<String>,
    pub prev: Option<String>,
}

/// Which response header, if any, carries page links.
///
/// Configured as `false` (off), `true` (the `Link` header) or a header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeaderLink {
    #[default]
    Off,
    /// The standard `Link` header.
    Link,
    /// A custom header name.
    Named(String),
}

impl HeaderLink {
    pub fn header_name(&self) -> Option<&str> {
        match self {
            HeaderLink::Off => None,
            HeaderLink::Link => Some("Link"),
            HeaderLink::Named(name) => Some(name),
        }
    }
}

impl From<&str> for HeaderLink {
    fn from(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            HeaderLink::Off
        } else if name.eq_ignore_ascii_case("link") {
            HeaderLink::Link
        } else {
            HeaderLink::Named(name.to_string())
        }
    }
}

/// A switch that may also name something, e.g. `headerLink: "X-Links"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagOrName {
    Flag(bool),
    Name(String),
}

impl Serialize for HeaderLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            HeaderLink::Off => serializer.serialize_bool(false),
            HeaderLink::Link => serializer.serialize_bool(true),
            HeaderLink::Named(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for HeaderLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match Option::<FlagOrName>::deserialize(deserializer)? {
            None | Some(FlagOrName::Flag(false)) => HeaderLink::Off,
            Some(FlagOrName::Flag(true)) => HeaderLink::Link,
            Some(FlagOrName::Name(name)) => HeaderLink::from(name.as_str()),
        })
    }
}

/// `false`, `null` and `""` disable the parameter; `true` keeps the default name.
fn deserialize_page_size_param<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<FlagOrName>::deserialize(deserializer)? {
        None | Some(FlagOrName::Flag(false)) => None,
        Some(FlagOrName::Flag(true)) => Pagination::default().page_size_param,
        Some(FlagOrName::Name(name)) if name.trim().is_empty() => None,
        Some(FlagOrName::Name(name)) => Some(name),
    })
}

/// Pagination configuration for a collection.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pagination {
    /// Query parameter carrying the page number.
    pub page_query_param: String,
    /// Query parameter carrying the page size; `None` or empty disables it.
    #[serde(deserialize_with = "deserialize_page_size_param")]
    pub page_size_param: Option<String>,
    /// Page size sent with requests; 0 disables the page size parameter.
    pub page_size: u64,
    /// Number of the first page.
    pub page_start: u64,
    /// Step between consecutive page numbers.
    pub page_increment: u64,
    /// Query parameter carrying the ordering tokens.
    pub order_param: String,
    /// Read links from a response header.
    pub header_link: HeaderLink,
    /// Read links from the response body. Wins over `header_link`.
    pub response_link: bool,
    pub response_next_field: String,
    pub response_prev_field: String,
    #[serde(skip)]
    pub parse_response_link: Option<ResponseLinkParser>,
    #[serde(skip)]
    pub parse_header_link: Option<HeaderLinkParser>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_query_param: "page".to_string(),
            page_size_param: Some("page_size".to_string()),
            page_size: 20,
            page_start: 1,
            page_increment: 1,
            order_param: "ordering".to_string(),
            header_link: HeaderLink::Off,
            response_link: true,
            response_next_field: "next".to_string(),
            response_prev_field: "prev".to_string(),
            parse_response_link: None,
            parse_header_link: None,
        }
    }
}

impl fmt::Debug for Pagination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pagination")
            .field("page_query_param", &self.page_query_param)
            .field("page_size_param", &self.page_size_param)
            .field("page_size", &self.page_size)
            .field("page_start", &self.page_start)
            .field("page_increment", &self.page_increment)
            .field("order_param", &self.order_param)
            .field("header_link", &self.header_link)
            .field("response_link", &self.response_link)
            .field("custom_response_parser", &self.parse_response_link.is_some())
            .field("custom_header_parser", &self.parse_header_link.is_some())
            .finish()
    }
}

/// Mutable pagination state of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub next: Option<String>,
    pub prev: Option<String>,
    /// Whether `next`/`prev` still match the current filters and ordering.
    pub clean: bool,
    pub count: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

/// Requested page parameters when rebuilding a URL. Unset fields fall back
/// to the previous URL, then to the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageUpdate {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageUpdate {
    pub fn page(page: u64) -> Self {
        Self {
            page: Some(page),
            page_size: None,
        }
    }
}

/// New value for a `next`/`prev` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkUpdate {
    /// Use this URL verbatim (`None` clears the link).
    Url(Option<String>),
    /// Rebuild the URL from the current query state.
    Rebuild(PageUpdate),
}

/// A partial update of [`PageState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub next: Option<LinkUpdate>,
    pub prev: Option<LinkUpdate>,
    pub clean: Option<bool>,
    pub current_page: Option<u64>,
    pub count: Option<u64>,
}

/// The query state a URL is built from.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub base: Option<&'a str>,
    /// Ordering tokens already joined into a parameter value.
    pub ordering: &'a str,
    pub filters: &'a Filters,
}

impl Pagination {
    /// The page size parameter name, when page sizes are sent at all.
    pub fn page_size_param(&self) -> Option<&str> {
        self.page_size_param
            .as_deref()
            .filter(|p| !p.is_empty() && self.page_size > 0)
    }

    /// Page number carried by `url`, if any.
    pub fn page_from_url(&self, url: &str) -> Option<u64> {
        query_number(url, &self.page_query_param)
    }

    /// Total page count for `count` records, when a page size is in effect.
    pub fn total_pages(&self, count: u64) -> Option<u64> {
        self.page_size_param()
            .map(|_| count.div_ceil(self.page_size))
    }

    /// Build a fetch URL from the query state.
    ///
    /// Parameters are written in a fixed order: page, page size, ordering,
    /// then filters in key order.
    pub fn rebuild_url(
        &self,
        ctx: &QueryContext<'_>,
        old: Option<&str>,
        update: PageUpdate,
    ) -> Result<String> {
        let base = ctx.base.ok_or(Error::MissingCollectionUrl)?;

        let page = update
            .page
            .or_else(|| old.and_then(|u| self.page_from_url(u)))
            .unwrap_or(self.page_start);

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair(&self.page_query_param, &page.to_string());

        if let Some(param) = self.page_size_param() {
            let size = update
                .page_size
                .or_else(|| old.and_then(|u| query_number(u, param)))
                .unwrap_or(self.page_size);
            query.append_pair(param, &size.to_string());
        }

        if !ctx.ordering.is_empty() {
            query.append_pair(&self.order_param, ctx.ordering);
        }

        for (key, value) in ctx.filters {
            match value {
                Value::Array(items) => {
                    for item in items {
                        query.append_pair(key, &query_value(item));
                    }
                }
                other => {
                    query.append_pair(key, &query_value(other));
                }
            }
        }

        let joiner = if base.contains('?') { '&' } else { '?' };
        Ok(format!("{base}{joiner}{}", query.finish()))
    }

    /// Links named by the response body fields.
    pub fn body_links(&self, body: &Value) -> Links {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Links {
            next: field(&self.response_next_field),
            prev: field(&self.response_prev_field),
        }
    }

    /// Learn `next`/`prev` from a response using the configured strategy.
    ///
    /// `state` must already hold the new current page and count.
    /// `result_len` is the number of records the response carried.
    pub fn links_from_response(
        &self,
        response: &SyncResponse,
        ctx: &QueryContext<'_>,
        state: &PageState,
        result_len: usize,
    ) -> Result<Links> {
        if self.response_link {
            return Ok(match &self.parse_response_link {
                Some(parse) => parse(&response.body),
                None => self.body_links(&response.body),
            });
        }

        if let Some(name) = self.header_link.header_name() {
            return Ok(match &self.parse_header_link {
                Some(parse) => parse(name, response),
                None => parse_link_header(response.header(name).unwrap_or_default()),
            });
        }

        self.page_links(ctx, state, result_len)
    }

    /// Links derived from page numbers alone.
    fn page_links(
        &self,
        ctx: &QueryContext<'_>,
        state: &PageState,
        result_len: usize,
    ) -> Result<Links> {
        let step = self.page_increment.max(1);
        let current = state.current_page;

        let next_page = current.checked_add(step).filter(|&page| {
            if state.total_pages > 0 {
                page <= state.total_pages
            } else {
                result_len > 0
            }
        });
        let next = match next_page {
            Some(page) => Some(self.rebuild_url(ctx, None, PageUpdate::page(page))?),
            None => None,
        };

        let prev = match current.checked_sub(step) {
            Some(page) if page >= self.page_start => {
                Some(self.rebuild_url(ctx, None, PageUpdate::page(page))?)
            }
            _ => None,
        };

        Ok(Links { next, prev })
    }
}

impl PageState {
    /// The state a collection starts from and returns to on reset.
    pub fn reset(&mut self) {
        self.next = None;
        self.prev = None;
        self.clean = false;
        self.current_page = 0;
    }

    /// Apply a partial update. Links are rebuilt against the previous link
    /// of the same direction; a new count recomputes the page total.
    pub fn apply(
        &mut self,
        update: StateUpdate,
        pagination: &Pagination,
        ctx: &QueryContext<'_>,
    ) -> Result<()> {
        if let Some(next) = update.next {
            self.next = resolve_link(next, self.next.as_deref(), pagination, ctx)?;
        }
        if let Some(prev) = update.prev {
            self.prev = resolve_link(prev, self.prev.as_deref(), pagination, ctx)?;
        }
        if let Some(clean) = update.clean {
            self.clean = clean;
        }
        if let Some(page) = update.current_page {
            self.current_page = page;
        }
        if let Some(count) = update.count {
            self.count = count;
            if let Some(total) = pagination.total_pages(count) {
                self.total_pages = total;
            }
        }
        Ok(())
    }
}

fn resolve_link(
    update: LinkUpdate,
    old: Option<&str>,
    pagination: &Pagination,
    ctx: &QueryContext<'_>,
) -> Result<Option<String>> {
    match update {
        LinkUpdate::Url(url) => Ok(url),
        LinkUpdate::Rebuild(page) => pagination.rebuild_url(ctx, old, page).map(Some),
    }
}

/// One `<url>; params` entry of a `Link` header.
static LINK_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([^>]*)>([^<]*)").unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
});

/// The `rel` parameter of an entry, quoted or bare.
static LINK_REL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*rel\s*=\s*(?:"([^"]*)"|([^\s;,]+))"#)
        .unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
});

/// Parse a `Link` header value: comma-separated `<url>; rel="next"` entries.
///
/// The first URL for each of `next` and `prev` (or `previous`) wins.
pub fn parse_link_header(value: &str) -> Links {
    let mut links = Links::default();

    for entry in LINK_ENTRY.captures_iter(value) {
        let (Some(url), Some(params)) = (entry.get(1), entry.get(2)) else {
            continue;
        };
        for rel in LINK_REL.captures_iter(params.as_str()) {
            let Some(rels) = rel.get(1).or_else(|| rel.get(2)) else {
                continue;
            };
            for rel in rels.as_str().split_whitespace() {
                let slot = match rel.to_ascii_lowercase().as_str() {
                    "next" => &mut links.next,
                    "prev" | "previous" => &mut links.prev,
                    _ => continue,
                };
                if slot.is_none() {
                    *slot = Some(url.as_str().to_string());
                }
            }
        }
    }

    links
}

/// Last numeric value of `name` in the query string of `url`.
fn query_number(url: &str, name: &str) -> Option<u64> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or_default();
    form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == name)
        .filter_map(|(_, value)| {
            let digits: String = value
                .trim()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
        .last()
}

fn query_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(base: Option<&'a str>, ordering: &'a str, filters: &'a Filters) -> QueryContext<'a> {
        QueryContext {
            base,
            ordering,
            filters,
        }
    }

    #[test]
    fn defaults() {
        let p = Pagination::default();
        assert_eq!(p.page_query_param, "page");
        assert_eq!(p.page_size_param(), Some("page_size"));
        assert_eq!(p.page_size, 20);
        assert_eq!(p.page_start, 1);
        assert_eq!(p.page_increment, 1);
        assert_eq!(p.order_param, "ordering");
        assert!(p.response_link);
        assert_eq!(p.header_link, HeaderLink::Off);
    }

    #[test]
    fn rebuild_orders_parameters() {
        let p = Pagination::default();
        let mut filters = Filters::new();
        filters.insert("status".into(), json!("open"));
        filters.insert("owner".into(), json!(4));

        let url = p
            .rebuild_url(&ctx(Some("/items"), "-created,name", &filters), None, PageUpdate::default())
            .unwrap();
        assert_eq!(
            url,
            "/items?page=1&page_size=20&ordering=-created%2Cname&owner=4&status=open"
        );
    }

    #[test]
    fn rebuild_keeps_page_from_old_url() {
        let p = Pagination::default();
        let filters = Filters::new();
        let c = ctx(Some("/items"), "", &filters);

        let url = p
            .rebuild_url(&c, Some("/items?page=4&page_size=5"), PageUpdate::default())
            .unwrap();
        assert_eq!(url, "/items?page=4&page_size=5");

        let url = p
            .rebuild_url(&c, Some("/items?page=4"), PageUpdate::page(2))
            .unwrap();
        assert_eq!(url, "/items?page=2&page_size=20");
    }

    #[test]
    fn rebuild_without_page_size_param() {
        let p = Pagination {
            page_size_param: None,
            ..Pagination::default()
        };
        let filters = Filters::new();
        let url = p
            .rebuild_url(&ctx(Some("/items"), "", &filters), None, PageUpdate::default())
            .unwrap();
        assert_eq!(url, "/items?page=1");
        assert_eq!(p.total_pages(50), None);
    }

    #[test]
    fn rebuild_appends_to_existing_query() {
        let p = Pagination::default();
        let mut filters = Filters::new();
        filters.insert("tag".into(), json!(["a", "b"]));
        filters.insert("gone".into(), Value::Null);
        let url = p
            .rebuild_url(&ctx(Some("/items?v=2"), "", &filters), None, PageUpdate::page(3))
            .unwrap();
        assert_eq!(url, "/items?v=2&page=3&page_size=20&gone=&tag=a&tag=b");
    }

    #[test]
    fn rebuild_requires_base_url() {
        let p = Pagination::default();
        let filters = Filters::new();
        let err = p
            .rebuild_url(&ctx(None, "", &filters), None, PageUpdate::default())
            .unwrap_err();
        assert_eq!(err, Error::MissingCollectionUrl);
    }

    #[test]
    fn page_from_url() {
        let p = Pagination::default();
        assert_eq!(p.page_from_url("/items?page=2"), Some(2));
        assert_eq!(p.page_from_url("/items?page_size=10&page=3"), Some(3));
        assert_eq!(p.page_from_url("/items?page=3&page=5"), Some(5));
        assert_eq!(p.page_from_url("/items?page_size=10"), None);
        assert_eq!(p.page_from_url("/items"), None);
        assert_eq!(p.page_from_url("/items?page=x"), None);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination {
            page_size: 2,
            ..Pagination::default()
        };
        assert_eq!(p.total_pages(5), Some(3));
        assert_eq!(p.total_pages(4), Some(2));
        assert_eq!(p.total_pages(0), Some(0));
    }

    #[test]
    fn apply_updates_count_and_links() {
        let p = Pagination {
            page_size: 10,
            ..Pagination::default()
        };
        let filters = Filters::new();
        let c = ctx(Some("/items"), "", &filters);
        let mut state = PageState::default();

        state
            .apply(
                StateUpdate {
                    next: Some(LinkUpdate::Rebuild(PageUpdate::page(2))),
                    prev: Some(LinkUpdate::Url(None)),
                    clean: Some(true),
                    current_page: Some(1),
                    count: Some(25),
                },
                &p,
                &c,
            )
            .unwrap();

        assert_eq!(state.next.as_deref(), Some("/items?page=2&page_size=10"));
        assert_eq!(state.prev, None);
        assert!(state.clean);
        assert_eq!(state.current_page, 1);
        assert_eq!(state.count, 25);
        assert_eq!(state.total_pages, 3);
    }

    #[test]
    fn count_without_page_size_keeps_total() {
        let p = Pagination {
            page_size_param: None,
            ..Pagination::default()
        };
        let filters = Filters::new();
        let mut state = PageState {
            total_pages: 7,
            ..PageState::default()
        };
        state
            .apply(
                StateUpdate {
                    count: Some(100),
                    ..StateUpdate::default()
                },
                &p,
                &ctx(Some("/items"), "", &filters),
            )
            .unwrap();
        assert_eq!(state.count, 100);
        assert_eq!(state.total_pages, 7);
    }

    #[test]
    fn reset_keeps_counts() {
        let mut state = PageState {
            next: Some("/a".into()),
            prev: Some("/b".into()),
            clean: true,
            count: 9,
            total_pages: 3,
            current_page: 2,
        };
        state.reset();
        assert_eq!(
            state,
            PageState {
                count: 9,
                total_pages: 3,
                ..PageState::default()
            }
        );
    }

    #[test]
    fn link_header_parsing() {
        let links = parse_link_header(
            r#"<https://api.example.com/items?page=3>; rel="next", <https://api.example.com/items?page=1>; rel="prev""#,
        );
        assert_eq!(links.next.as_deref(), Some("https://api.example.com/items?page=3"));
        assert_eq!(links.prev.as_deref(), Some("https://api.example.com/items?page=1"));
    }

    #[test]
    fn link_header_with_commas_and_extra_rels() {
        let links = parse_link_header(
            r#"</items?ordering=a,b&page=2>; rel="next last"; title="x",</items?page=1>;rel=previous"#,
        );
        assert_eq!(links.next.as_deref(), Some("/items?ordering=a,b&page=2"));
        assert_eq!(links.prev.as_deref(), Some("/items?page=1"));
    }

    #[test]
    fn link_header_missing_entries() {
        assert_eq!(parse_link_header(""), Links::default());
        let links = parse_link_header(r#"</items?page=9>; rel="last""#);
        assert_eq!(links, Links::default());
    }

    #[test]
    fn body_links_ignore_empty_values() {
        let p = Pagination::default();
        let links = p.body_links(&json!({"next": "/items?page=2", "prev": null}));
        assert_eq!(links.next.as_deref(), Some("/items?page=2"));
        assert_eq!(links.prev, None);

        let links = p.body_links(&json!({"next": ""}));
        assert_eq!(links, Links::default());
    }

    #[test]
    fn response_links_take_precedence_over_headers() {
        let p = Pagination {
            header_link: HeaderLink::Link,
            ..Pagination::default()
        };
        let filters = Filters::new();
        let response = SyncResponse::json(json!({"next": "/body"}))
            .with_header("Link", r#"</header>; rel="next""#);

        let links = p
            .links_from_response(&response, &ctx(Some("/items"), "", &filters), &PageState::default(), 1)
            .unwrap();
        assert_eq!(links.next.as_deref(), Some("/body"));
    }

    #[test]
    fn header_strategy_uses_named_header() {
        let p = Pagination {
            response_link: false,
            header_link: HeaderLink::Named("X-Links".into()),
            ..Pagination::default()
        };
        let filters = Filters::new();
        let response =
            SyncResponse::json(json!({})).with_header("x-links", r#"</items?page=2>; rel="next""#);

        let links = p
            .links_from_response(&response, &ctx(Some("/items"), "", &filters), &PageState::default(), 1)
            .unwrap();
        assert_eq!(links.next.as_deref(), Some("/items?page=2"));
        assert_eq!(links.prev, None);
    }

    #[test]
    fn custom_parsers_are_used() {
        let p = Pagination {
            parse_response_link: Some(Arc::new(|body: &Value| Links {
                next: body["links"]["forward"].as_str().map(str::to_string),
                prev: None,
            })),
            ..Pagination::default()
        };
        let filters = Filters::new();
        let response = SyncResponse::json(json!({"links": {"forward": "/f"}}));
        let links = p
            .links_from_response(&response, &ctx(Some("/items"), "", &filters), &PageState::default(), 0)
            .unwrap();
        assert_eq!(links.next.as_deref(), Some("/f"));
    }

    #[test]
    fn page_number_strategy() {
        let p = Pagination {
            response_link: false,
            page_size: 2,
            ..Pagination::default()
        };
        let filters = Filters::new();
        let c = ctx(Some("/items"), "", &filters);
        let response = SyncResponse::json(json!({}));

        let state = PageState {
            current_page: 2,
            total_pages: 3,
            ..PageState::default()
        };
        let links = p.links_from_response(&response, &c, &state, 2).unwrap();
        assert_eq!(links.next.as_deref(), Some("/items?page=3&page_size=2"));
        assert_eq!(links.prev.as_deref(), Some("/items?page=1&page_size=2"));

        let last = PageState {
            current_page: 3,
            total_pages: 3,
            ..PageState::default()
        };
        let links = p.links_from_response(&response, &c, &last, 1).unwrap();
        assert_eq!(links.next, None);

        let unknown_total = PageState {
            current_page: 1,
            ..PageState::default()
        };
        let links = p.links_from_response(&response, &c, &unknown_total, 0).unwrap();
        assert_eq!(links, Links::default());
    }

    #[test]
    fn deserializes_partial_config() {
        let p: Pagination =
            serde_json::from_value(json!({"pageSize": 50, "headerLink": "link", "pageSizeParam": null}))
                .unwrap();
        assert_eq!(p.page_size, 50);
        assert_eq!(p.header_link, HeaderLink::Link);
        assert_eq!(p.page_size_param(), None);
        assert_eq!(p.page_query_param, "page");
    }

    #[test]
    fn header_link_accepts_flags_and_names() {
        let parse = |value: Value| -> HeaderLink {
            let p: Pagination = serde_json::from_value(json!({"headerLink": value})).unwrap();
            p.header_link
        };
        assert_eq!(parse(json!(false)), HeaderLink::Off);
        assert_eq!(parse(json!(null)), HeaderLink::Off);
        assert_eq!(parse(json!("")), HeaderLink::Off);
        assert_eq!(parse(json!(true)), HeaderLink::Link);
        assert_eq!(parse(json!("Link")), HeaderLink::Link);
        assert_eq!(parse(json!("X-Links")), HeaderLink::Named("X-Links".into()));
        assert!(serde_json::from_value::<Pagination>(json!({"headerLink": 3})).is_err());

        assert_eq!(serde_json::to_value(HeaderLink::Link).unwrap(), json!(true));
        assert_eq!(
            serde_json::to_value(HeaderLink::Named("X-Links".into())).unwrap(),
            json!("X-Links")
        );
    }

    #[test]
    fn page_size_param_falsy_values_disable_it() {
        let parse = |value: Value| -> Option<String> {
            let p: Pagination = serde_json::from_value(json!({"pageSizeParam": value})).unwrap();
            p.page_size_param
        };
        assert_eq!(parse(json!(false)), None);
        assert_eq!(parse(json!(null)), None);
        assert_eq!(parse(json!("")), None);
        assert_eq!(parse(json!(true)).as_deref(), Some("page_size"));
        assert_eq!(parse(json!("limit")).as_deref(), Some("limit"));

        let p: Pagination = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.page_size_param.as_deref(), Some("page_size"));
    }

    #[test]
    fn page_links_stop_at_the_largest_page() {
        let p = Pagination {
            response_link: false,
            page_increment: 5,
            ..Pagination::default()
        };
        let filters = Filters::new();
        let state = PageState {
            current_page: u64::MAX - 1,
            ..PageState::default()
        };
        let links = p
            .links_from_response(&SyncResponse::json(json!({})), &ctx(Some("/items"), "", &filters), &state, 3)
            .unwrap();
        assert_eq!(links.next, None);
        assert!(links.prev.is_some());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_rebuilt_page_is_readable(page in 0u64..10_000, size in 1u64..500) {
                let p = Pagination { page_size: size, ..Pagination::default() };
                let filters = Filters::new();
                let c = ctx(Some("/items"), "name", &filters);

                let url = p.rebuild_url(&c, None, PageUpdate::page(page)).unwrap();
                prop_assert_eq!(p.page_from_url(&url), Some(page));
                prop_assert_eq!(query_number(&url, "page_size"), Some(size));

                // Rebuilding from the result without an update keeps both values.
                let again = p.rebuild_url(&c, Some(&url), PageUpdate::default()).unwrap();
                prop_assert_eq!(again, url);
            }

            #[test]
            fn prop_total_pages_covers_count(count in 0u64..1_000_000, size in 1u64..1_000) {
                let p = Pagination { page_size: size, ..Pagination::default() };
                let total = p.total_pages(count).unwrap();
                prop_assert!(total * size >= count);
                prop_assert!(total == 0 || (total - 1) * size < count);
            }

            #[test]
            fn prop_filter_values_survive_encoding(value in "[ -~]{0,24}") {
                let p = Pagination::default();
                let mut filters = Filters::new();
                filters.insert("q".into(), Value::String(value.clone()));
                let url = p
                    .rebuild_url(&ctx(Some("/items"), "", &filters), None, PageUpdate::default())
                    .unwrap();

                let query = url.split_once('?').unwrap().1;
                let decoded: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .filter(|(k, _)| k == "q")
                    .collect();
                prop_assert_eq!(decoded, vec![("q".to_string(), value)]);
            }
        }
    }
}
