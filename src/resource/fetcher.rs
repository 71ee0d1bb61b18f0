//! Resource Fetcher
//!
//! Turns a list request into a lazy stream of records. Pages are fetched
//! strictly one after another, and only when the consumer asks for a
//! record the buffered pages cannot supply.

use futures::stream::{self, Stream};
use serde_json::Value;
use std::collections::VecDeque;

use super::registry::{PageStyle, PaginationDef, ResourceDef};
use crate::ghl::client::{ApiRequest, GhlClient};
use crate::ghl::error::{GhlError, Result};

/// Upper bound on pages fetched by one command
pub const MAX_PAGES: usize = 1000;

/// Prefix of cursor paths that are read from the last record of a page
const LAST_RECORD_PREFIX: &str = "last.";

/// Where the next page starts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageCursor {
    /// Query parameters to merge into the next request
    pub params: Vec<(String, String)>,
    pub has_more: bool,
}

/// Lazily paginated list request
pub struct Paginator<'a> {
    client: &'a GhlClient,
    request: ApiRequest,
    list_key: String,
    pagination: PaginationDef,
    limit: Option<usize>,
    max_pages: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a GhlClient, request: ApiRequest, resource: &ResourceDef, list_key: &str) -> Self {
        Self {
            client,
            request,
            list_key: list_key.to_string(),
            pagination: resource.pagination.clone(),
            limit: None,
            max_pages: MAX_PAGES,
        }
    }

    /// Stop after `limit` records; `None` fetches everything
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + 'a {
        let state = PageState {
            pager: self,
            buffer: VecDeque::new(),
            next: Some(Vec::new()),
            offset: 0,
            pages: 0,
            yielded: 0,
        };
        stream::try_unfold(state, PageState::advance)
    }
}

struct PageState<'a> {
    pager: Paginator<'a>,
    buffer: VecDeque<Value>,
    /// Cursor of the next page; `None` once the provider is exhausted
    next: Option<Vec<(String, String)>>,
    offset: usize,
    pages: usize,
    yielded: usize,
}

impl<'a> PageState<'a> {
    async fn advance(mut self) -> Result<Option<(Value, Self)>> {
        loop {
            if self.pager.limit.is_some_and(|limit| self.yielded >= limit) {
                return Ok(None);
            }
            if let Some(record) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some((record, self)));
            }
            let Some(cursor) = self.next.take() else {
                return Ok(None);
            };
            self.fetch(cursor).await?;
        }
    }

    async fn fetch(&mut self, cursor: Vec<(String, String)>) -> Result<()> {
        if self.pages >= self.pager.max_pages {
            return Err(GhlError::network(format!(
                "pagination did not terminate after {} pages",
                self.pager.max_pages
            )));
        }

        let def = &self.pager.pagination;
        let requested = match self.pager.limit {
            Some(limit) => def.page_size.min(limit.saturating_sub(self.yielded)).max(1),
            None => def.page_size,
        };

        let mut request = self.pager.request.clone();
        if let Some(param) = &def.limit_param {
            request = request.query(param.as_str(), requested.to_string());
        }
        if def.style == PageStyle::Offset {
            request = request.query(def.offset_param.as_str(), self.offset.to_string());
        }
        for (key, value) in &cursor {
            request = request.query(key.as_str(), value.as_str());
        }

        let response = self.pager.client.send(&request).await?;
        self.pages += 1;

        let records = extract_records(&response, &self.pager.list_key);
        let next = next_cursor(def, &response, &records, requested, self.offset);
        tracing::debug!(
            "Page {} of {}: {} records, more: {}",
            self.pages,
            request.path,
            records.len(),
            next.has_more
        );

        self.next = if next.has_more && !records.is_empty() {
            if def.style == PageStyle::Cursor && next.params == cursor {
                return Err(GhlError::network(format!(
                    "pagination did not terminate: cursor for {} did not advance",
                    request.path
                )));
            }
            Some(next.params)
        } else {
            None
        };
        self.offset += records.len();
        self.buffer.extend(records);
        Ok(())
    }
}

/// Records of one page, found at `list_key` (or the body itself when it is an array)
pub fn extract_records(response: &Value, list_key: &str) -> Vec<Value> {
    match lookup_path(response, list_key) {
        Some(Value::Array(items)) => items.clone(),
        _ => match response {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        },
    }
}

/// Work out where the page after `records` starts
pub fn next_cursor(
    def: &PaginationDef,
    response: &Value,
    records: &[Value],
    requested: usize,
    offset: usize,
) -> PageCursor {
    let full_page = def.limit_param.is_none() || records.len() >= requested;

    match def.style {
        PageStyle::None => PageCursor::default(),
        PageStyle::Offset => {
            let has_more = if let Some(total) = def.total.as_deref().and_then(|p| lookup_path(response, p)) {
                total
                    .as_u64()
                    .is_some_and(|total| ((offset + records.len()) as u64) < total)
            } else if let Some(path) = &def.has_more {
                lookup_path(response, path).is_some_and(is_truthy)
            } else {
                full_page
            };
            PageCursor {
                params: Vec::new(),
                has_more,
            }
        }
        PageStyle::Cursor => {
            let mut params = Vec::with_capacity(def.cursor.len());
            for (param, path) in &def.cursor {
                let value = match path.strip_prefix(LAST_RECORD_PREFIX) {
                    Some(rest) => records.last().and_then(|r| lookup_path(r, rest)),
                    None => lookup_path(response, path),
                };
                match value.and_then(cursor_value) {
                    Some(value) => params.push((param.clone(), value)),
                    None => return PageCursor::default(),
                }
            }

            let more = match &def.has_more {
                Some(path) => lookup_path(response, path).is_some_and(is_truthy),
                None => full_page,
            };
            PageCursor {
                has_more: more && !params.is_empty(),
                params,
            }
        }
    }
}

/// Follow a dot path through objects and arrays (`messages.0.id`)
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, part| match current {
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => current.get(part),
    })
}

fn cursor_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn cursor_def() -> PaginationDef {
        PaginationDef {
            style: PageStyle::Cursor,
            cursor: BTreeMap::from([
                ("startAfter".to_string(), "meta.startAfter".to_string()),
                ("startAfterId".to_string(), "meta.startAfterId".to_string()),
            ]),
            has_more: Some("meta.nextPageUrl".to_string()),
            ..PaginationDef::default()
        }
    }

    #[test]
    fn test_lookup_path() {
        let value = json!({"meta": {"total": 3}, "items": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(lookup_path(&value, "meta.total"), Some(&json!(3)));
        assert_eq!(lookup_path(&value, "items.1.id"), Some(&json!("b")));
        assert_eq!(lookup_path(&value, "items.9.id"), None);
        assert_eq!(lookup_path(&value, "missing.path"), None);
        assert_eq!(lookup_path(&value, ""), Some(&value));
    }

    #[test]
    fn test_extract_records() {
        let body = json!({"messages": {"messages": [{"id": 1}], "nextPage": false}});
        assert_eq!(extract_records(&body, "messages.messages"), vec![json!({"id": 1})]);
        assert_eq!(extract_records(&json!([{"id": 2}]), "contacts"), vec![json!({"id": 2})]);
        assert!(extract_records(&json!({"contacts": null}), "contacts").is_empty());
        assert!(extract_records(&Value::Null, "contacts").is_empty());
    }

    #[test]
    fn test_meta_cursor_continues_while_next_page_url_set() {
        let records = vec![json!({"id": "c1"})];
        let response = json!({
            "contacts": records,
            "meta": {"startAfter": 1700000000000u64, "startAfterId": "c1", "nextPageUrl": "https://next"}
        });
        let cursor = next_cursor(&cursor_def(), &response, &records, 100, 0);
        assert!(cursor.has_more);
        assert_eq!(
            cursor.params,
            vec![
                ("startAfter".to_string(), "1700000000000".to_string()),
                ("startAfterId".to_string(), "c1".to_string()),
            ]
        );

        let last = json!({"contacts": records, "meta": {"startAfterId": "c1", "startAfter": 1, "nextPageUrl": null}});
        assert!(!next_cursor(&cursor_def(), &last, &records, 100, 0).has_more);
    }

    #[test]
    fn test_missing_cursor_value_ends_pagination() {
        let records = vec![json!({"id": "c1"})];
        let response = json!({"meta": {"nextPageUrl": "https://next"}});
        assert_eq!(
            next_cursor(&cursor_def(), &response, &records, 100, 0),
            PageCursor::default()
        );
    }

    #[test]
    fn test_last_record_cursor_requires_full_page() {
        let def = PaginationDef {
            style: PageStyle::Cursor,
            cursor: BTreeMap::from([("startAfterDate".to_string(), "last.sort.0".to_string())]),
            ..PaginationDef::default()
        };
        let records = vec![json!({"id": "a", "sort": [10]}), json!({"id": "b", "sort": [20]})];
        let full = next_cursor(&def, &Value::Null, &records, 2, 0);
        assert!(full.has_more);
        assert_eq!(full.params, vec![("startAfterDate".to_string(), "20".to_string())]);

        let short = next_cursor(&def, &Value::Null, &records, 5, 0);
        assert!(!short.has_more);
    }

    #[test]
    fn test_offset_uses_total_when_present() {
        let def = PaginationDef {
            style: PageStyle::Offset,
            total: Some("count".to_string()),
            ..PaginationDef::default()
        };
        let records = vec![json!({}), json!({})];
        assert!(next_cursor(&def, &json!({"count": 5}), &records, 2, 0).has_more);
        assert!(!next_cursor(&def, &json!({"count": 4}), &records, 2, 2).has_more);

        let no_total = PaginationDef {
            style: PageStyle::Offset,
            ..PaginationDef::default()
        };
        assert!(next_cursor(&no_total, &json!({}), &records, 2, 0).has_more);
        assert!(!next_cursor(&no_total, &json!({}), &records, 3, 0).has_more);
    }

    #[test]
    fn test_single_page_style_never_continues() {
        let records = vec![json!({"id": 1})];
        let cursor = next_cursor(&PaginationDef::default(), &json!({"meta": {}}), &records, 1, 0);
        assert!(!cursor.has_more);
    }
}
