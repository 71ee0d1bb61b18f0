//! Resource Registry - Load resource definitions from JSON
//!
//! This module loads all GoHighLevel resource descriptors from embedded JSON
//! files and provides lookup functions for the rest of the application.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::ghl::client::{LocationPlacement, LOCATION_FIELD};

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/contacts.json"),
    include_str!("../resources/calendars.json"),
    include_str!("../resources/opportunities.json"),
    include_str!("../resources/conversations.json"),
    include_str!("../resources/account.json"),
];

/// Column definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub header: String,
    pub json_path: String,
}

/// HTTP method of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// What an action does, which decides how its request and result are shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    List,
    Search,
    Get,
    Create,
    Update,
    Delete,
    Custom,
}

impl ActionKind {
    /// List-like actions go through the paginator
    pub fn is_list(self) -> bool {
        matches!(self, ActionKind::List | ActionKind::Search)
    }

    fn default_method(self) -> HttpMethod {
        match self {
            ActionKind::List | ActionKind::Search | ActionKind::Get | ActionKind::Custom => {
                HttpMethod::Get
            }
            ActionKind::Create => HttpMethod::Post,
            ActionKind::Update => HttpMethod::Put,
            ActionKind::Delete => HttpMethod::Delete,
        }
    }

    fn targets_item(self) -> bool {
        matches!(
            self,
            ActionKind::Get | ActionKind::Update | ActionKind::Delete
        )
    }
}

/// Where leftover parameters go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamTarget {
    Query,
    Body,
}

/// Action definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDef {
    pub kind: ActionKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    /// Path template; defaults to the resource path (collection actions)
    /// or the resource path plus `/{id}` (item actions)
    #[serde(default)]
    pub path: Option<String>,
    /// Fields that must all be present (after renames)
    #[serde(default)]
    pub required: Vec<String>,
    /// Groups of fields where at least one per group must be present
    #[serde(default)]
    pub required_any: Vec<Vec<String>>,
    /// Caller-facing parameter name -> API field name
    #[serde(default)]
    pub rename: HashMap<String, String>,
    /// Per-field value translation, e.g. `sms` -> `SMS`
    #[serde(default)]
    pub value_map: HashMap<String, HashMap<String, String>>,
    /// Fields that the API expects as arrays even when given once
    #[serde(default)]
    pub arrays: Vec<String>,
    /// Body values applied when the caller did not supply them
    #[serde(default)]
    pub defaults: Map<String, Value>,
    /// Body values always sent, overriding caller input
    #[serde(default)]
    pub body: Map<String, Value>,
    /// Filters accepted by list actions; defaults to the resource filters
    #[serde(default)]
    pub filters: Option<Vec<String>>,
    #[serde(default)]
    pub params_in: Option<ParamTarget>,
    #[serde(default)]
    pub location: Option<LocationPlacement>,
    /// Dot path of the result inside the response body
    #[serde(default)]
    pub response_key: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<ColumnDef>>,
}

/// Cursor strategy of a list endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStyle {
    /// Single page only
    #[default]
    None,
    /// Opaque tokens read from the response (or from the last record)
    Cursor,
    /// Numeric offset advanced by the page length
    Offset,
}

fn default_limit_param() -> Option<String> {
    Some("limit".to_string())
}

fn default_page_size() -> usize {
    100
}

fn default_offset_param() -> String {
    "skip".to_string()
}

/// Pagination definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationDef {
    #[serde(default)]
    pub style: PageStyle,
    /// Query parameter carrying the page size; `null` when unsupported
    #[serde(default = "default_limit_param")]
    pub limit_param: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Query parameter -> dot path of its value. Paths starting with
    /// `last.` are read from the last record of the page.
    #[serde(default)]
    pub cursor: BTreeMap<String, String>,
    /// Dot path of a "more results" indicator
    #[serde(default)]
    pub has_more: Option<String>,
    #[serde(default = "default_offset_param")]
    pub offset_param: String,
    /// Dot path of the total result count
    #[serde(default)]
    pub total: Option<String>,
}

impl Default for PaginationDef {
    fn default() -> Self {
        Self {
            style: PageStyle::None,
            limit_param: default_limit_param(),
            page_size: default_page_size(),
            cursor: BTreeMap::new(),
            has_more: None,
            offset_param: default_offset_param(),
            total: None,
        }
    }
}

fn default_id_field() -> String {
    "id".to_string()
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    /// Registry key, filled in at load time
    #[serde(skip)]
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Collection path template
    pub path: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Path parameter naming the owning record, for nested resources
    #[serde(default)]
    pub parent_field: Option<String>,
    /// Dot path of the record array in list responses
    pub list_key: String,
    /// Dot path of the record in single-item responses
    #[serde(default)]
    pub record_key: Option<String>,
    #[serde(default)]
    pub location: LocationPlacement,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub pagination: PaginationDef,
    pub columns: Vec<ColumnDef>,
    /// Fields shown for a single record; defaults to `columns`
    #[serde(default)]
    pub fields: Vec<ColumnDef>,
    pub actions: BTreeMap<String, ActionDef>,
}

impl ResourceDef {
    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name)
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(|s| s.as_str()).collect()
    }

    pub fn method_of(&self, action: &ActionDef) -> HttpMethod {
        action.method.unwrap_or_else(|| action.kind.default_method())
    }

    /// Resolved path template of an action
    pub fn path_of(&self, action: &ActionDef) -> String {
        if let Some(path) = &action.path {
            return path.clone();
        }
        if action.kind.targets_item() {
            format!("{}/{{{}}}", self.path.trim_end_matches('/'), self.id_field)
        } else {
            self.path.clone()
        }
    }

    pub fn location_of(&self, action: &ActionDef) -> LocationPlacement {
        action.location.unwrap_or(self.location)
    }

    pub fn filters_of<'a>(&'a self, action: &'a ActionDef) -> &'a [String] {
        action.filters.as_deref().unwrap_or(&self.filters)
    }

    pub fn response_key_of<'a>(&'a self, action: &'a ActionDef) -> Option<&'a str> {
        if action.response_key.is_some() {
            return action.response_key.as_deref();
        }
        if action.kind.is_list() {
            Some(self.list_key.as_str())
        } else {
            self.record_key.as_deref()
        }
    }

    /// Columns for list output of an action
    pub fn columns_of<'a>(&'a self, action: &'a ActionDef) -> &'a [ColumnDef] {
        action.columns.as_deref().unwrap_or(&self.columns)
    }

    /// Fields for single-record output of an action
    pub fn fields_of<'a>(&'a self, action: &'a ActionDef) -> &'a [ColumnDef] {
        if let Some(columns) = action.columns.as_deref() {
            return columns;
        }
        if self.fields.is_empty() {
            &self.columns
        } else {
            &self.fields
        }
    }

    /// Parameter the positional argument of `action` binds to: the record
    /// id when the path has one, otherwise the parent id
    pub fn positional_param(&self, action: &ActionDef) -> Option<&str> {
        let placeholders = path_placeholders(&self.path_of(action));
        if placeholders.iter().any(|p| p == &self.id_field) {
            return Some(self.id_field.as_str());
        }
        self.parent_field
            .as_deref()
            .filter(|parent| placeholders.iter().any(|p| p == parent))
    }
}

/// Names of `{placeholder}` segments in a path template, excluding the location id
pub fn path_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if name != LOCATION_FIELD && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        for (key, resource) in final_config.resources.iter_mut() {
            resource.name = key.clone();
        }

        final_config
    })
}

/// Get a resource definition by key or alias
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    let registry = get_registry();
    registry.resources.get(key).or_else(|| {
        registry
            .resources
            .values()
            .find(|r| r.aliases.iter().any(|a| a == key))
    })
}

/// Get all resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    keys.sort_unstable();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(
            !registry.resources.is_empty(),
            "Registry should have resources"
        );
    }

    #[test]
    fn test_core_resources_exist() {
        for key in [
            "contacts",
            "calendars",
            "opportunities",
            "conversations",
            "workflows",
            "pipelines",
            "locations",
            "users",
            "tags",
        ] {
            let resource = get_resource(key);
            assert!(resource.is_some(), "{} resource should exist", key);
            assert_eq!(resource.unwrap().name, key);
        }
    }

    #[test]
    fn test_alias_lookup() {
        let resource = get_resource("contact").expect("alias should resolve");
        assert_eq!(resource.name, "contacts");
    }

    #[test]
    fn test_every_action_is_well_formed() {
        for resource in get_registry().resources.values() {
            assert!(!resource.columns.is_empty(), "{} has no columns", resource.name);
            for (name, action) in &resource.actions {
                if action.kind == ActionKind::Custom {
                    assert!(
                        action.path.is_some(),
                        "{} {} is custom and needs a path",
                        resource.name,
                        name
                    );
                }
                let path = resource.path_of(action);
                assert!(path.starts_with('/'), "{} {} path {}", resource.name, name, path);
                if resource.location_of(action) == LocationPlacement::Path {
                    assert!(path.contains("{locationId}"), "{} {}", resource.name, name);
                }
            }
        }
    }

    #[test]
    fn test_default_item_path() {
        let contacts = get_resource("contacts").unwrap();
        let get = contacts.action("get").unwrap();
        assert_eq!(contacts.path_of(get), "/contacts/{id}");
        assert_eq!(contacts.positional_param(get), Some("id"));
        assert_eq!(contacts.method_of(get), HttpMethod::Get);
    }

    #[test]
    fn test_nested_resource_positional_is_parent() {
        let notes = get_resource("contact-notes").unwrap();
        let list = notes.action("list").unwrap();
        assert_eq!(notes.positional_param(list), Some("contactId"));
        let get = notes.action("get").unwrap();
        assert_eq!(notes.positional_param(get), Some("id"));
    }

    #[test]
    fn test_path_placeholders() {
        assert_eq!(
            path_placeholders("/contacts/{contactId}/notes/{id}"),
            vec!["contactId".to_string(), "id".to_string()]
        );
        assert!(path_placeholders("/locations/{locationId}/tags").is_empty());
        assert!(path_placeholders("/users/").is_empty());
    }
}
