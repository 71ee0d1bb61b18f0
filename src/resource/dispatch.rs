//! Command dispatch
//!
//! Maps a resource + action + parameters triple onto an [`ApiRequest`]
//! using the registry descriptors, then runs it once (single-record
//! actions) or through the [`Paginator`] (list actions).
//!
//! All validation happens in [`build_request`], before the client is
//! touched, so a rejected command never reaches the network.

use futures::TryStreamExt;
use reqwest::Method;
use serde_json::{Map, Value};

use super::fetcher::{lookup_path, Paginator, MAX_PAGES};
use super::registry::{
    get_resource, path_placeholders, ActionDef, ActionKind, ParamTarget, ResourceDef,
};
use crate::ghl::client::{ApiRequest, GhlClient, LOCATION_FIELD};
use crate::ghl::error::{GhlError, Result};

/// Command parameters keyed by name
pub type Params = Map<String, Value>;

/// Successful result of one command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Record(Value),
    Records(Vec<Value>),
    /// The API answered without a payload (e.g. 204 on delete)
    Empty,
}

pub type CommandResult = Result<CommandOutput>;

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Maximum number of records for list actions; `None` fetches all
    pub limit: Option<usize>,
    pub max_pages: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            max_pages: MAX_PAGES,
        }
    }
}

/// Runs commands against one client
#[derive(Clone)]
pub struct Dispatcher {
    client: GhlClient,
}

impl Dispatcher {
    pub fn new(client: GhlClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GhlClient {
        &self.client
    }

    pub async fn dispatch(
        &self,
        resource_name: &str,
        action_name: &str,
        params: Params,
        options: &DispatchOptions,
    ) -> CommandResult {
        let resource = find_resource(resource_name)?;
        let action = find_action(resource, action_name)?;
        let request = build_request(resource, action_name, params)?;

        tracing::info!(
            "{} {} -> {} {}",
            resource.name,
            action_name,
            request.method,
            request.path
        );

        let key = resource.response_key_of(action);

        if action.kind.is_list() {
            let list_key = key.unwrap_or(&resource.list_key);
            let records: Vec<Value> = Paginator::new(&self.client, request, resource, list_key)
                .limit(options.limit)
                .max_pages(options.max_pages)
                .into_stream()
                .try_collect()
                .await?;
            return Ok(CommandOutput::Records(records));
        }

        let response = self.client.send(&request).await?;
        Ok(single_output(response, key))
    }
}

fn find_resource(name: &str) -> Result<&'static ResourceDef> {
    get_resource(name).ok_or_else(|| GhlError::validation(format!("unknown resource '{name}'")))
}

fn find_action<'r>(resource: &'r ResourceDef, name: &str) -> Result<&'r ActionDef> {
    resource.action(name).ok_or_else(|| {
        GhlError::validation(format!(
            "'{}' does not support '{}' (available: {})",
            resource.name,
            name,
            resource.action_names().join(", ")
        ))
    })
}

/// Validate `params` and shape them into a request for `action_name`
pub fn build_request(resource: &ResourceDef, action_name: &str, params: Params) -> Result<ApiRequest> {
    let action = find_action(resource, action_name)?;
    let mut params = normalize(action, params);

    let missing = missing_fields(resource, action, &params);
    if !missing.is_empty() {
        return Err(GhlError::missing_fields(missing));
    }

    let mut path = resource.path_of(action);
    for name in path_placeholders(&path) {
        let value = params
            .remove(&name)
            .and_then(|v| scalar_string(&v))
            .ok_or_else(|| GhlError::missing_fields(vec![name.clone()]))?;
        path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(&value));
    }

    let method: Method = resource.method_of(action).into();
    let target = action.params_in.unwrap_or(
        if method == Method::GET || method == Method::DELETE {
            ParamTarget::Query
        } else {
            ParamTarget::Body
        },
    );

    if action.kind.is_list() {
        let accepted = resource.filters_of(action);
        let unknown: Vec<&str> = params
            .keys()
            .map(String::as_str)
            .filter(|k| *k != LOCATION_FIELD && !accepted.iter().any(|f| f == k))
            .collect();
        if !unknown.is_empty() {
            let accepted = if accepted.is_empty() {
                "none".to_string()
            } else {
                accepted.join(", ")
            };
            return Err(GhlError::validation(format!(
                "unknown filter(s) for {} {}: {} (accepted: {})",
                resource.name,
                action_name,
                unknown.join(", "),
                accepted
            )));
        }
    }

    let always_send_body = target == ParamTarget::Body && method != Method::DELETE;
    let mut request = ApiRequest::new(method, path).location(resource.location_of(action));

    let mut body = match target {
        ParamTarget::Query => {
            for (key, value) in &params {
                for v in query_values(value) {
                    request = request.query(key.as_str(), v);
                }
            }
            Map::new()
        }
        ParamTarget::Body => params,
    };
    for (key, value) in &action.body {
        body.insert(key.clone(), value.clone());
    }

    if action.kind == ActionKind::Update && body.is_empty() {
        return Err(GhlError::validation(format!(
            "nothing to update: pass at least one field with -p key=value for {} {}",
            resource.name, action_name
        )));
    }

    if !body.is_empty() || always_send_body {
        request = request.body(Value::Object(body));
    }

    Ok(request)
}

/// Apply renames, value translations, array coercion and defaults
fn normalize(action: &ActionDef, params: Params) -> Params {
    let mut out = Params::new();
    for (key, value) in params {
        let key = action.rename.get(&key).cloned().unwrap_or(key);
        out.insert(key, value);
    }

    for (field, table) in &action.value_map {
        if let Some(Value::String(raw)) = out.get(field) {
            let translated = table
                .get(raw)
                .or_else(|| table.get(&raw.to_lowercase()))
                .cloned();
            if let Some(translated) = translated {
                out.insert(field.clone(), Value::String(translated));
            }
        }
    }

    for field in &action.arrays {
        if let Some(value) = out.remove(field) {
            out.insert(field.clone(), into_array(value));
        }
    }

    for (key, value) in &action.defaults {
        out.entry(key.clone()).or_insert_with(|| value.clone());
    }

    out
}

/// Required fields, at-least-one groups and path identifiers that are absent
fn missing_fields(resource: &ResourceDef, action: &ActionDef, params: &Params) -> Vec<String> {
    let present = |name: &str| params.get(name).is_some_and(is_present);

    let mut missing: Vec<String> = Vec::new();
    for name in path_placeholders(&resource.path_of(action)) {
        if !present(&name) {
            missing.push(name);
        }
    }
    for name in &action.required {
        if !present(name) && !missing.contains(name) {
            missing.push(name.clone());
        }
    }
    for group in &action.required_any {
        if !group.iter().any(|name| present(name)) {
            missing.push(group.join(" or "));
        }
    }
    missing
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn into_array(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::String(s) => Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        other => Value::Array(vec![other]),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Query string values; arrays repeat the key
fn query_values(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(query_values).collect(),
        other => vec![other.to_string()],
    }
}

/// Pick the record out of a single-item response
fn single_output(response: Value, key: Option<&str>) -> CommandOutput {
    let value = match key.and_then(|k| lookup_path(&response, k)) {
        Some(found) if !found.is_null() => found.clone(),
        _ => response,
    };
    match value {
        Value::Null => CommandOutput::Empty,
        Value::Array(items) => CommandOutput::Records(items),
        other => CommandOutput::Record(other),
    }
}
