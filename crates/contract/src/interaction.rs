//! Declarative request/response pairs registered with the mock provider.

use std::fmt;

use axum::http::{HeaderName, Method, StatusCode};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::ContractError;
use crate::matchers::{CompareOptions, Matcher, Mismatch, MismatchKind, child_path};

/// One expected exchange: under `provider_state`, a request matching
/// `request` is answered with `response`.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub description: String,
    pub provider_state: Option<String>,
    pub request: RequestSpec,
    pub response: ResponseSpec,
}

impl Interaction {
    /// Start an interaction described as `description` (e.g. "a request to get a product").
    ///
    /// Defaults to `GET /` answered with an empty `200` until the request and
    /// response are set.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            provider_state: None,
            request: RequestSpec::get("/"),
            response: ResponseSpec::new(200),
        }
    }

    /// Set the provider state this interaction assumes.
    pub fn given(mut self, provider_state: impl Into<String>) -> Self {
        self.provider_state = Some(provider_state.into());
        self
    }

    /// Replace the description.
    pub fn upon_receiving(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_request(mut self, request: RequestSpec) -> Self {
        self.request = request;
        self
    }

    pub fn will_respond_with(mut self, response: ResponseSpec) -> Self {
        self.response = response;
        self
    }

    /// Provider state label, empty when none was given.
    pub fn state_label(&self) -> &str {
        self.provider_state.as_deref().unwrap_or_default()
    }

    /// Two interactions share an identity when description and state agree.
    pub fn same_identity(&self, other: &Interaction) -> bool {
        self.description == other.description && self.provider_state == other.provider_state
    }

    pub fn summary(&self) -> InteractionSummary {
        InteractionSummary {
            description: self.description.clone(),
            provider_state: self.provider_state.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        self.request.validate()?;
        self.response.validate()
    }

    /// Pact v2 interaction object.
    pub fn to_pact(&self) -> Value {
        let mut interaction = Map::new();
        interaction.insert("description".into(), Value::String(self.description.clone()));
        if let Some(state) = &self.provider_state {
            interaction.insert("providerState".into(), Value::String(state.clone()));
        }
        interaction.insert("request".into(), self.request.to_pact());
        interaction.insert("response".into(), self.response.to_pact());
        Value::Object(interaction)
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.summary(), f)
    }
}

/// Description and state of an interaction, used in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSummary {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_state: Option<String>,
}

impl fmt::Display for InteractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.provider_state {
            Some(state) => write!(f, "'{}' given '{}'", self.description, state),
            None => write!(f, "'{}'", self.description),
        }
    }
}

/// Request matcher: method and path compare exactly, everything else through [`Matcher`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: String,
    pub path: String,
    pub query: IndexMap<String, Matcher>,
    /// Required headers; names compare case-insensitively and undeclared headers are allowed.
    pub headers: IndexMap<String, Matcher>,
    /// Body template; when absent any body is accepted.
    pub body: Option<Matcher>,
}

impl RequestSpec {
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            path: path.into(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    pub fn with_query(mut self, name: impl Into<String>, matcher: impl Into<Matcher>) -> Self {
        self.query.insert(name.into(), matcher.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, matcher: impl Into<Matcher>) -> Self {
        self.headers.insert(name.into(), matcher.into());
        self
    }

    pub fn with_body(mut self, matcher: impl Into<Matcher>) -> Self {
        self.body = Some(matcher.into());
        self
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        Method::from_bytes(self.method.as_bytes()).map_err(|error| ContractError::invalid_matcher("$.method", error.to_string()))?;
        if !self.path.starts_with('/') {
            return Err(ContractError::invalid_matcher("$.path", format!("path '{}' must start with '/'", self.path)));
        }
        for (name, matcher) in &self.query {
            matcher.validate(&child_path("$.query", name))?;
        }
        validate_headers(&self.headers)?;
        match &self.body {
            Some(body) => body.validate("$.body"),
            None => Ok(()),
        }
    }

    /// Every way `request` departs from this matcher; empty when it matches.
    pub fn compare(&self, request: &RecordedRequest) -> Vec<Mismatch> {
        let options = CompareOptions::request();
        let mut mismatches = Vec::new();

        if !self.method.eq_ignore_ascii_case(&request.method) {
            mismatches.push(Mismatch::new(MismatchKind::Method, "$.method", self.method.as_str(), request.method.as_str()));
        }
        if self.path != request.path {
            mismatches.push(Mismatch::new(MismatchKind::Path, "$.path", self.path.as_str(), request.path.as_str()));
        }

        for (name, matcher) in &self.query {
            let path = child_path("$.query", name);
            match request.query.get(name) {
                Some(value) => mismatches.extend(matcher.compare(&Value::String(value.clone()), &path, options)),
                None => mismatches.push(Mismatch::new(MismatchKind::Query, path, header_text(matcher), "<absent>")),
            }
        }
        for name in request.query.keys().filter(|name| !self.query.contains_key(*name)) {
            mismatches.push(Mismatch::new(MismatchKind::Query, child_path("$.query", name), "<absent>", name.as_str()));
        }

        for (name, matcher) in &self.headers {
            let path = child_path("$.headers", name);
            match request.header(name) {
                Some(value) => mismatches.extend(matcher.compare(&Value::String(value.to_string()), &path, options)),
                None => mismatches.push(Mismatch::new(MismatchKind::Header, path, header_text(matcher), "<absent>")),
            }
        }

        if let Some(matcher) = &self.body {
            match request.body.as_deref().filter(|body| !body.trim().is_empty()) {
                None => mismatches.push(Mismatch::new(MismatchKind::Body, "$.body", matcher.generate().to_string(), "<empty>")),
                Some(text) => match serde_json::from_str::<Value>(text) {
                    Ok(actual) => mismatches.extend(matcher.compare(&actual, "$.body", options)),
                    Err(error) => mismatches.push(Mismatch::new(MismatchKind::Body, "$.body", "a JSON document", format!("{text} ({error})"))),
                },
            }
        }

        mismatches
    }

    fn matching_rules(&self) -> Map<String, Value> {
        let mut rules = Map::new();
        for (name, matcher) in &self.query {
            matcher.matching_rules(&child_path("$.query", name), &mut rules);
        }
        for (name, matcher) in &self.headers {
            matcher.matching_rules(&child_path("$.headers", name), &mut rules);
        }
        if let Some(body) = &self.body {
            body.matching_rules("$.body", &mut rules);
        }
        rules
    }

    /// Pact v2 request object with generated examples and matching rules.
    pub fn to_pact(&self) -> Value {
        let mut request = Map::new();
        request.insert("method".into(), Value::String(self.method.clone()));
        request.insert("path".into(), Value::String(self.path.clone()));
        if !self.query.is_empty() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (name, matcher) in &self.query {
                query.append_pair(name, &header_text(matcher));
            }
            request.insert("query".into(), Value::String(query.finish()));
        }
        if !self.headers.is_empty() {
            request.insert("headers".into(), generated_headers(&self.headers));
        }
        if let Some(body) = &self.body {
            request.insert("body".into(), body.generate());
        }
        let rules = self.matching_rules();
        if !rules.is_empty() {
            request.insert("matchingRules".into(), Value::Object(rules));
        }
        Value::Object(request)
    }
}

/// Response template the mock provider replies with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSpec {
    pub status: u16,
    pub headers: IndexMap<String, Matcher>,
    pub body: Option<Matcher>,
}

impl ResponseSpec {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, matcher: impl Into<Matcher>) -> Self {
        self.headers.insert(name.into(), matcher.into());
        self
    }

    pub fn with_body(mut self, matcher: impl Into<Matcher>) -> Self {
        self.body = Some(matcher.into());
        self
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        StatusCode::from_u16(self.status).map_err(|error| ContractError::invalid_matcher("$.status", error.to_string()))?;
        validate_headers(&self.headers)?;
        match &self.body {
            Some(body) => body.validate("$.body"),
            None => Ok(()),
        }
    }

    /// Fill in the template. A JSON body without a declared `Content-Type`
    /// is sent as `application/json`.
    pub fn generate(&self) -> GeneratedResponse {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, matcher)| (name.clone(), header_text(matcher)))
            .collect();
        let body = self.body.as_ref().map(Matcher::generate);
        let has_content_type = headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if body.is_some() && !has_content_type {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        GeneratedResponse {
            status: self.status,
            headers,
            body,
        }
    }

    /// Pact v2 response object with generated examples and matching rules.
    pub fn to_pact(&self) -> Value {
        let mut response = Map::new();
        response.insert("status".into(), json!(self.status));
        if !self.headers.is_empty() {
            response.insert("headers".into(), generated_headers(&self.headers));
        }
        let mut rules = Map::new();
        for (name, matcher) in &self.headers {
            matcher.matching_rules(&child_path("$.headers", name), &mut rules);
        }
        if let Some(body) = &self.body {
            response.insert("body".into(), body.generate());
            body.matching_rules("$.body", &mut rules);
        }
        if !rules.is_empty() {
            response.insert("matchingRules".into(), Value::Object(rules));
        }
        Value::Object(response)
    }
}

/// Concrete response produced from a [`ResponseSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// A request as received by the mock provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub query: IndexMap<String, String>,
    /// Header names are stored lowercased.
    pub headers: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RecordedRequest {
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            path: path.into(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            body: None,
        }
    }

    /// Add a header; repeated names are joined with `, `.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        self.headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.clone());
        self
    }

    /// Parse a raw `a=1&b=2` query string. Repeated names are joined with `,`.
    pub fn with_query_string(mut self, raw: &str) -> Self {
        for (name, value) in url::form_urlencoded::parse(raw.as_bytes()).into_owned() {
            self.query
                .entry(name)
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl fmt::Display for RecordedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if !self.query.is_empty() {
            let query: Vec<String> = self.query.iter().map(|(name, value)| format!("{name}={value}")).collect();
            write!(f, "?{}", query.join("&"))?;
        }
        Ok(())
    }
}

fn validate_headers(headers: &IndexMap<String, Matcher>) -> Result<(), ContractError> {
    for (name, matcher) in headers {
        let path = child_path("$.headers", name);
        HeaderName::from_bytes(name.as_bytes()).map_err(|error| ContractError::invalid_matcher(&path, error.to_string()))?;
        matcher.validate(&path)?;
    }
    Ok(())
}

fn generated_headers(headers: &IndexMap<String, Matcher>) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(name, matcher)| (name.clone(), Value::String(header_text(matcher))))
            .collect(),
    )
}

fn header_text(matcher: &Matcher) -> String {
    match matcher.generate() {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
