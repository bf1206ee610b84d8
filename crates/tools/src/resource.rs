//! CRM resource seam.
//!
//! The relational layer and its row-level policies are an external
//! collaborator: the core sends authenticated requests carrying the
//! internal token and trusts the resource to apply tenant filtering and
//! visibility scoping. `HttpCrmResource` is the shipped implementation;
//! `MemoryCrmResource` is the recording stub every test runs against.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use atrium_domain::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceMethod {
    Get,
    Post,
    Patch,
}

impl ResourceMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceMethod::Get => "GET",
            ResourceMethod::Post => "POST",
            ResourceMethod::Patch => "PATCH",
        }
    }
}

/// One authenticated request to the resource layer.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: ResourceMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Internal token minted for this invocation; carries the caller's
    /// effective role.
    pub token: String,
}

impl ResourceRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: ResourceMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            token: String::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ResourceMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            token: String::new(),
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ResourceMethod::Patch,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            token: String::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Status + body from the resource layer.
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    pub status: u16,
    pub body: Value,
}

impl ResourceResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Map an error status onto the shared taxonomy.
    pub fn into_result(self) -> Result<Value> {
        match self.status {
            s if s < 400 => Ok(self.body),
            401 => Err(Error::Unauthorized("resource rejected the token".into())),
            403 => Err(Error::Forbidden("resource denied the operation".into())),
            404 => Err(Error::NotFound("resource record".into())),
            409 => Err(Error::Conflict("resource write conflicted".into())),
            s if s >= 500 => Err(Error::StorageUnavailable(format!("resource HTTP {s}"))),
            s => Err(Error::Internal(format!("resource HTTP {s}"))),
        }
    }
}

#[async_trait::async_trait]
pub trait CrmResource: Send + Sync {
    async fn request(&self, req: ResourceRequest) -> Result<ResourceResponse>;
}

// ── HTTP implementation ────────────────────────────────────────────

pub struct HttpCrmResource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCrmResource {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait::async_trait]
impl CrmResource for HttpCrmResource {
    async fn request(&self, req: ResourceRequest) -> Result<ResourceResponse> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = match req.method {
            ResourceMethod::Get => self.http.get(&url),
            ResourceMethod::Post => self.http.post(&url),
            ResourceMethod::Patch => self.http.patch(&url),
        };
        builder = builder
            .header("Authorization", format!("Bearer {}", req.token))
            .query(&req.query);
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout("resource request".into())
            } else {
                Error::StorageUnavailable(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let body: Value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(ResourceResponse { status, body })
    }
}

// ── In-memory implementation (tests) ───────────────────────────────

/// Recording stub. Responses are keyed by `"METHOD path"`; unmatched
/// requests get an empty 200. Every request is recorded for assertions.
#[derive(Default)]
pub struct MemoryCrmResource {
    responses: Mutex<HashMap<String, ResourceResponse>>,
    calls: Mutex<Vec<ResourceRequest>>,
}

impl MemoryCrmResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(&self, method: ResourceMethod, path: &str, response: ResourceResponse) {
        self.responses
            .lock()
            .insert(format!("{} {path}", method.as_str()), response);
    }

    /// All requests observed, in order.
    pub fn calls(&self) -> Vec<ResourceRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Count of requests hitting a specific path.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }
}

#[async_trait::async_trait]
impl CrmResource for MemoryCrmResource {
    async fn request(&self, req: ResourceRequest) -> Result<ResourceResponse> {
        let key = format!("{} {}", req.method.as_str(), req.path);
        self.calls.lock().push(req);
        Ok(self
            .responses
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ResourceResponse::ok(serde_json::json!({}))))
    }
}
