use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Response, StatusCode};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

use super::api_types::{ApiEntityResponse, ApiErrorBody, ApiListResponse};
use super::ResourceGateway;
use crate::cache::{Draft, Entity, Patch, ResourceKind};
use crate::config::ApiConfig;
use crate::error::GatewayError;

/// REST gateway: one collection endpoint per resource kind.
///
/// - `GET    {base}/{path}`
/// - `POST   {base}/{path}`
/// - `PATCH  {base}/{path}/{id}`
/// - `DELETE {base}/{path}/{id}`
#[derive(Clone)]
pub struct HttpGateway {
  client: reqwest::Client,
  base_url: Url,
  /// Path overrides; kinds not listed use their own name
  paths: HashMap<ResourceKind, String>,
}

impl HttpGateway {
  pub fn new(api: &ApiConfig, resources: &BTreeMap<String, String>) -> Result<Self> {
    let base_url = Url::parse(&api.base_url)
      .map_err(|e| eyre!("Invalid API base URL '{}': {}", api.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL '{}' cannot carry a path", api.base_url));
    }

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let paths = resources
      .iter()
      .map(|(kind, path)| (ResourceKind::from(kind.as_str()), path.clone()))
      .collect();

    Ok(Self {
      client,
      base_url,
      paths,
    })
  }

  fn resource_path<'a>(&'a self, kind: &'a ResourceKind) -> &'a str {
    self
      .paths
      .get(kind)
      .map(String::as_str)
      .unwrap_or(kind.as_str())
  }

  fn collection_url(&self, kind: &ResourceKind) -> Result<Url, GatewayError> {
    self.build_url(kind, None)
  }

  fn entity_url(&self, kind: &ResourceKind, id: &str) -> Result<Url, GatewayError> {
    self.build_url(kind, Some(id))
  }

  fn build_url(&self, kind: &ResourceKind, id: Option<&str>) -> Result<Url, GatewayError> {
    let mut url = self.base_url.clone();
    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|_| GatewayError::network(format!("base URL {} cannot carry a path", self.base_url)))?;
      segments.pop_if_empty();
      segments.extend(self.resource_path(kind).split('/').filter(|s| !s.is_empty()));
      if let Some(id) = id {
        segments.push(id);
      }
    }
    Ok(url)
  }

  async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, GatewayError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(rejection(status, &body))
  }
}

#[async_trait]
impl ResourceGateway for HttpGateway {
  async fn list(&self, kind: &ResourceKind) -> Result<Vec<Entity>, GatewayError> {
    let url = self.collection_url(kind)?;
    tracing::debug!(%kind, %url, "GET");
    let response = self.send(self.client.get(url)).await?;
    let body: ApiListResponse = response.json().await.map_err(decode_error)?;
    Ok(body.into_items())
  }

  async fn create(&self, kind: &ResourceKind, draft: &Draft) -> Result<Entity, GatewayError> {
    let url = self.collection_url(kind)?;
    tracing::debug!(%kind, %url, "POST");
    let response = self.send(self.client.post(url).json(draft)).await?;
    let body: ApiEntityResponse = response.json().await.map_err(decode_error)?;
    Ok(body.into_entity())
  }

  async fn update(&self, kind: &ResourceKind, id: &str, patch: &Patch) -> Result<Entity, GatewayError> {
    let url = self.entity_url(kind, id)?;
    tracing::debug!(%kind, %url, "PATCH");
    let response = self.send(self.client.patch(url).json(patch)).await?;
    let body: ApiEntityResponse = response.json().await.map_err(decode_error)?;
    Ok(body.into_entity())
  }

  async fn delete(&self, kind: &ResourceKind, id: &str) -> Result<(), GatewayError> {
    let url = self.entity_url(kind, id)?;
    tracing::debug!(%kind, %url, "DELETE");
    self.send(self.client.delete(url)).await?;
    Ok(())
  }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
  if err.is_timeout() {
    GatewayError::network(format!("request timed out: {}", err))
  } else {
    GatewayError::network(err.to_string())
  }
}

fn decode_error(err: reqwest::Error) -> GatewayError {
  if err.is_timeout() {
    return transport_error(err);
  }
  GatewayError::rejected(
    format!("malformed response body: {}", err),
    Some("invalid_response".to_string()),
  )
}

/// Build the error for a non-2xx response, preferring the backend's own
/// message and code.
fn rejection(status: StatusCode, body: &str) -> GatewayError {
  let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
  let message = parsed
    .message()
    .map(String::from)
    .or_else(|| {
      let trimmed = body.trim();
      (!trimmed.is_empty() && trimmed.len() <= 200).then(|| trimmed.to_string())
    })
    .unwrap_or_else(|| {
      status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
    });
  let code = parsed.code().or_else(|| Some(status.as_u16().to_string()));
  GatewayError::rejected(message, code)
}
