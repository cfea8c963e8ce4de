// Typed operations over the resource API

use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, Result};
use crate::http_client::ApiHttpClient;
use crate::models::{EndpointKind, Page};

/// Placeholder substituted with the identifier in the attribute endpoint
pub const ID_PLACEHOLDER: &str = "{pokemon_id}";

/// Endpoint paths, relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub health: String,
    pub pokemons: String,
    pub combats: String,
    /// Attribute lookup path containing `{pokemon_id}`
    pub attributes: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            health: "/health".to_string(),
            pokemons: "/pokemon".to_string(),
            combats: "/combats".to_string(),
            attributes: "/pokemons/{pokemon_id}".to_string(),
        }
    }
}

impl Endpoints {
    /// Listing path for a kind
    pub fn listing(&self, kind: EndpointKind) -> &str {
        match kind {
            EndpointKind::Pokemons => &self.pokemons,
            EndpointKind::Combats => &self.combats,
        }
    }

    /// Attribute path for one identifier
    ///
    /// The identifier is percent-encoded as a single path segment.
    pub fn attributes_for(&self, id: &str) -> String {
        let id = encode_path_segment(id);
        if self.attributes.contains(ID_PLACEHOLDER) {
            self.attributes.replace(ID_PLACEHOLDER, &id)
        } else {
            format!("{}/{}", self.attributes.trim_end_matches('/'), id)
        }
    }
}

/// Percent-encode `raw` so it stays one path segment (`/`, `?`, `#` included)
fn encode_path_segment(raw: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return raw.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(raw);
    }
    url.path().trim_start_matches('/').to_string()
}

/// Resource API client
#[derive(Clone)]
pub struct PokemonApi {
    http: Arc<ApiHttpClient>,
    endpoints: Endpoints,
}

impl PokemonApi {
    pub fn new(http: Arc<ApiHttpClient>, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn http(&self) -> &Arc<ApiHttpClient> {
        &self.http
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Liveness probe
    pub async fn health(&self) -> Result<Option<Value>> {
        self.http.get_json(&self.endpoints.health, &[]).await
    }

    /// Fetch one page of a listing
    pub async fn list_page(&self, kind: EndpointKind, page: u64, per_page: u64) -> Result<Page> {
        let params = [("page", page.to_string()), ("per_page", per_page.to_string())];
        let payload = self
            .http
            .get_json(self.endpoints.listing(kind), &params)
            .await?
            .unwrap_or(Value::Null);

        Ok(Page::from_payload(kind, &payload, page, per_page))
    }

    /// Fetch the attribute document for one identifier
    pub async fn get_attributes(&self, id: &str) -> Result<Option<Value>> {
        let endpoint = self.endpoints.attributes_for(id);
        self.http.get_json(&endpoint, &[]).await
    }

    /// Display name of one identifier via the attribute endpoint
    pub async fn lookup_name(&self, id: &str) -> Result<String> {
        let details = self.get_attributes(id).await?;
        details
            .as_ref()
            .and_then(display_name)
            .ok_or_else(|| ApiError::LookupMiss(id.to_string()))
    }
}

/// Read the display name from an attribute document (`name`, then `Name`)
pub fn display_name(details: &Value) -> Option<String> {
    ["name", "Name"].iter().find_map(|key| {
        details
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}
