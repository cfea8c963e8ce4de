// Resource payload models

use serde_json::{Map, Value};

/// One resource instance as returned by the API
pub type Record = Map<String, Value>;

/// Generic item keys tried after the kind-specific one
pub const GENERIC_ITEM_KEYS: [&str; 3] = ["items", "results", "data"];

/// Paged listing endpoints exposed by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Pokemons,
    Combats,
}

impl EndpointKind {
    /// Key under which the API nests this listing's items
    pub fn items_key(self) -> &'static str {
        match self {
            EndpointKind::Pokemons => "pokemons",
            EndpointKind::Combats => "combats",
        }
    }

    /// Human-readable label for logs
    pub fn label(self) -> &'static str {
        match self {
            EndpointKind::Pokemons => "Pokemons",
            EndpointKind::Combats => "Combats",
        }
    }
}

/// One page of a listing response
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    pub page: u64,
    pub per_page: u64,
    /// Reported total, `None` when absent or unparsable
    pub total: Option<u64>,
}

impl Page {
    /// Build a page from a raw listing payload
    ///
    /// Missing `page`/`per_page` fall back to the requested values.
    pub fn from_payload(kind: EndpointKind, payload: &Value, page: u64, per_page: u64) -> Self {
        let items = extract_items(payload, kind.items_key());
        let total = payload.get("total").and_then(as_u64_lenient);

        Self {
            page: payload.get("page").and_then(as_u64_lenient).unwrap_or(page),
            per_page: payload
                .get("per_page")
                .and_then(as_u64_lenient)
                .unwrap_or(per_page),
            total,
            items,
        }
    }
}

/// Pull the item list out of a possibly paginated payload
///
/// A bare array is the list itself; otherwise `primary_key` and then
/// `GENERIC_ITEM_KEYS` are tried in order, the first array wins. Non-object
/// entries are dropped.
pub fn extract_items(payload: &Value, primary_key: &str) -> Vec<Record> {
    let list = match payload {
        Value::Array(list) => Some(list),
        Value::Object(map) => map.get(primary_key).and_then(Value::as_array).or_else(|| {
            GENERIC_ITEM_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
        }),
        _ => None,
    };

    list.map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect()
    })
    .unwrap_or_default()
}

/// Read a non-negative integer from a number or numeric string
fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
