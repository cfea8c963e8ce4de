// Extraction pipeline
// Pulls the pokemon and combat listings, per-pokemon attributes, and rewrites
// combat participants to names.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::api::PokemonApi;
use crate::error::Result;
use crate::models::{EndpointKind, Record};
use crate::paginator::Paginator;
use crate::reconciler::{IdKey, Reconciler};
use crate::throttle::Pacer;

/// The three materialized datasets handed to storage/analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Datasets {
    /// `id` and `name` of every pokemon, sorted by id
    pub pokemons: Vec<Record>,
    /// Combats with participant and winner identifiers replaced by names
    pub combats: Vec<Record>,
    /// Attribute document per pokemon
    pub attributes: Vec<Record>,
}

/// End-to-end extraction over one API client
pub struct Pipeline {
    api: PokemonApi,
    pacer: Pacer,
    per_page: u64,
}

impl Pipeline {
    pub fn new(api: PokemonApi, pacer: Pacer, per_page: u64) -> Self {
        Self {
            api,
            pacer,
            per_page: per_page.max(1),
        }
    }

    /// Run every stage in order
    ///
    /// Fails on authentication errors and on listing calls that give up; a
    /// failed health probe or attribute fetch is only logged.
    pub async fn run(&self) -> Result<Datasets> {
        self.api.http().auth().login().await?;

        match self.api.health().await {
            Ok(health) => {
                let health = health.unwrap_or_default();
                tracing::info!("/health: {}", health);
            }
            Err(e) => tracing::warn!(error = %e, "Health probe failed"),
        }

        tracing::info!("Extracting pokemons (per_page={})...", self.per_page);
        let pokemons = self.extract(EndpointKind::Pokemons).await?;
        tracing::info!("Pokemons: {}", pokemons.len());

        tracing::info!("Extracting combats (all pages)...");
        let combats = flatten_nested(self.extract(EndpointKind::Combats).await?);
        tracing::info!("Combats: {}", combats.len());

        let pokemons = transform_pokemons(pokemons);

        tracing::info!("Extracting pokemon attributes...");
        let ids: Vec<Value> = pokemons
            .iter()
            .filter_map(|p| p.get("id").cloned())
            .collect();
        let attributes = self.extract_attributes(&ids).await;
        tracing::info!("Attributes: {}", attributes.len());

        let combats = Reconciler::new(&self.api, &self.pacer)
            .resolve(combats, &pokemons)
            .await?;

        Ok(Datasets {
            pokemons,
            combats,
            attributes,
        })
    }

    async fn extract(&self, kind: EndpointKind) -> Result<Vec<Record>> {
        Paginator::new(&self.api, &self.pacer)
            .fetch_all(kind, self.per_page)
            .await
    }

    /// Fetch the attribute document of each id
    ///
    /// Failures and non-object payloads omit that id only. The `id` field is
    /// filled in when the document lacks it.
    pub async fn extract_attributes(&self, ids: &[Value]) -> Vec<Record> {
        let total = ids.len();
        let step = (total / 20).max(1);
        let mut records = Vec::with_capacity(total);

        for (i, id) in ids.iter().enumerate() {
            let done = i + 1;
            let Some(key) = IdKey::from_value(id) else {
                tracing::warn!(id = %id, "Skipping attribute fetch for non-identifier");
                continue;
            };

            self.pacer.acquire().await;
            match self.api.get_attributes(&key.to_string()).await {
                Ok(Some(Value::Object(mut details))) => {
                    details.entry("id").or_insert_with(|| id.clone());
                    records.push(details);
                }
                Ok(_) => tracing::warn!(id = %key, "Attribute payload is not an object"),
                Err(e) => tracing::warn!(id = %key, error = %e, "Attribute fetch failed"),
            }

            if done == total || done % step == 0 {
                tracing::info!(
                    "Attributes: {}/{} ({:.0}%)",
                    done,
                    total,
                    done as f64 / total as f64 * 100.0
                );
            }
        }

        records
    }
}

/// Keep `id` and `name`, drop duplicates, sort by id
pub fn transform_pokemons(pokemons: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut out: Vec<Record> = pokemons
        .into_iter()
        .map(|p| {
            p.into_iter()
                .filter(|(k, _)| k == "id" || k == "name")
                .collect::<Record>()
        })
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(Value::Object(p.clone()).to_string()))
        .collect();

    // Records without a usable id go last
    out.sort_by_cached_key(|p| {
        let key = p.get("id").and_then(IdKey::from_value);
        (key.is_none(), key)
    });
    out
}

/// Unwrap combats delivered as single-key objects wrapping the real record
pub fn flatten_nested(records: Vec<Record>) -> Vec<Record> {
    let nested = !records.is_empty()
        && records
            .iter()
            .all(|r| r.len() == 1 && r.values().all(Value::is_object));
    if !nested {
        return records;
    }

    records
        .into_iter()
        .filter_map(|r| match r.into_iter().next() {
            Some((_, Value::Object(inner))) => Some(inner),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_transform_pokemons_projects_dedupes_sorts() {
        let input = vec![
            record(json!({"id": 10, "name": "Caterpie", "type": "bug"})),
            record(json!({"id": 2, "name": "Ivysaur"})),
            record(json!({"id": 10, "name": "Caterpie", "hp": 45})),
            record(json!({"name": "Unknown"})),
            record(json!({"id": "1", "name": "Bulbasaur"})),
        ];

        let out = transform_pokemons(input);
        assert_eq!(
            out,
            vec![
                record(json!({"id": "1", "name": "Bulbasaur"})),
                record(json!({"id": 2, "name": "Ivysaur"})),
                record(json!({"id": 10, "name": "Caterpie"})),
                record(json!({"name": "Unknown"})),
            ]
        );
    }

    #[test]
    fn test_transform_pokemons_empty() {
        assert!(transform_pokemons(Vec::new()).is_empty());
    }

    #[test]
    fn test_flatten_nested_unwraps() {
        let input = vec![
            record(json!({"combat": {"first_pokemon": 1, "second_pokemon": 2, "winner": 1}})),
            record(json!({"combat": {"first_pokemon": 3, "second_pokemon": 4, "winner": 4}})),
        ];
        let out = flatten_nested(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["winner"], 4);
    }

    #[test]
    fn test_flatten_nested_leaves_flat_records() {
        let input = vec![
            record(json!({"first_pokemon": 1, "second_pokemon": 2, "winner": 1})),
            record(json!({"winner": 4})),
        ];
        assert_eq!(flatten_nested(input.clone()), input);
        assert!(flatten_nested(Vec::new()).is_empty());
    }
}
