// Identifier reconciliation
//
// Rewrites foreign identifiers embedded in records (combat participants and
// winner) into display names. Local join first; identifiers the local table
// does not know are looked up one by one against the attribute endpoint.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::api::PokemonApi;
use crate::error::Result;
use crate::models::Record;
use crate::throttle::Pacer;

/// Identifier fields rewritten by default
pub const DEFAULT_ID_FIELDS: [&str; 3] = ["first_pokemon", "second_pokemon", "winner"];

/// Canonical form of an identifier
///
/// Integers, integral floats and numeric strings collapse to `Int`, so `3`,
/// `3.0`, `"3"` and `" 3 "` are the same key. Fractional numbers truncate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdKey {
    Int(i64),
    Text(String),
}

impl IdKey {
    /// Canonicalize a JSON value; null, booleans and containers are not identifiers
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(IdKey::Int(i))
                } else if n.is_u64() {
                    Some(IdKey::Text(n.to_string()))
                } else {
                    n.as_f64().and_then(truncate_f64)
                }
            }
            Value::String(s) => Self::from_str_lenient(s),
            _ => None,
        }
    }

    fn from_str_lenient(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Some(IdKey::Int(i));
        }
        if let Some(key) = s.parse::<f64>().ok().and_then(truncate_f64) {
            return Some(key);
        }
        Some(IdKey::Text(s.to_string()))
    }
}

fn truncate_f64(f: f64) -> Option<IdKey> {
    if !f.is_finite() || f.trunc() < i64::MIN as f64 || f.trunc() >= i64::MAX as f64 {
        return None;
    }
    Some(IdKey::Int(f.trunc() as i64))
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKey::Int(i) => write!(f, "{}", i),
            IdKey::Text(s) => f.write_str(s),
        }
    }
}

/// Identifier → display name for one reconciliation pass
///
/// Entries are never overwritten: the first resolution wins.
#[derive(Debug, Default, Clone)]
pub struct IdentifierMap {
    names: HashMap<IdKey, String>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from entity records carrying `id` and `name`
    pub fn from_records(table: &[Record]) -> Self {
        let mut map = Self::new();
        for entity in table {
            let (Some(id), Some(name)) = (entity.get("id"), entity.get("name")) else {
                continue;
            };
            if let Some(name) = name.as_str() {
                map.insert_value(id, name);
            }
        }
        map
    }

    /// Insert under the canonical key; returns false if the key was already set
    pub fn insert(&mut self, key: IdKey, name: impl Into<String>) -> bool {
        match self.names.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(name.into());
                true
            }
        }
    }

    fn insert_value(&mut self, id: &Value, name: &str) -> bool {
        match IdKey::from_value(id) {
            Some(key) => self.insert(key, name),
            None => false,
        }
    }

    pub fn get(&self, key: &IdKey) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    /// Resolve a raw field value
    pub fn lookup(&self, value: &Value) -> Option<&str> {
        IdKey::from_value(value).and_then(|key| self.get(&key))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Remote fallback used for identifiers missing from the local table
#[allow(async_fn_in_trait)]
pub trait NameLookup {
    /// Refresh the session before a batch of lookups
    async fn refresh_session(&self) -> Result<()>;

    /// Display name for one identifier
    async fn lookup_name(&self, id: &IdKey) -> Result<String>;
}

impl NameLookup for PokemonApi {
    async fn refresh_session(&self) -> Result<()> {
        self.http().auth().login().await
    }

    async fn lookup_name(&self, id: &IdKey) -> Result<String> {
        PokemonApi::lookup_name(self, &id.to_string()).await
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub records: Vec<Record>,
    /// Distinct identifiers missing from the local table
    pub local_misses: usize,
    /// Remote lookups issued
    pub remote_lookups: usize,
    /// Identifiers still unresolved after the remote fallback, in first-seen order
    pub unresolved: Vec<IdKey>,
}

/// Rewrites identifier fields to display names
pub struct Reconciler<'a, L> {
    lookup: &'a L,
    pacer: &'a Pacer,
    fields: Vec<String>,
}

impl<'a, L: NameLookup> Reconciler<'a, L> {
    pub fn new(lookup: &'a L, pacer: &'a Pacer) -> Self {
        Self {
            lookup,
            pacer,
            fields: DEFAULT_ID_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Override the identifier fields (all must share one identifier domain)
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Rewrite identifier fields using `table` plus remote backfill
    pub async fn resolve(&self, records: Vec<Record>, table: &[Record]) -> Result<Vec<Record>> {
        Ok(self.resolve_with_report(records, table).await?.records)
    }

    /// Same as [`resolve`](Self::resolve), also reporting what happened
    ///
    /// Only a failed session refresh is an error; failed lookups leave the raw
    /// identifier in place.
    pub async fn resolve_with_report(
        &self,
        mut records: Vec<Record>,
        table: &[Record],
    ) -> Result<Reconciliation> {
        if records.is_empty() {
            return Ok(Reconciliation {
                records,
                local_misses: 0,
                remote_lookups: 0,
                unresolved: Vec::new(),
            });
        }

        let mut names = IdentifierMap::from_records(table);
        let missing = self.collect_missing(&records, &names);
        let local_misses = missing.len();
        let mut remote_lookups = 0;
        let mut unresolved = Vec::new();

        if !missing.is_empty() {
            tracing::info!(
                missing = missing.len(),
                "Resolving identifiers missing from the local table"
            );
            self.lookup.refresh_session().await?;

            for key in missing {
                self.pacer.acquire().await;
                remote_lookups += 1;

                match self.lookup.lookup_name(&key).await {
                    Ok(name) => {
                        tracing::debug!(id = %key, name = %name, "Backfilled identifier");
                        names.insert(key, name);
                    }
                    Err(e) => {
                        tracing::warn!(id = %key, error = %e, "Identifier left unresolved");
                        unresolved.push(key);
                    }
                }
            }
        }

        for record in records.iter_mut() {
            for field in &self.fields {
                let Some(value) = record.get_mut(field) else {
                    continue;
                };
                if let Some(name) = names.lookup(value) {
                    *value = Value::String(name.to_string());
                }
            }
        }

        if !unresolved.is_empty() {
            tracing::warn!(
                count = unresolved.len(),
                "Some identifiers could not be resolved and keep their raw value"
            );
        }

        Ok(Reconciliation {
            records,
            local_misses,
            remote_lookups,
            unresolved,
        })
    }

    /// Distinct canonical keys without a local name, in first-seen order
    fn collect_missing(&self, records: &[Record], names: &IdentifierMap) -> Vec<IdKey> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        for record in records {
            for field in &self.fields {
                let Some(key) = record.get(field).and_then(IdKey::from_value) else {
                    continue;
                };
                if names.get(&key).is_none() && seen.insert(key.clone()) {
                    missing.push(key);
                }
            }
        }

        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    fn table(entries: &[(i64, &str)]) -> Vec<Record> {
        entries
            .iter()
            .map(|(id, name)| record(json!({"id": id, "name": name})))
            .collect()
    }

    /// Remote stub backed by a fixed id → name table
    struct FakeLookup {
        names: HashMap<IdKey, String>,
        calls: RefCell<Vec<IdKey>>,
        refreshes: RefCell<u32>,
        fail_refresh: bool,
    }

    impl FakeLookup {
        fn new(entries: &[(i64, &str)]) -> Self {
            Self {
                names: entries
                    .iter()
                    .map(|(id, name)| (IdKey::Int(*id), name.to_string()))
                    .collect(),
                calls: RefCell::new(Vec::new()),
                refreshes: RefCell::new(0),
                fail_refresh: false,
            }
        }
    }

    impl NameLookup for FakeLookup {
        async fn refresh_session(&self) -> Result<()> {
            *self.refreshes.borrow_mut() += 1;
            if self.fail_refresh {
                return Err(ApiError::AuthError("bad credentials".to_string()));
            }
            Ok(())
        }

        async fn lookup_name(&self, id: &IdKey) -> Result<String> {
            self.calls.borrow_mut().push(id.clone());
            self.names.get(id).cloned().ok_or_else(|| ApiError::RequestFailed {
                status: 404,
                message: "not found".to_string(),
            })
        }
    }

    #[test]
    fn test_id_key_canonicalization() {
        assert_eq!(IdKey::from_value(&json!(3)), Some(IdKey::Int(3)));
        assert_eq!(IdKey::from_value(&json!("3")), Some(IdKey::Int(3)));
        assert_eq!(IdKey::from_value(&json!(" 3 ")), Some(IdKey::Int(3)));
        assert_eq!(IdKey::from_value(&json!(3.0)), Some(IdKey::Int(3)));
        assert_eq!(IdKey::from_value(&json!("3.0")), Some(IdKey::Int(3)));
        assert_eq!(IdKey::from_value(&json!(3.7)), Some(IdKey::Int(3)));
        assert_eq!(
            IdKey::from_value(&json!("mew")),
            Some(IdKey::Text("mew".to_string()))
        );
        assert_eq!(IdKey::from_value(&json!("")), None);
        assert_eq!(IdKey::from_value(&json!(null)), None);
        assert_eq!(IdKey::from_value(&json!(true)), None);
        assert_eq!(IdKey::from_value(&json!([1])), None);
        assert_eq!(IdKey::from_value(&json!("inf")), Some(IdKey::Text("inf".to_string())));
    }

    #[test]
    fn test_id_key_beyond_i64_range_agrees_across_forms() {
        let above = 9_223_372_036_854_775_808u64;
        let from_number = IdKey::from_value(&json!(above));
        let from_string = IdKey::from_value(&json!(above.to_string()));
        assert_eq!(from_number, Some(IdKey::Text(above.to_string())));
        assert_eq!(from_number, from_string);

        assert_eq!(
            IdKey::from_value(&json!(i64::MAX.to_string())),
            Some(IdKey::Int(i64::MAX))
        );
    }

    #[test]
    fn test_identifier_map_first_resolution_wins() {
        let mut map = IdentifierMap::new();
        assert!(map.insert(IdKey::Int(1), "Pikachu"));
        assert!(!map.insert(IdKey::Int(1), "Raichu"));
        assert_eq!(map.lookup(&json!("1")), Some("Pikachu"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_identifier_map_from_records_skips_incomplete() {
        let entities = vec![
            record(json!({"id": 1, "name": "Pikachu"})),
            record(json!({"id": 2})),
            record(json!({"name": "Ghost"})),
            record(json!({"id": "1", "name": "Duplicate"})),
        ];
        let map = IdentifierMap::from_records(&entities);
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup(&json!(1)), Some("Pikachu"));
    }

    #[tokio::test]
    async fn test_resolve_scenario_with_backfill() {
        let remote = FakeLookup::new(&[(3, "Charmander")]);
        let pacer = Pacer::disabled();
        let records = vec![
            record(json!({"first_pokemon": 1, "second_pokemon": 2, "winner": 1})),
            record(json!({"first_pokemon": 1, "second_pokemon": 3, "winner": 3})),
        ];

        let out = Reconciler::new(&remote, &pacer)
            .resolve(records, &table(&[(1, "Pikachu"), (2, "Bulbasaur")]))
            .await
            .unwrap();

        assert_eq!(
            out,
            vec![
                record(json!({"first_pokemon": "Pikachu", "second_pokemon": "Bulbasaur", "winner": "Pikachu"})),
                record(json!({"first_pokemon": "Pikachu", "second_pokemon": "Charmander", "winner": "Charmander"})),
            ]
        );
        // One lookup for id 3 even though two fields reference it
        assert_eq!(*remote.calls.borrow(), vec![IdKey::Int(3)]);
        assert_eq!(*remote.refreshes.borrow(), 1);
        assert_eq!(pacer.acquisitions(), 1);
    }

    #[tokio::test]
    async fn test_resolve_failed_lookup_keeps_raw_value() {
        let remote = FakeLookup::new(&[]);
        let pacer = Pacer::disabled();
        let records = vec![record(
            json!({"first_pokemon": 1, "second_pokemon": 99, "winner": "99"}),
        )];

        let report = Reconciler::new(&remote, &pacer)
            .resolve_with_report(records, &table(&[(1, "Pikachu")]))
            .await
            .unwrap();

        assert_eq!(
            report.records,
            vec![record(json!({"first_pokemon": "Pikachu", "second_pokemon": 99, "winner": "99"}))]
        );
        assert_eq!(report.local_misses, 1);
        assert_eq!(report.remote_lookups, 1);
        assert_eq!(report.unresolved, vec![IdKey::Int(99)]);
    }

    #[tokio::test]
    async fn test_resolve_no_misses_skips_remote() {
        let remote = FakeLookup::new(&[]);
        let pacer = Pacer::disabled();
        let records = vec![record(json!({"first_pokemon": "1", "second_pokemon": 2.0, "winner": 2}))];

        let out = Reconciler::new(&remote, &pacer)
            .resolve(records, &table(&[(1, "Pikachu"), (2, "Bulbasaur")]))
            .await
            .unwrap();

        assert_eq!(out[0]["first_pokemon"], "Pikachu");
        assert_eq!(out[0]["second_pokemon"], "Bulbasaur");
        assert!(remote.calls.borrow().is_empty());
        assert_eq!(*remote.refreshes.borrow(), 0);
    }

    #[tokio::test]
    async fn test_resolve_refresh_failure_is_fatal() {
        let mut remote = FakeLookup::new(&[(3, "Charmander")]);
        remote.fail_refresh = true;
        let pacer = Pacer::disabled();
        let records = vec![record(json!({"first_pokemon": 3}))];

        let err = Reconciler::new(&remote, &pacer)
            .resolve(records, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthError(_)));
        assert!(remote.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_leaves_other_fields_and_nulls() {
        let remote = FakeLookup::new(&[]);
        let pacer = Pacer::disabled();
        let records = vec![record(json!({"id": 1, "first_pokemon": 1, "winner": null}))];

        let out = Reconciler::new(&remote, &pacer)
            .resolve(records, &table(&[(1, "Pikachu")]))
            .await
            .unwrap();

        assert_eq!(out[0]["id"], 1);
        assert_eq!(out[0]["first_pokemon"], "Pikachu");
        assert_eq!(out[0]["winner"], Value::Null);
        assert!(remote.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_custom_fields() {
        let remote = FakeLookup::new(&[]);
        let pacer = Pacer::disabled();
        let records = vec![record(json!({"attacker": 2, "first_pokemon": 2}))];

        let out = Reconciler::new(&remote, &pacer)
            .with_fields(["attacker"])
            .resolve(records, &table(&[(2, "Bulbasaur")]))
            .await
            .unwrap();

        assert_eq!(out[0]["attacker"], "Bulbasaur");
        assert_eq!(out[0]["first_pokemon"], 2);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let remote = FakeLookup::new(&[(3, "Charmander")]);
        let pacer = Pacer::disabled();
        let records = vec![
            record(json!({"first_pokemon": 1, "second_pokemon": 3, "winner": 3})),
            record(json!({"first_pokemon": 4, "second_pokemon": 1, "winner": 4})),
        ];
        let entities = table(&[(1, "Pikachu")]);
        let reconciler = Reconciler::new(&remote, &pacer);

        let first = reconciler.resolve(records.clone(), &entities).await.unwrap();
        let second = reconciler.resolve(records, &entities).await.unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_numeric_forms_share_a_key(n in -1_000_000i64..1_000_000) {
            let key = IdKey::from_value(&json!(n));
            prop_assert_eq!(IdKey::from_value(&json!(n.to_string())), key.clone());
            prop_assert_eq!(IdKey::from_value(&json!(n as f64)), key.clone());
            prop_assert_eq!(IdKey::from_value(&json!(format!("{}.0", n))), key);
        }

        #[test]
        fn prop_one_lookup_per_distinct_miss(ids in proptest::collection::vec(10i64..20, 1..40)) {
            let remote = FakeLookup::new(&[]);
            let pacer = Pacer::disabled();
            let records: Vec<Record> = ids
                .iter()
                .map(|id| record(json!({"first_pokemon": id, "winner": id.to_string()})))
                .collect();
            let report = tokio_test::block_on(Reconciler::new(&remote, &pacer).resolve_with_report(records, &[]))
                .unwrap();

            let distinct: HashSet<i64> = ids.iter().copied().collect();
            prop_assert_eq!(remote.calls.borrow().len(), distinct.len());
            prop_assert_eq!(report.unresolved.len(), distinct.len());
        }
    }
}
