//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! One Qdrant collection per document index. All builder-pattern calls live
//! here so the rest of the crate only sees [`VectorStore`].

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, ListValue,
    PointStruct, Range, SearchParamsBuilder, SearchPointsBuilder, Struct, UpsertPointsBuilder,
    Value as QValue, VectorParamsBuilder, value,
};
use tracing::{debug, info, warn};

use crate::config::{DistanceKind, RagConfig};
use crate::errors::RagError;
use crate::naming::point_id;
use crate::record::{ChunkPayload, ScoredChunk, VectorRecord};
use crate::store::{StoreFuture, VectorStore, clamp_score};

/// A facade over the Qdrant client to keep the rest of the code clean and stable.
pub struct QdrantStore {
    client: Qdrant,
    distance: DistanceKind,
    upsert_batch: usize,
    exact_search: bool,
}

impl QdrantStore {
    /// Creates a new store from the given configuration.
    ///
    /// Uses the builder-based API of `qdrant-client` and supports
    /// optional API key authentication. No request is sent here.
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&cfg.qdrant_url);
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Config(format!("qdrant client: {e}")))?;

        Ok(Self {
            client,
            distance: cfg.distance,
            upsert_batch: cfg.upsert_batch.max(1),
            exact_search: cfg.exact_search,
        })
    }

    async fn exists(&self, name: &str) -> Result<bool, RagError> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| RagError::Search(format!("collection_exists '{name}': {e}")))
    }
}

impl VectorStore for QdrantStore {
    fn collection_exists<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(self.exists(name))
    }

    fn create_collection<'a>(&'a self, name: &'a str, dim: usize) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self
                .exists(name)
                .await
                .map_err(|e| RagError::IndexCreation(e.to_string()))?
            {
                debug!(collection = name, "collection already exists");
                return Ok(());
            }

            let distance = match self.distance {
                DistanceKind::Cosine => Distance::Cosine,
                DistanceKind::Dot => Distance::Dot,
            };

            let created = self
                .client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(VectorParamsBuilder::new(dim as u64, distance)),
                )
                .await;

            match created {
                Ok(_) => {
                    info!(collection = name, dim, "collection created");
                    Ok(())
                }
                // A concurrent creator may have won the race.
                Err(err) => match self.exists(name).await {
                    Ok(true) => Ok(()),
                    _ => Err(RagError::IndexCreation(format!("'{name}': {err}"))),
                },
            }
        })
    }

    fn upsert<'a>(&'a self, name: &'a str, records: Vec<VectorRecord>) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            if records.is_empty() {
                debug!(collection = name, "no points provided for upsert");
                return Ok(0);
            }

            let mut written = 0usize;
            let mut points = Vec::with_capacity(records.len());
            for r in records {
                points.push(to_point(r)?);
            }

            for batch in points.chunks(self.upsert_batch) {
                self.client
                    .upsert_points(UpsertPointsBuilder::new(name, batch.to_vec()).wait(true))
                    .await
                    .map_err(|e| RagError::Upsert(format!("'{name}': {e}")))?;
                written += batch.len();
                debug!(collection = name, batch = batch.len(), written, "upserted batch");
            }
            Ok(written)
        })
    }

    fn search<'a>(
        &'a self,
        name: &'a str,
        vector: &'a [f32],
        top_k: usize,
    ) -> StoreFuture<'a, Vec<ScoredChunk>> {
        Box::pin(async move {
            let mut builder =
                SearchPointsBuilder::new(name, vector.to_vec(), top_k as u64).with_payload(true);
            if self.exact_search {
                builder = builder.params(SearchParamsBuilder::default().exact(true));
            }

            let res = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| RagError::Search(format!("'{name}': {e}")))?;

            let mut out = Vec::with_capacity(res.result.len());
            for r in res.result {
                let json = qpayload_to_json(r.payload);
                match serde_json::from_value::<ChunkPayload>(json) {
                    Ok(payload) => out.push(ScoredChunk {
                        index_name: name.to_string(),
                        score: clamp_score(r.score),
                        payload,
                    }),
                    Err(e) => warn!(collection = name, error = %e, "skipping point with malformed payload"),
                }
            }
            Ok(out)
        })
    }

    fn delete_collection<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !self.exists(name).await? {
                debug!(collection = name, "delete skipped, collection absent");
                return Ok(());
            }
            self.client
                .delete_collection(name)
                .await
                .map_err(|e| RagError::IndexCreation(format!("delete '{name}': {e}")))?;
            info!(collection = name, "collection deleted");
            Ok(())
        })
    }

    fn delete_tail<'a>(&'a self, name: &'a str, from_index: u64) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let filter = Filter::must([Condition::range(
                "chunk_index",
                Range {
                    gte: Some(from_index as f64),
                    ..Default::default()
                },
            )]);
            self.client
                .delete_points(DeletePointsBuilder::new(name).points(filter).wait(true))
                .await
                .map_err(|e| RagError::Upsert(format!("prune '{name}': {e}")))?;
            Ok(())
        })
    }
}

fn to_point(r: VectorRecord) -> Result<PointStruct, RagError> {
    let id = point_id(&r.index_name, r.payload.chunk_index).to_string();
    let json = serde_json::to_value(&r.payload).map_err(|e| RagError::Upsert(e.to_string()))?;
    let payload: HashMap<String, QValue> = match json {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, json_to_qvalue(v)))
            .collect(),
        _ => HashMap::new(),
    };
    Ok(PointStruct::new(id, r.vector, payload))
}

/// Converts `serde_json::Value` into Qdrant `Value` (handles arrays/objects).
fn json_to_qvalue(v: serde_json::Value) -> QValue {
    use value::Kind as K;
    let kind = match v {
        serde_json::Value::String(s) => Some(K::StringValue(s)),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(K::IntegerValue(i)),
            (None, Some(f)) => Some(K::DoubleValue(f)),
            _ => Some(K::StringValue(n.to_string())),
        },
        serde_json::Value::Bool(b) => Some(K::BoolValue(b)),
        serde_json::Value::Array(arr) => Some(K::ListValue(ListValue {
            values: arr.into_iter().map(json_to_qvalue).collect(),
        })),
        serde_json::Value::Object(map) => Some(K::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_qvalue(v)))
                .collect(),
        })),
        serde_json::Value::Null => None,
    };
    QValue { kind }
}

/// Converts a Qdrant payload into JSON. Nested values are not expected here.
fn qpayload_to_json(p: HashMap<String, QValue>) -> serde_json::Value {
    use value::Kind as K;
    let mut m = serde_json::Map::new();
    for (k, v) in p {
        let j = match v.kind {
            Some(K::StringValue(s)) => serde_json::Value::String(s),
            Some(K::IntegerValue(i)) => serde_json::Value::Number(i.into()),
            Some(K::DoubleValue(f)) => serde_json::json!(f),
            Some(K::BoolValue(b)) => serde_json::Value::Bool(b),
            _ => serde_json::Value::Null,
        };
        m.insert(k, j);
    }
    serde_json::Value::Object(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_roundtrips_through_qdrant_values() {
        let payload = ChunkPayload {
            file_id: "f1".into(),
            file_name: "a.pdf".into(),
            file_type: "pdf".into(),
            chunk_index: 7,
            text: "hello".into(),
            uploaded_by: None,
            uploaded_at: Some("2026-01-01T00:00:00+00:00".into()),
        };
        let json = serde_json::to_value(&payload).unwrap();
        let q: HashMap<String, QValue> = json
            .as_object()
            .unwrap()
            .clone()
            .into_iter()
            .map(|(k, v)| (k, json_to_qvalue(v)))
            .collect();
        let back: ChunkPayload = serde_json::from_value(qpayload_to_json(q)).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn builds_client_without_connecting() {
        let cfg = RagConfig::default();
        assert!(QdrantStore::new(&cfg).is_ok());
    }
}
