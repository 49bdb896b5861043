//! Relationship Queries
//!
//! Read-only grouping of artifacts by feature and workstream, used as the
//! relational search signal.
//!
//! The data model has no edge list, so "depth" is an approximation: depth 1
//! returns the feature's own artifacts, and any depth beyond that widens once
//! to artifacts sharing a workstream with them. It is not a multi-hop
//! traversal.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::artifact::Artifact;
use crate::services::memory::store::ArtifactStore;
use crate::utils::error::AppResult;

/// Everything grouped under one feature ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGroup {
    pub feature_id: String,
    pub workstreams: BTreeSet<String>,
    /// Artifact IDs in path order
    pub artifact_ids: Vec<String>,
}

pub struct Graph {
    store: Arc<ArtifactStore>,
}

impl Graph {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }

    /// Artifacts related to `feature_id`, in discovery order.
    pub fn find_related(&self, feature_id: &str, max_depth: usize) -> AppResult<Vec<Artifact>> {
        let feature_id = feature_id.trim();
        if feature_id.is_empty() || max_depth == 0 {
            return Ok(Vec::new());
        }

        let mut related = self.store.list_by_feature(feature_id)?;
        if max_depth < 2 {
            return Ok(related);
        }

        let mut seen: HashSet<String> = related.iter().map(|a| a.id.clone()).collect();
        let workstreams: BTreeSet<String> = related
            .iter()
            .filter_map(|a| a.workstream_id.clone())
            .collect();
        for ws in &workstreams {
            for artifact in self.store.list_by_workstream(ws)? {
                if seen.insert(artifact.id.clone()) {
                    related.push(artifact);
                }
            }
        }

        tracing::debug!(
            feature_id,
            depth = max_depth,
            count = related.len(),
            "Resolved related artifacts"
        );
        Ok(related)
    }

    pub fn find_by_workstream(&self, workstream_id: &str) -> AppResult<Vec<Artifact>> {
        if workstream_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.store.list_by_workstream(workstream_id.trim())
    }

    /// Grouping of every artifact that carries a feature ID.
    pub fn get_feature_graph(&self) -> AppResult<BTreeMap<String, FeatureGroup>> {
        let mut graph: BTreeMap<String, FeatureGroup> = BTreeMap::new();
        for artifact in self.store.list_all()? {
            let Some(feature_id) = artifact.feature_id else {
                continue;
            };
            let group = graph
                .entry(feature_id.clone())
                .or_insert_with(|| FeatureGroup {
                    feature_id,
                    ..FeatureGroup::default()
                });
            if let Some(ws) = artifact.workstream_id {
                group.workstreams.insert(ws);
            }
            group.artifact_ids.push(artifact.id);
        }
        Ok(graph)
    }
}
