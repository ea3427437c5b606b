//! Graph exporter.
//!
//! Breadth-first walk over `linked_manifests` edges with an explicit frontier
//! and a visited map, so a cyclic store terminates and deep chains never grow
//! the stack.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{Manifest, ManifestId};
use crate::storage::ManifestStore;

/// A `linked_manifests` edge: `source` links to `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: ManifestId,
    pub target: ManifestId,
}

/// Bounded traversal result. Built on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceGraph {
    pub root: ManifestId,
    pub nodes: BTreeMap<ManifestId, Manifest>,
    pub edges: BTreeSet<Edge>,
    /// The depth limit stopped the walk before the frontier was exhausted
    pub truncated: bool,
    /// Link targets that do not resolve in the store
    #[serde(default)]
    pub unresolved: BTreeSet<ManifestId>,
}

impl ProvenanceGraph {
    fn rooted_at(root: Manifest) -> Self {
        let id = root.id.clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(id.clone(), root);
        Self {
            root: id,
            nodes,
            edges: BTreeSet::new(),
            truncated: false,
            unresolved: BTreeSet::new(),
        }
    }

    pub fn contains(&self, id: &ManifestId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Targets of `id`'s recorded edges.
    pub fn successors<'a>(&'a self, id: &'a ManifestId) -> impl Iterator<Item = &'a ManifestId> + 'a {
        self.edges
            .iter()
            .filter(move |edge| edge.source == *id)
            .map(|edge| &edge.target)
    }
}

/// Exports the graph reachable from `root` within `max_depth` hops.
///
/// The root is depth 0. Nodes at `max_depth` are included but not expanded:
/// their edges to already-visited nodes are kept, a link to a stored manifest
/// outside the graph marks it truncated, and a link to nothing is unresolved.
pub fn export(root: &ManifestId, max_depth: usize, store: &dyn ManifestStore) -> Result<ProvenanceGraph> {
    let root_manifest = store.get(root).map_err(|e| e.into_unknown(root))?;
    let mut graph = ProvenanceGraph::rooted_at(root_manifest);

    let mut frontier: VecDeque<(ManifestId, usize)> = VecDeque::new();
    frontier.push_back((root.clone(), 0));

    while let Some((id, depth)) = frontier.pop_front() {
        let links: Vec<ManifestId> = match graph.nodes.get(&id) {
            Some(manifest) => manifest.claim.linked_manifests.iter().cloned().collect(),
            None => continue,
        };

        for target in links {
            if graph.nodes.contains_key(&target) {
                graph.edges.insert(Edge {
                    source: id.clone(),
                    target,
                });
                continue;
            }
            if graph.unresolved.contains(&target) {
                continue;
            }
            if depth >= max_depth {
                if store.exists(&target)? {
                    graph.truncated = true;
                } else {
                    warn!(source = %id, target = %target, "Linked manifest not in store");
                    graph.unresolved.insert(target);
                }
                continue;
            }

            match store.get(&target) {
                Ok(manifest) => {
                    graph.nodes.insert(target.clone(), manifest);
                    graph.edges.insert(Edge {
                        source: id.clone(),
                        target: target.clone(),
                    });
                    frontier.push_back((target, depth + 1));
                }
                Err(e) if e.is_not_found() => {
                    warn!(source = %id, target = %target, "Linked manifest not in store");
                    graph.unresolved.insert(target);
                }
                Err(e) => return Err(e),
            }
        }
    }

    debug!(
        root = %graph.root,
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        truncated = graph.truncated,
        "Exported provenance graph"
    );
    Ok(graph)
}

/// Version history of `id`, newest first, following `previous_version` to the
/// first version.
pub fn history(id: &ManifestId, store: &dyn ManifestStore) -> Result<Vec<Manifest>> {
    let mut versions = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(id.clone());

    while let Some(current) = next.take() {
        if !seen.insert(current.clone()) {
            warn!(id = %current, "previous_version chain loops; stopping");
            break;
        }
        let manifest = store.get(&current).map_err(|e| e.into_unknown(&current))?;
        next = manifest.claim.previous_version.clone();
        versions.push(manifest);
    }

    Ok(versions)
}
