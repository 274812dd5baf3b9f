//! Hubs and authorities over a subgraph of the link graph.
//!
//! Scores are computed by power iteration: a node's hub score is the sum of the
//! authority scores of the nodes it links to, its authority score the sum of the
//! hub scores of the nodes linking to it. Each vector is L2-normalized after
//! every update and stops changing once its total change drops under
//! [`EPSILON`]. Hubs and authorities converge independently.

use crate::error::Result;
use crate::graph::LinkGraph;
use crate::NodeId;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const EPSILON: f64 = 0.001;
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Scores of one ranking call, defined for exactly the nodes it was seeded with.
#[derive(Debug, Clone, Default)]
pub struct HitsScores {
    pub hubs: HashMap<NodeId, f64>,
    pub authorities: HashMap<NodeId, f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl HitsScores {
    pub fn hub(&self, id: NodeId) -> f64 {
        self.hubs.get(&id).copied().unwrap_or(0.0)
    }

    pub fn authority(&self, id: NodeId) -> f64 {
        self.authorities.get(&id).copied().unwrap_or(0.0)
    }

    pub fn top_hubs(&self, k: usize) -> Vec<(NodeId, f64)> {
        top(&self.hubs, k)
    }

    pub fn top_authorities(&self, k: usize) -> Vec<(NodeId, f64)> {
        top(&self.authorities, k)
    }
}

fn top(scores: &HashMap<NodeId, f64>, k: usize) -> Vec<(NodeId, f64)> {
    let mut v: Vec<(NodeId, f64)> = scores.iter().map(|(id, s)| (*id, *s)).collect();
    v.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    v.truncate(k);
    v
}

#[derive(Debug, Clone, Copy)]
pub struct HitsRanker {
    pub max_iterations: usize,
    pub epsilon: f64,
}

impl Default for HitsRanker {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS, epsilon: EPSILON }
    }
}

impl HitsRanker {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations, ..Default::default() }
    }

    /// Ranks every node of the graph.
    pub fn rank_all(&self, graph: &LinkGraph) -> HitsScores {
        self.rank(graph, &graph.nodes())
    }

    /// Ranks the subgraph induced by `base`. Links leaving the base set are ignored.
    pub fn rank(&self, graph: &LinkGraph, base: &[NodeId]) -> HitsScores {
        let mut nodes = base.to_vec();
        nodes.sort_unstable();
        nodes.dedup();

        let mut hubs: HashMap<NodeId, f64> = nodes.iter().map(|&n| (n, 1.0)).collect();
        let mut authorities = hubs.clone();
        let mut hubs_done = nodes.is_empty();
        let mut authorities_done = nodes.is_empty();

        let mut iterations = 0;
        while iterations < self.max_iterations && !(hubs_done && authorities_done) {
            if !hubs_done {
                let fresh = nodes
                    .iter()
                    .map(|&n| graph.out_links(n).iter().filter_map(|m| authorities.get(m)).sum::<f64>())
                    .collect::<Vec<f64>>();
                let change = self.update(&nodes, fresh, &mut hubs);
                if change <= self.epsilon {
                    hubs_done = true;
                    tracing::debug!(iterations, change, "hub scores converged");
                }
            }
            if !authorities_done {
                let fresh = nodes
                    .iter()
                    .map(|&n| graph.in_links(n).iter().filter_map(|m| hubs.get(m)).sum::<f64>())
                    .collect::<Vec<f64>>();
                let change = self.update(&nodes, fresh, &mut authorities);
                if change <= self.epsilon {
                    authorities_done = true;
                    tracing::debug!(iterations, change, "authority scores converged");
                }
            }
            iterations += 1;
        }

        let converged = hubs_done && authorities_done;
        if !converged {
            tracing::debug!(iterations, nodes = nodes.len(), "HITS stopped at iteration cap");
        }
        HitsScores { hubs, authorities, iterations, converged }
    }

    /// Normalizes `fresh`, stores it and returns the total absolute change.
    fn update(&self, nodes: &[NodeId], mut fresh: Vec<f64>, scores: &mut HashMap<NodeId, f64>) -> f64 {
        normalize(&mut fresh);
        let mut change = 0.0;
        for (n, value) in nodes.iter().zip(fresh) {
            let old = scores.insert(*n, value).unwrap_or(0.0);
            change += (value - old).abs();
        }
        change
    }
}

/// L2-normalizes in place; an all-zero vector is left alone.
fn normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Writes `nodeID: score` lines.
pub fn write_scores(scores: &[(NodeId, f64)], path: &Path) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for (id, score) in scores {
        writeln!(w, "{id}: {score:.5}")?;
    }
    w.flush()?;
    Ok(())
}
