//! Damped importance propagation over the file dependency graph.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::{RankingConfig, DEFAULT_DAMPING};
use crate::indexer::graph::DependencyGraph;

/// Score every graph node.
///
/// Each round computes `(1 - d) + d * sum(cur(m) / out(m))` over the nodes `m`
/// importing `n`, from the previous round's scores. Nodes without outbound
/// edges pass nothing on. Scores are unnormalized.
pub fn rank(graph: &DependencyGraph, config: &RankingConfig) -> HashMap<String, f64> {
    let nodes: Vec<&str> = graph.nodes().collect();
    if nodes.is_empty() {
        return HashMap::new();
    }

    let damping = if config.damping.is_finite() {
        config.damping.clamp(0.0, 1.0)
    } else {
        DEFAULT_DAMPING
    };
    let base = 1.0 - damping;
    let position: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    // Inbound neighbours of each node as indices, with their out-degree.
    let inbound: Vec<Vec<(usize, f64)>> = nodes
        .iter()
        .map(|node| {
            graph
                .dependents(node)
                .into_iter()
                .filter_map(|source| {
                    let idx = *position.get(source)?;
                    let out = graph.out_degree(source);
                    (out > 0).then_some((idx, out as f64))
                })
                .collect()
        })
        .collect();

    let mut scores = vec![1.0_f64; nodes.len()];
    let mut rounds = 0;
    for _ in 0..config.iterations {
        let next: Vec<f64> = inbound
            .iter()
            .map(|sources| {
                let inflow: f64 = sources.iter().map(|(idx, out)| scores[*idx] / out).sum();
                base + damping * inflow
            })
            .collect();
        let delta: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        rounds += 1;
        if config.epsilon.is_some_and(|eps| delta < eps) {
            break;
        }
    }

    tracing::debug!(nodes = nodes.len(), rounds, "Ranked dependency graph");

    nodes
        .into_iter()
        .zip(scores)
        .map(|(node, score)| (node.to_string(), score))
        .collect()
}

/// Scores sorted by descending score, ties broken by path.
pub fn ranked(scores: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = scores.iter().map(|(p, s)| (p.clone(), *s)).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries
}
