//! Fuzzy name harmonization.
//!
//! Partitions a column's distinct normalized values into similarity clusters
//! and rewrites every row to its cluster's canonical display string.
//!
//! Clustering is greedy and seed-ordered: distinct keys are visited by
//! descending frequency (ties in first-seen order), each unassigned key opens
//! a cluster and absorbs every later unassigned key that is similar enough to
//! it. A value anchors to the first seed it matches, not its best match, so
//! results depend on input order. The pairwise step is O(U²) in the number of
//! distinct keys, which is why callers bound U with `max_uniques`.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::Serialize;

use crate::error::SpendError;
use crate::normalize::normalize_text;
use crate::similarity::{length_bound, ratio};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonizeOptions {
    /// Minimum similarity for a key to join a seed's cluster, in [0, 1].
    pub threshold: f64,
    /// Keys shorter than this (in chars) never fuzzy-match anything.
    pub min_len: usize,
    /// Ceiling on distinct keys entering the quadratic clustering step.
    pub max_uniques: usize,
}

impl Default for HarmonizeOptions {
    fn default() -> Self {
        Self {
            threshold: 0.92,
            min_len: 3,
            max_uniques: 2000,
        }
    }
}

impl HarmonizeOptions {
    pub fn validate(&self) -> Result<(), SpendError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(SpendError::InvalidThreshold(self.threshold));
        }
        if self.min_len < 1 {
            return Err(SpendError::InvalidMinLength(self.min_len));
        }
        if self.max_uniques < 1 {
            return Err(SpendError::InvalidMaxUniques);
        }
        Ok(())
    }
}

/// One audit row per distinct raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub raw: String,
    pub normalized: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarmonizeStats {
    pub rows: usize,
    pub distinct: usize,
    pub clustered: usize,
    pub passed_through: usize,
    pub clusters: usize,
    pub changed_rows: usize,
}

#[derive(Debug, Clone)]
pub struct Harmonized {
    /// Canonical display string per input row.
    pub canonical: Vec<String>,
    /// Whether the row's trimmed canonical differs from its trimmed raw value.
    pub changed: Vec<bool>,
    /// Audit table sorted by (canonical, raw).
    pub mapping: Vec<MappingEntry>,
    pub stats: HarmonizeStats,
}

/// Harmonize a column of nullable strings.
pub fn harmonize<S: AsRef<str>>(
    values: &[Option<S>],
    options: &HarmonizeOptions,
) -> Result<Harmonized, SpendError> {
    options.validate()?;

    let raw: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref().map(|s| s.as_ref()).unwrap_or(""))
        .collect();
    let norm: Vec<String> = raw.iter().map(|r| normalize_text(r)).collect();

    // Distinct keys in first-seen order with their row frequency
    let mut freq: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();
    for key in &norm {
        let count = freq.entry(key.as_str()).or_insert(0);
        if *count == 0 {
            first_seen.push(key.as_str());
        }
        *count += 1;
    }

    // Stable sort keeps first-seen order among equal frequencies
    let mut uniques = first_seen;
    uniques.sort_by(|a, b| freq[b].cmp(&freq[a]));
    let distinct = uniques.len();
    if uniques.len() > options.max_uniques {
        warn!(
            "harmonize: {} distinct values exceed max_uniques={}, {} pass through unclustered",
            distinct,
            options.max_uniques,
            distinct - options.max_uniques
        );
        uniques.truncate(options.max_uniques);
    }

    let cluster_of = assign_clusters(&uniques, options);
    let cluster_count = cluster_of.iter().copied().max().map(|m| m + 1).unwrap_or(0);

    // Canonical normalized key per cluster: most frequent member, first wins
    let mut best_member: Vec<Option<usize>> = vec![None; cluster_count];
    for (idx, &cid) in cluster_of.iter().enumerate() {
        let better = match best_member[cid] {
            None => true,
            Some(cur) => freq[uniques[idx]] > freq[uniques[cur]],
        };
        if better {
            best_member[cid] = Some(idx);
        }
    }
    let canon_norm: HashMap<&str, &str> = uniques
        .iter()
        .zip(&cluster_of)
        .filter_map(|(key, &cid)| best_member[cid].map(|b| (*key, uniques[b])))
        .collect();

    // Most frequent raw spelling per canonical key, first-seen row wins ties
    let mut raw_counts: HashMap<&str, Vec<(&str, usize)>> = HashMap::new();
    for (&r, n) in raw.iter().zip(&norm) {
        if let Some(&canon) = canon_norm.get(n.as_str()) {
            let counts = raw_counts.entry(canon).or_default();
            match counts.iter_mut().find(|(s, _)| *s == r) {
                Some((_, c)) => *c += 1,
                None => counts.push((r, 1)),
            }
        }
    }
    let display: HashMap<&str, &str> = raw_counts
        .iter()
        .map(|(canon, counts)| {
            let mut best = counts[0];
            for &candidate in &counts[1..] {
                if candidate.1 > best.1 {
                    best = candidate;
                }
            }
            (*canon, best.0)
        })
        .collect();

    let mut canonical = Vec::with_capacity(raw.len());
    let mut changed = Vec::with_capacity(raw.len());
    let mut passed_rows = 0usize;
    for (&r, n) in raw.iter().zip(&norm) {
        let value = match canon_norm.get(n.as_str()) {
            Some(canon) => display.get(canon).copied().unwrap_or(r),
            None => {
                passed_rows += 1;
                r
            }
        };
        changed.push(value.trim() != r.trim());
        canonical.push(value.to_string());
    }

    let mapping = build_mapping(&raw, &norm, &canonical);
    let stats = HarmonizeStats {
        rows: raw.len(),
        distinct,
        clustered: uniques.len(),
        passed_through: distinct - uniques.len(),
        clusters: cluster_count,
        changed_rows: changed.iter().filter(|c| **c).count(),
    };
    debug!(
        "harmonize: {} rows, {} distinct, {} clusters, {} changed, {} rows passed through",
        stats.rows, stats.distinct, stats.clusters, stats.changed_rows, passed_rows
    );

    Ok(Harmonized {
        canonical,
        changed,
        mapping,
        stats,
    })
}

/// Greedy seed clustering over keys already in visiting order.
///
/// Returns the cluster id of each key. Ids are dense and increase with the
/// position of the cluster's seed.
fn assign_clusters(keys: &[&str], options: &HarmonizeOptions) -> Vec<usize> {
    let lens: Vec<usize> = keys.iter().map(|k| k.chars().count()).collect();
    let mut cluster_of: Vec<Option<usize>> = vec![None; keys.len()];
    let mut next_id = 0;

    for i in 0..keys.len() {
        if cluster_of[i].is_some() {
            continue;
        }
        let cid = next_id;
        next_id += 1;
        cluster_of[i] = Some(cid);

        // Short seeds never match anything
        if lens[i] < options.min_len {
            continue;
        }

        for j in (i + 1)..keys.len() {
            if cluster_of[j].is_some() || lens[j] < options.min_len {
                continue;
            }
            if length_bound(lens[i], lens[j]) < options.threshold {
                continue;
            }
            if ratio(keys[i], keys[j]) >= options.threshold {
                cluster_of[j] = Some(cid);
            }
        }
    }

    cluster_of.into_iter().map(|c| c.unwrap_or(0)).collect()
}

fn build_mapping(raw: &[&str], norm: &[String], canonical: &[String]) -> Vec<MappingEntry> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut mapping = Vec::new();
    for ((&r, n), c) in raw.iter().zip(norm).zip(canonical) {
        if seen.insert(r) {
            mapping.push(MappingEntry {
                raw: r.to_string(),
                normalized: n.clone(),
                canonical: c.clone(),
            });
        }
    }
    mapping.sort_by(|a, b| a.canonical.cmp(&b.canonical).then_with(|| a.raw.cmp(&b.raw)));
    mapping
}
