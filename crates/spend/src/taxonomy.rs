//! Four-level Material/Service taxonomy.
//!
//! Two seams keep the engine offline: [`TextClusterer`] groups descriptions
//! into labelled clusters for [`generate_taxonomy`], and
//! [`DescriptionClassifier`] labels one description at a time (an LLM in
//! practice) for [`classify_descriptions`]. [`KeywordClusterer`] and
//! [`HeuristicClassifier`] are the built-in deterministic implementations.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::SpendError;
use crate::normalize::{normalize_description, normalize_text};

pub const MATERIAL: &str = "Material";
pub const SERVICE: &str = "Service";
pub const OTHER: &str = "Other";

const SERVICE_HINTS: &[&str] = &[
    "service", "maintenance", "repair", "amc", "consulting", "freight", "transport",
    "security", "manpower", "audit", "legal", "software", "license", "licence",
    "subscription", "training", "calibration", "inspection", "testing", "installation",
    "support", "contract",
];

/// Shorter hint list used when a classifier reply cannot be parsed.
const FALLBACK_SERVICE_HINTS: &[&str] =
    &["service", "repair", "maintenance", "consult", "support", "license"];

/// L2 groups smaller than this keep their L2 label as L3.
const MIN_L3_GROUP: usize = 8;

/// Texts sampled per group when picking the L4 phrase.
const L4_SAMPLE: usize = 300;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "per", "the", "to", "with",
];

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyLabels {
    #[serde(rename = "L1")]
    pub l1: String,
    #[serde(rename = "L2")]
    pub l2: String,
    #[serde(rename = "L3")]
    pub l3: String,
    #[serde(rename = "L4")]
    pub l4: String,
}

impl TaxonomyLabels {
    pub fn path(&self) -> String {
        format!("{} > {} > {} > {}", self.l1, self.l2, self.l3, self.l4)
    }
}

// ---------------------------------------------------------------------------
// Heuristics
// ---------------------------------------------------------------------------

/// "Service" when the cleaned description mentions any service hint.
pub fn infer_l1(description: &str) -> &'static str {
    let text = normalize_text(description);
    if SERVICE_HINTS.iter().any(|h| text.contains(h)) {
        SERVICE
    } else {
        MATERIAL
    }
}

/// Cluster count for `n` texts: 1 for tiny inputs, else `desired` clamped
/// to `[1, n - 1]`.
pub fn safe_k(n: usize, desired: usize) -> usize {
    if n <= 2 {
        return 1;
    }
    desired.clamp(1, n - 1)
}

/// Most common 2- or 3-word phrase (at least 6 chars) across the first 300
/// texts. Ties go to the lexically smallest phrase; no phrase gives "".
pub fn l4_phrase<S: AsRef<str>>(texts: &[S]) -> String {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts.iter().take(L4_SAMPLE) {
        let tokens: Vec<&str> = text.as_ref().split_whitespace().collect();
        for n in [2, 3] {
            for window in tokens.windows(n) {
                let gram = window.join(" ");
                if gram.len() >= 6 {
                    *counts.entry(gram).or_insert(0) += 1;
                }
            }
        }
    }

    let mut best: Option<(&String, usize)> = None;
    for (gram, &count) in &counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((gram, count));
        }
    }
    best.map(|(g, _)| g.clone()).unwrap_or_default()
}

/// Labels used when nothing better is known about a description.
pub fn fallback_labels(description: &str) -> TaxonomyLabels {
    let lower = description.to_lowercase();
    let l1 = if FALLBACK_SERVICE_HINTS.iter().any(|h| lower.contains(h)) {
        SERVICE
    } else {
        MATERIAL
    };
    TaxonomyLabels {
        l1: l1.to_string(),
        l2: OTHER.to_string(),
        l3: OTHER.to_string(),
        l4: OTHER.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Cluster assignment: `assignments[i]` indexes into `labels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    pub assignments: Vec<usize>,
    pub labels: Vec<String>,
}

pub trait TextClusterer {
    /// Group `texts` into at most `k` labelled clusters.
    fn cluster(&self, texts: &[String], k: usize) -> Result<Clustering, SpendError>;
}

/// Deterministic clusterer: each of the `k - 1` most widespread keywords
/// anchors a cluster; a text joins the first anchor it contains, the rest
/// fall into "other". Keywords found in every text do not discriminate and
/// never anchor.
#[derive(Debug, Clone, Default)]
pub struct KeywordClusterer;

impl TextClusterer for KeywordClusterer {
    fn cluster(&self, texts: &[String], k: usize) -> Result<Clustering, SpendError> {
        let k = k.max(1);

        // Document frequency per keyword
        let mut df: HashMap<&str, usize> = HashMap::new();
        for text in texts {
            let mut seen: Vec<&str> = Vec::new();
            for token in text.split_whitespace() {
                if is_keyword(token) && !seen.contains(&token) {
                    seen.push(token);
                    *df.entry(token).or_insert(0) += 1;
                }
            }
        }
        let mut ranked: Vec<(&str, usize)> = df
            .into_iter()
            .filter(|(_, n)| texts.len() < 2 || *n < texts.len())
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let anchors: Vec<&str> = ranked.iter().take(k - 1).map(|(t, _)| *t).collect();

        let mut raw_ids = Vec::with_capacity(texts.len());
        for text in texts {
            let tokens: Vec<&str> = text.split_whitespace().collect();
            let id = anchors
                .iter()
                .position(|a| tokens.contains(a))
                .unwrap_or(anchors.len());
            raw_ids.push(id);
        }

        // Compact to the clusters that actually received texts
        let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
        for &id in &raw_ids {
            remap.insert(id, 0);
        }
        let mut labels = Vec::with_capacity(remap.len());
        for (dense, (id, slot)) in remap.iter_mut().enumerate() {
            *slot = dense;
            labels.push(anchors.get(*id).map_or("other", |a| *a).to_string());
        }
        let assignments = raw_ids.iter().map(|id| remap[id]).collect();

        Ok(Clustering {
            assignments,
            labels,
        })
    }
}

fn is_keyword(token: &str) -> bool {
    token.len() >= 3
        && !token.chars().all(|c| c.is_ascii_digit())
        && !STOP_WORDS.contains(&token)
}

fn checked_cluster(
    clusterer: &dyn TextClusterer,
    texts: &[String],
    k: usize,
) -> Result<Clustering, SpendError> {
    let c = clusterer.cluster(texts, k)?;
    if c.assignments.len() != texts.len() {
        return Err(SpendError::LengthMismatch {
            expected: texts.len(),
            found: c.assignments.len(),
        });
    }
    if let Some(bad) = c.assignments.iter().find(|&&id| id >= c.labels.len()) {
        return Err(SpendError::Classifier(format!(
            "cluster id {bad} has no label ({} labels)",
            c.labels.len()
        )));
    }
    Ok(c)
}

/// Build L1-L4 labels for every description.
///
/// L1 splits Material from Service. Within each L1, texts are clustered into
/// `l2` groups; L2 groups of at least 8 rows are clustered again into `l3`
/// groups (smaller ones reuse the L2 label). L4 is the dominant phrase of each
/// (L2, L3) group, or the L3 label when there is none.
pub fn generate_taxonomy<S: AsRef<str>>(
    descriptions: &[Option<S>],
    clusterer: &dyn TextClusterer,
    l2: usize,
    l3: usize,
) -> Result<Vec<TaxonomyLabels>, SpendError> {
    let texts: Vec<String> = descriptions
        .iter()
        .map(|d| normalize_text(d.as_ref().map_or("", |s| s.as_ref())))
        .collect();
    let l1: Vec<&'static str> = descriptions
        .iter()
        .map(|d| infer_l1(d.as_ref().map_or("", |s| s.as_ref())))
        .collect();

    let mut out: Vec<Option<TaxonomyLabels>> = vec![None; texts.len()];

    for l1_name in [MATERIAL, SERVICE] {
        let rows: Vec<usize> = (0..texts.len()).filter(|&i| l1[i] == l1_name).collect();
        if rows.is_empty() {
            continue;
        }
        let sub: Vec<String> = rows.iter().map(|&i| texts[i].clone()).collect();
        let level2 = checked_cluster(clusterer, &sub, safe_k(sub.len(), l2))?;

        let mut l3_label: Vec<String> = vec![String::new(); rows.len()];
        for cid in 0..level2.labels.len() {
            let members: Vec<usize> = (0..rows.len())
                .filter(|&p| level2.assignments[p] == cid)
                .collect();
            if members.len() < MIN_L3_GROUP {
                for &p in &members {
                    l3_label[p] = level2.labels[cid].clone();
                }
                continue;
            }
            let member_texts: Vec<String> = members.iter().map(|&p| sub[p].clone()).collect();
            let level3 =
                checked_cluster(clusterer, &member_texts, safe_k(member_texts.len(), l3))?;
            for (m, &p) in members.iter().enumerate() {
                l3_label[p] = level3.labels[level3.assignments[m]].clone();
            }
        }

        // L4 per (L2, L3) label pair
        let mut groups: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
        for p in 0..rows.len() {
            groups
                .entry((level2.labels[level2.assignments[p]].as_str(), l3_label[p].as_str()))
                .or_default()
                .push(sub[p].as_str());
        }
        let l4_of: BTreeMap<(&str, &str), String> = groups
            .iter()
            .map(|(&(l2_lbl, l3_lbl), texts)| {
                let phrase = l4_phrase(texts.as_slice());
                let l4 = if phrase.is_empty() { l3_lbl.to_string() } else { phrase };
                ((l2_lbl, l3_lbl), l4)
            })
            .collect();

        for (p, &row) in rows.iter().enumerate() {
            let l2_lbl = level2.labels[level2.assignments[p]].as_str();
            let l3_lbl = l3_label[p].as_str();
            out[row] = Some(TaxonomyLabels {
                l1: l1_name.to_string(),
                l2: l2_lbl.to_string(),
                l3: l3_lbl.to_string(),
                l4: l4_of
                    .get(&(l2_lbl, l3_lbl))
                    .cloned()
                    .unwrap_or_else(|| l3_lbl.to_string()),
            });
        }
        debug!(
            "taxonomy: {} {} rows in {} L2 groups",
            rows.len(),
            l1_name,
            level2.labels.len()
        );
    }

    Ok(out
        .into_iter()
        .zip(descriptions)
        .map(|(labels, d)| {
            labels.unwrap_or_else(|| fallback_labels(d.as_ref().map_or("", |s| s.as_ref())))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Per-description classification
// ---------------------------------------------------------------------------

pub trait DescriptionClassifier {
    fn classify(&self, description: &str) -> Result<TaxonomyLabels, SpendError>;
}

/// Offline classifier: L1 from keyword hints, the other levels "Other".
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier;

impl DescriptionClassifier for HeuristicClassifier {
    fn classify(&self, description: &str) -> Result<TaxonomyLabels, SpendError> {
        Ok(TaxonomyLabels {
            l1: infer_l1(description).to_string(),
            ..fallback_labels(description)
        })
    }
}

/// Parse a classifier reply of the form `{"L1": .., "L2": .., "L3": .., "L4": ..}`.
/// Anything else yields [`fallback_labels`] for the description.
pub fn parse_classification(reply: &str, description: &str) -> TaxonomyLabels {
    match serde_json::from_str::<TaxonomyLabels>(reply.trim()) {
        Ok(labels) => TaxonomyLabels {
            l1: clean_label(labels.l1),
            l2: clean_label(labels.l2),
            l3: clean_label(labels.l3),
            l4: clean_label(labels.l4),
        },
        Err(e) => {
            debug!("taxonomy: unparseable classifier reply ({e}), using fallback");
            fallback_labels(description)
        }
    }
}

fn clean_label(label: String) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        OTHER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Classify every row, calling the classifier once per distinct cleaned
/// description. Empty descriptions and classifier failures get fallback labels.
pub fn classify_descriptions<S: AsRef<str>>(
    descriptions: &[Option<S>],
    classifier: &dyn DescriptionClassifier,
) -> Vec<TaxonomyLabels> {
    let mut cache: HashMap<String, TaxonomyLabels> = HashMap::new();
    let mut failures = 0usize;

    let labels = descriptions
        .iter()
        .map(|d| {
            let key = normalize_description(d.as_ref().map_or("", |s| s.as_ref()));
            if key.is_empty() {
                return fallback_labels("");
            }
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
            let labels = match classifier.classify(&key) {
                Ok(labels) => labels,
                Err(e) => {
                    failures += 1;
                    warn!("taxonomy: classifier failed for '{key}': {e}");
                    fallback_labels(&key)
                }
            };
            cache.insert(key, labels.clone());
            labels
        })
        .collect();

    debug!(
        "taxonomy: {} rows, {} distinct descriptions, {} classifier failures",
        descriptions.len(),
        cache.len(),
        failures
    );
    labels
}
