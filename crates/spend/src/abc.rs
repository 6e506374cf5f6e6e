//! ABC spend classification.
//!
//! Groups are ranked by total spend (descending, ties by key ascending with
//! the null key first). Each group's cumulative share of the grand total
//! decides its bucket: `<= a_cut` is A, `<= b_cut` is B, anything above is C.
//!
//! Missing spend policy: null, NaN and infinite amounts are excluded from both
//! the group sums and the grand total. Rows carrying them still inherit their
//! group's class.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SpendError;

/// Shares within this distance of a cutoff count as inside it.
const SHARE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AbcClass {
    A,
    B,
    C,
}

impl std::fmt::Display for AbcClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbcCutoffs {
    #[serde(default = "default_a_cut")]
    pub a_cut: f64,
    #[serde(default = "default_b_cut")]
    pub b_cut: f64,
}

fn default_a_cut() -> f64 {
    0.80
}

fn default_b_cut() -> f64 {
    0.95
}

impl Default for AbcCutoffs {
    fn default() -> Self {
        Self {
            a_cut: default_a_cut(),
            b_cut: default_b_cut(),
        }
    }
}

impl AbcCutoffs {
    pub fn validate(&self) -> Result<(), SpendError> {
        let ok = self.a_cut > 0.0 && self.a_cut < self.b_cut && self.b_cut <= 1.0;
        if !ok {
            return Err(SpendError::InvalidCutoffs {
                a_cut: self.a_cut,
                b_cut: self.b_cut,
            });
        }
        Ok(())
    }

    fn bucket(&self, share: f64) -> AbcClass {
        if share <= self.a_cut + SHARE_EPSILON {
            AbcClass::A
        } else if share <= self.b_cut + SHARE_EPSILON {
            AbcClass::B
        } else {
            AbcClass::C
        }
    }
}

/// One ranked spend group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendGroup {
    pub key: Option<String>,
    pub total: f64,
    pub rows: usize,
    pub share: f64,
    pub cumulative_share: f64,
    pub class: AbcClass,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassTotals {
    pub groups: usize,
    pub rows: usize,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbcResult {
    /// Class per input row, aligned to the input.
    pub classes: Vec<AbcClass>,
    /// Groups in ranking order.
    pub groups: Vec<SpendGroup>,
    pub total: f64,
    pub by_class: BTreeMap<AbcClass, ClassTotals>,
}

/// Classify rows of (group key, spend) into A/B/C buckets.
pub fn classify_abc<K: AsRef<str>>(
    rows: &[(Option<K>, Option<f64>)],
    cutoffs: &AbcCutoffs,
) -> Result<AbcResult, SpendError> {
    cutoffs.validate()?;

    // Aggregate: key -> (total, row count)
    let mut sums: BTreeMap<Option<&str>, (f64, usize)> = BTreeMap::new();
    for (key, spend) in rows {
        let entry = sums.entry(key.as_ref().map(|k| k.as_ref())).or_insert((0.0, 0));
        if let Some(v) = spend.filter(|v| v.is_finite()) {
            entry.0 += v;
        }
        entry.1 += 1;
    }

    // BTreeMap iteration is key-ascending, so a stable sort by total keeps
    // key order among ties.
    let mut ranked: Vec<(Option<&str>, f64, usize)> =
        sums.into_iter().map(|(k, (t, n))| (k, t, n)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total: f64 = ranked.iter().map(|g| g.1).sum();
    let degenerate = total <= 0.0;

    let mut groups = Vec::with_capacity(ranked.len());
    let mut running = 0.0;
    for (key, group_total, count) in ranked {
        running += group_total;
        let (share, cumulative_share, class) = if degenerate {
            (0.0, 0.0, AbcClass::C)
        } else {
            let cumulative = running / total;
            (group_total / total, cumulative, cutoffs.bucket(cumulative))
        };
        groups.push(SpendGroup {
            key: key.map(str::to_string),
            total: group_total,
            rows: count,
            share,
            cumulative_share,
            class,
        });
    }

    let class_of: BTreeMap<Option<&str>, AbcClass> = groups
        .iter()
        .map(|g| (g.key.as_deref(), g.class))
        .collect();
    let classes: Vec<AbcClass> = rows
        .iter()
        .map(|(key, _)| {
            class_of
                .get(&key.as_ref().map(|k| k.as_ref()))
                .copied()
                .unwrap_or(AbcClass::C)
        })
        .collect();

    let mut by_class: BTreeMap<AbcClass, ClassTotals> = BTreeMap::new();
    for class in [AbcClass::A, AbcClass::B, AbcClass::C] {
        by_class.insert(class, ClassTotals::default());
    }
    for g in &groups {
        if let Some(t) = by_class.get_mut(&g.class) {
            t.groups += 1;
            t.rows += g.rows;
            t.spend += g.total;
        }
    }

    debug!(
        "abc: {} rows in {} groups, total spend {:.2}{}",
        rows.len(),
        groups.len(),
        total,
        if degenerate { " (degenerate, all C)" } else { "" }
    );

    Ok(AbcResult {
        classes,
        groups,
        total,
        by_class,
    })
}
