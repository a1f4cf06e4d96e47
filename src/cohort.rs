//! Cohort assignment
//!
//! Subject folders are named `<Cohort>_<Index>`. The cohort label is the part
//! before the first underscore, lower-cased. With fuzzy matching enabled,
//! near-duplicate spellings ("caffeine" / "Caffiene") collapse onto one label.

use crate::types::{Cohort, RawRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Labels scoring strictly above this similarity are merged
pub const FUZZY_THRESHOLD: u8 = 85;

/// Base label -> canonical label
pub type GroupMap = BTreeMap<String, String>;

/// Cohort label encoded in a subject folder name
pub fn base_label(folder_name: &str) -> String {
    folder_name
        .split('_')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Cohort label for a subject folder, honoring the fuzzy group map when enabled
pub fn assign_label(folder_name: &str, fuzzy: bool, group_map: Option<&GroupMap>) -> String {
    let base = base_label(folder_name);
    match group_map {
        Some(map) if fuzzy => map.get(&base).cloned().unwrap_or(base),
        _ => base,
    }
}

/// Build the fuzzy group map for a set of subject folder names.
///
/// Greedy single pass over the unique labels in ascending order: each unvisited
/// label claims every unvisited label similar to it, and the group is named after
/// its most frequent member (earliest label on ties). Similarity is not
/// transitive, so the result depends on this visiting order.
pub fn build_group_map<S: AsRef<str>>(folder_names: &[S]) -> GroupMap {
    let raw: Vec<String> = folder_names
        .iter()
        .map(|name| base_label(name.as_ref()))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in &raw {
        *counts.entry(label.as_str()).or_insert(0) += 1;
    }
    let unique: BTreeSet<&str> = raw.iter().map(String::as_str).collect();

    let mut group_map = GroupMap::new();
    let mut matched: HashSet<&str> = HashSet::new();

    for &label in &unique {
        if matched.contains(label) {
            continue;
        }

        let similar: Vec<&str> = unique
            .iter()
            .copied()
            .filter(|other| !matched.contains(other))
            .filter(|other| token_sort_ratio(label, other) > FUZZY_THRESHOLD)
            .collect();

        if similar.is_empty() {
            group_map.insert(label.to_string(), label.to_string());
            continue;
        }

        let mut canonical = similar[0];
        for &candidate in &similar[1..] {
            if counts[candidate] > counts[canonical] {
                canonical = candidate;
            }
        }

        for &member in &similar {
            if member != canonical {
                debug!(member, canonical, "merging similar cohort labels");
            }
            group_map.insert(member.to_string(), canonical.to_string());
            matched.insert(member);
        }
    }

    group_map
}

/// Group records into cohorts, in order of each label's first appearance
pub fn group_records(
    records: Vec<RawRecord>,
    fuzzy: bool,
    group_map: Option<&GroupMap>,
) -> Vec<Cohort> {
    let mut cohorts: Vec<Cohort> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let label = assign_label(&record.subject, fuzzy, group_map);
        match index.get(&label) {
            Some(&i) => cohorts[i].records.push(record),
            None => {
                index.insert(label.clone(), cohorts.len());
                cohorts.push(Cohort {
                    label,
                    records: vec![record],
                });
            }
        }
    }

    cohorts
}

/// Word-order independent similarity score in `0..=100`
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    similarity_ratio(&token_sort_key(a), &token_sort_key(b))
}

/// Lower-case, strip punctuation, and sort whitespace-separated tokens
fn token_sort_key(value: &str) -> String {
    let cleaned: String = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// `2 * LCS / (len_a + len_b)` scaled to a rounded percentage
fn similarity_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let common = longest_common_subsequence(&a, &b);
    let ratio = 2.0 * common as f64 / (a.len() + b.len()) as f64;
    (ratio * 100.0).round() as u8
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
