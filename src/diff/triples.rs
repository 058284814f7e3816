//! Triple-level diff
//!
//! A second, coarser notion of difference computed over flattened RDF
//! statements rather than over signatures.

use crate::rdf::Triple;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Which part of a triple changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Predicate,
    Object,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Predicate => write!(f, "predicate"),
            Change::Object => write!(f, "object"),
        }
    }
}

/// An original triple paired with its counterpart under the same subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifiedTriple {
    pub original: Triple,
    pub modified: Triple,
    pub changes: Vec<Change>,
}

/// Classification of two triple sets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripleDiff {
    pub unchanged: Vec<Triple>,
    pub modified: Vec<ModifiedTriple>,
    pub added: Vec<Triple>,
    pub removed: Vec<Triple>,
    /// `(unchanged + 0.5 * modified) / |original|`, or 0.0 for an empty original
    pub similarity_score: f64,
}

/// Ordered (predicate, object) pairs per subject
fn group_by_subject(triples: &[Triple]) -> HashMap<&str, Vec<(&str, &str)>> {
    let mut grouped: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for triple in triples {
        grouped
            .entry(triple.subject.as_str())
            .or_default()
            .push((triple.predicate.as_str(), triple.object.as_str()));
    }
    grouped
}

/// Classify every triple of `original` and `modified`
///
/// A changed triple is paired with the first pair listed for its subject in
/// `modified`, not with the closest one.
pub fn analyze_semantic_differences(original: &[Triple], modified: &[Triple]) -> TripleDiff {
    let original_by_subject = group_by_subject(original);
    let modified_by_subject = group_by_subject(modified);

    let mut unchanged = Vec::new();
    let mut changed = Vec::new();
    let mut removed = Vec::new();

    for triple in original {
        let Some(pairs) = modified_by_subject.get(triple.subject.as_str()) else {
            removed.push(triple.clone());
            continue;
        };

        let pair = (triple.predicate.as_str(), triple.object.as_str());
        if pairs.contains(&pair) {
            unchanged.push(triple.clone());
            continue;
        }

        if let Some((predicate, object)) = pairs.first() {
            let mut changes = Vec::new();
            if triple.predicate != *predicate {
                changes.push(Change::Predicate);
            }
            if triple.object != *object {
                changes.push(Change::Object);
            }
            changed.push(ModifiedTriple {
                original: triple.clone(),
                modified: Triple::new(&triple.subject, predicate, object),
                changes,
            });
        }
    }

    let mut added = Vec::new();
    for triple in modified {
        match original_by_subject.get(triple.subject.as_str()) {
            None => added.push(triple.clone()),
            Some(pairs) => {
                let pair = (triple.predicate.as_str(), triple.object.as_str());
                let is_modification = changed.iter().any(|m| &m.modified == triple);
                if !pairs.contains(&pair) && !is_modification {
                    added.push(triple.clone());
                }
            }
        }
    }

    let similarity_score = if original.is_empty() {
        0.0
    } else {
        (unchanged.len() as f64 + 0.5 * changed.len() as f64) / original.len() as f64
    };

    TripleDiff {
        unchanged,
        modified: changed,
        added,
        removed,
        similarity_score,
    }
}
