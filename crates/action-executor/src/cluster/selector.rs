//! Label selector matching and owner tie-breaking.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use tracing::warn;

use crate::config::OwnerResolution;

/// Whether every `selector` entry is present in `labels` with an equal value.
///
/// This is the equality-based selector used by replication controllers.
#[must_use]
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key).is_some_and(|label| label == value))
}

/// Set-based selector used by replica sets and deployments
#[must_use]
pub fn label_selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .as_ref()
        .is_none_or(|match_labels| selector_matches(match_labels, labels));

    labels_match
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|requirement| requirement_matches(requirement, labels))
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let value = labels.get(&requirement.key);
    let values = requirement.values.as_deref().unwrap_or_default();

    match requirement.operator.as_str() {
        "In" => value.is_some_and(|v| values.contains(v)),
        "NotIn" => value.is_none_or(|v| !values.contains(v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

/// Pick one of several selector matches.
///
/// Candidates are ordered by name so the choice does not depend on list order. With
/// [`OwnerResolution::RejectAmbiguous`] more than one candidate is an error carrying
/// the sorted candidate names.
pub fn pick_by_name<T>(
    mut candidates: Vec<T>,
    name_of: impl Fn(&T) -> String,
    policy: OwnerResolution,
) -> Result<Option<T>, Vec<String>> {
    candidates.sort_by_key(|candidate| name_of(candidate));

    if candidates.len() > 1 {
        let names: Vec<String> = candidates.iter().map(&name_of).collect();
        if policy == OwnerResolution::RejectAmbiguous {
            return Err(names);
        }
        warn!(
            candidates = ?names,
            chosen = %names[0],
            "Several controllers match the pod labels, choosing the first by name"
        );
    }

    Ok(candidates.into_iter().next())
}
