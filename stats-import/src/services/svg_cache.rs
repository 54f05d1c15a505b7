//! Statistical variable group cache
//!
//! Browsing clients read the whole group tree in one lookup. The tree is
//! built from the group and variable triples in the store, serialized as
//! JSON, base64 encoded and stored under [`SVG_CACHE_KEY`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;

use stats_common::db::Store;
use stats_common::{Result, Triple};

use crate::services::hierarchy::SpecializedNames;
use crate::vocab::*;

/// Key of the cache entry in the key/value store
pub const SVG_CACHE_KEY: &str = "StatVarGroups";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildStatVar {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildStatVarGroup {
    pub id: String,
    pub specialized_entity: String,
    pub descendent_stat_var_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatVarGroupNode {
    pub absolute_name: String,
    pub child_stat_vars: Vec<ChildStatVar>,
    pub child_stat_var_groups: Vec<ChildStatVarGroup>,
    pub descendent_stat_var_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatVarGroups {
    pub stat_var_groups: BTreeMap<String, StatVarGroupNode>,
}

impl StatVarGroups {
    /// Base64 of the JSON form
    pub fn encode(&self) -> Result<String> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }
}

/// Build the cache from the store and write it back as a key/value entry
pub async fn generate_svg_cache(
    store: &dyn Store,
    specialized_names: &SpecializedNames,
) -> Result<StatVarGroups> {
    let svg_triples = store.select_triples_by_subject_type(TYPE_STAT_VAR_GROUP).await?;
    let sv_triples = store
        .select_triples_by_subject_type(TYPE_STATISTICAL_VARIABLE)
        .await?;

    let cache = build(&svg_triples, &sv_triples, specialized_names);
    info!(
        "Writing SVG cache with {} groups",
        cache.stat_var_groups.len()
    );
    store.insert_key_value(SVG_CACHE_KEY, &cache.encode()?).await?;
    Ok(cache)
}

/// Assemble the group tree from group and variable triples
pub fn build(
    svg_triples: &[Triple],
    sv_triples: &[Triple],
    specialized_names: &SpecializedNames,
) -> StatVarGroups {
    let mut group_names: BTreeMap<&str, &str> = BTreeMap::new();
    let mut child_groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for triple in svg_triples {
        let subject = triple.subject_id();
        match triple.predicate() {
            NAME => {
                if let Some(name) = triple.object_value() {
                    group_names.insert(subject, name);
                }
            }
            SPECIALIZATION_OF => {
                if let Some(parent) = triple.object_id() {
                    child_groups.entry(parent).or_default().insert(subject);
                }
            }
            TYPE_OF => {
                group_names.entry(subject).or_insert(subject);
            }
            _ => {}
        }
    }

    let mut sv_names: BTreeMap<&str, &str> = BTreeMap::new();
    let mut child_svs: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for triple in sv_triples {
        let subject = triple.subject_id();
        match triple.predicate() {
            NAME => {
                if let Some(name) = triple.object_value() {
                    sv_names.insert(subject, name);
                }
            }
            MEMBER_OF => {
                if let Some(group) = triple.object_id() {
                    child_svs.entry(group).or_default().insert(subject);
                }
            }
            _ => {}
        }
    }

    let mut descendants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for group in group_names.keys() {
        collect_descendants(group, &child_groups, &child_svs, &mut descendants, &mut HashSet::new());
    }
    let count = |group: &str| descendants.get(group).map_or(0, BTreeSet::len);

    let stat_var_groups = group_names
        .iter()
        .map(|(&id, &absolute_name)| {
            let child_stat_vars = child_svs
                .get(id)
                .into_iter()
                .flatten()
                .map(|&sv| ChildStatVar {
                    id: sv.to_string(),
                    name: sv_names.get(sv).copied().unwrap_or(sv).to_string(),
                })
                .collect();
            let child_stat_var_groups = child_groups
                .get(id)
                .into_iter()
                .flatten()
                .map(|&child| ChildStatVarGroup {
                    id: child.to_string(),
                    specialized_entity: specialized_names
                        .get(id)
                        .and_then(|names| names.get(child))
                        .map(String::as_str)
                        .or_else(|| group_names.get(child).copied())
                        .unwrap_or(child)
                        .to_string(),
                    descendent_stat_var_count: count(child),
                })
                .collect();
            let node = StatVarGroupNode {
                absolute_name: absolute_name.to_string(),
                child_stat_vars,
                child_stat_var_groups,
                descendent_stat_var_count: count(id),
            };
            (id.to_string(), node)
        })
        .collect();

    StatVarGroups { stat_var_groups }
}

/// Unique variables at or below a group, memoized per group
fn collect_descendants(
    group: &str,
    child_groups: &BTreeMap<&str, BTreeSet<&str>>,
    child_svs: &BTreeMap<&str, BTreeSet<&str>>,
    memo: &mut BTreeMap<String, BTreeSet<String>>,
    visiting: &mut HashSet<String>,
) -> BTreeSet<String> {
    if let Some(known) = memo.get(group) {
        return known.clone();
    }
    // Cycle guard; a group reached again on the current path adds nothing.
    if !visiting.insert(group.to_string()) {
        return BTreeSet::new();
    }

    let mut svs: BTreeSet<String> = child_svs
        .get(group)
        .into_iter()
        .flatten()
        .map(|sv| sv.to_string())
        .collect();
    for child in child_groups.get(group).into_iter().flatten() {
        svs.extend(collect_descendants(child, child_groups, child_svs, memo, visiting));
    }

    visiting.remove(group);
    memo.insert(group.to_string(), svs.clone());
    svs
}
