//! Node registry for one import run
//!
//! Collects schema nodes (variables, groups, sources, provenances, event and
//! entity types) as importers first reference them and assigns their ids.
//! Generic nodes asserted by importers are merged by subject id, so two files
//! describing the same node add to it rather than replace it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use stats_common::{Result, Triple};

use crate::config::Config;
use crate::models::{EntityType, EventType, Provenance, StatVar};
use crate::vocab::*;

#[derive(Debug, Clone)]
struct Group {
    id: String,
    name: String,
    parent_id: String,
}

/// Registry of nodes referenced during a run
pub struct Nodes {
    config: Arc<Config>,
    /// Variable key (column name or dcid) -> descriptor with id assigned
    variables: BTreeMap<String, StatVar>,
    /// Group path -> group
    groups: BTreeMap<String, Group>,
    /// Source name -> id
    sources: BTreeMap<String, String>,
    /// Provenance name -> (id, provenance)
    provenances: BTreeMap<String, (String, Provenance)>,
    event_types: BTreeMap<String, EventType>,
    entity_types: BTreeMap<String, EntityType>,
    /// Subject id -> asserted triples
    nodes: BTreeMap<String, BTreeSet<Triple>>,
}

impl Nodes {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            variables: BTreeMap::new(),
            groups: BTreeMap::new(),
            sources: BTreeMap::new(),
            provenances: BTreeMap::new(),
            event_types: BTreeMap::new(),
            entity_types: BTreeMap::new(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Variable for a column name, registering it on first use
    ///
    /// New variables get `custom/statvar_<n>` ids in first-use order.
    pub fn variable(&mut self, name: &str) -> StatVar {
        if let Some(sv) = self.variables.get(name) {
            return sv.clone();
        }
        let id = format!("{}{}", STAT_VAR_ID_PREFIX, self.variables.len() + 1);
        self.register_variable(name, id)
    }

    /// Variable with a caller-chosen dcid (e.g. event count variables)
    pub fn variable_with_id(&mut self, name: &str, id: &str) -> StatVar {
        if let Some(sv) = self.variables.get(name) {
            return sv.clone();
        }
        self.register_variable(name, id.to_string())
    }

    fn register_variable(&mut self, name: &str, id: String) -> StatVar {
        let mut sv = self.config.variable(name);
        sv.id = id;
        sv.group_path = normalize_group_path(&sv.group_path);
        if !sv.group_path.is_empty() {
            self.group(&sv.group_path.clone());
        }
        self.variables.insert(name.to_string(), sv.clone());
        sv
    }

    /// Group id for a slash-delimited path, registering every ancestor
    pub fn group(&mut self, path: &str) -> String {
        let mut parent_id = ROOT_GROUP_ID.to_string();
        let mut current_path = String::new();
        for part in normalize_group_path(path).split('/').filter(|p| !p.is_empty()) {
            if !current_path.is_empty() {
                current_path.push('/');
            }
            current_path.push_str(part);

            let next_index = self.groups.len() + 1;
            let group = self
                .groups
                .entry(current_path.clone())
                .or_insert_with(|| Group {
                    id: format!("{}{}", GROUP_ID_PREFIX, next_index),
                    name: part.to_string(),
                    parent_id: parent_id.clone(),
                });
            parent_id = group.id.clone();
        }
        parent_id
    }

    /// Provenance id for a provenance name, registering it and its source
    pub fn provenance(&mut self, name: &str) -> String {
        if let Some((id, _)) = self.provenances.get(name) {
            return id.clone();
        }
        let provenance = self.config.provenance(name);
        let next_source = self.sources.len() + 1;
        self.sources
            .entry(provenance.source.name.clone())
            .or_insert_with(|| format!("{}{}", SOURCE_ID_PREFIX, next_source));

        let id = format!("{}{}", PROVENANCE_ID_PREFIX, self.provenances.len() + 1);
        self.provenances
            .insert(name.to_string(), (id.clone(), provenance));
        id
    }

    /// Event type id (the type's own name), registering it on first use
    pub fn event_type(&mut self, name: &str) -> String {
        let config = &self.config;
        self.event_types
            .entry(name.to_string())
            .or_insert_with(|| EventType {
                id: name.to_string(),
                ..config.event(name)
            })
            .id
            .clone()
    }

    /// Entity type id (the type's own name), registering it on first use
    pub fn entity_type(&mut self, name: &str) -> String {
        let config = &self.config;
        self.entity_types
            .entry(name.to_string())
            .or_insert_with(|| EntityType {
                id: name.to_string(),
                ..config.entity(name)
            })
            .id
            .clone()
    }

    /// Assert a triple about a generic node
    pub fn add_triple(&mut self, triple: Triple) {
        self.nodes
            .entry(triple.subject_id().to_string())
            .or_default()
            .insert(triple);
    }

    pub fn add_triples(&mut self, triples: impl IntoIterator<Item = Triple>) {
        for triple in triples {
            self.add_triple(triple);
        }
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Every triple for every registered node, sorted and deduplicated
    pub fn triples(&self) -> Result<Vec<Triple>> {
        let mut triples = BTreeSet::new();

        for sv in self.variables.values() {
            triples.insert(Triple::with_id(&sv.id, TYPE_OF, TYPE_STATISTICAL_VARIABLE)?);
            triples.insert(Triple::with_value(&sv.id, NAME, &sv.name)?);
            if !sv.description.is_empty() {
                triples.insert(Triple::with_value(&sv.id, DESCRIPTION, &sv.description)?);
            }
            for sentence in &sv.search_descriptions {
                triples.insert(Triple::with_value(&sv.id, SEARCH_DESCRIPTION, sentence)?);
            }
            if let Some(group) = self.groups.get(&sv.group_path) {
                triples.insert(Triple::with_id(&sv.id, MEMBER_OF, &group.id)?);
            }
            for (property, value) in &sv.properties {
                triples.insert(Triple::with_id(&sv.id, property, value)?);
            }
        }

        if !self.groups.is_empty() {
            triples.insert(Triple::with_id(ROOT_GROUP_ID, TYPE_OF, TYPE_STAT_VAR_GROUP)?);
            triples.insert(Triple::with_value(ROOT_GROUP_ID, NAME, ROOT_GROUP_NAME)?);
            triples.insert(Triple::with_id(ROOT_GROUP_ID, SPECIALIZATION_OF, DC_ROOT_GROUP_ID)?);
        }
        for group in self.groups.values() {
            triples.insert(Triple::with_id(&group.id, TYPE_OF, TYPE_STAT_VAR_GROUP)?);
            triples.insert(Triple::with_value(&group.id, NAME, &group.name)?);
            triples.insert(Triple::with_id(&group.id, SPECIALIZATION_OF, &group.parent_id)?);
        }

        for (source_name, source_id) in &self.sources {
            triples.insert(Triple::with_id(source_id, TYPE_OF, TYPE_SOURCE)?);
            triples.insert(Triple::with_value(source_id, NAME, source_name)?);
        }
        for (provenance_id, provenance) in self.provenances.values() {
            triples.insert(Triple::with_id(provenance_id, TYPE_OF, TYPE_PROVENANCE)?);
            triples.insert(Triple::with_value(provenance_id, NAME, &provenance.name)?);
            if !provenance.url.is_empty() {
                triples.insert(Triple::with_value(provenance_id, URL, &provenance.url)?);
            }
            if let Some(source_id) = self.sources.get(&provenance.source.name) {
                triples.insert(Triple::with_id(provenance_id, SOURCE, source_id)?);
                if !provenance.source.url.is_empty() {
                    triples.insert(Triple::with_value(source_id, URL, &provenance.source.url)?);
                }
            }
        }

        for event_type in self.event_types.values() {
            triples.insert(Triple::with_id(&event_type.id, TYPE_OF, TYPE_CLASS)?);
            triples.insert(Triple::with_value(&event_type.id, NAME, &event_type.name)?);
            triples.insert(Triple::with_id(&event_type.id, SUB_CLASS_OF, TYPE_EVENT)?);
            if !event_type.description.is_empty() {
                triples.insert(Triple::with_value(
                    &event_type.id,
                    DESCRIPTION,
                    &event_type.description,
                )?);
            }
        }

        for entity_type in self.entity_types.values() {
            triples.insert(Triple::with_id(&entity_type.id, TYPE_OF, TYPE_CLASS)?);
            triples.insert(Triple::with_value(&entity_type.id, NAME, &entity_type.name)?);
            if !entity_type.description.is_empty() {
                triples.insert(Triple::with_value(
                    &entity_type.id,
                    DESCRIPTION,
                    &entity_type.description,
                )?);
            }
        }

        for node_triples in self.nodes.values() {
            triples.extend(node_triples.iter().cloned());
        }

        Ok(triples.into_iter().collect())
    }
}

fn normalize_group_path(path: &str) -> String {
    path.split('/')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
