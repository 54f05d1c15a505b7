//! Statistical variable hierarchy generator
//!
//! Groups variables by population type and constraint properties:
//!
//! ```text
//! c/g/Root
//! └── c/g/Person                          (population type, or under its verticals)
//!     └── c/g/Person_gender               (property)
//!         └── c/g/Person_gender-Female    (property value)
//!             └── c/g/Person_age-Years20To30_gender-Female
//! ```
//!
//! A variable constrained on several properties belongs to the value group
//! for its full constraint set. That group specializes every group with one
//! constraint fewer, so the result is a DAG rather than a tree.
//!
//! Output depends only on the set of input triples: everything is keyed and
//! emitted through sorted maps.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use stats_common::{Error, Result, Triple};

use crate::models::VerticalSpec;
use crate::vocab::*;

/// Parent group id -> child id -> name shown under that parent
pub type SpecializedNames = BTreeMap<String, BTreeMap<String, String>>;

/// Predicates that never define a group
const EXCLUDED_PROPERTIES: &[&str] = &[
    DCID,
    TYPE_OF,
    NAME,
    DESCRIPTION,
    SEARCH_DESCRIPTION,
    MEMBER_OF,
    POPULATION_TYPE,
    MEASURED_PROPERTY,
    STAT_TYPE,
    "alternateName",
    "constraintProperties",
    "measurementDenominator",
    "measurementMethod",
    "measurementQualifier",
    "observationPeriod",
    "relevantVariable",
    "scalingFactor",
    "unit",
];

#[derive(Debug, Default)]
pub struct HierarchyResult {
    pub svg_triples: Vec<Triple>,
    pub svg_specialized_names: SpecializedNames,
}

#[derive(Deserialize)]
struct VerticalSpecsDocument {
    #[serde(default)]
    specs: Vec<VerticalSpec>,
}

/// Parse a vertical specs file: `{"specs": [{"populationType", "verticals"}]}`
pub fn load_vertical_specs(json: &str) -> Result<Vec<VerticalSpec>> {
    let document: VerticalSpecsDocument = serde_json::from_str(json)
        .map_err(|e| Error::Config(format!("Invalid vertical specs: {}", e)))?;
    Ok(document.specs)
}

/// Every dcid whose display name can appear in a generated group name
pub fn schema_dcids(triples: &[Triple], vertical_specs: &[VerticalSpec]) -> Vec<String> {
    let mut dcids = BTreeSet::new();
    for triple in triples {
        if let Some(object_id) = triple.object_id() {
            dcids.insert(triple.predicate().to_string());
            dcids.insert(object_id.to_string());
        }
    }
    for spec in vertical_specs {
        if !spec.population_type.is_empty() {
            dcids.insert(spec.population_type.clone());
        }
        dcids.extend(spec.verticals.iter().cloned());
    }
    dcids.into_iter().collect()
}

/// A variable reduced to what grouping needs
#[derive(Debug, Default)]
struct StatVarShape {
    population_type: Option<String>,
    /// Constraint property -> value (smallest value if repeated)
    constraints: BTreeMap<String, String>,
}

#[derive(Debug)]
struct GroupNode {
    name: String,
    parents: BTreeSet<String>,
}

struct HierarchyBuilder<'a> {
    dcid2name: &'a BTreeMap<String, String>,
    /// Population type -> verticals
    verticals: BTreeMap<String, BTreeSet<String>>,
    groups: BTreeMap<String, GroupNode>,
    memberships: BTreeSet<(String, String)>,
    specialized_names: SpecializedNames,
}

/// Generate groups for the given variable triples
///
/// `dcid2name` maps schema dcids to display names; unknown dcids are shown
/// as-is.
pub fn generate(
    triples: &[Triple],
    vertical_specs: &[VerticalSpec],
    dcid2name: &BTreeMap<String, String>,
) -> Result<HierarchyResult> {
    let mut verticals: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for spec in vertical_specs {
        verticals
            .entry(spec.population_type.clone())
            .or_default()
            .extend(spec.verticals.iter().cloned());
    }

    let mut builder = HierarchyBuilder {
        dcid2name,
        verticals,
        groups: BTreeMap::new(),
        memberships: BTreeSet::new(),
        specialized_names: BTreeMap::new(),
    };

    let mut skipped = 0usize;
    for (sv_id, shape) in stat_var_shapes(triples) {
        let Some(population_type) = shape.population_type else {
            skipped += 1;
            continue;
        };
        let population_group = builder.population_group(&population_type);
        let group = if shape.constraints.is_empty() {
            population_group
        } else {
            let constraints: Vec<(String, String)> = shape.constraints.into_iter().collect();
            builder.value_group(&population_type, &constraints)
        };
        builder.memberships.insert((sv_id, group));
    }
    if skipped > 0 {
        debug!("{} variables without a population type left ungrouped", skipped);
    }

    builder.finish()
}

fn stat_var_shapes(triples: &[Triple]) -> BTreeMap<String, StatVarShape> {
    let mut shapes: BTreeMap<String, StatVarShape> = BTreeMap::new();
    for triple in triples {
        let Some(object_id) = triple.object_id() else {
            continue;
        };
        let shape = shapes.entry(triple.subject_id().to_string()).or_default();
        let predicate = triple.predicate();
        if predicate == POPULATION_TYPE {
            if shape.population_type.as_deref().map_or(true, |p| object_id < p) {
                shape.population_type = Some(object_id.to_string());
            }
        } else if !EXCLUDED_PROPERTIES.contains(&predicate) {
            shape
                .constraints
                .entry(predicate.to_string())
                .and_modify(|value| {
                    if object_id < value.as_str() {
                        *value = object_id.to_string();
                    }
                })
                .or_insert_with(|| object_id.to_string());
        }
    }
    shapes
}

impl HierarchyBuilder<'_> {
    fn name(&self, dcid: &str) -> String {
        let name = self.dcid2name.get(dcid).map(String::as_str).unwrap_or(dcid);
        capitalize(name)
    }

    fn add_group(&mut self, id: &str, name: String, parent: &str, specialized_name: String) {
        self.groups
            .entry(id.to_string())
            .or_insert_with(|| GroupNode {
                name,
                parents: BTreeSet::new(),
            })
            .parents
            .insert(parent.to_string());
        self.specialized_names
            .entry(parent.to_string())
            .or_default()
            .insert(id.to_string(), specialized_name);
    }

    fn population_group(&mut self, population_type: &str) -> String {
        let id = format!("{}{}", GROUP_ID_PREFIX, sanitize(population_type));
        if self.groups.contains_key(&id) {
            return id;
        }

        let name = self.name(population_type);
        let verticals = self
            .verticals
            .get(population_type)
            .cloned()
            .unwrap_or_default();
        if verticals.is_empty() {
            self.add_group(&id, name.clone(), ROOT_GROUP_ID, name);
        } else {
            for vertical in verticals {
                let vertical_id = format!("{}{}", GROUP_ID_PREFIX, sanitize(&vertical));
                let vertical_name = self.name(&vertical);
                self.add_group(&vertical_id, vertical_name.clone(), ROOT_GROUP_ID, vertical_name);
                self.add_group(&id, name.clone(), &vertical_id, name.clone());
            }
        }
        id
    }

    fn property_group(&mut self, population_type: &str, property: &str) -> String {
        let population_group = self.population_group(population_type);
        let id = format!("{}_{}", population_group, sanitize(property));
        if !self.groups.contains_key(&id) {
            let property_name = self.name(property);
            let name = format!("{} By {}", self.name(population_type), property_name);
            self.add_group(&id, name, &population_group, property_name);
        }
        id
    }

    /// Group for a non-empty, property-sorted constraint set
    fn value_group(&mut self, population_type: &str, constraints: &[(String, String)]) -> String {
        let population_group = self.population_group(population_type);
        let suffix = constraints
            .iter()
            .map(|(p, v)| format!("{}-{}", sanitize(p), sanitize(v)))
            .collect::<Vec<_>>()
            .join("_");
        let id = format!("{}_{}", population_group, suffix);
        if self.groups.contains_key(&id) {
            return id;
        }

        let name = format!(
            "{} With {}",
            self.name(population_type),
            constraints
                .iter()
                .map(|(p, v)| format!("{} = {}", self.name(p), self.name(v)))
                .collect::<Vec<_>>()
                .join(", ")
        );

        if let [(property, value)] = constraints {
            let parent = self.property_group(population_type, property);
            let specialized = self.name(value);
            self.add_group(&id, name, &parent, specialized);
            return id;
        }

        for removed in 0..constraints.len() {
            let rest: Vec<(String, String)> = constraints
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != removed)
                .map(|(_, c)| c.clone())
                .collect();
            let parent = self.value_group(population_type, &rest);
            let (property, value) = &constraints[removed];
            let specialized = format!("{} = {}", self.name(property), self.name(value));
            self.add_group(&id, name.clone(), &parent, specialized);
        }
        id
    }

    fn finish(self) -> Result<HierarchyResult> {
        let mut triples = BTreeSet::new();

        if !self.groups.is_empty() {
            triples.insert(Triple::with_id(ROOT_GROUP_ID, TYPE_OF, TYPE_STAT_VAR_GROUP)?);
            triples.insert(Triple::with_value(ROOT_GROUP_ID, NAME, ROOT_GROUP_NAME)?);
            triples.insert(Triple::with_id(ROOT_GROUP_ID, SPECIALIZATION_OF, DC_ROOT_GROUP_ID)?);
        }
        for (id, group) in &self.groups {
            triples.insert(Triple::with_id(id, TYPE_OF, TYPE_STAT_VAR_GROUP)?);
            triples.insert(Triple::with_value(id, NAME, &group.name)?);
            for parent in &group.parents {
                triples.insert(Triple::with_id(id, SPECIALIZATION_OF, parent)?);
            }
        }
        for (sv_id, group_id) in &self.memberships {
            triples.insert(Triple::with_id(sv_id, MEMBER_OF, group_id)?);
        }

        Ok(HierarchyResult {
            svg_triples: triples.into_iter().collect(),
            svg_specialized_names: self.specialized_names,
        })
    }
}

/// Id-safe form of a dcid
///
/// ASCII alphanumerics are kept and every other byte becomes `.` plus two
/// hex digits. `.` never survives unescaped and `_`/`-` never appear in the
/// output, so distinct dcids (and distinct constraint lists joined with
/// `_`/`-`) always give distinct group ids.
fn sanitize(dcid: &str) -> String {
    let mut out = String::with_capacity(dcid.len());
    for byte in dcid.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(byte as char);
        } else {
            out.push_str(&format!(".{:02x}", byte));
        }
    }
    out
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv_triples() -> Vec<Triple> {
        vec![
            Triple::with_id("sv1", TYPE_OF, TYPE_STATISTICAL_VARIABLE).unwrap(),
            Triple::with_id("sv1", POPULATION_TYPE, "Person").unwrap(),
            Triple::with_id("sv1", "gender", "Female").unwrap(),
            Triple::with_id("sv2", TYPE_OF, TYPE_STATISTICAL_VARIABLE).unwrap(),
            Triple::with_id("sv2", POPULATION_TYPE, "Person").unwrap(),
            Triple::with_id("sv2", "gender", "Female").unwrap(),
            Triple::with_id("sv2", "age", "Years20To30").unwrap(),
            Triple::with_id("sv3", POPULATION_TYPE, "Person").unwrap(),
            Triple::with_value("sv4", NAME, "No population type").unwrap(),
        ]
    }

    fn names() -> BTreeMap<String, String> {
        [("gender", "Gender"), ("Female", "Female"), ("age", "Age")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_single_property_grouping() {
        let result = generate(&sv_triples(), &[], &names()).unwrap();
        let triples = result.svg_triples;

        assert!(triples.contains(&Triple::with_id("sv1", MEMBER_OF, "c/g/Person_gender-Female").unwrap()));
        assert!(triples.contains(
            &Triple::with_id("c/g/Person_gender-Female", SPECIALIZATION_OF, "c/g/Person_gender").unwrap()
        ));
        assert!(triples.contains(&Triple::with_id("c/g/Person_gender", SPECIALIZATION_OF, "c/g/Person").unwrap()));
        assert!(triples.contains(&Triple::with_id("c/g/Person", SPECIALIZATION_OF, ROOT_GROUP_ID).unwrap()));
        assert!(triples.contains(&Triple::with_value("c/g/Person_gender", NAME, "Person By Gender").unwrap()));
        assert!(triples.contains(
            &Triple::with_value("c/g/Person_gender-Female", NAME, "Person With Gender = Female").unwrap()
        ));
        // No constraints: directly under the population group.
        assert!(triples.contains(&Triple::with_id("sv3", MEMBER_OF, "c/g/Person").unwrap()));
        assert!(!triples.iter().any(|t| t.subject_id() == "sv4"));

        let specialized = &result.svg_specialized_names["c/g/Person_gender"];
        assert_eq!(specialized["c/g/Person_gender-Female"], "Female");
    }

    #[test]
    fn test_multi_property_group_has_multiple_parents() {
        let result = generate(&sv_triples(), &[], &names()).unwrap();
        let group = "c/g/Person_age-Years20To30_gender-Female";
        let parents: Vec<&str> = result
            .svg_triples
            .iter()
            .filter(|t| t.subject_id() == group && t.predicate() == SPECIALIZATION_OF)
            .filter_map(|t| t.object_id())
            .collect();
        assert_eq!(parents, vec!["c/g/Person_age-Years20To30", "c/g/Person_gender-Female"]);
        assert!(result
            .svg_triples
            .contains(&Triple::with_id("sv2", MEMBER_OF, group).unwrap()));
    }

    #[test]
    fn test_vertical_specs() {
        let specs = load_vertical_specs(
            r#"{"specs": [{"populationType": "Person", "verticals": ["Demographics"]}]}"#,
        )
        .unwrap();
        let result = generate(&sv_triples(), &specs, &names()).unwrap();
        assert!(result
            .svg_triples
            .contains(&Triple::with_id("c/g/Person", SPECIALIZATION_OF, "c/g/Demographics").unwrap()));
        assert!(result
            .svg_triples
            .contains(&Triple::with_id("c/g/Demographics", SPECIALIZATION_OF, ROOT_GROUP_ID).unwrap()));
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let mut reversed = sv_triples();
        reversed.reverse();
        let first = generate(&sv_triples(), &[], &names()).unwrap();
        let second = generate(&reversed, &[], &names()).unwrap();
        assert_eq!(first.svg_triples, second.svg_triples);
        assert_eq!(first.svg_specialized_names, second.svg_specialized_names);
    }

    #[test]
    fn test_sanitize_is_injective() {
        assert_eq!(sanitize("Years20To30"), "Years20To30");
        assert_eq!(sanitize("Years_20"), "Years.5f20");
        assert_eq!(sanitize("dc/Female"), "dc.2fFemale");
        assert_ne!(sanitize("a.5f"), sanitize("a_"));
    }

    #[test]
    fn test_values_differing_in_punctuation_get_own_groups() {
        let triples = vec![
            Triple::with_id("sv1", POPULATION_TYPE, "Person").unwrap(),
            Triple::with_id("sv1", "age", "Years_20").unwrap(),
            Triple::with_id("sv2", POPULATION_TYPE, "Person").unwrap(),
            Triple::with_id("sv2", "age", "Years20").unwrap(),
        ];
        let result = generate(&triples, &[], &BTreeMap::new()).unwrap();
        let triples = result.svg_triples;

        assert!(triples.contains(&Triple::with_id("sv1", MEMBER_OF, "c/g/Person_age-Years.5f20").unwrap()));
        assert!(triples.contains(&Triple::with_id("sv2", MEMBER_OF, "c/g/Person_age-Years20").unwrap()));
        assert!(triples.contains(
            &Triple::with_value("c/g/Person_age-Years.5f20", NAME, "Person With Age = Years_20").unwrap()
        ));
        assert!(triples.contains(
            &Triple::with_value("c/g/Person_age-Years20", NAME, "Person With Age = Years20").unwrap()
        ));
    }

    #[test]
    fn test_empty_input() {
        let result = generate(&[], &[], &BTreeMap::new()).unwrap();
        assert!(result.svg_triples.is_empty());
    }

    #[test]
    fn test_schema_dcids() {
        let specs = vec![VerticalSpec {
            population_type: "Person".to_string(),
            verticals: ["Demographics".to_string()].into_iter().collect(),
        }];
        let dcids = schema_dcids(&sv_triples(), &specs);
        assert!(dcids.contains(&"gender".to_string()));
        assert!(dcids.contains(&"Female".to_string()));
        assert!(dcids.contains(&"Demographics".to_string()));
        assert!(!dcids.contains(&"No population type".to_string()));
    }
}
