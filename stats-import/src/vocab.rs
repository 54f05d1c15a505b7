//! Schema vocabulary used in generated triples

pub use stats_common::db::{NAME, TYPE_OF};

// Types
pub const TYPE_STATISTICAL_VARIABLE: &str = "StatisticalVariable";
pub const TYPE_STAT_VAR_GROUP: &str = "StatVarGroup";
pub const TYPE_TOPIC: &str = "Topic";
pub const TYPE_SOURCE: &str = "Source";
pub const TYPE_PROVENANCE: &str = "Provenance";
pub const TYPE_CLASS: &str = "Class";
pub const TYPE_EVENT: &str = "Event";

// Predicates
pub const DCID: &str = "dcid";
pub const DESCRIPTION: &str = "description";
pub const SEARCH_DESCRIPTION: &str = "searchDescription";
pub const MEMBER_OF: &str = "memberOf";
pub const SPECIALIZATION_OF: &str = "specializationOf";
pub const SUB_CLASS_OF: &str = "subClassOf";
pub const URL: &str = "url";
pub const SOURCE: &str = "source";
pub const POPULATION_TYPE: &str = "populationType";
pub const MEASURED_PROPERTY: &str = "measuredProperty";
pub const STAT_TYPE: &str = "statType";
pub const AFFECTED_PLACE: &str = "affectedPlace";
pub const OBSERVATION_DATE: &str = "observationDate";

// Well-known nodes
pub const ROOT_GROUP_ID: &str = "c/g/Root";
pub const ROOT_GROUP_NAME: &str = "Custom Variables";
pub const DC_ROOT_GROUP_ID: &str = "dc/g/Root";
pub const DEFAULT_SOURCE_NAME: &str = "Custom Data Commons";

// Id prefixes
pub const STAT_VAR_ID_PREFIX: &str = "custom/statvar_";
pub const GROUP_ID_PREFIX: &str = "c/g/";
pub const SOURCE_ID_PREFIX: &str = "c/s/";
pub const PROVENANCE_ID_PREFIX: &str = "c/p/";
