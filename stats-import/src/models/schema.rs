//! Schema descriptors derived from the import configuration
//!
//! Built once when the configuration is read and never mutated afterwards.
//! Ids are empty until the node registry assigns one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Statistical variable descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatVar {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Sentences used for search / NL indexing
    pub search_descriptions: Vec<String>,
    /// Slash-delimited group path, e.g. "Demographics/Age"
    pub group_path: String,
    /// Extra properties, asserted as references
    pub properties: BTreeMap<String, String>,
}

impl StatVar {
    /// Descriptor synthesized from a bare name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

/// A dataset contributing data; belongs to exactly one [`Source`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub name: String,
    pub url: String,
    pub source: Source,
}

/// How a CSV file is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    Observations,
    Events,
    Entities,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Observations => "observations",
            ImportType::Events => "events",
            ImportType::Entities => "entities",
        }
    }
}

impl FromStr for ImportType {
    type Err = String;

    /// Tokens are case-sensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observations" => Ok(ImportType::Observations),
            "events" => Ok(ImportType::Events),
            "entities" => Ok(ImportType::Entities),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ImportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout of an observations CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputFileFormat {
    /// One row per (entity, variable, date, value)
    #[serde(rename = "variablePerRow")]
    VariablePerRow,
    /// One column per variable
    #[serde(rename = "variablePerColumn")]
    VariablePerColumn,
}

impl FromStr for InputFileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variablePerRow" => Ok(InputFileFormat::VariablePerRow),
            "variablePerColumn" => Ok(InputFileFormat::VariablePerColumn),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationPeriod {
    Day,
    Month,
    Year,
}

impl AggregationPeriod {
    /// Truncate an ISO-8601 date (YYYY[-MM[-DD...]]) to this period
    ///
    /// Dates shorter than the period are returned unchanged.
    pub fn truncate<'a>(&self, date: &'a str) -> &'a str {
        let len = match self {
            AggregationPeriod::Year => 4,
            AggregationPeriod::Month => 7,
            AggregationPeriod::Day => 10,
        };
        date.get(..len).unwrap_or(date)
    }
}

impl FromStr for AggregationPeriod {
    type Err = String;

    /// Tokens are case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(AggregationPeriod::Day),
            "month" => Ok(AggregationPeriod::Month),
            "year" => Ok(AggregationPeriod::Year),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationMethod {
    Count,
    Sum,
    Mean,
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregationMethod::Count),
            "sum" => Ok(AggregationMethod::Sum),
            "mean" => Ok(AggregationMethod::Mean),
            _ => Err(s.to_string()),
        }
    }
}

/// Aggregation rule for event-derived variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub period: AggregationPeriod,
    pub method: AggregationMethod,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            period: AggregationPeriod::Year,
            method: AggregationMethod::Count,
        }
    }
}

/// Hierarchy hint: population type and the verticals it belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerticalSpec {
    #[serde(default)]
    pub population_type: String,
    #[serde(default)]
    pub verticals: BTreeSet<String>,
}
