//! Import configuration (`config.json`)
//!
//! Wraps the parsed configuration document and answers per-file and
//! per-variable questions. Per-file settings are looked up by exact file
//! name first, then by the first `inputFiles` key (in declaration order)
//! whose glob pattern matches the file's path relative to its input root.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use stats_common::fs::InputFile;
use stats_common::{Error, Result};

use crate::models::{
    AggregationConfig, EntityType, EventType, ImportType, InputFileFormat, Provenance, Source,
    StatVar,
};
use crate::vocab::DEFAULT_SOURCE_NAME;

/// Name of the config file looked up in an input directory
pub const CONFIG_JSON_FILE_NAME: &str = "config.json";

/// Special file type: hierarchy hints for the variable hierarchy generator
pub const VERTICAL_SPECS_FILE_TYPE: &str = "verticalSpecsFile";

const SPECIAL_FILE_TYPES: &[&str] = &[VERTICAL_SPECS_FILE_TYPE];

/// Top-level configuration document
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigDocument {
    input_files: serde_json::Map<String, Value>,
    variables: BTreeMap<String, VariableConfig>,
    events: BTreeMap<String, DescriptorConfig>,
    entities: BTreeMap<String, DescriptorConfig>,
    sources: serde_json::Map<String, Value>,
    data_download_url: Option<Value>,
    group_stat_vars_by_property: Option<bool>,
    generate_topics: Option<bool>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// Settings for one `inputFiles` entry
///
/// Enum-like fields stay strings until asked for, so a bad value only fails
/// the file that uses it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FileConfig {
    import_type: Option<String>,
    format: Option<String>,
    entity_type: Option<String>,
    ignore_columns: Option<Vec<String>>,
    provenance: Option<String>,
    event_type: Option<String>,
    id_column: Option<String>,
    value_column: Option<String>,
    row_entity_type: Option<String>,
    entity_columns: Vec<String>,
    computed_variables: Vec<String>,
    column_mappings: BTreeMap<String, String>,
    observation_properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VariableConfig {
    name: Option<String>,
    description: Option<String>,
    search_descriptions: Vec<String>,
    /// Deprecated alias of `searchDescriptions`
    nl_sentences: Vec<String>,
    group: Option<String>,
    properties: BTreeMap<String, Value>,
    aggregation: Option<AggregationBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AggregationBlock {
    period: Option<String>,
    method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DescriptorConfig {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SourceConfig {
    url: String,
    provenances: serde_json::Map<String, Value>,
}

/// Fallbacks for per-file settings, usually from the command line
#[derive(Debug, Clone, Default)]
pub struct FileDefaults {
    pub entity_type: Option<String>,
    pub ignore_columns: Vec<String>,
}

/// Parsed import configuration
#[derive(Debug)]
pub struct Config {
    input_files: Vec<(String, FileConfig)>,
    variables: BTreeMap<String, VariableConfig>,
    events: BTreeMap<String, DescriptorConfig>,
    entities: BTreeMap<String, DescriptorConfig>,
    /// Provenance name -> provenance (with its source)
    provenances: BTreeMap<String, Provenance>,
    data_download_url: Option<Value>,
    generate_hierarchy: bool,
    generate_topics: bool,
    special_files: BTreeMap<String, String>,
    defaults: FileDefaults,
    /// Full path -> index of the matched `inputFiles` entry (None = no match)
    config_key_by_path: RwLock<HashMap<PathBuf, Option<usize>>>,
}

impl Config {
    /// Configuration with no settings; every accessor returns its default
    pub fn empty() -> Self {
        Self {
            input_files: Vec::new(),
            variables: BTreeMap::new(),
            events: BTreeMap::new(),
            entities: BTreeMap::new(),
            provenances: BTreeMap::new(),
            data_download_url: None,
            generate_hierarchy: false,
            generate_topics: false,
            special_files: BTreeMap::new(),
            defaults: FileDefaults::default(),
            config_key_by_path: RwLock::new(HashMap::new()),
        }
    }

    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = stats_common::fs::read_to_string(path)?;
        debug!("Loaded config: {}", path.display());
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid config JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let document: ConfigDocument = serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        Self::from_document(document)
    }

    fn from_document(document: ConfigDocument) -> Result<Self> {
        let input_files = ordered_entries::<FileConfig>(document.input_files, "inputFiles")?;
        let provenances = parse_provenances(document.sources)?;

        let mut special_files = BTreeMap::new();
        for file_type in SPECIAL_FILE_TYPES {
            if let Some(Value::String(file_name)) = document.other.get(*file_type) {
                if !file_name.is_empty() {
                    special_files.insert(file_type.to_string(), file_name.clone());
                }
            }
        }

        Ok(Self {
            input_files,
            variables: document.variables,
            events: document.events,
            entities: document.entities,
            provenances,
            data_download_url: document.data_download_url,
            generate_hierarchy: document.group_stat_vars_by_property.unwrap_or(false),
            generate_topics: document.generate_topics.unwrap_or(false),
            special_files,
            ..Self::empty()
        })
    }

    /// Apply fallbacks used by files that don't set their own values
    pub fn with_defaults(mut self, defaults: FileDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Input roots declared in `dataDownloadUrl`
    pub fn data_download_urls(&self) -> Result<Vec<String>> {
        match &self.data_download_url {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(url) => Ok(url.clone()),
                    other => Err(Error::Config(format!(
                        "dataDownloadUrl entries must be strings, found: {}",
                        other
                    ))),
                })
                .collect(),
            Some(Value::String(url)) if url.is_empty() => Ok(Vec::new()),
            Some(other) => Err(Error::Config(format!(
                "dataDownloadUrl can only be a list, found: {}",
                other
            ))),
        }
    }

    pub fn import_type(&self, file: &InputFile) -> Result<ImportType> {
        match self.per_file(file).and_then(|c| c.import_type.as_deref()) {
            None | Some("") => Ok(ImportType::Observations),
            Some(token) => token.parse().map_err(|token: String| {
                Error::Config(format!(
                    "Unsupported import type: {} ({})",
                    token,
                    file.full_path().display()
                ))
            }),
        }
    }

    /// Declared format, or None to let the importer pick its default
    pub fn format(&self, file: &InputFile) -> Result<Option<InputFileFormat>> {
        match self.per_file(file).and_then(|c| c.format.as_deref()) {
            None | Some("") => Ok(None),
            Some(token) => token.parse().map(Some).map_err(|token: String| {
                Error::Config(format!(
                    "Unsupported format: {} ({})",
                    token,
                    file.relative_path()
                ))
            }),
        }
    }

    /// Standard column name -> column name used in the file
    pub fn column_mappings(&self, file: &InputFile) -> BTreeMap<String, String> {
        self.per_file(file)
            .map(|c| c.column_mappings.clone())
            .unwrap_or_default()
    }

    pub fn computed_variables(&self, file: &InputFile) -> Vec<String> {
        self.per_file(file)
            .map(|c| c.computed_variables.clone())
            .unwrap_or_default()
    }

    pub fn ignore_columns(&self, file: &InputFile) -> Vec<String> {
        self.per_file(file)
            .and_then(|c| c.ignore_columns.clone())
            .unwrap_or_else(|| self.defaults.ignore_columns.clone())
    }

    pub fn entity_type(&self, file: &InputFile) -> Option<String> {
        non_empty(self.per_file(file).and_then(|c| c.entity_type.clone()))
            .or_else(|| self.defaults.entity_type.clone())
    }

    pub fn event_type(&self, file: &InputFile) -> Option<String> {
        non_empty(self.per_file(file).and_then(|c| c.event_type.clone()))
    }

    pub fn id_column(&self, file: &InputFile) -> Option<String> {
        non_empty(self.per_file(file).and_then(|c| c.id_column.clone()))
    }

    /// Column holding each event's contribution to its count variable
    pub fn value_column(&self, file: &InputFile) -> Option<String> {
        non_empty(self.per_file(file).and_then(|c| c.value_column.clone()))
    }

    pub fn row_entity_type(&self, file: &InputFile) -> Option<String> {
        non_empty(self.per_file(file).and_then(|c| c.row_entity_type.clone()))
    }

    pub fn entity_columns(&self, file: &InputFile) -> Vec<String> {
        self.per_file(file)
            .map(|c| c.entity_columns.clone())
            .unwrap_or_default()
    }

    pub fn observation_properties(&self, file: &InputFile) -> BTreeMap<String, String> {
        self.per_file(file)
            .map(|c| stringify_values(&c.observation_properties))
            .unwrap_or_default()
    }

    /// Provenance name for a file, defaulting to the file's own name
    pub fn provenance_name(&self, file: &InputFile) -> String {
        non_empty(self.per_file(file).and_then(|c| c.provenance.clone()))
            .unwrap_or_else(|| file.name().to_string())
    }

    /// Variable descriptor; unknown names get a descriptor named after the key
    pub fn variable(&self, name: &str) -> StatVar {
        let Some(cfg) = self.variables.get(name) else {
            return StatVar::named(name);
        };
        let mut search_descriptions = cfg.search_descriptions.clone();
        search_descriptions.extend(cfg.nl_sentences.iter().cloned());
        StatVar {
            id: String::new(),
            name: cfg.name.clone().unwrap_or_else(|| name.to_string()),
            description: cfg.description.clone().unwrap_or_default(),
            search_descriptions,
            group_path: cfg.group.clone().unwrap_or_default(),
            properties: stringify_values(&cfg.properties),
        }
    }

    pub fn aggregation(&self, variable_name: &str) -> Result<AggregationConfig> {
        let mut aggregation = AggregationConfig::default();
        let Some(block) = self
            .variables
            .get(variable_name)
            .and_then(|v| v.aggregation.as_ref())
        else {
            return Ok(aggregation);
        };

        if let Some(period) = block.period.as_deref() {
            aggregation.period = period.parse().map_err(|token: String| {
                Error::Config(format!("invalid period: {} ({})", token, variable_name))
            })?;
        }
        if let Some(method) = block.method.as_deref() {
            aggregation.method = method.parse().map_err(|token: String| {
                Error::Config(format!("invalid method: {} ({})", token, variable_name))
            })?;
        }
        Ok(aggregation)
    }

    pub fn event(&self, name: &str) -> EventType {
        let cfg = self.events.get(name).cloned().unwrap_or_default();
        EventType {
            id: String::new(),
            name: cfg.name.unwrap_or_else(|| name.to_string()),
            description: cfg.description.unwrap_or_default(),
        }
    }

    pub fn entity(&self, name: &str) -> EntityType {
        let cfg = self.entities.get(name).cloned().unwrap_or_default();
        EntityType {
            id: String::new(),
            name: cfg.name.unwrap_or_else(|| name.to_string()),
            description: cfg.description.unwrap_or_default(),
        }
    }

    /// Provenance by name
    ///
    /// Names not declared under `sources` get an empty-url provenance under
    /// the default source.
    pub fn provenance(&self, name: &str) -> Provenance {
        self.provenances.get(name).cloned().unwrap_or_else(|| Provenance {
            name: name.to_string(),
            url: String::new(),
            source: Source {
                name: DEFAULT_SOURCE_NAME.to_string(),
                url: String::new(),
            },
        })
    }

    /// Declared provenances, ordered by name
    pub fn provenances(&self) -> impl Iterator<Item = &Provenance> {
        self.provenances.values()
    }

    /// `groupStatVarsByProperty`
    pub fn generate_hierarchy(&self) -> bool {
        self.generate_hierarchy
    }

    pub fn generate_topics(&self) -> bool {
        self.generate_topics
    }

    /// Special file type -> configured file name
    pub fn special_files(&self) -> &BTreeMap<String, String> {
        &self.special_files
    }

    fn per_file(&self, file: &InputFile) -> Option<&FileConfig> {
        // Exact name match always wins.
        if let Some((_, cfg)) = self.input_files.iter().find(|(key, _)| key == file.name()) {
            return Some(cfg);
        }

        let full_path = file.full_path();
        let cached = self
            .config_key_by_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&full_path)
            .copied();

        let index = match cached {
            Some(index) => index,
            None => {
                let index = self
                    .input_files
                    .iter()
                    .position(|(pattern, _)| file.matches_any(&[pattern.as_str()]));
                self.config_key_by_path
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(full_path, index);
                index
            }
        };

        index
            .and_then(|i| self.input_files.get(i))
            .map(|(_, cfg)| cfg)
    }
}

/// Property values as strings; strings are taken as-is, other JSON values
/// in their JSON form, nulls are dropped
fn stringify_values(values: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    values
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), value))
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parse a JSON object's entries in declaration order
fn ordered_entries<T: DeserializeOwned>(
    map: serde_json::Map<String, Value>,
    field: &str,
) -> Result<Vec<(String, T)>> {
    map.into_iter()
        .map(|(key, value)| {
            let parsed = serde_json::from_value(value)
                .map_err(|e| Error::Config(format!("Invalid {} entry '{}': {}", field, key, e)))?;
            Ok((key, parsed))
        })
        .collect()
}

fn parse_provenances(sources: serde_json::Map<String, Value>) -> Result<BTreeMap<String, Provenance>> {
    let mut provenances = BTreeMap::new();
    for (source_name, source_cfg) in ordered_entries::<SourceConfig>(sources, "sources")? {
        let source = Source {
            name: source_name.clone(),
            url: source_cfg.url,
        };
        for (prov_name, prov_url) in source_cfg.provenances {
            let url = match prov_url {
                Value::String(url) => url,
                other => {
                    return Err(Error::Config(format!(
                        "Provenance url must be a string: {} ({})",
                        prov_name, other
                    )))
                }
            };
            if provenances.contains_key(&prov_name) {
                return Err(Error::Config(format!(
                    "Duplicate provenance name: {} (source: {})",
                    prov_name, source_name
                )));
            }
            provenances.insert(
                prov_name.clone(),
                Provenance {
                    name: prov_name,
                    url,
                    source: source.clone(),
                },
            );
        }
    }
    Ok(provenances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregationMethod, AggregationPeriod};
    use serde_json::json;

    fn config(value: Value) -> Config {
        Config::from_value(value).unwrap()
    }

    fn file(relative_path: &str) -> InputFile {
        InputFile::new("/input", relative_path)
    }

    #[test]
    fn test_exact_match_wins_over_earlier_glob() {
        let config = config(json!({
            "inputFiles": {
                "*.csv": {"entityType": "State"},
                "a.csv": {"entityType": "Country"}
            }
        }));
        assert_eq!(config.entity_type(&file("a.csv")).as_deref(), Some("Country"));
        assert_eq!(config.entity_type(&file("b.csv")).as_deref(), Some("State"));
    }

    #[test]
    fn test_first_matching_glob_wins() {
        let config = config(json!({
            "inputFiles": {
                "foo*.csv": {"entityType": "County"},
                "*.csv": {"entityType": "State"}
            }
        }));
        assert_eq!(config.entity_type(&file("foo1.csv")).as_deref(), Some("County"));
        assert_eq!(config.entity_type(&file("bar.csv")).as_deref(), Some("State"));
        // Second lookup goes through the cache.
        assert_eq!(config.entity_type(&file("foo1.csv")).as_deref(), Some("County"));
    }

    #[test]
    fn test_path_pattern() {
        let config = config(json!({
            "inputFiles": {"path/to/*.csv": {"entityType": "City"}}
        }));
        assert_eq!(config.entity_type(&file("path/to/foo.csv")).as_deref(), Some("City"));
        assert_eq!(config.entity_type(&file("foo.csv")), None);
        assert_eq!(config.entity_type(&file("other/foo.csv")), None);
    }

    #[test]
    fn test_no_match_uses_defaults() {
        let config = config(json!({"inputFiles": {"a.csv": {"importType": "events"}}}));
        let b = file("b.csv");
        assert_eq!(config.import_type(&b).unwrap(), ImportType::Observations);
        assert_eq!(config.format(&b).unwrap(), None);
        assert!(config.column_mappings(&b).is_empty());
        assert!(config.ignore_columns(&b).is_empty());
        assert_eq!(config.id_column(&b), None);
        assert_eq!(config.provenance_name(&b), "b.csv");
    }

    #[test]
    fn test_import_type() {
        let config = config(json!({
            "inputFiles": {
                "events.csv": {"importType": "events"},
                "entities.csv": {"importType": "entities"},
                "bad.csv": {"importType": "eVeNtS"}
            }
        }));
        assert_eq!(config.import_type(&file("events.csv")).unwrap(), ImportType::Events);
        assert_eq!(config.import_type(&file("entities.csv")).unwrap(), ImportType::Entities);
        let err = config.import_type(&file("bad.csv")).unwrap_err();
        assert!(err.to_string().contains("Unsupported import type: eVeNtS"));
    }

    #[test]
    fn test_format() {
        let config = config(json!({
            "inputFiles": {
                "rows.csv": {"format": "variablePerRow"},
                "bad.csv": {"format": "rows"}
            }
        }));
        assert_eq!(
            config.format(&file("rows.csv")).unwrap(),
            Some(InputFileFormat::VariablePerRow)
        );
        let err = config.format(&file("bad.csv")).unwrap_err();
        assert!(err.to_string().contains("Unsupported format"));
    }

    #[test]
    fn test_variable_descriptor() {
        let config = config(json!({
            "variables": {
                "var1": {
                    "name": "Variable 1",
                    "description": "First variable",
                    "searchDescriptions": ["a"],
                    "nlSentences": ["b"],
                    "group": "Parent/Child",
                    "properties": {
                        "populationType": "Person",
                        "age": 5,
                        "isCumulative": true,
                        "unused": null
                    }
                }
            }
        }));
        let sv = config.variable("var1");
        assert_eq!(sv.name, "Variable 1");
        assert_eq!(sv.search_descriptions, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sv.group_path, "Parent/Child");
        assert_eq!(sv.properties.get("populationType").map(String::as_str), Some("Person"));
        assert_eq!(sv.properties.get("age").map(String::as_str), Some("5"));
        assert_eq!(sv.properties.get("isCumulative").map(String::as_str), Some("true"));
        assert!(!sv.properties.contains_key("unused"));

        let unknown = config.variable("var2");
        assert_eq!(unknown.name, "var2");
        assert!(unknown.description.is_empty());
        assert!(unknown.search_descriptions.is_empty());
    }

    #[test]
    fn test_aggregation() {
        let config = config(json!({
            "variables": {
                "monthly": {"aggregation": {"period": "month", "method": "sum"}},
                "bad_period": {"aggregation": {"period": "INVALID"}},
                "bad_method": {"aggregation": {"method": "median"}}
            }
        }));
        assert_eq!(config.aggregation("none").unwrap(), AggregationConfig::default());
        assert_eq!(config.aggregation("none").unwrap().period, AggregationPeriod::Year);

        let monthly = config.aggregation("monthly").unwrap();
        assert_eq!(monthly.period, AggregationPeriod::Month);
        assert_eq!(monthly.method, AggregationMethod::Sum);

        let err = config.aggregation("bad_period").unwrap_err();
        assert!(err.to_string().contains("invalid period"));
        let err = config.aggregation("bad_method").unwrap_err();
        assert!(err.to_string().contains("invalid method"));
    }

    #[test]
    fn test_provenances() {
        let config = config(json!({
            "sources": {
                "Source1": {
                    "url": "https://source1.com",
                    "provenances": {"P1": "https://source1.com/p1"}
                }
            }
        }));
        let p1 = config.provenance("P1");
        assert_eq!(p1.url, "https://source1.com/p1");
        assert_eq!(p1.source.name, "Source1");

        let unknown = config.provenance("other.csv");
        assert_eq!(unknown.source.name, DEFAULT_SOURCE_NAME);
        assert!(unknown.url.is_empty());
    }

    #[test]
    fn test_duplicate_provenance_fails() {
        let result = Config::from_value(json!({
            "sources": {
                "S1": {"provenances": {"P": "u1"}},
                "S2": {"provenances": {"P": "u2"}}
            }
        }));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_data_download_urls() {
        assert!(Config::empty().data_download_urls().unwrap().is_empty());
        let listed = config(json!({"dataDownloadUrl": ["/data/a", "/data/b"]}));
        assert_eq!(listed.data_download_urls().unwrap(), vec!["/data/a", "/data/b"]);
        let scalar = config(json!({"dataDownloadUrl": "/data/a"}));
        assert!(scalar.data_download_urls().is_err());
    }

    #[test]
    fn test_flags_and_special_files() {
        let config = config(json!({
            "groupStatVarsByProperty": true,
            "generateTopics": true,
            "verticalSpecsFile": "vertical_specs.json"
        }));
        assert!(config.generate_hierarchy());
        assert!(config.generate_topics());
        assert_eq!(
            config.special_files().get(VERTICAL_SPECS_FILE_TYPE).map(String::as_str),
            Some("vertical_specs.json")
        );
        assert!(!Config::empty().generate_hierarchy());
    }

    #[test]
    fn test_cli_defaults() {
        let config = config(json!({
            "inputFiles": {"a.csv": {"entityType": "Country", "ignoreColumns": []}}
        }))
        .with_defaults(FileDefaults {
            entity_type: Some("State".to_string()),
            ignore_columns: vec!["notes".to_string()],
        });
        assert_eq!(config.entity_type(&file("a.csv")).as_deref(), Some("Country"));
        assert!(config.ignore_columns(&file("a.csv")).is_empty());
        assert_eq!(config.entity_type(&file("b.csv")).as_deref(), Some("State"));
        assert_eq!(config.ignore_columns(&file("b.csv")), vec!["notes".to_string()]);
    }
}
