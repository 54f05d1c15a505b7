//! Observations importer (one column per variable)
//!
//! Expected layout: `entity, date, <variable>, <variable>, ...`. Each
//! variable column header is a variable name, registered with the node
//! registry on first use. Empty cells produce no observation.

use std::collections::BTreeMap;
use tracing::info;

use stats_common::fs::InputFile;
use stats_common::{Error, Observation, Result};

use crate::config::Config;
use crate::importers::{kept_columns, open_csv, write_debug_resolve, ImportContext};

const UNIT: &str = "unit";
const SCALING_FACTOR: &str = "scalingFactor";
const MEASUREMENT_METHOD: &str = "measurementMethod";
const OBSERVATION_PERIOD: &str = "observationPeriod";

/// Properties applied to every observation of a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ObservationProperties {
    pub unit: String,
    pub scaling_factor: String,
    pub measurement_method: String,
    pub observation_period: String,
    /// JSON object of the remaining properties, or empty
    pub properties: String,
}

impl ObservationProperties {
    pub fn from_config(mut properties: BTreeMap<String, String>) -> Self {
        let mut take = |key: &str| properties.remove(key).unwrap_or_default();
        let unit = take(UNIT);
        let scaling_factor = take(SCALING_FACTOR);
        let measurement_method = take(MEASUREMENT_METHOD);
        let observation_period = take(OBSERVATION_PERIOD);
        let properties = if properties.is_empty() {
            String::new()
        } else {
            serde_json::Value::from(
                properties
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect::<serde_json::Map<_, _>>(),
            )
            .to_string()
        };
        Self {
            unit,
            scaling_factor,
            measurement_method,
            observation_period,
            properties,
        }
    }

    pub fn observation(
        &self,
        entity: &str,
        variable: &str,
        date: &str,
        value: &str,
        provenance: &str,
    ) -> Observation {
        Observation {
            entity: entity.to_string(),
            variable: variable.to_string(),
            date: date.to_string(),
            value: value.to_string(),
            provenance: provenance.to_string(),
            unit: self.unit.clone(),
            scaling_factor: self.scaling_factor.clone(),
            measurement_method: self.measurement_method.clone(),
            observation_period: self.observation_period.clone(),
            properties: self.properties.clone(),
        }
    }
}

pub struct ObservationsImporter {
    pub(crate) input_file: InputFile,
    entity_type: String,
    ignore_columns: Vec<String>,
    provenance_name: String,
    observation_properties: ObservationProperties,
}

impl ObservationsImporter {
    pub fn new(input_file: InputFile, config: &Config) -> Self {
        Self {
            entity_type: config.entity_type(&input_file).unwrap_or_default(),
            ignore_columns: config.ignore_columns(&input_file),
            provenance_name: config.provenance_name(&input_file),
            observation_properties: ObservationProperties::from_config(
                config.observation_properties(&input_file),
            ),
            input_file,
        }
    }

    pub(crate) async fn do_import(&self, ctx: &mut ImportContext<'_>) -> Result<()> {
        let mut reader = open_csv(&self.input_file)?;
        let headers = reader.headers()?.clone();
        let columns = kept_columns(&headers, &self.ignore_columns);
        if columns.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "{}: expected an entity column and a date column, found {} column(s)",
                self.input_file.relative_path(),
                columns.len()
            )));
        }

        let (entity_index, _) = columns[0];
        let (date_index, _) = columns[1];
        let variables: Vec<(usize, String)> = columns[2..]
            .iter()
            .map(|(index, name)| (*index, ctx.nodes.variable(name).id))
            .collect();
        let provenance = ctx.nodes.provenance(&self.provenance_name);

        let mut observations = Vec::new();
        let mut entities = Vec::new();
        let mut seen = std::collections::BTreeSet::new();

        for record in reader.records() {
            let record = record?;
            let entity = record.get(entity_index).unwrap_or_default();
            let date = record.get(date_index).unwrap_or_default();
            if entity.is_empty() {
                continue;
            }
            if seen.insert(entity.to_string()) {
                entities.push(entity.to_string());
            }
            for (index, variable) in &variables {
                let value = record.get(*index).unwrap_or_default();
                if value.is_empty() {
                    continue;
                }
                observations.push(self.observation_properties.observation(
                    entity,
                    variable,
                    date,
                    value,
                    &provenance,
                ));
            }
        }

        write_debug_resolve(
            &ctx.debug_resolve_file(&self.input_file),
            &self.entity_type,
            entities,
        )?;

        info!(
            "Inserting {} observations from {}",
            observations.len(),
            self.input_file.relative_path()
        );
        ctx.store.insert_observations(&observations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_properties() {
        let mut config = BTreeMap::new();
        config.insert("unit".to_string(), "USDollar".to_string());
        config.insert("observationPeriod".to_string(), "P1Y".to_string());
        config.insert("customProp".to_string(), "x".to_string());

        let props = ObservationProperties::from_config(config);
        assert_eq!(props.unit, "USDollar");
        assert_eq!(props.observation_period, "P1Y");
        assert_eq!(props.properties, r#"{"customProp":"x"}"#);

        let obs = props.observation("country/USA", "sv1", "2023", "5", "c/p/1");
        assert_eq!(obs.unit, "USDollar");
        assert_eq!(obs.scaling_factor, "");
    }

    #[test]
    fn test_no_extra_properties() {
        let props = ObservationProperties::from_config(BTreeMap::new());
        assert_eq!(props, ObservationProperties::default());
    }
}
