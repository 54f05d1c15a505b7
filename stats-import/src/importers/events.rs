//! Events importer
//!
//! Each row is one event of the file's configured event type. The first
//! column is the place the event happened, the second its date, and the
//! remaining columns become properties of the event node. Events are also
//! counted into a `Count_<eventType>` variable, aggregated per place and
//! period.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use stats_common::fs::InputFile;
use stats_common::{Error, Observation, Result, Triple};

use crate::config::Config;
use crate::importers::{kept_columns, open_csv, write_debug_resolve, ImportContext, INSERT_BATCH_SIZE};
use crate::models::{AggregationConfig, AggregationMethod};
use crate::vocab::*;

const COUNT_VARIABLE_PREFIX: &str = "Count_";

pub struct EventsImporter {
    pub(crate) input_file: InputFile,
    event_type: String,
    entity_type: String,
    id_column: Option<String>,
    value_column: Option<String>,
    entity_columns: Vec<String>,
    ignore_columns: Vec<String>,
    provenance_name: String,
    count_variable: String,
    aggregation: AggregationConfig,
}

/// Running totals for one (place, period)
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    count: usize,
    sum: f64,
}

impl Accumulator {
    fn value(&self, method: AggregationMethod) -> String {
        match method {
            AggregationMethod::Count => self.count.to_string(),
            AggregationMethod::Sum => format_number(self.sum),
            AggregationMethod::Mean if self.count > 0 => {
                format_number(self.sum / self.count as f64)
            }
            AggregationMethod::Mean => "0".to_string(),
        }
    }
}

impl EventsImporter {
    pub fn new(input_file: InputFile, config: &Config) -> Result<Self> {
        let event_type = config.event_type(&input_file).ok_or_else(|| {
            Error::Config(format!(
                "eventType not specified for events file: {}",
                input_file.relative_path()
            ))
        })?;
        let count_variable = format!("{}{}", COUNT_VARIABLE_PREFIX, event_type);
        let aggregation = config.aggregation(&count_variable)?;

        Ok(Self {
            entity_type: config.entity_type(&input_file).unwrap_or_default(),
            id_column: config.id_column(&input_file),
            value_column: config.value_column(&input_file),
            entity_columns: config.entity_columns(&input_file),
            ignore_columns: config.ignore_columns(&input_file),
            provenance_name: config.provenance_name(&input_file),
            event_type,
            count_variable,
            aggregation,
            input_file,
        })
    }

    /// File part of synthesized event ids: the relative path without its
    /// extension, whitespace replaced by `_`
    fn id_path(&self) -> String {
        let path = self.input_file.relative_path();
        let name_start = path.rfind('/').map_or(0, |i| i + 1);
        let without_extension = match path[name_start..].rfind('.') {
            Some(dot) if dot > 0 => &path[..name_start + dot],
            _ => path,
        };
        without_extension
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect()
    }

    pub(crate) async fn do_import(&self, ctx: &mut ImportContext<'_>) -> Result<()> {
        let mut reader = open_csv(&self.input_file)?;
        let headers = reader.headers()?.clone();
        let columns = kept_columns(&headers, &self.ignore_columns);
        if columns.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "{}: expected a location column and a date column, found {} column(s)",
                self.input_file.relative_path(),
                columns.len()
            )));
        }

        let find_column = |name: &str| -> Result<usize> {
            columns
                .iter()
                .find(|(_, column)| column == name)
                .map(|(index, _)| *index)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Column {} not found in {}",
                        name,
                        self.input_file.relative_path()
                    ))
                })
        };
        let id_index = self.id_column.as_deref().map(find_column).transpose()?;
        let value_index = self.value_column.as_deref().map(find_column).transpose()?;

        let (location_index, _) = columns[0];
        let (date_index, _) = columns[1];
        let property_columns: Vec<(usize, String)> = columns[2..]
            .iter()
            .filter(|(index, _)| Some(*index) != id_index)
            .cloned()
            .collect();

        let event_type_id = ctx.nodes.event_type(&self.event_type);
        let provenance = ctx.nodes.provenance(&self.provenance_name);
        let id_path = self.id_path();

        let mut batch: Vec<Triple> = Vec::with_capacity(INSERT_BATCH_SIZE);
        let mut totals: BTreeMap<(String, String), Accumulator> = BTreeMap::new();
        let mut locations = BTreeSet::new();
        let mut num_events = 0usize;

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let row_number = row + 1;
            let location = record.get(location_index).unwrap_or_default();
            let date = record.get(date_index).unwrap_or_default();

            let event_id = match id_index {
                Some(index) => record.get(index).unwrap_or_default().to_string(),
                None => format!("{}/{}/{}", event_type_id, id_path, row_number),
            };
            if event_id.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Empty event id in row {} of {}",
                    row_number,
                    self.input_file.relative_path()
                )));
            }

            batch.push(Triple::with_id(&event_id, TYPE_OF, &event_type_id)?);
            if !location.is_empty() {
                batch.push(Triple::with_id(&event_id, AFFECTED_PLACE, location)?);
                locations.insert(location.to_string());
            }
            if !date.is_empty() {
                batch.push(Triple::with_value(&event_id, OBSERVATION_DATE, date)?);
            }
            for (index, column) in &property_columns {
                let value = record.get(*index).unwrap_or_default();
                if value.is_empty() {
                    continue;
                }
                let triple = if self.entity_columns.contains(column) {
                    Triple::with_id(&event_id, column, value)?
                } else {
                    Triple::with_value(&event_id, column, value)?
                };
                batch.push(triple);
            }

            if !location.is_empty() && !date.is_empty() {
                let contribution = match value_index {
                    Some(index) => parse_value(record.get(index).unwrap_or_default(), row_number)?,
                    None => 1.0,
                };
                let period = self.aggregation.period.truncate(date).to_string();
                let total = totals.entry((location.to_string(), period)).or_default();
                total.count += 1;
                total.sum += contribution;
            }

            num_events += 1;
            if batch.len() >= INSERT_BATCH_SIZE {
                ctx.store.insert_triples(&batch).await?;
                batch.clear();
            }
        }
        ctx.store.insert_triples(&batch).await?;

        let count_variable = self.count_variable(ctx, &event_type_id)?;
        let observations: Vec<Observation> = totals
            .into_iter()
            .map(|((location, period), total)| Observation {
                entity: location,
                variable: count_variable.clone(),
                date: period,
                value: total.value(self.aggregation.method),
                provenance: provenance.clone(),
                ..Default::default()
            })
            .collect();
        ctx.store.insert_observations(&observations).await?;

        write_debug_resolve(
            &ctx.debug_resolve_file(&self.input_file),
            &self.entity_type,
            locations,
        )?;

        info!(
            "Imported {} {} events and {} aggregate observations from {}",
            num_events,
            self.event_type,
            observations.len(),
            self.input_file.relative_path()
        );
        Ok(())
    }

    /// Register the count variable, giving it default schema properties
    fn count_variable(&self, ctx: &mut ImportContext<'_>, event_type_id: &str) -> Result<String> {
        let sv = ctx
            .nodes
            .variable_with_id(&self.count_variable, &self.count_variable);
        if sv.properties.is_empty() {
            debug!("Using default properties for {}", sv.id);
            for (property, value) in [
                (POPULATION_TYPE, event_type_id),
                (MEASURED_PROPERTY, "count"),
                (STAT_TYPE, "measuredValue"),
            ] {
                ctx.nodes.add_triple(Triple::with_id(&sv.id, property, value)?);
            }
        }
        Ok(sv.id)
    }
}

fn parse_value(value: &str, row_number: usize) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        Error::InvalidInput(format!(
            "Non-numeric event value '{}' in row {}",
            value, row_number
        ))
    })
}

/// Format without a trailing `.0` for whole numbers
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_values() {
        let total = Accumulator { count: 4, sum: 10.0 };
        assert_eq!(total.value(AggregationMethod::Count), "4");
        assert_eq!(total.value(AggregationMethod::Sum), "10");
        assert_eq!(total.value(AggregationMethod::Mean), "2.5");
    }

    #[test]
    fn test_missing_event_type_fails() {
        let config = Config::from_value(serde_json::json!({
            "inputFiles": {"events.csv": {"importType": "events"}}
        }))
        .unwrap();
        let result = EventsImporter::new(InputFile::new("/input", "events.csv"), &config);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_id_path() {
        let config = Config::from_value(serde_json::json!({
            "inputFiles": {"**/*fires*.csv": {"importType": "events", "eventType": "Fire"}}
        }))
        .unwrap();
        let id_path = |relative_path: &str| {
            EventsImporter::new(InputFile::new("/input", relative_path), &config)
                .unwrap()
                .id_path()
        };
        assert_eq!(id_path("fires.csv"), "fires");
        assert_eq!(id_path("2022/fires.csv"), "2022/fires");
        assert_eq!(id_path("2023/fires.csv"), "2023/fires");
        assert_eq!(id_path("v1.2/big fires.csv"), "v1.2/big_fires");
    }
}
