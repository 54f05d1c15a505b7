//! Variable-per-row observations importer
//!
//! Each row is one observation. Standard columns are `entity`, `variable`,
//! `date` and `value` (required) plus optional `unit`, `scalingFactor`,
//! `measurementMethod`, `observationPeriod` and `properties`. A file may use
//! its own header names through `columnMappings`. Variables are dcids and
//! are not registered with the node registry.
//!
//! Rows are streamed to the store in batches, since these files tend to be
//! large.

use std::collections::BTreeMap;
use tracing::info;

use stats_common::fs::InputFile;
use stats_common::{Error, Observation, Result};

use crate::config::Config;
use crate::importers::{open_csv, ImportContext, INSERT_BATCH_SIZE};

const ENTITY: &str = "entity";
const VARIABLE: &str = "variable";
const DATE: &str = "date";
const VALUE: &str = "value";
const UNIT: &str = "unit";
const SCALING_FACTOR: &str = "scalingFactor";
const MEASUREMENT_METHOD: &str = "measurementMethod";
const OBSERVATION_PERIOD: &str = "observationPeriod";
const PROPERTIES: &str = "properties";

const REQUIRED_COLUMNS: &[&str] = &[ENTITY, VARIABLE, DATE, VALUE];
const OPTIONAL_COLUMNS: &[&str] = &[
    UNIT,
    SCALING_FACTOR,
    MEASUREMENT_METHOD,
    OBSERVATION_PERIOD,
    PROPERTIES,
];

pub struct VariablePerRowImporter {
    pub(crate) input_file: InputFile,
    column_mappings: BTreeMap<String, String>,
    provenance_name: String,
}

/// Row indices of the standard columns
struct ColumnIndices {
    required: [usize; 4],
    optional: BTreeMap<&'static str, usize>,
}

impl ColumnIndices {
    fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> &'r str {
        self.optional
            .get(column)
            .and_then(|index| record.get(*index))
            .unwrap_or_default()
    }
}

impl VariablePerRowImporter {
    pub fn new(input_file: InputFile, config: &Config) -> Self {
        Self {
            column_mappings: config.column_mappings(&input_file),
            provenance_name: config.provenance_name(&input_file),
            input_file,
        }
    }

    fn header_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.column_mappings
            .get(column)
            .map(String::as_str)
            .unwrap_or(column)
    }

    fn column_indices(&self, headers: &csv::StringRecord) -> Result<ColumnIndices> {
        let position = |column: &str| {
            let name = self.header_name(column);
            headers.iter().position(|h| h == name)
        };

        let mut required = [0usize; 4];
        for (slot, column) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = position(*column).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Column {} not found in {}",
                    self.header_name(*column),
                    self.input_file.relative_path()
                ))
            })?;
        }

        let optional = OPTIONAL_COLUMNS
            .iter()
            .filter_map(|column| position(*column).map(|index| (*column, index)))
            .collect();

        Ok(ColumnIndices { required, optional })
    }

    pub(crate) async fn do_import(&self, ctx: &mut ImportContext<'_>) -> Result<()> {
        let mut reader = open_csv(&self.input_file)?;
        let headers = reader.headers()?.clone();
        let indices = self.column_indices(&headers)?;
        let provenance = ctx.nodes.provenance(&self.provenance_name);

        let [entity, variable, date, value] = indices.required;
        let mut batch = Vec::with_capacity(INSERT_BATCH_SIZE);
        let mut total = 0usize;

        for record in reader.records() {
            let record = record?;
            let field = |index: usize| record.get(index).unwrap_or_default().to_string();
            let observation = Observation {
                entity: field(entity),
                variable: field(variable),
                date: field(date),
                value: field(value),
                provenance: provenance.clone(),
                unit: indices.get(&record, UNIT).to_string(),
                scaling_factor: indices.get(&record, SCALING_FACTOR).to_string(),
                measurement_method: indices.get(&record, MEASUREMENT_METHOD).to_string(),
                observation_period: indices.get(&record, OBSERVATION_PERIOD).to_string(),
                properties: indices.get(&record, PROPERTIES).to_string(),
            };
            if observation.entity.is_empty()
                || observation.variable.is_empty()
                || observation.value.is_empty()
            {
                continue;
            }

            batch.push(observation);
            if batch.len() >= INSERT_BATCH_SIZE {
                total += batch.len();
                ctx.store.insert_observations(&batch).await?;
                batch.clear();
            }
        }

        total += batch.len();
        ctx.store.insert_observations(&batch).await?;

        info!(
            "Inserted {} observations from {}",
            total,
            self.input_file.relative_path()
        );
        Ok(())
    }
}
