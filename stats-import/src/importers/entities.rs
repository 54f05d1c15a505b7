//! Entities importer
//!
//! Each row describes one entity of the file's `rowEntityType`. The dcid
//! comes from `idColumn` (default: the first column); every other column is
//! a property, named through `columnMappings` when mapped. Values in
//! `entityColumns` are references to other nodes.

use std::collections::BTreeMap;
use tracing::info;

use stats_common::fs::InputFile;
use stats_common::{Error, Result, Triple};

use crate::config::Config;
use crate::importers::{kept_columns, open_csv, ImportContext, INSERT_BATCH_SIZE};
use crate::vocab::TYPE_OF;

pub struct EntitiesImporter {
    pub(crate) input_file: InputFile,
    entity_type: String,
    id_column: Option<String>,
    entity_columns: Vec<String>,
    ignore_columns: Vec<String>,
    column_mappings: BTreeMap<String, String>,
}

/// A property column: row index, predicate, whether values are references
struct PropertyColumn {
    index: usize,
    predicate: String,
    is_reference: bool,
}

impl EntitiesImporter {
    pub fn new(input_file: InputFile, config: &Config) -> Result<Self> {
        let entity_type = config
            .row_entity_type(&input_file)
            .or_else(|| config.entity_type(&input_file))
            .ok_or_else(|| {
                Error::Config(format!(
                    "rowEntityType not specified for entities file: {}",
                    input_file.relative_path()
                ))
            })?;

        Ok(Self {
            id_column: config.id_column(&input_file),
            entity_columns: config.entity_columns(&input_file),
            ignore_columns: config.ignore_columns(&input_file),
            column_mappings: config.column_mappings(&input_file),
            entity_type,
            input_file,
        })
    }

    pub(crate) async fn do_import(&self, ctx: &mut ImportContext<'_>) -> Result<()> {
        let mut reader = open_csv(&self.input_file)?;
        let headers = reader.headers()?.clone();
        let columns = kept_columns(&headers, &self.ignore_columns);

        let id_index = match &self.id_column {
            Some(id_column) => columns
                .iter()
                .find(|(_, name)| name == id_column)
                .map(|(index, _)| *index)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Id column {} not found in {}",
                        id_column,
                        self.input_file.relative_path()
                    ))
                })?,
            None => columns.first().map(|(index, _)| *index).ok_or_else(|| {
                Error::InvalidInput(format!("{} has no columns", self.input_file.relative_path()))
            })?,
        };

        let properties: Vec<PropertyColumn> = columns
            .iter()
            .filter(|(index, _)| *index != id_index)
            .map(|(index, name)| {
                let predicate = self.column_mappings.get(name).unwrap_or(name).clone();
                PropertyColumn {
                    index: *index,
                    is_reference: self.entity_columns.contains(name)
                        || self.entity_columns.contains(&predicate),
                    predicate,
                }
            })
            .collect();

        let entity_type_id = ctx.nodes.entity_type(&self.entity_type);

        let mut batch: Vec<Triple> = Vec::with_capacity(INSERT_BATCH_SIZE);
        let mut num_entities = 0usize;

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let dcid = record.get(id_index).unwrap_or_default();
            if dcid.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Empty entity id in row {} of {}",
                    row + 1,
                    self.input_file.relative_path()
                )));
            }

            batch.push(Triple::with_id(dcid, TYPE_OF, &entity_type_id)?);
            for property in &properties {
                let value = record.get(property.index).unwrap_or_default();
                if value.is_empty() {
                    continue;
                }
                let triple = if property.is_reference {
                    Triple::with_id(dcid, &property.predicate, value)?
                } else {
                    Triple::with_value(dcid, &property.predicate, value)?
                };
                batch.push(triple);
            }

            num_entities += 1;
            if batch.len() >= INSERT_BATCH_SIZE {
                ctx.store.insert_triples(&batch).await?;
                batch.clear();
            }
        }
        ctx.store.insert_triples(&batch).await?;

        info!(
            "Imported {} {} entities from {}",
            num_entities,
            self.entity_type,
            self.input_file.relative_path()
        );
        Ok(())
    }
}
