//! MCF importer
//!
//! In main-catalog mode the file is copied verbatim to
//! `<output_dir>/mcf/<relative path>`, apart from the generated catalog
//! files. Otherwise its nodes are converted to triples in two passes:
//! the first collects each local node's `dcid`, the second rewrites
//! subjects (and `l:` references) through that map. Forward references are
//! legal, so a single pass is not enough.

use std::collections::HashMap;
use tracing::info;

use stats_common::fs::InputFile;
use stats_common::{Error, Result, Triple, MAX_VALUE_CHARS};

use crate::importers::mcf_parser::{parse_mcf, McfRecord, McfValueType};
use crate::importers::ImportContext;
use crate::vocab::DCID;

/// Output subdirectory for verbatim copies in main-catalog mode
pub const MCF_COPY_DIR_NAME: &str = "mcf";

pub struct McfImporter {
    pub(crate) input_file: InputFile,
}

impl McfImporter {
    pub fn new(input_file: InputFile) -> Self {
        Self { input_file }
    }

    pub(crate) async fn do_import(&self, ctx: &mut ImportContext<'_>) -> Result<()> {
        if ctx.main_catalog {
            let output_file = ctx
                .output_dir
                .join(MCF_COPY_DIR_NAME)
                .join(self.input_file.relative_path());
            stats_common::fs::write_bytes(&output_file, &self.input_file.read_bytes()?)?;
            info!(
                "Copied {} to {}",
                self.input_file.relative_path(),
                output_file.display()
            );
            return Ok(());
        }

        let triples = mcf_to_triples(&self.input_file.read_to_string()?)?;
        info!(
            "Inserting {} triples from {}",
            triples.len(),
            self.input_file.relative_path()
        );
        ctx.store.insert_triples(&triples).await
    }
}

/// Convert MCF text to triples with every subject resolved to its dcid
pub fn mcf_to_triples(content: &str) -> Result<Vec<Triple>> {
    let mut local_to_dcid: HashMap<String, String> = HashMap::new();
    let mut records: Vec<McfRecord> = Vec::new();

    for record in parse_mcf(content)? {
        if record.predicate == DCID {
            local_to_dcid.insert(record.subject, record.value);
        } else {
            records.push(record);
        }
    }

    records
        .into_iter()
        .map(|record| to_triple(record, &local_to_dcid))
        .collect()
}

fn to_triple(record: McfRecord, local_to_dcid: &HashMap<String, String>) -> Result<Triple> {
    let len = record.value.chars().count();
    if len > MAX_VALUE_CHARS {
        return Err(Error::ValueTooLong {
            subject: record.subject,
            predicate: record.predicate,
            len,
            max: MAX_VALUE_CHARS,
        });
    }

    let subject = local_to_dcid
        .get(&record.subject)
        .ok_or_else(|| Error::UnresolvedId(record.subject.clone()))?;

    match record.value_type {
        McfValueType::Id => Triple::with_id(subject, record.predicate, record.value),
        McfValueType::LocalRef => {
            let object_id = local_to_dcid
                .get(&record.value)
                .cloned()
                .unwrap_or(record.value);
            Triple::with_id(subject, record.predicate, object_id)
        }
        McfValueType::Text | McfValueType::Number => {
            Triple::with_value(subject, record.predicate, record.value)
        }
    }
}
