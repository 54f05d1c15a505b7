//! Natural-language sentences for embedding generation

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

use stats_common::{Result, Triple};

use crate::vocab::{NAME, SEARCH_DESCRIPTION};

pub const SENTENCES_FILE_NAME: &str = "sentences.csv";

const SENTENCE_SEPARATOR: &str = "; ";

/// Write `dcid,sentence` rows for every subject with a search description or
/// name; subjects keep their first-seen order
pub fn generate_nl_sentences(triples: &[Triple], nl_dir: &Path) -> Result<PathBuf> {
    let mut order: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut descriptions: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut names: HashMap<&str, &str> = HashMap::new();

    for triple in triples {
        let subject = triple.subject_id();
        let Some(value) = triple.object_value() else {
            continue;
        };
        match triple.predicate() {
            SEARCH_DESCRIPTION => descriptions.entry(subject).or_default().push(value),
            NAME => {
                names.entry(subject).or_insert(value);
            }
            _ => continue,
        }
        if seen.insert(subject) {
            order.push(subject);
        }
    }

    std::fs::create_dir_all(nl_dir)?;
    let path = nl_dir.join(SENTENCES_FILE_NAME);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["dcid", "sentence"])?;

    let mut written = 0usize;
    for subject in order {
        let sentence = match descriptions.get(subject) {
            Some(sentences) => sentences.join(SENTENCE_SEPARATOR),
            None => match names.get(subject) {
                Some(name) => name.to_string(),
                None => continue,
            },
        };
        writer.write_record([subject, sentence.as_str()])?;
        written += 1;
    }
    writer.flush()?;

    info!("Wrote {} NL sentences to {}", written, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_descriptions_preferred_over_names() {
        let dir = TempDir::new().unwrap();
        let triples = vec![
            Triple::with_value("sv2", NAME, "Second").unwrap(),
            Triple::with_value("sv1", NAME, "First").unwrap(),
            Triple::with_value("sv1", SEARCH_DESCRIPTION, "first thing").unwrap(),
            Triple::with_value("sv1", SEARCH_DESCRIPTION, "the first").unwrap(),
            Triple::with_id("sv3", "typeOf", "StatisticalVariable").unwrap(),
        ];

        let path = generate_nl_sentences(&triples, dir.path()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            "dcid,sentence\nsv2,Second\nsv1,first thing; the first\n"
        );
    }

    #[test]
    fn test_many_subjects() {
        let dir = TempDir::new().unwrap();
        let count = 50_000;
        let mut triples = Vec::with_capacity(count * 3);
        for i in 0..count {
            let id = format!("sv{}", i);
            triples.push(Triple::with_id(&id, "typeOf", "StatisticalVariable").unwrap());
            triples.push(Triple::with_value(&id, NAME, format!("Variable {}", i)).unwrap());
            triples.push(Triple::with_value(&id, SEARCH_DESCRIPTION, format!("variable {}", i)).unwrap());
        }

        let started = std::time::Instant::now();
        let path = generate_nl_sentences(&triples, dir.path()).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(10));

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), count + 1);
        assert_eq!(content.lines().nth(1), Some("sv0,variable 0"));
        assert_eq!(content.lines().last(), Some("sv49999,variable 49999"));
    }
}
