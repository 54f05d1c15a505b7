//! MCF tokenizer
//!
//! Turns MCF text into flat `(subject, predicate, value, value type)`
//! records. Subjects are left as written (local ids); resolving them to
//! dcids is the importer's job.
//!
//! ```text
//! Node: l:var1
//! dcid: "custom/var1"
//! typeOf: dcs:StatisticalVariable
//! name: "Variable 1", "Var 1"
//! ```

use stats_common::{Error, Result};

use crate::vocab::DCID;

const NODE_KEY: &str = "Node";
const LOCAL_PREFIX: &str = "l:";
const ID_PREFIXES: &[&str] = &["dcid:", "dcs:", "schema:"];

/// How a record's value is to be stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McfValueType {
    /// Reference to a node by dcid
    Id,
    /// Reference to a node declared in the same file
    LocalRef,
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McfRecord {
    /// Local id of the node the record belongs to
    pub subject: String,
    pub predicate: String,
    pub value: String,
    pub value_type: McfValueType,
}

/// Parse MCF text into records, in file order
///
/// A `Node:` written as `dcid:X` also yields a `dcid` record for itself.
pub fn parse_mcf(content: &str) -> Result<Vec<McfRecord>> {
    let mut records = Vec::new();
    let mut subject: Option<String> = None;

    for (index, raw_line) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            continue;
        }

        let (key, rest) = line.split_once(':').ok_or_else(|| {
            Error::InvalidInput(format!(
                "Malformed MCF line {}: expected '<property>: <values>'",
                line_number
            ))
        })?;
        let key = key.trim();
        let rest = rest.trim();

        if key == NODE_KEY {
            let node = unquote(rest);
            if node.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Empty node id on MCF line {}",
                    line_number
                )));
            }
            let local_id = node.strip_prefix(LOCAL_PREFIX).unwrap_or(node).to_string();
            if let Some(dcid) = strip_id_prefix(node) {
                records.push(McfRecord {
                    subject: local_id.clone(),
                    predicate: DCID.to_string(),
                    value: dcid.to_string(),
                    value_type: McfValueType::Text,
                });
            }
            subject = Some(local_id);
            continue;
        }

        let current = subject.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!(
                "MCF property '{}' on line {} appears before any Node",
                key, line_number
            ))
        })?;

        for token in split_values(rest, line_number)? {
            let (value, value_type) = if key == DCID {
                let dcid = unquote(&token);
                let dcid = strip_id_prefix(dcid).unwrap_or(dcid);
                (dcid.to_string(), McfValueType::Text)
            } else {
                classify(&token)
            };
            if value.is_empty() {
                continue;
            }
            records.push(McfRecord {
                subject: current.clone(),
                predicate: key.to_string(),
                value,
                value_type,
            });
        }
    }

    Ok(records)
}

fn strip_id_prefix(value: &str) -> Option<&str> {
    ID_PREFIXES.iter().find_map(|prefix| value.strip_prefix(prefix))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn classify(token: &str) -> (String, McfValueType) {
    let token = token.trim();
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        return (token[1..token.len() - 1].replace("\\\"", "\""), McfValueType::Text);
    }
    if let Some(local) = token.strip_prefix(LOCAL_PREFIX) {
        return (local.to_string(), McfValueType::LocalRef);
    }
    if let Some(dcid) = strip_id_prefix(token) {
        return (dcid.to_string(), McfValueType::Id);
    }
    if token.parse::<f64>().is_ok() {
        return (token.to_string(), McfValueType::Number);
    }
    // Bare words are references.
    (token.to_string(), McfValueType::Id)
}

/// Split a comma-separated value list, keeping quoted commas
fn split_values(values: &str, line_number: usize) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in values.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                tokens.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(Error::InvalidInput(format!(
            "Unterminated quote on MCF line {}",
            line_number
        )));
    }
    tokens.push(current.trim().to_string());
    Ok(tokens.into_iter().filter(|t| !t.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject: &str, predicate: &str, value: &str, value_type: McfValueType) -> McfRecord {
        McfRecord {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            value: value.to_string(),
            value_type,
        }
    }

    #[test]
    fn test_parse_local_node() {
        let mcf = r#"
// comment
Node: l:var1
dcid: "custom/var1"
typeOf: dcs:StatisticalVariable
name: "Variable, 1", "Var 1"
populationType: Person
count: 5
"#;
        let records = parse_mcf(mcf).unwrap();
        assert_eq!(
            records,
            vec![
                record("var1", "dcid", "custom/var1", McfValueType::Text),
                record("var1", "typeOf", "StatisticalVariable", McfValueType::Id),
                record("var1", "name", "Variable, 1", McfValueType::Text),
                record("var1", "name", "Var 1", McfValueType::Text),
                record("var1", "populationType", "Person", McfValueType::Id),
                record("var1", "count", "5", McfValueType::Number),
            ]
        );
    }

    #[test]
    fn test_dcid_node_declares_itself() {
        let records = parse_mcf("Node: dcid:Person\nname: \"Person\"\n").unwrap();
        assert_eq!(records[0], record("dcid:Person", "dcid", "Person", McfValueType::Text));
        assert_eq!(records[1].subject, "dcid:Person");
    }

    #[test]
    fn test_local_reference() {
        let records = parse_mcf("Node: a\ndcid: \"x/a\"\nparent: l:b\n").unwrap();
        assert_eq!(records[1], record("a", "parent", "b", McfValueType::LocalRef));
    }

    #[test]
    fn test_property_before_node_fails() {
        assert!(parse_mcf("name: \"orphan\"\n").is_err());
    }

    #[test]
    fn test_unterminated_quote_fails() {
        assert!(parse_mcf("Node: a\nname: \"open\n").is_err());
    }
}
