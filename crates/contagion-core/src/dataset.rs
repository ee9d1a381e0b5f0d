//! Labeled parent→child pairs: loading and validation.
//!
//! # Input formats
//!
//! - **CSV** with a header row. Column order is free; extra columns are ignored.
//! - **JSON**: an array of objects with the same field names.
//!
//! Required fields are listed in [`REQUIRED_COLUMNS`]; `thread_id` is optional.
//! Every problem in the batch is collected into one
//! [`ValidationReport`](crate::ValidationReport) rather than stopping at the
//! first bad row.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ContagionError, Result, ValidationReport};
use crate::taxonomy::Taxonomy;

/// Columns every input row must provide.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "pair_id",
    "parent_id",
    "child_id",
    "parent_macro_label",
    "parent_valence",
    "child_macro_label",
    "child_valence",
    "depth",
];

/// Optional grouping column used by outlier detection.
pub const THREAD_COLUMN: &str = "thread_id";

/// One parent→child reply relationship with its emotion labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledPair {
    pub pair_id: String,
    pub parent_id: String,
    pub child_id: String,
    pub parent_macro_label: String,
    pub parent_valence: f64,
    pub child_macro_label: String,
    pub child_valence: f64,
    /// Reply distance from the thread root; 1 is a direct reply.
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl LabeledPair {
    /// Child carries the parent's macro label.
    pub fn is_match(&self) -> bool {
        self.parent_macro_label == self.child_macro_label
    }

    /// Child valence minus parent valence.
    pub fn valence_shift(&self) -> f64 {
        self.child_valence - self.parent_valence
    }

    /// Thread id when present, otherwise the parent comment id.
    pub fn group_key(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(&self.parent_id)
    }
}

/// A validated, immutable batch of pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pairs: Vec<LabeledPair>,
}

impl Dataset {
    /// Validate typed records against the taxonomy.
    ///
    /// Labels are normalized to the taxonomy's lowercase spelling.
    pub fn from_pairs(pairs: Vec<LabeledPair>, taxonomy: &Taxonomy) -> Result<Self> {
        let mut report = ValidationReport::new();
        let mut seen: HashMap<String, usize> = HashMap::with_capacity(pairs.len());
        let mut out = Vec::with_capacity(pairs.len());

        for (i, mut pair) in pairs.into_iter().enumerate() {
            let row = i + 1;
            let id = pair.pair_id.trim().to_string();
            check_pair_id(&mut report, &mut seen, row, &id);
            pair.pair_id = id;
            let id = Some(pair.pair_id.as_str());

            for (field, value) in [
                ("parent_id", &pair.parent_id),
                ("child_id", &pair.child_id),
            ] {
                if value.trim().is_empty() {
                    report.push(row, id, field, "must not be empty");
                }
            }
            match check_label(taxonomy, &pair.parent_macro_label) {
                Ok(l) => pair.parent_macro_label = l,
                Err(msg) => report.push(row, id, "parent_macro_label", msg),
            }
            match check_label(taxonomy, &pair.child_macro_label) {
                Ok(l) => pair.child_macro_label = l,
                Err(msg) => report.push(row, id, "child_macro_label", msg),
            }
            if let Err(msg) = check_valence(pair.parent_valence) {
                report.push(row, id, "parent_valence", msg);
            }
            if let Err(msg) = check_valence(pair.child_valence) {
                report.push(row, id, "child_valence", msg);
            }
            if pair.depth < 1 {
                report.push(row, id, "depth", "must be >= 1");
            }
            out.push(pair);
        }

        report.into_result()?;
        log::debug!("validated {} pairs", out.len());
        Ok(Self { pairs: out })
    }

    /// Parse and validate CSV text with a header row.
    pub fn from_csv_str(text: &str, taxonomy: &Taxonomy) -> Result<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        // No header line at all reports every required column as missing.
        let header: Vec<String> = lines
            .next()
            .map(|line| {
                split_csv_line(line)
                    .into_iter()
                    .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        let mut report = ValidationReport::new();
        for col in REQUIRED_COLUMNS {
            if !header.iter().any(|h| h == col) {
                report.push(0, None, col, "missing required column");
            }
        }
        report.into_result()?;

        let records = lines.enumerate().map(|(i, line)| {
            let cells = split_csv_line(line);
            let fields = header
                .iter()
                .enumerate()
                .filter_map(|(c, name)| {
                    cells
                        .get(c)
                        .map(|v| (name.clone(), v.trim().to_string()))
                        .filter(|(_, v)| !v.is_empty())
                })
                .collect();
            RawRecord { row: i + 1, fields }
        });
        Self::from_raw(records, taxonomy)
    }

    /// Parse and validate a JSON array of pair objects.
    pub fn from_json_str(text: &str, taxonomy: &Taxonomy) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let serde_json::Value::Array(items) = value else {
            let mut report = ValidationReport::new();
            report.push(0, None, "document", "expected a JSON array of pair objects");
            return Err(ContagionError::Validation(report));
        };

        let mut report = ValidationReport::new();
        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let row = i + 1;
            let serde_json::Value::Object(map) = item else {
                report.push(row, None, "row", "expected a JSON object");
                continue;
            };
            let fields = map
                .into_iter()
                .filter_map(|(k, v)| {
                    let text = match v {
                        serde_json::Value::Null => return None,
                        serde_json::Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    };
                    Some((k.to_lowercase(), text))
                })
                .collect();
            records.push(RawRecord { row, fields });
        }
        report.into_result()?;
        Self::from_raw(records.into_iter(), taxonomy)
    }

    /// Load a batch from disk. `.csv` files are read as CSV, anything else as JSON.
    pub fn load(path: &Path, taxonomy: &Taxonomy) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        let dataset = if is_csv {
            Self::from_csv_str(&text, taxonomy)?
        } else {
            Self::from_json_str(&text, taxonomy)?
        };
        log::info!("loaded {} pairs from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    fn from_raw(records: impl Iterator<Item = RawRecord>, taxonomy: &Taxonomy) -> Result<Self> {
        let mut report = ValidationReport::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut pairs = Vec::new();

        for rec in records {
            let row = rec.row;
            let before = report.len();
            let pair_id = rec.get("pair_id").unwrap_or_default().to_string();
            let id = (!pair_id.is_empty()).then_some(pair_id.as_str());
            check_pair_id(&mut report, &mut seen, row, &pair_id);

            let mut text = |field: &str| -> String {
                match rec.get(field) {
                    Some(v) => v.to_string(),
                    None => {
                        report.push(row, id, field, "missing value");
                        String::new()
                    }
                }
            };
            let parent_id = text("parent_id");
            let child_id = text("child_id");
            let parent_raw = text("parent_macro_label");
            let child_raw = text("child_macro_label");
            let parent_valence_raw = text("parent_valence");
            let child_valence_raw = text("child_valence");
            let depth_raw = text("depth");

            let mut label = |field: &str, raw: &str| -> String {
                if raw.is_empty() {
                    return String::new();
                }
                check_label(taxonomy, raw).unwrap_or_else(|msg| {
                    report.push(row, id, field, msg);
                    String::new()
                })
            };
            let parent_macro_label = label("parent_macro_label", &parent_raw);
            let child_macro_label = label("child_macro_label", &child_raw);

            let mut valence = |field: &str, raw: &str| -> f64 {
                if raw.is_empty() {
                    return 0.0;
                }
                match raw.parse::<f64>() {
                    Ok(v) => match check_valence(v) {
                        Ok(()) => v,
                        Err(msg) => {
                            report.push(row, id, field, msg);
                            0.0
                        }
                    },
                    Err(_) => {
                        report.push(row, id, field, format!("not a number: '{raw}'"));
                        0.0
                    }
                }
            };
            let parent_valence = valence("parent_valence", &parent_valence_raw);
            let child_valence = valence("child_valence", &child_valence_raw);

            let depth = if depth_raw.is_empty() {
                0
            } else {
                match parse_depth(&depth_raw) {
                    Ok(d) => d,
                    Err(msg) => {
                        report.push(row, id, "depth", msg);
                        0
                    }
                }
            };

            if report.len() == before {
                pairs.push(LabeledPair {
                    pair_id,
                    parent_id,
                    child_id,
                    parent_macro_label,
                    parent_valence,
                    child_macro_label,
                    child_valence,
                    depth,
                    thread_id: rec.get(THREAD_COLUMN).map(str::to_string),
                });
            }
        }

        report.into_result()?;
        log::debug!("validated {} pairs", pairs.len());
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[LabeledPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Distinct depths present, ascending.
    pub fn depths(&self) -> BTreeSet<u32> {
        self.pairs.iter().map(|p| p.depth).collect()
    }

    /// Number of distinct outlier groups (thread or parent).
    pub fn group_count(&self) -> usize {
        self.pairs
            .iter()
            .map(LabeledPair::group_key)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// SHA-256 over the batch in `pair_id` order, independent of row order.
    pub fn fingerprint(&self) -> String {
        let mut sorted: Vec<&LabeledPair> = self.pairs.iter().collect();
        sorted.sort_by(|a, b| a.pair_id.cmp(&b.pair_id));
        let mut h = Sha256::new();
        for p in sorted {
            let line = format!(
                "{}\t{}\t{}\t{}\t{:e}\t{}\t{:e}\t{}\t{}\n",
                p.pair_id,
                p.parent_id,
                p.child_id,
                p.parent_macro_label,
                p.parent_valence,
                p.child_macro_label,
                p.child_valence,
                p.depth,
                p.thread_id.as_deref().unwrap_or(""),
            );
            h.update(line.as_bytes());
        }
        h.finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

struct RawRecord {
    row: usize,
    fields: HashMap<String, String>,
}

impl RawRecord {
    fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn check_pair_id(
    report: &mut ValidationReport,
    seen: &mut HashMap<String, usize>,
    row: usize,
    pair_id: &str,
) {
    if pair_id.is_empty() {
        report.push(row, None, "pair_id", "must not be empty");
    } else if let Some(first) = seen.get(pair_id) {
        report.push(
            row,
            Some(pair_id),
            "pair_id",
            format!("duplicate of row {first}"),
        );
    } else {
        seen.insert(pair_id.to_string(), row);
    }
}

fn check_label(taxonomy: &Taxonomy, raw: &str) -> std::result::Result<String, String> {
    match taxonomy.macro_index(raw) {
        Some(i) => Ok(taxonomy.macros()[i].clone()),
        None => Err(format!(
            "unknown macro label '{}' (expected one of: {})",
            raw.trim(),
            taxonomy.macros().join(", ")
        )),
    }
}

fn check_valence(v: f64) -> std::result::Result<(), String> {
    if !v.is_finite() {
        Err(format!("valence must be finite, got {v}"))
    } else if !(-1.0..=1.0).contains(&v) {
        Err(format!("valence {v} outside [-1, 1]"))
    } else {
        Ok(())
    }
}

fn parse_depth(raw: &str) -> std::result::Result<u32, String> {
    // Accept "2" and "2.0" (JSON writers sometimes emit integral floats).
    let value = match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => match raw.parse::<f64>() {
            Ok(f) if f.fract() == 0.0 && f.is_finite() => f as i64,
            _ => return Err(format!("not an integer: '{raw}'")),
        },
    };
    if value < 1 {
        return Err(format!("must be >= 1, got {value}"));
    }
    u32::try_from(value).map_err(|_| format!("depth {value} out of range"))
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    cells.push(cur);
    cells
}
