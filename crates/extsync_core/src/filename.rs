//! Parameter extraction from trace file names.
//!
//! A pattern is a `_`-separated list of tokens. Each token is either a
//! literal, a `*` wildcard that matches any single token, or a field of the
//! form `prefix{label}suffix` whose middle part is an integer. For example
//! `synthetic_{reps}reps_interop{interop_compute_ms}ms_trial{trial}`
//! matches `synthetic_5reps_interop10ms_trial3.json`.
//!
//! Only the final path component is considered and its last extension is
//! ignored. Mismatches are errors, never silently mislabelled data.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOKEN_DELIMITER: char = '_';
pub const WILDCARD: &str = "*";

pub type FileNameParams = BTreeMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("file name pattern cannot be empty")]
    Empty,
    #[error("file name pattern '{pattern}' has unbalanced braces")]
    Unbalanced { pattern: String },
    #[error("file name pattern '{pattern}' has an empty token at position {position}")]
    EmptyToken { pattern: String, position: usize },
    #[error("token '{token}' holds more than one field")]
    MultipleFields { token: String },
    #[error("token '{token}' has an invalid field label")]
    InvalidLabel { token: String },
    #[error("field '{label}' appears more than once")]
    DuplicateLabel { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileNameError {
    #[error("file name '{name}' has {actual} tokens but pattern '{pattern}' expects {expected}")]
    TokenCount {
        name: String,
        pattern: String,
        expected: usize,
        actual: usize,
    },
    #[error("file name '{name}': token '{token}' does not match literal '{expected}'")]
    LiteralMismatch {
        name: String,
        token: String,
        expected: String,
    },
    #[error("file name '{name}': token '{token}' does not match '{prefix}{{{label}}}{suffix}'")]
    AffixMismatch {
        name: String,
        token: String,
        label: String,
        prefix: String,
        suffix: String,
    },
    #[error("file name '{name}': field '{label}' value '{value}' is not an integer")]
    NotAnInteger {
        name: String,
        label: String,
        value: String,
    },
    #[error("cannot render pattern '{pattern}': missing value for field '{label}'")]
    MissingValue { pattern: String, label: String },
    #[error("cannot render pattern '{pattern}': it contains a wildcard")]
    Wildcard { pattern: String },
    #[error("path '{path}' has no usable file name")]
    NoFileName { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Wildcard,
    Field {
        prefix: String,
        label: String,
        suffix: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileNameGrammar {
    pattern: String,
    tokens: Vec<Token>,
}

impl FileNameGrammar {
    pub fn parse(pattern: &str) -> Result<Self, GrammarError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(GrammarError::Empty);
        }

        let mut tokens = Vec::new();
        for (position, raw) in split_outside_braces(pattern)?.into_iter().enumerate() {
            if raw.is_empty() {
                return Err(GrammarError::EmptyToken {
                    pattern: pattern.to_string(),
                    position,
                });
            }
            tokens.push(parse_token(raw)?);
        }

        let mut seen = Vec::new();
        for token in &tokens {
            if let Token::Field { label, .. } = token {
                if seen.contains(&label) {
                    return Err(GrammarError::DuplicateLabel {
                        label: label.clone(),
                    });
                }
                seen.push(label);
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            tokens,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Field labels in positional order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Field { label, .. } => Some(label.as_str()),
            _ => None,
        })
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels().any(|candidate| candidate == label)
    }

    pub fn has_wildcard(&self) -> bool {
        self.tokens.iter().any(|token| *token == Token::Wildcard)
    }

    pub fn extract(&self, file_name: &str) -> Result<FileNameParams, FileNameError> {
        let name = file_stem(file_name)?;
        let parts: Vec<&str> = name.split(TOKEN_DELIMITER).collect();
        if parts.len() != self.tokens.len() {
            return Err(FileNameError::TokenCount {
                name: name.to_string(),
                pattern: self.pattern.clone(),
                expected: self.tokens.len(),
                actual: parts.len(),
            });
        }

        let mut params = FileNameParams::new();
        for (token, part) in self.tokens.iter().zip(parts) {
            match token {
                Token::Wildcard => {}
                Token::Literal(expected) => {
                    if part != expected {
                        return Err(FileNameError::LiteralMismatch {
                            name: name.to_string(),
                            token: part.to_string(),
                            expected: expected.clone(),
                        });
                    }
                }
                Token::Field {
                    prefix,
                    label,
                    suffix,
                } => {
                    let value = part
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                        .ok_or_else(|| FileNameError::AffixMismatch {
                            name: name.to_string(),
                            token: part.to_string(),
                            label: label.clone(),
                            prefix: prefix.clone(),
                            suffix: suffix.clone(),
                        })?;
                    let parsed = value
                        .parse::<i64>()
                        .map_err(|_| FileNameError::NotAnInteger {
                            name: name.to_string(),
                            label: label.clone(),
                            value: value.to_string(),
                        })?;
                    params.insert(label.clone(), parsed);
                }
            }
        }
        Ok(params)
    }

    pub fn extract_path(&self, path: &Path) -> Result<FileNameParams, FileNameError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| FileNameError::NoFileName {
                path: path.display().to_string(),
            })?;
        self.extract(name)
    }

    /// Renders a file stem (no extension) from field values.
    pub fn render(&self, values: &FileNameParams) -> Result<String, FileNameError> {
        let mut parts = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            match token {
                Token::Wildcard => {
                    return Err(FileNameError::Wildcard {
                        pattern: self.pattern.clone(),
                    })
                }
                Token::Literal(literal) => parts.push(literal.clone()),
                Token::Field {
                    prefix,
                    label,
                    suffix,
                } => {
                    let value = values.get(label).ok_or_else(|| FileNameError::MissingValue {
                        pattern: self.pattern.clone(),
                        label: label.clone(),
                    })?;
                    parts.push(format!("{prefix}{value}{suffix}"));
                }
            }
        }
        Ok(parts.join(&TOKEN_DELIMITER.to_string()))
    }
}

impl FromStr for FileNameGrammar {
    type Err = GrammarError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        Self::parse(pattern)
    }
}

impl TryFrom<String> for FileNameGrammar {
    type Error = GrammarError;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::parse(&pattern)
    }
}

impl From<FileNameGrammar> for String {
    fn from(grammar: FileNameGrammar) -> Self {
        grammar.pattern
    }
}

impl fmt::Display for FileNameGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn file_stem(file_name: &str) -> Result<&str, FileNameError> {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| FileNameError::NoFileName {
            path: file_name.to_string(),
        })
}

// Labels may contain '_', so only split at brace depth zero.
fn split_outside_braces(pattern: &str) -> Result<Vec<&str>, GrammarError> {
    let unbalanced = || GrammarError::Unbalanced {
        pattern: pattern.to_string(),
    };
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (index, c) in pattern.char_indices() {
        match c {
            '{' => {
                if depth > 0 {
                    return Err(unbalanced());
                }
                depth += 1;
            }
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(unbalanced)?;
            }
            TOKEN_DELIMITER if depth == 0 => {
                parts.push(&pattern[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(unbalanced());
    }
    parts.push(&pattern[start..]);
    Ok(parts)
}

fn parse_token(raw: &str) -> Result<Token, GrammarError> {
    if raw == WILDCARD {
        return Ok(Token::Wildcard);
    }
    let Some(open) = raw.find('{') else {
        return Ok(Token::Literal(raw.to_string()));
    };
    let close = raw[open..]
        .find('}')
        .map(|offset| open + offset)
        .ok_or_else(|| GrammarError::Unbalanced {
            pattern: raw.to_string(),
        })?;
    let prefix = &raw[..open];
    let label = &raw[open + 1..close];
    let suffix = &raw[close + 1..];
    if suffix.contains('{') || suffix.contains('}') {
        return Err(GrammarError::MultipleFields {
            token: raw.to_string(),
        });
    }
    let label_is_valid = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !label_is_valid {
        return Err(GrammarError::InvalidLabel {
            token: raw.to_string(),
        });
    }
    Ok(Token::Field {
        prefix: prefix.to_string(),
        label: label.to_string(),
        suffix: suffix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNTHETIC: &str =
        "synthetic_{reps}reps_interop{interop_compute_ms}ms_globaldb{globaldb_ms}ms_trial{trial}";

    #[test]
    fn extract_reads_every_field_of_a_synthetic_trace_name() {
        let grammar = FileNameGrammar::parse(SYNTHETIC).expect("pattern should parse");

        let params = grammar
            .extract("synthetic_5reps_interop10ms_globaldb3ms_trial3.json")
            .expect("name should match");

        assert_eq!(
            params,
            FileNameParams::from([
                ("globaldb_ms".to_string(), 3),
                ("interop_compute_ms".to_string(), 10),
                ("reps".to_string(), 5),
                ("trial".to_string(), 3),
            ])
        );
    }

    #[test]
    fn labels_follow_pattern_order() {
        let grammar = FileNameGrammar::parse(SYNTHETIC).expect("pattern should parse");
        let labels: Vec<&str> = grammar.labels().collect();
        assert_eq!(
            labels,
            vec!["reps", "interop_compute_ms", "globaldb_ms", "trial"]
        );
    }

    #[test]
    fn wildcard_skips_a_token() {
        let grammar = FileNameGrammar::parse("*_trial{trial}").expect("pattern should parse");

        let params = grammar
            .extract("/traces/graderbot/ext_sync/anything_trial12.ndjson")
            .expect("name should match");

        assert_eq!(params, FileNameParams::from([("trial".to_string(), 12)]));
    }

    #[test]
    fn extract_fails_loudly_on_token_count_mismatch() {
        let grammar = FileNameGrammar::parse(SYNTHETIC).expect("pattern should parse");

        let error = grammar
            .extract("synthetic_5reps_trial3.json")
            .expect_err("name should not match");

        assert!(matches!(
            error,
            FileNameError::TokenCount {
                expected: 5,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn extract_fails_loudly_on_non_integer_field() {
        let grammar = FileNameGrammar::parse("reps{reps}").expect("pattern should parse");

        let error = grammar.extract("repsfive.json").expect_err("value should fail");

        assert_eq!(
            error,
            FileNameError::NotAnInteger {
                name: "repsfive".to_string(),
                label: "reps".to_string(),
                value: "five".to_string(),
            }
        );
    }

    #[test]
    fn extract_rejects_wrong_literal_and_affix() {
        let grammar = FileNameGrammar::parse("synthetic_{reps}reps").expect("pattern should parse");

        assert!(matches!(
            grammar.extract("hello_5reps.json"),
            Err(FileNameError::LiteralMismatch { .. })
        ));
        assert!(matches!(
            grammar.extract("synthetic_5runs.json"),
            Err(FileNameError::AffixMismatch { .. })
        ));
    }

    #[test]
    fn render_produces_a_name_that_extracts_back() {
        let grammar = FileNameGrammar::parse(SYNTHETIC).expect("pattern should parse");
        let values = FileNameParams::from([
            ("reps".to_string(), 20),
            ("interop_compute_ms".to_string(), 0),
            ("globaldb_ms".to_string(), 3),
            ("trial".to_string(), 1),
        ]);

        let stem = grammar.render(&values).expect("render should pass");

        assert_eq!(stem, "synthetic_20reps_interop0ms_globaldb3ms_trial1");
        assert_eq!(
            grammar
                .extract(&format!("{stem}.json"))
                .expect("extract should pass"),
            values
        );
    }

    #[test]
    fn render_requires_every_field() {
        let grammar = FileNameGrammar::parse("trial{trial}").expect("pattern should parse");
        let error = grammar
            .render(&FileNameParams::new())
            .expect_err("render should fail");
        assert!(matches!(error, FileNameError::MissingValue { .. }));
    }

    #[test]
    fn parse_rejects_malformed_patterns() {
        assert_eq!(FileNameGrammar::parse("  "), Err(GrammarError::Empty));
        assert!(matches!(
            FileNameGrammar::parse("a_{reps"),
            Err(GrammarError::Unbalanced { .. })
        ));
        assert!(matches!(
            FileNameGrammar::parse("a__b"),
            Err(GrammarError::EmptyToken { position: 1, .. })
        ));
        assert!(matches!(
            FileNameGrammar::parse("{a}x{b}"),
            Err(GrammarError::MultipleFields { .. })
        ));
        assert!(matches!(
            FileNameGrammar::parse("x{}"),
            Err(GrammarError::InvalidLabel { .. })
        ));
        assert!(matches!(
            FileNameGrammar::parse("{trial}_t{trial}"),
            Err(GrammarError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn grammar_deserializes_from_pattern_string() {
        let grammar: FileNameGrammar =
            serde_json::from_str("\"hello_trial{trial}\"").expect("pattern should deserialize");
        assert!(grammar.has_label("trial"));
        assert!(serde_json::from_str::<FileNameGrammar>("\"a_{b\"").is_err());
    }
}
