//! Seed document validation with detailed error reporting

use jsonschema::error::ValidationErrorKind as Kind;
use jsonschema::{validator_for, ValidationError as JsonSchemaError, Validator as JsonValidator};
use miette::{Diagnostic, NamedSource, SourceSpan};
use rust_embed::Embed;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

const SEED_SCHEMA: &str = "seed.schema.json";

/// Validation error with source location information
#[derive(Debug, Error, Diagnostic)]
#[error("Seed validation failed: {summary}")]
#[diagnostic(code(catalog_ingest::seed::validation_error))]
pub struct ValidationError {
    summary: String,

    #[source_code]
    src: NamedSource<String>,

    #[related]
    violations: Vec<SchemaViolation>,
}

/// A single schema violation
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SchemaViolation {
    #[label("{}", self.hint)]
    span: SourceSpan,

    message: String,
    hint: String,

    #[help]
    help: Option<String>,
}

impl SchemaViolation {
    pub fn new(message: String, hint: String, span: SourceSpan, help: Option<String>) -> Self {
        Self {
            span,
            message,
            hint,
            help,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ValidationError {
    pub fn new(filename: &str, source: &str, violations: Vec<SchemaViolation>) -> Self {
        let count = violations.len();
        let summary = if count == 1 {
            "1 error".to_string()
        } else {
            format!("{} errors", count)
        };
        Self {
            summary,
            src: NamedSource::new(filename, source.to_string()),
            violations,
        }
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[SchemaViolation] {
        &self.violations
    }
}

/// The embedded seed schema could not be loaded
#[derive(Debug, Error)]
#[error("seed schema unavailable: {0}")]
pub struct SchemaLoadError(String);

/// Validator for `catalog-ingest seed` documents
pub struct SeedValidator {
    compiled: JsonValidator,
}

impl SeedValidator {
    pub fn new() -> Result<Self, SchemaLoadError> {
        let file = EmbeddedSchemas::get(SEED_SCHEMA)
            .ok_or_else(|| SchemaLoadError(format!("{} is not embedded", SEED_SCHEMA)))?;
        let schema: JsonValue =
            serde_json::from_slice(&file.data).map_err(|e| SchemaLoadError(e.to_string()))?;
        let compiled = validator_for(&schema).map_err(|e| SchemaLoadError(e.to_string()))?;
        Ok(Self { compiled })
    }

    /// The raw schema text, for `config schema` style printing
    pub fn schema_text() -> Option<String> {
        EmbeddedSchemas::get(SEED_SCHEMA)
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }

    /// Validate YAML content, collecting every violation
    pub fn validate(&self, content: &str, filename: &str) -> Result<(), ValidationError> {
        let yaml_value: serde_yml::Value = match serde_yml::from_str(content) {
            Ok(v) => v,
            Err(e) => {
                let span = find_error_span(content, e.location());
                let violation = SchemaViolation::new(
                    format!("YAML parse error: {}", e),
                    "invalid YAML".to_string(),
                    span,
                    Some("Check YAML syntax - proper indentation, colons, quotes".to_string()),
                );
                return Err(ValidationError::new(filename, content, vec![violation]));
            }
        };

        // An empty document is an empty seed
        if matches!(yaml_value, serde_yml::Value::Null) {
            return Ok(());
        }

        let json_value: JsonValue = match serde_json::to_value(&yaml_value) {
            Ok(v) => v,
            Err(e) => {
                let violation = SchemaViolation::new(
                    format!("Failed to convert YAML to JSON: {}", e),
                    "conversion error".to_string(),
                    (0, content.len()).into(),
                    None,
                );
                return Err(ValidationError::new(filename, content, vec![violation]));
            }
        };

        let violations: Vec<SchemaViolation> = self
            .compiled
            .iter_errors(&json_value)
            .map(|e| error_to_violation(content, &e))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(filename, content, violations))
        }
    }
}

fn error_to_violation(content: &str, error: &JsonSchemaError) -> SchemaViolation {
    let path = error.instance_path.to_string();
    let at = if path.is_empty() {
        "document root".to_string()
    } else {
        format!("'{}'", path)
    };

    let (message, hint, help) = match &error.kind {
        Kind::Required { property } => {
            let field = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            (
                format!("Missing required field: {} at {}", field, at),
                "required field missing",
                Some(format!("Add the '{}' field", field)),
            )
        }
        Kind::Type { kind } => (
            format!("Wrong type at {}: expected {:?}", at, kind),
            "wrong type",
            None,
        ),
        Kind::Enum { options } => {
            let valid = enum_options(options);
            (
                format!("Invalid value at {}: must be one of: {}", at, valid),
                "invalid value",
                Some(format!("Valid values: {}", valid)),
            )
        }
        Kind::Pattern { pattern } => {
            let help = if pattern.contains("course-v1") {
                "Run keys look like course-v1:{org}+{number}+{run}"
            } else {
                "Course keys look like {org}+{number}"
            };
            (
                format!("Value at {} is not a valid key", at),
                "pattern mismatch",
                Some(help.to_string()),
            )
        }
        Kind::MinLength { .. } => (format!("Value at {} must not be empty", at), "empty", None),
        Kind::AdditionalProperties { unexpected } => {
            let help = match unexpected.as_slice() {
                [one] => format!("Remove the '{}' field or check spelling", one),
                _ => "Remove unknown fields or check spelling".to_string(),
            };
            (
                format!("Unknown field(s) at {}: {}", at, unexpected.join(", ")),
                "unknown field",
                Some(help),
            )
        }
        _ => (
            format!("Validation error at {}: {}", at, error),
            "validation error",
            None,
        ),
    };

    SchemaViolation::new(message, hint.to_string(), find_path_span(content, &path), help)
}

fn enum_options(options: &JsonValue) -> String {
    match options.as_array() {
        Some(values) => values
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        None => options.to_string(),
    }
}

/// Span of the line holding a YAML parse error, from its column onward
fn find_error_span(content: &str, location: Option<serde_yml::Location>) -> SourceSpan {
    let Some(loc) = location else {
        return line_span(content, 0);
    };
    let line = loc.line().saturating_sub(1);
    let line_start: usize = content.lines().take(line).map(|l| l.len() + 1).sum();
    line_span(content, line_start + loc.column().saturating_sub(1))
}

/// From `offset` to the end of its line, at least one byte
fn line_span(content: &str, offset: usize) -> SourceSpan {
    let offset = offset.min(content.len());
    let rest = content.get(offset..).unwrap_or("");
    let len = rest.find('\n').unwrap_or(rest.len()).max(1);
    (offset, len).into()
}

/// Span of the deepest named key of a JSON pointer such as `/courses/0/key`
fn find_path_span(content: &str, json_path: &str) -> SourceSpan {
    let parts: Vec<&str> = json_path.split('/').filter(|s| !s.is_empty()).collect();
    let first_line = || line_span(content, 0);

    let Some(key) = parts
        .iter()
        .rev()
        .find(|p| p.parse::<usize>().is_err())
    else {
        return first_line();
    };
    find_key_span(content, key).unwrap_or_else(first_line)
}

fn find_key_span(content: &str, key: &str) -> Option<SourceSpan> {
    let search_pattern = format!("{}:", key);

    let mut offset = 0;
    for line in content.lines() {
        let trimmed = line.trim_start().trim_start_matches("- ");
        if trimmed.starts_with(&search_pattern) {
            let key_start = offset + (line.len() - trimmed.len());
            return Some((key_start, trimmed.len()).into());
        }
        offset += line.len() + 1;
    }
    None
}
