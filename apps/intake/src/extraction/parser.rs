//! Structured parser: decodes a cleaned JSON candidate into a `Record`.
//!
//! The strict path rejects any type mismatch. Only when it fails does the
//! lenient path run, which recovers from extra keys and slightly wrong types
//! by substituting field defaults.

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::extraction::prompts::FORMAT_INSTRUCTIONS_PREAMBLE;
use crate::extraction::record::{FieldValue, Record};
use crate::extraction::schema::{ExtractionSchema, FieldKind, FieldSpec};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no balanced JSON object found in model output")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("expected a JSON object at the top level")]
    NotAnObject,

    #[error("field '{field}' is not a valid {expected}")]
    SchemaMismatch {
        field: String,
        expected: &'static str,
    },
}

/// Renders the schema as JSON-schema format instructions for the prompt.
pub fn format_instructions(schema: &ExtractionSchema) -> String {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in schema.extracted_fields() {
        let json_type = match field.kind {
            FieldKind::OptionalString => json!(["string", "null"]),
            FieldKind::RequiredString | FieldKind::CommaList => json!("string"),
        };
        properties.insert(
            field.name.to_string(),
            json!({
                "title": title_case(field.name),
                "description": field.description,
                "type": json_type,
            }),
        );
        if field.kind.is_required() {
            required.push(field.name);
        }
    }

    let schema_json = json!({
        "properties": properties,
        "required": required,
    });
    format!("{FORMAT_INSTRUCTIONS_PREAMBLE}\n```\n{schema_json}\n```")
}

fn title_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses with the strict path, falling back to lenient coercion.
pub fn parse(candidate: &str, schema: &ExtractionSchema) -> Result<Record, ExtractionError> {
    match parse_strict(candidate, schema) {
        Ok(record) => Ok(record),
        Err(strict_err) => {
            debug!(error = %strict_err, "Strict parse failed, retrying with lenient coercion");
            parse_lenient(candidate, schema)
        }
    }
}

/// Schema-directed decode. Unknown keys are ignored and missing keys take
/// their default, but any present value of the wrong type is an error.
pub fn parse_strict(candidate: &str, schema: &ExtractionSchema) -> Result<Record, ExtractionError> {
    let object = decode_object(candidate)?;
    let mut record = Record::defaults(schema);

    for field in schema.extracted_fields() {
        if let Some(raw) = object.get(field.name) {
            record.set(field.name, strict_value(field, raw)?);
        }
    }
    Ok(record)
}

/// Generic decode followed by per-field coercion. Invalid optional values
/// fall back to defaults; a required string holding structured data
/// (object or array) cannot be recovered.
pub fn parse_lenient(candidate: &str, schema: &ExtractionSchema) -> Result<Record, ExtractionError> {
    let object = decode_object(candidate)?;
    let mut record = Record::defaults(schema);

    for field in schema.extracted_fields() {
        let value = match object.get(field.name) {
            Some(raw) => lenient_value(field, raw)?,
            None => FieldValue::from(field.default),
        };
        record.set(field.name, value);
    }
    Ok(record)
}

fn decode_object(candidate: &str) -> Result<Map<String, Value>, ExtractionError> {
    match serde_json::from_str::<Value>(candidate.trim())? {
        Value::Object(object) => Ok(object),
        _ => Err(ExtractionError::NotAnObject),
    }
}

fn strict_value(field: &FieldSpec, raw: &Value) -> Result<FieldValue, ExtractionError> {
    match (field.kind, raw) {
        (_, Value::String(text)) => Ok(FieldValue::text(text.as_str())),
        (FieldKind::OptionalString, Value::Null) => Ok(FieldValue::Null),
        _ => Err(mismatch(field)),
    }
}

fn lenient_value(field: &FieldSpec, raw: &Value) -> Result<FieldValue, ExtractionError> {
    let value = match (field.kind, raw) {
        (_, Value::String(text)) => FieldValue::text(text.as_str()),
        (FieldKind::CommaList, Value::Array(items)) => FieldValue::Text(join_items(items)),
        (FieldKind::RequiredString, Value::Number(number)) => FieldValue::Text(number.to_string()),
        (FieldKind::RequiredString, Value::Bool(flag)) => FieldValue::Text(flag.to_string()),
        (FieldKind::RequiredString, Value::Array(_) | Value::Object(_)) => {
            return Err(mismatch(field))
        }
        _ => FieldValue::from(field.default),
    };
    Ok(value)
}

/// Joins the scalar items of a JSON array into a comma-separated string.
fn join_items(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn mismatch(field: &FieldSpec) -> ExtractionError {
    ExtractionError::SchemaMismatch {
        field: field.name.to_string(),
        expected: field.kind.expected(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::schema::FieldSpec;

    fn schema() -> ExtractionSchema {
        ExtractionSchema::new(vec![
            FieldSpec::required("title", "title"),
            FieldSpec::required("company", "company"),
            FieldSpec::optional("location", "location"),
            FieldSpec::comma_list("skills", "skills"),
            FieldSpec::optional("description", "description").from_source_text(),
        ])
        .unwrap()
    }

    #[test]
    fn test_strict_parse_merges_defaults_for_absent_keys() {
        let record = parse(r#"{"title": "Backend Engineer", "skills": "Python, SQL"}"#, &schema())
            .unwrap();
        assert_eq!(record.text("title"), Some("Backend Engineer"));
        assert_eq!(record.text("company"), Some("Not specified"));
        assert_eq!(record.get("location"), Some(&FieldValue::Null));
        assert_eq!(record.text("skills"), Some("Python, SQL"));
    }

    #[test]
    fn test_parse_matches_encoded_mapping() {
        let input = json!({
            "title": "Data Engineer",
            "company": "Globex",
            "location": null,
            "skills": "Spark, Airflow",
        });
        let record = parse(&input.to_string(), &schema()).unwrap();
        let expected = json!({
            "title": "Data Engineer",
            "company": "Globex",
            "location": null,
            "skills": "Spark, Airflow",
            "description": null,
        });
        assert_eq!(serde_json::to_value(&record).unwrap(), expected);
    }

    #[test]
    fn test_strict_rejects_list_for_comma_list_field() {
        let err = parse_strict(r#"{"title": "SRE", "skills": ["Go", "K8s"]}"#, &schema())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::SchemaMismatch { ref field, .. } if field == "skills"));
    }

    #[test]
    fn test_lenient_joins_list_for_comma_list_field() {
        let record = parse(r#"{"title": "SRE", "skills": ["Go", " K8s ", ""]}"#, &schema())
            .unwrap();
        assert_eq!(record.text("skills"), Some("Go, K8s"));
    }

    #[test]
    fn test_extra_key_and_numeric_optional_fall_back_to_defaults() {
        let input = r#"{"title": "SRE", "company": "Initech", "location": 42, "salary": "lots"}"#;
        assert!(parse_strict(input, &schema()).is_err());

        let record = parse(input, &schema()).unwrap();
        assert_eq!(record.text("title"), Some("SRE"));
        assert_eq!(record.text("company"), Some("Initech"));
        assert_eq!(record.get("location"), Some(&FieldValue::Null));
        assert_eq!(record.get("salary"), None);
        assert_eq!(record.len(), 5);
    }

    #[test]
    fn test_lenient_stringifies_scalar_required_value() {
        let record = parse(r#"{"title": 2024, "company": true}"#, &schema()).unwrap();
        assert_eq!(record.text("title"), Some("2024"));
        assert_eq!(record.text("company"), Some("true"));
    }

    #[test]
    fn test_null_required_value_takes_default_in_lenient_path() {
        let record = parse(r#"{"title": null}"#, &schema()).unwrap();
        assert_eq!(record.text("title"), Some("Not specified"));
    }

    #[test]
    fn test_structured_required_value_is_schema_mismatch() {
        let err = parse(r#"{"title": "SRE", "company": {"name": "Acme"}}"#, &schema()).unwrap_err();
        assert!(matches!(err, ExtractionError::SchemaMismatch { ref field, .. } if field == "company"));
    }

    #[test]
    fn test_source_text_fields_are_not_taken_from_model() {
        let record = parse(r#"{"title": "SRE", "description": "invented"}"#, &schema()).unwrap();
        assert_eq!(record.get("description"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_malformed_json_fails_both_paths() {
        let err = parse(r#"{"title": "SRE",}"#, &schema()).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedJson(_)));
    }

    #[test]
    fn test_top_level_array_is_rejected() {
        let err = parse(r#"[{"title": "SRE"}]"#, &schema()).unwrap_err();
        assert!(matches!(err, ExtractionError::NotAnObject));
    }

    #[test]
    fn test_format_instructions_describe_extracted_fields() {
        let instructions = format_instructions(&schema());
        assert!(instructions.starts_with("The output should be formatted as a JSON instance"));

        let body = instructions
            .split("```\n")
            .nth(1)
            .and_then(|s| s.strip_suffix("\n```"))
            .unwrap();
        let parsed: Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["required"], json!(["title", "company"]));
        assert_eq!(parsed["properties"]["location"]["type"], json!(["string", "null"]));
        assert_eq!(parsed["properties"]["skills"]["type"], json!("string"));
        assert!(parsed["properties"].get("description").is_none());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("date_posted"), "Date Posted");
        assert_eq!(title_case("title"), "Title");
    }
}
