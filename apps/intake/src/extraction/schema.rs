//! Extraction schema: the ordered field descriptors that drive both prompt
//! synthesis and record validation.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

/// Sentinel text used when a required string cannot be found in the source.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Semantic type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    RequiredString,
    OptionalString,
    /// A single string holding comma-separated items ("Python, SQL").
    CommaList,
}

impl FieldKind {
    pub fn is_required(self) -> bool {
        matches!(self, FieldKind::RequiredString)
    }

    /// Human-readable type name, used in mismatch errors.
    pub fn expected(self) -> &'static str {
        match self {
            FieldKind::RequiredString => "string",
            FieldKind::OptionalString => "string or null",
            FieldKind::CommaList => "comma-separated string",
        }
    }
}

/// Where a field's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Extracted by the model.
    Model,
    /// Copied verbatim from the analyzed text; never requested from the model.
    SourceText,
}

/// Default value substituted when the model omits a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Text(&'static str),
    Null,
}

impl FieldDefault {
    /// Rendering used in prompt guidelines.
    pub fn describe(self) -> String {
        match self {
            FieldDefault::Text(text) => format!("\"{text}\""),
            FieldDefault::Null => "null".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Extraction guideline shown to the model.
    pub instruction: &'static str,
    /// Short description used in the JSON-schema format instructions.
    pub description: &'static str,
    pub default: FieldDefault,
    pub source: FieldSource,
}

impl FieldSpec {
    pub const fn required(name: &'static str, instruction: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::RequiredString,
            instruction,
            description: instruction,
            default: FieldDefault::Text(NOT_SPECIFIED),
            source: FieldSource::Model,
        }
    }

    pub const fn optional(name: &'static str, instruction: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::OptionalString,
            instruction,
            description: instruction,
            default: FieldDefault::Null,
            source: FieldSource::Model,
        }
    }

    pub const fn comma_list(name: &'static str, instruction: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::CommaList,
            instruction,
            description: instruction,
            default: FieldDefault::Text(""),
            source: FieldSource::Model,
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Marks the field as filled from the source text instead of the model.
    pub const fn from_source_text(mut self) -> Self {
        self.source = FieldSource::SourceText;
        self
    }

    pub fn is_extracted(&self) -> bool {
        self.source == FieldSource::Model
    }

    fn default_fits_kind(&self) -> bool {
        match (self.kind, self.default) {
            (FieldKind::RequiredString, FieldDefault::Text(text)) => !text.is_empty(),
            (FieldKind::RequiredString, FieldDefault::Null) => false,
            (FieldKind::OptionalString, _) => true,
            (FieldKind::CommaList, FieldDefault::Text(_)) => true,
            (FieldKind::CommaList, FieldDefault::Null) => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("default for field '{field}' is not a valid {expected}")]
    InvalidDefault {
        field: String,
        expected: &'static str,
    },
}

/// Ordered, validated set of field descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSchema {
    fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    /// Builds a schema, rejecting duplicate names and defaults that do not
    /// satisfy their field's kind.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name) {
                return Err(SchemaError::DuplicateField(field.name.to_string()));
            }
            if !field.default_fits_kind() {
                return Err(SchemaError::InvalidDefault {
                    field: field.name.to_string(),
                    expected: field.kind.expected(),
                });
            }
        }
        Ok(Self { fields })
    }

    /// The job-posting schema used by the intake form.
    pub fn job_posting() -> Result<Self, SchemaError> {
        Self::new(JOB_POSTING_FIELDS.to_vec())
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Fields the model is asked to produce, in schema order.
    pub fn extracted_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_extracted())
    }
}

const JOB_POSTING_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("title", "Extract the exact job title as written")
        .with_description("The exact job title from the posting"),
    FieldSpec::required("company", "Extract company name if present")
        .with_description("The company name"),
    FieldSpec::optional(
        "location",
        "Include full location details, note if remote/hybrid/on-site",
    )
    .with_description("The job location, including if remote"),
    FieldSpec::optional(
        "type",
        "Job type: Full-time, Part-time, Contract, Temporary, Internship, Freelance, Other",
    )
    .with_description("Job type (Full-time, Part-time, Contract, etc.)"),
    FieldSpec::optional(
        "seniority",
        "Seniority level: Entry, Mid-Senior, Director, Executive, Intern, Other",
    )
    .with_description("Seniority level (Entry, Mid-Senior, Director, etc.)"),
    FieldSpec::optional("source_url", "Extract any URLs mentioned in the posting")
        .with_description("URL where the job posting was found"),
    FieldSpec::optional(
        "date_posted",
        "Extract posting date if mentioned (use YYYY-MM-DD format)",
    )
    .with_description("Date when job was posted (YYYY-MM-DD format)"),
    FieldSpec::comma_list(
        "tags",
        "Generate relevant tags for categorization (comma-separated)",
    )
    .with_description("Comma-separated tags for categorization"),
    FieldSpec::comma_list(
        "skills",
        "Extract all technical skills, tools, and technologies mentioned (comma-separated)",
    )
    .with_description("Comma-separated technical skills and requirements"),
    FieldSpec::optional("industry", "Identify the industry or business sector")
        .with_description("Industry or sector"),
    FieldSpec::optional("description", "The original job description text")
        .from_source_text(),
];
