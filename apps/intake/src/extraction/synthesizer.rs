//! Prompt synthesizer: turns an extraction schema and a raw job description
//! into the final prompt text.

use tracing::warn;

use crate::extraction::prompts::{
    ANALYSIS_PROMPT_TEMPLATE, FALLBACK_PROMPT_TEMPLATE, NO_THINK_DIRECTIVE,
};
use crate::extraction::schema::{ExtractionSchema, FieldSpec};

/// Builds the analysis prompt.
///
/// `format_instructions` and `raw_text` are interpolated verbatim. When no
/// schema is available the reduced fallback prompt is used instead of failing.
pub fn build_prompt(
    schema: Option<&ExtractionSchema>,
    raw_text: &str,
    format_instructions: &str,
) -> String {
    match schema {
        Some(schema) => render_template(
            ANALYSIS_PROMPT_TEMPLATE,
            &[
                ("field_guidelines", field_guidelines(schema).as_str()),
                ("description", raw_text),
                ("format_instructions", format_instructions),
                ("no_think", NO_THINK_DIRECTIVE),
            ],
        ),
        None => {
            warn!("No extraction schema available, using fallback prompt");
            render_template(
                FALLBACK_PROMPT_TEMPLATE,
                &[
                    ("description", raw_text),
                    ("format_instructions", format_instructions),
                    ("no_think", NO_THINK_DIRECTIVE),
                ],
            )
        }
    }
}

/// One guideline line per model-extracted field.
fn field_guidelines(schema: &ExtractionSchema) -> String {
    schema
        .extracted_fields()
        .map(guideline_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn guideline_line(field: &FieldSpec) -> String {
    if field.kind.is_required() {
        format!("  - {} (REQUIRED): {}", field.name, field.instruction)
    } else {
        format!(
            "  - {} (OPTIONAL, default {}): {}",
            field.name,
            field.default.describe(),
            field.instruction
        )
    }
}

/// Replaces `{key}` placeholders in one left-to-right pass. Substituted
/// values are never rescanned, so braces inside them survive untouched.
/// Unknown `{...}` sequences are copied as-is.
pub(crate) fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(
        template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>(),
    );
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open + 1..];
        let matched = values.iter().find(|(key, _)| {
            candidate.starts_with(key) && candidate[key.len()..].starts_with('}')
        });
        match matched {
            Some((key, value)) => {
                out.push_str(value);
                rest = &candidate[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::schema::FieldSpec;

    fn small_schema() -> ExtractionSchema {
        ExtractionSchema::new(vec![
            FieldSpec::required("title", "Extract the exact job title"),
            FieldSpec::required("company", "Extract the company name"),
            FieldSpec::comma_list("skills", "List skills"),
        ])
        .unwrap()
    }

    #[test]
    fn test_prompt_has_one_line_per_field_with_markers() {
        let prompt = build_prompt(Some(&small_schema()), "JD", "FORMAT");
        assert!(prompt.contains("  - title (REQUIRED): Extract the exact job title"));
        assert!(prompt.contains("  - company (REQUIRED): Extract the company name"));
        assert!(prompt.contains("  - skills (OPTIONAL, default \"\"): List skills"));
    }

    #[test]
    fn test_prompt_contains_global_rules() {
        let prompt = build_prompt(Some(&small_schema()), "JD", "FORMAT");
        assert!(prompt.contains("Extract information EXACTLY as written"));
        assert!(prompt.contains("use the default shown next to the field"));
        assert!(prompt.contains("Output ONLY the JSON object"));
        assert!(prompt.contains("Include EVERY field"));
        assert!(prompt.trim_end().ends_with("/no_think"));
    }

    #[test]
    fn test_source_text_fields_are_skipped() {
        let prompt = build_prompt(Some(&ExtractionSchema::job_posting().unwrap()), "JD", "FORMAT");
        assert!(prompt.contains("  - title (REQUIRED)"));
        assert!(prompt.contains("  - industry (OPTIONAL, default null)"));
        assert!(!prompt.contains("  - description"));
    }

    #[test]
    fn test_text_and_format_instructions_are_verbatim() {
        let jd = "Senior {role} at Acme\nUse {format_instructions} literally";
        let format = "```\n{\"properties\": {\"title\": {\"type\": \"string\"}}}\n```";
        let prompt = build_prompt(Some(&small_schema()), jd, format);
        assert!(prompt.contains(jd));
        assert!(prompt.contains(format));
        assert_eq!(prompt.matches(format).count(), 1);
    }

    #[test]
    fn test_fallback_prompt_when_schema_missing() {
        let prompt = build_prompt(None, "Rust engineer at Acme", "FORMAT");
        assert!(prompt.contains("- title: The exact job title"));
        assert!(prompt.contains("- skills: Technical skills (comma-separated)"));
        assert!(prompt.contains("Rust engineer at Acme"));
        assert!(prompt.contains("FORMAT"));
    }

    #[test]
    fn test_render_template_leaves_unknown_placeholders() {
        let rendered = render_template("a {x} {y} {", &[("x", "{y}")]);
        assert_eq!(rendered, "a {y} {y} {");
    }
}
