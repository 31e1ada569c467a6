// Prompt templates for job description analysis.
// Placeholders are rendered in a single pass by `synthesizer::render_template`.

/// Suffix that asks hybrid reasoning models to skip their thinking phase.
pub const NO_THINK_DIRECTIVE: &str = "/no_think";

/// Schema-driven analysis prompt.
/// Replace: {field_guidelines}, {description}, {format_instructions}, {no_think}
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following job description and extract key information in a structured JSON format.

FIELD EXTRACTION GUIDELINES:
{field_guidelines}

EXTRACTION RULES:
1. Extract information EXACTLY as written in the job posting
2. Do not make assumptions or add information not in the text
3. For missing optional fields, use the default shown next to the field
4. For comma-separated fields, use a single string such as "Python, React, AWS", never a JSON array
5. For skills: extract specific technologies, tools, languages (e.g., "Python", "React", "AWS")
6. For tags: generate 3-5 relevant categorization tags based on the role and industry
7. For type/seniority: choose the closest match from the available options
8. Keep extracted text concise but complete
9. Output ONLY the JSON object, with no explanations before or after it
10. Include EVERY field listed above in the response, even when its value is empty

Job Description:
{description}

{format_instructions}

{no_think}"#;

/// Reduced prompt used when no schema is available.
/// Replace: {description}, {format_instructions}, {no_think}
pub const FALLBACK_PROMPT_TEMPLATE: &str = r#"Analyze the following job description and extract key information in a structured format.

Extract the following fields:
- title: The exact job title
- company: Company name
- location: Job location
- type: Employment type (Full-time, Part-time, Contract, etc.)
- seniority: Seniority level (Entry, Mid-Senior, Director, etc.)
- source_url: Any URLs mentioned
- date_posted: Posting date (YYYY-MM-DD)
- tags: Relevant tags (comma-separated)
- skills: Technical skills (comma-separated)
- industry: Industry sector

Rules:
1. Only extract information present in the text
2. Use "Not specified" for missing text fields and "" for missing comma-separated fields
3. Output ONLY valid JSON
4. Include every field, even when empty

IMPORTANT: Do not include the original job description text in the response.

Job Description:
{description}

{format_instructions}

{no_think}"#;

/// Preamble wrapped around the JSON schema in the format instructions.
pub const FORMAT_INSTRUCTIONS_PREAMBLE: &str = "The output should be formatted as a JSON instance \
    that conforms to the JSON schema below.\n\n\
    As an example, for the schema {\"properties\": {\"foo\": {\"title\": \"Foo\", \"description\": \
    \"a list of strings\", \"type\": \"array\", \"items\": {\"type\": \"string\"}}}, \"required\": \
    [\"foo\"]}\nthe object {\"foo\": [\"bar\", \"baz\"]} is a well-formatted instance of the schema. \
    The object {\"properties\": {\"foo\": [\"bar\", \"baz\"]}} is not well-formatted.\n\n\
    Here is the output schema:";
