// Job description extraction pipeline.
// schema → synthesizer → backend → cleaner → parser, with the stream
// reassembler in between for incremental generation.

pub mod analyzer;
pub mod cleaner;
pub mod handlers;
pub mod parser;
pub mod prompts;
pub mod record;
pub mod schema;
pub mod stream;
pub mod synthesizer;

pub use analyzer::JobAnalyzer;
pub use schema::ExtractionSchema;
