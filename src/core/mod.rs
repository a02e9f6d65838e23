pub mod builder;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod formatter;
pub mod lexicon;
pub mod pipeline;
