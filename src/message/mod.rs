// Public API - what other modules can use
pub use grouping::apply_block_grouping;
pub use models::{Message, RawMessage, RawTimestamp, TimestampFormat};
pub use pipeline::{MessagePipeline, PipelineOptions};

// Internal modules
mod grouping;
mod models;
mod pipeline;
