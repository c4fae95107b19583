// All service modules
pub mod hook_processor;
pub mod metadata;

// Re-export for convenience
pub use hook_processor::HookProcessor;
pub use metadata::{MetadataGenerator, MetadataStore, RatMetadata};
