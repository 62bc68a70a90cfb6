// Type definitions for the scrubbing pipeline

pub mod document;
pub mod object;

pub use document::*;
pub use object::*;
