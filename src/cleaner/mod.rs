//! Cleaner modules: denylist scrubbing and object-graph compaction

pub mod denylist;
pub mod scrubber;
pub mod structure_cleaner;

pub use denylist::{DenyRule, Denylist, DenylistPreset, ObjectRole};
pub use scrubber::{Removal, ScrubReport, Scrubber};
pub use structure_cleaner::{CompactionReport, GraphCompactor, DEFAULT_MAX_DECODED_BYTES};
