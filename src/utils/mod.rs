//! Utility helpers shared across the pipeline

pub mod io;

pub use self::io::{
    destination_key, output_path_for, reclaim_stale_artifacts, sha256_hex, RunToken, TempArtifact,
    ARTIFACT_PREFIX,
};
