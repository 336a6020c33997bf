//! Error types for the analysis-to-graph core and the playback driver.

use thiserror::Error;

/// Errors that can occur while normalizing a raw analysis payload into a
/// [`crate::model::Track`].
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("analysis payload could not be parsed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("analysis has no beats")]
    NoBeats,
    #[error("segment at index {0} has a pitches or timbre vector that is not length 12")]
    InvalidFeatureVector(usize),
    #[error("{kind} quanta are not monotonically ordered by start time at index {index}")]
    NonMonotonicQuanta { kind: &'static str, index: usize },
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while building or mutating the jump graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("graph has fewer than two beats and cannot support branching")]
    DegenerateGraph,
    #[error("beat index {0} is out of range")]
    BeatIndexOutOfRange(usize),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Errors surfaced by the playback driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("startJukebox called before an analysis was loaded")]
    NotLoaded,
    #[error("player contract returned an abnormal cursor: {0}")]
    PlayerUnavailable(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors raised while resolving the platform's data/config directories.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("could not determine the application data directory")]
    Data,
    #[error("could not determine the application config directory")]
    Config,
}

/// Errors raised while loading or resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("failed to determine or create the config directory: {0}")]
    Directory(#[from] DirectoryError),
    #[error("io error while resolving configuration: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
