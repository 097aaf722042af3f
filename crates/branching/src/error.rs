//! Attachment errors

use contracts::{ElementId, StressError};
use engine::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachError {
    /// The pipeline's fan-out node no longer resolves
    #[error("fan-out node {element} is missing from pipeline '{pipeline}'")]
    FanOutMissing { pipeline: String, element: ElementId },

    /// A structural graph operation failed
    #[error("graph operation failed in pipeline '{pipeline}': {source}")]
    Graph {
        pipeline: String,
        #[source]
        source: GraphError,
    },
}

impl AttachError {
    pub(crate) fn graph(pipeline: &str) -> impl FnOnce(GraphError) -> Self + '_ {
        move |source| Self::Graph {
            pipeline: pipeline.to_string(),
            source,
        }
    }
}

impl From<AttachError> for StressError {
    fn from(err: AttachError) -> Self {
        match err {
            AttachError::FanOutMissing { pipeline, element } => {
                StressError::FanOutMissing { pipeline, element }
            }
            AttachError::Graph { pipeline, source } => {
                StressError::link_failed(pipeline, "branch", source.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AttachError>;
