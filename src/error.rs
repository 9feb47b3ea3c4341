use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// PipelineError – every way a pipeline run can fail
// ---------------------------------------------------------------------------

/// Errors raised by the overlay pipeline.
///
/// Every variant is terminal for the current run: nothing is retried and no
/// partially composed map is produced.  Each variant carries enough context
/// (dataset, attribute, criterion or layer) to diagnose without re-running.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source file is unreadable, malformed, or has no coordinate reference.
    #[error("failed to load dataset '{dataset}' from {}: {reason}", path.display())]
    Load {
        dataset: String,
        path: PathBuf,
        reason: String,
    },

    /// A geometry could not be transformed into the target CRS.
    #[error("cannot reproject feature {feature} of dataset '{dataset}' to {target}: {reason}")]
    Reprojection {
        dataset: String,
        feature: usize,
        target: String,
        reason: String,
    },

    /// A predicate, style or tooltip references an attribute the source lacks.
    #[error("attribute '{attribute}' referenced by {context} is missing from dataset '{dataset}'")]
    AttributeMissing {
        attribute: String,
        /// e.g. `criterion 'Filter1'` or `layer 'TAZ Area'`.
        context: String,
        dataset: String,
    },

    /// A color scale has no numeric values to range over.
    #[error("dataset '{dataset}' has no numeric values for attribute '{attribute}'")]
    InsufficientData { dataset: String, attribute: String },

    /// One overlay layer was assigned to more than one group.
    #[error("layer '{layer}' is assigned to both group '{first_group}' and group '{second_group}'")]
    DuplicateLayer {
        layer: String,
        first_group: String,
        second_group: String,
    },

    /// Writing an export (or the manifest) failed.
    #[error("failed to export '{dataset}' to {}", path.display())]
    Export {
        dataset: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pipeline configuration itself is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Stable category of a [`PipelineError`], for callers that dispatch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    Reprojection,
    AttributeMissing,
    InsufficientData,
    DuplicateLayer,
    Export,
    Config,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Load { .. } => ErrorKind::Load,
            PipelineError::Reprojection { .. } => ErrorKind::Reprojection,
            PipelineError::AttributeMissing { .. } => ErrorKind::AttributeMissing,
            PipelineError::InsufficientData { .. } => ErrorKind::InsufficientData,
            PipelineError::DuplicateLayer { .. } => ErrorKind::DuplicateLayer,
            PipelineError::Export { .. } => ErrorKind::Export,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_missing_message_names_attribute_and_context() {
        let err = PipelineError::AttributeMissing {
            attribute: "AWDT_2023".into(),
            context: "criterion 'Filter1'".into(),
            dataset: "highway".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AWDT_2023"));
        assert!(msg.contains("Filter1"));
        assert!(msg.contains("highway"));
        assert_eq!(err.kind(), ErrorKind::AttributeMissing);
    }

    #[test]
    fn export_error_keeps_io_source() {
        use std::error::Error as _;
        let err = PipelineError::Export {
            dataset: "taz".into(),
            path: PathBuf::from("/nope/taz.geojson"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert_eq!(err.kind(), ErrorKind::Export);
    }
}
