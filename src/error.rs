use thiserror::Error;

/// Result type for anvil operations
pub type Result<T> = std::result::Result<T, AnvilError>;

/// Main error type for the anvil library
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnvilError {
    /// Declared sizes between composed stages do not line up
    #[error("Shape configuration error in {stage}: expected {expected}, got {actual}")]
    ShapeConfiguration {
        stage: String,
        expected: usize,
        actual: usize,
    },

    /// A shared encoder or torso does not fit both networks
    #[error("Sharing conflict on {module}: {reason}")]
    SharingConflict {
        module: String,
        reason: String,
    },

    /// An updater was applied to an actor with the wrong kind of head
    #[error("Action head mismatch: {updater} requires a {expected} head, found {actual}")]
    ActionHeadMismatch {
        updater: String,
        expected: String,
        actual: String,
    },

    /// A regeneration step would change the population dtype
    #[error("Population dtype changed from {expected} to {actual}")]
    PopulationDtype {
        expected: String,
        actual: String,
    },

    /// Invalid dimensions for operations
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// A population updater was stepped before `initialize_population`
    #[error("Population has not been initialized")]
    UninitializedPopulation,

    /// Numerical computation errors
    #[error("Numerical error: {0}")]
    NumericalError(String),
}

impl From<rand_distr::NormalError> for AnvilError {
    fn from(err: rand_distr::NormalError) -> Self {
        AnvilError::NumericalError(err.to_string())
    }
}

impl From<rand::distributions::WeightedError> for AnvilError {
    fn from(err: rand::distributions::WeightedError) -> Self {
        AnvilError::NumericalError(err.to_string())
    }
}

// Helper functions for common error patterns
impl AnvilError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        AnvilError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        AnvilError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn shape_configuration<S: Into<String>>(stage: S, expected: usize, actual: usize) -> Self {
        AnvilError::ShapeConfiguration {
            stage: stage.into(),
            expected,
            actual,
        }
    }

    pub fn sharing_conflict<S: Into<String>>(module: S, reason: S) -> Self {
        AnvilError::SharingConflict {
            module: module.into(),
            reason: reason.into(),
        }
    }

    pub fn action_head_mismatch<S: Into<String>>(updater: S, expected: S, actual: S) -> Self {
        AnvilError::ActionHeadMismatch {
            updater: updater.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
