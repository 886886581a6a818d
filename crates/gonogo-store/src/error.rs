//! Store error types.

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "epic", "test").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A validation constraint was violated.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Adding a `blocks` edge would create a cycle in the dependency graph.
    #[error("adding this dependency would create a cycle")]
    CycleDetected,

    /// An Epic status write would regress the lattice without the
    /// administrative override flag.
    #[error("status regression {from} -> {to} requires an administrative override")]
    StatusRegression {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A stale execution report was discarded (monotonicity).
    #[error("stale execution for {test_id}: recorded_at does not advance")]
    StaleExecution {
        /// The test the report was for.
        test_id: String,
    },

    /// The database schema is newer than this binary supports.
    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version found in the database.
        found: i32,
        /// Highest version this binary supports.
        supported: i32,
    },

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transaction operation failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A schema migration failed.
    #[error("migration {name} failed: {reason}")]
    Migration {
        /// Name of the migration that failed.
        name: String,
        /// Underlying error description.
        reason: String,
    },

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StoreError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`StoreError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this write was rejected by an integrity invariant
    /// (cycle, status regression, stale execution). The surrounding
    /// operation continues with other items.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected | Self::StatusRegression { .. } | Self::StaleExecution { .. }
        )
    }

    /// Returns `true` if the error is transient and the operation may
    /// succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Transaction(_))
    }
}

impl From<gonogo_core::validation::ValidationError> for StoreError {
    fn from(e: gonogo_core::validation::ValidationError) -> Self {
        Self::Validation {
            message: e.to_string(),
        }
    }
}
