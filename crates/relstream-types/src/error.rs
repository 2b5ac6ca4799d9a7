//! Error taxonomy shared by the relstream crates.
//!
//! [`Error`] separates precondition violations ([`Error::StreamConsumed`]),
//! eager configuration failures ([`ConfigError`]), provider failures
//! ([`Error::Execution`]) and teardown failures that must never mask the
//! primary error ([`Error::Suppressed`]).

/// Join and table configuration failures.
///
/// Raised while compiling a query, before any SQL reaches an executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Stages reference tables living in more than one database.
    #[error("join spans multiple databases: {}", .stages.join(", "))]
    CrossDatabaseJoin { stages: Vec<String> },

    /// A join predicate references a table not introduced by an earlier stage.
    #[error("no table for {table}, available: {}", .available.join(", "))]
    UnknownStageTable {
        table: String,
        available: Vec<String>,
    },

    /// More stages than there are table aliases.
    #[error("join of {stages} stages exceeds the supported maximum of {max}")]
    TooManyStages { stages: usize, max: usize },

    /// A join predicate has the wrong shape for its operator.
    #[error("invalid join predicate at stage {stage}: {reason}")]
    InvalidJoinPredicate { stage: usize, reason: String },

    /// A join was compiled without any stage.
    #[error("join requires at least one stage")]
    EmptyJoin,

    /// A column is not an enabled column of its table.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    /// A field predicate's operand count does not match its operator.
    #[error("malformed predicate on {column}: {reason}")]
    MalformedPredicate { column: String, reason: String },
}

/// Errors produced by stream, join and executor operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Append or terminal operation on a builder that was already linked
    /// to a downstream builder or consumed by a terminal operation.
    #[error("stream already operated upon or consumed")]
    StreamConsumed,

    /// Invalid join or table configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failure reported by the SQL execution provider.
    #[error("{context}: {source}")]
    Execution {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A fetched row could not be converted into its element type.
    #[error("row mapping failed: {0}")]
    Mapping(String),

    /// A primary error with secondary failures collected during teardown.
    #[error("{primary} (+{} suppressed)", .suppressed.len())]
    Suppressed {
        #[source]
        primary: Box<Error>,
        suppressed: Vec<Error>,
    },
}

impl Error {
    /// Wrap a provider failure with the operation that produced it.
    pub fn execution(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Execution {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Row conversion failure.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Attach secondary failures to this error.
    ///
    /// Returns `self` unchanged when `suppressed` is empty. Attaching to an
    /// error that already carries suppressed failures appends to its list.
    #[must_use]
    pub fn with_suppressed(self, mut suppressed: Vec<Error>) -> Self {
        if suppressed.is_empty() {
            return self;
        }
        match self {
            Self::Suppressed {
                primary,
                suppressed: mut existing,
            } => {
                existing.append(&mut suppressed);
                Self::Suppressed {
                    primary,
                    suppressed: existing,
                }
            }
            primary => Self::Suppressed {
                primary: Box::new(primary),
                suppressed,
            },
        }
    }

    /// The primary error, looking through [`Error::Suppressed`].
    #[must_use]
    pub fn primary(&self) -> &Error {
        match self {
            Self::Suppressed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// Secondary failures attached to this error.
    #[must_use]
    pub fn suppressed(&self) -> &[Error] {
        match self {
            Self::Suppressed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Whether the primary error is [`Error::StreamConsumed`].
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(self.primary(), Self::StreamConsumed)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
