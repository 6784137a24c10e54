//! Error taxonomy for the notification pipeline.
//!
//! Each failure domain has its own enum so call sites can decide how far
//! an error is allowed to travel:
//!
//! | Type            | Source                    | Handling                          |
//! |-----------------|---------------------------|-----------------------------------|
//! | [`ChainError`]  | blockchain node RPC       | transient, retried next pass      |
//! | [`StoreError`]  | PostgreSQL                | transient, retried next pass      |
//! | [`MailError`]   | email provider            | transient, row stays unsent       |
//! | [`ConfigError`] | environment at startup    | fatal, process exits              |
//!
//! [`NotifierError`] aggregates them for the bootstrap path only. The
//! scanner and mailer never return errors to their callers.

/// Failure talking to a blockchain node.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// No endpoint is configured for the requested network.
    #[error("no rpc endpoint configured for network {0}")]
    UnknownNetwork(String),

    /// The HTTP request could not be completed.
    #[error("rpc transport error on {network}: {message}")]
    Transport {
        /// Network the request was sent to.
        network: String,
        /// Underlying transport message.
        message: String,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code} on {network}: {message}")]
    Rpc {
        /// Network the request was sent to.
        network: String,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The node answered with something that is not a valid result.
    #[error("malformed rpc response on {network}: {message}")]
    MalformedResponse {
        /// Network the request was sent to.
        network: String,
        /// What was wrong with the payload.
        message: String,
    },

    /// The contract ABI stored for an event source cannot be parsed.
    #[error("invalid abi for contract {contract}: {message}")]
    InvalidAbi {
        /// Contract address whose ABI failed to parse.
        contract: String,
        /// Parser message.
        message: String,
    },
}

/// Failure reading or writing the subscription store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value does not fit the domain type (e.g. negative block).
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

/// Failure handing an email to the delivery provider.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The HTTP request could not be completed.
    #[error("mail transport error: {0}")]
    Transport(String),

    /// The provider rejected the message.
    #[error("mail provider rejected message ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider error message.
        message: String,
    },

    /// The template model could not be built.
    #[error("cannot render notification: {0}")]
    Render(String),
}

/// Invalid or missing configuration. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} env var is required")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Parser message.
        message: String,
    },
}

/// Top-level error used while bootstrapping the service.
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store problem.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Node problem.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Mail provider problem.
    #[error(transparent)]
    Mail(#[from] MailError),

    /// Metrics registry problem.
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Schema migration failure.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl NotifierError {
    /// Short category label used in structured logs.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Store(_) | Self::Migration(_) => "store",
            Self::Chain(_) => "node",
            Self::Mail(_) => "mail",
            Self::Metrics(_) => "metrics",
        }
    }
}
