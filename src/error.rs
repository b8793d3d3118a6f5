use thiserror::Error;

/// Failure talking to the exchange. Every gateway call may return one.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The request URL is stripped: signed queries carry the signature
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("exchange rejected request ({code}): {msg}")]
    Api { code: i64, msg: String },

    #[error("failed to decode exchange response: {0}")]
    Decode(String),

    #[error("signing failed: {0}")]
    Auth(String),

    #[error("no data returned for {0}")]
    MissingData(String),

    #[error("order rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        ExchangeError::Http(err.without_url())
    }
}

/// Why an order attempt did not complete.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("price unavailable for {pair}: {source}")]
    PriceUnavailable {
        pair: String,
        #[source]
        source: ExchangeError,
    },

    #[error("invalid price {price} for {pair}")]
    InvalidPrice { pair: String, price: f64 },

    #[error("order submission failed for {pair}: {source}")]
    Exchange {
        pair: String,
        #[source]
        source: ExchangeError,
    },
}

/// Rejected lifecycle transitions on the bot controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("Bot is already running")]
    AlreadyRunning,

    #[error("Bot is not running")]
    NotRunning,

    #[error("Bot did not stop within {0} seconds")]
    StopTimeout(u64),
}

/// Configuration problems. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no trading pairs configured")]
    NoPairs,

    #[error("invalid trading pair '{0}', expected BASE/QUOTE")]
    InvalidPair(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
