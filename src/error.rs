//! Error type shared by every POS operation.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PosError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XLSX write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("database lock poisoned: {0}")]
    Lock(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("the cart is empty")]
    EmptyCart,

    #[error("insufficient payment: total {total}, received {received}")]
    InsufficientPayment { total: Decimal, received: Decimal },

    #[error("sale cancelled: stock warning was not confirmed")]
    StockWarningDeclined,

    #[error("access denied: {0}")]
    Unauthorized(String),

    #[error("invalid username or password")]
    LoginFailed,

    #[error("too many failed attempts, try again in {minutes} minute(s)")]
    LockedOut { minutes: i64 },

    #[error("ticket rendering failed: {0}")]
    Ticket(String),

    #[error("simulator: {0}")]
    Simulator(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PosError>;

impl PosError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
