//! Backend transaction status.
use std::fmt;

use crate::postgres::ProtocolError;

/// Transaction status reported by every `ReadyForQuery`.
///
/// The status is only meaningful at a synchronization point, it is delivered
/// with each [`Event::Ready`][crate::Event::Ready].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not in a transaction block.
    Idle,
    /// In a transaction block.
    InTransaction,
    /// In a failed transaction block, queries will be rejected until block is ended.
    Failed,
}

impl TransactionStatus {
    /// Decode the `ReadyForQuery` status indicator.
    pub fn from_indicator(indicator: u8) -> Result<Self, ProtocolError> {
        match indicator {
            b'I' => Ok(Self::Idle),
            b'T' => Ok(Self::InTransaction),
            b'E' => Ok(Self::Failed),
            _ => Err(ProtocolError::malformed("unknown transaction status indicator")),
        }
    }

    pub fn indicator(&self) -> u8 {
        match self {
            Self::Idle => b'I',
            Self::InTransaction => b'T',
            Self::Failed => b'E',
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::InTransaction => "in transaction",
            Self::Failed => "failed transaction",
        })
    }
}
