//! Diagnostic fields of `ErrorResponse` and `NoticeResponse`.
//!
//! <https://www.postgresql.org/docs/current/protocol-error-fields.html>
use bytes::{Buf, Bytes};
use std::fmt;

use crate::{common::ByteStr, ext::BytesExt, postgres::ProtocolError};

/// A backend diagnostic, either an error or a warning.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Notice {
    /// `ERROR`, `FATAL`, or `PANIC` (in an error message), or `WARNING`,
    /// `NOTICE`, `DEBUG`, `INFO`, or `LOG` (in a notice message).
    pub severity: ByteStr,
    /// The SQLSTATE code for the error.
    pub code: ByteStr,
    /// The primary human-readable error message.
    pub message: ByteStr,
    pub detail: Option<ByteStr>,
    pub hint: Option<ByteStr>,
    /// Cursor position as an index into the original query string, counted in characters from 1.
    pub position: Option<u32>,
    /// Call stack traceback of the active procedural language functions.
    pub context: Option<ByteStr>,
    pub schema: Option<ByteStr>,
    pub table: Option<ByteStr>,
    pub column: Option<ByteStr>,
    pub datatype: Option<ByteStr>,
    pub constraint: Option<ByteStr>,
    pub file: Option<ByteStr>,
    pub line: Option<u32>,
    pub routine: Option<ByteStr>,
}

impl Notice {
    /// Create a diagnostic that did not originate from the backend.
    pub fn new(severity: &'static str, code: &'static str, message: impl Into<ByteStr>) -> Self {
        Self {
            severity: severity.into(),
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Parse the body of `ErrorResponse` or `NoticeResponse`.
    ///
    /// Unrecognized field types are silently ignored.
    pub fn parse(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut me = Notice::default();
        let mut localized = None;

        loop {
            body.need(1, "notice field type")?;
            let kind = body.get_u8();
            if kind == b'\0' {
                break;
            }
            let value = body.get_nul_bytestr()?;
            match kind {
                b'S' => localized = Some(value),
                b'V' => me.severity = value,
                b'C' => me.code = value,
                b'M' => me.message = value,
                b'D' => me.detail = Some(value),
                b'H' => me.hint = Some(value),
                b'P' => me.position = value.parse().ok(),
                b'W' => me.context = Some(value),
                b's' => me.schema = Some(value),
                b't' => me.table = Some(value),
                b'c' => me.column = Some(value),
                b'd' => me.datatype = Some(value),
                b'n' => me.constraint = Some(value),
                b'F' => me.file = Some(value),
                b'L' => me.line = value.parse().ok(),
                b'R' => me.routine = Some(value),
                _ => {}
            }
        }

        // `V` is absent before postgres 9.6
        if me.severity.is_empty() {
            me.severity = localized.unwrap_or_default();
        }

        Ok(me)
    }

    /// SQLSTATE class `25` invalid transaction state, `25P02` is the failed transaction.
    pub fn is_in_failed_transaction(&self) -> bool {
        self.code == "25P02"
    }
}

impl std::error::Error for Notice { }

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if !self.code.is_empty() {
            write!(f, " ({})", self.code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_fields() {
        let body = Bytes::from_static(
            b"SERROR\0VERROR\0C42601\0Msyntax error at or near \"SELEC\"\0P1\0Fscan.l\0L1244\0Rscanner_yyerror\0Zignored\0\0",
        );
        let notice = Notice::parse(body).unwrap();
        assert_eq!(notice.severity, "ERROR");
        assert_eq!(notice.code, "42601");
        assert_eq!(notice.position, Some(1));
        assert_eq!(notice.line, Some(1244));
        assert_eq!(notice.routine.as_deref(), Some("scanner_yyerror"));
        assert_eq!(notice.to_string(), "ERROR: syntax error at or near \"SELEC\" (42601)");
    }

    #[test]
    fn localized_severity_fallback() {
        let notice = Notice::parse(Bytes::from_static(b"SWARNUNG\0Mdeprecated\0\0")).unwrap();
        assert_eq!(notice.severity, "WARNUNG");
        assert!(Notice::parse(Bytes::from_static(b"Mno terminator\0")).is_err());
    }
}
