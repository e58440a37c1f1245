//! Parameters of `Bind` and `FunctionCall`.
use bytes::Bytes;

use crate::{error::SubmissionError, postgres::PgFormat};

/// Parameter values with their formats, and the requested result formats.
///
/// Parameter formats may be empty (all text), a single format applied to all
/// parameters, or one format per parameter. Empty result formats request all
/// binary.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub param_formats: Vec<PgFormat>,
    /// `None` for NULL.
    pub params: Vec<Option<Bytes>>,
    pub result_formats: Vec<PgFormat>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter value, encoded as its `param_formats` says.
    pub fn bind(mut self, value: impl Into<Bytes>) -> Self {
        self.params.push(Some(value.into()));
        self
    }

    pub fn bind_null(mut self) -> Self {
        self.params.push(None);
        self
    }

    pub fn param_format(mut self, format: PgFormat) -> Self {
        self.param_formats.push(format);
        self
    }

    pub fn result_format(mut self, format: PgFormat) -> Self {
        self.result_formats.push(format);
        self
    }

    /// Request every result column in `format`.
    pub fn results(mut self, format: PgFormat) -> Self {
        self.result_formats = vec![format];
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SubmissionError> {
        let max = u16::MAX as usize;
        for len in [self.params.len(), self.param_formats.len(), self.result_formats.len()] {
            if len > max {
                return Err(SubmissionError::TooManyParameters(len));
            }
        }

        match self.param_formats.len() {
            0 | 1 => {},
            n if n == self.params.len() => {},
            formats => return Err(SubmissionError::ParameterFormats { formats, params: self.params.len() }),
        }

        check_value_lengths(self.params.iter().map(|value| value.as_ref().map_or(0, Bytes::len)))
    }

    /// Result format codes written on the wire.
    ///
    /// `fields` is the number of result columns if known ahead, short format
    /// lists are then filled forward with their last format.
    pub(crate) fn wire_result_formats(&self, fields: Option<usize>) -> Vec<PgFormat> {
        let Some(&last) = self.result_formats.last() else {
            return vec![PgFormat::Binary];
        };

        if self.result_formats.iter().all(|f| *f == PgFormat::Text) {
            return vec![];
        }

        let mut formats = self.result_formats.clone();
        if let Some(fields) = fields {
            if formats.len() > 1 && formats.len() < fields {
                formats.resize(fields, last);
            }
        }
        formats
    }
}

/// Postgres lengths are `int32`, for each value and for the whole message.
const MAX_LENGTH: usize = i32::MAX as usize;

/// Every value and their encoded total, a 4 byte length prefix each, must fit in [`MAX_LENGTH`].
fn check_value_lengths(lengths: impl Iterator<Item = usize>) -> Result<(), SubmissionError> {
    let mut total = 0usize;
    for (index, len) in lengths.enumerate() {
        if len > MAX_LENGTH {
            return Err(SubmissionError::ValueTooLarge { index, len });
        }
        total = match total.checked_add(4 + len) {
            Some(total) if total <= MAX_LENGTH => total,
            _ => return Err(SubmissionError::MessageTooLarge),
        };
    }
    Ok(())
}

/// `max_rows` as written in `Execute`, zero means unlimited.
pub(crate) fn max_rows(max_rows: i32) -> Result<u32, SubmissionError> {
    u32::try_from(max_rows).map_err(|_| SubmissionError::NegativeMaxRows(max_rows))
}

#[cfg(test)]
mod test {
    use super::*;
    use PgFormat::*;

    #[test]
    fn parameter_formats() {
        let binding = Binding::new().bind("1").bind("2");
        assert!(binding.validate().is_ok());
        assert!(binding.clone().param_format(Binary).validate().is_ok());

        let bad = binding.param_format(Text).param_format(Text).param_format(Text);
        assert!(matches!(
            bad.validate(),
            Err(SubmissionError::ParameterFormats { formats: 3, params: 2 })
        ));
    }

    #[test]
    fn result_formats() {
        assert_eq!(Binding::new().wire_result_formats(Some(3)), vec![Binary]);
        assert_eq!(Binding::new().results(Text).wire_result_formats(Some(3)), vec![]);
        assert_eq!(
            Binding::new().result_format(Text).result_format(Binary).wire_result_formats(Some(4)),
            vec![Text, Binary, Binary, Binary],
        );
        assert_eq!(
            Binding::new().result_format(Text).result_format(Binary).wire_result_formats(None),
            vec![Text, Binary],
        );
    }

    #[test]
    fn value_lengths() {
        let binding = Binding::new().bind("1").bind_null().bind(vec![0u8; 64]);
        assert!(binding.validate().is_ok());

        assert!(check_value_lengths([0, MAX_LENGTH - 8].into_iter()).is_ok());
        assert!(matches!(
            check_value_lengths([1, MAX_LENGTH + 1].into_iter()),
            Err(SubmissionError::ValueTooLarge { index: 1, len }) if len == MAX_LENGTH + 1
        ));
        assert!(matches!(
            check_value_lengths([MAX_LENGTH / 2, MAX_LENGTH / 2].into_iter()),
            Err(SubmissionError::MessageTooLarge)
        ));
        assert!(matches!(
            check_value_lengths([MAX_LENGTH; 3].into_iter()),
            Err(SubmissionError::MessageTooLarge)
        ));
    }

    #[test]
    fn negative_max_rows() {
        assert_eq!(max_rows(0).unwrap(), 0);
        assert!(matches!(max_rows(-1), Err(SubmissionError::NegativeMaxRows(-1))));
    }
}
