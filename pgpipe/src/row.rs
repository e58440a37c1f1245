//! Result model: field metadata, rows and result batches.
//!
//! - [`ResultField`]
//! - [`Row`]
//! - [`ResultBatch`]
use bytes::{Buf, Bytes};
use std::fmt;

use crate::{
    common::ByteStr,
    ext::{BytesExt, FmtExt},
    postgres::{
        Oid, PgFormat, ProtocolError,
        backend::{DataRow, RowDescription},
    },
    types::{Registry, Type},
};

/// Column metadata from `RowDescription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultField {
    pub name: ByteStr,
    /// If the field can be identified as a column of a specific table, the object ID of the table; otherwise zero.
    pub table_oid: Oid,
    /// If the field can be identified as a column of a specific table, the attribute number of the column; otherwise zero.
    pub column: i16,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size, negative values denote variable-width types.
    pub type_size: i16,
    /// The type modifier, the meaning of the modifier is type-specific.
    pub type_modifier: i32,
    /// Format the column values are transmitted in.
    pub format: PgFormat,
}

impl ResultField {
    pub(crate) fn parse_all(rd: &RowDescription) -> Result<Vec<ResultField>, ProtocolError> {
        let mut body = rd.body.clone();
        let mut fields = Vec::with_capacity(rd.field_len.into());

        for _ in 0..rd.field_len {
            let name = body.get_nul_bytestr()?;
            body.need(18, "row description field")?;
            fields.push(ResultField {
                name,
                table_oid: body.get_u32(),
                column: body.get_i16(),
                type_oid: body.get_u32(),
                type_size: body.get_i16(),
                type_modifier: body.get_i32(),
                format: PgFormat::from_code(body.get_u16()),
            });
        }

        Ok(fields)
    }

    /// Lookup the field type in a connection [`Registry`].
    pub fn resolve<'r>(&self, registry: &'r Registry) -> Option<&'r Type> {
        registry.resolve(self.type_oid)
    }
}

/// Set the transmitted format of each field from the requested result formats.
///
/// Fewer formats than fields repeats the last one, no formats means text.
pub(crate) fn apply_formats(fields: &mut [ResultField], formats: &[PgFormat]) {
    for (idx, field) in fields.iter_mut().enumerate() {
        field.format = match formats.last() {
            Some(last) => formats.get(idx).copied().unwrap_or(*last),
            None => PgFormat::Text,
        };
    }
}

/// One row of a result, column values are kept in wire format.
#[derive(Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<Option<Bytes>>,
}

/// Rows of one result, moved to the caller at the terminal event.
pub type RowSet = Vec<Row>;

impl Row {
    pub(crate) fn decode(dr: &DataRow) -> Result<Row, ProtocolError> {
        let mut body = dr.body.clone();
        let mut values = Vec::with_capacity(dr.column_len.into());

        for _ in 0..dr.column_len {
            body.need(4, "data row column length")?;
            match body.get_i32() {
                -1 => values.push(None),
                len => {
                    let len = usize::try_from(len)
                        .map_err(|_| ProtocolError::malformed("data row column length"))?;
                    body.need(len, "data row column value")?;
                    values.push(Some(body.split_to(len)));
                },
            }
        }

        Ok(Self { values })
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Raw column value, `None` if the column is NULL or out of bounds.
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.values.get(idx)?.as_deref()
    }

    /// Column value as str, `None` if NULL, out of bounds or not utf8.
    pub fn get_str(&self, idx: usize) -> Option<&str> {
        std::str::from_utf8(self.get(idx)?).ok()
    }

    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.values.get(idx), Some(None))
    }

    pub fn values(&self) -> &[Option<Bytes>] {
        &self.values
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(|v| v.as_deref().map(<[u8]>::lossy)))
            .finish()
    }
}

/// The outcome of one statement.
#[derive(Debug, Default)]
pub struct ResultBatch {
    /// Command name from the completion tag, `None` for an empty query or a prepare.
    pub command: Option<ByteStr>,
    pub rows_affected: Option<u64>,
    /// Only reported by `INSERT`, always zero on servers without oid columns.
    pub inserted_oid: Option<Oid>,
    /// Parameter types, when the statement was described.
    pub param_types: Vec<Oid>,
    pub fields: Vec<ResultField>,
    pub rows: RowSet,
}

impl ResultBatch {
    /// Fill command fields from a `CommandComplete` tag.
    ///
    /// `INSERT 0 5` is command `INSERT`, inserted oid 0, 5 rows affected.
    pub(crate) fn set_tag(&mut self, tag: &ByteStr) {
        let (command, rows, oid) = parse_tag(tag);
        self.command = Some(command);
        self.rows_affected = rows;
        self.inserted_oid = oid;
    }
}

fn parse_tag(tag: &ByteStr) -> (ByteStr, Option<u64>, Option<Oid>) {
    let Some((head, last)) = tag.rsplit_once(' ') else {
        return (tag.clone(), None, None);
    };
    let Ok(rows) = last.parse::<u64>() else {
        return (tag.clone(), None, None);
    };
    match head.rsplit_once(' ') {
        Some((command, oid)) => match oid.parse::<Oid>() {
            Ok(oid) => (tag.slice_ref(command), Some(rows), Some(oid)),
            Err(_) => (tag.slice_ref(head), Some(rows), None),
        },
        None => (tag.slice_ref(head), Some(rows), None),
    }
}
