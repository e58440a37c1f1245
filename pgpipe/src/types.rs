//! Per connection type registry.
//!
//! The engine never decodes values itself, the registry is only consulted to
//! interpret described metadata.
use std::collections::HashMap;

use crate::{common::ByteStr, postgres::{Oid, PgFormat}};

/// Type metadata known for an oid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub oid: Oid,
    pub name: ByteStr,
    /// Element type when this is an array type.
    pub element: Option<Oid>,
    /// Format used when the caller does not pick one.
    pub preferred_format: PgFormat,
}

/// Oid to [`Type`] lookup, owned by a single connection.
#[derive(Debug, Clone)]
pub struct Registry {
    types: HashMap<Oid, Type>,
}

macro_rules! builtin {
    (@elem $elem:literal) => { Some($elem) };
    (@elem) => { None };
    ($($oid:literal $name:literal $(<$elem:literal>)?,)*) => {
        [$(
            Type {
                oid: $oid,
                name: ByteStr::from_static($name),
                element: builtin!(@elem $($elem)?),
                preferred_format: PgFormat::Binary,
            },
        )*]
    };
}

impl Registry {
    /// Registry with the builtin scalar types and their arrays.
    pub fn new() -> Self {
        let builtins = builtin! {
            16 "bool",
            17 "bytea",
            18 "char",
            19 "name",
            20 "int8",
            21 "int2",
            23 "int4",
            25 "text",
            26 "oid",
            114 "json",
            700 "float4",
            701 "float8",
            1043 "varchar",
            1082 "date",
            1083 "time",
            1114 "timestamp",
            1184 "timestamptz",
            1700 "numeric",
            2950 "uuid",
            3802 "jsonb",
            1000 "_bool" <16>,
            1001 "_bytea" <17>,
            1005 "_int2" <21>,
            1007 "_int4" <23>,
            1009 "_text" <25>,
            1016 "_int8" <20>,
            1021 "_float4" <700>,
            1022 "_float8" <701>,
        };

        Self {
            types: builtins.into_iter().map(|ty| (ty.oid, ty)).collect(),
        }
    }

    /// Lookup type metadata, `None` for types not known to this connection.
    pub fn resolve(&self, oid: Oid) -> Option<&Type> {
        self.types.get(&oid)
    }

    /// Register a type, for example a user defined enum or domain.
    ///
    /// Returns the previous registration of the same oid.
    pub fn register(&mut self, ty: Type) -> Option<Type> {
        self.types.insert(ty.oid, ty)
    }

    /// Number of known types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::postgres::PgType;

    #[test]
    fn resolve_builtins() {
        let mut registry = Registry::new();
        assert_eq!(registry.resolve(i32::OID).map(|t| t.name.as_str()), Some("int4"));
        assert_eq!(registry.resolve(1007).and_then(|t| t.element), Some(23));
        assert!(registry.resolve(90_000).is_none());

        registry.register(Type {
            oid: 90_000,
            name: "mood".into(),
            element: None,
            preferred_format: PgFormat::Text,
        });
        assert_eq!(registry.resolve(90_000).map(|t| t.preferred_format), Some(PgFormat::Text));
    }
}
