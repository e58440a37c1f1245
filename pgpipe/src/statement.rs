//! Server object names and the prepared statement tracker.
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    common::ByteStr,
    postgres::Oid,
    row::ResultField,
};

/// Name of a server side object, an empty name selects the unnamed slot.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Id(ByteStr);

impl Id {
    fn unnamed() -> Self {
        Self(ByteStr::default())
    }

    fn next(atomic: &AtomicU32, prefix: char) -> Self {
        let id = atomic.fetch_add(1, Ordering::Relaxed);

        let mut b = itoa::Buffer::new();
        let digits = b.format(id);

        let mut name = String::with_capacity(1 + digits.len().max(5));
        name.push(prefix);
        for _ in digits.len()..5 {
            name.push('0');
        }
        name.push_str(digits);

        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_unnamed(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

macro_rules! delegate {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, PartialEq, Eq, Hash, Default)]
        pub struct $name(Id);

        impl $name {
            /// The unnamed slot.
            pub fn unnamed() -> Self {
                Self(Id::unnamed())
            }

            /// Generate a new unique name.
            pub fn next() -> Self {
                static ID: AtomicU32 = AtomicU32::new(1);
                Self(Id::next(&ID, $prefix))
            }

            /// Use an explicit name.
            pub fn new(name: impl Into<String>) -> Self {
                let name: String = name.into();
                Self(Id(name.into()))
            }
        }

        impl std::ops::Deref for $name {
            type Target = Id;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<&'static str> for $name {
            fn from(name: &'static str) -> Self {
                Self(Id(ByteStr::from_static(name)))
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(Id(name.into()))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.as_str()).finish()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.is_unnamed() {
                    true => f.write_str("<unnamed>"),
                    false => f.write_str(self.as_str()),
                }
            }
        }
    };
}

delegate!(StatementName, 's');
delegate!(PortalName, 'p');

/// Kind of server object for `Close` and `Describe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerObjectType {
    Statement,
    Portal,
}

impl ServerObjectType {
    /// Wire code, `S` or `P`.
    pub fn code(&self) -> u8 {
        match self {
            Self::Statement => b'S',
            Self::Portal => b'P',
        }
    }
}

/// What is known about a prepared statement on this connection.
#[derive(Debug, Clone, Default)]
pub struct PreparedStatement {
    /// Parameter types, declared at parse then replaced by the described ones.
    pub param_types: Vec<Oid>,
    /// Result fields, `None` until described.
    pub fields: Option<Vec<ResultField>>,
}

/// Prepared statements parsed on this connection.
#[derive(Debug, Default)]
pub struct StatementTracker {
    statements: HashMap<StatementName, PreparedStatement>,
}

impl StatementTracker {
    /// A `Parse` was written, replaces any previous statement in the same slot.
    pub(crate) fn parse(&mut self, name: &StatementName, param_types: &[Oid]) {
        self.statements.insert(name.clone(), PreparedStatement {
            param_types: param_types.to_vec(),
            fields: None,
        });
    }

    pub(crate) fn describe_params(&mut self, name: &StatementName, param_types: &[Oid]) {
        if let Some(stmt) = self.statements.get_mut(name) {
            stmt.param_types = param_types.to_vec();
        }
    }

    pub(crate) fn describe_fields(&mut self, name: &StatementName, fields: &[ResultField]) {
        if let Some(stmt) = self.statements.get_mut(name) {
            stmt.fields = Some(fields.to_vec());
        }
    }

    /// Parse failed or statement closed.
    pub(crate) fn remove(&mut self, name: &StatementName) {
        self.statements.remove(name);
    }

    pub fn get(&self, name: &StatementName) -> Option<&PreparedStatement> {
        self.statements.get(name)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
