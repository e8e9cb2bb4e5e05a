use facet::Facet;
use std::fmt;

/// Value persisted for an absent optional id (no owning type, thread, domain, owner).
pub const ABSENT_ID: i64 = -1;

macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty),
        to_sql = $to_sql:expr,
        from_sql = $from_sql:expr $(,)?
    ) => {
        #[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[facet(transparent)]
        $(#[$meta])*
        pub struct $name($repr);

        impl $name {
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            pub const fn get(self) -> $repr {
                self.0
            }

            /// Signed 64-bit column value for this id.
            pub fn to_sql_integer(self) -> i64 {
                let convert: fn($repr) -> i64 = $to_sql;
                convert(self.0)
            }

            /// Inverse of [`Self::to_sql_integer`]; `None` when the column value
            /// cannot name this id (negative or too wide).
            pub fn from_sql_integer(value: i64) -> Option<Self> {
                let convert: fn(i64) -> Option<$repr> = $from_sql;
                convert(value).map(Self)
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        #[cfg(feature = "rusqlite")]
        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.to_sql_integer().into())
            }
        }

        #[cfg(feature = "rusqlite")]
        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let raw = i64::column_result(value)?;
                $name::from_sql_integer(raw)
                    .ok_or(rusqlite::types::FromSqlError::OutOfRange(raw))
            }
        }
    };
}

define_id!(
    /// Address of an object on the inspected heap. Unique within one snapshot.
    ///
    /// SQLite integers are signed, so addresses are stored by reinterpreting
    /// the 64 bits; addresses above `i64::MAX` come back unchanged.
    ObjectAddress(u64),
    to_sql = |value| value as i64,
    from_sql = |value| Some(value as u64),
);

define_id!(
    /// The provider's stable handle for a runtime type.
    TypeIndex(u32),
    to_sql = i64::from,
    from_sql = |value| u32::try_from(value).ok(),
);

define_id!(
    /// Managed thread id as reported by the runtime.
    ThreadId(u32),
    to_sql = i64::from,
    from_sql = |value| u32::try_from(value).ok(),
);

define_id!(
    /// Isolation domain (app domain) id.
    DomainId(u32),
    to_sql = i64::from,
    from_sql = |value| u32::try_from(value).ok(),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_addresses_survive_sql_integer_conversion() {
        let address = ObjectAddress::new(0xffff_8000_0000_1000);
        let stored = address.to_sql_integer();
        assert!(stored < 0);
        assert_eq!(ObjectAddress::from_sql_integer(stored), Some(address));
    }

    #[test]
    fn narrow_ids_reject_out_of_range_columns() {
        assert_eq!(TypeIndex::from_sql_integer(ABSENT_ID), None);
        assert_eq!(ThreadId::from_sql_integer(i64::from(u32::MAX) + 1), None);
        assert_eq!(DomainId::from_sql_integer(3), Some(DomainId::new(3)));
    }

    #[test]
    fn ids_display_as_plain_decimal() {
        assert_eq!(ThreadId::new(7).to_string(), "7");
        assert_eq!(ObjectAddress::new(4096).to_string(), "4096");
    }
}
