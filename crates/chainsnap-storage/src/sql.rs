//! Column-array bulk statements for PostgreSQL.
//!
//! Every statement has a fixed shape; only quoted identifiers and a closed
//! set of type names are ever spliced into the SQL text. Values travel as
//! one `text[]` parameter per column and are cast to the column type
//! server-side (`$1::text[]::bool[]`), so a chunk of any size is one round
//! trip with `columns` parameters.

use std::fmt;

use serde_json::Value;

/// A double-quoted SQL identifier, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Self {
        Self(quote(name))
    }

    pub fn qualified(schema: &str, name: &str) -> Self {
        Self(format!("{}.{}", quote(schema), quote(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── ColumnType ───────────────────────────────────────────────────────────────

/// Column types a snapshot value can be cast back into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Varchar,
    Bool,
    Int2,
    Int4,
    Int8,
    Numeric,
    Float4,
    Float8,
    Date,
    Timestamp,
    Timestamptz,
    Uuid,
    Json,
    Jsonb,
    Bytea,
    /// A user-defined type such as an enum.
    Named(Ident),
}

impl ColumnType {
    /// Resolve from `information_schema.columns` (`data_type`, `udt_name`).
    /// Returns `None` for types that cannot round-trip through `text[]`
    /// (array columns, composites of arrays, ...).
    pub fn from_information_schema(data_type: &str, udt_name: &str) -> Option<Self> {
        if data_type == "USER-DEFINED" {
            return Some(Self::Named(Ident::new(udt_name)));
        }
        Some(match udt_name {
            "text" => Self::Text,
            "varchar" | "bpchar" => Self::Varchar,
            "bool" => Self::Bool,
            "int2" => Self::Int2,
            "int4" => Self::Int4,
            "int8" => Self::Int8,
            "numeric" => Self::Numeric,
            "float4" => Self::Float4,
            "float8" => Self::Float8,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::Timestamptz,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            "bytea" => Self::Bytea,
            _ => return None,
        })
    }

    fn sql_name(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Varchar => "varchar",
            Self::Bool => "bool",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Numeric => "numeric",
            Self::Float4 => "float4",
            Self::Float8 => "float8",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Timestamptz => "timestamptz",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Jsonb => "jsonb",
            Self::Bytea => "bytea",
            Self::Named(ident) => ident.as_str(),
        }
    }

    /// `$n::text[]` cast to this column's array type.
    fn array_param(&self, n: usize) -> String {
        match self {
            Self::Text => format!("${n}::text[]"),
            other => format!("${n}::text[]::{}[]", other.sql_name()),
        }
    }

    /// Text form of `value` for a `text[]` parameter; `None` is SQL `NULL`.
    pub fn encode(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (_, Value::Null) => None,
            (Self::Json | Self::Jsonb, v) => Some(v.to_string()),
            (_, Value::String(s)) => Some(s.clone()),
            (_, Value::Bool(b)) => Some(b.to_string()),
            (_, Value::Number(n)) => Some(n.to_string()),
            (_, v) => Some(v.to_string()),
        }
    }
}

/// Encode a whole column for binding.
pub fn encode_column(ty: &ColumnType, values: &[Value]) -> Vec<Option<String>> {
    values.iter().map(|v| ty.encode(v)).collect()
}

// ─── Statements ───────────────────────────────────────────────────────────────

/// `UPDATE ... FROM (SELECT unnest(...) ...)` matched on a key column.
#[derive(Debug, Clone)]
pub struct BulkUpdate {
    table: Ident,
    key: Ident,
    /// All columns bound as parameters, key included, in parameter order.
    columns: Vec<(Ident, ColumnType)>,
}

impl BulkUpdate {
    pub fn new(table: Ident, key: Ident, columns: Vec<(Ident, ColumnType)>) -> Self {
        Self {
            table,
            key,
            columns,
        }
    }

    pub fn sql(&self) -> String {
        let set = self
            .columns
            .iter()
            .filter(|(c, _)| *c != self.key)
            .map(|(c, _)| format!("{c} = \"data\".{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let select = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (c, ty))| format!("unnest({}) AS {c}", ty.array_param(i + 1)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {table} SET {set} FROM (SELECT {select}) AS \"data\" WHERE {table}.{key} = \"data\".{key}",
            table = self.table,
            key = self.key,
        )
    }
}

/// `INSERT ... SELECT * FROM unnest(...) ON CONFLICT (key) DO NOTHING`.
#[derive(Debug, Clone)]
pub struct BulkInsert {
    table: Ident,
    key: Ident,
    columns: Vec<(Ident, ColumnType)>,
}

impl BulkInsert {
    pub fn new(table: Ident, key: Ident, columns: Vec<(Ident, ColumnType)>) -> Self {
        Self {
            table,
            key,
            columns,
        }
    }

    pub fn sql(&self) -> String {
        let names = self
            .columns
            .iter()
            .map(|(c, _)| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let arrays = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| ty.array_param(i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {table} ({names}) SELECT * FROM unnest({arrays}) AS \"data\"({names}) ON CONFLICT ({key}) DO NOTHING",
            table = self.table,
            key = self.key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_are_quoted_and_escaped() {
        assert_eq!(Ident::new("user").as_str(), "\"user\"");
        assert_eq!(Ident::new("we\"ird").as_str(), "\"we\"\"ird\"");
        assert_eq!(
            Ident::qualified("squid_processor", "status").as_str(),
            "\"squid_processor\".\"status\""
        );
    }

    #[test]
    fn update_statement_shape() {
        let stmt = BulkUpdate::new(
            Ident::new("channel"),
            Ident::new("id"),
            vec![
                (Ident::new("id"), ColumnType::Text),
                (Ident::new("is_excluded"), ColumnType::Bool),
                (Ident::new("follows_num"), ColumnType::Int4),
            ],
        );
        assert_eq!(
            stmt.sql(),
            "UPDATE \"channel\" SET \"is_excluded\" = \"data\".\"is_excluded\", \
             \"follows_num\" = \"data\".\"follows_num\" \
             FROM (SELECT unnest($1::text[]) AS \"id\", \
             unnest($2::text[]::bool[]) AS \"is_excluded\", \
             unnest($3::text[]::int4[]) AS \"follows_num\") AS \"data\" \
             WHERE \"channel\".\"id\" = \"data\".\"id\""
        );
    }

    #[test]
    fn insert_statement_shape() {
        let stmt = BulkInsert::new(
            Ident::new("user"),
            Ident::new("id"),
            vec![
                (Ident::new("id"), ColumnType::Varchar),
                (Ident::new("is_root"), ColumnType::Bool),
            ],
        );
        assert_eq!(
            stmt.sql(),
            "INSERT INTO \"user\" (\"id\", \"is_root\") \
             SELECT * FROM unnest($1::text[]::varchar[], $2::text[]::bool[]) \
             AS \"data\"(\"id\", \"is_root\") ON CONFLICT (\"id\") DO NOTHING"
        );
    }

    #[test]
    fn user_defined_types_are_quoted() {
        let ty = ColumnType::from_information_schema("USER-DEFINED", "report_reason").unwrap();
        assert_eq!(ty.array_param(4), "$4::text[]::\"report_reason\"[]");
        assert!(ColumnType::from_information_schema("ARRAY", "_text").is_none());
    }

    #[test]
    fn encoding() {
        assert_eq!(ColumnType::Bool.encode(&json!(true)), Some("true".into()));
        assert_eq!(ColumnType::Int8.encode(&json!(12)), Some("12".into()));
        assert_eq!(ColumnType::Text.encode(&json!("a")), Some("a".into()));
        assert_eq!(ColumnType::Text.encode(&Value::Null), None);
        assert_eq!(ColumnType::Jsonb.encode(&json!("a")), Some("\"a\"".into()));
        assert_eq!(
            ColumnType::Jsonb.encode(&json!({ "k": [1, 2] })),
            Some("{\"k\":[1,2]}".into())
        );
        assert_eq!(
            encode_column(&ColumnType::Int4, &[json!(1), Value::Null]),
            vec![Some("1".into()), None]
        );
    }
}
