mod oracle;
mod sqlserver;

pub use oracle::*;
pub use sqlserver::*;

use crate::Value;

/// Driver-facing parameter type, used to declare typed output parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Uuid,
}

/// Strategy for everything a database family disagrees about: identifier
/// quoting, parameter markers, boolean literals, alias syntax, paging shape,
/// `INSERT ... RETURNING` tails and IN-list limits.
///
/// Defaults follow ANSI conventions; concrete dialects override what differs.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn default_schema(&self) -> Option<&'static str> {
        None
    }

    /// Parameter marker for a base name, e.g. `@p0` or `:p0`.
    fn write_parameter(&self, out: &mut String, name: &str) {
        out.push(':');
        out.push_str(name);
    }

    /// Quote an identifier, escaping the closing quote by doubling.
    fn write_identifier(&self, out: &mut String, identifier: &str) {
        out.push('"');
        for c in identifier.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
    }

    /// Table alias declaration, without the leading space.
    fn write_table_alias(&self, out: &mut String, alias: &str) {
        out.push_str("AS ");
        out.push_str(alias);
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        ["FALSE", "TRUE"][value as usize]
    }

    /// `OFFSET`/`FETCH` clause for validated skip/take values, without the
    /// leading space. Only these numeric literals ever appear inline.
    fn write_paging(&self, out: &mut String, skip: u64, take: Option<u64>) {
        let mut buffer = itoa::Buffer::new();
        out.push_str("OFFSET ");
        out.push_str(buffer.format(skip));
        out.push_str(" ROWS");
        if let Some(take) = take {
            out.push_str(" FETCH NEXT ");
            out.push_str(buffer.format(take));
            out.push_str(" ROWS ONLY");
        }
    }

    /// Value expression drawing the next value of a sequence.
    fn write_sequence_next_value(&self, out: &mut String, sequence: &str) {
        out.push_str("NEXT VALUE FOR ");
        self.write_identifier(out, sequence);
    }

    /// Turn a plain INSERT into one that hands back the generated key
    /// columns, or `None` when the dialect has no such shape.
    fn insert_returning_id(
        &self,
        base_insert: &str,
        table: &str,
        key_columns: &[&str],
    ) -> Option<String>;

    /// Whether the returning shape reads keys through typed output
    /// parameters rather than a trailing scalar query.
    fn returning_uses_output_parameters(&self) -> bool {
        false
    }

    /// Map a value prototype to the driver parameter type, for typed output
    /// parameters. `None` means the dialect cannot type it.
    fn map_db_type(&self, prototype: &Value) -> Option<DbType> {
        Some(match prototype {
            Value::Boolean(..) => DbType::Boolean,
            Value::Int8(..) | Value::Int16(..) | Value::UInt8(..) => DbType::Int16,
            Value::Int32(..) | Value::UInt16(..) => DbType::Int32,
            Value::Int64(..) | Value::UInt32(..) | Value::UInt64(..) => DbType::Int64,
            Value::Float32(..) => DbType::Float32,
            Value::Float64(..) => DbType::Float64,
            Value::Decimal(..) => DbType::Decimal,
            Value::Varchar(..) => DbType::String,
            Value::Blob(..) => DbType::Bytes,
            Value::Date(..) => DbType::Date,
            Value::Time(..) => DbType::Time,
            Value::Timestamp(..) => DbType::DateTime,
            Value::TimestampWithTimezone(..) => DbType::DateTimeOffset,
            Value::Uuid(..) => DbType::Uuid,
            Value::Null | Value::List(..) => return None,
        })
    }

    /// Largest IN list the split loader may send in one statement.
    fn max_in_list(&self) -> usize {
        1000
    }

    // Convenience renderers over the write_* methods.

    fn identifier(&self, identifier: &str) -> String {
        let mut out = String::new();
        self.write_identifier(&mut out, identifier);
        out
    }

    fn parameter(&self, name: &str) -> String {
        let mut out = String::new();
        self.write_parameter(&mut out, name);
        out
    }
}
