use crate::Dialect;

/// Microsoft SQL Server conventions: `[bracket]` quoting, `@` parameters,
/// `AS` table aliases, `SCOPE_IDENTITY()` key retrieval.
#[derive(Default, Debug, Clone, Copy)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "SqlServer"
    }

    fn default_schema(&self) -> Option<&'static str> {
        Some("dbo")
    }

    fn write_parameter(&self, out: &mut String, name: &str) {
        out.push('@');
        out.push_str(name);
    }

    fn write_identifier(&self, out: &mut String, identifier: &str) {
        out.push('[');
        for c in identifier.chars() {
            if c == ']' {
                out.push(']');
            }
            out.push(c);
        }
        out.push(']');
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        ["0", "1"][value as usize]
    }

    fn insert_returning_id(
        &self,
        base_insert: &str,
        _table: &str,
        key_columns: &[&str],
    ) -> Option<String> {
        let key = key_columns.first()?;
        let mut out = String::with_capacity(base_insert.len() + 64);
        out.push_str(base_insert);
        out.push_str("; SELECT CAST(SCOPE_IDENTITY() AS int) AS ");
        self.write_identifier(&mut out, key);
        Some(out)
    }

    fn max_in_list(&self) -> usize {
        2000
    }
}
