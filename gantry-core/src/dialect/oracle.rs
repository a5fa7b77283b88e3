use crate::{Dialect, util::separated_by};

/// Oracle conventions: double-quote identifiers, `:name` parameters, bare
/// table aliases, `"seq".NEXTVAL` sequences and `RETURNING ... INTO` with
/// typed output parameters.
#[derive(Default, Debug, Clone, Copy)]
pub struct OracleDialect;

impl OracleDialect {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    fn write_table_alias(&self, out: &mut String, alias: &str) {
        out.push_str(alias);
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        ["0", "1"][value as usize]
    }

    fn write_paging(&self, out: &mut String, skip: u64, take: Option<u64>) {
        let mut buffer = itoa::Buffer::new();
        if skip == 0 {
            if let Some(take) = take {
                out.push_str("FETCH FIRST ");
                out.push_str(buffer.format(take));
                out.push_str(" ROWS ONLY");
            }
            return;
        }
        out.push_str("OFFSET ");
        out.push_str(buffer.format(skip));
        out.push_str(" ROWS");
        if let Some(take) = take {
            out.push_str(" FETCH NEXT ");
            out.push_str(buffer.format(take));
            out.push_str(" ROWS ONLY");
        }
    }

    fn write_sequence_next_value(&self, out: &mut String, sequence: &str) {
        self.write_identifier(out, sequence);
        out.push_str(".NEXTVAL");
    }

    fn insert_returning_id(
        &self,
        base_insert: &str,
        _table: &str,
        key_columns: &[&str],
    ) -> Option<String> {
        if key_columns.is_empty() {
            return None;
        }
        let mut out = String::with_capacity(base_insert.len() + 32 * key_columns.len());
        out.push_str(base_insert);
        out.push_str(" RETURNING ");
        separated_by(
            &mut out,
            key_columns,
            |out, c| self.write_identifier(out, c),
            ", ",
        );
        out.push_str(" INTO ");
        separated_by(
            &mut out,
            key_columns,
            |out, c| self.write_parameter(out, c),
            ", ",
        );
        Some(out)
    }

    fn returning_uses_output_parameters(&self) -> bool {
        true
    }

    fn max_in_list(&self) -> usize {
        900
    }
}
