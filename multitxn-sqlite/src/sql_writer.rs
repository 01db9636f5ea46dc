use crate::{ColumnDef, ColumnType, Entity, Filter, Order};
use multitxn_core::{Params, Value, separated_by};
use std::fmt::Write;

/// Renders the statements issued by the sqlite contexts.
///
/// Values are never inlined: every `write_*` that needs values pushes them into `params` and
/// writes a named placeholder instead.
#[derive(Default, Debug, Clone, Copy)]
pub struct SqliteSqlWriter {}

impl SqliteSqlWriter {
    pub fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    pub fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', "\"\"");
        out.push('"');
    }

    /// Immediate so that the write lock is taken at begin and not on the first write.
    pub fn write_transaction_begin(&self, out: &mut String) {
        out.push_str("BEGIN IMMEDIATE;");
    }

    pub fn write_transaction_commit(&self, out: &mut String) {
        out.push_str("COMMIT;");
    }

    pub fn write_transaction_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK;");
    }

    pub fn write_column_type(&self, out: &mut String, value: ColumnType) {
        out.push_str(match value {
            ColumnType::Boolean | ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        });
    }

    pub fn write_create_table<E: Entity>(&self, out: &mut String, if_not_exists: bool) {
        out.reserve(128 + E::columns().len() * 64);
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("CREATE TABLE ");
        if if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        self.write_identifier_quoted(out, E::table());
        out.push_str(" (\n");
        let primary_key = E::columns()
            .iter()
            .filter(|v| v.primary_key)
            .collect::<Vec<_>>();
        let composite = primary_key.len() > 1;
        separated_by(
            out,
            E::columns(),
            |out, v| self.write_create_table_column_fragment(out, v, composite),
            ",\n",
        );
        if composite {
            out.push_str(",\nPRIMARY KEY (");
            separated_by(
                out,
                primary_key,
                |out, v| self.write_identifier_quoted(out, v.name),
                ", ",
            );
            out.push(')');
        }
        out.push_str(");");
    }

    /// Column definition, the validators of the column become `CHECK` constraints.
    pub fn write_create_table_column_fragment(
        &self,
        out: &mut String,
        column: &ColumnDef,
        composite_key: bool,
    ) {
        self.write_identifier_quoted(out, column.name);
        out.push(' ');
        self.write_column_type(out, column.column_type);
        if !column.nullable || column.primary_key {
            out.push_str(" NOT NULL");
        }
        if column.primary_key && !composite_key {
            // Composite primary key is written after the columns
            out.push_str(" PRIMARY KEY");
        }
        if column.unique && !column.primary_key {
            out.push_str(" UNIQUE");
        }
        if column.not_empty {
            out.push_str(" CHECK (length(");
            self.write_identifier_quoted(out, column.name);
            out.push_str(") > 0)");
        }
        if let Some(min) = column.min {
            out.push_str(" CHECK (");
            self.write_identifier_quoted(out, column.name);
            let _ = write!(out, " >= {})", min);
        }
        if let Some(max) = column.max {
            out.push_str(" CHECK (");
            self.write_identifier_quoted(out, column.name);
            let _ = write!(out, " <= {})", max);
        }
    }

    pub fn write_insert<E: Entity>(
        &self,
        out: &mut String,
        params: &mut Params,
        row: &[(&'static str, Value)],
    ) {
        out.reserve(64 + row.len() * 32);
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("INSERT INTO ");
        self.write_identifier_quoted(out, E::table());
        out.push_str(" (");
        separated_by(
            out,
            row,
            |out, (name, _)| self.write_identifier_quoted(out, name),
            ", ",
        );
        out.push_str(") VALUES (");
        separated_by(
            out,
            row,
            |out, (_, value)| self.write_param(out, params, "v", value.clone()),
            ", ",
        );
        out.push_str(");");
    }

    pub fn write_select<E: Entity>(
        &self,
        out: &mut String,
        params: &mut Params,
        filter: &Filter,
        order: Option<&Order>,
        limit: Option<u32>,
    ) {
        out.reserve(128 + E::columns().len() * 32);
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("SELECT ");
        separated_by(
            out,
            E::columns(),
            |out, v| self.write_identifier_quoted(out, v.name),
            ", ",
        );
        out.push_str("\nFROM ");
        self.write_identifier_quoted(out, E::table());
        self.write_where(out, params, filter);
        if let Some(order) = order {
            out.push_str("\nORDER BY ");
            self.write_identifier_quoted(out, &order.column);
            out.push_str(if order.descending { " DESC" } else { " ASC" });
        }
        if let Some(limit) = limit {
            let _ = write!(out, "\nLIMIT {}", limit);
        }
        out.push(';');
    }

    pub fn write_update<E: Entity>(
        &self,
        out: &mut String,
        params: &mut Params,
        values: &[(&str, Value)],
        filter: &Filter,
    ) {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("UPDATE ");
        self.write_identifier_quoted(out, E::table());
        out.push_str(" SET ");
        separated_by(
            out,
            values,
            |out, (name, value)| {
                self.write_identifier_quoted(out, name);
                out.push_str(" = ");
                self.write_param(out, params, "v", value.clone());
            },
            ", ",
        );
        self.write_where(out, params, filter);
        out.push(';');
    }

    pub fn write_delete<E: Entity>(&self, out: &mut String, params: &mut Params, filter: &Filter) {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("DELETE FROM ");
        self.write_identifier_quoted(out, E::table());
        self.write_where(out, params, filter);
        out.push(';');
    }

    /// Conjunction of equalities, null compares with `IS NULL`. Nothing is written for an empty
    /// filter.
    pub fn write_where(&self, out: &mut String, params: &mut Params, filter: &Filter) {
        if filter.is_empty() {
            return;
        }
        out.push_str("\nWHERE ");
        separated_by(
            out,
            filter.iter(),
            |out, (name, value)| {
                self.write_identifier_quoted(out, name);
                if value.is_null() {
                    out.push_str(" IS NULL");
                } else {
                    out.push_str(" = ");
                    self.write_param(out, params, "w", value.clone());
                }
            },
            " AND ",
        );
    }

    fn write_param(&self, out: &mut String, params: &mut Params, prefix: &str, value: Value) {
        let name = format!("{}{}", prefix, params.len());
        let _ = write!(out, ":{}", name);
        params.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use multitxn_core::{Result, RowLabeled, params};

    struct Account;

    impl Entity for Account {
        fn table() -> &'static str {
            "Accounts"
        }
        fn columns() -> &'static [ColumnDef] {
            const COLUMNS: &[ColumnDef] = &[
                ColumnDef::new("accountId", ColumnType::Text)
                    .primary_key()
                    .not_empty(),
                ColumnDef::new("balance", ColumnType::Integer).min(0),
                ColumnDef::new("note", ColumnType::Text).nullable(),
            ];
            COLUMNS
        }
        fn row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }
        fn from_row(_row: &RowLabeled) -> Result<Self> {
            Ok(Account)
        }
    }

    #[test]
    fn create_table_with_checks() {
        let mut out = String::new();
        SqliteSqlWriter::default().write_create_table::<Account>(&mut out, true);
        assert_eq!(
            out,
            indoc! {r#"
                CREATE TABLE IF NOT EXISTS "Accounts" (
                "accountId" TEXT NOT NULL PRIMARY KEY CHECK (length("accountId") > 0),
                "balance" INTEGER NOT NULL CHECK ("balance" >= 0),
                "note" TEXT);"#}
        );
    }

    #[test]
    fn insert_update_delete() {
        let writer = SqliteSqlWriter::default();
        let mut out = String::new();
        let mut params = Params::new();
        writer.write_insert::<Account>(
            &mut out,
            &mut params,
            &[("accountId", "a1".into()), ("balance", 100.into())],
        );
        assert_eq!(
            out,
            r#"INSERT INTO "Accounts" ("accountId", "balance") VALUES (:v0, :v1);"#
        );
        assert_eq!(params, params! { "v0" => "a1", "v1" => 100 });

        let mut out = String::new();
        let mut params = Params::new();
        writer.write_update::<Account>(
            &mut out,
            &mut params,
            &[("balance", 70.into())],
            &Filter::eq("accountId", "a1"),
        );
        assert_eq!(
            out,
            indoc! {r#"
                UPDATE "Accounts" SET "balance" = :v0
                WHERE "accountId" = :w1;"#}
        );
        assert_eq!(params, params! { "v0" => 70, "w1" => "a1" });

        let mut out = String::new();
        let mut params = Params::new();
        writer.write_delete::<Account>(&mut out, &mut params, &Filter::all());
        assert_eq!(out, r#"DELETE FROM "Accounts";"#);
        assert!(params.is_empty());
    }

    #[test]
    fn select_with_order_and_limit() {
        let mut out = String::new();
        let mut params = Params::new();
        SqliteSqlWriter::default().write_select::<Account>(
            &mut out,
            &mut params,
            &Filter::eq("accountId", "a\"1").and("note", Value::Null),
            Some(&Order::desc("balance")),
            Some(1),
        );
        assert_eq!(
            out,
            indoc! {r#"
                SELECT "accountId", "balance", "note"
                FROM "Accounts"
                WHERE "accountId" = :w0 AND "note" IS NULL
                ORDER BY "balance" DESC
                LIMIT 1;"#}
        );
        assert_eq!(params.get("w0"), Some(&Value::from("a\"1")));
    }

    #[test]
    fn quoted_identifiers() {
        let mut out = String::new();
        SqliteSqlWriter::default().write_identifier_quoted(&mut out, "weird\"name");
        assert_eq!(out, r#""weird""name""#);
    }
}
