use multitxn_core::{Error, Result, RowLabeled, Value};
use multitxn_sqlite::{ColumnDef, ColumnType, Entity, column_value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_id: String,
    pub balance: i64,
}

impl Account {
    pub fn new(account_id: impl Into<String>, balance: i64) -> Self {
        Self {
            account_id: account_id.into(),
            balance,
        }
    }
}

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
        ];
        COLUMNS
    }

    fn row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("accountId", self.account_id.clone().into()),
            ("balance", self.balance.into()),
        ]
    }

    fn from_row(row: &RowLabeled) -> Result<Self> {
        let account_id = column_value(row, "accountId")?;
        let balance = column_value(row, "balance")?;
        Ok(Self {
            account_id: account_id
                .as_str()
                .ok_or_else(|| Error::msg(format!("Unexpected accountId {:?}", account_id)))?
                .into(),
            balance: balance
                .as_i64()
                .ok_or_else(|| Error::msg(format!("Unexpected balance {:?}", balance)))?,
        })
    }
}
