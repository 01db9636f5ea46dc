use multitxn_core::{Error, Result, RowLabeled, Value};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Integer,
    Real,
    Text,
    Blob,
}

/// Column of an [`Entity`] with its validators.
///
/// Validators are checked before every write and also become `CHECK` constraints of the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    /// Text must not be empty.
    pub not_empty: bool,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            primary_key: false,
            unique: false,
            not_empty: false,
            min: None,
            max: None,
        }
    }
    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
    pub const fn primary_key(self) -> Self {
        Self {
            primary_key: true,
            ..self
        }
    }
    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }
    pub const fn not_empty(self) -> Self {
        Self {
            not_empty: true,
            ..self
        }
    }
    pub const fn min(self, min: i64) -> Self {
        Self {
            min: Some(min),
            ..self
        }
    }
    pub const fn max(self, max: i64) -> Self {
        Self {
            max: Some(max),
            ..self
        }
    }

    /// Check `value` against the type and the validators of the column.
    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if self.nullable && !self.primary_key {
                return Ok(());
            }
            return Err(self.violation("notNull", "cannot be null"));
        }
        let type_matches = match self.column_type {
            ColumnType::Boolean => {
                value.as_bool().is_some() || matches!(value.as_i64(), Some(0 | 1))
            }
            ColumnType::Integer => matches!(value, Value::Int64(..)),
            ColumnType::Real => value.as_f64().is_some(),
            ColumnType::Text => value.as_str().is_some(),
            ColumnType::Blob => matches!(value, Value::Blob(..)),
        };
        if !type_matches {
            return Err(self.violation(
                "type",
                &format!("expected {:?}, found {:?}", self.column_type, value),
            ));
        }
        if self.not_empty && value.as_str().is_some_and(str::is_empty) {
            return Err(self.violation("notEmpty", "cannot be empty"));
        }
        if let (Some(min), Some(v)) = (self.min, value.as_f64())
            && v < min as f64
        {
            return Err(self.violation("min", &format!("{} is lower than {}", v, min)));
        }
        if let (Some(max), Some(v)) = (self.max, value.as_f64())
            && v > max as f64
        {
            return Err(self.violation("max", &format!("{} is greater than {}", v, max)));
        }
        Ok(())
    }

    fn violation(&self, rule: &str, detail: &str) -> Error {
        Error::msg(format!(
            "Validation {} on {} failed: {}",
            rule, self.name, detail
        ))
    }
}

/// Record type mapped onto one table.
///
/// ```rust,ignore
/// impl Entity for Account {
///     fn table() -> &'static str {
///         "Accounts"
///     }
///     fn columns() -> &'static [ColumnDef] {
///         const COLUMNS: &[ColumnDef] = &[
///             ColumnDef::new("accountId", ColumnType::Text).primary_key().not_empty(),
///             ColumnDef::new("balance", ColumnType::Integer).min(0),
///         ];
///         COLUMNS
///     }
///     ...
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    fn table() -> &'static str;

    fn columns() -> &'static [ColumnDef];

    /// Values of the entity in column order.
    fn row(&self) -> Vec<(&'static str, Value)>;

    fn from_row(row: &RowLabeled) -> Result<Self>;

    fn column(name: &str) -> Option<&'static ColumnDef> {
        Self::columns().iter().find(|v| v.name == name)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in self.row() {
            validate_column::<Self>(name, &value)?;
        }
        Ok(())
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.row()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

pub(crate) fn validate_column<E: Entity>(name: &str, value: &Value) -> Result<()> {
    let Some(column) = E::column(name) else {
        return Err(Error::msg(format!(
            "Table `{}` has no column `{}`",
            E::table(),
            name
        )));
    };
    column.validate(value)
}

/// Value of a column that must be present in `row`.
pub fn column_value<'r>(row: &'r RowLabeled, name: &str) -> Result<&'r Value> {
    row.get_column(name)
        .ok_or_else(|| Error::msg(format!("The row has no column `{}`", name)))
}

/// Conjunction of column equalities.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(column, value)
    }
    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.conditions.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

impl Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BALANCE: ColumnDef = ColumnDef::new("balance", ColumnType::Integer).min(0);
    const ACCOUNT_ID: ColumnDef = ColumnDef::new("accountId", ColumnType::Text)
        .primary_key()
        .not_empty();

    #[test]
    fn validators() {
        assert!(BALANCE.validate(&Value::Int64(0)).is_ok());
        assert!(BALANCE.validate(&Value::Int64(100)).is_ok());
        let error = BALANCE.validate(&Value::Int64(-5)).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Validation min on balance failed: -5 is lower than 0"
        );
        assert!(BALANCE.validate(&Value::from("100")).is_err());
        assert!(BALANCE.validate(&Value::Null).is_err());

        assert!(ACCOUNT_ID.validate(&Value::from("a1")).is_ok());
        assert!(ACCOUNT_ID.validate(&Value::from("")).is_err());
        assert!(ACCOUNT_ID.validate(&Value::Null).is_err());
        assert!(ACCOUNT_ID.nullable().validate(&Value::Null).is_err());

        let note = ColumnDef::new("note", ColumnType::Text).nullable();
        assert!(note.validate(&Value::Null).is_ok());
    }

    #[test]
    fn filter_building() {
        let filter = Filter::eq("accountId", "a1").and("balance", 0);
        assert_eq!(
            filter.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            ["accountId", "balance"]
        );
        assert!(Filter::all().is_empty());
        assert_eq!(Order::desc("date").to_string(), "date DESC");
    }
}
