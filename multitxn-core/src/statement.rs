use crate::Value;
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

/// Named parameters of a statement, keyed without the placeholder sigil.
pub type Params = BTreeMap<String, Value>;

/// Declarative task payload: statement text with named placeholders and their values.
///
/// Placeholders are written `:name` (or `@name`, `$name` where the backend accepts them) and are
/// substituted by the backend driver, never by string concatenation.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Params,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::new(),
        }
    }
    pub fn with_params(text: impl Into<String>, params: Params) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
    /// Bind a value to the named placeholder, the sigil is optional.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(strip_sigil(name).into(), value.into());
        self
    }
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(strip_sigil(name))
    }
}

pub(crate) fn strip_sigil(name: &str) -> &str {
    name.trim_start_matches([':', '@', '$'])
}

impl From<&str> for Statement {
    fn from(value: &str) -> Self {
        Statement::new(value)
    }
}

impl From<String> for Statement {
    fn from(value: String) -> Self {
        Statement::new(value)
    }
}

impl<S: Into<String>> From<(S, Params)> for Statement {
    fn from((text, params): (S, Params)) -> Self {
        Statement::with_params(text, params)
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::truncate_long!(self.text))
    }
}

/// Build a [`Params`] map: `params! { "accountId" => id, "balance" => 0 }`.
#[macro_export]
macro_rules! params {
    () => { $crate::Params::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $(
            params.insert(
                ::std::string::String::from($name).trim_start_matches([':', '@', '$']).to_string(),
                $crate::Value::from($value),
            );
        )+
        params
    }};
}
