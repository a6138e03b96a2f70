use serde::{Deserialize, Serialize};

/// A single cell value: absent, numeric, or text.
///
/// Datasets arrive from messy spreadsheet exports, so coercion is
/// deliberately permissive: anything that fails to parse as a number is
/// simply not a number, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Empty,
    Number(f64),
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Empty
    }
}

impl Value {
    /// Numeric reading of the cell. Text is trimmed and parsed; empty and
    /// unparseable cells yield `None` (callers default to 0 where the
    /// permissive coercion policy applies).
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Empty => None,
        }
    }

    /// String form of the cell. Whole numbers render without a trailing
    /// `.0` so numeric cells compare cleanly against text sourced from
    /// spreadsheets.
    pub fn to_text(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Text(s) => s.clone(),
            Value::Empty => String::new(),
        }
    }

    /// Trimmed string form, used for key segments and pivot categories.
    pub fn trimmed_text(&self) -> String {
        self.to_text().trim().to_string()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
