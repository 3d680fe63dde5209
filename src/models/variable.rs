use crate::error::{PreflightError, Result};
use crate::models::MeasurementUnit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a variable in an Enfocus variable set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    #[serde(alias = "number")]
    Number,
    #[serde(alias = "string")]
    String,
    #[serde(alias = "boolean", alias = "bool")]
    Boolean,
    #[serde(alias = "length")]
    Length,
}

impl VariableType {
    /// Name used for `ResultType` / `ValueType` in the variable-set document
    pub fn as_str(self) -> &'static str {
        match self {
            VariableType::Number => "Number",
            VariableType::String => "String",
            VariableType::Boolean => "Boolean",
            VariableType::Length => "Length",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "number" => Some(VariableType::Number),
            "string" | "text" => Some(VariableType::String),
            "boolean" | "bool" => Some(VariableType::Boolean),
            "length" => Some(VariableType::Length),
            _ => None,
        }
    }
}

/// Raw value supplied for a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl VariableValue {
    /// Numeric interpretation, `None` when the value is not a finite number
    pub fn as_number(&self) -> Option<f64> {
        let number = match self {
            VariableValue::Number(n) => *n,
            VariableValue::Text(s) => s.trim().parse::<f64>().ok()?,
            VariableValue::Boolean(_) => return None,
        };
        number.is_finite().then_some(number)
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Boolean(b) => write!(f, "{}", b),
            VariableValue::Number(n) => write!(f, "{}", n),
            VariableValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Number(value)
    }
}

impl From<i32> for VariableValue {
    fn from(value: i32) -> Self {
        VariableValue::Number(f64::from(value))
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Boolean(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Text(value)
    }
}

/// One named variable and the value it should take for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    pub value: VariableValue,
}

impl VariableEntry {
    pub fn new(
        name: impl Into<String>,
        variable_type: VariableType,
        value: impl Into<VariableValue>,
    ) -> Self {
        Self {
            name: name.into(),
            variable_type,
            value: value.into(),
        }
    }

    /// Parse the `Name:Type=Value` form used on the command line
    pub fn parse_assignment(assignment: &str) -> Result<Self> {
        let invalid = || {
            PreflightError::Validation(format!(
                "variable '{}' must look like Name:Type=Value",
                assignment
            ))
        };

        let (declaration, raw_value) = assignment.split_once('=').ok_or_else(invalid)?;
        let (name, type_name) = declaration.split_once(':').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }

        let variable_type = VariableType::parse(type_name).ok_or_else(|| {
            PreflightError::Validation(format!("unknown variable type '{}'", type_name.trim()))
        })?;

        let value = match variable_type {
            VariableType::Boolean => match raw_value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => VariableValue::Boolean(true),
                "false" | "no" | "0" => VariableValue::Boolean(false),
                _ => VariableValue::Text(raw_value.to_string()),
            },
            VariableType::Number | VariableType::Length => raw_value
                .trim()
                .parse::<f64>()
                .map(VariableValue::Number)
                .unwrap_or_else(|_| VariableValue::Text(raw_value.to_string())),
            VariableType::String => VariableValue::Text(raw_value.to_string()),
        };

        Ok(Self {
            name: name.to_string(),
            variable_type,
            value,
        })
    }

    /// Text stored in the operator's `Value` node for the given declared type
    pub fn stored_value(&self, declared: VariableType, unit: MeasurementUnit) -> String {
        if declared == VariableType::Length {
            format_number(length_in_points(&self.value, unit))
        } else {
            self.value.to_string()
        }
    }
}

/// Convert a length value in `unit` to points. Non-numeric input yields 0.
pub fn length_in_points(value: &VariableValue, unit: MeasurementUnit) -> f64 {
    let points = value.as_number().map_or(0.0, |n| unit.to_points(n));
    if points.is_finite() { points } else { 0.0 }
}

fn format_number(value: f64) -> String {
    format!("{}", value)
}
