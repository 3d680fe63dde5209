//! Enfocus variable-set documents (`.evs`).
//!
//! A variable set binds named variables used inside preflight profiles and
//! action lists to concrete values. Each variable is a `Variable` entry that
//! points at an `Operator` entry through `OperatorID` = `GUID`; the value
//! itself lives in the operator's `OperatorData/Value`.
//!
//! Two ways to produce one for a run:
//! - [`build_variable_set`]: fresh document, IDs assigned 1..N in entry order
//! - [`update_variable_set`]: rewrite values in an existing template, looking
//!   variables up by name
//!
//! Length values are always stored in points, converted from the task's
//! measurement unit (see [`crate::models::length_in_points`]).

use crate::error::{PreflightError, Result};
use crate::models::{MeasurementUnit, TaskDescriptor, VariableEntry, VariableType};
use crate::xml::{DocumentTree, XmlDocument};
use camino::Utf8Path;

/// Namespace of the Enfocus variable-set format
pub const VARIABLE_SET_NAMESPACE: &str = "http://www.enfocus.com/2012/EnfocusVariableSet";

/// Source and operator type for a constant value
pub const CONSTANT_OPERATOR: &str = "com.enfocus.operator.constant";

/// Unit stored in `DefaultUnit` for length variables; values are written in points
pub const LENGTH_UNIT_MARKER: &str = "pt";

const FORMAT_VERSION: &str = "1";

/// Build a complete variable set with one Variable/Operator pair per entry
pub fn build_variable_set(entries: &[VariableEntry], unit: MeasurementUnit) -> XmlDocument {
    let mut doc = XmlDocument::new("vs:VariableSet", &[("xmlns:vs", VARIABLE_SET_NAMESPACE)]);
    let root = doc.root();

    doc.append_element(root, "Version", Some(FORMAT_VERSION));
    let variables = doc.append_element(root, "Variables", None);
    let operators = doc.append_element(root, "Operators", None);

    for (index, entry) in entries.iter().enumerate() {
        let id = (index + 1).to_string();
        let type_name = entry.variable_type.as_str();

        let variable = doc.append_element(variables, "Variable", None);
        doc.append_element(variable, "Name", Some(entry.name.as_str()));
        doc.append_element(variable, "ResultType", Some(type_name));
        doc.append_element(variable, "SourceType", Some(CONSTANT_OPERATOR));
        doc.append_element(variable, "SourceVersion", Some(FORMAT_VERSION));
        doc.append_element(variable, "OperatorID", Some(id.as_str()));
        if entry.variable_type == VariableType::Length {
            doc.append_element(variable, "DefaultUnit", Some(LENGTH_UNIT_MARKER));
        }

        let operator = doc.append_element(operators, "Operator", None);
        doc.append_element(operator, "OperatorType", Some(CONSTANT_OPERATOR));
        doc.append_element(operator, "GUID", Some(id.as_str()));
        let data = doc.append_element(operator, "OperatorData", None);
        let value = entry.stored_value(entry.variable_type, unit);
        doc.append_element(data, "Value", Some(value.as_str()));
        doc.append_element(data, "ValueType", Some(type_name));
        doc.append_element(operator, "OperatorVersion", Some(FORMAT_VERSION));
    }

    tracing::debug!("Built variable set with {} variables", entries.len());
    doc
}

/// Set new values for existing variables.
///
/// The declared `ResultType` in the document decides whether the value is a
/// length; length variables get `DefaultUnit` set to points, creating the
/// node when the template lacks it.
///
/// # Errors
///
/// - [`PreflightError::NotFound`] if a variable or its operator is absent
/// - [`PreflightError::Structural`] if the `Variables`/`Operators` lists or
///   an `OperatorID`/`Value` node are missing
pub fn update_variable_set<D: DocumentTree>(
    doc: &mut D,
    entries: &[VariableEntry],
    unit: MeasurementUnit,
) -> Result<()> {
    let root = doc.root();
    let variables = doc.select_one(root, "Variables")?;
    let operators = doc.select_one(root, "Operators")?;

    for entry in entries {
        let variable = doc
            .select(variables, "Variable")
            .into_iter()
            .find(|&v| child_text(&*doc, v, "Name").as_deref() == Some(entry.name.as_str()))
            .ok_or_else(|| {
                PreflightError::NotFound(format!(
                    "variable '{}' is not defined in the variable set",
                    entry.name
                ))
            })?;

        let declared = child_text(&*doc, variable, "ResultType")
            .and_then(|t| VariableType::parse(&t))
            .unwrap_or(entry.variable_type);

        if declared == VariableType::Length {
            let default_unit = match doc.find_child(variable, "DefaultUnit") {
                Some(node) => node,
                None => doc.append_element(variable, "DefaultUnit", None),
            };
            doc.set_text(default_unit, LENGTH_UNIT_MARKER)?;
        }

        let operator_id = child_text(&*doc, variable, "OperatorID").ok_or_else(|| {
            PreflightError::Structural(format!("variable '{}' has no OperatorID", entry.name))
        })?;

        let operator = doc
            .select(operators, "Operator")
            .into_iter()
            .find(|&o| child_text(&*doc, o, "GUID").as_deref() == Some(operator_id.as_str()))
            .ok_or_else(|| {
                PreflightError::NotFound(format!(
                    "operator {} for variable '{}' is not defined",
                    operator_id, entry.name
                ))
            })?;

        let value = doc.select_one(operator, "OperatorData/Value")?;
        doc.set_text(value, &entry.stored_value(declared, unit))?;

        tracing::debug!("Updated variable {} ({})", entry.name, declared.as_str());
    }

    Ok(())
}

/// Build a fresh variable set and write it to `path`
pub fn write_variable_set(
    path: &Utf8Path,
    entries: &[VariableEntry],
    unit: MeasurementUnit,
) -> Result<()> {
    build_variable_set(entries, unit).write_to(path)
}

/// Update the variable set stored at `path` in place.
///
/// The file is only rewritten when every entry was applied, so a missing
/// variable leaves it untouched.
pub fn update_variable_set_file(
    path: &Utf8Path,
    entries: &[VariableEntry],
    unit: MeasurementUnit,
) -> Result<()> {
    let mut doc = XmlDocument::from_file(path)?;
    update_variable_set(&mut doc, entries, unit)?;
    doc.write_to(path)
}

/// Produce the variable set a task should reference.
///
/// With variables and a template, the updated template is written into the
/// output folder; with variables only, a fresh set is built. Either way
/// the task is pointed at the written file. Without variables a given
/// variable set is referenced unchanged.
pub fn materialize_variable_set(task: &mut TaskDescriptor) -> Result<()> {
    if task.variables.is_empty() {
        return Ok(());
    }

    let output = task.variable_set_output.clone();
    match task.variable_set.as_deref() {
        Some(template) => {
            let mut doc = XmlDocument::from_file(template)?;
            update_variable_set(&mut doc, &task.variables, task.measurement_unit)?;
            doc.write_to(&output)?;
        }
        None => write_variable_set(&output, &task.variables, task.measurement_unit)?,
    }

    tracing::info!(
        "Variable set with {} variables written to {}",
        task.variables.len(),
        output
    );
    task.variable_set = Some(output);
    Ok(())
}

fn child_text<D: DocumentTree>(doc: &D, parent: D::Node, local: &str) -> Option<String> {
    doc.find_child(parent, local)
        .map(|node| doc.text(node).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VariableValue;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn entries() -> Vec<VariableEntry> {
        vec![
            VariableEntry::new("Bleed", VariableType::Length, 2.54),
            VariableEntry::new("Copies", VariableType::Number, 4),
            VariableEntry::new("Customer", VariableType::String, "ACME"),
            VariableEntry::new("Approve", VariableType::Boolean, true),
        ]
    }

    fn texts(doc: &XmlDocument, path: &str) -> Vec<String> {
        doc.select(doc.root(), path)
            .into_iter()
            .map(|n| doc.text(n))
            .collect()
    }

    #[test]
    fn test_build_assigns_sequential_ids() {
        let doc = build_variable_set(&entries(), MeasurementUnit::Centimeter);

        assert_eq!(texts(&doc, "Variables/Variable/OperatorID"), vec!["1", "2", "3", "4"]);
        assert_eq!(texts(&doc, "Operators/Operator/GUID"), vec!["1", "2", "3", "4"]);
        assert_eq!(
            texts(&doc, "Variables/Variable/Name"),
            vec!["Bleed", "Copies", "Customer", "Approve"]
        );
        assert_eq!(
            texts(&doc, "Operators/Operator/OperatorData/ValueType"),
            vec!["Length", "Number", "String", "Boolean"]
        );
    }

    #[test]
    fn test_build_converts_lengths() {
        let doc = build_variable_set(&entries(), MeasurementUnit::Centimeter);
        let values = texts(&doc, "Operators/Operator/OperatorData/Value");

        assert_eq!(values, vec!["72", "4", "ACME", "true"]);
        assert_eq!(texts(&doc, "Variables/Variable/DefaultUnit"), vec!["pt"]);
    }

    #[test]
    fn test_build_non_numeric_length_is_zero() {
        let entries = vec![VariableEntry::new("Gap", VariableType::Length, "wide")];
        let doc = build_variable_set(&entries, MeasurementUnit::Millimeter);
        assert_eq!(texts(&doc, "Operators/Operator/OperatorData/Value"), vec!["0"]);
    }

    #[test]
    fn test_build_namespace() {
        let xml = build_variable_set(&entries(), MeasurementUnit::Inch)
            .to_xml_string()
            .unwrap();
        assert!(xml.contains(VARIABLE_SET_NAMESPACE));
        assert!(xml.contains("<vs:Variables>"));
    }

    #[test]
    fn test_update_all_entries() {
        let mut doc = build_variable_set(&entries(), MeasurementUnit::Millimeter);
        let updated = vec![
            VariableEntry::new("Approve", VariableType::Boolean, false),
            VariableEntry::new("Bleed", VariableType::Length, 1),
            VariableEntry::new("Customer", VariableType::String, "Globex"),
            VariableEntry::new("Copies", VariableType::Number, 9),
        ];

        update_variable_set(&mut doc, &updated, MeasurementUnit::Inch).unwrap();

        assert_eq!(
            texts(&doc, "Operators/Operator/OperatorData/Value"),
            vec!["72", "9", "Globex", "false"]
        );
        assert_eq!(doc.select(doc.root(), "Variables/Variable").len(), 4);
        assert_eq!(doc.select(doc.root(), "Operators/Operator").len(), 4);
    }

    #[test]
    fn test_update_creates_default_unit() {
        let template = r#"<vs:VariableSet xmlns:vs="http://www.enfocus.com/2012/EnfocusVariableSet">
  <vs:Variables>
    <vs:Variable>
      <vs:Name>Margin</vs:Name>
      <vs:ResultType>Length</vs:ResultType>
      <vs:OperatorID>7</vs:OperatorID>
    </vs:Variable>
  </vs:Variables>
  <vs:Operators>
    <vs:Operator>
      <vs:GUID>7</vs:GUID>
      <vs:OperatorData><vs:Value>0</vs:Value></vs:OperatorData>
    </vs:Operator>
  </vs:Operators>
</vs:VariableSet>"#;
        let mut doc = XmlDocument::parse(template).unwrap();
        // declared type in the document wins over the entry's type
        let update = vec![VariableEntry::new("Margin", VariableType::Number, 25.4)];

        update_variable_set(&mut doc, &update, MeasurementUnit::Millimeter).unwrap();

        assert_eq!(texts(&doc, "Variables/Variable/DefaultUnit"), vec!["pt"]);
        assert_eq!(texts(&doc, "Operators/Operator/OperatorData/Value"), vec!["72"]);
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains("<vs:DefaultUnit>pt</vs:DefaultUnit>"));
    }

    #[test]
    fn test_update_missing_variable_leaves_file_untouched() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().join("set.evs")).unwrap();
        write_variable_set(&path, &entries(), MeasurementUnit::Point).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let update = vec![
            VariableEntry::new("Copies", VariableType::Number, 12),
            VariableEntry::new("Unknown", VariableType::Number, 1),
        ];
        let err = update_variable_set_file(&path, &update, MeasurementUnit::Point).unwrap_err();

        assert!(matches!(err, PreflightError::NotFound(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_update_without_lists_is_structural() {
        let mut doc = XmlDocument::parse("<vs:VariableSet xmlns:vs=\"x\"/>").unwrap();
        let update = vec![VariableEntry::new("A", VariableType::Number, 1)];
        let err = update_variable_set(&mut doc, &update, MeasurementUnit::Point).unwrap_err();
        assert!(matches!(err, PreflightError::Structural(_)));
    }

    #[test]
    fn test_update_text_value_for_length() {
        let mut doc = build_variable_set(&entries(), MeasurementUnit::Point);
        let update = vec![VariableEntry {
            name: "Bleed".to_string(),
            variable_type: VariableType::Length,
            value: VariableValue::Text("n/a".to_string()),
        }];

        update_variable_set(&mut doc, &update, MeasurementUnit::Point).unwrap();
        assert_eq!(texts(&doc, "Operators/Operator/OperatorData/Value")[0], "0");
    }
}
