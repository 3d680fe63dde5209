use crate::error::{PreflightError, Result};
use crate::models::{MeasurementUnit, VariableEntry};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Option keys accepted by [`TaskOptions::apply`]
pub const OPTION_KEYS: &[&str] = &[
    "inputPDF",
    "outputFolder",
    "preflightProfile",
    "actionLists",
    "variableSet",
    "variables",
    "configFile",
    "applicationPath",
    "pdfReport",
    "xmlReport",
    "jsonReport",
    "taskReport",
    "outputPDFName",
    "pdfReportName",
    "xmlReportName",
    "jsonReportName",
    "taskReportName",
    "configFileName",
    "variableSetFileName",
    "measurementUnit",
    "language",
    "maxItemsPerCategory",
    "maxOccurrencesPerItem",
];

/// Loosely-typed options for one run, as read from a job file or the command line.
///
/// Everything is optional here; [`crate::models::TaskDescriptor::from_options`]
/// decides what is mandatory and fills in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskOptions {
    #[serde(rename = "inputPDF", skip_serializing_if = "Option::is_none")]
    pub input_pdf: Option<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<Utf8PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preflight_profile: Option<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub action_lists: Vec<Utf8PathBuf>,

    /// Existing variable set, used as-is or as a template for `variables`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_set: Option<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableEntry>,

    /// Configuration template to start from instead of the blank one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_path: Option<Utf8PathBuf>,

    pub pdf_report: bool,
    pub xml_report: bool,
    pub json_report: bool,
    pub task_report: bool,

    #[serde(rename = "outputPDFName", skip_serializing_if = "Option::is_none")]
    pub output_pdf_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_report_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_report_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_report_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_report_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_set_file_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_unit: Option<MeasurementUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items_per_category: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_occurrences_per_item: Option<u32>,
}

impl TaskOptions {
    /// Set a single option from its textual form.
    ///
    /// Keys are matched case-insensitively against [`OPTION_KEYS`]. Every key
    /// assigns exactly one field. `actionLists` accepts a comma-separated list
    /// and appends; `variables` (or `variable`) appends one `Name:Type=Value` entry.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let path = || Utf8PathBuf::from(value.trim());
        let text = || value.trim().to_string();

        match key.trim().to_ascii_lowercase().as_str() {
            "inputpdf" => self.input_pdf = Some(path()),
            "outputfolder" => self.output_folder = Some(path()),
            "preflightprofile" => self.preflight_profile = Some(path()),
            "actionlists" | "actionlist" => self.action_lists.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Utf8PathBuf::from),
            ),
            "variableset" => self.variable_set = Some(path()),
            "variables" | "variable" => {
                self.variables.push(VariableEntry::parse_assignment(value)?)
            }
            "configfile" => self.config_file = Some(path()),
            "applicationpath" => self.application_path = Some(path()),
            "pdfreport" => self.pdf_report = parse_flag(key, value)?,
            "xmlreport" => self.xml_report = parse_flag(key, value)?,
            "jsonreport" => self.json_report = parse_flag(key, value)?,
            "taskreport" => self.task_report = parse_flag(key, value)?,
            "outputpdfname" => self.output_pdf_name = Some(text()),
            "pdfreportname" => self.pdf_report_name = Some(text()),
            "xmlreportname" => self.xml_report_name = Some(text()),
            "jsonreportname" => self.json_report_name = Some(text()),
            "taskreportname" => self.task_report_name = Some(text()),
            "configfilename" => self.config_file_name = Some(text()),
            "variablesetfilename" => self.variable_set_file_name = Some(text()),
            "measurementunit" => self.measurement_unit = Some(value.parse()?),
            "language" => self.language = Some(text()),
            "maxitemspercategory" => self.max_items_per_category = Some(parse_limit(key, value)?),
            "maxoccurrencesperitem" => {
                self.max_occurrences_per_item = Some(parse_limit(key, value)?)
            }
            _ => {
                return Err(PreflightError::Validation(format!(
                    "unknown option '{}'",
                    key
                )));
            }
        }

        tracing::trace!("Applied option {}={}", key, value);
        Ok(())
    }

    /// Apply overrides in insertion order
    pub fn apply_all(&mut self, overrides: &IndexMap<String, Vec<String>>) -> Result<()> {
        for (key, values) in overrides {
            for value in values {
                self.apply(key, value)?;
            }
        }
        Ok(())
    }
}

/// Collect `key=value` pairs, keeping the order they were given in.
///
/// A repeated key keeps its first position and collects every value, so
/// `actionLists` and `variables` can be given more than once.
pub fn parse_overrides<S: AsRef<str>>(pairs: &[S]) -> Result<IndexMap<String, Vec<String>>> {
    let mut overrides: IndexMap<String, Vec<String>> = IndexMap::new();

    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            PreflightError::Validation(format!("override '{}' must look like key=value", pair))
        })?;
        overrides
            .entry(key.trim().to_string())
            .or_default()
            .push(value.to_string());
    }

    Ok(overrides)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(PreflightError::Validation(format!(
            "option '{}' expects true or false, got '{}'",
            key, value
        ))),
    }
}

fn parse_limit(key: &str, value: &str) -> Result<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        PreflightError::Validation(format!(
            "option '{}' expects a non-negative integer, got '{}'",
            key, value
        ))
    })
}
