use crate::error::{PreflightError, Result};
use crate::models::{TaskOptions, VariableEntry};
use crate::services::discovery::{self, ExecutableLocator};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;

/// Default language code passed to PitStop Server
pub const DEFAULT_LANGUAGE: &str = "enUS";

/// Default cap for both report item limits
pub const DEFAULT_REPORT_LIMIT: u32 = 100;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "config.xml";
pub const DEFAULT_VARIABLE_SET_FILE_NAME: &str = "variableset.evs";
pub const DEFAULT_TASK_REPORT_NAME: &str = "taskreport.xml";

const WRITE_PROBE_NAME: &str = ".pitstop-runner-write-probe";

/// Measurement unit used for report output and for length variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasurementUnit {
    #[default]
    #[serde(alias = "millimeter", alias = "mm")]
    Millimeter,
    #[serde(alias = "centimeter", alias = "cm")]
    Centimeter,
    #[serde(alias = "inch", alias = "in")]
    Inch,
    #[serde(alias = "point", alias = "pt")]
    Point,
}

impl MeasurementUnit {
    /// Convert a length expressed in this unit to PDF points
    pub fn to_points(self, value: f64) -> f64 {
        match self {
            MeasurementUnit::Millimeter => value / 25.4 * 72.0,
            MeasurementUnit::Centimeter => value / 2.54 * 72.0,
            MeasurementUnit::Inch => value * 72.0,
            MeasurementUnit::Point => value,
        }
    }

    /// Text written to the `MeasurementUnit` node of the configuration
    pub fn as_config_value(self) -> &'static str {
        match self {
            MeasurementUnit::Millimeter => "Millimeter",
            MeasurementUnit::Centimeter => "Centimeter",
            MeasurementUnit::Inch => "Inch",
            MeasurementUnit::Point => "Point",
        }
    }
}

impl FromStr for MeasurementUnit {
    type Err = PreflightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "millimeter" | "millimetre" | "mm" => Ok(MeasurementUnit::Millimeter),
            "centimeter" | "centimetre" | "cm" => Ok(MeasurementUnit::Centimeter),
            "inch" | "in" => Ok(MeasurementUnit::Inch),
            "point" | "pt" => Ok(MeasurementUnit::Point),
            other => Err(PreflightError::Validation(format!(
                "unknown measurement unit '{}'",
                other
            ))),
        }
    }
}

/// Report outputs for one run. `None` means the report kind is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub pdf: Option<Utf8PathBuf>,
    pub xml: Option<Utf8PathBuf>,
    pub json: Option<Utf8PathBuf>,
    pub task: Option<Utf8PathBuf>,
    pub max_items_per_category: u32,
    pub max_occurrences_per_item: u32,
}

/// Fully resolved settings for a single PitStop Server run.
///
/// Built once by [`TaskDescriptor::from_options`]; after that only
/// `variable_set` changes, when the run writes its own variable set.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub input_pdf: Utf8PathBuf,
    pub output_folder: Utf8PathBuf,
    pub output_pdf_name: String,
    pub preflight_profile: Option<Utf8PathBuf>,
    pub action_lists: Vec<Utf8PathBuf>,

    /// Variable set referenced by the configuration
    pub variable_set: Option<Utf8PathBuf>,
    pub variables: Vec<VariableEntry>,
    pub config_template: Option<Utf8PathBuf>,

    pub reports: ReportSettings,
    pub measurement_unit: MeasurementUnit,
    pub language: String,

    pub executable: Utf8PathBuf,
    pub config_path: Utf8PathBuf,

    /// Where a built or updated variable set is written
    pub variable_set_output: Utf8PathBuf,
}

impl TaskDescriptor {
    /// Validate an option bag and resolve every default.
    ///
    /// # Errors
    ///
    /// - [`PreflightError::Validation`] if `inputPDF`/`outputFolder` are missing
    ///   or neither a preflight profile nor an action list is given
    /// - [`PreflightError::Filesystem`] if the input PDF or a referenced file is
    ///   missing, or the output folder is missing or not writable
    /// - [`PreflightError::NotFound`] if the PitStop Server executable cannot be found
    pub fn from_options(options: TaskOptions, locator: &dyn ExecutableLocator) -> Result<Self> {
        let input_pdf = options
            .input_pdf
            .ok_or_else(|| PreflightError::Validation("inputPDF is required".to_string()))?;
        let output_folder = options
            .output_folder
            .ok_or_else(|| PreflightError::Validation("outputFolder is required".to_string()))?;

        if options.preflight_profile.is_none() && options.action_lists.is_empty() {
            return Err(PreflightError::Validation(
                "either a preflight profile or at least one action list is required".to_string(),
            ));
        }

        let input_pdf = existing_file(&input_pdf, "input PDF")?;
        let output_folder = writable_folder(&output_folder)?;

        let preflight_profile = options
            .preflight_profile
            .as_deref()
            .map(|p| existing_file(p, "preflight profile"))
            .transpose()?;
        let action_lists = options
            .action_lists
            .iter()
            .map(|p| existing_file(p, "action list"))
            .collect::<Result<Vec<_>>>()?;
        let variable_set = options
            .variable_set
            .as_deref()
            .map(|p| existing_file(p, "variable set"))
            .transpose()?;
        let config_template = options
            .config_file
            .as_deref()
            .map(|p| existing_file(p, "configuration template"))
            .transpose()?;

        let executable = match options.application_path.as_deref() {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                return Err(PreflightError::NotFound(format!(
                    "PitStop Server executable {} does not exist",
                    path
                )));
            }
            None => discovery::resolve_executable(locator)?,
        };

        let base_name = input_pdf.file_stem().unwrap_or("output").to_string();

        let report_path = |enabled: bool, name: Option<String>, default: String| {
            enabled.then(|| output_folder.join(name.unwrap_or(default)))
        };
        let reports = ReportSettings {
            pdf: report_path(
                options.pdf_report,
                options.pdf_report_name,
                format!("{}_report.pdf", base_name),
            ),
            xml: report_path(
                options.xml_report,
                options.xml_report_name,
                format!("{}.xml", base_name),
            ),
            json: report_path(
                options.json_report,
                options.json_report_name,
                format!("{}.json", base_name),
            ),
            task: report_path(
                options.task_report,
                options.task_report_name,
                DEFAULT_TASK_REPORT_NAME.to_string(),
            ),
            max_items_per_category: options
                .max_items_per_category
                .unwrap_or(DEFAULT_REPORT_LIMIT),
            max_occurrences_per_item: options
                .max_occurrences_per_item
                .unwrap_or(DEFAULT_REPORT_LIMIT),
        };

        let config_path = output_folder.join(
            options
                .config_file_name
                .as_deref()
                .unwrap_or(DEFAULT_CONFIG_FILE_NAME),
        );
        let variable_set_output = output_folder.join(
            options
                .variable_set_file_name
                .as_deref()
                .unwrap_or(DEFAULT_VARIABLE_SET_FILE_NAME),
        );

        let task = Self {
            output_pdf_name: options
                .output_pdf_name
                .unwrap_or_else(|| format!("{}.pdf", base_name)),
            input_pdf,
            preflight_profile,
            action_lists,
            variable_set,
            variables: options.variables,
            config_template,
            reports,
            measurement_unit: options.measurement_unit.unwrap_or_default(),
            language: options
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            executable,
            config_path,
            variable_set_output,
            output_folder,
        };

        tracing::debug!(
            "Resolved task: input={}, output={}, profile={:?}, action_lists={}",
            task.input_pdf,
            task.output_folder,
            task.preflight_profile,
            task.action_lists.len()
        );

        Ok(task)
    }

    /// Full path of the processed PDF
    pub fn output_pdf(&self) -> Utf8PathBuf {
        self.output_folder.join(&self.output_pdf_name)
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf> {
    let absolute = std::path::absolute(path.as_std_path())?;
    Utf8PathBuf::from_path_buf(absolute).map_err(|p| {
        PreflightError::Filesystem(format!("path is not valid UTF-8: {}", p.display()))
    })
}

fn existing_file(path: &Utf8Path, what: &str) -> Result<Utf8PathBuf> {
    if !path.is_file() {
        return Err(PreflightError::Filesystem(format!(
            "{} {} does not exist",
            what, path
        )));
    }
    absolute(path)
}

fn writable_folder(path: &Utf8Path) -> Result<Utf8PathBuf> {
    if !path.is_dir() {
        return Err(PreflightError::Filesystem(format!(
            "output folder {} does not exist",
            path
        )));
    }

    let probe = path.join(WRITE_PROBE_NAME);
    fs::write(&probe, b"").map_err(|e| {
        PreflightError::Filesystem(format!("output folder {} is not writable: {}", path, e))
    })?;
    if let Err(e) = fs::remove_file(&probe) {
        tracing::warn!("Failed to remove write probe {}: {}", probe, e);
    }

    absolute(path)
}
