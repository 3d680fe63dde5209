use crate::models::{MeasurementUnit, TaskOptions, VariableEntry, VariableType};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

/// Name of the optional settings file inside the settings directory
pub const SETTINGS_FILE_NAME: &str = "pitstop-runner.yaml";

/// Prefix of environment variables overriding settings (`PITSTOP__DEBUG=true`)
pub const ENV_PREFIX: &str = "PITSTOP";

/// Application settings for the command-line runner.
///
/// Resolved from defaults, then the settings file, then `PITSTOP__*`
/// environment variables. Job options (input PDF, profile, reports) are not
/// settings; they live in job files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory for rolling log files
    pub log_dir: Utf8PathBuf,

    /// Log file name prefix
    pub log_prefix: String,

    pub debug: bool,

    /// Also log to the terminal
    pub console: bool,

    /// Write log files as JSON lines
    pub json_logs: bool,

    /// PitStop Server CLI to use when a job does not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_path: Option<Utf8PathBuf>,

    /// Abort a run after this many seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_dir: Utf8PathBuf::from("logs"),
            log_prefix: "pitstop-runner".to_string(),
            debug: false,
            console: true,
            json_logs: false,
            application_path: None,
            timeout_secs: None,
        }
    }
}

/// Loads settings and reads/writes YAML job files.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    settings_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a manager rooted at `settings_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(settings_dir: P) -> Result<Self> {
        let settings_dir = settings_dir.as_ref().to_path_buf();

        if !settings_dir.exists() {
            fs::create_dir_all(&settings_dir).with_context(|| {
                format!("Failed to create settings directory: {}", settings_dir)
            })?;
        }

        Ok(Self {
            settings_path: settings_dir.join(SETTINGS_FILE_NAME),
            settings_dir,
        })
    }

    pub fn settings_dir(&self) -> &Utf8Path {
        &self.settings_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Resolve settings from the file (if present) and the process environment.
    pub fn load_settings(&self) -> Result<Settings> {
        self.load_settings_with_env(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_settings_with_env(&self, env: config::Environment) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: Settings = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::debug!("Resolved settings: {:?}", settings);
        Ok(settings)
    }

    /// Write the default settings file unless one already exists.
    ///
    /// # Returns
    /// `true` if a file was written
    pub fn write_default_settings(&self) -> Result<bool> {
        if self.settings_path.exists() {
            tracing::info!("Settings file {} already exists", self.settings_path);
            return Ok(false);
        }

        let yaml_string = serde_yaml_ng::to_string(&Settings::default())
            .context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Wrote default settings to {}", self.settings_path);
        Ok(true)
    }

    /// Load a job file.
    ///
    /// Relative paths in the job stay relative; they are resolved against the
    /// working directory when the run is constructed.
    pub fn load_job(&self, path: &Utf8Path) -> Result<TaskOptions> {
        let file_contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read job: {}", path))?;

        let options: TaskOptions = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse job: {}", path))?;

        tracing::info!("Loaded job from {}", path);
        Ok(options)
    }

    pub fn save_job(&self, path: &Utf8Path, options: &TaskOptions) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(options).context("Failed to serialize job to YAML")?;

        fs::write(path, yaml_string).with_context(|| format!("Failed to write job: {}", path))?;

        tracing::info!("Saved job to {}", path);
        Ok(())
    }

    /// Write a sample job with placeholder paths unless `path` already exists.
    pub fn write_job_template(&self, path: &Utf8Path) -> Result<bool> {
        if path.exists() {
            tracing::info!("Job file {} already exists", path);
            return Ok(false);
        }

        self.save_job(path, &sample_job())?;
        Ok(true)
    }
}

fn sample_job() -> TaskOptions {
    TaskOptions {
        input_pdf: Some(Utf8PathBuf::from("input.pdf")),
        output_folder: Some(Utf8PathBuf::from("output")),
        preflight_profile: Some(Utf8PathBuf::from("profile.ppp")),
        variables: vec![VariableEntry::new("Bleed", VariableType::Length, 3.0)],
        xml_report: true,
        measurement_unit: Some(MeasurementUnit::Millimeter),
        ..TaskOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(source))
    }

    #[test]
    fn test_defaults_without_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        let settings = manager.load_settings_with_env(env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_file_then_environment() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(
            manager.settings_path(),
            "log_prefix: nightly\ndebug: true\ntimeout_secs: 60\n",
        )
        .unwrap();

        let settings = manager
            .load_settings_with_env(env(&[("PITSTOP__TIMEOUT_SECS", "5")]))
            .unwrap();

        assert_eq!(settings.log_prefix, "nightly");
        assert!(settings.debug);
        assert_eq!(settings.timeout_secs, Some(5));
        assert_eq!(settings.log_dir, Utf8PathBuf::from("logs"));
    }

    #[test]
    fn test_write_default_settings_once() {
        let (manager, _temp_dir) = create_test_config_manager();

        assert!(manager.write_default_settings().unwrap());
        assert!(!manager.write_default_settings().unwrap());

        let settings = manager.load_settings_with_env(env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_save_job() {
        let (manager, _temp_dir) = create_test_config_manager();
        let path = manager.settings_dir().join("job.yaml");

        manager.save_job(&path, &sample_job()).unwrap();
        let loaded = manager.load_job(&path).unwrap();

        assert_eq!(loaded, sample_job());
    }

    #[test]
    fn test_job_template_is_not_overwritten() {
        let (manager, _temp_dir) = create_test_config_manager();
        let path = manager.settings_dir().join("job.yaml");
        fs::write(&path, "inputPDF: mine.pdf\n").unwrap();

        assert!(!manager.write_job_template(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "inputPDF: mine.pdf\n");
    }

    #[test]
    fn test_malformed_job_is_an_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        let path = manager.settings_dir().join("job.yaml");
        fs::write(&path, "xmlReport: [unterminated\n").unwrap();

        assert!(manager.load_job(&path).is_err());
    }
}
