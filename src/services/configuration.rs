//! Building the PitStop Server CLI configuration document.
//!
//! The document either starts from a blank instance of the vendor schema or
//! from a caller-supplied template. The task is then injected node by node
//! into fixed anchors:
//!
//! | Anchor | Injected |
//! |---|---|
//! | `Process/InputPath` | input PDF path (text) |
//! | `Process/OutputPath` | output PDF path (text) |
//! | `Process/Mutators` | `PreflightProfile`, `ActionList`* |
//! | `Process/Reports` | `ReportPDF`, `ReportXML`, `ReportJSON` |
//! | `TaskReport` | `TaskReportPath` (replaces an existing one) |
//! | `Process` | `VariableSet` (replaces an existing one) |
//! | `Process/MeasurementUnit` | unit name (text) |
//! | `Process/Language` | language code (text) |
//!
//! Every anchor must exist exactly once. A template missing one is reported as
//! [`crate::error::PreflightError::Structural`]; templates are expected to follow the vendor schema.

use crate::error::Result;
use crate::models::TaskDescriptor;
use crate::xml::{DocumentTree, XmlDocument};

/// Namespace of the PitStop Server CLI configuration schema
pub const CONFIGURATION_NAMESPACE: &str =
    "http://www.enfocus.com/2011/PitStopServerCLI_Configuration.xsd";

/// Blank configuration with every anchor the builder needs
pub const BLANK_CONFIGURATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cf:Configuration xmlns:cf="http://www.enfocus.com/2011/PitStopServerCLI_Configuration.xsd">
  <cf:Versioning>
    <cf:Version>7</cf:Version>
    <cf:VersioningStrategy>MostRecent</cf:VersioningStrategy>
  </cf:Versioning>
  <cf:Initialize>
    <cf:ProcessingMethod>EnforceServer</cf:ProcessingMethod>
    <cf:ShutDownServerAtExit>false</cf:ShutDownServerAtExit>
  </cf:Initialize>
  <cf:TaskReport>
    <cf:LogCommandLine>true</cf:LogCommandLine>
    <cf:LogProcessResults>true</cf:LogProcessResults>
  </cf:TaskReport>
  <cf:Process>
    <cf:InputPath/>
    <cf:OutputPath/>
    <cf:Mutators/>
    <cf:Reports/>
    <cf:MeasurementUnit/>
    <cf:Language/>
  </cf:Process>
</cf:Configuration>
"#;

/// Builds the configuration document for one task
pub struct ConfigurationBuilder<'a> {
    task: &'a TaskDescriptor,
}

impl<'a> ConfigurationBuilder<'a> {
    pub fn new(task: &'a TaskDescriptor) -> Self {
        Self { task }
    }

    /// Starting document: the template copied verbatim, or the blank instance
    pub fn base_document(&self) -> Result<XmlDocument> {
        match self.task.config_template.as_deref() {
            Some(template) => {
                tracing::debug!("Using configuration template {}", template);
                XmlDocument::from_file(template)
            }
            None => XmlDocument::parse(BLANK_CONFIGURATION),
        }
    }

    /// Base document with the whole task injected
    pub fn build(&self) -> Result<XmlDocument> {
        let mut doc = self.base_document()?;
        self.inject(&mut doc)?;
        Ok(doc)
    }

    /// Inject the task into any document tree that carries the anchors
    pub fn inject<D: DocumentTree>(&self, doc: &mut D) -> Result<()> {
        let root = doc.root();
        let process = doc.select_one(root, "Process")?;

        let input = doc.select_one(process, "InputPath")?;
        doc.set_text(input, self.task.input_pdf.as_str())?;

        let output = doc.select_one(process, "OutputPath")?;
        doc.set_text(output, self.task.output_pdf().as_str())?;

        self.inject_mutators(doc, process)?;
        self.inject_reports(doc, root, process)?;

        if let Some(variable_set) = self.task.variable_set.as_deref() {
            replace_or_append(doc, process, "VariableSet", variable_set.as_str())?;
        }

        let unit = doc.select_one(process, "MeasurementUnit")?;
        doc.set_text(unit, self.task.measurement_unit.as_config_value())?;

        let language = doc.select_one(process, "Language")?;
        doc.set_text(language, &self.task.language)?;

        Ok(())
    }

    fn inject_mutators<D: DocumentTree>(&self, doc: &mut D, process: D::Node) -> Result<()> {
        let mutators = doc.select_one(process, "Mutators")?;

        if let Some(profile) = self.task.preflight_profile.as_deref() {
            doc.append_element(mutators, "PreflightProfile", Some(profile.as_str()));
        }
        for action_list in &self.task.action_lists {
            doc.append_element(mutators, "ActionList", Some(action_list.as_str()));
        }

        Ok(())
    }

    fn inject_reports<D: DocumentTree>(
        &self,
        doc: &mut D,
        root: D::Node,
        process: D::Node,
    ) -> Result<()> {
        let reports = doc.select_one(process, "Reports")?;
        let settings = &self.task.reports;
        let max_items = settings.max_items_per_category.to_string();
        let max_occurrences = settings.max_occurrences_per_item.to_string();

        if let Some(path) = settings.pdf.as_deref() {
            let report = doc.append_element(reports, "ReportPDF", None);
            doc.append_element(report, "ReportPath", Some(path.as_str()));
        }

        for (kind, path) in [("ReportXML", &settings.xml), ("ReportJSON", &settings.json)] {
            if let Some(path) = path.as_deref() {
                let report = doc.append_element(reports, kind, None);
                doc.append_element(report, "ReportPath", Some(path.as_str()));
                doc.append_element(report, "MaxReportedItemsPerCategory", Some(max_items.as_str()));
                doc.append_element(report, "MaxReportedOccurrencesPerItem", Some(max_occurrences.as_str()));
            }
        }

        if let Some(path) = settings.task.as_deref() {
            let task_report = doc.select_one(root, "TaskReport")?;
            replace_or_append(doc, task_report, "TaskReportPath", path.as_str())?;
        }

        Ok(())
    }
}

/// Put `<local>text</local>` under `parent`, replacing the first existing one
fn replace_or_append<D: DocumentTree>(
    doc: &mut D,
    parent: D::Node,
    local: &str,
    text: &str,
) -> Result<()> {
    let fresh = doc.create_child_element(parent, local, Some(text));
    match doc.find_child(parent, local) {
        Some(existing) => doc.replace_child(parent, fresh, existing),
        None => {
            doc.append_child(parent, fresh);
            Ok(())
        }
    }
}

/// Build the configuration for `task` and write it to `task.config_path`.
///
/// Nothing is written when the build fails, so a template missing an anchor
/// leaves no configuration behind.
pub fn write_configuration(task: &TaskDescriptor) -> Result<()> {
    let doc = ConfigurationBuilder::new(task).build()?;
    doc.write_to(&task.config_path)?;

    tracing::info!("Configuration written to {}", task.config_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreflightError;
    use crate::models::{MeasurementUnit, ReportSettings};
    use camino::Utf8PathBuf;

    fn task() -> TaskDescriptor {
        TaskDescriptor {
            input_pdf: Utf8PathBuf::from("/jobs/in/flyer.pdf"),
            output_folder: Utf8PathBuf::from("/jobs/out"),
            output_pdf_name: "flyer.pdf".to_string(),
            preflight_profile: None,
            action_lists: vec![
                Utf8PathBuf::from("/lists/first.eal"),
                Utf8PathBuf::from("/lists/second.eal"),
            ],
            variable_set: None,
            variables: Vec::new(),
            config_template: None,
            reports: ReportSettings {
                pdf: None,
                xml: Some(Utf8PathBuf::from("/jobs/out/flyer.xml")),
                json: None,
                task: None,
                max_items_per_category: 25,
                max_occurrences_per_item: 10,
            },
            measurement_unit: MeasurementUnit::Inch,
            language: "frFR".to_string(),
            executable: Utf8PathBuf::from("/opt/cli"),
            config_path: Utf8PathBuf::from("/jobs/out/config.xml"),
            variable_set_output: Utf8PathBuf::from("/jobs/out/variableset.evs"),
        }
    }

    fn texts(doc: &XmlDocument, path: &str) -> Vec<String> {
        doc.select(doc.root(), path)
            .into_iter()
            .map(|n| doc.text(n))
            .collect()
    }

    #[test]
    fn test_blank_document_has_namespace() {
        let doc = XmlDocument::parse(BLANK_CONFIGURATION).unwrap();
        assert_eq!(doc.attribute(doc.root(), "xmlns:cf"), Some(CONFIGURATION_NAMESPACE));
    }

    #[test]
    fn test_paths_unit_and_language() {
        let doc = ConfigurationBuilder::new(&task()).build().unwrap();

        assert_eq!(texts(&doc, "Process/InputPath"), vec!["/jobs/in/flyer.pdf"]);
        assert_eq!(texts(&doc, "Process/OutputPath"), vec!["/jobs/out/flyer.pdf"]);
        assert_eq!(texts(&doc, "Process/MeasurementUnit"), vec!["Inch"]);
        assert_eq!(texts(&doc, "Process/Language"), vec!["frFR"]);
    }

    #[test]
    fn test_action_lists_keep_order() {
        let doc = ConfigurationBuilder::new(&task()).build().unwrap();

        assert_eq!(
            texts(&doc, "Process/Mutators/ActionList"),
            vec!["/lists/first.eal", "/lists/second.eal"]
        );
        assert!(texts(&doc, "Process/Mutators/PreflightProfile").is_empty());
    }

    #[test]
    fn test_xml_report_carries_caps() {
        let doc = ConfigurationBuilder::new(&task()).build().unwrap();

        assert_eq!(texts(&doc, "Process/Reports/ReportXML/ReportPath"), vec!["/jobs/out/flyer.xml"]);
        assert_eq!(
            texts(&doc, "Process/Reports/ReportXML/MaxReportedItemsPerCategory"),
            vec!["25"]
        );
        assert_eq!(
            texts(&doc, "Process/Reports/ReportXML/MaxReportedOccurrencesPerItem"),
            vec!["10"]
        );
        assert!(texts(&doc, "Process/Reports/ReportPDF").is_empty());
        assert!(texts(&doc, "Process/Reports/ReportJSON").is_empty());
    }

    #[test]
    fn test_task_report_and_variable_set() {
        let mut task = task();
        task.reports.task = Some(Utf8PathBuf::from("/jobs/out/taskreport.xml"));
        task.variable_set = Some(Utf8PathBuf::from("/jobs/out/variableset.evs"));

        let doc = ConfigurationBuilder::new(&task).build().unwrap();

        assert_eq!(texts(&doc, "TaskReport/TaskReportPath"), vec!["/jobs/out/taskreport.xml"]);
        assert_eq!(texts(&doc, "Process/VariableSet"), vec!["/jobs/out/variableset.evs"]);
    }

    #[test]
    fn test_existing_variable_set_is_replaced() {
        let template = BLANK_CONFIGURATION.replace(
            "<cf:Language/>",
            "<cf:Language/>\n    <cf:VariableSet>/old/set.evs</cf:VariableSet>",
        );
        let mut doc = XmlDocument::parse(&template).unwrap();
        let mut task = task();
        task.variable_set = Some(Utf8PathBuf::from("/new/set.evs"));

        ConfigurationBuilder::new(&task).inject(&mut doc).unwrap();

        assert_eq!(texts(&doc, "Process/VariableSet"), vec!["/new/set.evs"]);
    }

    #[test]
    fn test_missing_anchor_is_structural() {
        let template = BLANK_CONFIGURATION.replace("<cf:Mutators/>", "");
        let mut doc = XmlDocument::parse(&template).unwrap();

        let err = ConfigurationBuilder::new(&task()).inject(&mut doc).unwrap_err();
        assert!(matches!(err, PreflightError::Structural(_)));
    }

    #[test]
    fn test_serialized_output_is_prefixed() {
        let xml = ConfigurationBuilder::new(&task())
            .build()
            .unwrap()
            .to_xml_string()
            .unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<cf:ActionList>/lists/first.eal</cf:ActionList>"));
        assert!(xml.contains("<cf:MeasurementUnit>Inch</cf:MeasurementUnit>"));
    }
}
