//! Integration tests for the document builders and the process invoker
//!
//! These tests verify:
//! - Configuration documents built from the blank instance and from templates
//! - Template comments and text carried through unchanged
//! - Variable sets built fresh and updated in place
//! - Length conversion to points
//! - Launch failures surfacing as results rather than errors

use camino::{Utf8Path, Utf8PathBuf};
use pitstop_runner::models::length_in_points;
use pitstop_runner::services::discovery::PlatformLocator;
use pitstop_runner::services::{
    ConfigurationBuilder, ProcessInvoker, build_variable_set, update_variable_set_file,
    write_configuration, write_variable_set,
};
use pitstop_runner::xml::{DocumentTree, XmlDocument};
use pitstop_runner::{
    MeasurementUnit, PreflightError, TaskDescriptor, TaskOptions, VariableEntry, VariableType,
    VariableValue,
};
use std::fs;
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("catalog.pdf"), b"%PDF-1.4").unwrap();
        fs::write(root.join("print.ppp"), b"profile").unwrap();
        fs::write(root.join("fix.eal"), b"action list").unwrap();
        fs::write(root.join("PitStopServerCLI"), b"").unwrap();
        fs::create_dir(root.join("out")).unwrap();
        Self { _dir: dir, root }
    }

    fn options(&self) -> TaskOptions {
        TaskOptions {
            input_pdf: Some(self.root.join("catalog.pdf")),
            output_folder: Some(self.root.join("out")),
            preflight_profile: Some(self.root.join("print.ppp")),
            application_path: Some(self.root.join("PitStopServerCLI")),
            ..TaskOptions::default()
        }
    }

    fn task(&self, options: TaskOptions) -> TaskDescriptor {
        TaskDescriptor::from_options(options, &PlatformLocator).unwrap()
    }
}

fn texts(doc: &XmlDocument, path: &str) -> Vec<String> {
    doc.select(doc.root(), path)
        .into_iter()
        .map(|node| doc.text(node))
        .collect()
}

#[test]
fn test_blank_configuration_with_profile() {
    let ws = Workspace::new();
    let task = ws.task(ws.options());

    write_configuration(&task).unwrap();

    let path = ws.root.join("out").join("config.xml");
    assert_eq!(task.config_path, path);
    let doc = XmlDocument::from_file(&path).unwrap();

    assert_eq!(texts(&doc, "Process/InputPath"), vec![ws.root.join("catalog.pdf").to_string()]);
    assert_eq!(
        texts(&doc, "Process/OutputPath"),
        vec![ws.root.join("out").join("catalog.pdf").to_string()]
    );
    assert_eq!(
        texts(&doc, "Process/Mutators/PreflightProfile"),
        vec![ws.root.join("print.ppp").to_string()]
    );
    assert!(texts(&doc, "Process/Mutators/ActionList").is_empty());
    assert!(doc.select(doc.root(), "Process/Reports/*").is_empty());
    assert_eq!(texts(&doc, "Process/MeasurementUnit"), vec!["Millimeter"]);
    assert_eq!(texts(&doc, "Process/Language"), vec!["enUS"]);
}

#[test]
fn test_action_lists_keep_their_order() {
    let ws = Workspace::new();
    fs::write(ws.root.join("second.eal"), b"action list").unwrap();

    let mut options = ws.options();
    options.preflight_profile = None;
    options.action_lists = vec![ws.root.join("fix.eal"), ws.root.join("second.eal")];

    let doc = ConfigurationBuilder::new(&ws.task(options)).build().unwrap();

    assert_eq!(
        texts(&doc, "Process/Mutators/ActionList"),
        vec![
            ws.root.join("fix.eal").to_string(),
            ws.root.join("second.eal").to_string()
        ]
    );
}

#[test]
fn test_reports_carry_paths_and_caps() {
    let ws = Workspace::new();
    let mut options = ws.options();
    options.xml_report = true;
    options.json_report = true;
    options.task_report = true;
    options.json_report_name = Some("findings.json".to_string());
    options.max_items_per_category = Some(5);

    let doc = ConfigurationBuilder::new(&ws.task(options)).build().unwrap();

    assert_eq!(
        texts(&doc, "Process/Reports/ReportXML/ReportPath"),
        vec![ws.root.join("out").join("catalog.xml").to_string()]
    );
    assert_eq!(
        texts(&doc, "Process/Reports/ReportJSON/ReportPath"),
        vec![ws.root.join("out").join("findings.json").to_string()]
    );
    assert_eq!(
        texts(&doc, "Process/Reports/ReportXML/MaxReportedItemsPerCategory"),
        vec!["5"]
    );
    assert_eq!(
        texts(&doc, "Process/Reports/ReportJSON/MaxReportedOccurrencesPerItem"),
        vec!["100"]
    );
    assert!(doc.select(doc.root(), "Process/Reports/ReportPDF").is_empty());
    assert_eq!(
        texts(&doc, "TaskReport/TaskReportPath"),
        vec![ws.root.join("out").join("taskreport.xml").to_string()]
    );
}

#[test]
fn test_custom_template_keeps_its_content() {
    let ws = Workspace::new();
    let template = ws.root.join("template.xml");
    fs::write(
        &template,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cf:Configuration xmlns:cf="http://www.enfocus.com/2011/PitStopServerCLI_Configuration.xsd">
  <cf:Versioning><cf:Version>7</cf:Version></cf:Versioning>
  <cf:TaskReport><cf:LogProcessResults>true</cf:LogProcessResults></cf:TaskReport>
  <cf:Process>
    <cf:InputPath/>
    <cf:OutputPath/>
    <cf:Mutators/>
    <cf:Reports/>
    <cf:MeasurementUnit/>
    <cf:Language/>
    <cf:CustomSetting>keep me</cf:CustomSetting>
  </cf:Process>
</cf:Configuration>
"#,
    )
    .unwrap();

    let mut options = ws.options();
    options.config_file = Some(template.clone());
    options.measurement_unit = Some(MeasurementUnit::Inch);
    let task = ws.task(options);

    write_configuration(&task).unwrap();

    let written = fs::read_to_string(&task.config_path).unwrap();
    assert!(written.contains("<cf:PreflightProfile>"));
    assert!(written.contains("<cf:CustomSetting>keep me</cf:CustomSetting>"));

    let doc = XmlDocument::parse(&written).unwrap();
    assert_eq!(texts(&doc, "Versioning/Version"), vec!["7"]);
    assert_eq!(texts(&doc, "TaskReport/LogProcessResults"), vec!["true"]);
    assert_eq!(texts(&doc, "Process/MeasurementUnit"), vec!["Inch"]);

    // template itself is untouched
    assert!(!fs::read_to_string(&template).unwrap().contains("PreflightProfile"));
}

#[test]
fn test_template_without_anchor_is_structural_error() {
    let ws = Workspace::new();
    let template = ws.root.join("broken.xml");
    fs::write(
        &template,
        "<Configuration><Process><InputPath/><OutputPath/></Process></Configuration>",
    )
    .unwrap();

    let mut options = ws.options();
    options.config_file = Some(template);
    let task = ws.task(options);

    let err = ConfigurationBuilder::new(&task).build().unwrap_err();
    assert!(matches!(err, PreflightError::Structural(_)));

    let err = write_configuration(&task).unwrap_err();
    assert!(matches!(err, PreflightError::Structural(_)));
    assert!(!task.config_path.exists());
}

#[test]
fn test_template_comments_and_padded_text_survive() {
    let ws = Workspace::new();
    let template = ws.root.join("annotated.xml");
    fs::write(
        &template,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- prepress defaults -->
<cf:Configuration xmlns:cf="http://www.enfocus.com/2011/PitStopServerCLI_Configuration.xsd">
  <cf:TaskReport/>
  <cf:Process>
    <!-- anchors below are filled per job -->
    <cf:InputPath/>
    <cf:OutputPath/>
    <cf:Mutators/>
    <cf:Reports/>
    <cf:MeasurementUnit/>
    <cf:Language/>
    <cf:Remark>  padded value  </cf:Remark>
    <?vendor-hint keep?>
  </cf:Process>
</cf:Configuration>
"#,
    )
    .unwrap();

    let mut options = ws.options();
    options.config_file = Some(template);
    let task = ws.task(options);

    write_configuration(&task).unwrap();

    let written = fs::read_to_string(&task.config_path).unwrap();
    assert!(written.contains("<!-- prepress defaults -->"));
    assert!(written.contains("<!-- anchors below are filled per job -->"));
    assert!(written.contains("<?vendor-hint keep?>"));
    assert!(written.contains("<cf:Remark>  padded value  </cf:Remark>"));

    let doc = XmlDocument::parse(&written).unwrap();
    assert_eq!(texts(&doc, "Process/Remark"), vec!["  padded value  "]);
    assert_eq!(
        texts(&doc, "Process/Mutators/PreflightProfile"),
        vec![ws.root.join("print.ppp").to_string()]
    );
}

#[test]
fn test_variable_set_comments_and_padded_values_survive_update() {
    let ws = Workspace::new();
    let path = ws.root.join("annotated.evs");
    write_variable_set(
        &path,
        &[
            VariableEntry::new("Bleed", VariableType::Length, 3.0),
            VariableEntry::new("Slogan", VariableType::String, "  padded value  "),
        ],
        MeasurementUnit::Point,
    )
    .unwrap();
    let annotated = fs::read_to_string(&path)
        .unwrap()
        .replacen("<vs:Variables>", "<!-- vendor note -->\n  <vs:Variables>", 1);
    fs::write(&path, annotated).unwrap();

    update_variable_set_file(
        &path,
        &[VariableEntry::new("Bleed", VariableType::Length, 1.0)],
        MeasurementUnit::Inch,
    )
    .unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("<!-- vendor note -->"));

    let doc = XmlDocument::parse(&written).unwrap();
    assert_eq!(
        texts(&doc, "Operators/Operator/OperatorData/Value"),
        vec!["72", "  padded value  "]
    );
}

#[test]
fn test_length_conversions() {
    let close = |a: f64, b: f64| (a - b).abs() < 1e-9;

    assert!(close(
        length_in_points(&VariableValue::from(10.0), MeasurementUnit::Millimeter),
        10.0 / 25.4 * 72.0
    ));
    assert!(close(
        length_in_points(&VariableValue::from(1.0), MeasurementUnit::Inch),
        72.0
    ));
    assert!(close(
        length_in_points(&VariableValue::from(2.54), MeasurementUnit::Centimeter),
        72.0
    ));
    assert_eq!(
        length_in_points(&VariableValue::from("wide"), MeasurementUnit::Millimeter),
        0.0
    );
    assert_eq!(
        length_in_points(&VariableValue::from(true), MeasurementUnit::Inch),
        0.0
    );
}

#[test]
fn test_build_then_update_variable_set() {
    let ws = Workspace::new();
    let path = ws.root.join("set.evs");

    let initial = vec![
        VariableEntry::new("Bleed", VariableType::Length, 3.0),
        VariableEntry::new("Customer", VariableType::String, "ACME"),
        VariableEntry::new("Proof", VariableType::Boolean, false),
    ];
    write_variable_set(&path, &initial, MeasurementUnit::Point).unwrap();

    let updates = vec![
        VariableEntry::new("Bleed", VariableType::Length, 1.0),
        VariableEntry::new("Customer", VariableType::String, "Globex"),
        VariableEntry::new("Proof", VariableType::Boolean, true),
    ];
    update_variable_set_file(&path, &updates, MeasurementUnit::Inch).unwrap();

    let doc = XmlDocument::from_file(&path).unwrap();
    assert_eq!(
        texts(&doc, "Operators/Operator/OperatorData/Value"),
        vec!["72", "Globex", "true"]
    );
    assert_eq!(texts(&doc, "Operators/Operator/GUID"), vec!["1", "2", "3"]);
    assert_eq!(texts(&doc, "Variables/Variable/DefaultUnit"), vec!["pt"]);
}

#[test]
fn test_update_of_missing_variable_leaves_file_untouched() {
    let ws = Workspace::new();
    let path = ws.root.join("set.evs");
    write_variable_set(
        &path,
        &[VariableEntry::new("Bleed", VariableType::Length, 3.0)],
        MeasurementUnit::Millimeter,
    )
    .unwrap();
    let before = fs::read(&path).unwrap();

    let err = update_variable_set_file(
        &path,
        &[
            VariableEntry::new("Bleed", VariableType::Length, 5.0),
            VariableEntry::new("Trim", VariableType::Length, 1.0),
        ],
        MeasurementUnit::Millimeter,
    )
    .unwrap_err();

    assert!(matches!(err, PreflightError::NotFound(_)));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_fresh_variable_set_shape() {
    let doc = build_variable_set(
        &[
            VariableEntry::new("Pages", VariableType::Number, 12),
            VariableEntry::new("Trim", VariableType::Length, 25.4),
        ],
        MeasurementUnit::Millimeter,
    );

    assert_eq!(doc.name(doc.root()), Some("vs:VariableSet"));
    assert_eq!(texts(&doc, "Variables/Variable/Name"), vec!["Pages", "Trim"]);
    assert_eq!(texts(&doc, "Variables/Variable/OperatorID"), vec!["1", "2"]);
    assert_eq!(texts(&doc, "Operators/Operator/OperatorData/Value"), vec!["12", "72"]);
}

#[tokio::test]
async fn test_absent_executable_is_reported_in_result() {
    let invoker = ProcessInvoker::new();

    let (result, _) = invoker
        .execute(
            Utf8Path::new("/nonexistent/PitStopServerCLI"),
            Utf8Path::new("/nonexistent/config.xml"),
        )
        .await;

    assert_eq!(result.exit_code, -1);
    assert!(!result.stderr.is_empty());
    assert!(result.command.contains("/nonexistent/config.xml"));
}
