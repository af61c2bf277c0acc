//! RunSettings Template Engine
//!
//! The built-in template is assembled with the element tree rather than
//! string concatenation; custom templates stay user-editable text. Both are
//! filled by literal placeholder substitution and then re-formatted
//! canonically, so repeated generation for the same inputs is byte-stable.
//!
//! Documents produced here carry an `<FCCGenerated/>` element inside the
//! alternate collector's `Configuration`. Detection is a structural lookup,
//! never a substring search.

use tracing::debug;

use fine_coverage_core::{CoreError, CoreResult};

use crate::replacements::ReplacementSet;
use crate::xml::{XmlElement, XmlNode};

/// Friendly name of the alternate (built-in) coverage data collector.
pub const ALTERNATE_COLLECTOR_FRIENDLY_NAME: &str = "Code Coverage";

/// Uri of the alternate coverage data collector.
pub const ALTERNATE_COLLECTOR_URI: &str = "datacollector://Microsoft/CodeCoverage/2.0";

/// Element marking documents this engine generated.
pub const GENERATED_MARKER: &str = "FCCGenerated";

/// Literal placeholder tokens recognised in templates.
pub mod placeholders {
    pub const ENABLED: &str = "%fcc_enabled%";
    pub const RESULTS_DIRECTORY: &str = "%fcc_resultsdirectory%";
    pub const TEST_ADAPTER: &str = "%fcc_testadapter%";
    pub const MODULE_PATHS_EXCLUDE: &str = "%fcc_modulepaths_exclude%";
    pub const MODULE_PATHS_INCLUDE: &str = "%fcc_modulepaths_include%";
    pub const FUNCTIONS_EXCLUDE: &str = "%fcc_functions_exclude%";
    pub const FUNCTIONS_INCLUDE: &str = "%fcc_functions_include%";
    pub const ATTRIBUTES_EXCLUDE: &str = "%fcc_attributes_exclude%";
    pub const ATTRIBUTES_INCLUDE: &str = "%fcc_attributes_include%";
    pub const SOURCES_EXCLUDE: &str = "%fcc_sources_exclude%";
    pub const SOURCES_INCLUDE: &str = "%fcc_sources_include%";
    pub const COMPANY_NAMES_EXCLUDE: &str = "%fcc_companynames_exclude%";
    pub const COMPANY_NAMES_INCLUDE: &str = "%fcc_companynames_include%";
    pub const PUBLIC_KEY_TOKENS_EXCLUDE: &str = "%fcc_publickeytokens_exclude%";
    pub const PUBLIC_KEY_TOKENS_INCLUDE: &str = "%fcc_publickeytokens_include%";

    pub const ALL: [&str; 15] = [
        ENABLED,
        RESULTS_DIRECTORY,
        TEST_ADAPTER,
        MODULE_PATHS_EXCLUDE,
        MODULE_PATHS_INCLUDE,
        FUNCTIONS_EXCLUDE,
        FUNCTIONS_INCLUDE,
        ATTRIBUTES_EXCLUDE,
        ATTRIBUTES_INCLUDE,
        SOURCES_EXCLUDE,
        SOURCES_INCLUDE,
        COMPANY_NAMES_EXCLUDE,
        COMPANY_NAMES_INCLUDE,
        PUBLIC_KEY_TOKENS_EXCLUDE,
        PUBLIC_KEY_TOKENS_INCLUDE,
    ];

    /// Prefix shared by every token
    pub const PREFIX: &str = "%fcc_";
}

/// Filter categories of the `CodeCoverage` section: element name plus its
/// exclude and include tokens.
const FILTER_SECTIONS: [(&str, &str, &str); 6] = [
    ("ModulePaths", placeholders::MODULE_PATHS_EXCLUDE, placeholders::MODULE_PATHS_INCLUDE),
    ("Functions", placeholders::FUNCTIONS_EXCLUDE, placeholders::FUNCTIONS_INCLUDE),
    ("Attributes", placeholders::ATTRIBUTES_EXCLUDE, placeholders::ATTRIBUTES_INCLUDE),
    ("Sources", placeholders::SOURCES_EXCLUDE, placeholders::SOURCES_INCLUDE),
    ("CompanyNames", placeholders::COMPANY_NAMES_EXCLUDE, placeholders::COMPANY_NAMES_INCLUDE),
    ("PublicKeyTokens", placeholders::PUBLIC_KEY_TOKENS_EXCLUDE, placeholders::PUBLIC_KEY_TOKENS_INCLUDE),
];

/// Output of [`RunSettingsTemplate::replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateReplaceResult {
    pub replaced: String,
    /// The template's test adapter paths pointed at the alternate collector,
    /// so the compatibility shim must sit beside the test binary
    pub replaced_test_adapter: bool,
}

/// The built-in runsettings template and the operations over templates.
#[derive(Debug, Clone)]
pub struct RunSettingsTemplate {
    template: String,
}

impl RunSettingsTemplate {
    /// Build the built-in template.
    pub fn new() -> CoreResult<Self> {
        let root = XmlElement::new("RunSettings")
            .with_child(run_configuration_element())
            .with_child(
                XmlElement::new("DataCollectionRunSettings")
                    .with_child(XmlElement::new("DataCollectors").with_child(alternate_collector_element())),
            );
        Ok(Self {
            template: root.to_document_string()?,
        })
    }

    /// Built-in template text, placeholders unreplaced.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether `token` is one of the recognised placeholders.
    pub fn recognizes(token: &str) -> bool {
        placeholders::ALL.contains(&token)
    }

    /// Adapt a user-authored template so downstream injection works.
    ///
    /// Missing run configuration entries, the alternate collector, its
    /// `Configuration`, `Format` and the generated marker are added; every
    /// existing user element and value is kept.
    pub fn configure_custom(&self, custom_template: &str) -> CoreResult<String> {
        let mut root = XmlElement::parse(custom_template)
            .map_err(|e| CoreError::template(format!("Custom template is not valid XML: {}", e)))?;
        ensure_injection_structure(&mut root)?;
        root.to_document_string()
    }

    /// Substitute every recognised placeholder in `template`.
    ///
    /// Pure text substitution; unknown tokens are left untouched.
    pub fn replace(&self, template: &str, replacements: &ReplacementSet) -> TemplateReplaceResult {
        let replaced_test_adapter = template_replaces_test_adapter(template);
        let mut replaced = template.to_string();
        for (token, value) in replacements.bindings() {
            replaced = replaced.replace(token, &value);
        }
        TemplateReplaceResult {
            replaced,
            replaced_test_adapter,
        }
    }

    /// Replace, then drop empty filter lists and format canonically.
    pub fn generate(&self, template: &str, replacements: &ReplacementSet) -> CoreResult<TemplateReplaceResult> {
        let result = self.replace(template, replacements);
        let mut root = XmlElement::parse(&result.replaced)
            .map_err(|e| CoreError::template(format!("Replaced template is not valid XML: {}", e)))?;
        prune_empty_filters(&mut root);
        Ok(TemplateReplaceResult {
            replaced: root.to_document_string()?,
            replaced_test_adapter: result.replaced_test_adapter,
        })
    }

    /// Inject collection settings into a user document handed over by the host.
    pub fn add_fcc_run_settings(&self, document: &str, replacements: &ReplacementSet) -> CoreResult<String> {
        let configured = self.configure_custom(document)?;
        Ok(self.generate(&configured, replacements)?.replaced)
    }

    /// Whether this engine produced `document`.
    pub fn fcc_generated(document: &str) -> bool {
        match XmlElement::parse(document) {
            Ok(root) => Self::fcc_generated_element(&root),
            Err(e) => {
                debug!("[RunSettings] Document is not parseable, treating as not generated: {}", e);
                false
            }
        }
    }

    /// Structural form of [`RunSettingsTemplate::fcc_generated`].
    pub fn fcc_generated_element(root: &XmlElement) -> bool {
        data_collectors(root)
            .filter(|c| is_alternate_collector(c))
            .any(|c| {
                c.child("Configuration")
                    .map(|cfg| cfg.has_child(GENERATED_MARKER))
                    .unwrap_or(false)
            })
    }
}

// ============================================================================
// Structure helpers shared with the analyser
// ============================================================================

/// All `DataCollector` elements under `DataCollectionRunSettings/DataCollectors`.
pub fn data_collectors(root: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    root.descendant(&["DataCollectionRunSettings", "DataCollectors"])
        .into_iter()
        .flat_map(|collectors| collectors.elements())
        .filter(|e| e.name == "DataCollector")
}

/// Whether a `DataCollector` element is the alternate collector.
pub fn is_alternate_collector(collector: &XmlElement) -> bool {
    let by_name = collector
        .attribute("friendlyName")
        .map(|n| n.trim().eq_ignore_ascii_case(ALTERNATE_COLLECTOR_FRIENDLY_NAME))
        .unwrap_or(false);
    let by_uri = collector
        .attribute("uri")
        .map(|u| u.trim().eq_ignore_ascii_case(ALTERNATE_COLLECTOR_URI))
        .unwrap_or(false);
    by_name || by_uri
}

/// Whether a `DataCollector` element is enabled. A placeholder counts as enabled.
pub fn is_collector_enabled(collector: &XmlElement) -> bool {
    collector
        .attribute("enabled")
        .map(|v| !v.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

/// `RunConfiguration/TestAdaptersPaths` text, if present.
pub fn test_adapters_paths(root: &XmlElement) -> Option<String> {
    root.descendant(&["RunConfiguration", "TestAdaptersPaths"])
        .map(|e| e.text())
}

fn template_replaces_test_adapter(template: &str) -> bool {
    XmlElement::parse(template)
        .ok()
        .and_then(|root| test_adapters_paths(&root))
        .map(|paths| paths.contains(placeholders::TEST_ADAPTER))
        .unwrap_or(false)
}

fn run_configuration_element() -> XmlElement {
    XmlElement::new("RunConfiguration")
        .with_child(XmlElement::new("ResultsDirectory").with_text(placeholders::RESULTS_DIRECTORY))
        .with_child(XmlElement::new("TestAdaptersPaths").with_text(placeholders::TEST_ADAPTER))
        .with_child(XmlElement::new("CollectSourceInformation").with_text("False"))
}

fn code_coverage_element() -> XmlElement {
    let mut code_coverage = XmlElement::new("CodeCoverage");
    for (section, exclude, include) in FILTER_SECTIONS {
        code_coverage = code_coverage.with_child(
            XmlElement::new(section)
                .with_child(XmlElement::new("Exclude").with_text(exclude))
                .with_child(XmlElement::new("Include").with_text(include)),
        );
    }
    code_coverage
        .with_child(XmlElement::new("EnableStaticNativeInstrumentation").with_text("False"))
        .with_child(XmlElement::new("EnableDynamicNativeInstrumentation").with_text("False"))
}

fn alternate_collector_element() -> XmlElement {
    XmlElement::new("DataCollector")
        .with_attribute("friendlyName", ALTERNATE_COLLECTOR_FRIENDLY_NAME)
        .with_attribute("enabled", placeholders::ENABLED)
        .with_child(
            XmlElement::new("Configuration")
                .with_child(XmlElement::new("Format").with_text("Cobertura"))
                .with_child(XmlElement::new(GENERATED_MARKER))
                .with_child(code_coverage_element()),
        )
}

fn ensure_injection_structure(root: &mut XmlElement) -> CoreResult<()> {
    if root.name != "RunSettings" {
        return Err(CoreError::template(format!(
            "Expected RunSettings root element, found <{}>",
            root.name
        )));
    }

    let run_configuration = root.get_or_create_child("RunConfiguration");
    if !run_configuration.has_child("ResultsDirectory") {
        run_configuration
            .get_or_create_child("ResultsDirectory")
            .set_text(placeholders::RESULTS_DIRECTORY);
    }
    if !run_configuration.has_child("TestAdaptersPaths") {
        run_configuration
            .get_or_create_child("TestAdaptersPaths")
            .set_text(placeholders::TEST_ADAPTER);
    }

    let collectors = root
        .get_or_create_child("DataCollectionRunSettings")
        .get_or_create_child("DataCollectors");
    let existing = collectors
        .elements_mut()
        .find(|c| c.name == "DataCollector" && is_alternate_collector(c));
    match existing {
        Some(collector) => {
            let configuration = collector.get_or_create_child("Configuration");
            if !configuration.has_child("Format") {
                configuration.get_or_create_child("Format").set_text("Cobertura");
            }
            if !configuration.has_child("CodeCoverage") {
                configuration
                    .children
                    .push(XmlNode::Element(code_coverage_element()));
            }
            configuration.get_or_create_child(GENERATED_MARKER);
        }
        None => {
            collectors
                .children
                .push(XmlNode::Element(alternate_collector_element()));
        }
    }
    Ok(())
}

/// Remove `Include`/`Exclude` lists left empty after substitution, and
/// filter sections left with neither.
fn prune_empty_filters(root: &mut XmlElement) {
    let Some(collectors) = root
        .child_mut("DataCollectionRunSettings")
        .and_then(|e| e.child_mut("DataCollectors"))
    else {
        return;
    };
    for collector in collectors.elements_mut().filter(|c| c.name == "DataCollector") {
        let Some(code_coverage) = collector
            .child_mut("Configuration")
            .and_then(|cfg| cfg.child_mut("CodeCoverage"))
        else {
            continue;
        };
        for (section, _, _) in FILTER_SECTIONS {
            if let Some(element) = code_coverage.child_mut(section) {
                element.children.retain(|node| match node {
                    XmlNode::Element(e) if e.name == "Include" || e.name == "Exclude" => {
                        !e.children.is_empty()
                    }
                    _ => true,
                });
            }
        }
        code_coverage.children.retain(|node| match node {
            XmlNode::Element(e) if FILTER_SECTIONS.iter().any(|(s, _, _)| *s == e.name) => {
                !e.children.is_empty()
            }
            _ => true,
        });
    }
}
