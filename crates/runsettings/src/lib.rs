//! Fine Coverage RunSettings
//!
//! Everything needed to decide whether a run can use the alternate coverage
//! collector and to produce the runsettings it needs:
//!
//! - `xml` - Owned element tree with a canonical formatter
//! - `template` - Built-in template, custom template adaptation, placeholder replacement, generated marker
//! - `custom` - Custom template discovery (project, then solution)
//! - `replacements` - Placeholder bindings per project and merged across test containers
//! - `analyser` - Suitability analysis of user runsettings
//! - `generator` - Per-project generation, writing and removal

pub mod analyser;
pub mod custom;
pub mod generator;
pub mod replacements;
pub mod template;
pub mod xml;

pub use analyser::{analyse, AnalysisResult, Compatibility};
pub use custom::{CustomTemplateDetails, CustomTemplateProvider, FileCustomTemplateProvider, CUSTOM_TEMPLATE_FILE_NAME};
pub use generator::{ProjectRunSettings, ProjectRunSettingsGenerator};
pub use replacements::{IncludeExclude, ReplacementSet};
pub use template::{placeholders, RunSettingsTemplate, TemplateReplaceResult, GENERATED_MARKER};
pub use xml::{canonicalize, XmlElement, XmlNode};
