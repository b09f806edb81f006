//! Module kind catalog
//!
//! The set of module kinds is closed. Each kind describes itself with a
//! `ModuleDescriptor`: the port layout every instance is created with, and
//! the named configuration/result keys its execution logic reads and
//! writes. The engine never interprets those keys; they let the module's
//! own logic (and the UI forms) type-check against a declared shape.
//!
//! # Example
//!
//! ```ignore
//! use flow_engine::catalog::ModuleKind;
//!
//! let descriptor = ModuleKind::LogoGenerator.descriptor();
//! assert_eq!(descriptor.outputs[0].id, "logo");
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{DataType, ModulePorts, Port};

/// Every kind of module a space can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// Scans a project directory and summarizes it
    ProjectAnalyzer,
    /// Proposes product names from an analysis
    NameGenerator,
    /// Renders a logo from a brief
    LogoGenerator,
    /// Writes store-listing metadata
    MetadataGenerator,
    /// Captures screenshots through a browser-automation daemon
    ScreenshotCapturer,
    /// Produces a promotional video
    VideoGenerator,
    /// Collects heterogeneous assets into one bundle
    AssetBundler,
    /// Submits a listing to a store
    StorePublisher,
}

/// Category of a module kind, for palette grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleCategory {
    /// Reads the outside world (filesystem, browser)
    Source,
    /// Calls a text or image provider
    Generation,
    /// Combines or ships results
    Output,
}

/// Complete description of a module kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub kind: ModuleKind,
    pub category: ModuleCategory,
    /// Default display name for new instances
    pub label: String,
    pub description: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    /// Configuration keys the module reads from `Module::inputs`
    pub config_keys: Vec<String>,
    /// Result keys the module writes to `Module::outputs`
    pub result_keys: Vec<String>,
}

impl ModuleDescriptor {
    /// Fresh, unconnected port layout for a new instance
    pub fn ports(&self) -> ModulePorts {
        ModulePorts {
            input: self.inputs.clone(),
            output: self.outputs.clone(),
        }
    }
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl ModuleKind {
    /// Every module kind, in palette order
    pub const ALL: [ModuleKind; 8] = [
        ModuleKind::ProjectAnalyzer,
        ModuleKind::NameGenerator,
        ModuleKind::LogoGenerator,
        ModuleKind::MetadataGenerator,
        ModuleKind::ScreenshotCapturer,
        ModuleKind::VideoGenerator,
        ModuleKind::AssetBundler,
        ModuleKind::StorePublisher,
    ];

    /// Get the static description of this kind
    pub fn descriptor(&self) -> ModuleDescriptor {
        use DataType::*;

        let (category, label, description, inputs, outputs, config_keys, result_keys) = match self {
            ModuleKind::ProjectAnalyzer => (
                ModuleCategory::Source,
                "Project Analyzer",
                "Scans a project directory and summarizes its purpose and stack",
                vec![],
                vec![Port::output("analysis", "Analysis", Json)],
                keys(&["projectPath", "ignorePatterns"]),
                keys(&["analysis"]),
            ),
            ModuleKind::NameGenerator => (
                ModuleCategory::Generation,
                "Name Generator",
                "Proposes product names from a project analysis",
                vec![Port::input("analysis", "Analysis", &[Json])],
                vec![Port::output("names", "Names", Json)],
                keys(&["count", "tone"]),
                keys(&["names"]),
            ),
            ModuleKind::LogoGenerator => (
                ModuleCategory::Generation,
                "Logo Generator",
                "Renders a logo image from a textual or structured brief",
                vec![Port::input("brief", "Brief", &[Json, Text])],
                vec![Port::output("logo", "Logo", Image)],
                keys(&["style", "size"]),
                keys(&["logo"]),
            ),
            ModuleKind::MetadataGenerator => (
                ModuleCategory::Generation,
                "Metadata Generator",
                "Writes listing metadata (title, description, keywords)",
                vec![Port::input("source", "Source", &[Json, Text])],
                vec![Port::output("metadata", "Metadata", Json)],
                keys(&["language", "maxKeywords"]),
                keys(&["metadata"]),
            ),
            ModuleKind::ScreenshotCapturer => (
                ModuleCategory::Source,
                "Screenshot Capturer",
                "Captures screenshots of a running app through browser automation",
                vec![Port::input("metadata", "Metadata", &[Json])],
                vec![Port::output("screenshots", "Screenshots", Image)],
                keys(&["url", "viewports"]),
                keys(&["screenshots"]),
            ),
            ModuleKind::VideoGenerator => (
                ModuleCategory::Generation,
                "Video Generator",
                "Produces a promotional video from a script and images",
                vec![
                    Port::input("script", "Script", &[Text, Json]),
                    Port::input("images", "Images", &[Image]),
                ],
                vec![Port::output("video", "Video", Video)],
                keys(&["durationSeconds", "voice"]),
                keys(&["video"]),
            ),
            ModuleKind::AssetBundler => (
                ModuleCategory::Output,
                "Asset Bundler",
                "Collects assets of any type into one bundle",
                vec![Port::input("assets", "Assets", &DataType::ALL)],
                vec![Port::output("bundle", "Bundle", Mixed)],
                keys(&["bundleName"]),
                keys(&["bundle"]),
            ),
            ModuleKind::StorePublisher => (
                ModuleCategory::Output,
                "Store Publisher",
                "Submits a listing bundle to an app store",
                vec![Port::input("listing", "Listing", &[Json, Mixed])],
                vec![Port::output("report", "Report", Text)],
                keys(&["store", "dryRun"]),
                keys(&["report"]),
            ),
        };

        ModuleDescriptor {
            kind: *self,
            category,
            label: label.to_string(),
            description: description.to_string(),
            inputs,
            outputs,
            config_keys,
            result_keys,
        }
    }
}

/// Descriptors of every kind, in palette order
pub fn all_descriptors() -> Vec<ModuleDescriptor> {
    ModuleKind::ALL.iter().map(|k| k.descriptor()).collect()
}

/// Descriptors grouped by category
pub fn descriptors_by_category() -> HashMap<ModuleCategory, Vec<ModuleDescriptor>> {
    let mut grouped: HashMap<ModuleCategory, Vec<ModuleDescriptor>> = HashMap::new();
    for descriptor in all_descriptors() {
        grouped.entry(descriptor.category).or_default().push(descriptor);
    }
    grouped
}
