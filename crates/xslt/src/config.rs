//! Run configuration: recovery policy, output properties and caller options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// What to do with a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Take the documented default and say nothing.
    Silent,
    /// Take the documented default and record a diagnostic.
    #[default]
    Warn,
    /// Abort the run.
    Strict,
}

impl FromStr for RecoveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silent" => Ok(RecoveryPolicy::Silent),
            "warn" => Ok(RecoveryPolicy::Warn),
            "strict" => Ok(RecoveryPolicy::Strict),
            other => Err(format!("unknown recovery policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMethod {
    Xml,
    Html,
    Text,
}

impl FromStr for OutputMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xml" => Ok(OutputMethod::Xml),
            "html" => Ok(OutputMethod::Html),
            "text" => Ok(OutputMethod::Text),
            other => Err(format!("unknown output method '{}'", other)),
        }
    }
}

/// Serialization knobs, from `xsl:output` or the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputProperties {
    /// `None` picks HTML when the first output element is `html` in no namespace, else XML.
    pub method: Option<OutputMethod>,
    pub indent: bool,
    pub encoding: String,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
    pub omit_xml_declaration: bool,
    pub media_type: Option<String>,
}

impl Default for OutputProperties {
    fn default() -> Self {
        Self {
            method: None,
            indent: false,
            encoding: "UTF-8".to_string(),
            doctype_public: None,
            doctype_system: None,
            omit_xml_declaration: false,
            media_type: None,
        }
    }
}

/// Everything a caller can set before a run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub recovery: RecoveryPolicy,
    /// Global parameter values, by name (`local` or `{uri}local`).
    pub parameters: BTreeMap<String, String>,
    pub initial_mode: Option<String>,
    /// Overrides applied on top of the stylesheet's `xsl:output`.
    pub output: Option<OutputProperties>,
    /// How deeply templates may nest before the run fails.
    pub max_depth: Option<usize>,
}

impl TransformOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Adds parameters on top of the existing ones; later values win.
    pub fn merge_parameters<I>(&mut self, parameters: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.parameters.extend(parameters);
    }
}
