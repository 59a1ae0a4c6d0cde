use crate::engine::MockBehavior;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which synthesis engine backs the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EngineConfig {
    #[serde(rename = "command")]
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    #[serde(rename = "mock")]
    Mock {
        #[serde(default)]
        behavior: MockBehavior,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Command {
            program: "kokoro-synth".to_string(),
            args: ["--voice", "{voice}", "--lang", "{language}", "--speed", "{speed}"]
                .into_iter()
                .map(String::from)
                .collect(),
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive used when `KVOX_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to ~/.kvox/trace/kvox.log
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Single-character language codes mapped to the engine's language names
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, String>,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            languages: default_languages(),
            logging: LoggingSettings::default(),
        }
    }
}

pub fn default_languages() -> BTreeMap<String, String> {
    [
        ("a", "en-us"), // American English
        ("b", "en-gb"), // British English
        ("e", "es"),
        ("f", "fr-fr"),
        ("h", "hi"),
        ("i", "it"),
        ("j", "ja"),
        ("p", "pt-br"),
        ("z", "cmn"),
    ]
    .into_iter()
    .map(|(code, language)| (code.to_string(), language.to_string()))
    .collect()
}
