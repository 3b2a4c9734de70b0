use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Split a `PREFIX:accession` CURIE into its vocabulary and local part. Bare
/// accessions (NEWT taxonomy identifiers are written this way) yield no vocabulary.
pub fn split_curie(curie: &str) -> (Option<ControlledVocabulary>, &str) {
    match curie.split_once(':') {
        Some((prefix, rest)) => match prefix.parse::<ControlledVocabulary>() {
            Ok(cv) => (cv.as_option(), rest),
            Err(_) => (None, curie),
        },
        None => (None, curie),
    }
}

pub trait ParamLike {
    fn name(&self) -> &str;
    fn value(&self) -> &str;
    fn accession(&self) -> Option<&str>;
    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary>;

    fn coerce<T: FromStr>(&self) -> Result<T, T::Err> {
        self.value().parse::<T>()
    }

    fn is_controlled(&self) -> bool {
        self.accession().is_some()
    }

    /// Render the term the way ProteomeXchange manifests expect it,
    /// `[CV, accession, name, value]`
    fn to_bracketed(&self) -> String {
        let cv = self
            .controlled_vocabulary()
            .map(|cv| cv.prefix())
            .unwrap_or_default();
        format!(
            "[{}, {}, {}, {}]",
            cv,
            self.accession().unwrap_or_default(),
            self.name(),
            self.value()
        )
    }
}

/// A borrowed controlled vocabulary term which may be constructed in `const` contexts
/// for lookup tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamCow<'a> {
    pub name: Cow<'a, str>,
    pub value: Cow<'a, str>,
    pub accession: Cow<'a, str>,
    pub controlled_vocabulary: ControlledVocabulary,
}

impl<'a> ParamCow<'a> {
    pub const fn const_new(
        name: &'a str,
        accession: &'a str,
        controlled_vocabulary: ControlledVocabulary,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            value: Cow::Borrowed(""),
            accession: Cow::Borrowed(accession),
            controlled_vocabulary,
        }
    }

    pub fn to_param(&self) -> Param {
        self.clone().into()
    }
}

impl ParamLike for ParamCow<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<&str> {
        Some(&self.accession)
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary.as_option()
    }
}

impl<'a> From<ParamCow<'a>> for Param {
    fn from(value: ParamCow<'a>) -> Self {
        Param {
            name: value.name.into_owned(),
            value: value.value.into_owned(),
            accession: Some(value.accession.into_owned()),
            controlled_vocabulary: value.controlled_vocabulary.as_option(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default, rename = "cv")]
    pub controlled_vocabulary: Option<ControlledVocabulary>,
}

impl Param {
    pub fn new() -> Param {
        Param {
            ..Default::default()
        }
    }

    pub fn new_key_value<K: Into<String>, V: ToString>(name: K, value: V) -> Param {
        let mut inst = Self::new();
        inst.name = name.into();
        inst.value = value.to_string();
        inst
    }

    pub fn with_value<V: ToString>(mut self, value: V) -> Param {
        self.value = value.to_string();
        self
    }
}

impl ParamLike for Param {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<&str> {
        self.accession.as_deref()
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum ControlledVocabulary {
    MS,
    PRIDE,
    NEWT,
    BTO,
    DOID,
    CL,
    UNIMOD,
    MOD,
    Unknown,
}

impl ControlledVocabulary {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::MS => "MS",
            Self::PRIDE => "PRIDE",
            Self::NEWT => "NEWT",
            Self::BTO => "BTO",
            Self::DOID => "DOID",
            Self::CL => "CL",
            Self::UNIMOD => "UNIMOD",
            Self::MOD => "MOD",
            Self::Unknown => "",
        }
    }

    /// The label used for `cvRef` attributes of identification-list documents
    pub fn reference_name(&self) -> &'static str {
        match self {
            Self::MS => "PSI-MS",
            _ => self.prefix(),
        }
    }

    pub fn as_option(&self) -> Option<Self> {
        match self {
            Self::Unknown => None,
            _ => Some(*self),
        }
    }

    pub const fn const_param(&self, name: &'static str, accession: &'static str) -> ParamCow<'static> {
        ParamCow::const_new(name, accession, *self)
    }

    pub fn param<A: Into<String>, S: Into<String>>(&self, accession: A, name: S) -> Param {
        Param {
            name: name.into(),
            value: String::new(),
            accession: Some(accession.into()),
            controlled_vocabulary: self.as_option(),
        }
    }

    pub fn param_val<A: Into<String>, S: Into<String>, V: ToString>(
        &self,
        accession: A,
        name: S,
        value: V,
    ) -> Param {
        self.param(accession, name).with_value(value)
    }
}

impl Display for ControlledVocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlledVocabularyResolutionError(pub String);

impl Display for ControlledVocabularyResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unrecognized controlled vocabulary {}", self.0)
    }
}

impl std::error::Error for ControlledVocabularyResolutionError {}

impl FromStr for ControlledVocabulary {
    type Err = ControlledVocabularyResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" | "PSI" => Ok(Self::MS),
            "PRIDE" => Ok(Self::PRIDE),
            "NEWT" => Ok(Self::NEWT),
            "BTO" => Ok(Self::BTO),
            "DOID" => Ok(Self::DOID),
            "CL" => Ok(Self::CL),
            "UNIMOD" => Ok(Self::UNIMOD),
            "MOD" | "PSI-MOD" => Ok(Self::MOD),
            _ => Err(ControlledVocabularyResolutionError(s.to_string())),
        }
    }
}

pub type ParamList = Vec<Param>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_curie() {
        assert_eq!(split_curie("MS:1000031"), (Some(ControlledVocabulary::MS), "1000031"));
        assert_eq!(split_curie("UNIMOD:35"), (Some(ControlledVocabulary::UNIMOD), "35"));
        assert_eq!(split_curie("9606"), (None, "9606"));
        assert_eq!(split_curie("FOO:12"), (None, "FOO:12"));
    }

    #[test]
    fn test_bracketed() {
        let species = ControlledVocabulary::NEWT.param("9606", "Homo sapiens (Human)");
        assert_eq!(species.to_bracketed(), "[NEWT, 9606, Homo sapiens (Human), ]");
        let tissue = Param::new_key_value("tissue", "liver");
        assert_eq!(tissue.to_bracketed(), "[, , tissue, liver]");
        assert!(!tissue.is_controlled());
    }
}
