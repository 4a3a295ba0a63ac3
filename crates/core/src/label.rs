//! Closed label sets and stage modes.

use serde::{Deserialize, Serialize};

/// Importance of a nugget for answering the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Vital,
    #[default]
    Okay,
    Failed,
}

impl Importance {
    /// Labels a scorer is allowed to produce.
    pub const GENERATED: &'static [Importance] = &[Importance::Vital, Importance::Okay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vital => "vital",
            Self::Okay => "okay",
            Self::Failed => "failed",
        }
    }
}

/// How well a passage supports a nugget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assignment {
    Support,
    PartialSupport,
    #[default]
    NotSupport,
    Failed,
}

impl Assignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::PartialSupport => "partial_support",
            Self::NotSupport => "not_support",
            Self::Failed => "failed",
        }
    }
}

macro_rules! label_from_str {
    ($ty:ty, [$($variant:ident),+]) => {
        impl std::str::FromStr for $ty {
            type Err = String;

            /// Case-insensitive; spaces and hyphens are read as underscores.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized: String = s
                    .trim()
                    .chars()
                    .map(|c| match c {
                        ' ' | '-' => '_',
                        c => c.to_ascii_lowercase(),
                    })
                    .collect();
                $(
                    if normalized == Self::$variant.as_str() {
                        return Ok(Self::$variant);
                    }
                )+
                Err(s.to_string())
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

label_from_str!(Importance, [Vital, Okay, Failed]);
label_from_str!(Assignment, [Support, PartialSupport, NotSupport, Failed]);

/// Granularity of extracted claims. Only the instruction text differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NuggetMode {
    #[default]
    Atomic,
    NounPhrase,
    Question,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NuggetScoreMode {
    #[default]
    VitalOkay,
}

/// Number of support grades the assigner distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NuggetAssignMode {
    SupportGrade2,
    #[default]
    SupportGrade3,
}

impl NuggetAssignMode {
    /// Labels the assigner may answer with in this mode.
    pub fn labels(&self) -> &'static [Assignment] {
        match self {
            Self::SupportGrade2 => &[Assignment::Support, Assignment::NotSupport],
            Self::SupportGrade3 => &[
                Assignment::Support,
                Assignment::PartialSupport,
                Assignment::NotSupport,
            ],
        }
    }
}
