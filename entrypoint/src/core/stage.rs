//! The fixed, ordered task pipeline.

use std::fmt;
use std::str::FromStr;

/// One named stage of the reconciliation pipeline.
///
/// Discriminants are the stage ordinals; ordering between stages is total and
/// follows execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Setup = 0,
    PreInit = 1,
    Init = 2,
    PostInit = 3,
    PrePlan = 4,
    Plan = 5,
    PostPlan = 6,
    PreApply = 7,
    Apply = 8,
    PostApply = 9,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 10] = [
        Stage::Setup,
        Stage::PreInit,
        Stage::Init,
        Stage::PostInit,
        Stage::PrePlan,
        Stage::Plan,
        Stage::PostPlan,
        Stage::PreApply,
        Stage::Apply,
        Stage::PostApply,
    ];

    /// Number of stages in the pipeline.
    pub const COUNT: usize = Self::ALL.len();

    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Name used in environment values and generation filenames.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::PreInit => "preinit",
            Stage::Init => "init",
            Stage::PostInit => "postinit",
            Stage::PrePlan => "preplan",
            Stage::Plan => "plan",
            Stage::PostPlan => "postplan",
            Stage::PreApply => "preapply",
            Stage::Apply => "apply",
            Stage::PostApply => "postapply",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name is not one of the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStage(pub String);

impl fmt::Display for UnknownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown stage '{}'", self.0)
    }
}

impl std::error::Error for UnknownStage {}

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}
