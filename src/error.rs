use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage an item was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idea,
    Narration,
    Footage,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idea => "idea",
            Stage::Narration => "narration",
            Stage::Footage => "footage",
            Stage::Assembly => "assembly",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("idea generation failed: {0}")]
    Generation(String),

    #[error("narration synthesis failed: {0}")]
    Synthesis(String),

    #[error("footage selection failed: {0}")]
    Selection(String),

    #[error("video assembly failed: {0}")]
    Assembly(String),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Generation(_) => Stage::Idea,
            PipelineError::Synthesis(_) => Stage::Narration,
            PipelineError::Selection(_) => Stage::Footage,
            PipelineError::Assembly(_) => Stage::Assembly,
        }
    }

    /// The diagnostic message without the stage prefix.
    pub fn reason(&self) -> &str {
        match self {
            PipelineError::Generation(msg)
            | PipelineError::Synthesis(msg)
            | PipelineError::Selection(msg)
            | PipelineError::Assembly(msg) => msg,
        }
    }

    pub(crate) fn generation(err: impl fmt::Display) -> Self {
        PipelineError::Generation(format!("{:#}", err))
    }

    pub(crate) fn synthesis(err: impl fmt::Display) -> Self {
        PipelineError::Synthesis(format!("{:#}", err))
    }

    pub(crate) fn assembly(err: impl fmt::Display) -> Self {
        PipelineError::Assembly(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_matches_variant() {
        let err = PipelineError::Selection("no clips".to_string());
        assert_eq!(err.stage(), Stage::Footage);
        assert_eq!(err.reason(), "no clips");
        assert_eq!(err.to_string(), "footage selection failed: no clips");
    }

    #[test]
    fn stage_serializes_lowercase() {
        let json = serde_json::to_string(&Stage::Narration).unwrap();
        assert_eq!(json, "\"narration\"");
    }
}
