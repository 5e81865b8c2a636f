//! Partial-release report

use gantry_core::GantryError;

use crate::stage::ReleaseStage;
use crate::state::{CompletedStage, ReleaseState, SideEffect};

/// What a release had done when a mutating stage failed
#[derive(Debug)]
pub struct PartialRelease {
    /// Stage that failed
    pub failed_stage: ReleaseStage,
    /// Stages that completed, with their packages
    pub completed: Vec<CompletedStage>,
    /// Packages the failed stage did not process
    pub unprocessed: Vec<String>,
    /// Everything done to the outside world
    pub side_effects: Vec<SideEffect>,
    /// The error that stopped the release
    pub source: GantryError,
}

impl PartialRelease {
    /// Build a report from the release state at the point of failure
    pub fn from_state(state: &ReleaseState, source: GantryError) -> Self {
        Self {
            failed_stage: state.stage,
            completed: state.completed.clone(),
            unprocessed: state.unprocessed(),
            side_effects: state.side_effects.clone(),
            source,
        }
    }
}

impl std::fmt::Display for PartialRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "release stopped in stage '{}': {} [{}]",
            self.failed_stage,
            self.source,
            self.source.code()
        )?;

        if !self.completed.is_empty() {
            writeln!(f, "completed stages:")?;
            for stage in &self.completed {
                if stage.packages.is_empty() {
                    writeln!(f, "  {}", stage.stage)?;
                } else {
                    writeln!(f, "  {}: {}", stage.stage, stage.packages.join(", "))?;
                }
            }
        }

        if !self.unprocessed.is_empty() {
            writeln!(
                f,
                "not processed by '{}': {}",
                self.failed_stage,
                self.unprocessed.join(", ")
            )?;
        }

        if !self.side_effects.is_empty() {
            writeln!(f, "side effects:")?;
            for effect in &self.side_effects {
                writeln!(f, "  {}", effect)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::error::RegistryError;

    #[test]
    fn test_report_lists_stages_and_effects() {
        let mut state = ReleaseState::new();
        state.begin(ReleaseStage::Commit, vec!["a".into(), "b".into()]);
        state.mark_done("a");
        state.mark_done("b");
        state.record(SideEffect::CommitCreated {
            sha: "abc1234".into(),
        });
        state.finish();
        state.begin(ReleaseStage::Publish, vec!["a".into(), "b".into()]);
        state.mark_done("a");

        let report = PartialRelease::from_state(
            &state,
            RegistryError::PublishFailed {
                package: "b".into(),
                message: "E401".into(),
            }
            .into(),
        );
        assert_eq!(report.unprocessed, vec!["b"]);

        let text = report.to_string();
        assert!(text.contains("release stopped in stage 'publish'"));
        assert!(text.contains("[EPUBLISH]"));
        assert!(text.contains("  commit: a, b"));
        assert!(text.contains("not processed by 'publish': b"));
        assert!(text.contains("committed abc1234"));
    }
}
