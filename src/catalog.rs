//! Step catalog: the fixed mapping from phase labels to the external
//! provisioning scripts that implement them, plus the ordered step set each
//! deployment mode runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::StartError;

pub const LABEL_VALIDATE: &str = "Validate prerequisites";
pub const LABEL_PREPARE: &str = "Prepare nodes";
pub const LABEL_DEPLOY: &str = "Deploy NKP";
pub const LABEL_VERIFY: &str = "Verify deployment";
/// Composite single-script workflow used by automated mode.
pub const LABEL_FULL: &str = "Deploy & verify";

/// Deployment mode selected by the start request. Immutable once a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Automated,
    Phased,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Automated => "automated",
            Mode::Phased => "phased",
        }
    }
}

/// One named external invocation within a deployment sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub label: String,
    pub argv: Vec<String>,
}

/// Ordered label → argv mapping. Step sets per mode are resolved against
/// this at run start; an unknown label is a configuration error, never
/// silently skipped.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    entries: Vec<(String, Vec<String>)>,
}

impl StepCatalog {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }

    /// The bundled catalog, pointing at the externally-owned deployment
    /// scripts under `scripts_dir`.
    pub fn bundled(scripts_dir: &Path) -> Self {
        let script = |name: &str| {
            vec![
                "bash".to_string(),
                scripts_dir.join(name).to_string_lossy().to_string(),
            ]
        };
        Self::new(vec![
            (LABEL_VALIDATE.to_string(), script("validate-prerequisites.sh")),
            (LABEL_PREPARE.to_string(), script("prepare-nodes.sh")),
            (LABEL_DEPLOY.to_string(), script("deploy-nkp.sh")),
            (LABEL_VERIFY.to_string(), script("verify-deployment.sh")),
            (LABEL_FULL.to_string(), script("run-deployment.sh")),
        ])
    }

    /// Canonical ordered step labels for a mode.
    pub fn step_set(&self, mode: Mode) -> Vec<&str> {
        match mode {
            Mode::Automated => vec![LABEL_FULL],
            Mode::Phased => vec![LABEL_VALIDATE, LABEL_PREPARE, LABEL_DEPLOY, LABEL_VERIFY],
        }
    }

    fn lookup(&self, label: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, argv)| argv.as_slice())
    }

    /// Resolve the ordered step list for a mode.
    ///
    /// Automated mode always runs the single composite step and ignores any
    /// requested subset. Phased mode applies a non-empty subset as a filter
    /// over the canonical order, so callers cannot reorder steps; a requested
    /// label outside the phased step set fails fast.
    pub fn resolve(
        &self,
        mode: Mode,
        requested: Option<&[String]>,
    ) -> Result<Vec<Step>, StartError> {
        let set = self.step_set(mode);

        let labels: Vec<&str> = match (mode, requested) {
            (Mode::Phased, Some(wanted)) if !wanted.is_empty() => {
                for label in wanted {
                    if !set.contains(&label.as_str()) {
                        return Err(StartError::UnknownPhase(label.clone()));
                    }
                }
                set.into_iter()
                    .filter(|l| wanted.iter().any(|w| w == l))
                    .collect()
            }
            _ => set,
        };

        labels
            .into_iter()
            .map(|label| {
                let argv = self
                    .lookup(label)
                    .ok_or_else(|| StartError::UnknownPhase(label.to_string()))?;
                Ok(Step {
                    label: label.to_string(),
                    argv: argv.to_vec(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn catalog() -> StepCatalog {
        StepCatalog::bundled(&PathBuf::from("/opt/nkp/scripts"))
    }

    #[test]
    fn automated_mode_resolves_to_single_composite_step() {
        let steps = catalog().resolve(Mode::Automated, None).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].label, LABEL_FULL);
        assert_eq!(steps[0].argv[0], "bash");
        assert!(steps[0].argv[1].ends_with("run-deployment.sh"));
    }

    #[test]
    fn automated_mode_ignores_requested_subset() {
        let requested = vec![LABEL_PREPARE.to_string()];
        let steps = catalog().resolve(Mode::Automated, Some(&requested)).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].label, LABEL_FULL);
    }

    #[test]
    fn phased_mode_resolves_full_set_in_order() {
        let steps = catalog().resolve(Mode::Phased, None).unwrap();
        let labels: Vec<&str> = steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![LABEL_VALIDATE, LABEL_PREPARE, LABEL_DEPLOY, LABEL_VERIFY]
        );
    }

    #[test]
    fn phased_subset_keeps_canonical_order() {
        // Request in reverse order; the catalog order must win.
        let requested = vec![LABEL_DEPLOY.to_string(), LABEL_PREPARE.to_string()];
        let steps = catalog().resolve(Mode::Phased, Some(&requested)).unwrap();
        let labels: Vec<&str> = steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec![LABEL_PREPARE, LABEL_DEPLOY]);
    }

    #[test]
    fn phased_empty_subset_means_full_set() {
        let steps = catalog().resolve(Mode::Phased, Some(&[])).unwrap();
        assert_eq!(steps.len(), 4);
    }

    #[test]
    fn unknown_phase_label_is_rejected() {
        let requested = vec!["Install mainframe".to_string()];
        let err = catalog().resolve(Mode::Phased, Some(&requested)).unwrap_err();
        match err {
            StartError::UnknownPhase(label) => assert_eq!(label, "Install mainframe"),
            other => panic!("Expected UnknownPhase, got {other:?}"),
        }
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Automated).unwrap(), "\"automated\"");
        let mode: Mode = serde_json::from_str("\"phased\"").unwrap();
        assert_eq!(mode, Mode::Phased);
    }
}
