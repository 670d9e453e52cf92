//! Phase classifier: maps a raw output line to a coarse phase label via
//! ordered keyword rules. Pure, no I/O — scripts report sub-phases
//! opportunistically without the orchestrator understanding their internals.

use crate::catalog::{LABEL_DEPLOY, LABEL_PREPARE, LABEL_VALIDATE, LABEL_VERIFY, Mode};

/// One keyword → phase rule. Rule order is significant: overlapping keywords
/// are expected (a line may contain both "deploy" and "verify") and the
/// first match wins.
pub struct PhaseRule {
    pub keyword: &'static str,
    pub label: &'static str,
}

pub const PHASE_RULES: &[PhaseRule] = &[
    PhaseRule { keyword: "validate", label: LABEL_VALIDATE },
    PhaseRule { keyword: "prerequisite", label: LABEL_VALIDATE },
    PhaseRule { keyword: "prepare", label: LABEL_PREPARE },
    PhaseRule { keyword: "deploy", label: LABEL_DEPLOY },
    PhaseRule { keyword: "kommander", label: LABEL_DEPLOY },
];

/// Classify one output line. Returns the first matching rule's label; in
/// automated mode a line that matches nothing but mentions "verify" falls
/// through to the terminal verification phase, since the composite script
/// ends with a verification pass the rule table does not cover.
pub fn classify(line: &str, mode: Mode) -> Option<&'static str> {
    let line = line.to_lowercase();
    for rule in PHASE_RULES {
        if line.contains(rule.keyword) {
            return Some(rule.label);
        }
    }
    if mode == Mode::Automated && line.contains("verify") {
        return Some(LABEL_VERIFY);
    }
    None
}
