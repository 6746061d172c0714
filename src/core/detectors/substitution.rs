// Person-substitution check

use super::{DetectionInput, Detector};
use crate::models::policy::ViolationKind;

/// Placeholder for identity verification against the session's identity photo.
///
/// Not implemented: always reports no substitution. Callers that need to know
/// whether the answer is meaningful should check `is_implemented()`.
#[derive(Debug, Default)]
pub struct SubstitutionCheck;

impl SubstitutionCheck {
    pub fn new() -> Self {
        Self
    }

    pub fn is_implemented(&self) -> bool {
        false
    }
}

impl Detector for SubstitutionCheck {
    fn name(&self) -> &'static str {
        "substitution"
    }

    fn kinds(&self) -> &'static [ViolationKind] {
        &[ViolationKind::PersonSubstitution]
    }

    fn detect(&self, _input: &DetectionInput<'_>) -> Vec<(ViolationKind, bool)> {
        vec![(ViolationKind::PersonSubstitution, false)]
    }
}
