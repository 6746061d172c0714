// Per-frame and cumulative violation verdicts

use crate::models::policy::ViolationKind;
use serde::{Deserialize, Serialize};

/// Outcome of one check call, or the running total for a session.
///
/// `None` means the check was not evaluated. A field is only ever `Some(_)`
/// when the matching policy flag was enabled at evaluation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub absence_person: Option<bool>,
    pub extra_person: Option<bool>,
    pub person_substitution: Option<bool>,
    pub looking_away: Option<bool>,
    pub mouth_opening: Option<bool>,
    pub hints_outside: Option<bool>,
}

impl Verdict {
    pub fn get(&self, kind: ViolationKind) -> Option<bool> {
        match kind {
            ViolationKind::AbsencePerson => self.absence_person,
            ViolationKind::ExtraPerson => self.extra_person,
            ViolationKind::PersonSubstitution => self.person_substitution,
            ViolationKind::LookingAway => self.looking_away,
            ViolationKind::MouthOpening => self.mouth_opening,
            ViolationKind::HintsOutside => self.hints_outside,
        }
    }

    pub fn set(&mut self, kind: ViolationKind, value: Option<bool>) {
        let slot = match kind {
            ViolationKind::AbsencePerson => &mut self.absence_person,
            ViolationKind::ExtraPerson => &mut self.extra_person,
            ViolationKind::PersonSubstitution => &mut self.person_substitution,
            ViolationKind::LookingAway => &mut self.looking_away,
            ViolationKind::MouthOpening => &mut self.mouth_opening,
            ViolationKind::HintsOutside => &mut self.hints_outside,
        };
        *slot = value;
    }

    /// Kinds currently flagged `Some(true)`, in canonical order
    pub fn violations(&self) -> Vec<ViolationKind> {
        ViolationKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind) == Some(true))
            .collect()
    }

    pub fn has_violation(&self) -> bool {
        ViolationKind::ALL
            .iter()
            .any(|kind| self.get(*kind) == Some(true))
    }

    /// Fold this verdict into a cumulative one.
    ///
    /// A violation sticks: `Some(true)` always wins, `Some(false)` only fills a
    /// field that was never evaluated, and `None` leaves the field untouched.
    pub fn merge_into(&self, cumulative: &mut Verdict) {
        for kind in ViolationKind::ALL {
            let merged = match (cumulative.get(kind), self.get(kind)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (None, incoming) => incoming,
                (current, None) => current,
                (Some(false), Some(false)) => Some(false),
            };
            cumulative.set(kind, merged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unevaluated() {
        let verdict = Verdict::default();
        for kind in ViolationKind::ALL {
            assert_eq!(verdict.get(kind), None);
        }
        assert!(!verdict.has_violation());
    }

    #[test]
    fn test_merge_violation_sticks() {
        let mut cumulative = Verdict::default();
        cumulative.looking_away = Some(true);

        let incoming = Verdict {
            looking_away: Some(false),
            ..Default::default()
        };
        incoming.merge_into(&mut cumulative);

        assert_eq!(cumulative.looking_away, Some(true));
    }

    #[test]
    fn test_merge_false_fills_unevaluated_only() {
        let mut cumulative = Verdict::default();
        let incoming = Verdict {
            mouth_opening: Some(false),
            ..Default::default()
        };
        incoming.merge_into(&mut cumulative);
        assert_eq!(cumulative.mouth_opening, Some(false));

        let later = Verdict {
            mouth_opening: Some(true),
            ..Default::default()
        };
        later.merge_into(&mut cumulative);
        assert_eq!(cumulative.mouth_opening, Some(true));
    }

    #[test]
    fn test_merge_none_never_overwrites() {
        let mut cumulative = Verdict {
            absence_person: Some(false),
            extra_person: Some(true),
            ..Default::default()
        };
        Verdict::default().merge_into(&mut cumulative);
        assert_eq!(cumulative.absence_person, Some(false));
        assert_eq!(cumulative.extra_person, Some(true));
        assert_eq!(cumulative.hints_outside, None);
    }

    #[test]
    fn test_merge_is_monotonic_over_sequence() {
        let sequence = [Some(false), Some(true), None, Some(false), Some(false)];
        let mut cumulative = Verdict::default();
        let mut seen_true = false;

        for value in sequence {
            let mut incoming = Verdict::default();
            incoming.set(ViolationKind::HintsOutside, value);
            incoming.merge_into(&mut cumulative);

            seen_true |= value == Some(true);
            if seen_true {
                assert_eq!(cumulative.hints_outside, Some(true));
            }
        }
    }

    #[test]
    fn test_violations_lists_true_fields_in_order() {
        let verdict = Verdict {
            mouth_opening: Some(true),
            absence_person: Some(true),
            extra_person: Some(false),
            ..Default::default()
        };
        assert_eq!(
            verdict.violations(),
            vec![ViolationKind::AbsencePerson, ViolationKind::MouthOpening]
        );
    }
}
