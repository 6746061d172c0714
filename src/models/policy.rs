// Session policy and the six violation kinds it can enable

use serde::{Deserialize, Serialize};

// ==============================================================================
// Violation Kind
// ==============================================================================

/// One proctoring capability. Doubles as the violation label stored with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    AbsencePerson,
    ExtraPerson,
    PersonSubstitution,
    LookingAway,
    MouthOpening,
    HintsOutside,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 6] = [
        ViolationKind::AbsencePerson,
        ViolationKind::ExtraPerson,
        ViolationKind::PersonSubstitution,
        ViolationKind::LookingAway,
        ViolationKind::MouthOpening,
        ViolationKind::HintsOutside,
    ];

    pub fn to_string(&self) -> &'static str {
        match self {
            ViolationKind::AbsencePerson => "absence_person",
            ViolationKind::ExtraPerson => "extra_person",
            ViolationKind::PersonSubstitution => "person_substitution",
            ViolationKind::LookingAway => "looking_away",
            ViolationKind::MouthOpening => "mouth_opening",
            ViolationKind::HintsOutside => "hints_outside",
        }
    }

    /// Parse a violation kind from its stored name
    pub fn from_string(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "absence_person" => Ok(ViolationKind::AbsencePerson),
            "extra_person" => Ok(ViolationKind::ExtraPerson),
            "person_substitution" => Ok(ViolationKind::PersonSubstitution),
            "looking_away" => Ok(ViolationKind::LookingAway),
            "mouth_opening" => Ok(ViolationKind::MouthOpening),
            "hints_outside" => Ok(ViolationKind::HintsOutside),
            _ => Err(format!("Unknown violation kind: {}", s)),
        }
    }

    /// Human-readable label used in reports
    pub fn caption(&self) -> &'static str {
        match self {
            ViolationKind::AbsencePerson => "Absence of person",
            ViolationKind::ExtraPerson => "Extra person detected",
            ViolationKind::PersonSubstitution => "Person substitution",
            ViolationKind::LookingAway => "Looking away",
            ViolationKind::MouthOpening => "Mouth opening (speaking)",
            ViolationKind::HintsOutside => "Hints from outside",
        }
    }
}

// ==============================================================================
// Policy
// ==============================================================================

/// Which checks a session runs. Fixed for the duration of a check call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub check_absence: bool,
    pub check_extra_person: bool,
    pub check_substitution: bool,
    pub check_looking_away: bool,
    pub check_mouth_opening: bool,
    pub check_hints_outside: bool,
}

impl Policy {
    /// Policy with every check enabled
    pub fn all() -> Self {
        Self {
            check_absence: true,
            check_extra_person: true,
            check_substitution: true,
            check_looking_away: true,
            check_mouth_opening: true,
            check_hints_outside: true,
        }
    }

    /// Policy with every check disabled
    pub fn none() -> Self {
        Self::default()
    }

    /// Policy enabling exactly the given kinds
    pub fn only(kinds: &[ViolationKind]) -> Self {
        let mut policy = Self::none();
        for kind in kinds {
            policy.set(*kind, true);
        }
        policy
    }

    pub fn is_enabled(&self, kind: ViolationKind) -> bool {
        match kind {
            ViolationKind::AbsencePerson => self.check_absence,
            ViolationKind::ExtraPerson => self.check_extra_person,
            ViolationKind::PersonSubstitution => self.check_substitution,
            ViolationKind::LookingAway => self.check_looking_away,
            ViolationKind::MouthOpening => self.check_mouth_opening,
            ViolationKind::HintsOutside => self.check_hints_outside,
        }
    }

    pub fn set(&mut self, kind: ViolationKind, enabled: bool) {
        match kind {
            ViolationKind::AbsencePerson => self.check_absence = enabled,
            ViolationKind::ExtraPerson => self.check_extra_person = enabled,
            ViolationKind::PersonSubstitution => self.check_substitution = enabled,
            ViolationKind::LookingAway => self.check_looking_away = enabled,
            ViolationKind::MouthOpening => self.check_mouth_opening = enabled,
            ViolationKind::HintsOutside => self.check_hints_outside = enabled,
        }
    }

    /// True when at least one check is enabled
    pub fn any_enabled(&self) -> bool {
        ViolationKind::ALL.iter().any(|kind| self.is_enabled(*kind))
    }
}
