//! Race outcome classification from the contended state cell.
//!
//! Both operations unconditionally overwrite the same cell with their own tag,
//! so the surviving value names the operation applied last. That side "won":
//! its write is the one visible after the race.

use std::fmt;

use endpoint_api::{EndpointError, StateValue};
use race_types::{RaceOutcome, SideOutcome};
use serde::Serialize;

/// One read of the contended cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StateObservation {
    Value(StateValue),
    /// The key is not set.
    Unset,
    Unreadable(String),
}

impl StateObservation {
    pub fn from_read(read: Result<Option<StateValue>, EndpointError>) -> Self {
        match read {
            Ok(Some(v)) => StateObservation::Value(v),
            Ok(None) => StateObservation::Unset,
            Err(e) => StateObservation::Unreadable(e.to_string()),
        }
    }

    fn holds(&self, tag: &[u8]) -> bool {
        match self {
            StateObservation::Value(v) => v.as_bytes() == Some(tag),
            _ => false,
        }
    }
}

impl fmt::Display for StateObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateObservation::Value(v) => write!(f, "{v}"),
            StateObservation::Unset => f.write_str("<unset>"),
            StateObservation::Unreadable(e) => write!(f, "<unreadable: {e}>"),
        }
    }
}

/// Why a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Basis {
    OnlyAConfirmed,
    OnlyBConfirmed,
    FinalStateIsA,
    FinalStateIsB,
    /// Both confirmed but the cell still holds its pre-race value.
    StateUnchanged,
    /// Both confirmed and the cell holds something neither side writes.
    StateUnrecognized,
    /// Both sides write the same tag, so the cell cannot tell them apart.
    IdenticalTags,
    StateUnreadable,
    /// At least one side reached a node but neither confirmed.
    NeitherConfirmed,
    NothingAccepted,
}

impl Basis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Basis::OnlyAConfirmed => "only-a-confirmed",
            Basis::OnlyBConfirmed => "only-b-confirmed",
            Basis::FinalStateIsA => "final-state-a",
            Basis::FinalStateIsB => "final-state-b",
            Basis::StateUnchanged => "state-unchanged",
            Basis::StateUnrecognized => "state-unrecognized",
            Basis::IdenticalTags => "identical-tags",
            Basis::StateUnreadable => "state-unreadable",
            Basis::NeitherConfirmed => "neither-confirmed",
            Basis::NothingAccepted => "nothing-accepted",
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub outcome: RaceOutcome,
    pub basis: Basis,
}

impl Verdict {
    fn new(outcome: RaceOutcome, basis: Basis) -> Self { Self { outcome, basis } }
}

/// Pure: the same inputs always give the same verdict.
pub fn classify(
    pre: &StateObservation,
    post: &StateObservation,
    a: &SideOutcome,
    b: &SideOutcome,
) -> Verdict {
    match (a.is_confirmed(), b.is_confirmed()) {
        (true, false) => Verdict::new(RaceOutcome::AWon, Basis::OnlyAConfirmed),
        (false, true) => Verdict::new(RaceOutcome::BWon, Basis::OnlyBConfirmed),
        (false, false) => {
            if !a.was_accepted() && !b.was_accepted() {
                Verdict::new(RaceOutcome::BothFailed, Basis::NothingAccepted)
            } else {
                Verdict::new(RaceOutcome::Ambiguous, Basis::NeitherConfirmed)
            }
        }
        (true, true) => {
            if matches!(post, StateObservation::Unreadable(_)) {
                return Verdict::new(RaceOutcome::Unknown, Basis::StateUnreadable);
            }
            if a.op.tag == b.op.tag {
                return Verdict::new(RaceOutcome::Ambiguous, Basis::IdenticalTags);
            }
            if post.holds(&b.op.tag) {
                Verdict::new(RaceOutcome::BWon, Basis::FinalStateIsB)
            } else if post.holds(&a.op.tag) {
                Verdict::new(RaceOutcome::AWon, Basis::FinalStateIsA)
            } else if post == pre {
                Verdict::new(RaceOutcome::Ambiguous, Basis::StateUnchanged)
            } else {
                Verdict::new(RaceOutcome::Ambiguous, Basis::StateUnrecognized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_types::{ConfirmationOutcome, Note, OpKind, Operation, SubmitFailure, TxId};

    fn side(kind: OpKind, tag: &str, confirmation: Option<ConfirmationOutcome>) -> SideOutcome {
        let submission = match confirmation {
            Some(_) => Ok(TxId::new(format!("{tag}-id"))),
            None => Err(SubmitFailure { reason: "overspend".into() }),
        };
        SideOutcome {
            op: Operation {
                kind,
                method: format!("{tag}()string"),
                tag: tag.as_bytes().to_vec(),
                note: Note::new(format!("{tag}_1_0")),
                fee: 1_000,
                app_id: 1002,
                endpoint: kind.as_str().to_ascii_lowercase(),
                first_valid: 10,
                last_valid: 1_010,
            },
            submission,
            confirmation,
            proposer: None,
        }
    }

    fn confirmed(round: u64) -> Option<ConfirmationOutcome> {
        Some(ConfirmationOutcome::Confirmed { round, fee: 1_000 })
    }

    fn value(s: &str) -> StateObservation {
        StateObservation::Value(StateValue::Bytes(s.as_bytes().to_vec()))
    }

    #[test]
    fn surviving_tag_names_the_winner() {
        let a = side(OpKind::A, "X", confirmed(10));
        let b = side(OpKind::B, "Y", confirmed(10));
        let pre = value("seed");

        let v = classify(&pre, &value("Y"), &a, &b);
        assert_eq!(v, Verdict { outcome: RaceOutcome::BWon, basis: Basis::FinalStateIsB });

        let v = classify(&pre, &value("X"), &a, &b);
        assert_eq!(v, Verdict { outcome: RaceOutcome::AWon, basis: Basis::FinalStateIsA });
    }

    #[test]
    fn classification_is_deterministic() {
        let a = side(OpKind::A, "X", confirmed(10));
        let b = side(OpKind::B, "Y", Some(ConfirmationOutcome::TimedOut { last_round: 14 }));
        let pre = value("seed");
        let post = value("Y");
        let first = classify(&pre, &post, &a, &b);
        for _ in 0..16 {
            assert_eq!(classify(&pre, &post, &a, &b), first);
        }
    }

    #[test]
    fn lone_confirmation_wins_regardless_of_state() {
        let a = side(OpKind::A, "X", confirmed(10));
        let pre = value("seed");
        let failures = [
            Some(ConfirmationOutcome::Rejected { reason: "txn dead".into() }),
            Some(ConfirmationOutcome::TimedOut { last_round: 14 }),
            None,
        ];
        let posts = [
            value("Y"),
            value("seed"),
            StateObservation::Unset,
            StateObservation::Unreadable("503".into()),
        ];
        for failure in failures {
            let b = side(OpKind::B, "Y", failure);
            for post in &posts {
                assert_eq!(classify(&pre, post, &a, &b).outcome, RaceOutcome::AWon);
                assert_eq!(classify(&pre, post, &b, &a).outcome, RaceOutcome::BWon);
            }
        }
    }

    #[test]
    fn unchanged_or_foreign_state_is_ambiguous() {
        let a = side(OpKind::A, "X", confirmed(10));
        let b = side(OpKind::B, "Y", confirmed(11));
        let pre = value("seed");
        assert_eq!(
            classify(&pre, &value("seed"), &a, &b),
            Verdict { outcome: RaceOutcome::Ambiguous, basis: Basis::StateUnchanged }
        );
        assert_eq!(
            classify(&pre, &value("Z"), &a, &b),
            Verdict { outcome: RaceOutcome::Ambiguous, basis: Basis::StateUnrecognized }
        );
        assert_eq!(
            classify(&pre, &StateObservation::Unreadable("timeout".into()), &a, &b).outcome,
            RaceOutcome::Unknown
        );
    }

    #[test]
    fn neither_confirmed() {
        let pre = value("seed");
        let a = side(OpKind::A, "X", None);
        let b = side(OpKind::B, "Y", None);
        assert_eq!(classify(&pre, &pre, &a, &b).outcome, RaceOutcome::BothFailed);

        let a = side(OpKind::A, "X", Some(ConfirmationOutcome::TimedOut { last_round: 14 }));
        let b = side(OpKind::B, "Y", Some(ConfirmationOutcome::Rejected { reason: "dead".into() }));
        assert_eq!(
            classify(&pre, &pre, &a, &b),
            Verdict { outcome: RaceOutcome::Ambiguous, basis: Basis::NeitherConfirmed }
        );
    }

    #[test]
    fn identical_tags_cannot_be_attributed() {
        let a = side(OpKind::A, "X", confirmed(10));
        let b = side(OpKind::B, "X", confirmed(10));
        assert_eq!(classify(&value("seed"), &value("X"), &a, &b).basis, Basis::IdenticalTags);
    }
}
