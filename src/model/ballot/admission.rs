//! Ballot admission control.
//!
//! Deciding whether a submission may be committed is a pure function of the
//! submission and a consistent snapshot of the store. The checks run in a
//! fixed order and stop at the first failure, so a caller learns no more
//! than the first reason their ballot was refused:
//!
//! 1. the declared rule is known,
//! 2. the selection for that rule is present and non-empty,
//! 3. every choose-all remark is known,
//! 4. the voter is on the roster,
//! 5. the activity exists,
//! 6. the selected options are exactly the expected options of the activity,
//! 7. the voter has not voted in the activity yet,
//! 8. the activity is open,
//! 9. the declared rule is the activity's rule.
//!
//! Steps 1 to 3 need no store access and are split out as [`check_payload`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::VoteError;
use crate::model::{
    activity::{Activity, VotingRule, WindowStatus},
    mongodb::Id,
    vote_option::VoteOption,
};

use super::{
    ballot_core::{Remark, RemarkedOption, Selections},
    submission::BallotSubmission,
};

/// A submission whose shape has been checked, but whose option IDs have not
/// yet been resolved against an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredBallot {
    /// `None` if the submitted ID is not even well-formed; such an activity
    /// cannot exist.
    pub activity_id: Option<Id>,
    pub rule: VotingRule,
    pub selections: DeclaredSelections,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredSelections {
    ChooseAll(Vec<(String, Remark)>),
    ChooseOne(String),
}

/// Everything admission needs to know about the store, read in one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionContext<'a> {
    pub eligible: bool,
    pub activity: Option<&'a Activity>,
    /// Options owned by `activity`.
    pub options: &'a [VoteOption],
    pub already_voted: bool,
    pub now: DateTime<Utc>,
}

/// A ballot that may be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub activity_id: Id,
    pub selections: Selections,
}

/// Steps 1 to 3: validate the shape of a submission.
pub fn check_payload(submission: &BallotSubmission) -> Result<DeclaredBallot, VoteError> {
    let rule: VotingRule = submission.rule.parse()?;

    let selections = match rule {
        VotingRule::ChooseAll => {
            let entries = match &submission.choose_all {
                Some(entries) if !entries.is_empty() => entries,
                _ => return Err(VoteError::MissingSelection),
            };
            let remarks = entries
                .iter()
                .map(|entry| Ok((entry.option_id.clone(), entry.remark.parse()?)))
                .collect::<Result<Vec<_>, VoteError>>()?;
            DeclaredSelections::ChooseAll(remarks)
        }
        VotingRule::ChooseOne => match &submission.choose_one {
            Some(option_id) if !option_id.trim().is_empty() => {
                DeclaredSelections::ChooseOne(option_id.clone())
            }
            _ => return Err(VoteError::MissingSelection),
        },
    };

    Ok(DeclaredBallot {
        activity_id: submission.activity_id.trim().parse().ok(),
        rule,
        selections,
    })
}

/// Steps 4 to 9: decide whether a checked ballot may be committed.
pub fn admit(ballot: &DeclaredBallot, ctx: &AdmissionContext<'_>) -> Result<Admitted, VoteError> {
    if !ctx.eligible {
        return Err(VoteError::NotEligible);
    }

    let activity = match ctx.activity {
        Some(activity) if Some(activity.id) == ballot.activity_id => activity,
        _ => return Err(VoteError::ActivityNotFound),
    };

    let selections = resolve_options(&ballot.selections, activity, ctx.options)?;

    if ctx.already_voted {
        return Err(VoteError::AlreadyVoted);
    }

    match activity.status_at(ctx.now) {
        WindowStatus::Upcoming => return Err(VoteError::NotStarted),
        WindowStatus::Closed => return Err(VoteError::VotingEnded),
        WindowStatus::Open => {}
    }

    if activity.rule != ballot.rule {
        return Err(VoteError::RuleMismatch);
    }

    Ok(Admitted {
        activity_id: activity.id,
        selections,
    })
}

/// Step 6: every referenced option must exist, belong to the activity and
/// appear once, and the number referenced must be what the declared rule
/// expects (one, or every option of the activity).
fn resolve_options(
    declared: &DeclaredSelections,
    activity: &Activity,
    options: &[VoteOption],
) -> Result<Selections, VoteError> {
    let known: HashSet<Id> = options
        .iter()
        .filter(|option| option.activity_id == activity.id)
        .map(|option| option.id)
        .filter(|id| activity.option_ids.contains(id))
        .collect();

    let resolve = |raw: &str| -> Result<Id, VoteError> {
        let id: Id = raw.trim().parse().map_err(|_| VoteError::InvalidOptions)?;
        if known.contains(&id) {
            Ok(id)
        } else {
            Err(VoteError::InvalidOptions)
        }
    };

    match declared {
        DeclaredSelections::ChooseOne(raw) => Ok(Selections::ChooseOne(resolve(raw)?)),
        DeclaredSelections::ChooseAll(entries) => {
            let mut seen = HashSet::with_capacity(entries.len());
            let mut resolved = Vec::with_capacity(entries.len());
            for (raw, remark) in entries {
                let option_id = resolve(raw)?;
                if !seen.insert(option_id) {
                    return Err(VoteError::InvalidOptions);
                }
                resolved.push(RemarkedOption {
                    option_id,
                    remark: *remark,
                });
            }
            if resolved.len() != known.len() {
                return Err(VoteError::InvalidOptions);
            }
            Ok(Selections::ChooseAll(resolved))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use crate::model::ballot::submission::RemarkSubmission;

    struct Fixture {
        activity: Activity,
        options: Vec<VoteOption>,
    }

    impl Fixture {
        fn new(rule: VotingRule, option_count: usize) -> Self {
            let now = Utc::now();
            let mut activity = Activity {
                id: Id::new(),
                name: "Fixture".to_string(),
                subtitle: None,
                description: None,
                kind: Default::default(),
                rule,
                open_from: now - Duration::hours(1),
                open_to: now + Duration::hours(1),
                option_ids: Vec::new(),
            };
            let options: Vec<_> = (0..option_count)
                .map(|i| VoteOption::new(activity.id, format!("Option {i}"), None))
                .collect();
            activity.option_ids = options.iter().map(|o| o.id).collect();
            Self { activity, options }
        }

        fn ctx(&self) -> AdmissionContext<'_> {
            AdmissionContext {
                eligible: true,
                activity: Some(&self.activity),
                options: &self.options,
                already_voted: false,
                now: Utc::now(),
            }
        }

        fn option(&self, i: usize) -> String {
            self.options[i].id.to_hex()
        }

        fn choose_one(&self, i: usize) -> BallotSubmission {
            BallotSubmission::choose_one(self.activity.id, self.option(i))
        }

        fn choose_all(&self, remarks: &[&str]) -> BallotSubmission {
            BallotSubmission::choose_all(
                self.activity.id,
                remarks.iter().enumerate().map(|(i, r)| (self.option(i), *r)),
            )
        }
    }

    fn decide(submission: &BallotSubmission, ctx: &AdmissionContext<'_>) -> Result<Admitted, VoteError> {
        admit(&check_payload(submission)?, ctx)
    }

    #[test]
    fn valid_choose_one_is_admitted() {
        let fx = Fixture::new(VotingRule::ChooseOne, 2);
        let admitted = decide(&fx.choose_one(1), &fx.ctx()).unwrap();
        assert_eq!(admitted.activity_id, fx.activity.id);
        assert_eq!(admitted.selections, Selections::ChooseOne(fx.options[1].id));
    }

    #[test]
    fn valid_choose_all_is_admitted() {
        let fx = Fixture::new(VotingRule::ChooseAll, 3);
        let admitted = decide(&fx.choose_all(&["SUPPORT", "oppose", "NEUTRAL"]), &fx.ctx()).unwrap();
        match admitted.selections {
            Selections::ChooseAll(entries) => {
                let remarks: Vec<_> = entries.iter().map(|e| e.remark).collect();
                assert_eq!(remarks, [Remark::Support, Remark::Oppose, Remark::Neutral]);
            }
            other => panic!("unexpected selections {other:?}"),
        }
    }

    #[test]
    fn unknown_rule_is_reported_first() {
        let fx = Fixture::new(VotingRule::ChooseOne, 1);
        let mut submission = fx.choose_one(0);
        submission.rule = "ranked".to_string();
        let mut ctx = fx.ctx();
        ctx.eligible = false;
        assert_eq!(
            decide(&submission, &ctx),
            Err(VoteError::InvalidRule("ranked".to_string()))
        );
    }

    #[test]
    fn missing_or_empty_selection() {
        let fx = Fixture::new(VotingRule::ChooseAll, 1);
        let mut submission = fx.choose_all(&[]);
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::MissingSelection));
        submission.choose_all = None;
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::MissingSelection));

        // A choose-one payload does not satisfy a choose-all declaration.
        let mut submission = fx.choose_one(0);
        submission.rule = "choose_all".to_string();
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::MissingSelection));

        let mut submission = fx.choose_one(0);
        submission.choose_one = Some("  ".to_string());
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::MissingSelection));
    }

    #[test]
    fn invalid_remark_precedes_eligibility() {
        let fx = Fixture::new(VotingRule::ChooseAll, 2);
        let mut ctx = fx.ctx();
        ctx.eligible = false;
        assert_eq!(
            decide(&fx.choose_all(&["SUPPORT", "MAYBE"]), &ctx),
            Err(VoteError::InvalidRemark("MAYBE".to_string()))
        );
    }

    #[test]
    fn ineligible_voter_precedes_missing_activity() {
        let fx = Fixture::new(VotingRule::ChooseOne, 1);
        let ctx = AdmissionContext {
            eligible: false,
            activity: None,
            ..fx.ctx()
        };
        assert_eq!(decide(&fx.choose_one(0), &ctx), Err(VoteError::NotEligible));
    }

    #[test]
    fn missing_activity() {
        let fx = Fixture::new(VotingRule::ChooseOne, 1);
        let ctx = AdmissionContext {
            activity: None,
            ..fx.ctx()
        };
        assert_eq!(decide(&fx.choose_one(0), &ctx), Err(VoteError::ActivityNotFound));

        let mut submission = fx.choose_one(0);
        submission.activity_id = "garbage".to_string();
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::ActivityNotFound));

        // The loaded activity must be the one the ballot names.
        let mut submission = fx.choose_one(0);
        submission.activity_id = Id::new().to_hex();
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::ActivityNotFound));
    }

    #[test]
    fn options_must_belong_to_the_activity() {
        let fx = Fixture::new(VotingRule::ChooseOne, 2);
        let other = Fixture::new(VotingRule::ChooseOne, 1);
        let submission = BallotSubmission::choose_one(fx.activity.id, other.option(0));
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::InvalidOptions));

        let submission = BallotSubmission::choose_one(fx.activity.id, "not-an-id");
        assert_eq!(decide(&submission, &fx.ctx()), Err(VoteError::InvalidOptions));
    }

    #[test]
    fn choose_all_must_cover_every_option_exactly_once() {
        let fx = Fixture::new(VotingRule::ChooseAll, 3);
        // Incomplete.
        assert_eq!(
            decide(&fx.choose_all(&["SUPPORT", "OPPOSE"]), &fx.ctx()),
            Err(VoteError::InvalidOptions)
        );
        // Duplicated.
        let duplicate = BallotSubmission::choose_all(
            fx.activity.id,
            [
                (fx.option(0), "SUPPORT"),
                (fx.option(0), "OPPOSE"),
                (fx.option(1), "NEUTRAL"),
            ],
        );
        assert_eq!(decide(&duplicate, &fx.ctx()), Err(VoteError::InvalidOptions));
    }

    #[test]
    fn option_deleted_from_activity_is_invalid() {
        let mut fx = Fixture::new(VotingRule::ChooseOne, 2);
        fx.activity.option_ids.retain(|id| *id != fx.options[1].id);
        assert_eq!(decide(&fx.choose_one(1), &fx.ctx()), Err(VoteError::InvalidOptions));
    }

    #[test]
    fn invalid_options_precede_already_voted() {
        let fx = Fixture::new(VotingRule::ChooseOne, 1);
        let ctx = AdmissionContext {
            already_voted: true,
            ..fx.ctx()
        };
        let submission = BallotSubmission::choose_one(fx.activity.id, Id::new());
        assert_eq!(decide(&submission, &ctx), Err(VoteError::InvalidOptions));
        assert_eq!(decide(&fx.choose_one(0), &ctx), Err(VoteError::AlreadyVoted));
    }

    #[test]
    fn already_voted_precedes_window() {
        let fx = Fixture::new(VotingRule::ChooseOne, 1);
        let ctx = AdmissionContext {
            already_voted: true,
            now: fx.activity.open_to + Duration::days(1),
            ..fx.ctx()
        };
        assert_eq!(decide(&fx.choose_one(0), &ctx), Err(VoteError::AlreadyVoted));
    }

    #[test]
    fn window_is_enforced_with_inclusive_bounds() {
        let fx = Fixture::new(VotingRule::ChooseOne, 1);
        let submission = fx.choose_one(0);
        let at = |now| AdmissionContext { now, ..fx.ctx() };

        assert_eq!(
            decide(&submission, &at(fx.activity.open_from - Duration::milliseconds(1))),
            Err(VoteError::NotStarted)
        );
        assert!(decide(&submission, &at(fx.activity.open_from)).is_ok());
        assert!(decide(&submission, &at(fx.activity.open_to)).is_ok());
        assert_eq!(
            decide(&submission, &at(fx.activity.open_to + Duration::milliseconds(1))),
            Err(VoteError::VotingEnded)
        );
    }

    #[test]
    fn declared_rule_must_match_activity_rule() {
        // A choose-one ballot against a choose-all activity.
        let fx = Fixture::new(VotingRule::ChooseAll, 1);
        assert_eq!(decide(&fx.choose_one(0), &fx.ctx()), Err(VoteError::RuleMismatch));

        // A choose-all ballot covering the single option of a choose-one activity.
        let fx = Fixture::new(VotingRule::ChooseOne, 1);
        assert_eq!(
            decide(&fx.choose_all(&["SUPPORT"]), &fx.ctx()),
            Err(VoteError::RuleMismatch)
        );
    }

    #[test]
    fn window_precedes_rule_mismatch() {
        let fx = Fixture::new(VotingRule::ChooseAll, 1);
        let ctx = AdmissionContext {
            now: fx.activity.open_from - Duration::minutes(5),
            ..fx.ctx()
        };
        assert_eq!(decide(&fx.choose_one(0), &ctx), Err(VoteError::NotStarted));
    }

    #[test]
    fn payload_check_keeps_raw_option_ids() {
        let submission = BallotSubmission {
            activity_id: " 65f0c0ffee0ddba11ca7f00d ".to_string(),
            rule: "CHOOSE_ALL".to_string(),
            choose_all: Some(vec![RemarkSubmission {
                option_id: "anything".to_string(),
                remark: "support".to_string(),
            }]),
            choose_one: Some("ignored".to_string()),
        };
        let declared = check_payload(&submission).unwrap();
        assert_eq!(declared.rule, VotingRule::ChooseAll);
        assert!(declared.activity_id.is_some());
        assert_eq!(
            declared.selections,
            DeclaredSelections::ChooseAll(vec![("anything".to_string(), Remark::Support)])
        );
    }
}
