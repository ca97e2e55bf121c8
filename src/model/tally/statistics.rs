use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    activity::{Activity, ActivityKind, VotingRule},
    ballot::{Ballot, Remark, Selections},
    mongodb::Id,
    vote_option::VoteOption,
};

/// Aggregated results of one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub activity: ActivityHeader,
    pub statistics: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityHeader {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub rule: VotingRule,
    pub open_from: DateTime<Utc>,
    pub open_to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_votes: u64,
    /// Size of the roster current when the statistics are computed, not
    /// when voting took place. Replacing the roster after an election
    /// changes this figure, and turnout can then exceed 100%.
    pub total_eligible_voters: u64,
    /// Identities recorded as having voted in this activity.
    pub total_voted: u64,
    /// Percentage with two decimals, e.g. `"42.86"`.
    pub turnout_rate: String,
    pub option_stats: Vec<OptionStat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionStat {
    pub option_id: String,
    pub name: String,
    pub support: u64,
    pub oppose: u64,
    pub neutral: u64,
    pub total: u64,
}

impl OptionStat {
    fn new(option: &VoteOption) -> Self {
        Self {
            option_id: option.id.to_hex(),
            name: option.name.clone(),
            support: 0,
            oppose: 0,
            neutral: 0,
            total: 0,
        }
    }

    fn count(&mut self, remark: Remark) {
        self.total += 1;
        match remark {
            Remark::Support => self.support += 1,
            Remark::Oppose => self.oppose += 1,
            Remark::Neutral => self.neutral += 1,
        }
    }
}

/// Fold the committed ballots of `activity` into per-option counts.
///
/// `options` are reported in the order given. Selections naming an option
/// not in `options`, or shaped for the other rule, are not counted.
pub fn compute_statistics(
    activity: &Activity,
    options: &[VoteOption],
    ballots: &[Ballot],
    eligible_voters: u64,
    voted: u64,
) -> Statistics {
    let mut stats: Vec<OptionStat> = options.iter().map(OptionStat::new).collect();
    let slots: HashMap<Id, usize> = options
        .iter()
        .enumerate()
        .map(|(slot, option)| (option.id, slot))
        .collect();

    for ballot in ballots {
        match (&activity.rule, &ballot.selections) {
            (VotingRule::ChooseAll, Selections::ChooseAll(entries)) => {
                for entry in entries {
                    if let Some(&slot) = slots.get(&entry.option_id) {
                        stats[slot].count(entry.remark);
                    }
                }
            }
            // Choosing one option is support with no opposition.
            (VotingRule::ChooseOne, Selections::ChooseOne(option_id)) => {
                if let Some(&slot) = slots.get(option_id) {
                    stats[slot].count(Remark::Support);
                }
            }
            _ => {}
        }
    }

    let total_votes = ballots.len() as u64;
    Statistics {
        activity: ActivityHeader {
            id: activity.id.to_hex(),
            name: activity.name.clone(),
            kind: activity.kind,
            rule: activity.rule,
            open_from: activity.open_from,
            open_to: activity.open_to,
        },
        statistics: Totals {
            total_votes,
            total_eligible_voters: eligible_voters,
            total_voted: voted,
            turnout_rate: turnout_rate(total_votes, eligible_voters),
            option_stats: stats,
        },
    }
}

fn turnout_rate(votes: u64, eligible: u64) -> String {
    let rate = if eligible > 0 {
        votes as f64 / eligible as f64 * 100.0
    } else {
        0.0
    };
    format!("{rate:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        activity::ActivitySpec,
        ballot::{ProofToken, RemarkedOption},
    };

    fn activity_with(spec: ActivitySpec, options: &[VoteOption]) -> Activity {
        let mut activity = spec.into_activity().unwrap();
        activity.option_ids = options.iter().map(|o| o.id).collect();
        activity
    }

    fn token() -> ProofToken {
        ProofToken::generate(rand::thread_rng())
    }

    #[test]
    fn choose_all_counts_each_remark() {
        let activity_id = Id::new();
        let option = VoteOption::new(activity_id, "Motion", None);
        let activity = activity_with(ActivitySpec::open_choose_all(), &[option.clone()]);

        let ballots: Vec<_> = [Remark::Support, Remark::Oppose, Remark::Neutral]
            .into_iter()
            .map(|remark| {
                Ballot::new(
                    token(),
                    activity.id,
                    Selections::ChooseAll(vec![RemarkedOption {
                        option_id: option.id,
                        remark,
                    }]),
                )
            })
            .collect();

        let stats = compute_statistics(&activity, &[option.clone()], &ballots, 10, 3);
        assert_eq!(
            stats.statistics.option_stats,
            vec![OptionStat {
                option_id: option.id.to_hex(),
                name: "Motion".to_string(),
                support: 1,
                oppose: 1,
                neutral: 1,
                total: 3,
            }]
        );
        assert_eq!(stats.statistics.total_votes, 3);
        assert_eq!(stats.statistics.turnout_rate, "30.00");
    }

    #[test]
    fn choose_one_counts_support_only() {
        let activity_id = Id::new();
        let a = VoteOption::new(activity_id, "A", None);
        let b = VoteOption::new(activity_id, "B", None);
        let options = vec![a.clone(), b.clone()];
        let activity = activity_with(ActivitySpec::open_choose_one(), &options);

        let ballots: Vec<_> = [&a, &a, &b, &a, &b]
            .into_iter()
            .map(|o| Ballot::new(token(), activity.id, Selections::ChooseOne(o.id)))
            .collect();

        let stats = compute_statistics(&activity, &options, &ballots, 7, 5);
        let counts: Vec<_> = stats
            .statistics
            .option_stats
            .iter()
            .map(|s| (s.name.as_str(), s.support, s.oppose, s.neutral, s.total))
            .collect();
        assert_eq!(counts, vec![("A", 3, 0, 0, 3), ("B", 2, 0, 0, 2)]);
        assert_eq!(stats.statistics.total_votes, 5);
        assert_eq!(stats.statistics.total_voted, 5);
        assert_eq!(stats.statistics.turnout_rate, "71.43");
    }

    #[test]
    fn unknown_and_mismatched_selections_ignored() {
        let activity_id = Id::new();
        let a = VoteOption::new(activity_id, "A", None);
        let activity = activity_with(ActivitySpec::open_choose_one(), &[a.clone()]);

        let ballots = vec![
            Ballot::new(token(), activity.id, Selections::ChooseOne(Id::new())),
            Ballot::new(
                token(),
                activity.id,
                Selections::ChooseAll(vec![RemarkedOption {
                    option_id: a.id,
                    remark: Remark::Support,
                }]),
            ),
        ];

        let stats = compute_statistics(&activity, &[a], &ballots, 0, 2);
        assert_eq!(stats.statistics.option_stats[0].total, 0);
        assert_eq!(stats.statistics.total_votes, 2);
    }

    #[test]
    fn no_roster_means_zero_turnout() {
        let activity = activity_with(ActivitySpec::open_choose_one(), &[]);
        let stats = compute_statistics(&activity, &[], &[], 0, 0);
        assert_eq!(stats.statistics.turnout_rate, "0.00");
        assert!(stats.statistics.option_stats.is_empty());
    }

    #[test]
    fn turnout_follows_current_roster() {
        assert_eq!(turnout_rate(3, 4), "75.00");
        // Roster shrank after three ballots were cast.
        assert_eq!(turnout_rate(3, 2), "150.00");
    }

    #[test]
    fn recomputing_gives_identical_output() {
        let activity_id = Id::new();
        let a = VoteOption::new(activity_id, "A", None);
        let b = VoteOption::new(activity_id, "B", None);
        let options = vec![a.clone(), b.clone()];
        let activity = activity_with(ActivitySpec::open_choose_one(), &options);
        let mut ballots: Vec<_> = [&a, &b, &b]
            .into_iter()
            .map(|o| Ballot::new(token(), activity.id, Selections::ChooseOne(o.id)))
            .collect();

        let first = compute_statistics(&activity, &options, &ballots, 3, 3);
        let second = compute_statistics(&activity, &options, &ballots, 3, 3);
        assert_eq!(first, second);

        // Order of ballots does not matter.
        ballots.reverse();
        assert_eq!(first, compute_statistics(&activity, &options, &ballots, 3, 3));
    }

    #[test]
    fn statistics_field_names() {
        let activity = activity_with(ActivitySpec::open_choose_one(), &[]);
        let json = rocket::serde::json::serde_json::to_value(compute_statistics(&activity, &[], &[], 0, 0)).unwrap();
        let totals = json["statistics"].as_object().unwrap();
        for key in ["totalVotes", "totalEligibleVoters", "totalVoted", "turnoutRate", "optionStats"] {
            assert!(totals.contains_key(key), "missing {key}");
        }
        assert!(json["activity"]["type"].is_string());
        assert!(json["statistics"]["turnoutRate"].is_string());
    }
}
