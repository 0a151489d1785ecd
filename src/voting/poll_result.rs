use std::collections::HashSet;

use serde::Serialize;

use super::id::PollId;
use super::poll::Poll;
use super::vote::Vote;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OptionTally {
    pub option: String,
    pub count: u64,
    pub percentage: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PollResult {
    pub poll_id: PollId,
    pub total_votes: u64,
    pub tally: Vec<OptionTally>,
}

impl PollResult {
    pub fn evaluate(poll: &Poll, votes: &[Vote]) -> PollResult {
        PollResult {
            poll_id: poll.id,
            total_votes: distinct(votes).len() as u64,
            tally: aggregate(&poll.options, votes),
        }
    }
}

/// Tallies `votes` against `options`, in option order.
///
/// A vote counts toward every option its selection contains, so the counts
/// may sum to more than the number of votes. Votes sharing an id are counted
/// once. Labels that match no option (for instance after the poll's options
/// were edited) contribute to the total but to no option.
pub fn aggregate(options: &[String], votes: &[Vote]) -> Vec<OptionTally> {
    let votes = distinct(votes);
    let total = votes.len() as u64;

    options.iter()
        .map(|option| {
            let count = votes.iter().filter(|vote| vote.selects(option)).count() as u64;
            OptionTally {
                option: option.clone(),
                count,
                percentage: percentage(count, total),
            }
        })
        .collect()
}

fn distinct(votes: &[Vote]) -> Vec<&Vote> {
    let mut seen = HashSet::with_capacity(votes.len());
    votes.iter().filter(|vote| seen.insert(vote.id)).collect()
}

// rounds half up, matching the browser's Math.round for non-negative values
fn percentage(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((count * 200 + total) / (total * 2)) as u32
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::voting::{AnonymousId, PollSettings, VoteId, Voter};

    fn options(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    fn vote(poll_id: PollId, selected: &[&str]) -> Vote {
        Vote {
            id: VoteId::new(),
            poll_id,
            voter: Voter::Anonymous(AnonymousId(String::from("anon_test"))),
            selected_options: options(selected),
            created_at: Utc::now(),
        }
    }

    fn tally(option: &str, count: u64, percentage: u32) -> OptionTally {
        OptionTally { option: option.to_string(), count, percentage }
    }

    #[test]
    fn red_blue_scenario() {
        let id = PollId::new();
        let votes = vec![vote(id, &["Red"]), vote(id, &["Blue"]), vote(id, &["Red"])];

        let result = aggregate(&options(&["Red", "Blue"]), &votes);
        assert_eq!(result, vec![tally("Red", 2, 67), tally("Blue", 1, 33)]);
    }

    #[test]
    fn order_follows_options_not_counts() {
        let id = PollId::new();
        let votes = vec![vote(id, &["C"]), vote(id, &["C"]), vote(id, &["A"])];

        let result = aggregate(&options(&["A", "B", "C"]), &votes);
        let labels: Vec<&str> = result.iter().map(|t| t.option.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
    }

    #[test]
    fn no_votes_is_zero_percent() {
        let result = aggregate(&options(&["Red", "Blue"]), &[]);
        assert_eq!(result, vec![tally("Red", 0, 0), tally("Blue", 0, 0)]);
    }

    #[test]
    fn no_options_is_empty() {
        let id = PollId::new();
        assert!(aggregate(&[], &[vote(id, &["Red"])]).is_empty());
        assert!(aggregate(&[], &[]).is_empty());
    }

    #[test]
    fn multi_select_counts_every_option() {
        let id = PollId::new();
        // a single-choice poll should never receive this, but tallying must cope
        let votes = vec![vote(id, &["Red", "Blue"]), vote(id, &["Red"])];

        let result = aggregate(&options(&["Red", "Blue"]), &votes);
        assert_eq!(result, vec![tally("Red", 2, 100), tally("Blue", 1, 50)]);
    }

    #[test]
    fn same_vote_counted_once() {
        let id = PollId::new();
        let first = vote(id, &["Red"]);
        let votes = vec![first.clone(), first, vote(id, &["Blue"])];

        let result = aggregate(&options(&["Red", "Blue"]), &votes);
        assert_eq!(result, vec![tally("Red", 1, 50), tally("Blue", 1, 50)]);
    }

    #[test]
    fn orphaned_labels_only_count_toward_total() {
        let id = PollId::new();
        let votes = vec![vote(id, &["Crimson"]), vote(id, &["Blue"])];

        let result = aggregate(&options(&["Red", "Blue"]), &votes);
        assert_eq!(result, vec![tally("Red", 0, 0), tally("Blue", 1, 50)]);
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(3, 3), 100);
    }

    #[test]
    fn evaluate_is_idempotent() {
        let poll = Poll {
            id: PollId::new(),
            question: String::from("Colour?"),
            options: options(&["Red", "Blue", "Green"]),
            settings: PollSettings { allow_multiple: true, show_results: true },
            created_by: None,
            created_at: Utc::now(),
            ends_at: None,
        };
        let votes = vec![vote(poll.id, &["Red", "Green"]), vote(poll.id, &["Blue"])];

        let first = PollResult::evaluate(&poll, &votes);
        let second = PollResult::evaluate(&poll, &votes);
        assert_eq!(first, second);
        assert_eq!(first.total_votes, 2);
    }
}
