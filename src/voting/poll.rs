use std::convert::TryFrom;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{PollId, UserId};
use crate::error::{self, ValidationError};

pub const OPTION_LIMITS: RangeInclusive<usize> = 2..=10;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollSettings {
    pub allow_multiple: bool,
    pub show_results: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            allow_multiple: false,
            show_results: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub options: Vec<String>,
    pub settings: PollSettings,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl Poll {
    /// A poll is expired once `ends_at` lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.ends_at, Some(ends_at) if ends_at < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.created_by.as_ref() == Some(user)
    }
}

/// Poll creation form as submitted, before trimming and option-count checks.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnvalidatedCreatePoll {
    pub question: String,
    pub options: Vec<String>,
    pub settings: PollSettings,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreatePoll {
    pub question: String,
    pub options: Vec<String>,
    pub settings: PollSettings,
    pub ends_at: Option<DateTime<Utc>>,
}

impl TryFrom<UnvalidatedCreatePoll> for CreatePoll {
    type Error = ValidationError;
    fn try_from(value: UnvalidatedCreatePoll) -> Result<Self, Self::Error> {
        let UnvalidatedCreatePoll { question, options, settings, ends_at } = value;

        Ok(CreatePoll {
            question: validate_question(&question)?,
            options: validate_options(&options)?,
            settings,
            ends_at,
        })
    }
}

/// A validated poll bound to its (possibly absent) creator, ready to insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    pub settings: PollSettings,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
}

impl NewPoll {
    pub fn new(create: CreatePoll, created_by: Option<UserId>) -> NewPoll {
        let CreatePoll { question, options, settings, ends_at } = create;
        NewPoll { question, options, settings, ends_at, created_by }
    }
}

/// Edit form as submitted. Absent fields are left untouched; `ends_at` uses
/// `Some(None)` to clear the end date.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnvalidatedPollChanges {
    pub question: Option<String>,
    pub options: Option<Vec<String>>,
    pub settings: Option<PollSettings>,
    #[serde(deserialize_with = "double_option")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollChanges {
    pub question: Option<String>,
    pub options: Option<Vec<String>>,
    pub settings: Option<PollSettings>,
    pub ends_at: Option<Option<DateTime<Utc>>>,
}

impl TryFrom<UnvalidatedPollChanges> for PollChanges {
    type Error = ValidationError;
    fn try_from(value: UnvalidatedPollChanges) -> Result<Self, Self::Error> {
        let UnvalidatedPollChanges { question, options, settings, ends_at } = value;

        if question.is_none() && options.is_none() && settings.is_none() && ends_at.is_none() {
            return Err(error::poll_changes_empty());
        }

        Ok(PollChanges {
            question: question.as_deref().map(validate_question).transpose()?,
            options: options.as_deref().map(validate_options).transpose()?,
            settings,
            ends_at,
        })
    }
}

impl PollChanges {
    pub fn apply_to(self, poll: &mut Poll) {
        if let Some(question) = self.question {
            poll.question = question;
        }
        if let Some(options) = self.options {
            poll.options = options;
        }
        if let Some(settings) = self.settings {
            poll.settings = settings;
        }
        if let Some(ends_at) = self.ends_at {
            poll.ends_at = ends_at;
        }
    }
}

fn validate_question(question: &str) -> Result<String, ValidationError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(error::poll_question_empty());
    }
    Ok(question.to_string())
}

/// Blank entries are dropped before counting, so padding a single real
/// option with empty rows never satisfies the lower bound.
fn validate_options(options: &[String]) -> Result<Vec<String>, ValidationError> {
    let options: Vec<String> = options.iter()
        .map(|option| option.trim())
        .filter(|option| !option.is_empty())
        .map(String::from)
        .collect();

    if !OPTION_LIMITS.contains(&options.len()) {
        return Err(error::poll_option_limit_exceeded(OPTION_LIMITS, options.len()));
    }
    Ok(options)
}

// distinguishes an explicit `null` from a missing field
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn form(options: &[&str]) -> UnvalidatedCreatePoll {
        UnvalidatedCreatePoll {
            question: String::from("  Favourite colour?  "),
            options: options.iter().map(|o| o.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_two_to_ten_options() {
        for n in 0..=12usize {
            let labels: Vec<String> = (0..n).map(|i| format!("Option {i}")).collect();
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            let result = CreatePoll::try_from(form(&labels));
            assert_eq!(result.is_ok(), (2..=10).contains(&n), "{n} options");
        }
    }

    #[test]
    fn blank_padding_does_not_count() {
        let result = CreatePoll::try_from(form(&["Red", "", "   ", "\t"]));
        assert_eq!(result, Err(error::poll_option_limit_exceeded(OPTION_LIMITS, 1)));
    }

    #[test]
    fn trims_question_and_options() {
        let poll = CreatePoll::try_from(form(&[" Red ", "", "Blue"])).unwrap();
        assert_eq!(poll.question, "Favourite colour?");
        assert_eq!(poll.options, vec!["Red", "Blue"]);
        assert_eq!(poll.settings, PollSettings { allow_multiple: false, show_results: true });
    }

    #[test]
    fn rejects_blank_question() {
        let mut form = form(&["Red", "Blue"]);
        form.question = String::from("   ");
        assert_eq!(CreatePoll::try_from(form), Err(error::poll_question_empty()));
    }

    #[test]
    fn empty_changes_rejected() {
        let result = PollChanges::try_from(UnvalidatedPollChanges::default());
        assert_eq!(result, Err(error::poll_changes_empty()));
    }

    #[test]
    fn changes_revalidate_options() {
        let changes = UnvalidatedPollChanges {
            options: Some(vec![String::from("Only"), String::new()]),
            ..Default::default()
        };
        assert!(PollChanges::try_from(changes).is_err());
    }

    #[test]
    fn changes_distinguish_null_end_date() {
        let cleared: UnvalidatedPollChanges = serde_json::from_str(r#"{"ends_at": null}"#).unwrap();
        assert_eq!(cleared.ends_at, Some(None));

        let untouched: UnvalidatedPollChanges = serde_json::from_str(r#"{"question": "Q"}"#).unwrap();
        assert_eq!(untouched.ends_at, None);
    }

    #[test]
    fn expiry_is_strict() {
        let now = Utc::now();
        let mut poll = Poll {
            id: PollId::new(),
            question: String::from("Q"),
            options: vec![String::from("A"), String::from("B")],
            settings: PollSettings::default(),
            created_by: None,
            created_at: now,
            ends_at: None,
        };
        assert!(!poll.is_expired_at(now));

        poll.ends_at = Some(now);
        assert!(!poll.is_expired_at(now));

        poll.ends_at = Some(now - Duration::seconds(1));
        assert!(poll.is_expired_at(now));
    }
}
