//! Operator-facing actions and what each one needs before it can run

use std::fmt;
use std::str::FromStr;

use crate::table::ActionTag;

pub const AUTH_RESPONSE_PROMPT: &str =
    "Insert the authentication-response for the received challenge";
pub const DISCONNECT_PROMPT: &str = "Confirm? [y/n]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Authentication,
    Open,
    Close,
    Sync,
    Read,
    Write,
    Disconnect,
}

/// Static description of one action
#[derive(Debug)]
pub struct ActionSpec {
    pub action: Action,
    /// Table rows that must be present
    pub required: &'static [ActionTag],
    /// Asked in order, before the action starts
    pub prompts: &'static [&'static str],
    /// Asked by the action itself once part of it has run
    pub deferred_prompts: &'static [&'static str],
}

/// One row per action, in menu order
pub static REGISTRY: [ActionSpec; 7] = [
    ActionSpec {
        action: Action::Authentication,
        required: &[ActionTag::GetChallenge, ActionTag::SendResponse],
        prompts: &[],
        deferred_prompts: &[AUTH_RESPONSE_PROMPT],
    },
    ActionSpec {
        action: Action::Open,
        required: &[ActionTag::Open],
        prompts: &[],
        deferred_prompts: &[],
    },
    ActionSpec {
        action: Action::Close,
        required: &[ActionTag::Close],
        prompts: &[],
        deferred_prompts: &[],
    },
    ActionSpec {
        action: Action::Sync,
        required: &[ActionTag::SyncSubscribe, ActionTag::SyncWrite],
        prompts: &[],
        deferred_prompts: &[],
    },
    ActionSpec {
        action: Action::Read,
        required: &[],
        prompts: &[
            "Insert the service uuid to read",
            "Insert the characteristic uuid to read",
        ],
        deferred_prompts: &[],
    },
    ActionSpec {
        action: Action::Write,
        required: &[],
        prompts: &[
            "Insert the service uuid to write",
            "Insert the characteristic uuid to write",
            "Insert the message to write",
        ],
        deferred_prompts: &[],
    },
    ActionSpec {
        action: Action::Disconnect,
        required: &[],
        prompts: &[DISCONNECT_PROMPT],
        deferred_prompts: &[],
    },
];

impl Action {
    pub fn menu() -> impl Iterator<Item = Action> {
        REGISTRY.iter().map(|spec| spec.action)
    }

    pub fn spec(self) -> &'static ActionSpec {
        match self {
            Action::Authentication => &REGISTRY[0],
            Action::Open => &REGISTRY[1],
            Action::Close => &REGISTRY[2],
            Action::Sync => &REGISTRY[3],
            Action::Read => &REGISTRY[4],
            Action::Write => &REGISTRY[5],
            Action::Disconnect => &REGISTRY[6],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Authentication => "Authentication",
            Action::Open => "Open",
            Action::Close => "Close",
            Action::Sync => "Sync",
            Action::Read => "Read",
            Action::Write => "Write",
            Action::Disconnect => "Disconnect",
        }
    }

    /// Whether the action can only run with a command table loaded
    pub fn needs_table(self) -> bool {
        !self.spec().required.is_empty()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Wrong action key: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Action::menu()
            .find(|action| action.name().eq_ignore_ascii_case(key))
            .ok_or_else(|| UnknownAction(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_rows_match_their_action() {
        for action in Action::menu() {
            assert_eq!(action.spec().action, action);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Open".parse::<Action>(), Ok(Action::Open));
        assert_eq!("  sync ".parse::<Action>(), Ok(Action::Sync));
        assert_eq!("AUTHENTICATION".parse::<Action>(), Ok(Action::Authentication));
    }

    #[test]
    fn unknown_action() {
        assert_eq!(
            "GetChallenge".parse::<Action>(),
            Err(UnknownAction("GetChallenge".to_string()))
        );
        assert_eq!("".parse::<Action>(), Err(UnknownAction(String::new())));
    }

    #[test]
    fn only_table_backed_actions_need_a_table() {
        let needing: Vec<_> = Action::menu().filter(|a| a.needs_table()).collect();
        assert_eq!(
            needing,
            vec![Action::Authentication, Action::Open, Action::Close, Action::Sync]
        );
    }

    #[test]
    fn write_prompts_for_address_and_payload() {
        assert_eq!(Action::Write.spec().prompts.len(), 3);
        assert_eq!(Action::Read.spec().prompts.len(), 2);
        assert!(Action::Authentication.spec().prompts.is_empty());
        assert_eq!(
            Action::Authentication.spec().deferred_prompts,
            &[AUTH_RESPONSE_PROMPT]
        );
    }
}
