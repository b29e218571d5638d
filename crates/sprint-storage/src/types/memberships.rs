//! Membership record types and the guarded change set applied by backends.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GroupId, MemberId};

/// Lifecycle state of a (group, member) membership record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipState {
    Request,
    Leader,
    Accept,
    Reject,
    Cancel,
    Leave,
}

/// Error type for parsing MembershipState from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMembershipStateError(pub String);

impl std::fmt::Display for ParseMembershipStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid membership state: {}", self.0)
    }
}

impl std::error::Error for ParseMembershipStateError {}

impl FromStr for MembershipState {
    type Err = ParseMembershipStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REQUEST" => Ok(MembershipState::Request),
            "LEADER" => Ok(MembershipState::Leader),
            "ACCEPT" => Ok(MembershipState::Accept),
            "REJECT" => Ok(MembershipState::Reject),
            "CANCEL" => Ok(MembershipState::Cancel),
            "LEAVE" => Ok(MembershipState::Leave),
            _ => Err(ParseMembershipStateError(s.to_string())),
        }
    }
}

impl std::fmt::Display for MembershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MembershipState {
    /// States that count towards a group's roster.
    pub const ROSTER: [MembershipState; 2] = [MembershipState::Leader, MembershipState::Accept];

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Request => "REQUEST",
            MembershipState::Leader => "LEADER",
            MembershipState::Accept => "ACCEPT",
            MembershipState::Reject => "REJECT",
            MembershipState::Cancel => "CANCEL",
            MembershipState::Leave => "LEAVE",
        }
    }

    /// Terminal states end a record instance; only a fresh join request revives the key.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MembershipState::Reject | MembershipState::Cancel | MembershipState::Leave
        )
    }

    pub fn is_roster(&self) -> bool {
        matches!(self, MembershipState::Leader | MembershipState::Accept)
    }
}

/// Membership record, keyed by (group_id, member_id).
#[derive(Clone, Debug, PartialEq)]
pub struct MembershipRecord {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub state: MembershipState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One guarded record write.
///
/// `expected: None` means the record must not exist yet (insert); otherwise the
/// record must currently be in `expected` (compare-and-set update).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTransition {
    pub member_id: MemberId,
    pub expected: Option<MembershipState>,
    pub next: MembershipState,
}

/// Guarded update of `groups.leader_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderChange {
    pub from: MemberId,
    pub to: MemberId,
}

/// A set of writes a backend must apply atomically.
///
/// Transitions are applied in order. If any guard fails the backend rolls back
/// everything and returns `StoreError::Conflict`; a personnel delta that would
/// leave the group outside `1..=max_personnel` yields `StoreError::CapacityExceeded`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipChange {
    pub group_id: GroupId,
    pub transitions: Vec<StateTransition>,
    pub personnel_delta: i32,
    pub leader_change: Option<LeaderChange>,
}

impl MembershipChange {
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            transitions: Vec::new(),
            personnel_delta: 0,
            leader_change: None,
        }
    }

    pub fn transition(
        mut self,
        member_id: MemberId,
        expected: Option<MembershipState>,
        next: MembershipState,
    ) -> Self {
        self.transitions.push(StateTransition {
            member_id,
            expected,
            next,
        });
        self
    }

    pub fn personnel(mut self, delta: i32) -> Self {
        self.personnel_delta += delta;
        self
    }

    pub fn leader(mut self, from: MemberId, to: MemberId) -> Self {
        self.leader_change = Some(LeaderChange { from, to });
        self
    }
}
