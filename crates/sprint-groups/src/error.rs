use sprint_storage::{GroupId, MemberId, StoreError};
use thiserror::Error;

use crate::statistics::StatisticsError;

/// Errors surfaced by the membership state machine and the group service.
///
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group {group_id} not found")]
    GroupNotFound { group_id: GroupId },

    #[error("member {member_id} not found")]
    MemberNotFound { member_id: MemberId },

    #[error("group name '{name}' is already taken")]
    GroupNameConflict { name: String },

    #[error("member {member_id} already belongs to or has a pending request for group {group_id}")]
    AlreadyMemberOrPending {
        group_id: GroupId,
        member_id: MemberId,
    },

    #[error("no pending join request from member {member_id} for group {group_id}")]
    NoPendingRequest {
        group_id: GroupId,
        member_id: MemberId,
    },

    #[error("member {member_id} is not a member of group {group_id}")]
    NotAGroupMember {
        group_id: GroupId,
        member_id: MemberId,
    },

    #[error("member {member_id} leads group {group_id} and cannot leave it")]
    LeaderCannotLeave {
        group_id: GroupId,
        member_id: MemberId,
    },

    #[error("member {member_id} is not the leader of group {group_id}")]
    NotGroupLeader {
        group_id: GroupId,
        member_id: MemberId,
    },

    #[error("group {group_id} is full ({max_personnel} members)")]
    GroupFull {
        group_id: GroupId,
        max_personnel: u32,
    },

    #[error("cannot answer the join request of member {member_id} in group {group_id} with '{requested}'")]
    InvalidTransitionRequest {
        group_id: GroupId,
        member_id: MemberId,
        requested: String,
    },

    #[error("capacity {requested} is below the required minimum of {minimum}")]
    InvalidCapacity { requested: u32, minimum: u32 },

    #[error(transparent)]
    Statistics(#[from] StatisticsError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl GroupError {
    /// Stable code for presentation layers.
    pub fn code(&self) -> &'static str {
        match self {
            GroupError::GroupNameConflict { .. } => "G0001",
            GroupError::GroupNotFound { .. } => "G0002",
            GroupError::NoPendingRequest { .. } => "G0003",
            GroupError::AlreadyMemberOrPending { .. } => "G0004",
            GroupError::LeaderCannotLeave { .. } => "G0005",
            GroupError::NotAGroupMember { .. } => "G0006",
            GroupError::NotGroupLeader { .. } => "G0007",
            GroupError::GroupFull { .. } => "G0008",
            GroupError::InvalidTransitionRequest { .. } => "G0009",
            GroupError::InvalidCapacity { .. } => "G0010",
            GroupError::MemberNotFound { .. } => "M0001",
            GroupError::Statistics(_) => "S0001",
            GroupError::Storage(_) => "X0001",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let g = GroupId(1);
        let m = MemberId(2);
        let cases = [
            (GroupError::GroupNameConflict { name: "x".into() }, "G0001"),
            (GroupError::GroupNotFound { group_id: g }, "G0002"),
            (
                GroupError::NoPendingRequest {
                    group_id: g,
                    member_id: m,
                },
                "G0003",
            ),
            (
                GroupError::AlreadyMemberOrPending {
                    group_id: g,
                    member_id: m,
                },
                "G0004",
            ),
            (
                GroupError::LeaderCannotLeave {
                    group_id: g,
                    member_id: m,
                },
                "G0005",
            ),
            (
                GroupError::NotAGroupMember {
                    group_id: g,
                    member_id: m,
                },
                "G0006",
            ),
            (
                GroupError::NotGroupLeader {
                    group_id: g,
                    member_id: m,
                },
                "G0007",
            ),
            (
                GroupError::GroupFull {
                    group_id: g,
                    max_personnel: 4,
                },
                "G0008",
            ),
            (GroupError::MemberNotFound { member_id: m }, "M0001"),
            (GroupError::Storage(StoreError::Conflict), "X0001"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn messages_carry_identifiers() {
        let err = GroupError::NoPendingRequest {
            group_id: GroupId(7),
            member_id: MemberId(42),
        };
        assert_eq!(
            err.to_string(),
            "no pending join request from member 42 for group 7"
        );
    }

    #[test]
    fn invalid_transition_names_group_and_member() {
        let err = GroupError::InvalidTransitionRequest {
            group_id: GroupId(3),
            member_id: MemberId(9),
            requested: "LEADER".into(),
        };
        assert_eq!(err.code(), "G0009");
        assert_eq!(
            err.to_string(),
            "cannot answer the join request of member 9 in group 3 with 'LEADER'"
        );
    }
}
