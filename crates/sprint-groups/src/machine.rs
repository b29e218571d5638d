//! The membership state machine.
//!
//! Every mutating operation reads the current record, plans a
//! [`MembershipChange`] with one of the pure `plan_*` functions, and hands the
//! change to the store, which applies it under compare-and-set guards in a
//! single transaction. When a guard fails because a concurrent writer got there
//! first, the caller receives the error it would have seen had it arrived
//! second.
//!
//! ```text
//! (none) | REJECT | CANCEL | LEAVE --request--> REQUEST
//! REQUEST --answer(accept)--> ACCEPT --leave--> LEAVE
//! REQUEST --answer(reject)--> REJECT
//! REQUEST --cancel--> CANCEL
//! LEADER <--transfer--> ACCEPT
//! ```

use std::sync::Arc;

use serde::Serialize;
use sprint_storage::{
    CreateGroupParams, Group, GroupId, MemberId, MembershipChange, MembershipRecord,
    MembershipState, Store, StoreError, UpdateGroupParams,
};
use tracing::{debug, info, warn};

use crate::GroupError;

/// How a member relates to a group, as shown next to search results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipView {
    Leader,
    Member,
    NotMember,
    Request,
}

impl MembershipView {
    pub fn from_state(state: Option<MembershipState>) -> Self {
        match state {
            Some(MembershipState::Leader) => MembershipView::Leader,
            Some(MembershipState::Accept) => MembershipView::Member,
            Some(MembershipState::Request) => MembershipView::Request,
            Some(MembershipState::Reject | MembershipState::Cancel | MembershipState::Leave)
            | None => MembershipView::NotMember,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipView::Leader => "LEADER",
            MembershipView::Member => "MEMBER",
            MembershipView::NotMember => "NOT_MEMBER",
            MembershipView::Request => "REQUEST",
        }
    }
}

impl std::fmt::Display for MembershipView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ───────────────────────────────────── Planning ─────────────────────────────────────

/// A join request creates the record, or revives a terminal one.
pub fn plan_request(
    group: &Group,
    member_id: MemberId,
    current: Option<MembershipState>,
) -> Result<MembershipChange, GroupError> {
    match current {
        Some(state) if !state.is_terminal() => Err(GroupError::AlreadyMemberOrPending {
            group_id: group.id,
            member_id,
        }),
        expected => Ok(MembershipChange::new(group.id).transition(
            member_id,
            expected,
            MembershipState::Request,
        )),
    }
}

pub fn plan_answer(
    group: &Group,
    member_id: MemberId,
    current: Option<MembershipState>,
    accept: bool,
) -> Result<MembershipChange, GroupError> {
    if current != Some(MembershipState::Request) {
        return Err(GroupError::NoPendingRequest {
            group_id: group.id,
            member_id,
        });
    }

    let change = MembershipChange::new(group.id);
    if !accept {
        return Ok(change.transition(
            member_id,
            Some(MembershipState::Request),
            MembershipState::Reject,
        ));
    }

    if group.is_full() {
        return Err(GroupError::GroupFull {
            group_id: group.id,
            max_personnel: group.max_personnel,
        });
    }
    Ok(change
        .transition(
            member_id,
            Some(MembershipState::Request),
            MembershipState::Accept,
        )
        .personnel(1))
}

pub fn plan_cancel(
    group: &Group,
    member_id: MemberId,
    current: Option<MembershipState>,
) -> Result<MembershipChange, GroupError> {
    if current != Some(MembershipState::Request) {
        return Err(GroupError::NoPendingRequest {
            group_id: group.id,
            member_id,
        });
    }
    Ok(MembershipChange::new(group.id).transition(
        member_id,
        Some(MembershipState::Request),
        MembershipState::Cancel,
    ))
}

pub fn plan_leave(
    group: &Group,
    member_id: MemberId,
    current: Option<MembershipState>,
) -> Result<MembershipChange, GroupError> {
    if member_id == group.leader_id || current == Some(MembershipState::Leader) {
        return Err(GroupError::LeaderCannotLeave {
            group_id: group.id,
            member_id,
        });
    }
    if current != Some(MembershipState::Accept) {
        return Err(GroupError::NotAGroupMember {
            group_id: group.id,
            member_id,
        });
    }
    Ok(MembershipChange::new(group.id)
        .transition(
            member_id,
            Some(MembershipState::Accept),
            MembershipState::Leave,
        )
        .personnel(-1))
}

/// The demotion is ordered first: a group may never hold two `LEADER` records.
pub fn plan_transfer(
    group: &Group,
    current_leader: MemberId,
    new_leader: MemberId,
    new_leader_state: Option<MembershipState>,
) -> Result<MembershipChange, GroupError> {
    if group.leader_id != current_leader {
        return Err(GroupError::NotGroupLeader {
            group_id: group.id,
            member_id: current_leader,
        });
    }
    if new_leader_state != Some(MembershipState::Accept) {
        return Err(GroupError::NotAGroupMember {
            group_id: group.id,
            member_id: new_leader,
        });
    }
    Ok(MembershipChange::new(group.id)
        .transition(
            current_leader,
            Some(MembershipState::Leader),
            MembershipState::Accept,
        )
        .transition(
            new_leader,
            Some(MembershipState::Accept),
            MembershipState::Leader,
        )
        .leader(current_leader, new_leader))
}

/// A capacity must hold the current roster and at least the leader.
pub fn validate_capacity(requested: u32, personnel: u32) -> Result<(), GroupError> {
    let minimum = personnel.max(1);
    if requested < minimum {
        return Err(GroupError::InvalidCapacity { requested, minimum });
    }
    Ok(())
}

fn map_commit_error(
    group: &Group,
    change: &MembershipChange,
    err: StoreError,
    on_conflict: GroupError,
) -> GroupError {
    match err {
        StoreError::Conflict => {
            warn!(
                group_id = %group.id,
                error = %on_conflict,
                "membership change lost to a concurrent update"
            );
            on_conflict
        }
        StoreError::CapacityExceeded if change.personnel_delta > 0 => GroupError::GroupFull {
            group_id: group.id,
            max_personnel: group.max_personnel,
        },
        StoreError::NotFound => GroupError::GroupNotFound { group_id: group.id },
        other => GroupError::Storage(other),
    }
}

// ───────────────────────────────────── Machine ──────────────────────────────────────

/// Validates and commits membership transitions.
///
/// Group and member existence are resolved by the caller; the machine only
/// trusts the `Group` it is handed for pre-checks and relies on the store's
/// guards for anything that may have changed since.
#[derive(Clone)]
pub struct MembershipStateMachine {
    store: Arc<dyn Store>,
}

impl MembershipStateMachine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn current_state(
        &self,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Result<Option<MembershipState>, GroupError> {
        match self.store.get_membership(&group_id, &member_id).await {
            Ok(record) => Ok(Some(record.state)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fails with `GroupNameConflict` if a group already has exactly this name.
    pub async fn ensure_name_available(&self, name: &str) -> Result<(), GroupError> {
        match self.store.get_group_by_name(name).await {
            Ok(_) => Err(GroupError::GroupNameConflict {
                name: name.to_string(),
            }),
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates the group with its leader in `LEADER` and personnel 1.
    ///
    /// Callers check [`ensure_name_available`](Self::ensure_name_available)
    /// first; the unique constraint catches anything that slips between.
    pub async fn create_group(&self, params: &CreateGroupParams) -> Result<Group, GroupError> {
        validate_capacity(params.max_personnel, 1)?;

        let group = self
            .store
            .create_group(params)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => GroupError::GroupNameConflict {
                    name: params.name.clone(),
                },
                other => GroupError::Storage(other),
            })?;

        info!(
            group_id = %group.id,
            member_id = %group.leader_id,
            to = %MembershipState::Leader,
            "group created"
        );
        Ok(group)
    }

    pub async fn request_join(
        &self,
        group: &Group,
        member_id: MemberId,
    ) -> Result<Group, GroupError> {
        let current = self.current_state(group.id, member_id).await?;
        let change = plan_request(group, member_id, current)?;

        let updated = self
            .store
            .apply_membership_change(&change)
            .await
            .map_err(|e| {
                map_commit_error(
                    group,
                    &change,
                    e,
                    GroupError::AlreadyMemberOrPending {
                        group_id: group.id,
                        member_id,
                    },
                )
            })?;

        info!(
            group_id = %group.id,
            member_id = %member_id,
            from = ?current,
            to = %MembershipState::Request,
            "join requested"
        );
        Ok(updated)
    }

    pub async fn answer(
        &self,
        group: &Group,
        member_id: MemberId,
        accept: bool,
    ) -> Result<Group, GroupError> {
        let current = self.current_state(group.id, member_id).await?;
        let change = plan_answer(group, member_id, current, accept)?;

        let updated = self
            .store
            .apply_membership_change(&change)
            .await
            .map_err(|e| {
                map_commit_error(
                    group,
                    &change,
                    e,
                    GroupError::NoPendingRequest {
                        group_id: group.id,
                        member_id,
                    },
                )
            })?;

        let to = if accept {
            MembershipState::Accept
        } else {
            MembershipState::Reject
        };
        info!(
            group_id = %group.id,
            member_id = %member_id,
            from = %MembershipState::Request,
            to = %to,
            personnel = updated.personnel,
            "join request answered"
        );
        Ok(updated)
    }

    pub async fn cancel(&self, group: &Group, member_id: MemberId) -> Result<Group, GroupError> {
        let current = self.current_state(group.id, member_id).await?;
        let change = plan_cancel(group, member_id, current)?;

        let updated = self
            .store
            .apply_membership_change(&change)
            .await
            .map_err(|e| {
                map_commit_error(
                    group,
                    &change,
                    e,
                    GroupError::NoPendingRequest {
                        group_id: group.id,
                        member_id,
                    },
                )
            })?;

        info!(
            group_id = %group.id,
            member_id = %member_id,
            from = %MembershipState::Request,
            to = %MembershipState::Cancel,
            "join request cancelled"
        );
        Ok(updated)
    }

    pub async fn leave(&self, group: &Group, member_id: MemberId) -> Result<Group, GroupError> {
        let current = self.current_state(group.id, member_id).await?;
        let change = plan_leave(group, member_id, current)?;

        let updated = self
            .store
            .apply_membership_change(&change)
            .await
            .map_err(|e| {
                map_commit_error(
                    group,
                    &change,
                    e,
                    GroupError::NotAGroupMember {
                        group_id: group.id,
                        member_id,
                    },
                )
            })?;

        info!(
            group_id = %group.id,
            member_id = %member_id,
            from = %MembershipState::Accept,
            to = %MembershipState::Leave,
            personnel = updated.personnel,
            "member left group"
        );
        Ok(updated)
    }

    /// Swaps `LEADER` and `ACCEPT` between the two members and repoints the
    /// group's leader, all or nothing.
    pub async fn transfer_leadership(
        &self,
        group: &Group,
        current_leader: MemberId,
        new_leader: MemberId,
    ) -> Result<Group, GroupError> {
        let new_leader_state = self.current_state(group.id, new_leader).await?;
        let change = plan_transfer(group, current_leader, new_leader, new_leader_state)?;

        let updated = match self.store.apply_membership_change(&change).await {
            Ok(updated) => updated,
            Err(StoreError::Conflict) => {
                // Work out which side moved underneath us.
                let err = match self.current_state(group.id, current_leader).await? {
                    Some(MembershipState::Leader) => GroupError::NotAGroupMember {
                        group_id: group.id,
                        member_id: new_leader,
                    },
                    _ => GroupError::NotGroupLeader {
                        group_id: group.id,
                        member_id: current_leader,
                    },
                };
                warn!(
                    group_id = %group.id,
                    error = %err,
                    "leadership transfer lost to a concurrent update"
                );
                return Err(err);
            }
            Err(e) => {
                return Err(map_commit_error(
                    group,
                    &change,
                    e,
                    GroupError::NotGroupLeader {
                        group_id: group.id,
                        member_id: current_leader,
                    },
                ))
            }
        };

        info!(
            group_id = %group.id,
            from_leader = %current_leader,
            to_leader = %new_leader,
            "leadership transferred"
        );
        Ok(updated)
    }

    /// Deletes the group and every record in it, provided `leader_id` still leads it.
    pub async fn delete_group(
        &self,
        group_id: GroupId,
        leader_id: MemberId,
    ) -> Result<(), GroupError> {
        match self.store.delete_group(&group_id, &leader_id).await {
            Ok(()) => {
                info!(group_id = %group_id, member_id = %leader_id, "group deleted");
                Ok(())
            }
            Err(StoreError::NotFound) => match self.store.get_group(&group_id).await {
                Ok(_) => Err(GroupError::NotGroupLeader {
                    group_id,
                    member_id: leader_id,
                }),
                Err(StoreError::NotFound) => Err(GroupError::GroupNotFound { group_id }),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Changes group metadata; fields left `None` are untouched.
    pub async fn update_group(
        &self,
        group: &Group,
        params: &UpdateGroupParams,
    ) -> Result<Group, GroupError> {
        if let Some(max_personnel) = params.max_personnel {
            validate_capacity(max_personnel, group.personnel)?;
        }
        if let Some(name) = &params.name {
            if name != &group.name {
                self.ensure_name_available(name).await?;
            }
        }
        if params.is_empty() {
            return Ok(group.clone());
        }

        let updated = self
            .store
            .update_group(&group.id, params)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => GroupError::GroupNameConflict {
                    name: params.name.clone().unwrap_or_default(),
                },
                StoreError::CapacityExceeded => GroupError::InvalidCapacity {
                    requested: params.max_personnel.unwrap_or(group.max_personnel),
                    minimum: group.personnel.max(1),
                },
                StoreError::NotFound => GroupError::GroupNotFound { group_id: group.id },
                other => GroupError::Storage(other),
            })?;

        info!(group_id = %group.id, "group updated");
        Ok(updated)
    }

    // ─────────────────────────────────── Views ──────────────────────────────────────

    /// Records in `ACCEPT` or `LEADER`.
    pub async fn roster_of(&self, group_id: GroupId) -> Result<Vec<MembershipRecord>, GroupError> {
        debug!(group_id = %group_id, "loading roster");
        Ok(self
            .store
            .list_group_memberships(&group_id, &MembershipState::ROSTER)
            .await?)
    }

    /// `REQUEST` records of a member, across groups.
    pub async fn pending_requests_of(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<MembershipRecord>, GroupError> {
        debug!(member_id = %member_id, "loading pending requests");
        Ok(self
            .store
            .list_member_memberships(&member_id, &[MembershipState::Request])
            .await?)
    }

    /// `LEADER` and `ACCEPT` records of a member, across groups.
    pub async fn joined_memberships_of(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<MembershipRecord>, GroupError> {
        Ok(self
            .store
            .list_member_memberships(&member_id, &MembershipState::ROSTER)
            .await?)
    }

    /// Every record of a member, in any state.
    pub async fn memberships_of(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<MembershipRecord>, GroupError> {
        Ok(self
            .store
            .list_member_memberships(&member_id, &[])
            .await?)
    }

    pub async fn membership_view(
        &self,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Result<MembershipView, GroupError> {
        let state = self.current_state(group_id, member_id).await?;
        Ok(MembershipView::from_state(state))
    }
}
