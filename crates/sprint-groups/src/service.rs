//! Use cases over the state machine: entity resolution, listings, summaries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sprint_events::{EventBus, MembershipEvent, MembershipEventKind};
use sprint_storage::{
    CreateGroupParams, Group, GroupId, Member, MemberDirectory, MemberId, MembershipState, Store,
    StoreError, UpdateGroupParams,
};
use tracing::{debug, warn};

use crate::machine::{MembershipStateMachine, MembershipView};
use crate::statistics::{ActivityStatistics, ReportingPeriod, StatisticsProvider};
use crate::GroupError;

pub const DEFAULT_MAX_PERSONNEL: u32 = 30;

/// Defaults applied by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupPolicy {
    /// Capacity for groups created without an explicit maximum.
    pub default_max_personnel: u32,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self {
            default_max_personnel: DEFAULT_MAX_PERSONNEL,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewGroup {
    pub name: String,
    pub leader_id: MemberId,
    pub description: Option<String>,
    pub picture: Option<String>,
    /// `None` uses [`GroupPolicy::default_max_personnel`].
    pub max_personnel: Option<u32>,
}

/// A group the member belongs to, with their role in it.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinedGroup {
    pub group: Group,
    pub state: MembershipState,
}

impl JoinedGroup {
    pub fn is_leader(&self) -> bool {
        self.state == MembershipState::Leader
    }
}

/// A search hit annotated with the searching member's relation to it.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupListing {
    pub group: Group,
    pub view: MembershipView,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberActivity {
    pub member: Member,
    pub statistics: ActivityStatistics,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupSummary {
    pub group: Group,
    pub period: ReportingPeriod,
    /// Sum over `members`.
    pub totals: ActivityStatistics,
    pub members: Vec<MemberActivity>,
}

/// Totals shape used when a summary is exported.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GroupTotals {
    pub total_seconds: f64,
    pub distance: f64,
}

impl GroupSummary {
    pub fn time_and_distance(&self) -> GroupTotals {
        GroupTotals {
            total_seconds: self.totals.total_seconds,
            distance: self.totals.distance,
        }
    }
}

/// Orchestrates group use cases.
///
/// Resolution order is always group first, then member(s), so a request that
/// names both a missing group and a missing member reports the group.
pub struct GroupService {
    machine: MembershipStateMachine,
    store: Arc<dyn Store>,
    members: Arc<dyn MemberDirectory>,
    statistics: Arc<dyn StatisticsProvider>,
    events: Arc<dyn EventBus>,
    policy: GroupPolicy,
}

impl GroupService {
    pub fn new(
        store: Arc<dyn Store>,
        members: Arc<dyn MemberDirectory>,
        statistics: Arc<dyn StatisticsProvider>,
        events: Arc<dyn EventBus>,
        policy: GroupPolicy,
    ) -> Self {
        Self {
            machine: MembershipStateMachine::new(store.clone()),
            store,
            members,
            statistics,
            events,
            policy,
        }
    }

    pub fn machine(&self) -> &MembershipStateMachine {
        &self.machine
    }

    pub fn policy(&self) -> GroupPolicy {
        self.policy
    }

    async fn resolve_group(&self, group_id: GroupId) -> Result<Group, GroupError> {
        debug!(group_id = %group_id, "resolving group");
        match self.store.get_group(&group_id).await {
            Ok(group) => Ok(group),
            Err(StoreError::NotFound) => Err(GroupError::GroupNotFound { group_id }),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_member(&self, member_id: MemberId) -> Result<Member, GroupError> {
        debug!(member_id = %member_id, "resolving member");
        match self.members.get_member(&member_id).await {
            Ok(member) => Ok(member),
            Err(StoreError::NotFound) => Err(GroupError::MemberNotFound { member_id }),
            Err(e) => Err(e.into()),
        }
    }

    /// Best effort: the change is already committed.
    async fn publish(&self, group_id: GroupId, member_id: MemberId, kind: MembershipEventKind) {
        let event = MembershipEvent {
            group_id,
            member_id,
            kind,
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = self.events.publish(&group_id, event).await {
            warn!(group_id = %group_id, error = %e, "failed to publish membership event");
        }
    }

    // ───────────────────────────────── Transitions ─────────────────────────────────

    /// Creates a group led by `new.leader_id`.
    ///
    /// The name is checked before the leader, so a taken name wins over an
    /// unknown member.
    pub async fn create_group(&self, new: NewGroup) -> Result<Group, GroupError> {
        self.machine.ensure_name_available(&new.name).await?;
        self.resolve_member(new.leader_id).await?;

        let group = self
            .machine
            .create_group(&CreateGroupParams {
                name: new.name,
                leader_id: new.leader_id,
                description: new.description,
                picture: new.picture,
                max_personnel: new
                    .max_personnel
                    .unwrap_or(self.policy.default_max_personnel),
            })
            .await?;

        self.publish(group.id, group.leader_id, MembershipEventKind::GroupCreated)
            .await;
        Ok(group)
    }

    pub async fn request_join(
        &self,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(member_id).await?;

        self.machine.request_join(&group, member_id).await?;
        self.publish(group_id, member_id, MembershipEventKind::Requested)
            .await;
        Ok(true)
    }

    /// Accepts (`accept = true`) or rejects a pending join request.
    pub async fn answer(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        accept: bool,
    ) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(member_id).await?;
        self.answer_resolved(&group, member_id, accept).await
    }

    async fn answer_resolved(
        &self,
        group: &Group,
        member_id: MemberId,
        accept: bool,
    ) -> Result<bool, GroupError> {
        self.machine.answer(group, member_id, accept).await?;
        let kind = if accept {
            MembershipEventKind::Accepted
        } else {
            MembershipEventKind::Rejected
        };
        self.publish(group.id, member_id, kind).await;
        Ok(true)
    }

    pub async fn cancel(&self, group_id: GroupId, member_id: MemberId) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(member_id).await?;
        self.cancel_resolved(&group, member_id).await
    }

    async fn cancel_resolved(&self, group: &Group, member_id: MemberId) -> Result<bool, GroupError> {
        self.machine.cancel(group, member_id).await?;
        self.publish(group.id, member_id, MembershipEventKind::Cancelled)
            .await;
        Ok(true)
    }

    /// Dispatches a requested target state for a pending request:
    /// `ACCEPT` and `REJECT` answer it, `CANCEL` withdraws it.
    pub async fn respond(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        target: MembershipState,
    ) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(member_id).await?;
        self.respond_resolved(&group, member_id, target).await
    }

    /// [`respond`](Self::respond) with the target given as text.
    pub async fn respond_str(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        target: &str,
    ) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(member_id).await?;

        match target.parse::<MembershipState>() {
            Ok(state) => self.respond_resolved(&group, member_id, state).await,
            Err(e) => Err(GroupError::InvalidTransitionRequest {
                group_id,
                member_id,
                requested: e.0,
            }),
        }
    }

    async fn respond_resolved(
        &self,
        group: &Group,
        member_id: MemberId,
        target: MembershipState,
    ) -> Result<bool, GroupError> {
        match target {
            MembershipState::Accept => self.answer_resolved(group, member_id, true).await,
            MembershipState::Reject => self.answer_resolved(group, member_id, false).await,
            MembershipState::Cancel => self.cancel_resolved(group, member_id).await,
            other => Err(GroupError::InvalidTransitionRequest {
                group_id: group.id,
                member_id,
                requested: other.to_string(),
            }),
        }
    }

    pub async fn leave(&self, group_id: GroupId, member_id: MemberId) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(member_id).await?;

        self.machine.leave(&group, member_id).await?;
        self.publish(group_id, member_id, MembershipEventKind::Left)
            .await;
        Ok(true)
    }

    pub async fn transfer_leadership(
        &self,
        group_id: GroupId,
        current_leader: MemberId,
        new_leader: MemberId,
    ) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(current_leader).await?;
        self.resolve_member(new_leader).await?;

        self.machine
            .transfer_leadership(&group, current_leader, new_leader)
            .await?;
        self.publish(
            group_id,
            new_leader,
            MembershipEventKind::LeadershipTransferred {
                previous_leader: current_leader,
            },
        )
        .await;
        Ok(true)
    }

    /// Deletes the group and all of its membership records. Only its leader may.
    pub async fn delete_group(
        &self,
        group_id: GroupId,
        requesting_member: MemberId,
    ) -> Result<bool, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(requesting_member).await?;

        if group.leader_id != requesting_member {
            return Err(GroupError::NotGroupLeader {
                group_id,
                member_id: requesting_member,
            });
        }

        self.machine
            .delete_group(group_id, requesting_member)
            .await?;
        self.publish(group_id, requesting_member, MembershipEventKind::GroupDeleted)
            .await;
        Ok(true)
    }

    pub async fn update_group(
        &self,
        group_id: GroupId,
        params: &UpdateGroupParams,
    ) -> Result<Group, GroupError> {
        let group = self.resolve_group(group_id).await?;
        let updated = self.machine.update_group(&group, params).await?;
        if !params.is_empty() {
            self.publish(group_id, updated.leader_id, MembershipEventKind::GroupUpdated)
                .await;
        }
        Ok(updated)
    }

    // ─────────────────────────────────── Queries ───────────────────────────────────

    pub async fn group(&self, group_id: GroupId) -> Result<Group, GroupError> {
        self.resolve_group(group_id).await
    }

    pub async fn group_leader(&self, group_id: GroupId) -> Result<Member, GroupError> {
        let group = self.resolve_group(group_id).await?;
        self.resolve_member(group.leader_id).await
    }

    /// Roster members, leader first, then in the order they joined.
    pub async fn list_group_members(&self, group_id: GroupId) -> Result<Vec<Member>, GroupError> {
        let group = self.resolve_group(group_id).await?;
        let mut roster = self.machine.roster_of(group.id).await?;
        // Stable: everyone else keeps their order.
        roster.sort_by_key(|r| r.state != MembershipState::Leader);

        let mut members = Vec::with_capacity(roster.len());
        for record in roster {
            members.push(self.resolve_member(record.member_id).await?);
        }
        Ok(members)
    }

    /// Groups the member leads or has joined; led groups first, then by name.
    pub async fn list_joined_groups(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<JoinedGroup>, GroupError> {
        self.resolve_member(member_id).await?;

        let mut joined = Vec::new();
        for record in self.machine.joined_memberships_of(member_id).await? {
            match self.store.get_group(&record.group_id).await {
                Ok(group) => joined.push(JoinedGroup {
                    group,
                    state: record.state,
                }),
                // Deleted since the listing was read.
                Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        joined.sort_by(|a, b| {
            b.is_leader()
                .cmp(&a.is_leader())
                .then_with(|| a.group.name.cmp(&b.group.name))
        });
        Ok(joined)
    }

    /// Groups whose name contains `fragment` (case-insensitive), each annotated
    /// with the member's view of it, sorted by name.
    pub async fn search_groups(
        &self,
        member_id: MemberId,
        fragment: &str,
    ) -> Result<Vec<GroupListing>, GroupError> {
        self.resolve_member(member_id).await?;

        let groups = self.store.find_groups_by_name_fragment(fragment).await?;
        let states: HashMap<GroupId, MembershipState> = self
            .machine
            .memberships_of(member_id)
            .await?
            .into_iter()
            .map(|r| (r.group_id, r.state))
            .collect();

        let mut listings: Vec<GroupListing> = groups
            .into_iter()
            .map(|group| {
                let view = MembershipView::from_state(states.get(&group.id).copied());
                GroupListing { group, view }
            })
            .collect();
        listings.sort_by(|a, b| a.group.name.cmp(&b.group.name));
        Ok(listings)
    }

    /// Groups the member has a pending join request for.
    pub async fn pending_request_groups(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<Group>, GroupError> {
        self.resolve_member(member_id).await?;

        let mut groups = Vec::new();
        for record in self.machine.pending_requests_of(member_id).await? {
            match self.store.get_group(&record.group_id).await {
                Ok(group) => groups.push(group),
                Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(groups)
    }

    /// Each roster member with their statistics for `period` as of now.
    pub async fn roster_activity(
        &self,
        group_id: GroupId,
        period: ReportingPeriod,
    ) -> Result<Vec<MemberActivity>, GroupError> {
        let members = self.list_group_members(group_id).await?;
        self.activity_of(members, period, Utc::now()).await
    }

    /// Group metadata plus the roster's aggregated statistics for `period`.
    pub async fn group_summary(
        &self,
        group_id: GroupId,
        period: ReportingPeriod,
    ) -> Result<GroupSummary, GroupError> {
        let group = self.resolve_group(group_id).await?;
        let members = self.roster_activity(group_id, period).await?;
        let totals = members.iter().map(|m| &m.statistics).sum();

        Ok(GroupSummary {
            group,
            period,
            totals,
            members,
        })
    }

    async fn activity_of(
        &self,
        members: Vec<Member>,
        period: ReportingPeriod,
        at: DateTime<Utc>,
    ) -> Result<Vec<MemberActivity>, GroupError> {
        let mut out = Vec::with_capacity(members.len());
        for member in members {
            let statistics = self
                .statistics
                .statistics_for(&member.id, period, at)
                .await?;
            out.push(MemberActivity { member, statistics });
        }
        Ok(out)
    }
}
