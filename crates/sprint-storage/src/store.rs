//! The Store and MemberDirectory traits that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait `sprint-groups` depends on.
///
/// Every write that touches membership state goes through
/// [`Store::apply_membership_change`], which backends must execute in a single
/// transaction.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Groups ─────────────────────────────────────────

    /// Create a group and its leader's `LEADER` membership record atomically.
    /// Returns `AlreadyExists` when the name is taken (exact, case-sensitive match).
    async fn create_group(&self, params: &CreateGroupParams) -> Result<Group, StoreError>;

    /// Get group by ID.
    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError>;

    /// Get group by exact name.
    async fn get_group_by_name(&self, name: &str) -> Result<Group, StoreError>;

    /// Groups whose name contains `fragment`, compared case-insensitively, ordered by name.
    async fn find_groups_by_name_fragment(&self, fragment: &str)
        -> Result<Vec<Group>, StoreError>;

    /// Update group metadata. Returns `CapacityExceeded` if the new maximum is
    /// below the current personnel, `AlreadyExists` on a name collision.
    async fn update_group(
        &self,
        group_id: &GroupId,
        params: &UpdateGroupParams,
    ) -> Result<Group, StoreError>;

    /// Delete a group (and all its membership records), provided `leader_id`
    /// still leads it. Returns `NotFound` if no such group/leader pair exists.
    async fn delete_group(&self, group_id: &GroupId, leader_id: &MemberId)
        -> Result<(), StoreError>;

    // ─────────────────────────────────── Memberships ──────────────────────────────────────

    /// Get the membership record for (group, member).
    async fn get_membership(
        &self,
        group_id: &GroupId,
        member_id: &MemberId,
    ) -> Result<MembershipRecord, StoreError>;

    /// List a group's records in any of `states` (empty = every state), oldest change first.
    async fn list_group_memberships(
        &self,
        group_id: &GroupId,
        states: &[MembershipState],
    ) -> Result<Vec<MembershipRecord>, StoreError>;

    /// List a member's records across groups in any of `states` (empty = every state).
    async fn list_member_memberships(
        &self,
        member_id: &MemberId,
        states: &[MembershipState],
    ) -> Result<Vec<MembershipRecord>, StoreError>;

    /// Apply a guarded change set atomically and return the group as committed.
    async fn apply_membership_change(&self, change: &MembershipChange)
        -> Result<Group, StoreError>;
}

/// Read-only member lookup.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Get member by ID.
    async fn get_member(&self, member_id: &MemberId) -> Result<Member, StoreError>;
}
