use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use sprint_events::{EventBus, MembershipEventKind};
use sprint_events_memory::MemoryEventBus;
use sprint_groups::{
    ActivityStatistics, GroupError, GroupPolicy, GroupService, MembershipView, NewGroup,
    ReportingPeriod, StatisticsError, StatisticsProvider,
};
use sprint_storage::{
    CreateMemberParams, GroupId, MemberId, MembershipState, Store, UpdateGroupParams,
};
use sprint_store_sqlite::SqliteStore;

/// Every member ran `id` kilometres in `id * 10` minutes.
struct ProportionalStats;

#[async_trait::async_trait]
impl StatisticsProvider for ProportionalStats {
    async fn statistics_for(
        &self,
        member_id: &MemberId,
        period: ReportingPeriod,
        _at: DateTime<Utc>,
    ) -> Result<ActivityStatistics, StatisticsError> {
        let scale = match period {
            ReportingPeriod::Daily => 1.0,
            ReportingPeriod::Weekly => 7.0,
        };
        let id = member_id.0 as f64;
        Ok(ActivityStatistics {
            total_seconds: id * 600.0 * scale,
            distance: id * scale,
            calories: id * 50.0 * scale,
        })
    }
}

struct Harness {
    service: Arc<GroupService>,
    store: Arc<SqliteStore>,
    events: Arc<MemoryEventBus>,
    members: Vec<MemberId>,
}

async fn harness(member_count: usize) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let mut members = Vec::new();
    for i in 1..=member_count {
        let m = store
            .create_member(&CreateMemberParams {
                nickname: format!("runner{i}"),
                email: format!("runner{i}@example.com"),
                height: 170.0,
                weight: 60.0,
                tier: 1,
                picture: None,
            })
            .await
            .unwrap();
        members.push(m.id);
    }

    let events = Arc::new(MemoryEventBus::new());
    let service = Arc::new(GroupService::new(
        store.clone(),
        store.clone(),
        Arc::new(ProportionalStats),
        events.clone(),
        GroupPolicy::default(),
    ));
    Harness {
        service,
        store,
        events,
        members,
    }
}

fn new_group(name: &str, leader_id: MemberId, max_personnel: Option<u32>) -> NewGroup {
    NewGroup {
        name: name.to_string(),
        leader_id,
        description: Some("weekday 6am".to_string()),
        picture: None,
        max_personnel,
    }
}

async fn state_of(h: &Harness, group_id: GroupId, member_id: MemberId) -> MembershipState {
    h.store
        .get_membership(&group_id, &member_id)
        .await
        .unwrap()
        .state
}

#[tokio::test]
async fn join_accept_leave_scenario() {
    let h = harness(2).await;
    let (leader, runner) = (h.members[0], h.members[1]);

    let g = h
        .service
        .create_group(new_group("riverside", leader, None))
        .await
        .unwrap();
    assert_eq!(g.personnel, 1);
    assert_eq!(g.max_personnel, 30);
    assert_eq!(state_of(&h, g.id, leader).await, MembershipState::Leader);

    assert!(h.service.request_join(g.id, runner).await.unwrap());
    assert!(h.service.answer(g.id, runner, true).await.unwrap());
    assert_eq!(h.service.group(g.id).await.unwrap().personnel, 2);

    assert!(h.service.leave(g.id, runner).await.unwrap());
    assert_eq!(h.service.group(g.id).await.unwrap().personnel, 1);
    assert_eq!(state_of(&h, g.id, runner).await, MembershipState::Leave);
}

#[tokio::test]
async fn duplicate_request_is_refused() {
    let h = harness(2).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();

    h.service.request_join(g.id, h.members[1]).await.unwrap();
    let err = h
        .service
        .request_join(g.id, h.members[1])
        .await
        .unwrap_err();
    assert!(matches!(err, GroupError::AlreadyMemberOrPending { .. }));
    assert_eq!(err.code(), "G0004");

    // The leader already belongs.
    let err = h
        .service
        .request_join(g.id, h.members[0])
        .await
        .unwrap_err();
    assert!(matches!(err, GroupError::AlreadyMemberOrPending { .. }));
}

#[tokio::test]
async fn terminal_states_can_request_again() {
    let h = harness(4).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();
    let (rejected, cancelled, left) = (h.members[1], h.members[2], h.members[3]);

    for m in [rejected, cancelled, left] {
        h.service.request_join(g.id, m).await.unwrap();
    }
    h.service.answer(g.id, rejected, false).await.unwrap();
    h.service.cancel(g.id, cancelled).await.unwrap();
    h.service.answer(g.id, left, true).await.unwrap();
    h.service.leave(g.id, left).await.unwrap();

    assert_eq!(state_of(&h, g.id, rejected).await, MembershipState::Reject);
    assert_eq!(state_of(&h, g.id, cancelled).await, MembershipState::Cancel);
    assert_eq!(h.service.group(g.id).await.unwrap().personnel, 1);

    for m in [rejected, cancelled, left] {
        h.service.request_join(g.id, m).await.unwrap();
        assert_eq!(state_of(&h, g.id, m).await, MembershipState::Request);
    }
}

#[tokio::test]
async fn answering_twice_reports_no_pending_request() {
    let h = harness(2).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();

    let err = h
        .service
        .answer(g.id, h.members[1], true)
        .await
        .unwrap_err();
    assert!(matches!(err, GroupError::NoPendingRequest { .. }));

    h.service.request_join(g.id, h.members[1]).await.unwrap();
    h.service.answer(g.id, h.members[1], false).await.unwrap();
    let err = h
        .service
        .answer(g.id, h.members[1], true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "G0003");
    assert_eq!(h.service.group(g.id).await.unwrap().personnel, 1);
}

#[tokio::test]
async fn leader_cannot_leave() {
    let h = harness(3).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();

    let err = h.service.leave(g.id, h.members[0]).await.unwrap_err();
    assert!(matches!(err, GroupError::LeaderCannotLeave { .. }));

    for m in &h.members[1..] {
        h.service.request_join(g.id, *m).await.unwrap();
        h.service.answer(g.id, *m, true).await.unwrap();
    }
    let err = h.service.leave(g.id, h.members[0]).await.unwrap_err();
    assert_eq!(err.code(), "G0005");

    // Pending members are not members yet.
    let h2 = harness(2).await;
    let g2 = h2
        .service
        .create_group(new_group("other", h2.members[0], None))
        .await
        .unwrap();
    h2.service.request_join(g2.id, h2.members[1]).await.unwrap();
    let err = h2.service.leave(g2.id, h2.members[1]).await.unwrap_err();
    assert!(matches!(err, GroupError::NotAGroupMember { .. }));
}

#[tokio::test]
async fn leadership_transfer_swaps_roles() {
    let h = harness(2).await;
    let (old, new) = (h.members[0], h.members[1]);
    let g = h
        .service
        .create_group(new_group("riverside", old, None))
        .await
        .unwrap();
    h.service.request_join(g.id, new).await.unwrap();
    h.service.answer(g.id, new, true).await.unwrap();

    assert!(h.service.transfer_leadership(g.id, old, new).await.unwrap());

    assert_eq!(h.service.group(g.id).await.unwrap().leader_id, new);
    assert_eq!(state_of(&h, g.id, old).await, MembershipState::Accept);
    assert_eq!(state_of(&h, g.id, new).await, MembershipState::Leader);
    assert_eq!(h.service.group_leader(g.id).await.unwrap().id, new);

    // The former leader may now leave.
    h.service.leave(g.id, old).await.unwrap();
    assert_eq!(h.service.group(g.id).await.unwrap().personnel, 1);
}

#[tokio::test]
async fn failed_transfer_changes_nothing() {
    let h = harness(3).await;
    let (leader, pending, stranger) = (h.members[0], h.members[1], h.members[2]);
    let g = h
        .service
        .create_group(new_group("riverside", leader, None))
        .await
        .unwrap();
    h.service.request_join(g.id, pending).await.unwrap();

    let err = h
        .service
        .transfer_leadership(g.id, leader, pending)
        .await
        .unwrap_err();
    assert!(matches!(err, GroupError::NotAGroupMember { .. }));

    let err = h
        .service
        .transfer_leadership(g.id, stranger, leader)
        .await
        .unwrap_err();
    assert!(matches!(err, GroupError::NotGroupLeader { .. }));

    assert_eq!(h.service.group(g.id).await.unwrap().leader_id, leader);
    assert_eq!(state_of(&h, g.id, leader).await, MembershipState::Leader);
    assert_eq!(state_of(&h, g.id, pending).await, MembershipState::Request);
}

#[tokio::test]
async fn duplicate_group_name_conflicts() {
    let h = harness(2).await;
    h.service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();
    let err = h
        .service
        .create_group(new_group("riverside", h.members[1], None))
        .await
        .unwrap_err();
    assert!(matches!(err, GroupError::GroupNameConflict { ref name } if name == "riverside"));

    let err = h
        .service
        .create_group(new_group("nobody's", MemberId(999), None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "M0001");
}

#[tokio::test]
async fn accept_beyond_capacity_reports_group_full() {
    let h = harness(3).await;
    let g = h
        .service
        .create_group(new_group("pair", h.members[0], Some(2)))
        .await
        .unwrap();
    for m in &h.members[1..] {
        h.service.request_join(g.id, *m).await.unwrap();
    }
    h.service.answer(g.id, h.members[1], true).await.unwrap();

    let err = h
        .service
        .answer(g.id, h.members[2], true)
        .await
        .unwrap_err();
    assert!(matches!(err, GroupError::GroupFull { max_personnel: 2, .. }));
    assert_eq!(
        state_of(&h, g.id, h.members[2]).await,
        MembershipState::Request
    );

    // Rejection is still possible when full.
    h.service.answer(g.id, h.members[2], false).await.unwrap();
}

#[tokio::test]
async fn concurrent_accepts_admit_exactly_once() {
    let h = harness(2).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();
    let runner = h.members[1];
    h.service.request_join(g.id, runner).await.unwrap();

    let (a, b) = tokio::join!(
        h.service.answer(g.id, runner, true),
        h.service.answer(g.id, runner, true)
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.into_iter().find_map(|r| r.err()).unwrap();
    assert!(matches!(loser, GroupError::NoPendingRequest { .. }));
    assert_eq!(h.service.group(g.id).await.unwrap().personnel, 2);
}

#[tokio::test]
async fn concurrent_accepts_from_spawned_tasks() {
    let h = harness(2).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();
    let runner = h.members[1];
    h.service.request_join(g.id, runner).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let svc = h.service.clone();
            tokio::spawn(async move { svc.answer(g.id, runner, true).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert!(matches!(e, GroupError::NoPendingRequest { .. })),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(h.service.group(g.id).await.unwrap().personnel, 2);
}

#[tokio::test]
async fn delete_group_removes_all_records() {
    let h = harness(3).await;
    let (leader, member, pending) = (h.members[0], h.members[1], h.members[2]);
    let g = h
        .service
        .create_group(new_group("riverside", leader, None))
        .await
        .unwrap();
    h.service.request_join(g.id, member).await.unwrap();
    h.service.answer(g.id, member, true).await.unwrap();
    h.service.request_join(g.id, pending).await.unwrap();

    let err = h.service.delete_group(g.id, member).await.unwrap_err();
    assert_eq!(err.code(), "G0007");

    assert!(h.service.delete_group(g.id, leader).await.unwrap());

    let err = h.service.group(g.id).await.unwrap_err();
    assert!(matches!(err, GroupError::GroupNotFound { .. }));
    assert!(h.service.machine().roster_of(g.id).await.unwrap().is_empty());
    assert!(h
        .service
        .pending_request_groups(pending)
        .await
        .unwrap()
        .is_empty());
    assert!(h.service.list_joined_groups(member).await.unwrap().is_empty());
}

#[tokio::test]
async fn respond_dispatches_by_target_state() {
    let h = harness(4).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();
    for m in &h.members[1..] {
        h.service.request_join(g.id, *m).await.unwrap();
    }

    h.service
        .respond(g.id, h.members[1], MembershipState::Accept)
        .await
        .unwrap();
    h.service
        .respond_str(g.id, h.members[2], "reject")
        .await
        .unwrap();
    h.service
        .respond_str(g.id, h.members[3], "CANCEL")
        .await
        .unwrap();

    assert_eq!(state_of(&h, g.id, h.members[1]).await, MembershipState::Accept);
    assert_eq!(state_of(&h, g.id, h.members[2]).await, MembershipState::Reject);
    assert_eq!(state_of(&h, g.id, h.members[3]).await, MembershipState::Cancel);

    let err = h
        .service
        .respond(g.id, h.members[1], MembershipState::Leave)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "G0009");
}

#[tokio::test]
async fn search_and_listings_reflect_membership() {
    let h = harness(3).await;
    let (a, b, me) = (h.members[0], h.members[1], h.members[2]);
    let mine = h
        .service
        .create_group(new_group("Zebra Runners", me, None))
        .await
        .unwrap();
    let joined = h
        .service
        .create_group(new_group("Alpha Runners", a, None))
        .await
        .unwrap();
    let pending = h
        .service
        .create_group(new_group("midnight runners", b, None))
        .await
        .unwrap();
    h.service
        .create_group(new_group("Cyclists", b, Some(5)))
        .await
        .unwrap();

    h.service.request_join(joined.id, me).await.unwrap();
    h.service.answer(joined.id, me, true).await.unwrap();
    h.service.request_join(pending.id, me).await.unwrap();

    let listings = h.service.search_groups(me, "RUNNERS").await.unwrap();
    let got: Vec<_> = listings
        .iter()
        .map(|l| (l.group.name.as_str(), l.view))
        .collect();
    assert_eq!(
        got,
        vec![
            ("Alpha Runners", MembershipView::Member),
            ("Zebra Runners", MembershipView::Leader),
            ("midnight runners", MembershipView::Request),
        ]
    );

    let joined_groups = h.service.list_joined_groups(me).await.unwrap();
    let ids: Vec<_> = joined_groups.iter().map(|j| j.group.id).collect();
    assert_eq!(ids, vec![mine.id, joined.id]);

    let pending_groups = h.service.pending_request_groups(me).await.unwrap();
    assert_eq!(pending_groups.len(), 1);
    assert_eq!(pending_groups[0].id, pending.id);

    assert_eq!(
        h.service
            .machine()
            .membership_view(pending.id, me)
            .await
            .unwrap(),
        MembershipView::Request
    );
}

#[tokio::test]
async fn summary_and_roster_activity() {
    let h = harness(3).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], None))
        .await
        .unwrap();
    for m in &h.members[1..] {
        h.service.request_join(g.id, *m).await.unwrap();
    }
    h.service.answer(g.id, h.members[1], true).await.unwrap();

    let members = h.service.list_group_members(g.id).await.unwrap();
    let ids: Vec<_> = members.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![h.members[0], h.members[1]]);

    let daily = h
        .service
        .roster_activity(g.id, ReportingPeriod::Daily)
        .await
        .unwrap();
    assert_eq!(daily.len(), 2);

    let summary = h
        .service
        .group_summary(g.id, ReportingPeriod::Weekly)
        .await
        .unwrap();
    let expected_distance: f64 = ids.iter().map(|id| id.0 as f64 * 7.0).sum();
    assert_eq!(summary.members.len(), 2);
    assert_eq!(summary.totals.distance, expected_distance);
    assert_eq!(summary.totals.total_seconds, expected_distance * 600.0);
    assert_eq!(summary.group.personnel, 2);
}

#[tokio::test]
async fn update_group_validates_name_and_capacity() {
    let h = harness(3).await;
    let g = h
        .service
        .create_group(new_group("riverside", h.members[0], Some(5)))
        .await
        .unwrap();
    h.service
        .create_group(new_group("harbour", h.members[1], None))
        .await
        .unwrap();
    h.service.request_join(g.id, h.members[2]).await.unwrap();
    h.service.answer(g.id, h.members[2], true).await.unwrap();

    let err = h
        .service
        .update_group(
            g.id,
            &UpdateGroupParams {
                name: Some("harbour".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "G0001");

    let err = h
        .service
        .update_group(
            g.id,
            &UpdateGroupParams {
                max_personnel: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GroupError::InvalidCapacity {
            requested: 1,
            minimum: 2
        }
    ));

    let updated = h
        .service
        .update_group(
            g.id,
            &UpdateGroupParams {
                name: Some("riverside loop".into()),
                max_personnel: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "riverside loop");
    assert_eq!(updated.max_personnel, 2);
    assert!(updated.is_full());
}

#[tokio::test]
async fn committed_changes_are_published() {
    let h = harness(2).await;
    let (leader, runner) = (h.members[0], h.members[1]);
    let g = h
        .service
        .create_group(new_group("riverside", leader, None))
        .await
        .unwrap();

    let mut stream = h.events.subscribe(&g.id).await.unwrap();

    h.service.request_join(g.id, runner).await.unwrap();
    h.service.answer(g.id, runner, true).await.unwrap();
    // A refused transition publishes nothing.
    h.service.leave(g.id, leader).await.unwrap_err();
    h.service
        .transfer_leadership(g.id, leader, runner)
        .await
        .unwrap();
    h.service.delete_group(g.id, runner).await.unwrap();

    let mut kinds = Vec::new();
    for _ in 0..4 {
        let event = tokio::time::timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(event.group_id, g.id);
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            MembershipEventKind::Requested,
            MembershipEventKind::Accepted,
            MembershipEventKind::LeadershipTransferred {
                previous_leader: leader
            },
            MembershipEventKind::GroupDeleted,
        ]
    );
    // Deletion closes the group's feed.
    assert!(stream.next().await.is_none());
    assert_eq!(h.events.active_groups(), 0);
}
