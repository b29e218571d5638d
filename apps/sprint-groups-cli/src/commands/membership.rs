use sprint_groups::GroupService;
use sprint_storage::{GroupId, MemberId};

pub async fn cmd_membership_request(
    service: &GroupService,
    group_id: i64,
    member_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    service
        .request_join(GroupId(group_id), MemberId(member_id))
        .await?;
    println!(
        "Member {} requested to join group {}",
        member_id, group_id
    );
    Ok(())
}

pub async fn cmd_membership_respond(
    service: &GroupService,
    group_id: i64,
    member_id: i64,
    state: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    service
        .respond_str(GroupId(group_id), MemberId(member_id), state)
        .await?;
    println!(
        "Request of member {} in group {}: {}",
        member_id,
        group_id,
        state.trim().to_uppercase()
    );
    Ok(())
}

pub async fn cmd_membership_leave(
    service: &GroupService,
    group_id: i64,
    member_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    service
        .leave(GroupId(group_id), MemberId(member_id))
        .await?;
    println!("Member {} left group {}", member_id, group_id);
    Ok(())
}

pub async fn cmd_membership_transfer(
    service: &GroupService,
    group_id: i64,
    from: i64,
    to: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    service
        .transfer_leadership(GroupId(group_id), MemberId(from), MemberId(to))
        .await?;
    println!("Group {} is now led by member {}", group_id, to);
    Ok(())
}

pub async fn cmd_membership_pending(
    service: &GroupService,
    member_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let groups = service.pending_request_groups(MemberId(member_id)).await?;

    if groups.is_empty() {
        println!("No pending requests");
        return Ok(());
    }

    println!("Pending requests:");
    for group in groups {
        println!(
            "  [{}] {} - {}/{}",
            group.id, group.name, group.personnel, group.max_personnel
        );
    }
    Ok(())
}
