use sprint_groups::{
    GroupListing, GroupService, GroupSummary, JoinedGroup, MemberActivity, NewGroup,
    ReportingPeriod,
};
use sprint_storage::{Group, GroupId, MemberId, UpdateGroupParams};

fn capacity(group: &Group) -> String {
    format!("{}/{}", group.personnel, group.max_personnel)
}

fn activity_line(activity: &MemberActivity) -> String {
    let s = &activity.statistics;
    format!(
        "  {} ({}) - {:.0}s, {:.2} km, {:.0} kcal",
        activity.member.nickname, activity.member.id, s.total_seconds, s.distance, s.calories
    )
}

fn joined_line(joined: &JoinedGroup) -> String {
    let role = if joined.is_leader() { "leader" } else { "member" };
    format!(
        "  [{}] {} ({}) - {}",
        joined.group.id,
        joined.group.name,
        role,
        capacity(&joined.group)
    )
}

fn listing_line(listing: &GroupListing) -> String {
    format!(
        "  [{}] {} - {} - {}",
        listing.group.id,
        listing.group.name,
        capacity(&listing.group),
        listing.view
    )
}

fn summary_lines(summary: &GroupSummary) -> Vec<String> {
    let g = &summary.group;
    let mut lines = vec![
        format!("Group: {}", g.name),
        format!("  ID: {}", g.id),
        format!("  Leader: {}", g.leader_id),
        format!("  Personnel: {}", capacity(g)),
    ];
    if let Some(description) = &g.description {
        lines.push(format!("  Description: {}", description));
    }
    let totals = summary.time_and_distance();
    lines.push(format!(
        "{} total: {:.0}s, {:.2} km",
        summary.period, totals.total_seconds, totals.distance
    ));
    lines.extend(summary.members.iter().map(activity_line));
    lines
}

pub async fn cmd_group_create(
    service: &GroupService,
    name: String,
    leader: i64,
    description: Option<String>,
    picture: Option<String>,
    max_personnel: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let group = service
        .create_group(NewGroup {
            name,
            leader_id: MemberId(leader),
            description,
            picture,
            max_personnel,
        })
        .await?;

    println!("Created group: {}", group.name);
    println!("  ID: {}", group.id);
    println!("  Personnel: {}", capacity(&group));
    if let Some(description) = &group.description {
        println!("  Description: {}", description);
    }

    Ok(())
}

pub async fn cmd_group_show(
    service: &GroupService,
    group_id: i64,
    period: ReportingPeriod,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = service.group_summary(GroupId(group_id), period).await?;
    for line in summary_lines(&summary) {
        println!("{}", line);
    }
    Ok(())
}

pub async fn cmd_group_members(
    service: &GroupService,
    group_id: i64,
    period: ReportingPeriod,
) -> Result<(), Box<dyn std::error::Error>> {
    let roster = service.roster_activity(GroupId(group_id), period).await?;

    println!("Members ({}):", roster.len());
    for activity in &roster {
        println!("{}", activity_line(activity));
    }
    Ok(())
}

pub async fn cmd_group_list(
    service: &GroupService,
    member: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let joined = service.list_joined_groups(MemberId(member)).await?;

    if joined.is_empty() {
        println!("No groups found");
        return Ok(());
    }

    println!("Groups:");
    for j in &joined {
        println!("{}", joined_line(j));
    }
    Ok(())
}

pub async fn cmd_group_search(
    service: &GroupService,
    fragment: &str,
    member: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let listings = service.search_groups(MemberId(member), fragment).await?;

    if listings.is_empty() {
        println!("No groups match '{}'", fragment);
        return Ok(());
    }

    println!("Groups matching '{}':", fragment);
    for listing in &listings {
        println!("{}", listing_line(listing));
    }
    Ok(())
}

pub async fn cmd_group_update(
    service: &GroupService,
    group_id: i64,
    params: UpdateGroupParams,
) -> Result<(), Box<dyn std::error::Error>> {
    if params.is_empty() {
        return Err(
            "Nothing to update (use --name, --description, --picture or --max-personnel)".into(),
        );
    }

    let group = service.update_group(GroupId(group_id), &params).await?;

    println!("Updated group: {}", group.name);
    println!("  Personnel: {}", capacity(&group));
    Ok(())
}

pub async fn cmd_group_delete(
    service: &GroupService,
    group_id: i64,
    member: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    service
        .delete_group(GroupId(group_id), MemberId(member))
        .await?;
    println!("Group {} deleted", group_id);
    Ok(())
}
