use sprint_storage::{CreateMemberParams, Member};
use sprint_store_sqlite::SqliteStore;

pub async fn member_add_inner(
    store: &SqliteStore,
    params: CreateMemberParams,
) -> Result<Member, Box<dyn std::error::Error>> {
    if params.nickname.trim().is_empty() {
        return Err("Nickname must not be empty".into());
    }
    if !params.email.contains('@') {
        return Err(format!("Invalid email address: {}", params.email).into());
    }
    Ok(store.create_member(&params).await?)
}

pub async fn cmd_member_add(
    store: &SqliteStore,
    params: CreateMemberParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let member = member_add_inner(store, params).await?;

    println!("Added member: {}", member.nickname);
    println!("  ID: {}", member.id);
    println!("  Email: {}", member.email);

    Ok(())
}
