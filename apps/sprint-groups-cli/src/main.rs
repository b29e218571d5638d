mod cli;
mod commands;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sprint_events_memory::MemoryEventBus;
use sprint_groups::{GroupError, GroupService, Unreported};
use sprint_storage::{CreateMemberParams, UpdateGroupParams};
use sprint_store_sqlite::SqliteStore;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, GroupCommand, MemberCommand, MembershipCommand};
use commands::*;
use config::CliConfig;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<GroupError>() {
                Some(group_err) => eprintln!("error [{}]: {}", group_err.code(), group_err),
                None => eprintln!("error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        CliConfig::from_env()?.with_overrides(cli.database_url, cli.default_max_personnel)?;

    debug!(
        database = config.database_url.as_deref().unwrap_or("~/.sprint/groups.db"),
        default_max_personnel = config.default_max_personnel,
        "opening store"
    );
    let store = Arc::new(match &config.database_url {
        Some(url) => SqliteStore::open(url).await?,
        None => SqliteStore::open_default().await?,
    });
    let service = GroupService::new(
        store.clone(),
        store.clone(),
        Arc::new(Unreported),
        Arc::new(MemoryEventBus::new()),
        config.policy(),
    );

    match cli.command {
        Command::Member { member_cmd } => match member_cmd {
            MemberCommand::Add {
                nickname,
                email,
                height,
                weight,
                tier,
                picture,
            } => {
                cmd_member_add(
                    &store,
                    CreateMemberParams {
                        nickname,
                        email,
                        height,
                        weight,
                        tier,
                        picture,
                    },
                )
                .await?;
            }
        },
        Command::Group { group_cmd } => match group_cmd {
            GroupCommand::Create {
                name,
                leader,
                description,
                picture,
                max_personnel,
            } => {
                cmd_group_create(&service, name, leader, description, picture, max_personnel)
                    .await?;
            }
            GroupCommand::Show { group_id, period } => {
                cmd_group_show(&service, group_id, period.into()).await?;
            }
            GroupCommand::Members { group_id, period } => {
                cmd_group_members(&service, group_id, period.into()).await?;
            }
            GroupCommand::List { member } => {
                cmd_group_list(&service, member).await?;
            }
            GroupCommand::Search { fragment, member } => {
                cmd_group_search(&service, &fragment, member).await?;
            }
            GroupCommand::Update {
                group_id,
                name,
                description,
                picture,
                max_personnel,
            } => {
                cmd_group_update(
                    &service,
                    group_id,
                    UpdateGroupParams {
                        name,
                        description,
                        picture,
                        max_personnel,
                    },
                )
                .await?;
            }
            GroupCommand::Delete { group_id, member } => {
                cmd_group_delete(&service, group_id, member).await?;
            }
        },
        Command::Membership { membership_cmd } => match membership_cmd {
            MembershipCommand::Request {
                group_id,
                member_id,
            } => {
                cmd_membership_request(&service, group_id, member_id).await?;
            }
            MembershipCommand::Respond {
                group_id,
                member_id,
                state,
            } => {
                cmd_membership_respond(&service, group_id, member_id, &state).await?;
            }
            MembershipCommand::Leave {
                group_id,
                member_id,
            } => {
                cmd_membership_leave(&service, group_id, member_id).await?;
            }
            MembershipCommand::Transfer { group_id, from, to } => {
                cmd_membership_transfer(&service, group_id, from, to).await?;
            }
            MembershipCommand::Pending { member_id } => {
                cmd_membership_pending(&service, member_id).await?;
            }
        },
    }

    Ok(())
}
