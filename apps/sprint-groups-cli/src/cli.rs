use clap::{Parser, Subcommand, ValueEnum};
use sprint_groups::ReportingPeriod;

#[derive(Parser)]
#[command(name = "sprint-groups")]
#[command(about = "Manage sprint running groups and their memberships")]
pub struct Cli {
    /// SQLite database URL; overrides SPRINT_DATABASE_URL
    #[arg(long)]
    pub database_url: Option<String>,

    /// Capacity for groups created without --max-personnel; overrides
    /// SPRINT_DEFAULT_MAX_PERSONNEL
    #[arg(long)]
    pub default_max_personnel: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Member directory commands
    Member {
        #[command(subcommand)]
        member_cmd: MemberCommand,
    },
    /// Group commands
    Group {
        #[command(subcommand)]
        group_cmd: GroupCommand,
    },
    /// Membership lifecycle commands
    Membership {
        #[command(subcommand)]
        membership_cmd: MembershipCommand,
    },
}

#[derive(Subcommand)]
pub enum MemberCommand {
    /// Register a member
    Add {
        /// Display name
        nickname: String,
        /// Email address (unique)
        email: String,
        /// Height in cm
        #[arg(long, default_value_t = 0.0)]
        height: f32,
        /// Weight in kg
        #[arg(long, default_value_t = 0.0)]
        weight: f32,
        /// Tier
        #[arg(long, default_value_t = 0)]
        tier: i32,
        /// Picture reference
        #[arg(long)]
        picture: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum GroupCommand {
    /// Create a group led by an existing member
    Create {
        /// Group name (unique)
        name: String,
        /// Leader member ID
        #[arg(long)]
        leader: i64,
        /// Group description
        #[arg(long)]
        description: Option<String>,
        /// Picture reference
        #[arg(long)]
        picture: Option<String>,
        /// Maximum personnel
        #[arg(long)]
        max_personnel: Option<u32>,
    },
    /// Show a group with its roster's activity
    Show {
        /// Group ID
        group_id: i64,
        /// Reporting period for statistics
        #[arg(long, value_enum, default_value_t = PeriodArg::Weekly)]
        period: PeriodArg,
    },
    /// List roster members with their activity
    Members {
        /// Group ID
        group_id: i64,
        /// Reporting period for statistics
        #[arg(long, value_enum, default_value_t = PeriodArg::Daily)]
        period: PeriodArg,
    },
    /// List groups a member leads or has joined
    List {
        /// Member ID
        #[arg(long)]
        member: i64,
    },
    /// Search groups by name fragment
    Search {
        /// Name fragment (case-insensitive)
        fragment: String,
        /// Member ID the results are annotated for
        #[arg(long)]
        member: i64,
    },
    /// Update group metadata
    Update {
        /// Group ID
        group_id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New description
        #[arg(long)]
        description: Option<String>,
        /// New picture reference
        #[arg(long)]
        picture: Option<String>,
        /// New maximum personnel
        #[arg(long)]
        max_personnel: Option<u32>,
    },
    /// Delete a group (leader only)
    Delete {
        /// Group ID
        group_id: i64,
        /// Requesting member ID
        #[arg(long)]
        member: i64,
    },
}

#[derive(Subcommand)]
pub enum MembershipCommand {
    /// Request to join a group
    Request {
        /// Group ID
        group_id: i64,
        /// Member ID
        member_id: i64,
    },
    /// Answer or withdraw a pending request (ACCEPT, REJECT or CANCEL)
    Respond {
        /// Group ID
        group_id: i64,
        /// Member ID
        member_id: i64,
        /// Target state
        state: String,
    },
    /// Leave a group
    Leave {
        /// Group ID
        group_id: i64,
        /// Member ID
        member_id: i64,
    },
    /// Hand leadership to an accepted member
    Transfer {
        /// Group ID
        group_id: i64,
        /// Current leader member ID
        #[arg(long)]
        from: i64,
        /// New leader member ID
        #[arg(long)]
        to: i64,
    },
    /// List groups a member has pending requests for
    Pending {
        /// Member ID
        member_id: i64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PeriodArg {
    Daily,
    Weekly,
}

impl From<PeriodArg> for ReportingPeriod {
    fn from(p: PeriodArg) -> Self {
        match p {
            PeriodArg::Daily => ReportingPeriod::Daily,
            PeriodArg::Weekly => ReportingPeriod::Weekly,
        }
    }
}
