//! Group membership for the sprint fitness app.
//!
//! [`MembershipStateMachine`] owns the transition rules for (group, member)
//! records; [`GroupService`] resolves groups and members, drives the machine,
//! publishes [`sprint_events::MembershipEvent`]s, and composes listings and
//! activity summaries.

mod error;
pub mod machine;
mod service;
pub mod statistics;

pub use error::GroupError;
pub use machine::{MembershipStateMachine, MembershipView};
pub use service::*;
pub use statistics::{
    ActivityStatistics, ReportingPeriod, StatisticsError, StatisticsProvider, Unreported,
};
