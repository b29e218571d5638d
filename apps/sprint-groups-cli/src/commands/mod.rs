pub mod group;
pub mod member;
pub mod membership;

pub use group::{
    cmd_group_create, cmd_group_delete, cmd_group_list, cmd_group_members, cmd_group_search,
    cmd_group_show, cmd_group_update,
};
pub use member::cmd_member_add;
pub use membership::{
    cmd_membership_leave, cmd_membership_pending, cmd_membership_request,
    cmd_membership_respond, cmd_membership_transfer,
};
