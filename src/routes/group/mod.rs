mod handler;
mod model;

pub use handler::{
    add_member, approve_request, create_group, delete_group, get_group, join_group, leave_group,
    list_groups, list_join_requests, reject_request, remove_member, update_group,
    update_member_role,
};
