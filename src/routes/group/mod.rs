mod handler;
pub mod lifecycle;
mod model;

pub use handler::{
    create_group,
    delete_group,
    find_by_id,
    get_members,
    join_group,
    kick_member,
    leave_group,
    resolve_session_group,
};
pub use model::{Group, GroupInfo};
