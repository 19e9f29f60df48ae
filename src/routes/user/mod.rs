mod handler;
mod model;

pub use handler::{
    check_token,
    create_temporary,
    heartbeat,
    login,
    refresh_token,
    register,
    set_role,
    update_nickname,
};
pub use model::User;
