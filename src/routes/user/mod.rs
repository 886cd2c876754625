mod handler;
pub(crate) mod model;

pub use handler::{
    change_password, deactivate_account, directory, list_users, login, me, register,
    set_user_status, update_profile, upload_avatar,
};
