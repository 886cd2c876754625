mod handler;
mod model;

pub use handler::{
    add_comment, create_post, delete_post, get_post, list_group_posts, list_posts,
    list_user_posts, remove_comment, toggle_comment_like, toggle_like, update_post,
};
