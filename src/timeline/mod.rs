pub mod domain;
pub mod repository;

pub use domain::{
    ActivityType, NewPost, NewPostable, Post, PostId, Postable, PostableKind, Sight, Status,
    Summary,
};
pub use repository::{create_post, find_post, home_timeline, posts_by_user, replies, thread_root};
