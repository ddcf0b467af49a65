pub mod domain;
pub mod repository;

pub use domain::{Bond, BondId, BondState};
pub use repository::{
    accept_request, create_bond, find_bond, follow, follow_requests, followers, followings,
    pending_requests, unfollow,
};
