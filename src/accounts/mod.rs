pub mod domain;
pub mod repository;
pub mod sign_up;

pub use domain::{capitalize, NewUser, User, UserId};
pub use repository::{
    create_user, find_by_email, find_by_username, find_user, save_user, validate_new_user,
    validate_user,
};
pub use sign_up::{permit_sign_up, sign_up, SignUpParams, PERMITTED_SIGN_UP_KEYS};
