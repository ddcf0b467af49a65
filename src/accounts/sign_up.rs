use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::accounts::domain::NewUser;
use crate::accounts::repository::{create_user, validate_new_user};
use crate::accounts::User;
use crate::config::AuthConfig;
use crate::db::DbPool;
use crate::error::ModelResult;
use crate::validation::{ErrorKind, ValidationErrors};

/// Fields a visitor may set when signing up. Anything else is dropped.
pub const PERMITTED_SIGN_UP_KEYS: [&str; 6] = [
    "first_name",
    "last_name",
    "username",
    "email",
    "password",
    "password_confirmation",
];

const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SignUpParams {
    #[serde(deserialize_with = "null_as_empty")]
    pub first_name: String,
    pub last_name: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub username: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub password: String,
    pub password_confirmation: Option<String>,
}

/// A submitted `null` is treated like a missing value, so it fails the
/// presence check instead of the parse.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Keeps only the permitted keys of a submitted sign-up object.
pub fn permit_sign_up(params: &Value) -> ModelResult<SignUpParams> {
    let Some(object) = params.as_object() else {
        let mut errors = ValidationErrors::new();
        errors.add("params", ErrorKind::Invalid);
        return Err(errors.into());
    };

    let mut permitted = Map::new();
    for (key, value) in object {
        if PERMITTED_SIGN_UP_KEYS.contains(&key.as_str()) {
            permitted.insert(key.clone(), value.clone());
        } else {
            tracing::warn!(key = %key, "Unpermitted sign-up parameter");
        }
    }

    Ok(serde_json::from_value(Value::Object(permitted))?)
}

pub fn validate_password(
    password: &str,
    confirmation: Option<&str>,
    min_length: usize,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if password.is_empty() {
        errors.add("password", ErrorKind::Blank);
    } else if password.chars().count() < min_length {
        errors.add("password", ErrorKind::TooShort { min: min_length });
    } else if password.chars().count() > MAX_PASSWORD_LENGTH {
        errors.add(
            "password",
            ErrorKind::TooLong {
                max: MAX_PASSWORD_LENGTH,
            },
        );
    }
    if let Some(confirmation) = confirmation {
        if confirmation != password {
            errors.add("password_confirmation", ErrorKind::Confirmation);
        }
    }
    errors
}

/// Registers a user from permitted sign-up params, storing a bcrypt hash of
/// the password. All field errors are reported together.
pub fn sign_up(pool: &DbPool, params: SignUpParams, auth: &AuthConfig) -> ModelResult<User> {
    let mut new_user = NewUser::new(params.first_name, params.email, params.username);
    new_user.last_name = params.last_name;

    let mut errors = validate_new_user(pool, &new_user)?;
    errors.merge(validate_password(
        &params.password,
        params.password_confirmation.as_deref(),
        auth.min_password_length,
    ));
    errors.into_result()?;

    new_user.encrypted_password = bcrypt::hash(&params.password, auth.bcrypt_cost)?;
    create_user(pool, new_user)
}
