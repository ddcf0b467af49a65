// User persistence: uniqueness checks, normalization on save, lookups
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::accounts::domain::*;
use crate::db::{self, DbPool};
use crate::error::{ModelError, ModelResult};
use crate::validation::{ErrorKind, ValidationErrors};

/// Column list for `users` aliased as `u`, in `user_from_row` order.
pub(crate) const USER_COLUMNS: &str = "u.id, u.email, u.username, u.first_name, u.last_name, \
    u.is_public, u.encrypted_password, u.created_at, u.updated_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        email: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        is_public: row.get(5)?,
        encrypted_password: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn validate(
    conn: &Connection,
    except: Option<&UserId>,
    email: &str,
    username: &str,
    first_name: &str,
) -> ModelResult<ValidationErrors> {
    let mut errors = validate_attributes(email, username, first_name);
    let except = except.map(UserId::as_str).unwrap_or("");

    if !email.trim().is_empty() {
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE email = ?1 AND id <> ?2",
            params![email, except],
            |row| row.get(0),
        )?;
        if taken {
            errors.add("email", ErrorKind::Taken);
        }
    }

    if !username.trim().is_empty() {
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 AND id <> ?2",
            params![username, except],
            |row| row.get(0),
        )?;
        if taken {
            errors.add("username", ErrorKind::Taken);
        }
    }

    Ok(errors)
}

/// Maps a unique index failure that slipped past validation to the same
/// field-level error validation would have produced.
fn taken_error(err: rusqlite::Error) -> ModelError {
    match db::unique_violation_columns(&err) {
        Some(columns) => {
            let mut errors = ValidationErrors::new();
            for column in columns {
                match column.as_str() {
                    "email" => errors.add("email", ErrorKind::Taken),
                    "username" => errors.add("username", ErrorKind::Taken),
                    _ => {}
                }
            }
            if errors.is_empty() {
                err.into()
            } else {
                errors.into()
            }
        }
        None => err.into(),
    }
}

pub(crate) fn load_user(conn: &Connection, id: &UserId) -> ModelResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
        params![id.as_str()],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| ModelError::not_found("user", id.as_str()))
}

/// Validation result for a prospective user, without saving anything.
pub fn validate_new_user(pool: &DbPool, user: &NewUser) -> ModelResult<ValidationErrors> {
    let conn = pool.get()?;
    validate(
        &conn,
        None,
        &normalize_email(&user.email),
        &user.username,
        &user.first_name,
    )
}

/// Validation result for an existing (possibly modified) user.
pub fn validate_user(pool: &DbPool, user: &User) -> ModelResult<ValidationErrors> {
    let conn = pool.get()?;
    validate(
        &conn,
        Some(&user.id),
        &normalize_email(&user.email),
        &user.username,
        &user.first_name,
    )
}

pub fn create_user(pool: &DbPool, new_user: NewUser) -> ModelResult<User> {
    let conn = pool.get()?;

    let email = normalize_email(&new_user.email);
    validate(
        &conn,
        None,
        &email,
        &new_user.username,
        &new_user.first_name,
    )?
    .into_result()?;

    let id = UserId::new(db::new_id());
    conn.execute(
        "INSERT INTO users (id, email, username, first_name, last_name, is_public, encrypted_password)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.as_str(),
            email,
            new_user.username,
            capitalize(&new_user.first_name),
            new_user.last_name,
            new_user.is_public,
            new_user.encrypted_password,
        ],
    )
    .map_err(taken_error)?;

    tracing::info!(user_id = %id, username = %new_user.username, "Created user");
    load_user(&conn, &id)
}

/// Validates and persists every attribute of `user`. On success the struct
/// is refreshed with the stored (normalized) values; on failure neither the
/// row nor the struct is touched.
pub fn save_user(pool: &DbPool, user: &mut User) -> ModelResult<()> {
    let conn = pool.get()?;

    let email = normalize_email(&user.email);
    validate(
        &conn,
        Some(&user.id),
        &email,
        &user.username,
        &user.first_name,
    )?
    .into_result()?;

    let rows = conn
        .execute(
            "UPDATE users SET email = ?2, username = ?3, first_name = ?4, last_name = ?5,
                is_public = ?6, encrypted_password = ?7, updated_at = datetime('now')
             WHERE id = ?1",
            params![
                user.id.as_str(),
                email,
                user.username,
                capitalize(&user.first_name),
                user.last_name,
                user.is_public,
                user.encrypted_password,
            ],
        )
        .map_err(taken_error)?;

    if rows == 0 {
        return Err(ModelError::not_found("user", user.id.as_str()));
    }

    *user = load_user(&conn, &user.id)?;
    tracing::info!(user_id = %user.id, "Saved user");
    Ok(())
}

pub fn find_user(pool: &DbPool, id: &UserId) -> ModelResult<User> {
    let conn = pool.get()?;
    load_user(&conn, id)
}

pub fn find_by_username(pool: &DbPool, username: &str) -> ModelResult<Option<User>> {
    let conn = pool.get()?;
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()?)
}

pub fn find_by_email(pool: &DbPool, email: &str) -> ModelResult<Option<User>> {
    let conn = pool.get()?;
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1"),
            params![normalize_email(email)],
            user_from_row,
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    const EMAIL: &str = "adam@example.org";

    #[test]
    fn valid_when_email_is_unique() {
        let pool = testing::pool();
        let user1 = testing::user(&pool);
        let user2 = testing::user(&pool);
        assert_ne!(user1.email, user2.email);
        assert!(validate_user(&pool, &user2).unwrap().is_empty());
    }

    #[test]
    fn invalid_if_email_is_taken() {
        let pool = testing::pool();
        create_user(&pool, NewUser::new("Adam", EMAIL, "adam123")).unwrap();

        let errors = validate_new_user(&pool, &NewUser::new("Other", EMAIL, "other")).unwrap();
        assert!(errors.has("email", ErrorKind::Taken));

        let err = create_user(&pool, NewUser::new("Other", EMAIL, "other")).unwrap_err();
        assert!(err.is_invalid_on("email", ErrorKind::Taken));
    }

    #[test]
    fn email_uniqueness_ignores_case_and_whitespace() {
        let pool = testing::pool();
        create_user(&pool, NewUser::new("Adam", EMAIL, "adam123")).unwrap();

        let err =
            create_user(&pool, NewUser::new("Adam", " ADAM@example.org", "adam456")).unwrap_err();
        assert!(err.is_invalid_on("email", ErrorKind::Taken));
    }

    #[test]
    fn invalid_if_username_is_taken() {
        let pool = testing::pool();
        let user = create_user(&pool, NewUser::new("Adam", EMAIL, "adam12")).unwrap();
        let mut another =
            create_user(&pool, NewUser::new("Finn", "finn@example.org", "finn42")).unwrap();
        assert!(validate_user(&pool, &user).unwrap().is_empty());
        assert!(validate_user(&pool, &another).unwrap().is_empty());

        another.username = "adam12".to_string();
        assert!(validate_user(&pool, &another)
            .unwrap()
            .has("username", ErrorKind::Taken));
        assert!(save_user(&pool, &mut another)
            .unwrap_err()
            .is_invalid_on("username", ErrorKind::Taken));
    }

    #[test]
    fn username_uniqueness_is_case_sensitive() {
        let pool = testing::pool();
        create_user(&pool, NewUser::new("Adam", EMAIL, "adam12")).unwrap();
        assert!(create_user(&pool, NewUser::new("Adam", "a2@example.org", "Adam12")).is_ok());
    }

    #[test]
    fn blank_first_name_fails_and_keeps_stored_value() {
        let pool = testing::pool();
        let mut user = testing::user(&pool);
        assert!(validate_user(&pool, &user).unwrap().is_empty());

        user.first_name = String::new();
        let err = save_user(&pool, &mut user).unwrap_err();
        assert!(err.is_invalid_on("first_name", ErrorKind::Blank));

        user.first_name = "   ".to_string();
        assert!(save_user(&pool, &mut user).is_err());

        let stored = find_user(&pool, &user.id).unwrap();
        assert_eq!(stored.first_name, "User");
    }

    #[test]
    fn save_capitalizes_first_name_only() {
        let pool = testing::pool();
        let mut user = testing::user(&pool);
        user.first_name = "AdaM".to_string();
        user.last_name = Some("van der Berg".to_string());
        save_user(&pool, &mut user).unwrap();

        assert_eq!(user.first_name, "Adam");
        assert_eq!(user.last_name.as_deref(), Some("van der Berg"));

        let stored = find_user(&pool, &user.id).unwrap();
        assert_eq!(stored.first_name, "Adam");
        assert_eq!(stored.last_name.as_deref(), Some("van der Berg"));
    }

    #[test]
    fn email_format_is_checked_on_save() {
        let pool = testing::pool();
        let mut user = testing::user(&pool);

        for email in ["f.o.o.b.a.r@example.com", "foo+bar@example.com", "foo.bar@sub.example.co.id"] {
            user.email = email.to_string();
            assert!(validate_user(&pool, &user).unwrap().is_empty(), "{}", email);
        }

        for email in ["", "foo.bar", "foo.bar#example.com"] {
            user.email = email.to_string();
            assert!(!validate_user(&pool, &user).unwrap().is_empty(), "{}", email);
        }
    }

    #[test]
    fn new_users_are_public_by_default() {
        let pool = testing::pool();
        let public = testing::user(&pool);
        let private =
            create_user(&pool, NewUser::new("Rin", "rin@example.org", "rin").private()).unwrap();
        assert!(public.is_public);
        assert!(!private.is_public);
    }

    #[test]
    fn finds_by_username_and_email() {
        let pool = testing::pool();
        let user = create_user(&pool, NewUser::new("Sam", "sam@example.org", "samsam")).unwrap();

        assert_eq!(find_by_username(&pool, "samsam").unwrap(), Some(user.clone()));
        assert_eq!(find_by_email(&pool, "SAM@example.org").unwrap(), Some(user));
        assert_eq!(find_by_username(&pool, "nobody").unwrap(), None);
        assert!(matches!(
            find_user(&pool, &UserId::new("missing")),
            Err(ModelError::NotFound { entity: "user", .. })
        ));
    }
}
