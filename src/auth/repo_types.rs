use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

pub type UserId = i32;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: UserId,                   // SERIAL primary key
    pub name: String,                 // display name
    pub email: String,                // unique, stored as given
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 PHC string, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,   // set by the database on insert
}

/// Row to insert; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}
