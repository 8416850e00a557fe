use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// A tenant: one club's independent namespace within the shared service.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct Club {
    /// Unique club ID
    pub id: i64,

    /// The club's display name
    pub name: String,

    /// Messaging address of the club administrator
    pub admin_contact: String,
}

/// An external messaging identity. One address may control several
/// player profiles (a parent signing up their kids, for example).
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,

    /// The messaging network address, e.g. a WhatsApp phone number
    pub address: String,

    /// Unix timestamp of first contact
    pub created_at: i64,
}
