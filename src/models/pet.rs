use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Species {
    Dog,
    Cat,
}

/// The slice of a pet record the analysis lifecycle reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pet {
    pub id: i64,
    /// Identity (user id) of the owning account.
    pub owner_id: String,
    pub name: String,
    pub species: Species,
    pub breed: Option<String>,
    pub updated_at: DateTime<Utc>,
}
