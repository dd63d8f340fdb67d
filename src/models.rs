use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One of the five recurring day-slots songs and leaders are grouped under.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Sunday {
    #[default]
    First,
    Second,
    Third,
    Fourth,
    Fifth,
}

impl Sunday {
    pub const ALL: [Sunday; 5] = [
        Sunday::First,
        Sunday::Second,
        Sunday::Third,
        Sunday::Fourth,
        Sunday::Fifth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sunday::First => "first",
            Sunday::Second => "second",
            Sunday::Third => "third",
            Sunday::Fourth => "fourth",
            Sunday::Fifth => "fifth",
        }
    }
}

impl FromStr for Sunday {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Sunday::First),
            "second" => Ok(Sunday::Second),
            "third" => Ok(Sunday::Third),
            "fourth" => Ok(Sunday::Fourth),
            "fifth" => Ok(Sunday::Fifth),
            _ => Err(AppError::Validation(format!("Unknown Sunday: {}", s))),
        }
    }
}

impl fmt::Display for Sunday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'a> FromParam<'a> for Sunday {
    type Error = AppError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub key: Option<String>,
    pub youtube_link: String,
    pub sequence: String,
    pub sunday: Sunday,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbSong {
    pub id: Option<String>,
    pub title: Option<String>,
    pub song_key: Option<String>,
    pub youtube_link: Option<String>,
    pub sequence: Option<String>,
    pub sunday: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub created_by: Option<String>,
}

impl TryFrom<DbSong> for Song {
    type Error = AppError;

    fn try_from(db: DbSong) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            key: db.song_key.filter(|k| !k.is_empty()),
            youtube_link: db.youtube_link.unwrap_or_default(),
            sequence: db.sequence.unwrap_or_default(),
            sunday: db.sunday.unwrap_or_default().parse()?,
            created_at: stored_or_now(db.created_at),
            updated_at: stored_or_now(db.updated_at),
            created_by: db.created_by.unwrap_or_default(),
        })
    }
}

/// The editable fields of a song; everything else is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SongFields {
    pub title: String,
    pub key: Option<String>,
    pub youtube_link: String,
    pub sequence: String,
    pub sunday: Sunday,
}

impl SongFields {
    /// Trims every field, drops a blank key, and rejects blank required fields.
    pub fn normalized(self) -> Result<Self, AppError> {
        let title = required("title", &self.title)?;
        let youtube_link = required("youtube_link", &self.youtube_link)?;
        let sequence = required("sequence", &self.sequence)?;
        let key = self
            .key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            title,
            key,
            youtube_link,
            sequence,
            sunday: self.sunday,
        })
    }
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SundayLeader {
    pub id: String,
    pub sunday: Sunday,
    pub leader_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbSundayLeader {
    pub id: Option<String>,
    pub sunday: Option<String>,
    pub leader_name: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub created_by: Option<String>,
}

impl TryFrom<DbSundayLeader> for SundayLeader {
    type Error = AppError;

    fn try_from(db: DbSundayLeader) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            sunday: db.sunday.unwrap_or_default().parse()?,
            leader_name: db.leader_name.unwrap_or_default(),
            created_at: stored_or_now(db.created_at),
            updated_at: stored_or_now(db.updated_at),
            created_by: db.created_by.unwrap_or_default(),
        })
    }
}

// Rows written before the store stamped them read back as "now".
fn stored_or_now(value: Option<NaiveDateTime>) -> DateTime<Utc> {
    value
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}
