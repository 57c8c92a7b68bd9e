use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

/// One per user. `registered` is stamped at creation and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub email: String,
    pub sex: Sex,
    pub registered: String,
    pub bio: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Man,
    Woman,
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Man => "Man",
            Sex::Woman => "Woman",
            Sex::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Man" => Some(Sex::Man),
            "Woman" => Some(Sex::Woman),
            "Other" => Some(Sex::Other),
            _ => None,
        }
    }
}

impl Profile {
    /// Maps a row selected as
    /// `id, user_id, first_name, last_name, nick_name, email, sex, registered, bio, image`.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let sex: String = row.get(6)?;
        Ok(Profile {
            id: row.get(0)?,
            user_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            nick_name: row.get(4)?,
            email: row.get(5)?,
            sex: Sex::parse(&sex).unwrap_or(Sex::Other),
            registered: row.get(7)?,
            bio: row.get(8)?,
            image: row.get(9)?,
        })
    }
}

/// Abbreviated profile used when listing someone's followers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub email: String,
    pub image: Option<String>,
}

/// `like_count` and `liked_by` are derived from the likes table on every
/// read; they are never stored on the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub topic: String,
    pub body: String,
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub like_count: i64,
    pub liked_by: Vec<String>,
}

impl Post {
    /// Maps a row selected as
    /// `id, email, topic, body, image, created_at, updated_at, like_count`.
    /// `liked_by` is filled in by a follow-up query.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get(0)?,
            author: row.get(1)?,
            topic: row.get(2)?,
            body: row.get(3)?,
            image: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            like_count: row.get(7)?,
            liked_by: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Comment {
    /// Maps a row selected as `id, post_id, email, body, created_at, updated_at`.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Comment {
            id: row.get(0)?,
            post_id: row.get(1)?,
            author: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}
