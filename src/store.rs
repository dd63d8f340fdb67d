//! The document store: `songs`, `sunday_leaders` and the `users` profile
//! side-record, with live-query subscriptions.
//!
//! Every write publishes a fresh snapshot of the affected collection to its
//! subscribers, tagged with the per-document changes that produced it.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::AppError;
use crate::models::{DbSong, DbSundayLeader, Song, SongFields, Sunday, SundayLeader};

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocChange {
    Added(String),
    Modified(String),
    Removed(String),
}

/// Full contents of a collection after a change, plus what changed.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub docs: Vec<T>,
    pub changes: Vec<DocChange>,
}

/// What a feed carries: a snapshot, or the reason the post-write read failed.
type Published<T> = Result<Snapshot<T>, String>;

pub struct Subscription<T> {
    initial: Option<Snapshot<T>>,
    rx: broadcast::Receiver<Published<T>>,
}

impl<T: Clone> Subscription<T> {
    /// Waits for the next snapshot. The first call returns the snapshot taken
    /// when the subscription was opened. `Ok(None)` means the feed is closed.
    pub async fn next(&mut self) -> Result<Option<Snapshot<T>>, AppError> {
        if let Some(snapshot) = self.initial.take() {
            return Ok(Some(snapshot));
        }

        match self.rx.recv().await {
            Ok(Ok(snapshot)) => Ok(Some(snapshot)),
            Ok(Err(reason)) => Err(AppError::Subscription(reason)),
            Err(broadcast::error::RecvError::Lagged(missed)) => Err(AppError::Subscription(
                format!("Subscriber fell behind and missed {} snapshots", missed),
            )),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
        }
    }
}

struct Feed<T> {
    tx: broadcast::Sender<Published<T>>,
    // Held across fetch and send so snapshots go out in write order.
    publish: Mutex<()>,
}

impl<T: Clone> Feed<T> {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tx,
            publish: Mutex::new(()),
        }
    }

    /// Sends the re-read collection to subscribers, or the read failure.
    fn send(&self, collection: &str, docs: Result<Vec<T>, AppError>, change: DocChange) {
        let published = match docs {
            Ok(docs) => Ok(Snapshot {
                docs,
                changes: vec![change],
            }),
            Err(e) => {
                error!(error = %e, "Failed to read {} after write", collection);
                Err(format!("Failed to read {} after write: {}", collection, e))
            }
        };

        let delivered = self.tx.send(published).unwrap_or(0);
        debug!("Published {} snapshot to {} subscribers", collection, delivered);
    }
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: Pool<Sqlite>,
    songs: Arc<Feed<Song>>,
    leaders: Arc<Feed<SundayLeader>>,
}

impl DocumentStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        info!("Document store initialized with feed capacity {}", FEED_CAPACITY);
        Self {
            pool,
            songs: Arc::new(Feed::new()),
            leaders: Arc::new(Feed::new()),
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn subscribe_songs(&self) -> Result<Subscription<Song>, AppError> {
        // Subscribe before reading so no write can slip between the two.
        let rx = self.songs.tx.subscribe();
        let docs = self.fetch_songs().await?;
        let changes = docs.iter().map(|s| DocChange::Added(s.id.clone())).collect();

        Ok(Subscription {
            initial: Some(Snapshot { docs, changes }),
            rx,
        })
    }

    #[instrument(skip(self))]
    pub async fn subscribe_leaders(&self) -> Result<Subscription<SundayLeader>, AppError> {
        let rx = self.leaders.tx.subscribe();
        let docs = self.fetch_leaders().await?;
        let changes = docs.iter().map(|l| DocChange::Added(l.id.clone())).collect();

        Ok(Subscription {
            initial: Some(Snapshot { docs, changes }),
            rx,
        })
    }

    /// Songs, newest first.
    #[instrument(skip(self))]
    pub async fn fetch_songs(&self) -> Result<Vec<Song>, AppError> {
        let rows = sqlx::query_as::<_, DbSong>(
            "SELECT id, title, song_key, youtube_link, sequence, sunday, created_at, updated_at, created_by
             FROM songs
             ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Song::try_from).collect()
    }

    #[instrument(skip(self))]
    pub async fn fetch_leaders(&self) -> Result<Vec<SundayLeader>, AppError> {
        let rows = sqlx::query_as::<_, DbSundayLeader>(
            "SELECT id, sunday, leader_name, created_at, updated_at, created_by FROM sunday_leaders",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SundayLeader::try_from).collect()
    }

    #[instrument(skip(self, song), fields(title = %song.title, sunday = %song.sunday))]
    pub async fn add_song(&self, song: &SongFields, created_by: &str) -> Result<String, AppError> {
        info!("Adding song");
        let id = new_document_id();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO songs
             (id, title, song_key, youtube_link, sequence, sunday, created_at, updated_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&song.title)
        .bind(&song.key)
        .bind(&song.youtube_link)
        .bind(&song.sequence)
        .bind(song.sunday.as_str())
        .bind(now)
        .bind(now)
        .bind(created_by)
        .execute(&self.pool)
        .await?;

        self.publish_songs(DocChange::Added(id.clone())).await;
        Ok(id)
    }

    #[instrument(skip(self, song))]
    pub async fn update_song(&self, id: &str, song: &SongFields) -> Result<(), AppError> {
        info!("Updating song");
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            "UPDATE songs
             SET title = ?, song_key = ?, youtube_link = ?, sequence = ?, sunday = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&song.title)
        .bind(&song.key)
        .bind(&song.youtube_link)
        .bind(&song.sequence)
        .bind(song.sunday.as_str())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Song {} not found", id)));
        }

        self.publish_songs(DocChange::Modified(id.to_string())).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_song(&self, id: &str) -> Result<(), AppError> {
        info!("Deleting song");
        let result = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Song {} not found", id)));
        }

        self.publish_songs(DocChange::Removed(id.to_string())).await;
        Ok(())
    }

    /// Creates the slot's leader record, or renames it when one already
    /// exists. Returns the record id, which stays the same across renames.
    #[instrument(skip(self))]
    pub async fn upsert_leader(
        &self,
        sunday: Sunday,
        leader_name: &str,
        created_by: &str,
    ) -> Result<String, AppError> {
        info!("Upserting Sunday leader");
        let new_id = new_document_id();
        let now = Utc::now().naive_utc();

        let (id,) = sqlx::query_as::<_, (String,)>(
            "INSERT INTO sunday_leaders (id, sunday, leader_name, created_at, updated_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (sunday) DO UPDATE SET
                leader_name = excluded.leader_name,
                updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(&new_id)
        .bind(sunday.as_str())
        .bind(leader_name)
        .bind(now)
        .bind(now)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        let change = if id == new_id {
            DocChange::Added(id.clone())
        } else {
            DocChange::Modified(id.clone())
        };
        self.publish_leaders(change).await;
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, uid: &str) -> Result<Option<Identity>, AppError> {
        debug!("Fetching user profile");
        let row = sqlx::query_as::<_, (String, Option<String>, Option<String>, bool)>(
            "SELECT uid, email, display_name, is_admin FROM users WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(uid, email, display_name, is_admin)| Identity {
            uid,
            email,
            display_name,
            is_admin,
        }))
    }

    #[instrument(skip(self, profile), fields(uid = %profile.uid))]
    pub async fn set_profile(&self, profile: &Identity) -> Result<(), AppError> {
        info!("Writing user profile");
        sqlx::query(
            "INSERT INTO users (uid, email, display_name, is_admin) VALUES (?, ?, ?, ?)
             ON CONFLICT (uid) DO UPDATE SET
                email = excluded.email,
                display_name = excluded.display_name,
                is_admin = excluded.is_admin",
        )
        .bind(&profile.uid)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(profile.is_admin)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn publish_songs(&self, change: DocChange) {
        let _guard = self.songs.publish.lock().await;
        let docs = self.fetch_songs().await;
        self.songs.send("songs", docs, change);
    }

    async fn publish_leaders(&self, change: DocChange) {
        let _guard = self.leaders.publish.lock().await;
        let docs = self.fetch_leaders().await;
        self.leaders.send("leaders", docs, change);
    }
}

fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}
