//! Keeps a local copy of the songs and leader collections in step with the
//! document store, and forwards edits to it.
//!
//! Edits never touch the local copy. It changes only when the store's change
//! notification for that edit comes back through the subscription.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, instrument};

use crate::auth::{Identity, Permission};
use crate::error::AppError;
use crate::models::{Song, SongFields, Sunday, SundayLeader};
use crate::store::{DocumentStore, Snapshot, Subscription};
use crate::view::LineupView;

const EVENT_CAPACITY: usize = 100;

pub const SONGS_LOAD_FAILED: &str = "Error loading songs";
pub const LEADERS_LOAD_FAILED: &str = "Error loading Sunday leaders";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A transient message for the user, shown once and then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: &str) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.to_string(),
        }
    }
}

/// An edit that did not go through, and the notice to show for it.
#[derive(Debug)]
pub struct MutationFailure {
    pub error: AppError,
    pub notice: Notice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineupEvent {
    Changed,
    Notice(Notice),
}

#[derive(Debug, Clone)]
pub struct LineupState {
    pub songs: Vec<Song>,
    pub leaders: HashMap<Sunday, SundayLeader>,
    pub loading: bool,
}

impl Default for LineupState {
    fn default() -> Self {
        Self {
            songs: Vec::new(),
            leaders: HashMap::new(),
            loading: true,
        }
    }
}

#[derive(Clone)]
pub struct Lineup {
    store: DocumentStore,
    state: Arc<RwLock<LineupState>>,
    events: broadcast::Sender<LineupEvent>,
}

/// The two open subscriptions feeding a [`Lineup`].
pub struct Feeds {
    lineup: Lineup,
    songs: Subscription<Song>,
    leaders: Subscription<SundayLeader>,
}

impl Lineup {
    /// Opens both subscriptions without consuming them.
    pub async fn open(store: DocumentStore) -> Result<(Self, Feeds), AppError> {
        let songs = store.subscribe_songs().await?;
        let leaders = store.subscribe_leaders().await?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let lineup = Self {
            store,
            state: Arc::new(RwLock::new(LineupState::default())),
            events,
        };

        let feeds = Feeds {
            lineup: lineup.clone(),
            songs,
            leaders,
        };

        Ok((lineup, feeds))
    }

    /// Opens both subscriptions and keeps applying them in the background.
    pub async fn mount(store: DocumentStore) -> Result<Self, AppError> {
        let (lineup, feeds) = Self::open(store).await?;
        feeds.spawn();
        info!("Lineup subscriptions mounted");
        Ok(lineup)
    }

    pub async fn songs(&self) -> Vec<Song> {
        self.state.read().await.songs.clone()
    }

    pub async fn leader(&self, sunday: Sunday) -> Option<SundayLeader> {
        self.state.read().await.leaders.get(&sunday).cloned()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn view(&self, viewer: &Identity) -> LineupView {
        LineupView::build(&*self.state.read().await, viewer)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LineupEvent> {
        self.events.subscribe()
    }

    #[instrument(skip(self, actor, song), fields(uid = %actor.uid))]
    pub async fn add_song(&self, actor: &Identity, song: SongFields) -> Result<Notice, MutationFailure> {
        let result = self.try_add_song(actor, song).await;
        surface(result, "Song added successfully!", "Error saving song", "add_song")
    }

    #[instrument(skip(self, actor, song), fields(uid = %actor.uid))]
    pub async fn update_song(
        &self,
        actor: &Identity,
        id: &str,
        song: SongFields,
    ) -> Result<Notice, MutationFailure> {
        let result = self.try_update_song(actor, id, song).await;
        surface(result, "Song updated successfully!", "Error saving song", "update_song")
    }

    #[instrument(skip(self, actor), fields(uid = %actor.uid))]
    pub async fn delete_song(&self, actor: &Identity, id: &str) -> Result<Notice, MutationFailure> {
        let result = match actor.require_permission(Permission::ManageSongs) {
            Ok(()) => self.store.delete_song(id).await,
            Err(e) => Err(e),
        };
        surface(result, "Song deleted successfully!", "Error deleting song", "delete_song")
    }

    /// Updates the slot's leader record if one is known locally, otherwise
    /// creates it.
    #[instrument(skip(self, actor), fields(uid = %actor.uid))]
    pub async fn upsert_leader(
        &self,
        actor: &Identity,
        sunday: Sunday,
        leader_name: &str,
    ) -> Result<Notice, MutationFailure> {
        let result = self.try_upsert_leader(actor, sunday, leader_name).await;
        surface(
            result,
            "Song leader updated successfully!",
            "Error updating song leader",
            "upsert_leader",
        )
    }

    async fn try_add_song(&self, actor: &Identity, song: SongFields) -> Result<String, AppError> {
        actor.require_permission(Permission::ManageSongs)?;
        let song = song.normalized()?;
        self.store.add_song(&song, &actor.uid).await
    }

    async fn try_update_song(
        &self,
        actor: &Identity,
        id: &str,
        song: SongFields,
    ) -> Result<(), AppError> {
        actor.require_permission(Permission::ManageSongs)?;
        let song = song.normalized()?;
        self.store.update_song(id, &song).await
    }

    async fn try_upsert_leader(
        &self,
        actor: &Identity,
        sunday: Sunday,
        leader_name: &str,
    ) -> Result<(), AppError> {
        actor.require_permission(Permission::ManageLeaders)?;

        let leader_name = leader_name.trim();
        if leader_name.is_empty() {
            return Err(AppError::Validation("Leader name is required".to_string()));
        }

        self.store
            .upsert_leader(sunday, leader_name, &actor.uid)
            .await
            .map(|_| ())
    }

    async fn apply_songs(&self, snapshot: Snapshot<Song>) {
        debug!(
            docs = snapshot.docs.len(),
            changes = ?snapshot.changes,
            "Applying songs snapshot"
        );
        {
            let mut state = self.state.write().await;
            state.songs = snapshot.docs;
            state.loading = false;
        }
        let _ = self.events.send(LineupEvent::Changed);
    }

    async fn apply_leaders(&self, snapshot: Snapshot<SundayLeader>) {
        debug!(
            docs = snapshot.docs.len(),
            changes = ?snapshot.changes,
            "Applying leaders snapshot"
        );
        // Should a slot hold more than one record, the last one delivered wins.
        let leaders = snapshot
            .docs
            .into_iter()
            .map(|leader| (leader.sunday, leader))
            .collect::<HashMap<_, _>>();

        self.state.write().await.leaders = leaders;
        let _ = self.events.send(LineupEvent::Changed);
    }

    async fn feed_failed(&self, error: AppError, message: &str, clears_loading: bool) {
        error.log_and_record(message);
        if clears_loading {
            self.state.write().await.loading = false;
        }
        let _ = self.events.send(LineupEvent::Notice(Notice::error(message)));
    }
}

impl Feeds {
    /// Applies the next songs snapshot. Returns `false` once the feed closes.
    pub async fn next_songs(&mut self) -> bool {
        pump_songs(&self.lineup, &mut self.songs).await
    }

    /// Applies the next leaders snapshot. Returns `false` once the feed closes.
    pub async fn next_leaders(&mut self) -> bool {
        pump_leaders(&self.lineup, &mut self.leaders).await
    }

    pub fn spawn(self) {
        let Feeds {
            lineup,
            mut songs,
            mut leaders,
        } = self;

        let songs_lineup = lineup.clone();
        tokio::spawn(async move { while pump_songs(&songs_lineup, &mut songs).await {} });
        tokio::spawn(async move { while pump_leaders(&lineup, &mut leaders).await {} });
    }
}

async fn pump_songs(lineup: &Lineup, feed: &mut Subscription<Song>) -> bool {
    match feed.next().await {
        Ok(Some(snapshot)) => {
            lineup.apply_songs(snapshot).await;
            true
        }
        Ok(None) => {
            info!("Songs feed closed");
            false
        }
        Err(e) => {
            lineup.feed_failed(e, SONGS_LOAD_FAILED, true).await;
            true
        }
    }
}

async fn pump_leaders(lineup: &Lineup, feed: &mut Subscription<SundayLeader>) -> bool {
    match feed.next().await {
        Ok(Some(snapshot)) => {
            lineup.apply_leaders(snapshot).await;
            true
        }
        Ok(None) => {
            info!("Leaders feed closed");
            false
        }
        Err(e) => {
            // Leaders never gate the loading indicator.
            lineup.feed_failed(e, LEADERS_LOAD_FAILED, false).await;
            true
        }
    }
}

fn surface<T>(
    result: Result<T, AppError>,
    success: &str,
    failure: &str,
    context: &str,
) -> Result<Notice, MutationFailure> {
    match result {
        Ok(_) => Ok(Notice::success(success)),
        Err(error) => {
            error.log_and_record(context);
            Err(MutationFailure {
                error,
                notice: Notice::error(failure),
            })
        }
    }
}
