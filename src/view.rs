use serde::Serialize;

use crate::auth::{Identity, Permission};
use crate::format::{extract_video_id, format_sunday, sunday_order, thumbnail_url};
use crate::models::{Song, Sunday, SundayLeader};
use crate::sync::LineupState;

#[derive(Debug, Clone, Serialize)]
pub struct SongView {
    #[serde(flatten)]
    pub song: Song,
    pub video_id: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl From<Song> for SongView {
    fn from(song: Song) -> Self {
        let video_id = extract_video_id(&song.youtube_link).map(str::to_string);
        let thumbnail_url = video_id.as_deref().map(thumbnail_url);
        Self {
            song,
            video_id,
            thumbnail_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SundayView {
    pub sunday: Sunday,
    pub label: &'static str,
    pub order: u8,
    pub leader: Option<SundayLeader>,
    pub songs: Vec<SongView>,
}

/// All five Sundays in calendar order, each with its leader and songs.
#[derive(Debug, Clone, Serialize)]
pub struct LineupView {
    pub is_admin: bool,
    pub loading: bool,
    pub can_manage_songs: bool,
    pub can_manage_leaders: bool,
    pub sundays: Vec<SundayView>,
}

impl LineupView {
    pub fn build(state: &LineupState, viewer: &Identity) -> Self {
        let mut sundays: Vec<SundayView> = Sunday::ALL
            .iter()
            .map(|&sunday| SundayView {
                sunday,
                label: format_sunday(sunday),
                order: sunday_order(sunday),
                leader: state.leaders.get(&sunday).cloned(),
                songs: state
                    .songs
                    .iter()
                    .filter(|song| song.sunday == sunday)
                    .cloned()
                    .map(SongView::from)
                    .collect(),
            })
            .collect();
        sundays.sort_by_key(|s| s.order);

        Self {
            is_admin: viewer.is_admin,
            loading: state.loading,
            can_manage_songs: viewer.has_permission(Permission::ManageSongs),
            can_manage_leaders: viewer.has_permission(Permission::ManageLeaders),
            sundays,
        }
    }
}
