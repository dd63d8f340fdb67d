#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use crate::auth::Identity;
    use crate::models::{Song, Sunday, SundayLeader};
    use crate::sync::LineupState;
    use crate::view::LineupView;

    fn song(id: &str, sunday: Sunday, link: &str) -> Song {
        Song {
            id: id.to_string(),
            title: format!("Song {}", id),
            key: None,
            youtube_link: link.to_string(),
            sequence: "V C".to_string(),
            sunday,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "admin-user".to_string(),
        }
    }

    fn state() -> LineupState {
        let leader = SundayLeader {
            id: "leader-1".to_string(),
            sunday: Sunday::Fourth,
            leader_name: "Hannah".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "admin-user".to_string(),
        };

        LineupState {
            songs: vec![
                song("c", Sunday::Fourth, "https://youtu.be/aaaaaaaaaaa"),
                song("b", Sunday::First, "https://example.com/not-youtube"),
                song("a", Sunday::Fourth, "https://www.youtube.com/embed/bbbbbbbbbbb"),
            ],
            leaders: HashMap::from([(Sunday::Fourth, leader)]),
            loading: false,
        }
    }

    #[test]
    fn test_sections_in_calendar_order() {
        let view = LineupView::build(&state(), &Identity::admin_bypass());

        let labels: Vec<&str> = view.sundays.iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            vec![
                "First Sunday",
                "Second Sunday",
                "Third Sunday",
                "Fourth Sunday",
                "Fifth Sunday"
            ]
        );
        assert!(view.is_admin);
        assert!(view.can_manage_songs);
        assert!(view.can_manage_leaders);
        assert!(!view.loading);
    }

    #[test]
    fn test_songs_grouped_in_subscription_order() {
        let view = LineupView::build(&state(), &Identity::admin_bypass());

        let fourth = &view.sundays[3];
        let ids: Vec<&str> = fourth.songs.iter().map(|s| s.song.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(
            fourth.leader.as_ref().map(|l| l.leader_name.as_str()),
            Some("Hannah")
        );

        assert_eq!(view.sundays[0].songs.len(), 1);
        assert!(view.sundays[0].leader.is_none());
        assert!(view.sundays[1].songs.is_empty());
    }

    #[test]
    fn test_video_ids_only_for_youtube_links() {
        let view = LineupView::build(&state(), &Identity::admin_bypass());

        let fourth = &view.sundays[3];
        assert_eq!(fourth.songs[0].video_id.as_deref(), Some("aaaaaaaaaaa"));
        assert_eq!(
            fourth.songs[1].thumbnail_url.as_deref(),
            Some("https://img.youtube.com/vi/bbbbbbbbbbb/mqdefault.jpg")
        );

        let first = &view.sundays[0];
        assert_eq!(first.songs[0].video_id, None);
        assert_eq!(first.songs[0].thumbnail_url, None);
    }

    #[test]
    fn test_member_view_hides_edit_controls() {
        let member = Identity {
            uid: "member".to_string(),
            email: None,
            display_name: None,
            is_admin: false,
        };

        let view = LineupView::build(&LineupState::default(), &member);
        assert!(!view.is_admin);
        assert!(!view.can_manage_songs);
        assert!(!view.can_manage_leaders);
        assert!(view.loading);
        assert!(view.sundays.iter().all(|s| s.songs.is_empty()));
    }

    #[test]
    fn test_song_view_serializes_flat() {
        let view = LineupView::build(&state(), &Identity::admin_bypass());
        let json = serde_json::to_value(&view.sundays[3].songs[0]).unwrap();

        assert_eq!(json["id"], "c");
        assert_eq!(json["sunday"], "fourth");
        assert_eq!(json["video_id"], "aaaaaaaaaaa");
    }
}
