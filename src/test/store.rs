#[cfg(test)]
mod tests {
    use crate::auth::Identity;
    use crate::error::AppError;
    use crate::models::{SongFields, Sunday};
    use crate::store::{DocChange, DocumentStore};
    use crate::test::test_utils::{TestDbBuilder, song_fields, test_pool};

    #[tokio::test]
    async fn test_fetch_songs_newest_first() {
        let test_db = TestDbBuilder::new()
            .song("First Added", Sunday::First)
            .song("Second Added", Sunday::Second)
            .song("Third Added", Sunday::First)
            .build()
            .await
            .expect("Failed to build test database");

        let songs = test_db.store.fetch_songs().await.expect("Failed to fetch songs");
        let titles: Vec<&str> = songs.iter().map(|s| s.title.as_str()).collect();

        assert_eq!(titles, vec!["Third Added", "Second Added", "First Added"]);
    }

    #[tokio::test]
    async fn test_add_song_stamps_metadata() {
        let pool = test_pool().await.expect("Failed to create pool");
        let store = DocumentStore::new(pool);

        let mut fields = song_fields("Be Thou My Vision", Sunday::Fourth);
        fields.key = None;

        let id = store
            .add_song(&fields, "admin-user")
            .await
            .expect("Failed to add song");

        let songs = store.fetch_songs().await.expect("Failed to fetch songs");
        assert_eq!(songs.len(), 1);

        let song = &songs[0];
        assert_eq!(song.id, id);
        assert_eq!(song.title, "Be Thou My Vision");
        assert_eq!(song.key, None);
        assert_eq!(song.sunday, Sunday::Fourth);
        assert_eq!(song.created_by, "admin-user");
        assert_eq!(song.created_at, song.updated_at);
    }

    #[tokio::test]
    async fn test_update_song_keeps_created_at() {
        let test_db = TestDbBuilder::new()
            .song("It Is Well", Sunday::First)
            .build()
            .await
            .expect("Failed to build test database");
        let id = test_db.song_id("It Is Well").unwrap();
        let before = test_db.store.fetch_songs().await.unwrap().remove(0);

        let updated = SongFields {
            title: "It Is Well With My Soul".to_string(),
            key: Some("C".to_string()),
            youtube_link: "https://youtu.be/abcdefghijk".to_string(),
            sequence: "V1 V2 V4".to_string(),
            sunday: Sunday::Third,
        };
        test_db
            .store
            .update_song(&id, &updated)
            .await
            .expect("Failed to update song");

        let after = test_db.store.fetch_songs().await.unwrap().remove(0);
        assert_eq!(after.id, id);
        assert_eq!(after.title, "It Is Well With My Soul");
        assert_eq!(after.key.as_deref(), Some("C"));
        assert_eq!(after.sunday, Sunday::Third);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_song() {
        let pool = test_pool().await.expect("Failed to create pool");
        let store = DocumentStore::new(pool);

        let result = store
            .update_song("missing", &song_fields("Nothing", Sunday::First))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = store.delete_song("missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_leader_keeps_one_record_per_sunday() {
        let test_db = TestDbBuilder::new()
            .leader(Sunday::Second, "Ruth")
            .build()
            .await
            .expect("Failed to build test database");
        let existing = test_db.store.fetch_leaders().await.unwrap().remove(0);

        let mut subscription = test_db.store.subscribe_leaders().await.unwrap();
        subscription.next().await.unwrap().unwrap();

        let id = test_db
            .store
            .upsert_leader(Sunday::Second, "Naomi", "admin-user")
            .await
            .expect("Upsert failed");
        assert_eq!(id, existing.id);

        let modified = subscription.next().await.unwrap().unwrap();
        assert_eq!(modified.changes, vec![DocChange::Modified(id)]);

        let created = test_db
            .store
            .upsert_leader(Sunday::Fifth, "Esther", "admin-user")
            .await
            .expect("Upsert failed");
        let added = subscription.next().await.unwrap().unwrap();
        assert_eq!(added.changes, vec![DocChange::Added(created)]);

        let leaders = test_db.store.fetch_leaders().await.unwrap();
        assert_eq!(leaders.len(), 2);
        let second = leaders.iter().find(|l| l.sunday == Sunday::Second).unwrap();
        assert_eq!(second.leader_name, "Naomi");
        assert_eq!(second.created_at, existing.created_at);
        assert_eq!(second.created_by, "seed");
    }

    #[tokio::test]
    async fn test_failed_read_after_write_reaches_subscribers() {
        let test_db = TestDbBuilder::new()
            .song("Amazing Grace", Sunday::First)
            .build()
            .await
            .expect("Failed to build test database");
        let id = test_db.song_id("Amazing Grace").unwrap();

        let mut subscription = test_db.store.subscribe_songs().await.unwrap();
        subscription.next().await.unwrap().unwrap();

        sqlx::query(
            "INSERT INTO songs (id, title, youtube_link, sequence, sunday, created_at, updated_at)
             VALUES ('broken', 'Broken', 'x', 'V', 'first', 'not a date', 'not a date')",
        )
        .execute(&test_db.pool)
        .await
        .unwrap();

        test_db.store.delete_song(&id).await.expect("Delete should commit");

        let result = subscription.next().await;
        assert!(matches!(result, Err(AppError::Subscription(_))));
    }

    #[tokio::test]
    async fn test_subscription_starts_with_current_docs() {
        let test_db = TestDbBuilder::new()
            .song("Amazing Grace", Sunday::First)
            .build()
            .await
            .expect("Failed to build test database");
        let id = test_db.song_id("Amazing Grace").unwrap();

        let mut subscription = test_db.store.subscribe_songs().await.unwrap();
        let initial = subscription.next().await.unwrap().expect("feed closed");

        assert_eq!(initial.docs.len(), 1);
        assert_eq!(initial.changes, vec![DocChange::Added(id)]);
    }

    #[tokio::test]
    async fn test_every_write_publishes_a_snapshot() {
        let pool = test_pool().await.expect("Failed to create pool");
        let store = DocumentStore::new(pool);

        let mut subscription = store.subscribe_songs().await.unwrap();
        let initial = subscription.next().await.unwrap().unwrap();
        assert!(initial.docs.is_empty());

        let id = store
            .add_song(&song_fields("Cornerstone", Sunday::Fifth), "admin-user")
            .await
            .unwrap();
        let added = subscription.next().await.unwrap().unwrap();
        assert_eq!(added.docs.len(), 1);
        assert_eq!(added.changes, vec![DocChange::Added(id.clone())]);

        store
            .update_song(&id, &song_fields("Cornerstone (Live)", Sunday::Fifth))
            .await
            .unwrap();
        let modified = subscription.next().await.unwrap().unwrap();
        assert_eq!(modified.docs[0].title, "Cornerstone (Live)");
        assert_eq!(modified.changes, vec![DocChange::Modified(id.clone())]);

        store.delete_song(&id).await.unwrap();
        let removed = subscription.next().await.unwrap().unwrap();
        assert!(removed.docs.is_empty());
        assert_eq!(removed.changes, vec![DocChange::Removed(id)]);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_subscription_error() {
        let pool = test_pool().await.expect("Failed to create pool");
        let store = DocumentStore::new(pool);
        store.upsert_leader(Sunday::First, "Leader 0", "admin-user").await.unwrap();

        let mut subscription = store.subscribe_leaders().await.unwrap();
        subscription.next().await.unwrap().unwrap();

        for i in 1..=70 {
            store
                .upsert_leader(Sunday::First, &format!("Leader {}", i), "admin-user")
                .await
                .unwrap();
        }

        let result = subscription.next().await;
        assert!(matches!(result, Err(AppError::Subscription(_))));
    }

    #[tokio::test]
    async fn test_profile_upsert() {
        let pool = test_pool().await.expect("Failed to create pool");
        let store = DocumentStore::new(pool);

        assert!(store.get_profile("uid-1").await.unwrap().is_none());

        let mut profile = Identity {
            uid: "uid-1".to_string(),
            email: Some("someone@example.com".to_string()),
            display_name: None,
            is_admin: false,
        };
        store.set_profile(&profile).await.unwrap();
        assert_eq!(store.get_profile("uid-1").await.unwrap(), Some(profile.clone()));

        profile.is_admin = true;
        store.set_profile(&profile).await.unwrap();
        let stored = store.get_profile("uid-1").await.unwrap().unwrap();
        assert!(stored.is_admin);
    }
}
