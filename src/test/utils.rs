#[cfg(test)]
pub mod test_utils {
    use crate::auth::{Identity, IdentityProvider, SessionStorage, StorageArea};
    use crate::database::init_schema;
    use crate::db::create_account;
    use crate::env::{AdminCredentials, AppConfig};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::{SongFields, Sunday};
    use crate::store::DocumentStore;
    use rocket::http::{ContentType, Cookie};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, Once};
    use std::time::Duration;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";
    pub static ADMIN_USERNAME: &str = "worship-admin";
    pub static ADMIN_PASSWORD: &str = "hallelujah";
    pub static TEST_VIDEO_LINK: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            admin: AdminCredentials {
                username: ADMIN_USERNAME.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            },
            database_url: "sqlite::memory:".to_string(),
        }
    }

    pub fn song_fields(title: &str, sunday: Sunday) -> SongFields {
        SongFields {
            title: title.to_string(),
            key: Some("G".to_string()),
            youtube_link: TEST_VIDEO_LINK.to_string(),
            sequence: "V1 C V2 C B C".to_string(),
            sunday,
        }
    }

    /// A single-connection pool; every connection to `sqlite::memory:` is its
    /// own database.
    pub async fn test_pool() -> Result<Pool<Sqlite>, AppError> {
        init_test_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        init_schema(&pool).await?;
        Ok(pool)
    }

    pub struct TestAccount {
        pub email: String,
        pub is_admin: bool,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        accounts: Vec<TestAccount>,
        songs: Vec<SongFields>,
        leaders: Vec<(Sunday, String)>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn member(mut self, email: &str) -> Self {
            self.accounts.push(TestAccount {
                email: email.to_string(),
                is_admin: false,
            });
            self
        }

        /// A provider account whose profile carries the admin flag.
        pub fn admin_member(mut self, email: &str) -> Self {
            self.accounts.push(TestAccount {
                email: email.to_string(),
                is_admin: true,
            });
            self
        }

        pub fn song(mut self, title: &str, sunday: Sunday) -> Self {
            self.songs.push(song_fields(title, sunday));
            self
        }

        pub fn leader(mut self, sunday: Sunday, name: &str) -> Self {
            self.leaders.push((sunday, name.to_string()));
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            let pool = test_pool().await?;
            let store = DocumentStore::new(pool.clone());

            let mut uid_map = HashMap::new();
            for account in &self.accounts {
                let uid = create_account(&pool, &account.email, STANDARD_PASSWORD).await?;
                store
                    .set_profile(&Identity {
                        uid: uid.clone(),
                        email: Some(account.email.clone()),
                        display_name: None,
                        is_admin: account.is_admin,
                    })
                    .await?;
                uid_map.insert(account.email.clone(), uid);
            }

            let mut song_ids = HashMap::new();
            for song in &self.songs {
                let id = store.add_song(song, "seed").await?;
                song_ids.insert(song.title.clone(), id);
            }

            for (sunday, name) in &self.leaders {
                store.upsert_leader(*sunday, name, "seed").await?;
            }

            Ok(TestDb {
                provider: IdentityProvider::new(pool.clone()),
                config: test_config(),
                pool,
                store,
                uid_map,
                song_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub store: DocumentStore,
        pub provider: IdentityProvider,
        pub config: AppConfig,
        pub uid_map: HashMap<String, String>,
        pub song_ids: HashMap<String, String>,
    }

    impl TestDb {
        pub fn uid(&self, email: &str) -> Option<String> {
            self.uid_map.get(email).cloned()
        }

        pub fn song_id(&self, title: &str) -> Option<String> {
            self.song_ids.get(title).cloned()
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .member("member@example.com")
            .admin_member("pastor@example.com")
            .song("Amazing Grace", Sunday::First)
            .song("How Great Thou Art", Sunday::Second)
            .song("Holy, Holy, Holy", Sunday::First)
            .leader(Sunday::First, "Grace")
            .build()
            .await
            .expect("Failed to build test database")
    }

    /// Both storage areas held in memory, shared between clones.
    #[derive(Clone, Default)]
    pub struct MemoryStorage {
        entries: Arc<Mutex<HashMap<(StorageArea, String), String>>>,
    }

    impl MemoryStorage {
        pub fn contains(&self, area: StorageArea, key: &str) -> bool {
            self.get(area, key).is_some()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.lock().unwrap().is_empty()
        }
    }

    impl SessionStorage for MemoryStorage {
        fn get(&self, area: StorageArea, key: &str) -> Option<String> {
            self.entries
                .lock()
                .unwrap()
                .get(&(area, key.to_string()))
                .cloned()
        }

        fn set(&self, area: StorageArea, key: &str, value: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert((area, key.to_string()), value.to_string());
        }

        fn remove(&self, area: StorageArea, key: &str) {
            self.entries.lock().unwrap().remove(&(area, key.to_string()));
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(
            test_db.pool.clone(),
            test_db.config.clone(),
            test_db.provider.clone(),
        )
        .await
        .expect("Failed to build rocket");

        let client = Client::untracked(rocket)
            .await
            .expect("Failed to build test client");

        (client, test_db)
    }

    fn live_cookies(response: &rocket::local::asynchronous::LocalResponse<'_>) -> Vec<Cookie<'static>> {
        response
            .cookies()
            .iter()
            .filter(|c| !c.value().is_empty())
            .map(|c| c.clone().into_owned())
            .collect()
    }

    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": email,
                    "password": password,
                })
                .to_string(),
            )
            .dispatch()
            .await;

        live_cookies(&response)
    }

    pub async fn login_test_admin(client: &Client, stay_logged_in: bool) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": ADMIN_USERNAME,
                    "password": ADMIN_PASSWORD,
                    "stay_logged_in": stay_logged_in,
                })
                .to_string(),
            )
            .dispatch()
            .await;

        live_cookies(&response)
    }

    /// Polls until the lineup's background feeds have caught up with `check`.
    pub async fn wait_for<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            rocket::tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}
