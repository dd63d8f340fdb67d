//! Resolves who is signed in and runs the four session operations.
//!
//! Two storage areas back a session: a durable one that outlives the browser
//! session and a session-scoped one that does not. The admin bypass record and
//! the provider token each live in at most one of them at a time.

use rocket::http::{Cookie, CookieJar, SameSite};
use tracing::{info, warn};

use crate::env::AdminCredentials;
use crate::error::AppError;
use crate::store::DocumentStore;

use super::{Identity, IdentityProvider, Persistence, ProviderUser};

pub const ADMIN_USER_KEY: &str = "adminUser";
pub const PROVIDER_TOKEN_KEY: &str = "providerToken";

const DURABLE_LIFETIME_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    Durable,
    Session,
}

impl StorageArea {
    pub fn for_persistence(persistence: Persistence) -> Self {
        match persistence {
            Persistence::Local => StorageArea::Durable,
            Persistence::Session => StorageArea::Session,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            StorageArea::Durable => StorageArea::Session,
            StorageArea::Session => StorageArea::Durable,
        }
    }
}

/// Key-value storage split into the two areas.
pub trait SessionStorage {
    fn get(&self, area: StorageArea, key: &str) -> Option<String>;
    fn set(&self, area: StorageArea, key: &str, value: &str);
    fn remove(&self, area: StorageArea, key: &str);
}

/// Storage areas as private cookies: the durable area carries a max-age, the
/// session area does not and dies with the browser session.
pub struct CookieStorage<'a, 'r> {
    jar: &'a CookieJar<'r>,
}

impl<'a, 'r> CookieStorage<'a, 'r> {
    pub fn new(jar: &'a CookieJar<'r>) -> Self {
        Self { jar }
    }

    pub fn cookie_name(area: StorageArea, key: &str) -> String {
        match area {
            StorageArea::Durable => format!("local.{}", key),
            StorageArea::Session => format!("session.{}", key),
        }
    }
}

impl SessionStorage for CookieStorage<'_, '_> {
    fn get(&self, area: StorageArea, key: &str) -> Option<String> {
        self.jar
            .get_private(&Self::cookie_name(area, key))
            .map(|c| c.value().to_string())
    }

    fn set(&self, area: StorageArea, key: &str, value: &str) {
        let cookie = Cookie::build((Self::cookie_name(area, key), value.to_string()))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true);

        let cookie = match area {
            StorageArea::Durable => {
                cookie.max_age(rocket::time::Duration::days(DURABLE_LIFETIME_DAYS))
            }
            StorageArea::Session => cookie,
        };

        self.jar.add_private(cookie);
    }

    fn remove(&self, area: StorageArea, key: &str) {
        self.jar
            .remove_private(Cookie::build((Self::cookie_name(area, key), String::new())).path("/"));
    }
}

pub struct SessionStore<'a, S: SessionStorage> {
    admin: &'a AdminCredentials,
    provider: &'a IdentityProvider,
    store: &'a DocumentStore,
    storage: S,
    current: Option<Identity>,
    loading: bool,
}

impl<'a, S: SessionStorage> SessionStore<'a, S> {
    pub fn new(
        admin: &'a AdminCredentials,
        provider: &'a IdentityProvider,
        store: &'a DocumentStore,
        storage: S,
    ) -> Self {
        Self {
            admin,
            provider,
            store,
            storage,
            current: None,
            loading: true,
        }
    }

    pub fn current_user(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Works out who is signed in: a stored admin record wins, durable before
    /// session-scoped, then a live provider session.
    pub async fn restore(&mut self) -> Result<Option<Identity>, AppError> {
        let result = self.resolve_stored().await;
        self.loading = false;

        let identity = result?;
        self.current = identity.clone();
        Ok(identity)
    }

    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
        stay_logged_in: bool,
    ) -> Result<Identity, AppError> {
        let persistence = Persistence::from_flag(stay_logged_in);
        let signed_in = self.provider.sign_in(email, password, persistence).await?;

        self.keep_provider_token(&signed_in.token, signed_in.persistence);

        let identity = self.profile_for(signed_in.user).await?;
        self.current = Some(identity.clone());
        Ok(identity)
    }

    pub fn admin_login(
        &mut self,
        username: &str,
        password: &str,
        stay_logged_in: bool,
    ) -> Result<Identity, AppError> {
        if !self.admin.matches(username, password) {
            return Err(AppError::Authentication(
                "Invalid admin credentials".to_string(),
            ));
        }

        let identity = Identity::admin_bypass();
        let record = serde_json::to_string(&identity)?;

        let area = StorageArea::for_persistence(Persistence::from_flag(stay_logged_in));
        self.storage.set(area, ADMIN_USER_KEY, &record);
        self.storage.remove(area.other(), ADMIN_USER_KEY);

        info!(durable = stay_logged_in, "Admin signed in through bypass");
        self.current = Some(identity.clone());
        Ok(identity)
    }

    /// Signs up with the provider and writes the profile record. The new
    /// account is signed in for this browser session only.
    pub async fn register(&mut self, email: &str, password: &str) -> Result<Identity, AppError> {
        let signed_in = self
            .provider
            .sign_up(email, password, Persistence::Session)
            .await?;

        let identity = Identity {
            uid: signed_in.user.uid.clone(),
            email: signed_in.user.email.clone(),
            display_name: signed_in.user.display_name.clone(),
            is_admin: false,
        };
        self.store.set_profile(&identity).await?;

        self.keep_provider_token(&signed_in.token, signed_in.persistence);
        self.current = Some(identity.clone());
        Ok(identity)
    }

    pub async fn logout(&mut self) {
        self.storage.remove(StorageArea::Durable, ADMIN_USER_KEY);
        self.storage.remove(StorageArea::Session, ADMIN_USER_KEY);
        self.current = None;

        for area in [StorageArea::Durable, StorageArea::Session] {
            if let Some(token) = self.storage.get(area, PROVIDER_TOKEN_KEY) {
                // The session may never have been provider-backed.
                if let Err(e) = self.provider.sign_out(&token).await {
                    warn!(error = %e, "Provider sign-out failed, ignoring");
                }
            }
            self.storage.remove(area, PROVIDER_TOKEN_KEY);
        }
    }

    async fn resolve_stored(&self) -> Result<Option<Identity>, AppError> {
        for area in [StorageArea::Durable, StorageArea::Session] {
            if let Some(identity) = self.stored_admin(area) {
                return Ok(Some(identity));
            }
        }

        for area in [StorageArea::Durable, StorageArea::Session] {
            let Some(token) = self.storage.get(area, PROVIDER_TOKEN_KEY) else {
                continue;
            };

            match self.provider.current_user(&token).await? {
                Some(user) => return self.profile_for(user).await.map(Some),
                None => self.storage.remove(area, PROVIDER_TOKEN_KEY),
            }
        }

        Ok(None)
    }

    fn stored_admin(&self, area: StorageArea) -> Option<Identity> {
        let record = self.storage.get(area, ADMIN_USER_KEY)?;
        match serde_json::from_str::<Identity>(&record) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, area = ?area, "Discarding unreadable admin record");
                self.storage.remove(area, ADMIN_USER_KEY);
                None
            }
        }
    }

    fn keep_provider_token(&self, token: &str, persistence: Persistence) {
        let area = StorageArea::for_persistence(persistence);
        self.storage.set(area, PROVIDER_TOKEN_KEY, token);
        self.storage.remove(area.other(), PROVIDER_TOKEN_KEY);
    }

    /// Reads the admin flag from the profile side-record, creating a
    /// non-admin profile the first time a provider user shows up.
    async fn profile_for(&self, user: ProviderUser) -> Result<Identity, AppError> {
        if let Some(profile) = self.store.get_profile(&user.uid).await? {
            return Ok(Identity {
                uid: user.uid,
                email: user.email,
                display_name: user.display_name,
                is_admin: profile.is_admin,
            });
        }

        let identity = Identity {
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
            is_admin: false,
        };
        self.store.set_profile(&identity).await?;
        Ok(identity)
    }
}
