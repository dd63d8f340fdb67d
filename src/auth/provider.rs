//! Email/password identity provider.
//!
//! Accounts and their sign-in sessions live in their own tables; nothing here
//! knows about profiles or the admin bypass.

use chrono::{Duration, NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::db::{
    authenticate_account, clean_expired_sessions, create_account, create_provider_session,
    get_account, get_session_by_token, invalidate_session,
};
use crate::error::AppError;

const TOKEN_LENGTH: usize = 48;
const MIN_PASSWORD_LENGTH: usize = 6;

/// How long a provider sign-in survives, and which storage area keeps its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Local,
    Session,
}

impl Persistence {
    pub fn from_flag(stay_logged_in: bool) -> Self {
        if stay_logged_in {
            Persistence::Local
        } else {
            Persistence::Session
        }
    }

    pub fn lifetime(&self) -> Duration {
        match self {
            Persistence::Local => Duration::days(30),
            Persistence::Session => Duration::hours(12),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAccount {
    pub uid: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

impl From<DbAccount> for ProviderUser {
    fn from(account: DbAccount) -> Self {
        Self {
            uid: account.uid.unwrap_or_default(),
            email: account.email,
            display_name: account.display_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub uid: String,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow)]
pub struct DbProviderSession {
    pub uid: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbProviderSession> for ProviderSession {
    fn from(db: DbProviderSession) -> Self {
        Self {
            uid: db.uid.unwrap_or_default(),
            // A session without an expiry is treated as already expired.
            expires_at: db.expires_at.unwrap_or_else(|| Utc::now().naive_utc()),
        }
    }
}

impl ProviderSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}

/// The result of a successful sign-in or sign-up.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: ProviderUser,
    pub token: String,
    pub persistence: Persistence,
}

#[derive(Clone)]
pub struct IdentityProvider {
    pool: Pool<Sqlite>,
}

impl IdentityProvider {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        persistence: Persistence,
    ) -> Result<SignedIn, AppError> {
        let user = authenticate_account(&self.pool, email, password)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        info!(uid = %user.uid, "Provider sign-in succeeded");
        self.open_session(user, persistence).await
    }

    /// Creates the account and signs it in, as the hosted providers do.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        persistence: Persistence,
    ) -> Result<SignedIn, AppError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::Validation(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let uid = create_account(&self.pool, email, password).await?;
        let user = get_account(&self.pool, &uid).await?;

        info!(uid = %user.uid, "Provider account created");
        self.open_session(user, persistence).await
    }

    #[instrument(skip_all)]
    pub async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        let removed = invalidate_session(&self.pool, token).await?;
        if removed == 0 {
            return Err(AppError::Authentication(
                "No provider session to sign out of".to_string(),
            ));
        }
        Ok(())
    }

    /// The user behind a session token, if the session is still live.
    #[instrument(skip_all)]
    pub async fn current_user(&self, token: &str) -> Result<Option<ProviderUser>, AppError> {
        let session = match get_session_by_token(&self.pool, token).await {
            Ok(session) => session,
            Err(AppError::Authentication(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        if !session.is_valid() {
            warn!(uid = %session.uid, "Provider session expired");
            return Ok(None);
        }

        match get_account(&self.pool, &session.uid).await {
            Ok(user) => Ok(Some(user)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn clean_expired_sessions(&self) -> Result<u64, AppError> {
        clean_expired_sessions(&self.pool).await
    }

    async fn open_session(
        &self,
        user: ProviderUser,
        persistence: Persistence,
    ) -> Result<SignedIn, AppError> {
        let token = ProviderSession::generate_token();
        let expires_at = (Utc::now() + persistence.lifetime()).naive_utc();

        create_provider_session(&self.pool, &user.uid, &token, expires_at).await?;

        Ok(SignedIn {
            user,
            token,
            persistence,
        })
    }
}
