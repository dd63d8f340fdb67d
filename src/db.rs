use crate::{
    auth::{DbAccount, DbProviderSession, ProviderSession, ProviderUser},
    error::AppError,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use uuid::Uuid;

#[instrument(skip(pool))]
pub async fn get_account(pool: &Pool<Sqlite>, uid: &str) -> Result<ProviderUser, AppError> {
    info!("Fetching account by uid");
    let row = sqlx::query_as::<_, DbAccount>(
        "SELECT uid, email, password, display_name FROM accounts WHERE uid = ?",
    )
    .bind(uid)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(account) => Ok(ProviderUser::from(account)),
        _ => Err(AppError::NotFound(format!(
            "Account with uid {} not found in database",
            uid
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn find_account_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<DbAccount>, AppError> {
    info!("Finding account by email");
    let row = sqlx::query_as::<_, DbAccount>(
        "SELECT uid, email, password, display_name FROM accounts WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[instrument(skip_all, fields(email))]
pub async fn authenticate_account(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<ProviderUser>, AppError> {
    info!("Authenticating account");
    let account = find_account_by_email(pool, email).await?;

    match account {
        Some(account) => {
            let hash = account.password.clone().unwrap_or_default();
            match bcrypt::verify(password, &hash) {
                Ok(true) => Ok(Some(ProviderUser::from(account))),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

#[instrument(skip_all, fields(email))]
pub async fn create_account(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<String, AppError> {
    info!("Creating new account");

    if find_account_by_email(pool, email).await?.is_some() {
        return Err(AppError::Validation(format!(
            "Email '{}' is already in use",
            email
        )));
    }

    let uid = Uuid::new_v4().simple().to_string();
    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    sqlx::query("INSERT INTO accounts (uid, email, password) VALUES (?, ?, ?)")
        .bind(&uid)
        .bind(email)
        .bind(hashed_password)
        .execute(pool)
        .await?;

    Ok(uid)
}

#[instrument(skip(pool, token))]
pub async fn create_provider_session(
    pool: &Pool<Sqlite>,
    uid: &str,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating provider session");

    let res = sqlx::query("INSERT INTO provider_sessions (uid, token, expires_at) VALUES (?, ?, ?)")
        .bind(uid)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<ProviderSession, AppError> {
    info!("Getting provider session by token");

    let session = sqlx::query_as::<_, DbProviderSession>(
        "SELECT uid, expires_at FROM provider_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(ProviderSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<u64, AppError> {
    info!("Invalidating provider session");

    let result = sqlx::query("DELETE FROM provider_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM provider_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
