use rocket::State;
use rocket::http::CookieJar;
use rocket::response::stream::{Event, EventStream};
use rocket::response::{self, Responder};
use rocket::serde::{Deserialize, Serialize, json::Json};
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::error::RecvError;
use rocket::{Request, Shutdown};
use validator::Validate;

use crate::auth::{CookieStorage, Identity, IdentityProvider, Permission, SessionStore};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{SongFields, Sunday};
use crate::store::DocumentStore;
use crate::sync::{Lineup, LineupEvent, MutationFailure, Notice};
use crate::validation::{
    ApiError, AppErrorExt, JsonValidateExt, NoticeResponse, ToValidationResponse,
};
use crate::view::LineupView;

const LOGGED_OUT: &str = "Logged out successfully!";

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email is required"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
    #[serde(default)]
    stay_logged_in: bool,
}

#[derive(Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
    #[serde(default)]
    stay_logged_in: bool,
}

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email is required"))]
    email: String,
    #[validate(length(min = 6, message = "Password should be at least 6 characters"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<Identity>,
    pub error: Option<String>,
}

impl LoginResponse {
    fn signed_in(user: Identity) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: None,
        }
    }

    fn rejected(message: String) -> Self {
        Self {
            success: false,
            user: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct SongRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
    key: Option<String>,
    #[validate(length(min = 1, message = "YouTube link is required"))]
    youtube_link: String,
    #[validate(length(min = 1, message = "Sequence is required"))]
    sequence: String,
    #[serde(default)]
    sunday: Sunday,
}

impl From<SongRequest> for SongFields {
    fn from(request: SongRequest) -> Self {
        Self {
            title: request.title,
            key: request.key,
            youtube_link: request.youtube_link,
            sequence: request.sequence,
            sunday: request.sunday,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct LeaderRequest {
    #[validate(length(min = 1, message = "Leader name is required"))]
    leader_name: String,
}

/// Why an edit request did not go through: a malformed body, or a rejected edit.
pub enum EditError {
    Invalid(ApiError),
    Failed(MutationFailure),
}

impl<'r> Responder<'r, 'static> for EditError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        match self {
            EditError::Invalid(error) => error.respond_to(req),
            EditError::Failed(failure) => failure.respond_to(req),
        }
    }
}

impl From<ApiError> for EditError {
    fn from(error: ApiError) -> Self {
        EditError::Invalid(error)
    }
}

impl From<MutationFailure> for EditError {
    fn from(failure: MutationFailure) -> Self {
        EditError::Failed(failure)
    }
}

// Bad credentials come back as an unsuccessful login; anything else is an error.
fn login_outcome(result: Result<Identity, AppError>) -> Result<Json<LoginResponse>, ApiError> {
    match result {
        Ok(identity) => Ok(Json(LoginResponse::signed_in(identity))),
        Err(AppError::Authentication(message)) | Err(AppError::Validation(message)) => {
            Ok(Json(LoginResponse::rejected(message)))
        }
        Err(err) => Err(err.to_validation_response()),
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    config: &State<AppConfig>,
    provider: &State<IdentityProvider>,
    store: &State<DocumentStore>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = login.validate_custom()?;

    let mut session = SessionStore::new(
        &config.admin,
        provider,
        store,
        CookieStorage::new(cookies),
    );

    login_outcome(
        session
            .login(&validated.email, &validated.password, validated.stay_logged_in)
            .await,
    )
}

#[post("/admin/login", data = "<login>")]
pub async fn api_admin_login(
    login: Json<AdminLoginRequest>,
    cookies: &CookieJar<'_>,
    config: &State<AppConfig>,
    provider: &State<IdentityProvider>,
    store: &State<DocumentStore>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = login.validate_custom()?;

    let mut session = SessionStore::new(
        &config.admin,
        provider,
        store,
        CookieStorage::new(cookies),
    );

    login_outcome(session.admin_login(
        &validated.username,
        &validated.password,
        validated.stay_logged_in,
    ))
}

#[post("/register", data = "<registration>")]
pub async fn api_register(
    registration: Json<RegisterRequest>,
    cookies: &CookieJar<'_>,
    config: &State<AppConfig>,
    provider: &State<IdentityProvider>,
    store: &State<DocumentStore>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = registration.validate_custom()?;

    let mut session = SessionStore::new(
        &config.admin,
        provider,
        store,
        CookieStorage::new(cookies),
    );

    login_outcome(session.register(&validated.email, &validated.password).await)
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &CookieJar<'_>,
    config: &State<AppConfig>,
    provider: &State<IdentityProvider>,
    store: &State<DocumentStore>,
) -> Json<NoticeResponse> {
    let mut session = SessionStore::new(
        &config.admin,
        provider,
        store,
        CookieStorage::new(cookies),
    );
    session.logout().await;

    Json(Notice::success(LOGGED_OUT).into())
}

#[get("/me")]
pub async fn api_me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

#[get("/lineup")]
pub async fn api_lineup(
    identity: Identity,
    lineup: &State<Lineup>,
) -> Result<Json<LineupView>, AppError> {
    identity.require_permission(Permission::ViewLineup)?;
    Ok(Json(lineup.view(&identity).await))
}

/// Streams the lineup: a `lineup` event on connect and after every change,
/// and a `notice` event whenever a feed fails.
#[get("/lineup/events")]
pub fn api_lineup_events(
    identity: Identity,
    lineup: &State<Lineup>,
    mut shutdown: Shutdown,
) -> Result<EventStream![], AppError> {
    identity.require_permission(Permission::ViewLineup)?;

    let lineup = lineup.inner().clone();
    let mut events = lineup.subscribe();

    Ok(EventStream! {
        yield Event::json(&lineup.view(&identity).await).event("lineup");

        loop {
            let event = select! {
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Closed) => break,
                    // A fresh view covers whatever was skipped.
                    Err(RecvError::Lagged(_)) => LineupEvent::Changed,
                },
                _ = &mut shutdown => break,
            };

            match event {
                LineupEvent::Changed => {
                    yield Event::json(&lineup.view(&identity).await).event("lineup");
                }
                LineupEvent::Notice(notice) => {
                    yield Event::json(&NoticeResponse::from(notice)).event("notice");
                }
            }
        }
    })
}

#[post("/songs", data = "<song>")]
pub async fn api_add_song(
    song: Json<SongRequest>,
    identity: Identity,
    lineup: &State<Lineup>,
) -> Result<Json<NoticeResponse>, EditError> {
    let validated = song.validate_custom()?;
    let notice = lineup.add_song(&identity, validated.into()).await?;
    Ok(Json(notice.into()))
}

#[put("/songs/<id>", data = "<song>")]
pub async fn api_update_song(
    id: &str,
    song: Json<SongRequest>,
    identity: Identity,
    lineup: &State<Lineup>,
) -> Result<Json<NoticeResponse>, EditError> {
    let validated = song.validate_custom()?;
    let notice = lineup.update_song(&identity, id, validated.into()).await?;
    Ok(Json(notice.into()))
}

#[delete("/songs/<id>")]
pub async fn api_delete_song(
    id: &str,
    identity: Identity,
    lineup: &State<Lineup>,
) -> Result<Json<NoticeResponse>, EditError> {
    let notice = lineup.delete_song(&identity, id).await?;
    Ok(Json(notice.into()))
}

#[put("/leaders/<sunday>", data = "<leader>")]
pub async fn api_upsert_leader(
    sunday: Sunday,
    leader: Json<LeaderRequest>,
    identity: Identity,
    lineup: &State<Lineup>,
) -> Result<Json<NoticeResponse>, EditError> {
    let validated = leader.validate_custom()?;
    let notice = lineup
        .upsert_leader(&identity, sunday, &validated.leader_name)
        .await?;
    Ok(Json(notice.into()))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[get("/health/store")]
pub async fn api_store_health(store: &State<DocumentStore>) -> Result<&'static str, ApiError> {
    sqlx::query("SELECT 1")
        .execute(store.pool())
        .await
        .map_err(AppError::from)
        .validate_custom()?;
    Ok("OK")
}
