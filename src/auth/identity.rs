use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::Instrument;

use crate::env::AppConfig;
use crate::error::AppError;
use crate::store::DocumentStore;

use super::{CookieStorage, IdentityProvider, Permission, Role, SessionStore};

pub const ADMIN_UID: &str = "admin-user";
pub const ADMIN_EMAIL: &str = "admin@beloved.com";
pub const ADMIN_DISPLAY_NAME: &str = "Administrator";

/// Whoever is signed in, through the provider or through the admin bypass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

impl Identity {
    pub fn admin_bypass() -> Self {
        Self {
            uid: ADMIN_UID.to_string(),
            email: Some(ADMIN_EMAIL.to_string()),
            display_name: Some(ADMIN_DISPLAY_NAME.to_string()),
            is_admin: true,
        }
    }

    pub fn role(&self) -> Role {
        if self.is_admin {
            Role::Admin
        } else {
            Role::Member
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role().has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                uid = %self.uid,
                role = %self.role(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "{:?} requires an admin account",
                permission
            )))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        resolve_identity(request)
            .instrument(tracing::info_span!("identity_guard"))
            .await
    }
}

async fn resolve_identity(request: &Request<'_>) -> Outcome<Identity, ()> {
    let rocket = request.rocket();
    let (Some(config), Some(provider), Some(store)) = (
        rocket.state::<AppConfig>(),
        rocket.state::<IdentityProvider>(),
        rocket.state::<DocumentStore>(),
    ) else {
        tracing::error!("Session dependencies not found in managed state");
        return Outcome::Error((Status::InternalServerError, ()));
    };

    let mut session = SessionStore::new(
        &config.admin,
        provider,
        store,
        CookieStorage::new(request.cookies()),
    );

    match session.restore().await {
        Ok(Some(identity)) => {
            tracing::info!(uid = %identity.uid, role = %identity.role(), "Identity resolved");
            Outcome::Success(identity)
        }
        Ok(None) => Outcome::Error((Status::Unauthorized, ())),
        Err(err) => {
            err.log_and_record("Identity guard");
            Outcome::Error((Status::InternalServerError, ()))
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Unauthorized",
        "message": "Authentication required"
    });

    Custom(Status::Unauthorized, Json(error_json))
}
