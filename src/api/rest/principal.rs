use std::str::FromStr;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::principal::{Principal, Role};

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| AppError::Unauthenticated(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| AppError::Unauthenticated(format!("{name} header is not valid text")))
}

/// The identity provider in front of this service sets both headers; they are trusted as-is.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = Uuid::parse_str(header(parts, PRINCIPAL_ID_HEADER)?.trim())
            .map_err(|err| AppError::Unauthenticated(format!("invalid principal id: {err}")))?;
        let role = Role::from_str(header(parts, PRINCIPAL_ROLE_HEADER)?)
            .map_err(AppError::Unauthenticated)?;

        Ok(Principal::new(id, role))
    }
}
