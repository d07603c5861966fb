use crate::api::{
    error::ErrorBody,
    handlers::{audit, auth, health, invitations, password_reset, sessions},
    types,
};
use crate::store::{AuditAction, AuditSeverity, Role};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, License,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::verify,
        sessions::list,
        sessions::revoke,
        sessions::revoke_others,
        invitations::create,
        invitations::accept,
        password_reset::request,
        password_reset::confirm,
        audit::list,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        types::LoginRequest,
        types::TokenResponse,
        types::VerifyResponse,
        types::SessionSummary,
        types::RevokeOthersResponse,
        types::InviteRequest,
        types::InviteResponse,
        types::TokenPasswordRequest,
        types::AdminResponse,
        types::ResetRequestBody,
        types::AuditEntryView,
        Role,
        AuditAction,
        AuditSeverity,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Sign in, token refresh and sign out"),
        (name = "sessions", description = "Refresh session management"),
        (name = "invitations", description = "Administrator invitations"),
        (name = "password-reset", description = "Self-service password reset"),
        (name = "audit", description = "Security audit trail"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("PASETO")
                    .build(),
            ),
        );
    }
}

/// The `OpenAPI` document, with info taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `:` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(':').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match (author.find('<'), author.rfind('>')) {
        (Some(start), Some(end)) if start < end => {
            let name = author[..start].trim();
            let email = author[start + 1..end].trim();
            (
                (!name.is_empty()).then_some(name),
                (!email.is_empty()).then_some(email),
            )
        }
        _ => (Some(author), None),
    }
}
