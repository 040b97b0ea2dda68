//! Access control.
//!
//! Authorization is evaluated in two layers. [`Policy::check_request`] runs as
//! middleware before any handler touches the store; [`Policy::check_object`]
//! runs inside update/delete handlers once the targeted row's author is known.
//! Both take the caller explicitly.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, models::user::Role};

/// Privileged actions a user may perform, derived once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// Manage catalog entries and user accounts.
    pub const ADMIN: Self = Self(0b01);
    /// Edit or delete any review or comment.
    pub const MODERATE: Self = Self(0b10);

    /// Pure mapping from a user snapshot to its capabilities.
    ///
    /// Superusers and staff get every capability regardless of role.
    pub fn of(role: Role, is_superuser: bool, is_staff: bool) -> Self {
        let mut caps = Self::NONE;
        if role == Role::Admin || is_superuser || is_staff {
            caps = caps.with(Self::ADMIN);
        }
        if role == Role::Moderator || is_superuser || is_staff {
            caps = caps.with(Self::MODERATE);
        }
        caps
    }

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_admin(self) -> bool {
        self.contains(Self::ADMIN)
    }

    pub fn is_moderator(self) -> bool {
        self.contains(Self::MODERATE)
    }
}

/// An authenticated user, as resolved from the bearer token for this request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub capabilities: Capabilities,
}

/// Who is making the request. Inserted into request extensions by the
/// identify middleware.
#[derive(Debug, Clone, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    User(Caller),
}

impl Identity {
    pub fn caller(&self) -> Result<&Caller, AppError> {
        match self {
            Identity::User(caller) => Ok(caller),
            Identity::Anonymous => Err(AppError::AuthError(
                "Authentication credentials were not provided".to_string(),
            )),
        }
    }
}

/// Per-endpoint access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Anyone reads, admins write. Catalog and titles.
    AdminOrReadOnly,
    /// Anyone reads, any authenticated user creates, author/admin/moderator
    /// edit and delete. Reviews and comments.
    AuthorOrStaffOrReadOnly,
    /// Admins only, for every method. The `/users/` collection.
    AdminOnly,
    /// Any authenticated user. `/users/me/`.
    Authenticated,
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

impl Policy {
    /// Request-level check, evaluated before the handler runs.
    pub fn check_request(self, method: &Method, identity: &Identity) -> Result<(), AppError> {
        let read_only_open = matches!(self, Policy::AdminOrReadOnly | Policy::AuthorOrStaffOrReadOnly);
        if read_only_open && is_safe(method) {
            return Ok(());
        }

        let caller = identity.caller()?;

        match self {
            Policy::AdminOrReadOnly | Policy::AdminOnly if !caller.capabilities.is_admin() => Err(
                AppError::Forbidden("You do not have permission to perform this action".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Object-level check for update/delete of a specific row.
    pub fn check_object(self, identity: &Identity, author_id: i64) -> Result<(), AppError> {
        let caller = identity.caller()?;
        let allowed = match self {
            Policy::AuthorOrStaffOrReadOnly => {
                caller.id == author_id
                    || caller.capabilities.is_admin()
                    || caller.capabilities.is_moderator()
            }
            Policy::AdminOrReadOnly | Policy::AdminOnly => caller.capabilities.is_admin(),
            Policy::Authenticated => caller.id == author_id,
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to modify this object".to_string(),
            ))
        }
    }
}

/// Axum Middleware: request-level policy.
///
/// Must run after the identify middleware. Requests without an `Identity`
/// are treated as anonymous.
pub async fn enforce(
    State(policy): State<Policy>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let identity = req.extensions().get::<Identity>().cloned().unwrap_or_default();
    policy.check_request(req.method(), &identity)?;
    Ok(next.run(req).await)
}
