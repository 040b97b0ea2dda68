// src/routes.rs

use std::sync::Arc;

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::RateLimit,
    handlers::{auth, catalog, comments, reviews, titles, users},
    permissions::{Policy, enforce},
    state::AppState,
    utils::jwt::identify,
};

fn auth_routes(rate_limit: Option<RateLimit>) -> Router<AppState> {
    let routes = Router::new()
        .route("/signup/", post(auth::signup))
        .route("/token/", post(auth::token));

    let Some(limit) = rate_limit else {
        return routes;
    };

    match GovernorConfigBuilder::default()
        .per_second(limit.per_second)
        .burst_size(limit.burst)
        .finish()
    {
        Some(conf) => routes.layer(GovernorLayer::new(Arc::new(conf))),
        None => {
            tracing::warn!("Invalid auth rate limit {:?}, serving without it", limit);
            routes
        }
    }
}

fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/categories/",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route("/categories/{slug}/", delete(catalog::delete_category))
        .route(
            "/genres/",
            get(catalog::list_genres).post(catalog::create_genre),
        )
        .route("/genres/{slug}/", delete(catalog::delete_genre))
        .route("/titles/", get(titles::list_titles).post(titles::create_title))
        .route(
            "/titles/{title_id}/",
            get(titles::get_title)
                .patch(titles::update_title)
                .put(titles::replace_title)
                .delete(titles::delete_title),
        )
        .route_layer(middleware::from_fn_with_state(
            Policy::AdminOrReadOnly,
            enforce,
        ))
}

fn discussion_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/titles/{title_id}/reviews/",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .put(reviews::replace_review)
                .delete(reviews::delete_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
            get(comments::get_comment)
                .patch(comments::update_comment)
                .put(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .route_layer(middleware::from_fn_with_state(
            Policy::AuthorOrStaffOrReadOnly,
            enforce,
        ))
}

fn user_routes() -> Router<AppState> {
    let admin = Router::new()
        .route("/users/", get(users::list_users).post(users::create_user))
        .route(
            "/users/{username}/",
            get(users::get_user)
                .patch(users::update_user)
                .put(users::replace_user)
                .delete(users::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(Policy::AdminOnly, enforce));

    let me = Router::new()
        .route("/users/me/", get(users::get_me).patch(users::update_me))
        .route_layer(middleware::from_fn_with_state(
            Policy::Authenticated,
            enforce,
        ));

    admin.merge(me)
}

/// Assembles the main application router.
///
/// * Every route lives under `/api/v1`.
/// * Each resource group carries its own access policy. Callers are
///   identified once for all of them by the `identify` layer; `/auth` is
///   left out of it so a stale token never blocks signing in again.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let resources = Router::new()
        .merge(catalog_routes())
        .merge(discussion_routes())
        .merge(user_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), identify));

    let api = Router::new()
        .nest("/auth", auth_routes(state.config.auth_rate_limit))
        .merge(resources);

    Router::new()
        .nest("/api/v1", api)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
