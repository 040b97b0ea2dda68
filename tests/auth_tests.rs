// tests/auth_tests.rs

mod common;

use common::{spawn_app, unique};

#[tokio::test]
async fn unknown_path_is_404() {
    let Some(app) = spawn_app().await else { return };

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist/"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn signup_is_idempotent_for_the_same_pair() {
    let Some(app) = spawn_app().await else { return };
    let username = unique("u");
    let email = format!("{}@example.com", username);

    let first = app.signup(&username, &email).await;
    assert_eq!(first.status().as_u16(), 200);
    let body: serde_json::Value = first.json().await.unwrap();
    assert_eq!(body["username"], username.as_str());
    assert_eq!(body["email"], email.as_str());
    app.next_code().await;

    // Second request resends a code for the same account.
    let second = app.signup(&username, &email).await;
    assert_eq!(second.status().as_u16(), 200);
    let code = app.next_code().await;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = $1")
        .bind(&username)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let response = app.exchange(&username, &code).await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn signup_rejects_half_matching_pairs() {
    let Some(app) = spawn_app().await else { return };
    let username = unique("u");
    let email = format!("{}@example.com", username);
    assert_eq!(app.signup(&username, &email).await.status().as_u16(), 200);

    // Same username, different email.
    let other_email = format!("{}@example.com", unique("o"));
    let response = app.signup(&username, &other_email).await;
    assert_eq!(response.status().as_u16(), 400);

    // Same email, different username.
    let response = app.signup(&unique("o"), &email).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn signup_rejects_reserved_and_malformed_input() {
    let Some(app) = spawn_app().await else { return };

    let response = app.signup("me", "me@example.com").await;
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["fields"]["username"].is_array());

    let response = app.signup("with space", "space@example.com").await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.signup(&unique("u"), "not-an-email").await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn confirmation_code_works_once() {
    let Some(app) = spawn_app().await else { return };
    let username = unique("u");
    app.signup(&username, &format!("{}@example.com", username)).await;
    let code = app.next_code().await;

    let response = app.exchange(&username, &code).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let response = app.exchange(&username, &code).await;
    assert_eq!(response.status().as_u16(), 400);

    let last_login: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT last_login FROM users WHERE username = $1")
            .bind(&username)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(last_login.is_some());
}

#[tokio::test]
async fn altered_code_is_rejected() {
    let Some(app) = spawn_app().await else { return };
    let username = unique("u");
    app.signup(&username, &format!("{}@example.com", username)).await;
    let code = app.next_code().await;

    let mut altered = code.clone();
    let last = altered.pop().unwrap();
    altered.push(if last == 'A' { 'B' } else { 'A' });

    let response = app.exchange(&username, &altered).await;
    assert_eq!(response.status().as_u16(), 400);

    // The genuine code is still usable afterwards.
    let response = app.exchange(&username, &code).await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn token_for_unknown_user_is_404() {
    let Some(app) = spawn_app().await else { return };

    let response = app.exchange(&unique("ghost"), "00-AAAA").await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn bearer_token_is_checked() {
    let Some(app) = spawn_app().await else { return };

    // Anonymous reads are allowed.
    let response = app.client.get(app.url("/titles/")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // A malformed token is refused even on a public route.
    let response = app
        .client
        .get(app.url("/titles/"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Writes need a token.
    let response = app
        .client
        .post(app.url("/categories/"))
        .json(&serde_json::json!({ "name": "Film", "slug": "film" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn token_of_deleted_user_is_refused() {
    let Some(app) = spawn_app().await else { return };
    let (username, token) = app.register("gone").await;

    sqlx::query("DELETE FROM users WHERE username = $1")
        .bind(&username)
        .execute(&app.pool)
        .await
        .unwrap();

    let response = app
        .client
        .get(app.url("/users/me/"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn concurrent_signups_for_one_username_create_one_account() {
    let Some(app) = spawn_app().await else { return };
    let username = unique("race");
    let first_email = format!("{}@example.com", unique("a"));
    let second_email = format!("{}@example.com", unique("b"));

    let (first, second) = tokio::join!(
        app.signup(&username, &first_email),
        app.signup(&username, &second_email),
    );

    let mut statuses = [first.status().as_u16(), second.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, [200, 400]);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = $1")
        .bind(&username)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn concurrent_exchanges_of_one_code_yield_one_token() {
    let Some(app) = spawn_app().await else { return };
    let username = unique("u");
    app.signup(&username, &format!("{}@example.com", username)).await;
    let code = app.next_code().await;

    let (first, second) = tokio::join!(
        app.exchange(&username, &code),
        app.exchange(&username, &code),
    );

    let mut statuses = [first.status().as_u16(), second.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, [200, 400]);
}
