use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::middleware::{authenticate, require_confirmed};
use crate::{follows, posts, profile};

/// Every HTTP route. Session tokens are resolved for all of them; routes
/// outside `/auth` additionally turn away unconfirmed accounts.
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/confirm", post(auth::resend_confirmation))
        .route("/auth/confirm/{token}", get(auth::confirm))
        .route("/auth/unconfirmed", get(auth::unconfirmed))
        .route("/auth/change_password", post(auth::change_password))
        .route("/auth/change_email", post(auth::change_email))
        .route("/auth/reset_password_request", post(auth::reset_password_request))
        .route("/auth/reset_password/{token}", post(auth::reset_password))
        .route("/auth/edit_profile", post(profile::edit_profile))
        .route("/auth/edit_profile_admin", get(profile::admin_list_users))
        .route(
            "/auth/edit_profile_admin/{id}",
            get(profile::admin_get_user).post(profile::admin_edit_user),
        );

    let main_routes = Router::new()
        .route("/", get(posts::index).post(posts::create_post))
        .route("/user/{username}", get(profile::user_profile))
        .route("/post/{id}", get(posts::get_post))
        .route("/post/{id}/comments", post(posts::add_comment))
        .route("/edit_post/{id}", post(posts::edit_post))
        .route("/moderate", get(posts::moderate))
        .route("/moderate/enable/{id}", post(posts::moderate_enable))
        .route("/moderate/disable/{id}", post(posts::moderate_disable))
        .route("/follow/{username}", post(follows::follow))
        .route("/unfollow/{username}", post(follows::unfollow))
        .route("/followers/{username}", get(follows::followers))
        .route("/followed_by/{username}", get(follows::followed_by))
        .layer(middleware::from_fn(require_confirmed));

    Router::new()
        .merge(auth_routes)
        .merge(main_routes)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use scribe_db::Database;

    use super::*;
    use crate::auth::{AppStateInner, Settings};
    use crate::mail::{Email, Mailer};

    const ADMIN: &str = "boss@example.com";
    const PASSWORD: &str = "correct horse";

    #[derive(Default)]
    struct MemoryMailer {
        sent: Mutex<Vec<Email>>,
    }

    impl Mailer for MemoryMailer {
        fn send(&self, email: Email) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    impl MemoryMailer {
        fn last(&self) -> Email {
            self.sent.lock().unwrap().last().cloned().expect("no mail sent")
        }

        /// Token from the link in the most recent message.
        fn last_token(&self) -> String {
            let body = self.last().body;
            let link = body
                .lines()
                .find(|l| l.starts_with("http"))
                .expect("no link in mail");
            link.rsplit('/').next().unwrap().to_string()
        }
    }

    struct TestApp {
        router: Router,
        mailer: Arc<MemoryMailer>,
    }

    impl TestApp {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            db.insert_roles().unwrap();
            let settings = Settings {
                admin_email: Some(ADMIN.into()),
                ..Settings::default()
            };
            let mailer = Arc::new(MemoryMailer::default());
            let state = Arc::new(AppStateInner::new(db, settings, mailer.clone()));
            Self {
                router: router(state),
                mailer,
            }
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let req = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => builder.body(Body::empty()),
            }
            .unwrap();

            let resp = self.router.clone().oneshot(req).await.unwrap();
            let status = resp.status();
            let bytes = resp.into_body().collect().await.unwrap().to_bytes();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        async fn register(&self, email: &str, username: &str) {
            let (status, _) = self
                .call(
                    "POST",
                    "/auth/register",
                    None,
                    Some(json!({
                        "email": email,
                        "username": username,
                        "password": PASSWORD,
                        "password2": PASSWORD,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
            self.call(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await
        }

        async fn session(&self, email: &str) -> String {
            let (status, body) = self.login(email, PASSWORD).await;
            assert_eq!(status, StatusCode::OK);
            body["token"].as_str().unwrap().to_string()
        }

        /// Register, confirm, and return a session token.
        async fn sign_up(&self, email: &str, username: &str) -> String {
            self.register(email, username).await;
            let confirm = self.mailer.last_token();
            let session = self.session(email).await;
            let (status, _) = self
                .call("GET", &format!("/auth/confirm/{confirm}"), Some(&session), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            session
        }

        async fn post(&self, session: &str, body: &str) -> i64 {
            let (status, post) = self
                .call("POST", "/", Some(session), Some(json!({ "body": body })))
                .await;
            assert_eq!(status, StatusCode::CREATED);
            post["id"].as_i64().unwrap()
        }
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = TestApp::new();
        let resp = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unconfirmed_accounts_stay_inside_auth() {
        let app = TestApp::new();
        app.register("ann@example.com", "ann").await;
        let mail = app.mailer.last();
        assert_eq!(mail.to, "ann@example.com");
        assert_eq!(mail.subject, "[Scribe] Confirm Your Account");

        let session = app.session("ann@example.com").await;
        let (status, body) = app.call("GET", "/auth/unconfirmed", Some(&session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["confirmed"], false);

        let (status, _) = app
            .call("POST", "/", Some(&session), Some(json!({ "body": "hi" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let token = app.mailer.last_token();
        let (status, _) = app
            .call("GET", &format!("/auth/confirm/{token}"), Some(&session), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        app.post(&session, "hello *world*").await;
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = TestApp::new();
        app.register("ann@example.com", "ann").await;
        let (status, body) = app
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "email": "ann@example.com",
                    "username": "other",
                    "password": PASSWORD,
                    "password2": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Email already registered.");
    }

    #[tokio::test]
    async fn bad_credentials_and_bad_bearer_are_unauthorized() {
        let app = TestApp::new();
        app.sign_up("ann@example.com", "ann").await;

        let (status, _) = app.login("ann@example.com", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.call("GET", "/", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Anonymous reads are fine.
        let (status, _) = app.call("GET", "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn another_users_confirm_token_is_rejected() {
        let app = TestApp::new();
        app.register("ann@example.com", "ann").await;
        let ann_token = app.mailer.last_token();
        let bob = app.sign_up("bob@example.com", "bob").await;

        let (status, body) = app
            .call("GET", &format!("/auth/confirm/{ann_token}"), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "The confirmation link is invalid or has expired.");
    }

    #[tokio::test]
    async fn admin_address_gets_administrator_role() {
        let app = TestApp::new();
        let boss = app.sign_up(ADMIN, "boss").await;
        let ann = app.sign_up("ann@example.com", "ann").await;

        let (status, _) = app.call("GET", "/auth/edit_profile_admin", Some(&ann), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call("GET", "/auth/edit_profile_admin", Some(&boss), None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["ann", "boss"]);

        let (_, profile) = app.call("GET", "/user/boss", None, None).await;
        assert_eq!(profile["profile"]["role"], "Administrator");
        assert!(profile["profile"].get("email").is_none());
    }

    #[tokio::test]
    async fn admin_can_promote_a_user() {
        let app = TestApp::new();
        let boss = app.sign_up(ADMIN, "boss").await;
        app.sign_up("ann@example.com", "ann").await;

        let (_, overview) = app.call("GET", "/auth/edit_profile_admin", Some(&boss), None).await;
        let ann_id = overview["users"][0]["id"].as_i64().unwrap();
        let moderator_id = overview["roles"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["name"] == "Moderator")
            .and_then(|r| r["id"].as_i64())
            .unwrap();

        let (status, body) = app
            .call(
                "POST",
                &format!("/auth/edit_profile_admin/{ann_id}"),
                Some(&boss),
                Some(json!({
                    "email": "ann@example.com",
                    "username": "ann",
                    "confirmed": true,
                    "role_id": moderator_id,
                    "location": "Lisbon",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "Moderator");
        assert_eq!(body["location"], "Lisbon");

        let (status, _) = app
            .call(
                "POST",
                &format!("/auth/edit_profile_admin/{ann_id}"),
                Some(&boss),
                Some(json!({
                    "email": ADMIN,
                    "username": "ann",
                    "confirmed": true,
                    "role_id": moderator_id,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn email_change_token_works_once() {
        let app = TestApp::new();
        let session = app.sign_up("ann@example.com", "ann").await;

        let (status, _) = app
            .call(
                "POST",
                "/auth/change_email",
                Some(&session),
                Some(json!({ "email": "ann@new.example.com", "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.mailer.last().to, "ann@new.example.com");
        let token = app.mailer.last_token();

        let uri = format!("/auth/confirm/{token}");
        let (status, _) = app.call("GET", &uri, Some(&session), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("GET", &uri, Some(&session), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.login("ann@new.example.com", PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn emails_are_matched_without_case() {
        let app = TestApp::new();
        app.sign_up("Ann@Example.com", "ann").await;
        assert_eq!(app.login("ann@example.com", PASSWORD).await.0, StatusCode::OK);
        assert_eq!(app.login("ANN@EXAMPLE.COM", PASSWORD).await.0, StatusCode::OK);

        let (status, _) = app
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "email": "aNN@example.com",
                    "username": "ann2",
                    "password": PASSWORD,
                    "password2": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn admin_address_variants_cannot_take_the_admin_role() {
        let app = TestApp::new();
        app.sign_up(ADMIN, "boss").await;

        let (status, body) = app
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "email": "BOSS@example.com",
                    "username": "mallory",
                    "password": PASSWORD,
                    "password2": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Email already registered.");
        let (status, _) = app.call("GET", "/user/mallory", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Before the owner registers, a variant is the same mailbox and the
        // confirmation goes there.
        let fresh = TestApp::new();
        fresh.register("Boss@Example.COM", "early").await;
        assert_eq!(fresh.mailer.last().to, ADMIN);
    }

    #[tokio::test]
    async fn older_email_change_token_dies_after_another_change() {
        let app = TestApp::new();
        let session = app.sign_up("ann@example.com", "ann").await;
        let mut tokens = Vec::new();
        for email in ["first@example.com", "second@example.com"] {
            let (status, _) = app
                .call(
                    "POST",
                    "/auth/change_email",
                    Some(&session),
                    Some(json!({ "email": email, "password": PASSWORD })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            tokens.push(app.mailer.last_token());
        }

        let (status, _) = app
            .call("GET", &format!("/auth/confirm/{}", tokens[0]), Some(&session), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call("GET", &format!("/auth/confirm/{}", tokens[1]), Some(&session), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(app.login("first@example.com", PASSWORD).await.0, StatusCode::OK);
        assert_eq!(app.login("second@example.com", PASSWORD).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reset_token_dies_after_email_change() {
        let app = TestApp::new();
        let session = app.sign_up("ann@example.com", "ann").await;

        let (status, _) = app
            .call(
                "POST",
                "/auth/reset_password_request",
                None,
                Some(json!({ "email": "ann@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let reset = app.mailer.last_token();

        let (status, _) = app
            .call(
                "POST",
                "/auth/change_email",
                Some(&session),
                Some(json!({ "email": "ann@new.example.com", "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let change = app.mailer.last_token();
        let (status, _) = app
            .call("GET", &format!("/auth/confirm/{change}"), Some(&session), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call(
                "POST",
                &format!("/auth/reset_password/{reset}"),
                None,
                Some(json!({ "password": "taken over", "password2": "taken over" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.login("ann@new.example.com", PASSWORD).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn password_change_needs_the_old_password() {
        let app = TestApp::new();
        let session = app.sign_up("ann@example.com", "ann").await;

        let (status, _) = app
            .call(
                "POST",
                "/auth/change_password",
                Some(&session),
                Some(json!({
                    "old_password": "nope",
                    "new_password": "new secret",
                    "new_password2": "new secret",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(
                "POST",
                "/auth/change_password",
                Some(&session),
                Some(json!({
                    "old_password": PASSWORD,
                    "new_password": "new secret",
                    "new_password2": "new secret",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.login("ann@example.com", "new secret").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let app = TestApp::new();
        let session = app.sign_up("ann@example.com", "ann").await;

        let (status, _) = app
            .call(
                "POST",
                "/auth/reset_password_request",
                Some(&session),
                Some(json!({ "email": "ann@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(
                "POST",
                "/auth/reset_password_request",
                None,
                Some(json!({ "email": "nobody@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(
                "POST",
                "/auth/reset_password_request",
                None,
                Some(json!({ "email": "ann@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = app.mailer.last_token();

        let (status, _) = app
            .call(
                "POST",
                &format!("/auth/reset_password/{token}"),
                None,
                Some(json!({ "password": "fresh start", "password2": "fresh start" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(app.login("ann@example.com", PASSWORD).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(app.login("ann@example.com", "fresh start").await.0, StatusCode::OK);

        let (status, _) = app
            .call(
                "POST",
                "/auth/reset_password/garbage",
                None,
                Some(json!({ "password": "x", "password2": "x" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_author_or_admin_edits_a_post() {
        let app = TestApp::new();
        let boss = app.sign_up(ADMIN, "boss").await;
        let ann = app.sign_up("ann@example.com", "ann").await;
        let bob = app.sign_up("bob@example.com", "bob").await;
        let id = app.post(&ann, "first draft").await;
        let uri = format!("/edit_post/{id}");

        let (status, _) = app
            .call("POST", &uri, Some(&bob), Some(json!({ "body": "vandalised" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call("POST", &uri, Some(&ann), Some(json!({ "body": "**second** draft" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["body_html"].as_str().unwrap().contains("<strong>second</strong> draft"));

        let (status, _) = app
            .call("POST", &uri, Some(&boss), Some(json!({ "body": "edited by admin" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call("POST", "/edit_post/999", Some(&ann), Some(json!({ "body": "x" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn post_html_is_sanitised() {
        let app = TestApp::new();
        let ann = app.sign_up("ann@example.com", "ann").await;
        let id = app.post(&ann, "hi <script>alert(1)</script>").await;

        let (status, body) = app.call("GET", &format!("/post/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        let html = body["post"]["body_html"].as_str().unwrap();
        assert!(!html.contains("<script"));
        assert_eq!(body["post"]["author"]["username"], "ann");
    }

    #[tokio::test]
    async fn followed_feed_shows_followed_and_own_posts() {
        let app = TestApp::new();
        let ann = app.sign_up("ann@example.com", "ann").await;
        let bob = app.sign_up("bob@example.com", "bob").await;
        let cat = app.sign_up("cat@example.com", "cat").await;
        app.post(&bob, "from bob").await;
        app.post(&cat, "from cat").await;
        app.post(&ann, "from ann").await;

        let (status, body) = app.call("POST", "/follow/bob", Some(&ann), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "You are now following bob.");
        let (_, body) = app.call("POST", "/follow/bob", Some(&ann), None).await;
        assert_eq!(body["message"], "You are already following this user.");

        let (status, _) = app.call("POST", "/follow/ann", Some(&ann), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.call("POST", "/follow/nobody", Some(&ann), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, feed) = app.call("GET", "/?followed=true", Some(&ann), None).await;
        let bodies: Vec<&str> = feed["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["body"].as_str().unwrap())
            .collect();
        assert_eq!(bodies, vec!["from ann", "from bob"]);

        let (_, profile) = app.call("GET", "/user/bob", Some(&ann), None).await;
        assert_eq!(profile["is_following"], true);
        assert_eq!(profile["follows_you"], false);
        assert_eq!(profile["profile"]["followers"], 1);

        let (_, all) = app.call("GET", "/", Some(&ann), None).await;
        assert_eq!(all["total"], 3);

        let (status, _) = app.call("GET", "/?followed=true", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, followers) = app.call("GET", "/followers/bob", Some(&cat), None).await;
        assert_eq!(followers["items"][0]["user"]["username"], "ann");

        let (_, body) = app.call("POST", "/unfollow/bob", Some(&ann), None).await;
        assert_eq!(body["message"], "You are not following bob anymore.");
        let (_, body) = app.call("POST", "/unfollow/bob", Some(&ann), None).await;
        assert_eq!(body["message"], "You are not following this user.");
    }

    #[tokio::test]
    async fn disabled_comments_are_hidden_from_readers() {
        let app = TestApp::new();
        let boss = app.sign_up(ADMIN, "boss").await;
        let ann = app.sign_up("ann@example.com", "ann").await;
        let id = app.post(&ann, "a post").await;

        let (status, comment) = app
            .call(
                "POST",
                &format!("/post/{id}/comments"),
                Some(&ann),
                Some(json!({ "body": "rude remark" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let comment_id = comment["id"].as_i64().unwrap();

        let (status, _) = app
            .call("POST", &format!("/moderate/disable/{comment_id}"), Some(&ann), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .call("POST", &format!("/moderate/disable/{comment_id}"), Some(&boss), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, detail) = app.call("GET", &format!("/post/{id}"), Some(&ann), None).await;
        let shown = &detail["comments"]["items"][0];
        assert_eq!(shown["disabled"], true);
        assert!(shown["body"].is_null());

        let (_, queue) = app.call("GET", "/moderate", Some(&boss), None).await;
        assert_eq!(queue["items"][0]["body"], "rude remark");
    }
}
