//! End-to-end tests driving the HTTP API with a real server on an
//! ephemeral port.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

use quill::config::{Cli, Config};
use quill::state::AppState;
use quill::{db, routes};

async fn spawn_app() -> (String, TempDir) {
    let tmp = TempDir::new().unwrap();
    let cli = Cli {
        config: None,
        host: None,
        port: None,
        data_dir: Some(tmp.path().to_path_buf()),
    };
    let config = Config::load(&cli).unwrap();
    std::fs::create_dir_all(config.uploads_path()).unwrap();

    let pool = db::create_pool(config.db_path()).unwrap();
    db::run_migrations(&pool).unwrap();

    let app = routes::app(AppState { db: pool, config });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), tmp)
}

/// Registers a user and returns a bearer token.
async fn register_and_login(client: &Client, base: &str, email: &str) -> String {
    let resp = client
        .post(format!("{}/users/register", base))
        .json(&json!({ "email": email, "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .post(format!("{}/users/login", base))
        .json(&json!({ "email": email, "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

async fn create_profile(
    client: &Client,
    base: &str,
    token: &str,
    first: &str,
    last: &str,
    nick: &str,
) -> Value {
    let resp = client
        .post(format!("{}/profiles", base))
        .bearer_auth(token)
        .json(&json!({
            "first_name": first,
            "last_name": last,
            "nick_name": nick,
            "sex": "Other",
            "bio": "hello"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn register_login_logout_round_trip() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let token = register_and_login(&client, &base, "alice@example.com").await;

    // Duplicate registration is a validation failure
    let resp = client
        .post(format!("{}/users/register", base))
        .json(&json!({ "email": "alice@example.com", "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "validation");

    // The token works
    let resp = client
        .get(format!("{}/users/me", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password_hash").is_none());

    // Revoked token stops working
    let resp = client
        .post(format!("{}/users/logout", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/users/me", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    register_and_login(&client, &base, "alice@example.com").await;

    let resp = client
        .post(format!("{}/users/login", base))
        .json(&json!({ "email": "alice@example.com", "password": "wrong password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn follow_is_a_strict_toggle() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    let bob = register_and_login(&client, &base, "bob@example.com").await;
    let bob_profile = create_profile(&client, &base, &bob, "Bob", "Builder", "bob").await;
    let bob_profile_id = bob_profile["id"].as_str().unwrap();

    // First follow succeeds
    let resp = client
        .get(format!("{}/profiles/{}/follow", base, bob_profile_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Immediate repeat conflicts with the documented message
    let resp = client
        .get(format!("{}/profiles/{}/follow", base, bob_profile_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "You are already following this profile");

    // Alice's following list contains Bob's profile
    let resp = client
        .get(format!("{}/profiles/me/list_following", base))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let listed: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec![bob_profile_id]);

    // Bob sees Alice among his followers
    let resp = client
        .get(format!("{}/profiles/me/list_followers", base))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["email"], "alice@example.com");

    // Unfollow once, then the repeat conflicts
    let resp = client
        .get(format!("{}/profiles/{}/unfollow", base, bob_profile_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/profiles/{}/unfollow", base, bob_profile_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "You are not following this profile");
}

#[tokio::test]
async fn like_unlike_is_a_true_toggle() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    let bob = register_and_login(&client, &base, "bob@example.com").await;

    let resp = client
        .post(format!("{}/posts", base))
        .bearer_auth(&bob)
        .json(&json!({ "topic": "breakfast", "body": "eggs again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let post: Value = resp.json().await.unwrap();
    let post_id = post["id"].as_str().unwrap();
    assert_eq!(post["like_count"], 0);

    // Like
    let resp = client
        .get(format!("{}/posts/{}/like_unlike", base, post_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "liked");

    let resp = client
        .get(format!("{}/posts/{}", base, post_id))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["like_count"], 1);
    assert_eq!(body["liked_by"][0], "alice@example.com");

    // Unlike — same endpoint, still a success
    let resp = client
        .get(format!("{}/posts/{}/like_unlike", base, post_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "unliked");

    let resp = client
        .get(format!("{}/posts/{}", base, post_id))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["like_count"], 0);

    // A liked post shows up under liked_posts until unliked
    client
        .get(format!("{}/posts/{}/like_unlike", base, post_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    let resp = client
        .get(format!("{}/posts/liked_posts", base))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn hashtag_filter_requires_the_literal_tag() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;

    for (topic, body) in [
        ("Breaking #news today", "details inside"),
        ("quiet day", "no news here, just #naps"),
    ] {
        let resp = client
            .post(format!("{}/posts", base))
            .bearer_auth(&alice)
            .json(&json!({ "topic": topic, "body": body }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = client
        .get(format!("{}/posts?hashtag=news", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let posts = body.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["topic"], "Breaking #news today");

    // A tag that only appears in a body still matches
    let resp = client
        .get(format!("{}/posts?hashtag=naps", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body.as_array().unwrap()[0]["topic"], "quiet day");
}

#[tokio::test]
async fn following_feed_shows_only_followed_authors() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    let bob = register_and_login(&client, &base, "bob@example.com").await;
    let carol = register_and_login(&client, &base, "carol@example.com").await;

    let bob_profile = create_profile(&client, &base, &bob, "Bob", "Builder", "bob").await;
    create_profile(&client, &base, &carol, "Carol", "Dancer", "carol").await;

    for (token, topic) in [(&bob, "from bob"), (&carol, "from carol")] {
        client
            .post(format!("{}/posts", base))
            .bearer_auth(token)
            .json(&json!({ "topic": topic, "body": "content" }))
            .send()
            .await
            .unwrap();
    }

    client
        .get(format!(
            "{}/profiles/{}/follow",
            base,
            bob_profile["id"].as_str().unwrap()
        ))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{}/posts/following_posts", base))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let posts = body.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["author"], "bob@example.com");
}

#[tokio::test]
async fn comments_are_scoped_and_immutable_in_parentage() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    let bob = register_and_login(&client, &base, "bob@example.com").await;

    let resp = client
        .post(format!("{}/posts", base))
        .bearer_auth(&alice)
        .json(&json!({ "topic": "t", "body": "b" }))
        .send()
        .await
        .unwrap();
    let post: Value = resp.json().await.unwrap();
    let post_id = post["id"].as_str().unwrap();

    // Comments on a nonexistent post are NotFound, not an empty list
    let resp = client
        .get(format!("{}/posts/does-not-exist/comments", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .post(format!("{}/posts/{}/comments", base, post_id))
        .bearer_auth(&bob)
        .json(&json!({ "body": "nice post" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let comment: Value = resp.json().await.unwrap();
    let comment_id = comment["id"].as_str().unwrap();
    assert_eq!(comment["author"], "bob@example.com");
    assert_eq!(comment["post_id"], post_id);

    // Attempting to move the comment is ignored: post and author are fixed
    let resp = client
        .patch(format!("{}/posts/{}/comments/{}", base, post_id, comment_id))
        .bearer_auth(&bob)
        .json(&json!({
            "body": "edited",
            "post_id": "some-other-post",
            "author": "alice@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["body"], "edited");
    assert_eq!(body["post_id"], post_id);
    assert_eq!(body["author"], "bob@example.com");

    // Only the author may edit
    let resp = client
        .patch(format!("{}/posts/{}/comments/{}", base, post_id, comment_id))
        .bearer_auth(&alice)
        .json(&json!({ "body": "hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profile_uniqueness_and_filters() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    let bob = register_and_login(&client, &base, "bob@example.com").await;

    create_profile(&client, &base, &alice, "Anna", "Kovalenko", "anna_k").await;

    // Same (last_name, nick_name) pair is rejected
    let resp = client
        .post(format!("{}/profiles", base))
        .bearer_auth(&bob)
        .json(&json!({
            "first_name": "Other",
            "last_name": "Kovalenko",
            "nick_name": "anna_k"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "validation");

    // A second profile for the same user is a conflict
    let resp = client
        .post(format!("{}/profiles", base))
        .bearer_auth(&alice)
        .json(&json!({
            "first_name": "Anna",
            "last_name": "Second",
            "nick_name": "anna2"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    create_profile(&client, &base, &bob, "Bohdan", "Shevchuk", "bodya").await;

    // Substring filters are case-insensitive and AND-composed
    let resp = client
        .get(format!("{}/profiles?first_name=ann&last_name=koval", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let profiles = body.as_array().unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["nick_name"], "anna_k");

    // Disjoint filters return nothing
    let resp = client
        .get(format!("{}/profiles?first_name=ann&last_name=shev", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body.as_array().unwrap().is_empty());

    // Sex filter is exact; an unknown value is a validation error
    let resp = client
        .get(format!("{}/profiles?sex=Man", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body.as_array().unwrap().is_empty());

    let resp = client
        .get(format!("{}/profiles?sex=Martian", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_owner_may_modify_a_profile() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    let bob = register_and_login(&client, &base, "bob@example.com").await;
    let profile = create_profile(&client, &base, &alice, "Anna", "Kovalenko", "anna_k").await;
    let profile_id = profile["id"].as_str().unwrap();

    // Reads are open to everyone
    let resp = client
        .get(format!("{}/profiles/{}", base, profile_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // A different authenticated user is denied, and the denial is loud
    let resp = client
        .patch(format!("{}/profiles/{}", base, profile_id))
        .bearer_auth(&bob)
        .json(&json!({ "bio": "defaced" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let resp = client
        .delete(format!("{}/profiles/{}", base, profile_id))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The owner succeeds
    let resp = client
        .patch(format!("{}/profiles/{}", base, profile_id))
        .bearer_auth(&alice)
        .json(&json!({ "bio": "updated by me" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["bio"], "updated by me");

    // An unauthenticated write is unauthorized, not forbidden
    let resp = client
        .patch(format!("{}/profiles/{}", base, profile_id))
        .json(&json!({ "bio": "anonymous" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_updates_bump_updated_at_only() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    let bob = register_and_login(&client, &base, "bob@example.com").await;

    let resp = client
        .post(format!("{}/posts", base))
        .bearer_auth(&alice)
        .json(&json!({ "topic": "original", "body": "text" }))
        .send()
        .await
        .unwrap();
    let post: Value = resp.json().await.unwrap();
    let post_id = post["id"].as_str().unwrap();
    let created_at = post["created_at"].as_str().unwrap().to_string();

    // Another user may not edit
    let resp = client
        .patch(format!("{}/posts/{}", base, post_id))
        .bearer_auth(&bob)
        .json(&json!({ "topic": "hijack" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Timestamps are second-resolution; step past the creation second
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let resp = client
        .patch(format!("{}/posts/{}", base, post_id))
        .bearer_auth(&alice)
        .json(&json!({ "topic": "edited" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["topic"], "edited");
    assert_eq!(body["created_at"], created_at.as_str());
    assert_ne!(body["updated_at"], created_at.as_str());
}

#[tokio::test]
async fn profile_image_upload_round_trip() {
    let (base, _tmp) = spawn_app().await;
    let client = Client::new();

    let alice = register_and_login(&client, &base, "alice@example.com").await;
    create_profile(&client, &base, &alice, "Anna", "Kovalenko", "anna_k").await;

    let form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(vec![0x89, b'P', b'N', b'G'])
            .file_name("avatar.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let resp = client
        .put(format!("{}/profiles/me/image", base))
        .bearer_auth(&alice)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let image = body["image"].as_str().unwrap();
    assert!(image.starts_with("profiles/alice@example.com-"));
    assert!(image.ends_with(".png"));

    // The stored bytes come back through the uploads route
    let resp = client
        .get(format!("{}/uploads/{}", base, image))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "image/png"
    );
    assert_eq!(resp.bytes().await.unwrap().to_vec(), vec![0x89, b'P', b'N', b'G']);

    // Traversal attempts are NotFound
    let resp = client
        .get(format!("{}/uploads/../config.toml", base))
        .send()
        .await
        .unwrap();
    assert_ne!(resp.status(), StatusCode::OK);
}
