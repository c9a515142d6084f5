/// Integration test: the REST surface end to end.
///
/// Serves the full router on an ephemeral loopback port and drives it with
/// reqwest: auth flow, history paging and validation, membership gates on
/// history, ban behavior and the moderation ladder.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value, json};

use aperture_api::auth::hash_password;
use aperture_db::Database;
use aperture_server::{build_router, build_state};

const SECRET: &str = "api-test-secret";

#[tokio::test]
async fn register_and_login_round_trip() {
    let (addr, _db) = spawn_server().await;
    let client = reqwest::Client::new();

    let (token, _id) = register(&client, addr, "Ada", "ada@example.com").await;

    // Same email again
    let res = client
        .post(format!("http://{}/api/auth/register", addr))
        .json(&json!({ "name": "Imposter", "email": "Ada@Example.com", "password": "pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 409);
    assert_eq!(body_message(res).await, "Email is already in use.");

    // Missing password
    let res = client
        .post(format!("http://{}/api/auth/register", addr))
        .json(&json!({ "name": "Eve", "email": "eve@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(body_message(res).await, "name, email and password are required.");

    let res = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&json!({ "email": "ada@example.com", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["name"], "Ada");
    assert_eq!(body["user"]["role"], "user");

    let res = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&json!({ "email": "ada@example.com", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);
    assert_eq!(body_message(res).await, "Invalid email or password.");

    // Protected routes demand a token
    let res = client
        .get(format!("http://{}/api/auth/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);
    assert_eq!(body_message(res).await, "Authentication token is required.");

    let res = client
        .patch(format!("http://{}/api/auth/me", addr))
        .bearer_auth(&token)
        .json(&json!({ "name": "Ada L." }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["name"], "Ada L.");

    // Writable keys are a closed set
    let res = client
        .patch(format!("http://{}/api/auth/me", addr))
        .bearer_auth(&token)
        .json(&json!({ "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(body_message(res).await, "Only name, avatar can be updated.");
}

#[tokio::test]
async fn history_paging_and_validation() {
    let (addr, _db) = spawn_server().await;
    let client = reqwest::Client::new();

    let (ada_token, _ada) = register(&client, addr, "Ada", "ada@example.com").await;
    let (_bob_token, bob) = register(&client, addr, "Bob", "bob@example.com").await;

    let res = client
        .post(format!("http://{}/api/groups", addr))
        .bearer_auth(&ada_token)
        .json(&json!({ "name": "trip", "members": [bob] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);
    let body: Value = res.json().await.unwrap();
    let gid = body["group"]["id"].as_i64().unwrap();

    for content in ["m1", "m2", "m3"] {
        let res = client
            .post(format!("http://{}/api/messages", addr))
            .bearer_auth(&ada_token)
            .json(&json!({ "chatType": "group", "group": gid, "content": content }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 201);
    }

    let res = client
        .get(format!("http://{}/api/messages", addr))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(body_message(res).await, "chatType is required.");

    let res = client
        .get(format!("http://{}/api/messages?chatType=group", addr))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(body_message(res).await, "group is required.");

    // Unknown kinds are not an error; they just match nothing
    let res = client
        .get(format!("http://{}/api/messages?chatType=smoke", addr))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 0);
    assert_eq!(body["pagination"]["total"], 0);

    // Oldest first, two to a page
    let res = client
        .get(format!(
            "http://{}/api/messages?chatType=group&group={}&page=1&limit=2",
            addr, gid
        ))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "m1");
    assert_eq!(messages[1]["content"], "m2");
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["limit"], 2);
    assert_eq!(body["pagination"]["total"], 3);

    let res = client
        .get(format!(
            "http://{}/api/messages?chatType=group&group={}&page=2&limit=2",
            addr, gid
        ))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "m3");
}

#[tokio::test]
async fn history_enforces_group_membership() {
    let (addr, _db) = spawn_server().await;
    let client = reqwest::Client::new();

    let (ada_token, _ada) = register(&client, addr, "Ada", "ada@example.com").await;
    let (eve_token, _eve) = register(&client, addr, "Eve", "eve@example.com").await;

    let res = client
        .post(format!("http://{}/api/groups", addr))
        .bearer_auth(&ada_token)
        .json(&json!({ "name": "inner circle" }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let gid = body["group"]["id"].as_i64().unwrap();

    let res = client
        .get(format!("http://{}/api/messages?chatType=group&group={}", addr, gid))
        .bearer_auth(&eve_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(body_message(res).await, "Not a member of this group.");

    let res = client
        .get(format!("http://{}/api/messages?chatType=group&group=9999", addr))
        .bearer_auth(&eve_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(body_message(res).await, "Group not found.");

    // The HTTP send path runs the same gate
    let res = client
        .post(format!("http://{}/api/messages", addr))
        .bearer_auth(&eve_token)
        .json(&json!({ "chatType": "group", "group": gid, "content": "let me in" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(body_message(res).await, "Not a member of this group.");
}

#[tokio::test]
async fn banned_accounts_log_in_but_cannot_act() {
    let (addr, db) = spawn_server().await;
    let client = reqwest::Client::new();

    let (token, id) = register(&client, addr, "Ada", "ada@example.com").await;
    db.set_banned(id, true).unwrap();

    // Login still succeeds; the ban surfaces on protected routes
    let res = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&json!({ "email": "ada@example.com", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    let res = client
        .get(format!("http://{}/api/auth/me", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(body_message(res).await, "Your account has been banned.");

    db.set_banned(id, false).unwrap();
    let res = client
        .get(format!("http://{}/api/auth/me", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
}

#[tokio::test]
async fn moderation_follows_the_role_ladder() {
    let (addr, db) = spawn_server().await;
    let client = reqwest::Client::new();

    let (ada_token, ada) = register(&client, addr, "Ada", "ada@example.com").await;
    let (eve_token, eve) = register(&client, addr, "Eve", "eve@example.com").await;

    // Plain users are shut out of the admin surface
    let res = client
        .get(format!("http://{}/api/admin/users", addr))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(body_message(res).await, "You are not allowed to perform this action.");

    let root = db
        .ensure_super_admin("Root", "root@example.com", &hash_password("root-pw").unwrap())
        .unwrap();
    let res = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&json!({ "email": "root@example.com", "password": "root-pw" }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let root_token = body["token"].as_str().unwrap().to_string();

    let res = client
        .post(format!("http://{}/api/admin/promote/{}", addr, ada))
        .bearer_auth(&root_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "User promoted to Admin.");
    assert_eq!(body["user"]["role"], "admin");

    let res = client
        .post(format!("http://{}/api/admin/promote/{}", addr, ada))
        .bearer_auth(&root_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(body_message(res).await, "User is already an Admin.");

    // Promote eve too, then have her try the super admin
    let res = client
        .post(format!("http://{}/api/admin/promote/{}", addr, eve))
        .bearer_auth(&root_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    let res = client
        .post(format!("http://{}/api/admin/ban/{}", addr, root))
        .bearer_auth(&eve_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(body_message(res).await, "Cannot ban Super Admin.");

    // Admin on admin is off limits; the super admin may
    let res = client
        .post(format!("http://{}/api/admin/ban/{}", addr, ada))
        .bearer_auth(&eve_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(body_message(res).await, "Admins cannot ban other Admins.");

    let res = client
        .post(format!("http://{}/api/admin/ban/{}", addr, ada))
        .bearer_auth(&root_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "User banned.");

    let res = client
        .get(format!("http://{}/api/admin/users?search=Ada", addr))
        .bearer_auth(&root_token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["users"][0]["isBanned"], true);
    assert_eq!(body["total"], 1);

    let res = client
        .post(format!("http://{}/api/admin/demote/{}", addr, ada))
        .bearer_auth(&root_token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Admin demoted to User.");

    let res = client
        .delete(format!("http://{}/api/admin/users/{}", addr, ada))
        .bearer_auth(&root_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "User deleted.");
}

async fn spawn_server() -> (SocketAddr, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let state = build_state(db.clone(), SECRET.to_string());
    let app = build_router(state, "http://localhost:3000").unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, db)
}

async fn register(
    client: &reqwest::Client,
    addr: SocketAddr,
    name: &str,
    email: &str,
) -> (String, i64) {
    let res = client
        .post(format!("http://{}/api/auth/register", addr))
        .json(&json!({ "name": name, "email": email, "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);
    let body: Value = res.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    let id = body["user"]["id"].as_i64().unwrap();
    (token, id)
}

async fn body_message(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["message"].as_str().unwrap_or_default().to_string()
}
