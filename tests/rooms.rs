//! Integration tests for the room lifecycle and membership.

mod common;

use common::{TestClient, TestServer};
use serde_json::json;

#[tokio::test]
async fn room_lifecycle_create_join_delete() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut admin = TestClient::connect(server.addr()).await.expect("connect");
    admin.register_ok(Some("boss")).await.expect("register");
    admin.elevate(&server.admin_secret()).await.expect("elevate");

    admin.send_chat("/createroom lounge", None).await.expect("send");
    let created = admin.recv_type("room_created").await.expect("recv");
    assert_eq!(created["message"], "Room 'lounge' created successfully");

    // A member joins over the structured frame.
    let mut alice = TestClient::connect(server.addr()).await.expect("connect");
    alice.register_ok(Some("alice")).await.expect("register");
    alice
        .send_json(&json!({ "message_type": "join_room", "room_name": "lounge" }))
        .await
        .expect("send");
    let joined = alice.recv_type("room_joined").await.expect("recv");
    assert_eq!(joined["room_name"], "lounge");
    assert_eq!(joined["message"], "Joined room 'lounge'");

    // Deletion notifies every member.
    admin.send_chat("/deleteroom lounge", None).await.expect("send");
    let notice = alice
        .recv_until(|v| v["type"] == "room_deleted")
        .await
        .expect("recv");
    assert_eq!(notice["room_name"], "lounge");
    assert_eq!(
        notice["message"],
        "Room lounge has been deleted by boss"
    );
    assert!(notice["timestamp"].is_string());

    // And the deleted room is gone for joins.
    alice
        .send_json(&json!({ "message_type": "join_room", "room_name": "lounge" }))
        .await
        .expect("send");
    let reply = alice.recv_type("error").await.expect("recv");
    assert_eq!(reply["message"], "Room 'lounge' does not exist");
}

#[tokio::test]
async fn room_creation_requires_admin() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut alice = TestClient::connect(server.addr()).await.expect("connect");
    alice.register_ok(Some("alice")).await.expect("register");

    alice.send_chat("/createroom lounge", None).await.expect("send");
    let reply = alice.recv_type("error").await.expect("recv");
    assert_eq!(reply["message"], "Admin privileges required to create rooms");

    alice.send_chat("/deleteroom main", None).await.expect("send");
    let reply = alice.recv_type("error").await.expect("recv");
    assert_eq!(reply["message"], "Admin privileges required to delete rooms");
}

#[tokio::test]
async fn main_room_is_permanent() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut admin = TestClient::connect(server.addr()).await.expect("connect");
    admin.register_ok(Some("boss")).await.expect("register");
    admin.elevate(&server.admin_secret()).await.expect("elevate");

    admin.send_chat("/deleteroom main", None).await.expect("send");
    let reply = admin.recv_type("error").await.expect("recv");
    assert_eq!(reply["message"], "Cannot delete the main room");

    admin
        .send_json(&json!({ "message_type": "leave_room", "room_name": "main" }))
        .await
        .expect("send");
    let reply = admin.recv_type("error").await.expect("recv");
    assert_eq!(reply["message"], "Cannot leave the main room");
}

#[tokio::test]
async fn deleted_room_name_is_not_reusable() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut admin = TestClient::connect(server.addr()).await.expect("connect");
    admin.register_ok(Some("boss")).await.expect("register");
    admin.elevate(&server.admin_secret()).await.expect("elevate");

    admin.send_chat("/createroom lounge", None).await.expect("send");
    admin.recv_type("room_created").await.expect("recv");

    admin.send_chat("/deleteroom lounge", None).await.expect("send");
    admin.recv_type("room_deleted").await.expect("recv");

    // The soft-deleted row keeps holding the name.
    admin.send_chat("/createroom lounge", None).await.expect("send");
    let reply = admin.recv_type("error").await.expect("recv");
    assert_eq!(reply["message"], "Room 'lounge' already exists");
}

#[tokio::test]
async fn slash_join_validates_and_strips_the_hash() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut admin = TestClient::connect(server.addr()).await.expect("connect");
    admin.register_ok(Some("boss")).await.expect("register");
    admin.elevate(&server.admin_secret()).await.expect("elevate");
    admin.send_chat("/createroom lounge", None).await.expect("send");
    admin.recv_type("room_created").await.expect("recv");

    let mut alice = TestClient::connect(server.addr()).await.expect("connect");
    alice.register_ok(Some("alice")).await.expect("register");

    alice.send_chat("/join", None).await.expect("send");
    let reply = alice.recv_type("error").await.expect("recv");
    assert_eq!(reply["message"], "Usage: /join #room-name");

    alice.send_chat("/join #bad room", None).await.expect("send");
    let reply = alice.recv_type("error").await.expect("recv");
    assert_eq!(
        reply["message"],
        "Invalid room name: Room name can only contain letters, numbers, underscore, and hyphen"
    );

    alice.send_chat("/join #lounge", None).await.expect("send");
    let joined = alice.recv_type("room_joined").await.expect("recv");
    assert_eq!(joined["room_name"], "lounge");
}

#[tokio::test]
async fn left_command_leaves_most_recent_room() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut admin = TestClient::connect(server.addr()).await.expect("connect");
    admin.register_ok(Some("boss")).await.expect("register");
    admin.elevate(&server.admin_secret()).await.expect("elevate");
    for room in ["alpha", "beta"] {
        admin
            .send_chat(&format!("/createroom {room}"), None)
            .await
            .expect("send");
        admin.recv_type("room_created").await.expect("recv");
    }

    let mut alice = TestClient::connect(server.addr()).await.expect("connect");
    alice.register_ok(Some("alice")).await.expect("register");

    alice.send_chat("/join alpha", None).await.expect("send");
    alice.recv_type("room_joined").await.expect("recv");
    alice.send_chat("/join beta", None).await.expect("send");
    alice.recv_type("room_joined").await.expect("recv");

    alice.send_chat("/left", None).await.expect("send");
    let left = alice.recv_type("room_left").await.expect("recv");
    assert_eq!(left["room_name"], "beta");

    alice.send_chat("/left", None).await.expect("send");
    let left = alice.recv_type("room_left").await.expect("recv");
    assert_eq!(left["room_name"], "alpha");

    alice.send_chat("/left", None).await.expect("send");
    let reply = alice.recv_type("error").await.expect("recv");
    assert_eq!(
        reply["message"],
        "You are only in the main room and cannot leave it"
    );
}

#[tokio::test]
async fn memberships_rehydrate_on_reconnect() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut admin = TestClient::connect(server.addr()).await.expect("connect");
    admin.register_ok(Some("boss")).await.expect("register");
    admin.elevate(&server.admin_secret()).await.expect("elevate");
    admin.send_chat("/createroom lounge", None).await.expect("send");
    admin.recv_type("room_created").await.expect("recv");

    {
        let mut alice = TestClient::connect(server.addr()).await.expect("connect");
        alice.register_ok(Some("alice")).await.expect("register");
        alice.send_chat("/join lounge", None).await.expect("send");
        alice.recv_type("room_joined").await.expect("recv");
    }

    // Reconnecting under the same identity restores the membership.
    let mut alice = TestClient::connect(server.addr()).await.expect("connect");
    let welcome = alice.register_ok(Some("alice")).await.expect("register");
    let rooms: Vec<String> = welcome["rooms"]
        .as_array()
        .expect("rooms array")
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect();
    assert!(rooms.contains(&"main".to_string()));
    assert!(rooms.contains(&"lounge".to_string()));
}

#[tokio::test]
async fn room_queries_answer_directly() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut admin = TestClient::connect(server.addr()).await.expect("connect");
    admin.register_ok(Some("boss")).await.expect("register");
    admin.elevate(&server.admin_secret()).await.expect("elevate");
    admin.send_chat("/createroom lounge", None).await.expect("send");
    admin.recv_type("room_created").await.expect("recv");

    admin
        .send_json(&json!({ "message_type": "get_rooms" }))
        .await
        .expect("send");
    let rooms = admin.recv_type("rooms_list").await.expect("recv");
    let names: Vec<&str> = rooms["rooms"]
        .as_array()
        .expect("rooms array")
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["lounge", "main"]);

    admin
        .send_json(&json!({ "message_type": "get_room_users" }))
        .await
        .expect("send");
    let users = admin.recv_type("room_users_list").await.expect("recv");
    assert_eq!(users["room_name"], "main");
    assert_eq!(users["users"][0]["username"], "boss");
    assert_eq!(users["users"][0]["is_admin"], true);
}
