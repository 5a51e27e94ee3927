//! 认证与 presence 的端到端流程。

mod support;

use serde_json::json;
use support::{auth_request, error_code, TestClient, TestServer};

#[tokio::test]
async fn register_sends_response_history_then_presence() {
    let server = TestServer::spawn().await;
    let mut alice = TestClient::connect(&server).await;

    alice
        .send(auth_request("REGISTER", "alice", "secret1"))
        .await;

    // 每个接收者内的顺序是确定的：响应、历史、然后才是 presence
    let auth = alice.recv().await;
    assert_eq!(auth["type"], "AUTH_RESPONSE");
    assert_eq!(auth["data"]["username"], "alice");

    let history = alice.recv().await;
    assert_eq!(history["type"], "HISTORY_RESPONSE");
    assert_eq!(history["data"]["scope"], "ROOM");
    assert_eq!(history["data"]["room"], "General");
    assert_eq!(history["data"]["peer"], serde_json::Value::Null);
    assert_eq!(history["data"]["messages"], json!([]));

    let presence = alice.recv().await;
    assert_eq!(presence["type"], "USER_PRESENCE");
    assert_eq!(presence["data"]["event"], "userJoined");
    assert_eq!(presence["data"]["username"], "alice");
    assert_eq!(presence["data"]["onlineCount"], 1);
}

#[tokio::test]
async fn second_join_is_broadcast_with_the_new_count() {
    let server = TestServer::spawn().await;

    let mut alice = TestClient::connect(&server).await;
    alice.register("alice", "secret1").await;

    let mut bob = TestClient::connect(&server).await;
    bob.register("bob", "secret1").await;

    let presence = alice.recv_type("USER_PRESENCE").await;
    assert_eq!(presence["data"]["event"], "userJoined");
    // alice 先收到自己的 join；跳过它之后必然是 bob 的
    let presence = if presence["data"]["username"] == "alice" {
        alice.recv_type("USER_PRESENCE").await
    } else {
        presence
    };
    assert_eq!(presence["data"]["username"], "bob");
    assert_eq!(presence["data"]["onlineCount"], 2);
}

#[tokio::test]
async fn auth_error_codes_match_the_contract() {
    let server = TestServer::spawn().await;

    let mut alice = TestClient::connect(&server).await;
    alice.register("alice", "secret1").await;

    let mut probe = TestClient::connect(&server).await;

    // 重复注册
    probe.send(auth_request("REGISTER", "alice", "other12")).await;
    assert_eq!(error_code(&probe.recv_type("ERROR").await), "USER_EXISTS");

    // 密码错误
    probe.send(auth_request("LOGIN", "alice", "wrongpw")).await;
    assert_eq!(error_code(&probe.recv_type("ERROR").await), "INVALID_PASSWORD");

    // 用户不存在
    probe.send(auth_request("LOGIN", "ghost", "secret1")).await;
    assert_eq!(error_code(&probe.recv_type("ERROR").await), "USER_NOT_FOUND");

    // 空白用户名
    probe.send(auth_request("LOGIN", "  ", "secret1")).await;
    assert_eq!(error_code(&probe.recv_type("ERROR").await), "VALIDATION_ERROR");

    // 未知 action
    probe.send(auth_request("DELETE", "alice", "secret1")).await;
    assert_eq!(error_code(&probe.recv_type("ERROR").await), "UNKNOWN_ACTION");

    // 失败不影响后续成功登录
    probe.send(auth_request("LOGIN", "ALICE", "secret1")).await;
    let auth = probe.recv_type("AUTH_RESPONSE").await;
    assert_eq!(auth["data"]["username"], "alice");
}

#[tokio::test]
async fn unauthenticated_clients_only_get_unauthorized() {
    let server = TestServer::spawn().await;
    let mut client = TestClient::connect(&server).await;

    client
        .send(json!({"type":"CHAT_MESSAGE","data":{"room":"General","content":"hi"}}))
        .await;
    assert_eq!(error_code(&client.recv().await), "UNAUTHORIZED");

    client
        .send(json!({"type":"HISTORY_REQUEST","data":{"scope":"ROOM","room":"General"}}))
        .await;
    assert_eq!(error_code(&client.recv().await), "UNAUTHORIZED");

    client.send(json!({"type":"LOGOUT","data":null})).await;
    assert_eq!(error_code(&client.recv().await), "UNAUTHORIZED");

    // 连接依旧可用
    client.register("carol", "secret1").await;
}

#[tokio::test]
async fn logout_broadcasts_user_left_with_decremented_count() {
    let server = TestServer::spawn().await;

    let mut alice = TestClient::connect(&server).await;
    alice.register("alice", "secret1").await;
    let mut bob = TestClient::connect(&server).await;
    bob.register("bob", "secret1").await;

    bob.send(json!({"type":"LOGOUT","data":null})).await;

    loop {
        let presence = alice.recv_type("USER_PRESENCE").await;
        if presence["data"]["event"] == "userLeft" {
            assert_eq!(presence["data"]["username"], "bob");
            assert_eq!(presence["data"]["onlineCount"], 1);
            break;
        }
    }
}

#[tokio::test]
async fn abrupt_disconnect_also_broadcasts_user_left() {
    let server = TestServer::spawn().await;

    let mut alice = TestClient::connect(&server).await;
    alice.register("alice", "secret1").await;
    let mut bob = TestClient::connect(&server).await;
    bob.register("bob", "secret1").await;
    drop(bob);

    loop {
        let presence = alice.recv_type("USER_PRESENCE").await;
        if presence["data"]["event"] == "userLeft" {
            assert_eq!(presence["data"]["username"], "bob");
            break;
        }
    }
}
