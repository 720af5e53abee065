use reqwest::StatusCode;
use serde_json::json;

use walletcore_api::app::{build_app, services::Config};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let app = build_app(Config::for_tests()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Wallet {
    token: String,
    username: String,
    primary_account: String,
}

/// Sign up a fresh user and return their token and primary account id.
async fn signup(client: &reqwest::Client, base_url: &str, name: &str) -> Wallet {
    let username = format!("{name}_{}", uuid::Uuid::now_v7().simple());
    let res = client
        .post(format!("{base_url}/auth/signup"))
        .json(&json!({
            "display_name": name,
            "email": format!("{username}@example.com"),
            "username": username,
            "password": "hunter22",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{base_url}/accounts"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let accounts: serde_json::Value = res.json().await.unwrap();
    let primary = accounts["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["primary"] == true)
        .expect("signup creates a primary account");

    Wallet {
        token,
        username,
        primary_account: primary["id"].as_str().unwrap().to_string(),
    }
}

async fn deposit(
    client: &reqwest::Client,
    base_url: &str,
    wallet: &Wallet,
    amount: &str,
    key: &str,
) {
    let res = client
        .post(format!(
            "{base_url}/accounts/{}/deposit",
            wallet.primary_account
        ))
        .bearer_auth(&wallet.token)
        .json(&json!({ "amount": amount, "currency": "USD", "idempotency_key": key }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

async fn balance_of(
    client: &reqwest::Client,
    base_url: &str,
    wallet: &Wallet,
) -> String {
    let res = client
        .get(format!("{base_url}/accounts/{}", wallet.primary_account))
        .bearer_auth(&wallet.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    body["balance"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public_and_wallet_routes_are_not() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/me", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/me", srv.base_url))
        .bearer_auth("not-a-real-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_login_and_me_round_trip() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let wallet = signup(&client, &srv.base_url, "alex").await;

    let res = client
        .get(format!("{}/me", srv.base_url))
        .bearer_auth(&wallet.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["username"].as_str().unwrap(), wallet.username);
    assert!(me["wallet_id"].as_str().unwrap().starts_with("WLT-"));
    assert!(me.get("password_hash").is_none());

    // Fresh login with the same credentials.
    let res = client
        .post(format!("{}/auth/login", srv.base_url))
        .json(&json!({
            "email": format!("{}@example.com", wallet.username),
            "password": "hunter22",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/auth/login", srv.base_url))
        .json(&json!({
            "email": format!("{}@example.com", wallet.username),
            "password": "wrong-password",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let body = json!({
        "display_name": "Alex",
        "email": "alex.morgan@example.com",
        "username": "alex_morgan",
        "password": "hunter22",
    });
    let res = client
        .post(format!("{}/auth/signup", srv.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/auth/signup", srv.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"].as_str().unwrap(), "conflict");
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let wallet = signup(&client, &srv.base_url, "alex").await;

    let res = client
        .post(format!("{}/auth/logout", srv.base_url))
        .bearer_auth(&wallet.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(format!("{}/me", srv.base_url))
        .bearer_auth(&wallet.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn transfer_replay_and_insufficient_funds_end_to_end() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alex = signup(&client, &srv.base_url, "alex").await;
    let sam = signup(&client, &srv.base_url, "sam").await;

    deposit(&client, &srv.base_url, &alex, "100.00", "seed-alex").await;

    let transfer = json!({
        "source_account_id": alex.primary_account,
        "destination": { "kind": "user", "username": sam.username },
        "amount": "40.00",
        "currency": "USD",
        "idempotency_key": "key1",
    });
    let res = client
        .post(format!("{}/transfers", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&transfer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["source_balance"].as_str().unwrap(), "60.00");
    assert_eq!(receipt["destination_balance"].as_str().unwrap(), "40.00");
    assert_eq!(receipt["replayed"], false);
    let transfer_id = receipt["transfer_id"].as_str().unwrap().to_string();

    // Replay of the identical request answers 200 with the first receipt.
    let res = client
        .post(format!("{}/transfers", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&transfer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let replay: serde_json::Value = res.json().await.unwrap();
    assert_eq!(replay["replayed"], true);
    assert_eq!(replay["transfer_id"].as_str().unwrap(), transfer_id);
    assert_eq!(balance_of(&client, &srv.base_url, &alex).await, "60.00");
    assert_eq!(balance_of(&client, &srv.base_url, &sam).await, "40.00");

    // Overdraw attempt is rejected and mutates nothing.
    let res = client
        .post(format!("{}/transfers", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&json!({
            "source_account_id": alex.primary_account,
            "destination": { "kind": "user", "username": sam.username },
            "amount": "100.00",
            "currency": "USD",
            "idempotency_key": "key2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"].as_str().unwrap(), "insufficient_funds");
    assert_eq!(balance_of(&client, &srv.base_url, &alex).await, "60.00");
    assert_eq!(balance_of(&client, &srv.base_url, &sam).await, "40.00");

    // Log shows the deposit credit and the transfer debit, newest first.
    let res = client
        .get(format!(
            "{}/accounts/{}/transactions",
            srv.base_url, alex.primary_account
        ))
        .bearer_auth(&alex.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let log: serde_json::Value = res.json().await.unwrap();
    let items = log["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["direction"].as_str().unwrap(), "debit");
    assert_eq!(items[0]["amount"].as_str().unwrap(), "-40.00");
    assert_eq!(items[0]["transfer_id"].as_str().unwrap(), transfer_id);
    assert_eq!(items[1]["direction"].as_str().unwrap(), "credit");
}

#[tokio::test]
async fn transfer_validation_and_authorization_failures() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alex = signup(&client, &srv.base_url, "alex").await;
    let sam = signup(&client, &srv.base_url, "sam").await;
    deposit(&client, &srv.base_url, &alex, "50.00", "seed").await;

    // Excess precision for USD.
    let res = client
        .post(format!("{}/transfers", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&json!({
            "source_account_id": alex.primary_account,
            "destination": { "kind": "user", "username": sam.username },
            "amount": "1.005",
            "currency": "USD",
            "idempotency_key": "bad-precision",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Sourcing from someone else's account is forbidden.
    let res = client
        .post(format!("{}/transfers", srv.base_url))
        .bearer_auth(&sam.token)
        .json(&json!({
            "source_account_id": alex.primary_account,
            "destination": { "kind": "external", "recipient": "somewhere" },
            "amount": "1.00",
            "currency": "USD",
            "idempotency_key": "not-yours",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Unknown destination account.
    let res = client
        .post(format!("{}/transfers", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&json!({
            "source_account_id": alex.primary_account,
            "destination": { "kind": "account", "id": uuid::Uuid::now_v7() },
            "amount": "1.00",
            "currency": "USD",
            "idempotency_key": "no-such-account",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Foreign accounts are invisible, not forbidden, on reads.
    let res = client
        .get(format!("{}/accounts/{}", srv.base_url, alex.primary_account))
        .bearer_auth(&sam.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn frozen_account_rejects_deposits() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alex = signup(&client, &srv.base_url, "alex").await;

    let res = client
        .post(format!(
            "{}/accounts/{}/freeze",
            srv.base_url, alex.primary_account
        ))
        .bearer_auth(&alex.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"].as_str().unwrap(), "frozen");

    let res = client
        .post(format!(
            "{}/accounts/{}/deposit",
            srv.base_url, alex.primary_account
        ))
        .bearer_auth(&alex.token)
        .json(&json!({ "amount": "5.00", "currency": "USD", "idempotency_key": "frozen-dep" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn transaction_log_pages_with_cursor() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alex = signup(&client, &srv.base_url, "alex").await;

    for i in 0..5 {
        deposit(&client, &srv.base_url, &alex, "1.00", &format!("d{i}")).await;
    }

    let res = client
        .get(format!(
            "{}/accounts/{}/transactions?limit=2",
            srv.base_url, alex.primary_account
        ))
        .bearer_auth(&alex.token)
        .send()
        .await
        .unwrap();
    let first: serde_json::Value = res.json().await.unwrap();
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    let cursor = first["next_cursor"].as_str().unwrap().to_string();

    let res = client
        .get(format!(
            "{}/accounts/{}/transactions?limit=2&cursor={}",
            srv.base_url, alex.primary_account, cursor
        ))
        .bearer_auth(&alex.token)
        .send()
        .await
        .unwrap();
    let second: serde_json::Value = res.json().await.unwrap();
    let second_items = second["items"].as_array().unwrap();
    assert_eq!(second_items.len(), 2);
    // Strictly older than everything on the first page.
    assert!(second_items[0]["id"].as_str().unwrap() < cursor.as_str());
}

#[tokio::test]
async fn payment_request_pay_once_then_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alex = signup(&client, &srv.base_url, "alex").await;
    let sam = signup(&client, &srv.base_url, "sam").await;
    deposit(&client, &srv.base_url, &alex, "50.00", "seed").await;

    let res = client
        .post(format!("{}/payment-requests", srv.base_url))
        .bearer_auth(&sam.token)
        .json(&json!({ "amount": "25.00", "currency": "USD", "recipient": "Alex" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let request: serde_json::Value = res.json().await.unwrap();
    let request_id = request["id"].as_str().unwrap().to_string();

    let pay = json!({ "source_account_id": alex.primary_account, "idempotency_key": "pay1" });
    let res = client
        .post(format!("{}/payment-requests/{}/pay", srv.base_url, request_id))
        .bearer_auth(&alex.token)
        .json(&pay)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let paid: serde_json::Value = res.json().await.unwrap();
    assert_eq!(paid["receipt"]["source_balance"].as_str().unwrap(), "25.00");
    assert_eq!(balance_of(&client, &srv.base_url, &sam).await, "25.00");

    // Retrying the same confirmation replays, not double-pays.
    let res = client
        .post(format!("{}/payment-requests/{}/pay", srv.base_url, request_id))
        .bearer_auth(&alex.token)
        .json(&pay)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(balance_of(&client, &srv.base_url, &sam).await, "25.00");

    // A second payment attempt with a fresh key conflicts.
    let res = client
        .post(format!("{}/payment-requests/{}/pay", srv.base_url, request_id))
        .bearer_auth(&alex.token)
        .json(&json!({ "source_account_id": alex.primary_account, "idempotency_key": "pay2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(balance_of(&client, &srv.base_url, &sam).await, "25.00");

    // The requester sees it as paid.
    let res = client
        .get(format!("{}/payment-requests", srv.base_url))
        .bearer_auth(&sam.token)
        .send()
        .await
        .unwrap();
    let list: serde_json::Value = res.json().await.unwrap();
    assert_eq!(list["items"][0]["status"].as_str().unwrap(), "paid");
}

#[tokio::test]
async fn contacts_require_real_users_and_reject_duplicates() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alex = signup(&client, &srv.base_url, "alex").await;
    let sam = signup(&client, &srv.base_url, "sam").await;

    let body = json!({ "name": "Sam", "username": sam.username });
    let res = client
        .post(format!("{}/contacts", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/contacts", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(format!("{}/contacts", srv.base_url))
        .bearer_auth(&alex.token)
        .json(&json!({ "name": "Ghost", "username": "nobody_at_all" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/contacts", srv.base_url))
        .bearer_auth(&alex.token)
        .send()
        .await
        .unwrap();
    let list: serde_json::Value = res.json().await.unwrap();
    assert_eq!(list["items"].as_array().unwrap().len(), 1);
}
