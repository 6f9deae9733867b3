use indoc::indoc;
use integration_tests::{MockUpstream, TestServer};
use reqwest::Method;

const THREE_PER_MINUTE: &str = indoc! {r#"
    [admission]
    default_tier = "free"

    [admission.burst]
    enabled = false

    [admission.tiers.free]
    limit = 3
    window = "60s"
    label = "Free"

    [admission.tiers.premium]
    limit = 5
    window = "60s"
    label = "Premium"

    [admission.identity]
    user_header = "x-user-id"
    role_header = "x-user-role"
    tier_header = "x-user-tier"
    trust_forwarded_headers = true
"#};

#[tokio::test]
async fn tier_ceiling_is_enforced_per_caller() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(THREE_PER_MINUTE).await;

    let mut remaining = Vec::new();

    for _ in 0..3 {
        let response = server.client.get_as("/items", "alice", "198.51.100.1").await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");

        remaining.push(response.headers()["x-ratelimit-remaining"].to_str().unwrap().to_string());
    }

    assert_eq!(remaining, ["2", "1", "0"]);

    let response = server.client.get_as("/items", "alice", "198.51.100.1").await;

    assert_eq!(response.status(), 429);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((59..=60).contains(&retry_after));

    let mut body: serde_json::Value = response.json().await.unwrap();
    let reset_time = body["resetTime"].as_str().unwrap().to_string();
    body["resetTime"] = "[reset]".into();
    body["retryAfter"] = "[retry]".into();
    body["error"] = "[error]".into();

    assert!(reset_time.ends_with('Z'));

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": "[error]",
      "limit": 3,
      "remaining": 0,
      "resetTime": "[reset]",
      "retryAfter": "[retry]",
      "tier": "Free"
    }
    "#);

    // The rejected request never reached the upstream.
    assert_eq!(upstream.hits(), 3);

    let response = server.client.get_as("/items", "bob", "198.51.100.1").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn claimed_tier_selects_the_policy() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(THREE_PER_MINUTE).await;

    let request = |tier: &'static str| {
        server
            .client
            .request(Method::GET, "/items")
            .header("x-user-id", "carol")
            .header("x-user-tier", tier)
            .send()
    };

    let premium = request("premium").await.unwrap();
    assert_eq!(premium.headers()["x-ratelimit-limit"], "5");

    let unknown = request("platinum").await.unwrap();
    assert_eq!(unknown.headers()["x-ratelimit-limit"], "3");
}

#[tokio::test]
async fn exempt_callers_are_never_rejected() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(THREE_PER_MINUTE).await;

    for _ in 0..10 {
        let response = server
            .client
            .request(Method::GET, "/items")
            .header("x-user-id", "root")
            .header("x-user-role", "admin")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    for _ in 0..10 {
        let response = server
            .client
            .request(Method::OPTIONS, "/items")
            .header("x-user-id", "dave")
            .send()
            .await
            .unwrap();

        assert_ne!(response.status(), 429);
    }

    assert_eq!(upstream.hits(), 10);
}

#[tokio::test]
async fn disabled_admission_forwards_everything() {
    let upstream = MockUpstream::start().await;

    let config = indoc! {r#"
        [admission]
        enabled = false

        [admission.tiers.free]
        limit = 1
        window = "60s"
    "#};

    let server = TestServer::builder().upstream(&upstream).build(config).await;

    for _ in 0..5 {
        let response = server.client.get_as("/items", "erin", "198.51.100.9").await;

        assert_eq!(response.status(), 200);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn unreachable_upstream_becomes_bad_gateway() {
    let config = format!("{THREE_PER_MINUTE}\n[server.upstream]\nurl = \"http://127.0.0.1:1\"\ntimeout = \"1s\"\n");

    let server = TestServer::builder().build(&config).await;
    let response = server.client.get_as("/items", "frank", "198.51.100.10").await;

    assert_eq!(response.status(), 502);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Upstream service unavailable");
}
