use indoc::indoc;
use integration_tests::{MockUpstream, TestServer};

#[tokio::test]
async fn unreachable_redis_falls_back_to_local_counters() {
    let upstream = MockUpstream::start().await;

    let config = indoc! {r#"
        [admission.storage]
        type = "redis"
        url = "redis://127.0.0.1:1/0"
        connection_timeout = "200ms"

        [admission.burst]
        enabled = false

        [admission.tiers.free]
        limit = 2
        window = "60s"

        [admission.identity]
        user_header = "x-user-id"
        role_header = "x-user-role"
        tier_header = "x-user-tier"
        trust_forwarded_headers = true
    "#};

    let server = TestServer::builder().upstream(&upstream).build(config).await;

    let statuses = [
        server.client.get_as("/items", "alice", "192.0.2.1").await.status(),
        server.client.get_as("/items", "alice", "192.0.2.1").await.status(),
        server.client.get_as("/items", "alice", "192.0.2.1").await.status(),
    ];

    assert_eq!(statuses.map(|status| status.as_u16()), [200, 200, 429]);
    assert_eq!(upstream.hits(), 2);

    server.shutdown().await.unwrap();
}
