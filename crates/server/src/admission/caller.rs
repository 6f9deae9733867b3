use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use config::{HeaderName, IdentityConfig};
use http::{HeaderMap, Request};
use rate_limit::{CallerContext, ExemptionRules};

/// Derives the admission view of a caller from request metadata.
pub(crate) struct CallerExtractor {
    identity: IdentityConfig,
    exemptions: ExemptionRules,
}

impl CallerExtractor {
    pub fn new(identity: IdentityConfig, exemptions: ExemptionRules) -> Self {
        Self { identity, exemptions }
    }

    pub fn extract<B>(&self, req: &Request<B>) -> CallerContext {
        let headers = req.headers();
        let role = header_value(headers, self.identity.role_header.as_ref());

        let is_exempt = self
            .exemptions
            .is_exempt(req.method().as_str(), req.uri().path(), role.as_deref());

        let mut builder = CallerContext::builder().exempt(is_exempt);

        if let Some(ip) = extract_client_ip(req, self.identity.trust_forwarded_headers) {
            builder = builder.network_identity(ip.to_string());
        }

        if let Some(user) = header_value(headers, self.identity.user_header.as_ref()) {
            builder = builder.identity(format!("user:{user}"));
        }

        if let Some(tier) = header_value(headers, self.identity.tier_header.as_ref()) {
            builder = builder.tier(tier);
        }

        if let Some(role) = role {
            builder = builder.role(role);
        }

        builder.build()
    }
}

/// Reads a configured identity header. Unconfigured headers are never read.
fn header_value(headers: &HeaderMap, name: Option<&HeaderName>) -> Option<String> {
    let value = headers.get(&**name?)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Extract client IP address from request.
///
/// Forwarding headers are only consulted when they are trusted, and win over the socket
/// address, which then belongs to the proxy.
fn extract_client_ip<B>(req: &Request<B>, trust_forwarded: bool) -> Option<IpAddr> {
    if trust_forwarded {
        let headers = req.headers();

        let forwarded_for = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok());

        if let Some(ip) = forwarded_for {
            return Some(ip);
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok());

        if let Some(ip) = real_ip {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

#[cfg(test)]
mod tests {
    use config::ExemptionConfig;

    use super::*;

    fn extractor(trust_forwarded_headers: bool) -> CallerExtractor {
        let identity = IdentityConfig {
            trust_forwarded_headers,
            ..IdentityConfig::trusted_proxy()
        };

        CallerExtractor::new(identity, ExemptionRules::from_config(&ExemptionConfig::default()))
    }

    fn default_extractor() -> CallerExtractor {
        CallerExtractor::new(
            IdentityConfig::default(),
            ExemptionRules::from_config(&ExemptionConfig::default()),
        )
    }

    fn connected(builder: http::request::Builder) -> Request<()> {
        let mut req = builder.body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 10], 4000))));

        req
    }

    #[test]
    fn user_header_wins_over_ip() {
        let req = connected(
            Request::get("/items")
                .header("x-user-id", "alice")
                .header("x-user-tier", "premium"),
        );

        let caller = extractor(true).extract(&req);

        assert_eq!(caller.identity, "user:alice");
        assert_eq!(caller.network_identity, "192.168.1.10");
        assert_eq!(caller.tier.as_deref(), Some("premium"));
        assert!(!caller.is_exempt);
    }

    #[test]
    fn forwarded_for_is_used_when_trusted() {
        let req = connected(Request::get("/items").header("x-forwarded-for", "203.0.113.7, 10.0.0.1"));

        assert_eq!(extractor(true).extract(&req).identity, "203.0.113.7");
        assert_eq!(extractor(false).extract(&req).identity, "192.168.1.10");
    }

    #[test]
    fn real_ip_is_the_second_choice() {
        let req = connected(Request::get("/items").header("x-real-ip", "198.51.100.2"));
        assert_eq!(extractor(true).extract(&req).network_identity, "198.51.100.2");
    }

    #[test]
    fn unknown_callers_are_anonymous() {
        let req = Request::get("/items").body(()).unwrap();
        assert_eq!(extractor(true).extract(&req).identity, rate_limit::ANONYMOUS);
    }

    #[test]
    fn admin_role_is_exempt() {
        let req = connected(Request::post("/items").header("x-user-role", "admin"));
        let caller = extractor(true).extract(&req);

        assert!(caller.is_exempt);
        assert_eq!(caller.role.as_deref(), Some("admin"));
    }

    #[test]
    fn client_supplied_headers_are_ignored_by_default() {
        let req = connected(
            Request::get("/items")
                .header("x-forwarded-for", "203.0.113.7")
                .header("x-real-ip", "198.51.100.2")
                .header("x-user-id", "mallory")
                .header("x-user-role", "admin")
                .header("x-user-tier", "enterprise"),
        );

        let caller = default_extractor().extract(&req);

        assert_eq!(caller.identity, "192.168.1.10");
        assert_eq!(caller.network_identity, "192.168.1.10");
        assert_eq!(caller.tier, None);
        assert_eq!(caller.role, None);
        assert!(!caller.is_exempt);
    }
}
