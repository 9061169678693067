//! GatewayModel: evaluates requests against the declared entry point.
//!
//! Checks run in the order the managed gateway applies them: route, API key,
//! usage plan throttle, then the integration call. A request rejected by any
//! check never reaches the intake backend.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, FakeRelativeClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use reviewstack_core::layers::RouteSpec;

use crate::error::{ComposeError, ComposeResult};
use crate::topology::GatewaySummary;

type PlanLimiter = RateLimiter<
    NotKeyed,
    InMemoryState,
    FakeRelativeClock,
    NoOpMiddleware<<FakeRelativeClock as Clock>::Instant>,
>;

/// An HTTP request as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub method: String,
    pub path: String,
    /// Value of the `x-api-key` header.
    pub api_key: Option<String>,
    pub body: String,
}

impl GatewayRequest {
    pub fn post(path: &str, api_key: Option<&str>, body: &str) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.to_string(),
            api_key: api_key.map(str::to_string),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub status: u16,
    pub body: String,
    /// How long the backend took to answer.
    pub latency: Duration,
}

/// The intake handler behind the gateway integration.
pub trait IntakeBackend {
    fn handle(&mut self, body: &str) -> BackendResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GatewayResponse {
    Forwarded { status: u16, body: String },
    NotFound,
    Forbidden,
    Throttled,
    GatewayTimeout,
}

impl GatewayResponse {
    pub fn status(&self) -> u16 {
        match self {
            GatewayResponse::Forwarded { status, .. } => *status,
            GatewayResponse::NotFound => 404,
            GatewayResponse::Forbidden => 403,
            GatewayResponse::Throttled => 429,
            GatewayResponse::GatewayTimeout => 504,
        }
    }
}

pub struct GatewayModel<B> {
    route: RouteSpec,
    api_key_value: String,
    integration_timeout: Duration,
    clock: FakeRelativeClock,
    limiter: PlanLimiter,
    backend: B,
}

impl<B: IntakeBackend> GatewayModel<B> {
    /// `api_key_value` is the secret the key resolves to once deployed.
    pub fn new(
        summary: &GatewaySummary,
        api_key_value: impl Into<String>,
        backend: B,
    ) -> ComposeResult<Self> {
        let rate = NonZeroU32::new(summary.throttle.rate_limit)
            .ok_or_else(|| ComposeError::Gateway("throttle rate must be positive".to_string()))?;
        let burst = NonZeroU32::new(summary.throttle.burst_limit)
            .ok_or_else(|| ComposeError::Gateway("throttle burst must be positive".to_string()))?;
        let quota = Quota::per_second(rate).allow_burst(burst);
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::direct_with_clock(quota, &clock);

        Ok(Self {
            route: summary.route.clone(),
            api_key_value: api_key_value.into(),
            integration_timeout: Duration::from_millis(summary.route.integration_timeout_ms),
            clock,
            limiter,
            backend,
        })
    }

    pub fn handle(&mut self, request: &GatewayRequest) -> GatewayResponse {
        if request.path != self.route.path || request.method != self.route.method {
            debug!(method = %request.method, path = %request.path, "no such route");
            return GatewayResponse::NotFound;
        }
        if self.route.api_key_required
            && request.api_key.as_deref() != Some(self.api_key_value.as_str())
        {
            debug!(path = %request.path, "missing or invalid api key");
            return GatewayResponse::Forbidden;
        }
        if self.limiter.check().is_err() {
            warn!(path = %request.path, "usage plan throttle exceeded");
            return GatewayResponse::Throttled;
        }

        let response = self.backend.handle(&request.body);
        if response.latency > self.integration_timeout {
            warn!(
                latency_ms = response.latency.as_millis() as u64,
                timeout_ms = self.integration_timeout.as_millis() as u64,
                "integration timed out"
            );
            return GatewayResponse::GatewayTimeout;
        }
        GatewayResponse::Forwarded {
            status: response.status,
            body: response.body,
        }
    }

    /// Move the throttle clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewstack_core::layers::gateway::{ROUTE_METHOD, ROUTE_PATH};
    use reviewstack_core::layers::Throttle;
    use reviewstack_core::ResourceId;

    #[derive(Default)]
    struct Echo {
        bodies: Vec<String>,
        latency: Duration,
    }

    impl IntakeBackend for Echo {
        fn handle(&mut self, body: &str) -> BackendResponse {
            self.bodies.push(body.to_string());
            BackendResponse {
                status: 200,
                body: body.to_string(),
                latency: self.latency,
            }
        }
    }

    fn summary(throttle: Throttle) -> GatewaySummary {
        GatewaySummary {
            rest_api_id: "abc".to_string(),
            api_key: ResourceId::new("CodeReviewApiKey"),
            api_key_id: "key".to_string(),
            stage_name: "prod".to_string(),
            endpoint: "https://abc".to_string(),
            route: RouteSpec {
                path: ROUTE_PATH.to_string(),
                method: ROUTE_METHOD.to_string(),
                integration: ResourceId::new("RequestHandler"),
                integration_timeout_ms: 29_000,
                api_key_required: true,
            },
            throttle,
        }
    }

    fn model() -> GatewayModel<Echo> {
        GatewayModel::new(&summary(Throttle::default()), "secret", Echo::default()).unwrap()
    }

    #[test]
    fn body_forwarded_unmodified() {
        let mut gateway = model();
        let body = r#"{"commit_id":"abc","nested":{"k":[1,2]}}"#;
        let response = gateway.handle(&GatewayRequest::post("/codereview", Some("secret"), body));
        assert_eq!(
            response,
            GatewayResponse::Forwarded {
                status: 200,
                body: body.to_string()
            }
        );
        assert_eq!(gateway.backend().bodies, vec![body.to_string()]);
    }

    #[test]
    fn missing_key_never_reaches_backend() {
        let mut gateway = model();
        let response = gateway.handle(&GatewayRequest::post("/codereview", None, "{}"));
        assert_eq!(response.status(), 403);
        let response = gateway.handle(&GatewayRequest::post("/codereview", Some("wrong"), "{}"));
        assert_eq!(response, GatewayResponse::Forbidden);
        assert!(gateway.backend().bodies.is_empty());
    }

    #[test]
    fn unknown_route_is_not_found() {
        let mut gateway = model();
        let response = gateway.handle(&GatewayRequest::post("/other", Some("secret"), "{}"));
        assert_eq!(response.status(), 404);
        let mut get = GatewayRequest::post("/codereview", Some("secret"), "{}");
        get.method = "GET".to_string();
        assert_eq!(gateway.handle(&get), GatewayResponse::NotFound);
    }

    #[test]
    fn slow_backend_surfaces_as_timeout() {
        let mut gateway = GatewayModel::new(
            &summary(Throttle::default()),
            "secret",
            Echo {
                latency: Duration::from_secs(31),
                ..Echo::default()
            },
        )
        .unwrap();
        let response = gateway.handle(&GatewayRequest::post("/codereview", Some("secret"), "{}"));
        assert_eq!(response.status(), 504);
    }

    #[test]
    fn burst_refills_over_time() {
        let throttle = Throttle {
            rate_limit: 10,
            burst_limit: 2,
        };
        let mut gateway = GatewayModel::new(&summary(throttle), "secret", Echo::default()).unwrap();
        let request = GatewayRequest::post("/codereview", Some("secret"), "{}");

        assert_eq!(gateway.handle(&request).status(), 200);
        assert_eq!(gateway.handle(&request).status(), 200);
        assert_eq!(gateway.handle(&request).status(), 429);

        gateway.advance(Duration::from_millis(100));
        assert_eq!(gateway.handle(&request).status(), 200);
    }

    #[test]
    fn zero_rate_rejected() {
        let throttle = Throttle {
            rate_limit: 0,
            burst_limit: 1,
        };
        let result = GatewayModel::new(&summary(throttle), "secret", Echo::default());
        assert!(matches!(result, Err(ComposeError::Gateway(_))));
    }
}
