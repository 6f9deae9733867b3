//! Admission middleware for HTTP requests.

mod caller;
mod response;

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::Body;
use http::{Request, Response};
use rate_limit::{AdmissionManager, AdmissionOutcome};
use tower::Layer;

pub(crate) use caller::CallerExtractor;

#[derive(Clone)]
pub(crate) struct AdmissionLayer {
    manager: Arc<AdmissionManager>,
    extractor: Arc<CallerExtractor>,
}

impl AdmissionLayer {
    pub fn new(manager: Arc<AdmissionManager>, extractor: CallerExtractor) -> Self {
        Self {
            manager,
            extractor: Arc::new(extractor),
        }
    }
}

impl<Service> Layer<Service> for AdmissionLayer
where
    Service: Send + Clone,
{
    type Service = AdmissionService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AdmissionService {
            next,
            manager: self.manager.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AdmissionService<Service> {
    next: Service,
    manager: Arc<AdmissionManager>,
    extractor: Arc<CallerExtractor>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AdmissionService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let manager = self.manager.clone();
        let caller = self.extractor.extract(&req);

        Box::pin(async move {
            match manager.check(&caller).await {
                AdmissionOutcome::Exempt | AdmissionOutcome::Unmetered => next.call(req).await,
                AdmissionOutcome::Admitted(quota) => {
                    let mut response = next.call(req).await?;
                    response::insert_quota_headers(response.headers_mut(), &quota);

                    Ok(response)
                }
                AdmissionOutcome::Rejected(rejection) => {
                    log::debug!(
                        "Request to {} rejected for caller '{}' on tier '{}'",
                        req.uri().path(),
                        caller.identity,
                        rejection.quota.tier
                    );

                    Ok(response::rejected(&rejection))
                }
            }
        })
    }
}
