//! Access control for staff routes.
//!
//! Staff routes (the `/api` scope and gateway administration) require an `X-Staff-Key` header that matches the
//! configured staff key. The key is read from the [`StaffAccess`] app data, so the middleware can be placed on any
//! route or scope. If no staff key is configured, every staff request is refused.
use std::rc::Rc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
};
use bloom_common::Secret;
use futures::future::{ok, LocalBoxFuture, Ready};
use log::*;

use crate::errors::ServerError;

pub const STAFF_KEY_HEADER: &str = "X-Staff-Key";

#[derive(Clone, Debug, Default)]
pub struct StaffAccess {
    key: Secret<String>,
}

impl StaffAccess {
    pub fn new(key: Secret<String>) -> Self {
        Self { key }
    }

    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }

    pub fn check(&self, candidate: Option<&str>) -> Result<(), ServerError> {
        if !self.is_enabled() {
            return Err(ServerError::InsufficientPermissions("Staff access is disabled on this server".into()));
        }
        let candidate = candidate.ok_or_else(|| ServerError::Unauthenticated(format!("No {STAFF_KEY_HEADER} header")))?;
        if self.key.matches(candidate) {
            Ok(())
        } else {
            Err(ServerError::InsufficientPermissions("Invalid staff key".into()))
        }
    }
}

pub struct StaffKeyMiddlewareFactory;

impl StaffKeyMiddlewareFactory {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        StaffKeyMiddlewareFactory
    }
}

impl<S, B> Transform<S, ServiceRequest> for StaffKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = StaffKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(StaffKeyMiddlewareService { service: Rc::new(service) })
    }
}

pub struct StaffKeyMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for StaffKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let access = req.app_data::<web::Data<StaffAccess>>().map(|a| a.get_ref().clone()).unwrap_or_default();
            let candidate = req.headers().get(STAFF_KEY_HEADER).and_then(|v| v.to_str().ok());
            if let Err(e) = access.check(candidate) {
                warn!("🔐️ Refused staff request to {}. {e}", req.path());
                return Err(e.into());
            }
            trace!("🔐️ Staff key accepted for {}", req.path());
            service.call(req).await
        })
    }
}
