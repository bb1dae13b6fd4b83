use crate::middleware::authentication::*;
use crate::models::Identity;
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse},
    Error, HttpMessage,
};
use futures::{
    future::{FutureExt, LocalBoxFuture},
    task::{Context, Poll},
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub struct ManagerMiddleware<S> {
    pub service: Rc<RefCell<S>>,
    pub authenticator: Arc<dyn Authenticator>,
}

async fn try_authenticate(
    authenticator: &dyn Authenticator,
    req: &ServiceRequest,
) -> Result<Identity, AuthError> {
    let credential = authenticator.credential(req)?.ok_or(AuthError::Missing)?;
    authenticator.authenticate(&credential).await
}

impl<S, B> Service<ServiceRequest> for ManagerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = S::Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if let Ok(service) = self.service.try_borrow_mut() {
            service.poll_ready(ctx)
        } else {
            Poll::Pending
        }
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let authenticator = self.authenticator.clone();
        async move {
            let identity = try_authenticate(authenticator.as_ref(), &req).await?;
            tracing::debug!(user_id = identity.user_id, "Request authenticated");
            req.extensions_mut().insert(Arc::new(identity));
            Ok(req)
        }
        .then(|req: Result<ServiceRequest, AuthError>| async move {
            match req {
                Ok(req) => {
                    let fut = service.borrow_mut().call(req);
                    fut.await
                }
                Err(err) => {
                    tracing::info!("Authentication failed: {}", err);
                    Err(err.into())
                }
            }
        })
        .boxed_local()
    }
}
