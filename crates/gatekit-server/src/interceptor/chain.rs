//! Caller-supplied interceptors folded into one.

use std::fmt;
use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{Request, Status};

/// A caller interceptor: inspect or rewrite request metadata, or reject the
/// call with a status.
pub type UnaryInterceptor = Arc<dyn Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync>;

/// Runs interceptors in registration order; the first rejection ends the
/// call before the service sees it.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Arc<[UnaryInterceptor]>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<UnaryInterceptor>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl Interceptor for InterceptorChain {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.interceptors
            .iter()
            .try_fold(request, |request, interceptor| interceptor(request))
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}
