//! Interceptors and tower layers wrapped around every inbound call.
//!
//! Order, outermost first: [`MetricsLayer`], [`TraceLayer`], the caller's
//! [`InterceptorChain`], then the service.

mod chain;
mod metrics;
mod request_id;
mod trace;

pub use chain::{InterceptorChain, UnaryInterceptor};
pub use metrics::{MetricsLayer, MetricsService};
pub use request_id::{request_id_interceptor, REQUEST_ID_HEADER};
pub use trace::{TraceLayer, TraceService};
