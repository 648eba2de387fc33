//! Middleware chain pieces, outer to inner: request id, trace, CORS, rate
//! limiting.

pub mod cors;
pub mod rate_limit;
pub mod request_id;
