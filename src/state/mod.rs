//! State module for tracking crawl request progress
//!
//! # Components
//!
//! - `RequestKind`: which kind of listing a request walks (history or collection)
//! - `RequestStatus`: lifecycle of a crawl request, from pending to archived

mod request_state;

pub use request_state::{RequestKind, RequestStatus};
