//! Cooperative cancellation at stage boundaries.

mod token;

pub use token::CancellationToken;
