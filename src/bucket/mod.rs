//! Token bucket primitive and its refill rate.

mod refill_rate;
mod token;

pub use refill_rate::RefillRate;
pub use token::TokenBucket;
