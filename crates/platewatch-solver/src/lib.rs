//! PlateWatch solver - CAPTCHA recognition behind a rate limiter.
//!
//! The crawler only sees the [`CaptchaSolver`] trait. [`GeminiVisionSolver`]
//! is the production adapter; every call to it should be preceded by
//! [`RateLimiter::acquire`] so the service quota is never exceeded.
//!
//! # Example
//!
//! ```rust
//! use platewatch_solver::normalize_answer;
//!
//! assert_eq!(normalize_answer(" k7p2 ", 4), Some("K7P2".to_string()));
//! assert_eq!(normalize_answer("K7P", 4), None);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod gemini;
pub mod rate_limiter;
pub mod solver;

pub use error::{Result, SolverError};
pub use gemini::GeminiVisionSolver;
pub use rate_limiter::RateLimiter;
pub use solver::{normalize_answer, CaptchaSolver};
