//! Gemini API integration.
//!
//! Thin REST client for the three generative endpoints the story pipeline
//! uses (structured text, Veo video operations, speech) plus the shared
//! rate-limit retry wrapper.

mod client;
pub mod retry;
pub mod types;

pub use client::{
    GeminiClient, GeminiError, FALLBACK_API_KEY_ENV, GEMINI_API_BASE_URL, GEMINI_API_KEY_ENV,
};
pub use retry::{call_with_retry, RateLimitSignature, RetryPolicy};
