//! LLM provider implementations for Deckhand.
//!
//! All providers implement the `deckhand_core::Provider` trait.
//! [`build_from_config`] picks the one the configuration describes.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
