//! Gemini `generateContent` as a structured reasoning call.

pub mod client;
mod structured;
pub mod types;
