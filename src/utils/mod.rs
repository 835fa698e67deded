//! Shared utility functions for qna-bench.
//!
//! Decoding helpers for the loosely-formatted payloads agents emit: placeholder
//! sanitization, a permissive literal decoder, and the ordered decoder chain
//! built on top of them.

pub mod decode;
pub mod literal;
pub mod sanitize;

pub use decode::{decode_text, decode_tool_output, find_matching_brace, preview, DecodeStrategy};
pub use literal::parse_literal;
pub use sanitize::sanitize_unquoted_tokens;
