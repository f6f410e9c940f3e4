//! Feed acquisition and decoding: transport boundary plus the CSV parser.

pub mod fetch;
pub mod parse;
