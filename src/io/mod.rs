pub mod cache;
pub mod chunk;
pub mod platform;
pub mod ring;
