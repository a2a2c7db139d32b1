pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Exchange, Health, Identity, Init, Messages, Serve, Version};
