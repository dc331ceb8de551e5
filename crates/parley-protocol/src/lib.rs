pub mod frames;
pub mod methods;

pub use frames::{ErrorShape, ReqFrame, ResFrame};
