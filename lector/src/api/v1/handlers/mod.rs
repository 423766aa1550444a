pub(crate) mod health;
pub mod ocr;
pub mod stats;

pub use health::health_check;
