mod retention;

pub use retention::RetentionManager;
