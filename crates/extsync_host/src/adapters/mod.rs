pub mod invoke;
pub mod kv_store;
pub mod labeled_fs;
