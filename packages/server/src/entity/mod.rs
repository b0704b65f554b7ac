pub mod download_record;
pub mod file_asset;
pub mod operation_log;
pub mod user;
