pub mod chat;
pub mod error;
pub mod notify;
pub mod storage;
