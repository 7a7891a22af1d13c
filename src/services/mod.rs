pub mod ai;
pub mod conversation;
pub mod datetime;
pub mod dispatch;
pub mod identity;
pub mod operations;
pub mod provider;
