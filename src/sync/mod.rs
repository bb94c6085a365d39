pub mod chat;
pub mod messages;
pub mod pending;
pub mod refetch;
pub mod review;
