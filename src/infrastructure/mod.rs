pub mod events;
pub mod query;
