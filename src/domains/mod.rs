pub mod resolver;
pub mod selection;
pub mod sessions;
