pub mod session_store_gateway;

pub use session_store_gateway::{MessagePayload, RoutingTarget, SessionStoreGateway};
