//! Order entity and related types.

mod entity;
mod status;
mod value_objects;

pub use entity::{Order, OrderParts};
pub use status::OrderStatus;
pub use value_objects::{Money, ProductId, UserId};
