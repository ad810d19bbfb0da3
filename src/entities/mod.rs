pub mod address;
pub mod order;
pub mod order_item;
pub mod shipment;

pub use order::{LifecycleStage, OrderStatus};
