pub mod health;
pub mod returns;
pub mod shipments;
