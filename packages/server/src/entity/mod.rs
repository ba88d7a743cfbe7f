pub mod delivery;
pub mod item;
pub mod order;
pub mod payment;
