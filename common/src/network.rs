pub mod hostname;
pub mod interface;
pub mod mac;
pub mod range;
pub mod target;
