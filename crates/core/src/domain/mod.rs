pub mod asset;
pub mod period;
pub mod ranking;
