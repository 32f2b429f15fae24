pub mod adapter;
pub mod sink;
