pub mod deployment;
pub mod store;
