pub mod affinity;
pub mod compare;
pub mod metadata;
pub mod policy;
pub mod secrets;
