pub mod v1alpha2;
