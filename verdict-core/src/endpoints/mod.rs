pub mod aggregate;
pub mod experiment;
pub mod status;
