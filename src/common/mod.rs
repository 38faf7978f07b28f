//! Types shared by the provider and its collaborators

pub mod test_utils;
pub mod validation;

pub use test_utils::unused_local_port;
pub use validation::ValidationResult;
