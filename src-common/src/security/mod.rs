//! Validation of user-supplied paths, names and coordinates.

pub mod path_validation;
pub mod validation;
