//! Input validation and password helpers.

pub mod input_validation;
pub mod password_utils;
pub mod validation_constants;
