//! Embedded schemas and templates

pub mod template;
pub mod validator;

pub use template::{csv_template, render_notification, TemplateError, TemplateRenderer};
pub use validator::{SeedValidator, ValidationError};
