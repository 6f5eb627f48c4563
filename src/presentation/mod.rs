//! HTML views served by the upload service.

pub mod views;
