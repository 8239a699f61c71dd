pub mod error;
pub mod person;
pub mod router;
