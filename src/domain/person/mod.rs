mod manager;
mod person;
pub(crate) mod repository;

pub use manager::{PersonError, PersonManager};
pub use person::Person;
pub use repository::{PersonRepository, PersonRepositoryError, PersonSession};
