use super::person::Person;
use uuid::Uuid;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum PersonRepositoryError {
    #[error("person not found")]
    PersonNotFound,
    #[error("a person with this id already exists")]
    PersonAlreadyExists,
    #[error("storage failure: {0}")]
    InternalError(String),
}

/// Hands out storage sessions. One session is opened per service operation.
#[async_trait::async_trait]
pub trait PersonRepository: PersonClone + Send + Sync {
    async fn begin(&self) -> Result<Box<dyn PersonSession>, PersonRepositoryError>;
}

/// A unit of work over the stored people.
///
/// Changes made through a session are only persisted by [`PersonSession::commit`];
/// dropping the session discards them and releases whatever it holds.
#[async_trait::async_trait]
pub trait PersonSession: Send {
    async fn find_all(&mut self) -> Result<Vec<Person>, PersonRepositoryError>;
    async fn find_by_id(&mut self, uid: &Uuid) -> Result<Option<Person>, PersonRepositoryError>;
    /// Stores `person`, assigning a fresh id when it has none.
    async fn insert(&mut self, person: Person) -> Result<Person, PersonRepositoryError>;
    async fn replace(&mut self, uid: &Uuid, person: Person)
        -> Result<Person, PersonRepositoryError>;
    async fn remove(&mut self, uid: &Uuid) -> Result<bool, PersonRepositoryError>;
    async fn commit(self: Box<Self>) -> Result<(), PersonRepositoryError>;
}

pub trait PersonClone {
    fn clone_box(&self) -> Box<dyn PersonRepository>;
}

impl<T> PersonClone for T
where
    T: 'static + PersonRepository + Clone,
{
    fn clone_box(&self) -> Box<dyn PersonRepository> {
        Box::new(self.clone())
    }
}

// We can now implement Clone manually by forwarding to clone_box.
impl Clone for Box<dyn PersonRepository> {
    fn clone(&self) -> Box<dyn PersonRepository> {
        self.clone_box()
    }
}
