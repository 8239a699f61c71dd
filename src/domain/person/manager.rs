use super::{
    person::Person,
    repository::{PersonRepository, PersonRepositoryError},
};
use uuid::Uuid;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum PersonError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("no person with id {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] PersonRepositoryError),
}

fn missing_as_not_found(error: PersonRepositoryError, uid: &Uuid) -> PersonError {
    match error {
        PersonRepositoryError::PersonNotFound => PersonError::NotFound(*uid),
        e => e.into(),
    }
}

/// Stateless entry point for every operation on people.
///
/// Each call opens its own storage session and either commits it or lets it drop.
#[derive(Clone)]
pub struct PersonManager {
    repository: Box<dyn PersonRepository>,
}

impl PersonManager {
    pub fn new(repository: Box<dyn PersonRepository>) -> Self {
        return PersonManager { repository };
    }

    pub async fn list_people(&self) -> Result<Vec<Person>, PersonError> {
        let mut session = self.repository.begin().await?;
        Ok(session.find_all().await?)
    }

    pub async fn get_person(&self, uid: &Uuid) -> Result<Option<Person>, PersonError> {
        let mut session = self.repository.begin().await?;
        Ok(session.find_by_id(uid).await?)
    }

    pub async fn create_person(&self, person: Option<Person>) -> Result<Person, PersonError> {
        let person = person.ok_or(PersonError::BadRequest("no person supplied"))?;
        let mut session = self.repository.begin().await?;
        let created = session.insert(person).await?;
        session.commit().await?;
        Ok(created)
    }

    /// Inserts every person in order and persists them together.
    pub async fn create_people(
        &self,
        people: Option<Vec<Person>>,
    ) -> Result<Vec<Person>, PersonError> {
        let people = people.ok_or(PersonError::BadRequest("no people supplied"))?;
        let mut session = self.repository.begin().await?;
        let mut created = Vec::with_capacity(people.len());
        for person in people {
            created.push(session.insert(person).await?);
        }
        session.commit().await?;
        Ok(created)
    }

    /// Replaces the stored person `uid` with `person`. The path id always wins
    /// over whatever id the payload carries.
    pub async fn update_person(
        &self,
        uid: &Uuid,
        person: Option<Person>,
    ) -> Result<Person, PersonError> {
        let person = person.ok_or(PersonError::BadRequest("no person supplied"))?;
        let mut session = self.repository.begin().await?;
        if session.find_by_id(uid).await?.is_none() {
            return Err(PersonError::NotFound(*uid));
        }
        let updated = session
            .replace(uid, person.with_uid(*uid))
            .await
            .map_err(|e| missing_as_not_found(e, uid))?;
        // The person may have been deleted by another session since the lookup.
        session
            .commit()
            .await
            .map_err(|e| missing_as_not_found(e, uid))?;
        Ok(updated)
    }

    pub async fn delete_person(&self, uid: &Uuid) -> Result<(), PersonError> {
        let mut session = self.repository.begin().await?;
        if session.find_by_id(uid).await?.is_none() {
            return Err(PersonError::NotFound(*uid));
        }
        if !session.remove(uid).await? {
            return Err(PersonError::NotFound(*uid));
        }
        session
            .commit()
            .await
            .map_err(|e| missing_as_not_found(e, uid))?;
        Ok(())
    }
}
