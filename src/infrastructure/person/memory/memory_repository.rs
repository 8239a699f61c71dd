use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::person::{Person, PersonRepository, PersonRepositoryError, PersonSession};

#[derive(Debug, Default)]
struct People {
    order: Vec<Uuid>,
    by_id: HashMap<Uuid, Person>,
}

enum PendingChange {
    Insert(Person),
    Replace(Uuid, Person),
    Remove(Uuid),
}

impl PendingChange {
    fn uid(&self) -> Uuid {
        match self {
            // Inserted people always carry an id by the time they are queued.
            PendingChange::Insert(person) => person.uid().copied().unwrap_or_default(),
            PendingChange::Replace(uid, _) | PendingChange::Remove(uid) => *uid,
        }
    }
}

impl People {
    /// Checks every change against the store without touching it, so a rejected
    /// commit leaves it as it was.
    fn check(&self, changes: &[PendingChange]) -> Result<(), PersonRepositoryError> {
        let mut exists: HashMap<Uuid, bool> = HashMap::new();
        for change in changes {
            let uid = change.uid();
            let present = *exists
                .entry(uid)
                .or_insert_with(|| self.by_id.contains_key(&uid));
            match change {
                PendingChange::Insert(_) if present => {
                    return Err(PersonRepositoryError::PersonAlreadyExists)
                }
                PendingChange::Replace(..) | PendingChange::Remove(_) if !present => {
                    return Err(PersonRepositoryError::PersonNotFound)
                }
                _ => {}
            }
            exists.insert(uid, !matches!(change, PendingChange::Remove(_)));
        }
        Ok(())
    }

    fn apply(&mut self, change: PendingChange) {
        match change {
            PendingChange::Insert(person) => {
                let uid = person.uid().copied().unwrap_or_default();
                self.order.push(uid);
                self.by_id.insert(uid, person);
            }
            PendingChange::Replace(uid, person) => {
                self.by_id.insert(uid, person);
            }
            PendingChange::Remove(uid) => {
                self.by_id.remove(&uid);
                self.order.retain(|p| *p != uid);
            }
        }
    }
}

/// People kept in process memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersonRepository {
    people: Arc<Mutex<People>>,
}

impl InMemoryPersonRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersonRepository for InMemoryPersonRepository {
    async fn begin(&self) -> Result<Box<dyn PersonSession>, PersonRepositoryError> {
        Ok(Box::new(InMemoryPersonSession {
            people: Arc::clone(&self.people),
            pending: Vec::new(),
            touched: HashMap::new(),
            inserted: Vec::new(),
            inserted_ids: HashSet::new(),
        }))
    }
}

pub struct InMemoryPersonSession {
    people: Arc<Mutex<People>>,
    pending: Vec<PendingChange>,
    // What this session sees for every id it changed; `None` once removed.
    touched: HashMap<Uuid, Option<Person>>,
    // Ids inserted by this session, in insertion order.
    inserted: Vec<Uuid>,
    inserted_ids: HashSet<Uuid>,
}

#[async_trait::async_trait]
impl PersonSession for InMemoryPersonSession {
    async fn find_all(&mut self) -> Result<Vec<Person>, PersonRepositoryError> {
        let people = self.people.lock().await;
        let committed = people
            .order
            .iter()
            .filter(|uid| !self.inserted_ids.contains(*uid))
            .filter_map(|uid| match self.touched.get(uid) {
                Some(seen) => seen.clone(),
                None => people.by_id.get(uid).cloned(),
            });
        let added = self
            .inserted
            .iter()
            .filter_map(|uid| self.touched.get(uid).cloned().flatten());
        Ok(committed.chain(added).collect())
    }

    async fn find_by_id(&mut self, uid: &Uuid) -> Result<Option<Person>, PersonRepositoryError> {
        if let Some(seen) = self.touched.get(uid) {
            return Ok(seen.clone());
        }
        Ok(self.people.lock().await.by_id.get(uid).cloned())
    }

    async fn insert(&mut self, person: Person) -> Result<Person, PersonRepositoryError> {
        let uid = person.uid().copied().unwrap_or_else(Uuid::new_v4);
        let person = person.with_uid(uid);
        if self.find_by_id(&uid).await?.is_some() {
            return Err(PersonRepositoryError::PersonAlreadyExists);
        }
        if self.inserted_ids.insert(uid) {
            self.inserted.push(uid);
        }
        self.touched.insert(uid, Some(person.clone()));
        self.pending.push(PendingChange::Insert(person.clone()));
        Ok(person)
    }

    async fn replace(
        &mut self,
        uid: &Uuid,
        person: Person,
    ) -> Result<Person, PersonRepositoryError> {
        if self.find_by_id(uid).await?.is_none() {
            return Err(PersonRepositoryError::PersonNotFound);
        }
        let person = person.with_uid(*uid);
        self.touched.insert(*uid, Some(person.clone()));
        self.pending
            .push(PendingChange::Replace(*uid, person.clone()));
        Ok(person)
    }

    async fn remove(&mut self, uid: &Uuid) -> Result<bool, PersonRepositoryError> {
        if self.find_by_id(uid).await?.is_none() {
            return Ok(false);
        }
        self.touched.insert(*uid, None);
        self.pending.push(PendingChange::Remove(*uid));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), PersonRepositoryError> {
        let InMemoryPersonSession {
            people, pending, ..
        } = *self;
        let mut people = people.lock().await;
        people.check(&pending)?;
        for change in pending {
            people.apply(change);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::person::{Person, PersonRepository, PersonRepositoryError};
    use uuid::Uuid;

    use super::InMemoryPersonRepository;

    #[tokio::test]
    async fn test_uncommitted_session_is_discarded() {
        let repository = InMemoryPersonRepository::new();
        let mut session = repository.begin().await.unwrap();
        let inserted = session
            .insert(Person::new(None, Some("Alice"), None, None))
            .await
            .unwrap();
        assert!(inserted.uid().is_some());
        assert_eq!(session.find_all().await.unwrap().len(), 1);
        drop(session);

        let mut session = repository.begin().await.unwrap();
        assert!(session.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_keeps_insertion_order() {
        let repository = InMemoryPersonRepository::new();
        let mut session = repository.begin().await.unwrap();
        for name in ["a", "b", "c"] {
            session
                .insert(Person::new(None, Some(name), None, None))
                .await
                .unwrap();
        }
        session.commit().await.unwrap();

        let mut session = repository.begin().await.unwrap();
        let names: Vec<_> = session
            .find_all()
            .await
            .unwrap()
            .iter()
            .map(|p| p.name().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let repository = InMemoryPersonRepository::new();
        let uid = Uuid::new_v4();
        let mut session = repository.begin().await.unwrap();
        session
            .insert(Person::new(Some(uid), Some("first"), None, None))
            .await
            .unwrap();
        let duplicate = session
            .insert(Person::new(Some(uid), Some("second"), None, None))
            .await;
        assert_eq!(duplicate, Err(PersonRepositoryError::PersonAlreadyExists));
    }

    #[tokio::test]
    async fn test_commit_fails_when_another_session_took_the_id() {
        let repository = InMemoryPersonRepository::new();
        let uid = Uuid::new_v4();
        let mut first = repository.begin().await.unwrap();
        let mut second = repository.begin().await.unwrap();
        first
            .insert(Person::new(Some(uid), Some("first"), None, None))
            .await
            .unwrap();
        second
            .insert(Person::new(Some(uid), Some("second"), None, None))
            .await
            .unwrap();
        first.commit().await.unwrap();
        assert_eq!(
            second.commit().await,
            Err(PersonRepositoryError::PersonAlreadyExists)
        );

        let mut session = repository.begin().await.unwrap();
        let stored = session.find_by_id(&uid).await.unwrap().unwrap();
        assert_eq!(stored.name(), Some("first"));
    }

    #[tokio::test]
    async fn test_remove_reports_missing_person() {
        let repository = InMemoryPersonRepository::new();
        let mut session = repository.begin().await.unwrap();
        assert_eq!(session.remove(&Uuid::new_v4()).await, Ok(false));
    }

    #[tokio::test]
    async fn test_large_batch_is_inserted_in_order() {
        let repository = InMemoryPersonRepository::new();
        let mut session = repository.begin().await.unwrap();
        let mut inserted = Vec::new();
        for i in 0..20_000 {
            let name = i.to_string();
            let person = session
                .insert(Person::new(None, Some(&name), None, None))
                .await
                .unwrap();
            inserted.push(person);
        }
        session.commit().await.unwrap();

        let mut session = repository.begin().await.unwrap();
        assert_eq!(session.find_all().await.unwrap(), inserted);
    }

    #[tokio::test]
    async fn test_session_sees_its_own_changes() {
        let repository = InMemoryPersonRepository::new();
        let mut session = repository.begin().await.unwrap();
        let a = session
            .insert(Person::new(None, Some("a"), None, None))
            .await
            .unwrap();
        let b = session
            .insert(Person::new(None, Some("b"), None, None))
            .await
            .unwrap();
        session.commit().await.unwrap();

        let a_uid = *a.uid().unwrap();
        let b_uid = *b.uid().unwrap();
        let mut session = repository.begin().await.unwrap();
        let renamed = session
            .replace(&a_uid, Person::new(None, Some("a2"), None, None))
            .await
            .unwrap();
        assert_eq!(session.remove(&b_uid).await, Ok(true));
        let c = session
            .insert(Person::new(None, Some("c"), None, None))
            .await
            .unwrap();
        let expected = vec![renamed, c];
        assert_eq!(session.find_all().await.unwrap(), expected);
        assert_eq!(session.find_by_id(&b_uid).await, Ok(None));
        session.commit().await.unwrap();

        let mut session = repository.begin().await.unwrap();
        assert_eq!(session.find_all().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_replace_of_concurrently_removed_person_fails_at_commit() {
        let repository = InMemoryPersonRepository::new();
        let mut session = repository.begin().await.unwrap();
        let kept = session
            .insert(Person::new(None, Some("kept"), None, None))
            .await
            .unwrap();
        let gone = session
            .insert(Person::new(None, Some("gone"), None, None))
            .await
            .unwrap();
        session.commit().await.unwrap();
        let gone_uid = *gone.uid().unwrap();

        let mut updating = repository.begin().await.unwrap();
        updating
            .insert(Person::new(None, Some("new"), None, None))
            .await
            .unwrap();
        updating
            .replace(&gone_uid, Person::new(None, Some("renamed"), None, None))
            .await
            .unwrap();
        let mut deleting = repository.begin().await.unwrap();
        assert_eq!(deleting.remove(&gone_uid).await, Ok(true));
        deleting.commit().await.unwrap();

        assert_eq!(
            updating.commit().await,
            Err(PersonRepositoryError::PersonNotFound)
        );
        let mut session = repository.begin().await.unwrap();
        assert_eq!(session.find_all().await.unwrap(), vec![kept]);
    }
}
