use chrono::NaiveDate;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Person {
    uid: Option<Uuid>,
    name: Option<String>,
    first_name: Option<String>,
    birth_date: Option<NaiveDate>,
}

impl Person {
    pub fn new(
        uid: Option<Uuid>,
        name: Option<&str>,
        first_name: Option<&str>,
        birth_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            uid,
            name: name.map(str::to_string),
            first_name: first_name.map(str::to_string),
            birth_date,
        }
    }

    /// Returns the same person carrying `uid`, whatever id it had before.
    pub fn with_uid(mut self, uid: Uuid) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn uid(&self) -> Option<&Uuid> {
        self.uid.as_ref()
    }
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }
    pub fn birth_date(&self) -> Option<&NaiveDate> {
        self.birth_date.as_ref()
    }
}
