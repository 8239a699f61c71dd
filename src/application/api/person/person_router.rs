use std::str::FromStr;

use chrono::NaiveDate;
use hyper::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{value, Value};
use uuid::Uuid;

use crate::{
    application::api::error::ApiError,
    domain::person::{Person, PersonManager},
};

pub const PEOPLE_LOCATION: &str = "/api/people";
pub const PEOPLE_LIST_LOCATION: &str = "/api/people/List";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonInput {
    person_id: Option<Uuid>,
    name: Option<String>,
    first_name: Option<String>,
    birth_date: Option<NaiveDate>,
}

impl From<PersonInput> for Person {
    fn from(value: PersonInput) -> Self {
        Person::new(
            value.person_id,
            value.name.as_deref(),
            value.first_name.as_deref(),
            value.birth_date,
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonOutput {
    person_id: Option<Uuid>,
    name: Option<String>,
    first_name: Option<String>,
    birth_date: Option<NaiveDate>,
}

impl From<Person> for PersonOutput {
    fn from(value: Person) -> Self {
        return Self {
            person_id: value.uid().copied(),
            name: value.name().map(str::to_string),
            first_name: value.first_name().map(str::to_string),
            birth_date: value.birth_date().copied(),
        };
    }
}

/// Successful outcome of a person route, before it becomes an HTTP response.
#[derive(Debug, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
    pub location: Option<&'static str>,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
            location: None,
        }
    }

    fn created(body: Value, location: &'static str) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: Some(body),
            location: Some(location),
        }
    }

    fn empty() -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
            location: None,
        }
    }
}

/// A body that is missing, not JSON, or not shaped like `T` counts as no payload.
fn payload<T: DeserializeOwned>(body: Value) -> Option<T> {
    if body.is_null() {
        return None;
    }
    serde_json::from_value(body).ok()
}

fn to_json<T: Serialize>(output: T) -> Result<Value, ApiError> {
    value::to_value(output).map_err(|e| {
        ApiError::Internal(format!(
            "An internal error occured while converting persons to value: {:?}",
            e
        ))
    })
}

fn parse_uid(path: &str) -> Result<Uuid, ApiError> {
    if path.contains('/') {
        return Err(ApiError::NotFound(format!("no route for {}", path)));
    }
    Uuid::from_str(path)
        .map_err(|_| ApiError::BadRequest(format!("{} is not a valid person id", path)))
}

/// Routes a request under `api/people`. `path` is what follows that prefix.
pub async fn router(
    path: &str,
    method: &Method,
    body: Value,
    person_manager: &PersonManager,
    strict_not_found: bool,
) -> Result<ApiResponse, ApiError> {
    let path = path.trim_matches('/');
    match (method, path) {
        (&Method::GET, "") => {
            let people: Vec<PersonOutput> = person_manager
                .list_people()
                .await?
                .into_iter()
                .map(PersonOutput::from)
                .collect();
            Ok(ApiResponse::ok(to_json(people)?))
        }
        (&Method::POST, "") => {
            let person = payload::<PersonInput>(body).map(Person::from);
            let created = person_manager.create_person(person).await?;
            Ok(ApiResponse::created(
                to_json(PersonOutput::from(created))?,
                PEOPLE_LOCATION,
            ))
        }
        (&Method::POST, p) if p.eq_ignore_ascii_case("list") => {
            let people: Option<Vec<Person>> = payload::<Vec<PersonInput>>(body)
                .map(|people| people.into_iter().map(Person::from).collect());
            let created: Vec<PersonOutput> = person_manager
                .create_people(people)
                .await?
                .into_iter()
                .map(PersonOutput::from)
                .collect();
            Ok(ApiResponse::created(to_json(created)?, PEOPLE_LIST_LOCATION))
        }
        (&Method::GET, _) => {
            let uid = parse_uid(path)?;
            match person_manager.get_person(&uid).await? {
                Some(person) => Ok(ApiResponse::ok(to_json(PersonOutput::from(person))?)),
                None if strict_not_found => {
                    Err(ApiError::NotFound(format!("no person with id {}", uid)))
                }
                None => Ok(ApiResponse::ok(Value::Null)),
            }
        }
        (&Method::PUT, p) if !p.is_empty() => {
            let uid = parse_uid(path)?;
            let person = payload::<PersonInput>(body).map(Person::from);
            let updated = person_manager.update_person(&uid, person).await?;
            Ok(ApiResponse::created(
                to_json(PersonOutput::from(updated))?,
                PEOPLE_LOCATION,
            ))
        }
        (&Method::DELETE, p) if !p.is_empty() => {
            let uid = parse_uid(path)?;
            person_manager.delete_person(&uid).await?;
            Ok(ApiResponse::empty())
        }
        (_, _) => Err(ApiError::NotFound(format!(
            "no route for {} {}",
            method, path
        ))),
    }
}
