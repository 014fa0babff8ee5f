//! Google People service (contacts)

use serde_json::{json, Value};

use crate::error::Result;
use crate::google::api::{array_field, failed, resource_path, ApiClient};

const LIST_FIELDS: &str = "names,emailAddresses,phoneNumbers";
const DETAIL_FIELDS: &str = "names,emailAddresses,phoneNumbers,addresses,organizations";

/// Contact fields supplied by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFields {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ContactFields {
    /// Person resource for a new contact
    pub fn to_person(&self) -> Value {
        let mut person = json!({
            "names": [{
                "givenName": non_empty(&self.given_name).unwrap_or(""),
                "familyName": non_empty(&self.family_name).unwrap_or(""),
            }]
        });
        if let Some(email) = non_empty(&self.email) {
            person["emailAddresses"] = json!([{ "value": email }]);
        }
        if let Some(phone) = non_empty(&self.phone) {
            person["phoneNumbers"] = json!([{ "value": phone }]);
        }
        person
    }

    /// Merge into an existing person, returning the update mask.
    ///
    /// Only the first name, email and phone entry are edited. An empty mask
    /// means nothing changed.
    pub fn merge_into(&self, person: &mut Value) -> Vec<&'static str> {
        let mut mask = Vec::new();

        let given = non_empty(&self.given_name);
        let family = non_empty(&self.family_name);
        if given.is_some() || family.is_some() {
            let name = first_entry(person, "names");
            if let Some(given) = given {
                name["givenName"] = json!(given);
            }
            if let Some(family) = family {
                name["familyName"] = json!(family);
            }
            mask.push("names");
        }

        if let Some(email) = non_empty(&self.email) {
            first_entry(person, "emailAddresses")["value"] = json!(email);
            mask.push("emailAddresses");
        }

        if let Some(phone) = non_empty(&self.phone) {
            first_entry(person, "phoneNumbers")["value"] = json!(phone);
            mask.push("phoneNumbers");
        }

        mask
    }
}

/// First element of an array field, created when missing
fn first_entry<'a>(person: &'a mut Value, key: &str) -> &'a mut Value {
    if !person.is_object() {
        *person = json!({});
    }
    let is_populated = person
        .get(key)
        .and_then(Value::as_array)
        .map_or(false, |entries| !entries.is_empty());
    if !is_populated {
        person[key] = json!([{}]);
    }
    &mut person[key][0]
}

/// Google People API service
#[derive(Clone)]
pub struct PeopleService {
    api: ApiClient,
    base_url: String,
}

impl PeopleService {
    pub fn new(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Contacts of the authenticated user
    pub async fn list_contacts(&self, page_size: i64) -> Result<Vec<Value>> {
        let params = [
            ("personFields", LIST_FIELDS.to_string()),
            ("pageSize", page_size.to_string()),
        ];

        let response = self
            .api
            .get(&self.url("people/me/connections"), &params)
            .await
            .map_err(|e| failed(e, "unable to list contacts"))?;

        Ok(array_field(&response, "connections"))
    }

    /// Search contacts; results are unwrapped to the person objects
    pub async fn search_contacts(&self, query: &str, page_size: i64) -> Result<Vec<Value>> {
        let params = [
            ("query", query.to_string()),
            ("readMask", LIST_FIELDS.to_string()),
            ("pageSize", page_size.to_string()),
        ];

        let response = self
            .api
            .get(&self.url("people:searchContacts"), &params)
            .await
            .map_err(|e| failed(e, "unable to search contacts"))?;

        Ok(array_field(&response, "results")
            .into_iter()
            .filter_map(|mut result| result.get_mut("person").map(Value::take))
            .filter(|person| !person.is_null())
            .collect())
    }

    /// A person by resource name (e.g. `people/c123`)
    pub async fn get_person(&self, resource_name: &str) -> Result<Value> {
        self.api
            .get(
                &self.url(&resource_path(resource_name)),
                &[("personFields", DETAIL_FIELDS.to_string())],
            )
            .await
            .map_err(|e| failed(e, "unable to get person"))
    }

    pub async fn create_contact(&self, person: &Value) -> Result<Value> {
        self.api
            .post(&self.url("people:createContact"), &[], person)
            .await
            .map_err(|e| failed(e, "unable to create contact"))
    }

    pub async fn update_contact(
        &self,
        resource_name: &str,
        person: &Value,
        update_mask: &str,
    ) -> Result<Value> {
        self.api
            .patch(
                &self.url(&format!("{}:updateContact", resource_path(resource_name))),
                &[("updatePersonFields", update_mask.to_string())],
                person,
            )
            .await
            .map_err(|e| failed(e, "unable to update contact"))
    }

    pub async fn delete_contact(&self, resource_name: &str) -> Result<()> {
        self.api
            .delete(&self.url(&format!("{}:deleteContact", resource_path(resource_name))), &[])
            .await
            .map_err(|e| failed(e, "unable to delete contact"))?;
        Ok(())
    }
}
