//! Salesforce REST connector.
//!
//! Authenticates with the OAuth2 username-password token flow, then drives
//! the sobject REST and composite-collections endpoints. Bulk calls send
//! `allOrNone: false` so one bad record never voids its batch, and are
//! capped at the platform's 200-record collection limit. SOQL queries
//! follow `nextRecordsUrl` until the result set is exhausted.

use async_trait::async_trait;
use orgshift_core::models::{ObjectMeta, ObjectType, SaveOutcome, UpdateSpec};
use orgshift_core::platform::Platform;
use orgshift_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::instrument;

const API_VERSION: &str = "v59.0";
const COLLECTION_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub username: String,
    pub password: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// `login` for production, `test` for sandboxes.
    pub domain: String,
}

impl SalesforceConfig {
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .map_err(|_| Error::InvalidInput(format!("{name} is required")))
        };
        Ok(Self {
            username: required("SALESFORCE_USERNAME")?,
            password: required("SALESFORCE_PASSWORD")?,
            consumer_key: required("SALESFORCE_CONSUMER_KEY")?,
            consumer_secret: required("SALESFORCE_CONSUMER_SECRET")?,
            domain: std::env::var("SALESFORCE_DOMAIN").unwrap_or_else(|_| "login".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    fields: Vec<orgshift_core::models::FieldDescriptor>,
}

#[derive(Debug, Serialize)]
struct CollectionRequest<'a> {
    #[serde(rename = "allOrNone")]
    all_or_none: bool,
    records: Vec<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    records: Vec<Map<String, Value>>,
    #[serde(default)]
    done: bool,
    #[serde(rename = "nextRecordsUrl")]
    next_records_url: Option<String>,
}

#[derive(Clone)]
pub struct SalesforceRestClient {
    http: Client,
    instance_url: String,
    access_token: String,
}

impl SalesforceRestClient {
    /// Authenticate against the org. A failure here is fatal to the run.
    #[instrument(level = "info", skip(config), fields(domain = %config.domain, username = %config.username))]
    pub async fn connect(config: &SalesforceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::backend("build http client", e))?;

        let token_url = format!(
            "https://{}.salesforce.com/services/oauth2/token",
            config.domain
        );
        let resp = http
            .post(&token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", config.consumer_key.as_str()),
                ("client_secret", config.consumer_secret.as_str()),
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::backend("salesforce token request", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::BackendMessage(format!(
                "salesforce auth failed ({status}): {body}"
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::backend("parse token response", e))?;

        tracing::info!(instance = %token.instance_url, "connected to salesforce");
        Ok(Self {
            http,
            instance_url: token.instance_url,
            access_token: token.access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/services/data/{API_VERSION}{path}", self.instance_url)
    }

    async fn check_status(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::BackendMessage(format!(
            "salesforce {context} failed ({status}): {body}"
        )))
    }

    /// Tag each record with the `attributes.type` envelope the collections
    /// endpoint requires.
    fn collection_records<'a>(
        object: &ObjectType,
        payloads: &[Map<String, Value>],
        id_of: impl Fn(usize) -> Option<String>,
    ) -> Vec<Value> {
        payloads
            .iter()
            .enumerate()
            .map(|(i, fields)| {
                let mut record = fields.clone();
                record.insert(
                    "attributes".to_string(),
                    serde_json::json!({ "type": object.as_str() }),
                );
                if let Some(id) = id_of(i) {
                    record.insert("Id".to_string(), Value::String(id));
                }
                Value::Object(record)
            })
            .collect()
    }

    async fn submit_collection(
        &self,
        method: reqwest::Method,
        records: Vec<Value>,
        context: &str,
    ) -> Result<Vec<SaveOutcome>> {
        let body = CollectionRequest {
            all_or_none: false,
            records: records.iter().collect(),
        };
        let resp = self
            .http
            .request(method, self.url("/composite/sobjects"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::backend(context.to_string(), e))?;
        let resp = Self::check_status(resp, context).await?;
        resp.json()
            .await
            .map_err(|e| Error::backend(format!("parse {context} response"), e))
    }
}

#[async_trait]
impl Platform for SalesforceRestClient {
    #[instrument(level = "debug", skip(self))]
    async fn describe(&self, object: &ObjectType) -> Result<ObjectMeta> {
        let resp = self
            .http
            .get(self.url(&format!("/sobjects/{object}/describe")))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::backend("describe", e))?;
        let resp = Self::check_status(resp, "describe").await?;
        let describe: DescribeResponse = resp
            .json()
            .await
            .map_err(|e| Error::backend("parse describe response", e))?;
        Ok(ObjectMeta {
            object: object.clone(),
            fields: describe.fields,
        })
    }

    #[instrument(level = "debug", skip(self, fields))]
    async fn create(
        &self,
        object: &ObjectType,
        fields: &Map<String, Value>,
    ) -> Result<SaveOutcome> {
        let resp = self
            .http
            .post(self.url(&format!("/sobjects/{object}")))
            .bearer_auth(&self.access_token)
            .json(fields)
            .send()
            .await
            .map_err(|e| Error::backend("create", e))?;

        // Record-level rejections come back as 400 with an error array;
        // surface them as a failed outcome, not a transport error.
        if resp.status() == reqwest::StatusCode::BAD_REQUEST {
            let errors = resp
                .json()
                .await
                .map_err(|e| Error::backend("parse create errors", e))?;
            return Ok(SaveOutcome {
                success: false,
                id: None,
                errors,
            });
        }
        let resp = Self::check_status(resp, "create").await?;
        resp.json()
            .await
            .map_err(|e| Error::backend("parse create response", e))
    }

    #[instrument(level = "debug", skip(self, update))]
    async fn update(&self, object: &ObjectType, update: &UpdateSpec) -> Result<SaveOutcome> {
        let resp = self
            .http
            .patch(self.url(&format!("/sobjects/{object}/{}", update.id)))
            .bearer_auth(&self.access_token)
            .json(&update.fields)
            .send()
            .await
            .map_err(|e| Error::backend("update", e))?;

        if resp.status() == reqwest::StatusCode::BAD_REQUEST
            || resp.status() == reqwest::StatusCode::NOT_FOUND
        {
            let errors = resp
                .json()
                .await
                .map_err(|e| Error::backend("parse update errors", e))?;
            return Ok(SaveOutcome {
                success: false,
                id: Some(update.id.clone()),
                errors,
            });
        }
        Self::check_status(resp, "update").await?;
        Ok(SaveOutcome {
            success: true,
            id: Some(update.id.clone()),
            errors: Vec::new(),
        })
    }

    #[instrument(level = "debug", skip(self, records), fields(count = records.len()))]
    async fn bulk_create(
        &self,
        object: &ObjectType,
        records: &[Map<String, Value>],
    ) -> Result<Vec<SaveOutcome>> {
        if records.len() > COLLECTION_LIMIT {
            return Err(Error::InvalidInput(format!(
                "collection insert limited to {COLLECTION_LIMIT} records, got {}",
                records.len()
            )));
        }
        let tagged = Self::collection_records(object, records, |_| None);
        self.submit_collection(reqwest::Method::POST, tagged, "bulk create")
            .await
    }

    #[instrument(level = "debug", skip(self, updates), fields(count = updates.len()))]
    async fn bulk_update(
        &self,
        object: &ObjectType,
        updates: &[UpdateSpec],
    ) -> Result<Vec<SaveOutcome>> {
        if updates.len() > COLLECTION_LIMIT {
            return Err(Error::InvalidInput(format!(
                "collection update limited to {COLLECTION_LIMIT} records, got {}",
                updates.len()
            )));
        }
        let payloads: Vec<Map<String, Value>> =
            updates.iter().map(|u| u.fields.clone()).collect();
        let tagged =
            Self::collection_records(object, &payloads, |i| Some(updates[i].id.clone()));
        self.submit_collection(reqwest::Method::PATCH, tagged, "bulk update")
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn query(&self, soql: &str) -> Result<Vec<Map<String, Value>>> {
        let mut rows = Vec::new();
        let mut next: Option<String> = None;

        loop {
            let request = match &next {
                None => self
                    .http
                    .get(self.url("/query"))
                    .query(&[("q", soql)]),
                Some(path) => self.http.get(format!("{}{path}", self.instance_url)),
            };
            let resp = request
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| Error::backend("query", e))?;
            let resp = Self::check_status(resp, "query").await?;
            let page: QueryResponse = resp
                .json()
                .await
                .map_err(|e| Error::backend("parse query response", e))?;

            rows.extend(page.records);
            if page.done || page.next_records_url.is_none() {
                break;
            }
            next = page.next_records_url;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_from_env_requires_credentials() {
        std::env::remove_var("SALESFORCE_USERNAME");
        std::env::remove_var("SALESFORCE_PASSWORD");
        std::env::remove_var("SALESFORCE_CONSUMER_KEY");
        std::env::remove_var("SALESFORCE_CONSUMER_SECRET");
        assert!(SalesforceConfig::from_env().is_err());

        std::env::set_var("SALESFORCE_USERNAME", "u@example.com");
        std::env::set_var("SALESFORCE_PASSWORD", "pw");
        std::env::set_var("SALESFORCE_CONSUMER_KEY", "key");
        std::env::set_var("SALESFORCE_CONSUMER_SECRET", "secret");
        let cfg = SalesforceConfig::from_env().unwrap();
        assert_eq!(cfg.domain, "login");

        std::env::remove_var("SALESFORCE_USERNAME");
        std::env::remove_var("SALESFORCE_PASSWORD");
        std::env::remove_var("SALESFORCE_CONSUMER_KEY");
        std::env::remove_var("SALESFORCE_CONSUMER_SECRET");
    }

    #[test]
    fn collection_records_carry_type_attributes_and_ids() {
        let object = ObjectType::new("Account");
        let mut fields = Map::new();
        fields.insert("Name".to_string(), json!("Acme"));

        let created = SalesforceRestClient::collection_records(
            &object,
            std::slice::from_ref(&fields),
            |_| None,
        );
        assert_eq!(created[0]["attributes"]["type"], json!("Account"));
        assert!(created[0].get("Id").is_none());

        let updated = SalesforceRestClient::collection_records(
            &object,
            std::slice::from_ref(&fields),
            |_| Some("001NEW".to_string()),
        );
        assert_eq!(updated[0]["Id"], json!("001NEW"));
    }

    #[test]
    fn save_outcomes_deserialize_collection_results() {
        let outcomes: Vec<SaveOutcome> = serde_json::from_value(json!([
            { "id": "001NEW", "success": true, "errors": [] },
            {
                "success": false,
                "errors": [{
                    "statusCode": "REQUIRED_FIELD_MISSING",
                    "message": "Required fields are missing: [Name]",
                    "fields": ["Name"]
                }]
            }
        ]))
        .unwrap();
        assert!(outcomes[0].success);
        assert_eq!(outcomes[1].errors[0].fields, vec!["Name"]);
    }
}
