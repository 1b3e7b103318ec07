use super::errors::ServerError;
use super::xml::{AdvancedSearch, ExtensionAttribute, IdOnly, from_xml, to_xml};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 512;

/// A classic-API resource addressed by name and numeric id.
pub trait Resource: Serialize + DeserializeOwned {
    const PATH: &'static str;
    const ROOT: &'static str;

    fn id(&self) -> Option<u64>;
    fn name(&self) -> &str;
}

impl Resource for ExtensionAttribute {
    const PATH: &'static str = "computerextensionattributes";
    const ROOT: &'static str = "computer_extension_attribute";

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Resource for AdvancedSearch {
    const PATH: &'static str = "advancedcomputersearches";
    const ROOT: &'static str = "advanced_computer_search";

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct JamfClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

fn clip(body: String) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

impl JamfClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ServerError> {
        let invalid = |message: String| ServerError::InvalidUrl {
            url: url.to_string(),
            message,
        };
        let base = Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("only http(s) urls are supported".to_string()));
        }
        if base.cannot_be_a_base() {
            return Err(invalid("url cannot carry a path".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base,
            token: None,
        })
    }

    /// Joins path segments onto the server url, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ServerError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ServerError::InvalidUrl {
                url: self.base.to_string(),
                message: "url cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub async fn authenticate(
        &mut self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), ServerError> {
        let url = self.endpoint(&["api", "oauth", "token"])?;
        let resp = self
            .http
            .post(url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|source| ServerError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServerError::Auth {
                status: status.as_u16(),
                message: clip(body),
            });
        }
        let token: TokenResponse = resp.json().await.map_err(|e| ServerError::Auth {
            status: status.as_u16(),
            message: format!("unreadable token response: {e}"),
        })?;
        if token.access_token.trim().is_empty() {
            return Err(ServerError::Auth {
                status: status.as_u16(),
                message: "token response carried an empty access_token".to_string(),
            });
        }
        tracing::debug!(server = %self.base, "authenticated");
        self.token = Some(token.access_token);
        Ok(())
    }

    fn bearer(&self) -> Result<&str, ServerError> {
        self.token.as_deref().ok_or(ServerError::NotAuthenticated)
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<String>,
    ) -> Result<(StatusCode, String), ServerError> {
        let token = self.bearer()?;
        let mut req = self
            .http
            .request(method, url.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/xml");
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "text/xml").body(body);
        }
        let resp = req.send().await.map_err(|source| ServerError::Http {
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|source| ServerError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok((status, text))
    }

    pub async fn find_by_name<R: Resource>(&self, name: &str) -> Result<Option<R>, ServerError> {
        let url = self.endpoint(&["JSSResource", R::PATH, "name", name])?;
        let (status, body) = self.send(Method::GET, &url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ServerError::Status {
                method: Method::GET,
                url: url.to_string(),
                status: status.as_u16(),
                body: clip(body),
            });
        }
        from_xml(&body).map(Some).map_err(|message| ServerError::Xml {
            url: url.to_string(),
            message,
        })
    }

    /// Creates the resource and returns the id the server assigned.
    pub async fn create<R: Resource>(&self, doc: &R) -> Result<u64, ServerError> {
        let url = self.endpoint(&["JSSResource", R::PATH, "id", "0"])?;
        let body = to_xml(R::ROOT, doc).map_err(|message| ServerError::Xml {
            url: url.to_string(),
            message,
        })?;
        let (status, text) = self.send(Method::POST, &url, Some(body)).await?;
        if !status.is_success() {
            return Err(ServerError::Status {
                method: Method::POST,
                url: url.to_string(),
                status: status.as_u16(),
                body: clip(text),
            });
        }
        let created: IdOnly = from_xml(&text).map_err(|message| ServerError::Xml {
            url: url.to_string(),
            message,
        })?;
        Ok(created.id)
    }

    pub async fn update<R: Resource>(&self, id: u64, doc: &R) -> Result<(), ServerError> {
        let id = id.to_string();
        let url = self.endpoint(&["JSSResource", R::PATH, "id", &id])?;
        let body = to_xml(R::ROOT, doc).map_err(|message| ServerError::Xml {
            url: url.to_string(),
            message,
        })?;
        let (status, text) = self.send(Method::PUT, &url, Some(body)).await?;
        if !status.is_success() {
            return Err(ServerError::Status {
                method: Method::PUT,
                url: url.to_string(),
                status: status.as_u16(),
                body: clip(text),
            });
        }
        Ok(())
    }
}
