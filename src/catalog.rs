use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use camino::{Utf8Component, Utf8Path};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::config::CatalogSettings;
use crate::domain::{CloudCover, Credentials, DateRange, Footprint, Scene};
use crate::error::EoError;

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 50;

#[derive(Clone)]
pub struct Session {
    pub username: String,
    pub access_token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub footprint: Footprint,
    pub date_range: DateRange,
    pub platform: String,
    pub cloud_cover_max: CloudCover,
}

pub trait CatalogClient: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, EoError>;
    fn query(
        &self,
        session: &Session,
        request: &QueryRequest,
    ) -> Result<BTreeMap<String, Scene>, EoError>;
    fn download(
        &self,
        session: &Session,
        scene: &Scene,
        destination: &Path,
    ) -> Result<(), EoError>;
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    settings: CatalogSettings,
}

impl CatalogHttpClient {
    pub fn new(settings: CatalogSettings) -> Result<Self, EoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("eo-indices/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EoError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| EoError::CatalogHttp(err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn products_url(&self) -> String {
        format!("{}/Products", self.settings.search_url.trim_end_matches('/'))
    }

    fn download_url(&self, scene: &Scene) -> String {
        format!(
            "{}/Products({})/$value",
            self.settings.download_url.trim_end_matches('/'),
            scene.id
        )
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, reqwest::Error>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl CatalogClient for CatalogHttpClient {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, EoError> {
        let form = [
            ("grant_type", "password"),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("client_id", self.settings.client_id.as_str()),
        ];
        let response = self
            .send_with_retries(|| self.client.post(&self.settings.token_url).form(&form))
            .map_err(|err| EoError::CatalogHttp(err.to_string()))?;

        let status = response.status().as_u16();
        if matches!(status, 400 | 401 | 403) {
            return Err(EoError::Auth(format!(
                "token endpoint returned {status} for user {}",
                credentials.username
            )));
        }
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "token request failed".to_string());
            return Err(EoError::CatalogStatus { status, message });
        }

        let body: Value = response
            .json()
            .map_err(|err| EoError::CatalogHttp(err.to_string()))?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| EoError::Auth("token response without access_token".to_string()))?;

        Ok(Session {
            username: credentials.username.clone(),
            access_token: access_token.to_string(),
        })
    }

    fn query(
        &self,
        session: &Session,
        request: &QueryRequest,
    ) -> Result<BTreeMap<String, Scene>, EoError> {
        request.footprint.validate()?;
        let filter = build_filter(request);
        let top = PAGE_SIZE.to_string();

        let mut scenes = BTreeMap::new();
        let mut next: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let response = match &next {
                Some(url) => {
                    self.send_with_retries(|| self.client.get(url).bearer_auth(&session.access_token))
                }
                None => self.send_with_retries(|| {
                    self.client
                        .get(self.products_url())
                        .bearer_auth(&session.access_token)
                        .query(&[
                            ("$filter", filter.as_str()),
                            ("$top", top.as_str()),
                            ("$expand", "Attributes"),
                            ("$orderby", "ContentDate/Start asc"),
                        ])
                }),
            }
            .map_err(|err| EoError::Query(format!("catalog unreachable: {err}")))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .unwrap_or_else(|_| "catalog query failed".to_string());
                return Err(EoError::Query(format!("status {status}: {message}")));
            }

            let page: Value = response
                .json()
                .map_err(|err| EoError::Query(format!("invalid catalog response: {err}")))?;
            for scene in parse_products(&page)? {
                scenes.insert(scene.id.clone(), scene);
            }

            next = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);
            if next.is_none() {
                break;
            }
        }

        Ok(scenes)
    }

    fn download(
        &self,
        session: &Session,
        scene: &Scene,
        destination: &Path,
    ) -> Result<(), EoError> {
        let mut response = self
            .client
            .get(self.download_url(scene))
            .bearer_auth(&session.access_token)
            .send()
            .map_err(|err| EoError::Download(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(EoError::Download(format!(
                "catalog returned status {status} for {}",
                scene.id
            )));
        }
        let mut file =
            File::create(destination).map_err(|err| EoError::Download(err.to_string()))?;
        std::io::copy(&mut response, &mut file).map_err(|err| EoError::Download(err.to_string()))?;
        Ok(())
    }
}

pub fn build_filter(request: &QueryRequest) -> String {
    format!(
        "Collection/Name eq '{platform}' \
         and OData.CSC.Intersects(area=geography'SRID=4326;{wkt}') \
         and ContentDate/Start ge {start} \
         and ContentDate/Start le {end} \
         and Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' \
         and att/OData.CSC.DoubleAttribute/Value le {cloud}.00)",
        platform = request.platform,
        wkt = request.footprint.to_wkt(),
        start = odata_timestamp(request.date_range.start),
        end = odata_timestamp(request.date_range.end),
        cloud = request.cloud_cover_max.percent(),
    )
}

fn odata_timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn parse_products(page: &Value) -> Result<Vec<Scene>, EoError> {
    let items = page
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| EoError::Query("catalog response without value array".to_string()))?;

    items
        .iter()
        .map(|item| {
            let id = item
                .get("Id")
                .and_then(Value::as_str)
                .ok_or_else(|| EoError::Query("product without Id".to_string()))?;
            let name = item
                .get("Name")
                .and_then(Value::as_str)
                .ok_or_else(|| EoError::Query(format!("product {id} without Name")))?;
            let identifier = name.trim_end_matches(".SAFE");
            if !is_plain_name(name) || !is_plain_name(identifier) {
                return Err(EoError::Query(format!(
                    "product {id} has unusable name {name:?}"
                )));
            }

            let mut scene = Scene::new(id, identifier, name);
            scene.size_bytes = item.get("ContentLength").and_then(Value::as_u64);
            scene.footprint = item
                .get("Footprint")
                .and_then(Value::as_str)
                .map(str::to_string);
            scene.acquisition_date = item
                .get("ContentDate")
                .and_then(|value| value.get("Start"))
                .and_then(Value::as_str)
                .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                .map(|value| value.with_timezone(&Utc));
            scene.product_type = attribute(item, "productType")
                .and_then(Value::as_str)
                .map(str::to_string);
            scene.cloud_cover_percent = attribute(item, "cloudCover").and_then(Value::as_f64);
            Ok(scene)
        })
        .collect()
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Utf8Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(part)), None) if part == name
    )
}

fn attribute<'a>(item: &'a Value, name: &str) -> Option<&'a Value> {
    item.get("Attributes")
        .and_then(Value::as_array)?
        .iter()
        .find(|attr| attr.get("Name").and_then(Value::as_str) == Some(name))
        .and_then(|attr| attr.get("Value"))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
