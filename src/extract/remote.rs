//! Remote JSON API extraction, single-call or paginated

use super::with_lineage;
use crate::client::ApiClient;
use crate::error::{EtlError, EtlResult};
use crate::etl::Extractor;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Lineage column naming the endpoint a row came from
pub const SOURCE_ENDPOINT_COLUMN: &str = "source_endpoint";

fn default_page_param() -> String {
    "page".to_string()
}

fn default_size_param() -> String {
    "limit".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_start_page() -> u64 {
    1
}

/// Page-index pagination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_size_param")]
    pub size_param: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_start_page")]
    pub start_page: u64,
    /// Upper bound on page requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_param: default_page_param(),
            size_param: default_size_param(),
            page_size: default_page_size(),
            start_page: default_start_page(),
            max_pages: None,
        }
    }
}

/// Extracts records from one endpoint of an [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ApiExtractor<'a> {
    client: &'a ApiClient,
    endpoint: String,
    params: Vec<(String, String)>,
    data_key: Option<String>,
    pagination: Option<Pagination>,
}

impl<'a> ApiExtractor<'a> {
    pub fn new(client: &'a ApiClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            params: Vec::new(),
            data_key: None,
            pagination: None,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    /// Key of the record array inside an object response
    pub fn with_data_key(mut self, key: Option<String>) -> Self {
        self.data_key = key;
        self
    }

    pub fn with_pagination(mut self, pagination: Option<Pagination>) -> Self {
        self.pagination = pagination;
        self
    }

    async fn extract_single(&self) -> EtlResult<Vec<Json>> {
        let body = self.client.get_json(&self.endpoint, &self.params).await?;
        Ok(match body {
            Json::Array(items) => items,
            Json::Object(mut map) => match self.data_key.as_deref().and_then(|k| map.remove(k)) {
                Some(Json::Array(items)) => items,
                Some(other) => vec![other],
                None => vec![Json::Object(map)],
            },
            Json::Null => Vec::new(),
            scalar => vec![scalar],
        })
    }

    async fn extract_pages(&self, pagination: &Pagination) -> EtlResult<Vec<Json>> {
        let mut records = Vec::new();
        let mut page = pagination.start_page;
        let mut requested = 0usize;
        let mut last_error = None;

        loop {
            if pagination.max_pages.is_some_and(|cap| requested >= cap) {
                log::info!("Reached page cap of {} for {}", requested, self.endpoint);
                break;
            }
            let mut params = self.params.clone();
            params.push((pagination.page_param.clone(), page.to_string()));
            params.push((pagination.size_param.clone(), pagination.page_size.to_string()));

            requested += 1;
            let body = match self.client.get_json(&self.endpoint, &params).await {
                Ok(body) => body,
                Err(e) => {
                    log::warn!(
                        "Stopping pagination of {} at page {}: {}",
                        self.endpoint,
                        page,
                        e
                    );
                    last_error = Some(e);
                    break;
                }
            };

            let (items, total_pages) = self.split_page(body);
            if items.is_empty() {
                log::debug!("Page {} of {} is empty", page, self.endpoint);
                break;
            }
            log::debug!("Page {}: {} records", page, items.len());
            records.extend(items);

            if total_pages.is_some_and(|total| page >= total) {
                break;
            }
            page += 1;
        }

        if records.is_empty() {
            if let Some(e) = last_error {
                return Err(EtlError::NoData(format!(
                    "{} returned no records before failing: {}",
                    self.endpoint, e
                )));
            }
        }
        Ok(records)
    }

    /// Records and `total_pages` of one page body
    fn split_page(&self, body: Json) -> (Vec<Json>, Option<u64>) {
        let mut map = match body {
            Json::Object(map) => map,
            Json::Array(items) => return (items, None),
            _ => return (Vec::new(), None),
        };
        let total_pages = ["pagination", "meta"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(|meta| meta.get("total_pages"))
            .and_then(Json::as_u64);
        let keys: Vec<&str> = match self.data_key.as_deref() {
            Some(key) => vec![key],
            None => vec!["data", "results"],
        };
        let items = keys
            .into_iter()
            .find_map(|k| map.remove(k))
            .map(|data| match data {
                Json::Array(items) => items,
                Json::Null => Vec::new(),
                other => vec![other],
            })
            .unwrap_or_default();
        (items, total_pages)
    }
}

impl Extractor for ApiExtractor<'_> {
    fn source(&self) -> String {
        self.endpoint.clone()
    }

    async fn extract(&self) -> EtlResult<Table> {
        log::info!("Extracting data from {}{}", self.client, self.endpoint);
        let records = match &self.pagination {
            Some(pagination) => self.extract_pages(pagination).await?,
            None => self.extract_single().await?,
        };
        if records.is_empty() {
            return Err(EtlError::NoData(format!(
                "{} returned no records",
                self.endpoint
            )));
        }
        log::info!("Extracted {} records from {}", records.len(), self.endpoint);
        with_lineage(
            Table::from_records(&records),
            SOURCE_ENDPOINT_COLUMN,
            &self.endpoint,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Auth, RetryPolicy};
    use std::time::Duration;
    use url::Url;

    fn offline_client() -> ApiClient {
        ApiClient::try_new(
            Url::parse("http://localhost:1").unwrap(),
            Auth::None,
            Duration::from_secs(1),
            RetryPolicy::none(),
        )
        .unwrap()
    }

    #[test]
    fn test_split_page_reads_data_and_meta() {
        let client = offline_client();
        let extractor = ApiExtractor::new(&client, "users");
        let (items, total) = extractor.split_page(serde_json::json!({
            "data": [{"id": 1}, {"id": 2}],
            "pagination": {"page": 1, "total_pages": 4}
        }));
        assert_eq!(items.len(), 2);
        assert_eq!(total, Some(4));

        let (items, total) = extractor.split_page(serde_json::json!({
            "results": [{"id": 3}],
            "meta": {"total_pages": 1}
        }));
        assert_eq!(items.len(), 1);
        assert_eq!(total, Some(1));
    }

    #[test]
    fn test_split_page_with_data_key_and_bare_array() {
        let client = offline_client();
        let extractor = ApiExtractor::new(&client, "users").with_data_key(Some("items".into()));
        let (items, total) = extractor.split_page(serde_json::json!({"items": [{"id": 1}]}));
        assert_eq!(items.len(), 1);
        assert_eq!(total, None);

        let (items, _) = extractor.split_page(serde_json::json!([{"id": 1}, {"id": 2}]));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_pagination_defaults() {
        let pagination: Pagination = serde_yaml::from_str("max_pages: 3").unwrap();
        assert_eq!(pagination.page_param, "page");
        assert_eq!(pagination.size_param, "limit");
        assert_eq!(pagination.page_size, 100);
        assert_eq!(pagination.start_page, 1);
        assert_eq!(pagination.max_pages, Some(3));
    }
}
