//! Repository search requests and results.
//!
//! Builds the AFTS queries used by discovery and backfill, and defines the
//! request/response shapes exchanged with the Alfresco search API:
//!
//! ```json
//! {
//!   "query":  { "language": "afts", "query": "ASPECT:\"acme:aiSync\" AND TYPE:\"cm:folder\"" },
//!   "sort":   [{ "type": "FIELD", "field": "cm:modified", "ascending": true }],
//!   "paging": { "maxItems": 100, "skipCount": 0 },
//!   "include": ["properties"]
//! }
//! ```
//!
//! Also hosts the timestamp helpers shared by the watermark code: parsing the
//! several date formats Alfresco emits, and formatting the two formats it
//! accepts (range literals and property values).

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sort field used for change detection and resumable paging.
pub const FIELD_MODIFIED: &str = "cm:modified";

const STORE_PREFIX: &str = "workspace://SpacesStore/";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: RequestQuery,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestQuery {
    pub language: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortField {
    #[serde(rename = "type")]
    pub sort_type: String,
    pub field: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub max_items: u32,
    pub skip_count: u32,
}

impl SearchRequest {
    pub fn afts(query: impl Into<String>) -> Self {
        Self {
            query: RequestQuery {
                language: "afts".to_string(),
                query: query.into(),
            },
            sort: Vec::new(),
            paging: None,
            include: Vec::new(),
        }
    }

    pub fn sorted_by(mut self, field: &str, ascending: bool) -> Self {
        self.sort.push(SortField {
            sort_type: "FIELD".to_string(),
            field: field.to_string(),
            ascending,
        });
        self
    }

    pub fn page(mut self, max_items: u32, skip_count: u32) -> Self {
        self.paging = Some(Paging {
            max_items,
            skip_count,
        });
        self
    }

    pub fn with_properties(mut self) -> Self {
        self.include.push("properties".to_string());
        self
    }
}

// ============ Query builders ============

/// Folders opted into sync.
pub fn sync_folders_query(aspect: &str) -> String {
    format!("ASPECT:\"{}\" AND TYPE:\"cm:folder\"", aspect)
}

/// All content documents below a folder.
pub fn folder_documents_query(folder_id: &str) -> String {
    format!(
        "ANCESTOR:\"{}{}\" AND TYPE:\"cm:content\"",
        STORE_PREFIX, folder_id
    )
}

/// Content documents below a folder modified at or after `since`.
pub fn modified_documents_query(folder_id: &str, since: Option<DateTime<Utc>>) -> String {
    let base = folder_documents_query(folder_id);
    match since {
        Some(ts) => format!(
            "{} AND {}:[{} TO *]",
            base,
            FIELD_MODIFIED,
            format_range_literal(ts)
        ),
        None => base,
    }
}

// ============ Results ============

/// One page of search hits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub entries: Vec<RepoNode>,
    pub has_more_items: bool,
    pub total_items: Option<u64>,
}

/// A node as returned by search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl RepoNode {
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified_at.as_deref().and_then(parse_timestamp)
    }

    /// Read a timestamp-valued property.
    pub fn date_property(&self, key: &str) -> Option<DateTime<Utc>> {
        self.properties
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }
}

/// Wire shape of `POST /search` responses.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub list: ResultList,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultList {
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub entries: Vec<ResultEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Pagination {
    #[serde(default)]
    pub has_more_items: bool,
    #[serde(default)]
    pub total_items: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultEntry {
    pub entry: RepoNode,
}

impl From<SearchResponse> for SearchPage {
    fn from(resp: SearchResponse) -> Self {
        let (has_more_items, total_items) = resp
            .list
            .pagination
            .map(|p| (p.has_more_items, p.total_items))
            .unwrap_or((false, None));
        SearchPage {
            entries: resp.list.entries.into_iter().map(|e| e.entry).collect(),
            has_more_items,
            total_items,
        }
    }
}

// ============ Timestamps ============

/// Parse the timestamp formats Alfresco emits.
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00.000Z`, `...+02:00`) and the
/// offset-without-colon form `2024-05-01T10:00:00.000+0000`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::<FixedOffset>::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Literal for AFTS range queries, always UTC with milliseconds.
pub fn format_range_literal(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Value written to the watermark properties: local time with offset.
pub fn format_property_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::Millis, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn request_serializes_like_the_search_api_expects() {
        let req = SearchRequest::afts(folder_documents_query("abc"))
            .sorted_by(FIELD_MODIFIED, false)
            .page(1, 0)
            .with_properties();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["query"]["language"], "afts");
        assert_eq!(
            json["query"]["query"],
            "ANCESTOR:\"workspace://SpacesStore/abc\" AND TYPE:\"cm:content\""
        );
        assert_eq!(json["sort"][0]["type"], "FIELD");
        assert_eq!(json["sort"][0]["field"], "cm:modified");
        assert_eq!(json["sort"][0]["ascending"], false);
        assert_eq!(json["paging"]["maxItems"], 1);
        assert_eq!(json["paging"]["skipCount"], 0);
        assert_eq!(json["include"][0], "properties");
    }

    #[test]
    fn bare_request_omits_optional_sections() {
        let json = serde_json::to_value(SearchRequest::afts("x")).unwrap();
        assert!(json.get("sort").is_none());
        assert!(json.get("paging").is_none());
        assert!(json.get("include").is_none());
    }

    #[test]
    fn modified_query_includes_range() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            modified_documents_query("f1", Some(ts)),
            "ANCESTOR:\"workspace://SpacesStore/f1\" AND TYPE:\"cm:content\" AND cm:modified:[2024-05-01T10:00:00.000Z TO *]"
        );
        assert_eq!(
            modified_documents_query("f1", None),
            folder_documents_query("f1")
        );
    }

    #[test]
    fn parses_alfresco_timestamp_flavours() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:00:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00.000+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:00:00.000+0000"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn property_timestamp_round_trips() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&format_property_timestamp(ts)), Some(ts));
    }

    #[test]
    fn response_maps_to_page() {
        let body = serde_json::json!({
            "list": {
                "pagination": { "count": 1, "hasMoreItems": true, "totalItems": 3 },
                "entries": [
                    { "entry": {
                        "id": "n1",
                        "name": "a.pdf",
                        "modifiedAt": "2024-05-01T10:00:00.000+0000",
                        "properties": { "acme:updatedDate": "2024-04-01T10:00:00.000Z" }
                    } }
                ]
            }
        });
        let resp: SearchResponse = serde_json::from_value(body).unwrap();
        let page = SearchPage::from(resp);
        assert!(page.has_more_items);
        assert_eq!(page.total_items, Some(3));
        assert_eq!(page.entries[0].name, "a.pdf");
        assert_eq!(
            page.entries[0].modified(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            page.entries[0].date_property("acme:updatedDate"),
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(page.entries[0].date_property("acme:publishedDate"), None);
    }
}
