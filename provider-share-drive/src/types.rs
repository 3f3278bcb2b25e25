//! Share API request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a listed entry is a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

/// A file or folder as seen through the share link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareFile {
    #[serde(default)]
    pub drive_id: String,

    #[serde(default)]
    pub domain_id: String,

    pub file_id: String,

    #[serde(default)]
    pub share_id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub kind: FileKind,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub parent_file_id: String,

    /// Size in bytes (0 for folders)
    #[serde(default)]
    pub size: u64,

    /// Thumbnail URL, empty when the API has none
    #[serde(default, rename = "thumbnail")]
    pub thumbnail_url: String,
}

impl ShareFile {
    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }
}

/// Body of `adrive/v3/file/list`
#[derive(Debug, Serialize)]
pub(crate) struct ListRequest<'a> {
    pub image_thumbnail_process: &'static str,
    pub image_url_process: &'static str,
    pub limit: u32,
    pub order_by: &'a str,
    pub order_direction: &'a str,
    pub parent_file_id: &'a str,
    pub share_id: &'a str,
    pub video_thumbnail_process: &'static str,
    pub marker: &'a str,
}

/// One page of a directory listing
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<ShareFile>,

    /// Empty on the last page
    #[serde(default)]
    pub next_marker: String,
}

/// Body of the single copy inside a batch request
#[derive(Debug, Serialize)]
pub(crate) struct CopyBody<'a> {
    pub file_id: &'a str,
    pub share_id: &'a str,
    pub auto_rename: bool,
    pub to_parent_file_id: &'a str,
    pub to_drive_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchItem<'a> {
    pub body: CopyBody<'a>,
    pub headers: HashMap<&'static str, &'static str>,
    pub id: &'static str,
    pub method: &'static str,
    pub url: &'static str,
}

/// Body of `adrive/v2/batch`
#[derive(Debug, Serialize)]
pub(crate) struct BatchRequest<'a> {
    pub requests: Vec<BatchItem<'a>>,
    pub resource: &'static str,
}

/// Identity of the file a copy produced
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopiedFile {
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub drive_id: String,
    #[serde(default)]
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchItemResponse {
    #[serde(default)]
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub body: CopiedFile,
}

#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub responses: Vec<BatchItemResponse>,
}

/// Preview methods accepted by `other`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMethod {
    Document,
    Video,
}

impl PreviewMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "doc_preview" => Some(Self::Document),
            "video_preview" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Body of the preview endpoints
#[derive(Debug, Serialize)]
pub(crate) struct PreviewRequest<'a> {
    pub share_id: &'a str,
    pub file_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_file_from_api_item() {
        let item = r#"{
            "drive_id": "9600002",
            "domain_id": "bj29",
            "file_id": "6411d5e3",
            "share_id": "7JQX1FswpQ8",
            "name": "S01E01.mkv",
            "type": "file",
            "created_at": "2023-03-15T14:29:23.000Z",
            "updated_at": "2023-03-15T14:29:23.000Z",
            "parent_file_id": "root",
            "size": 1073741824,
            "thumbnail": "https://cn-beijing-data.aliyundrive.net/thumb"
        }"#;

        let file: ShareFile = serde_json::from_str(item).unwrap();

        assert_eq!(file.kind, FileKind::File);
        assert_eq!(file.size, 1_073_741_824);
        assert_eq!(file.thumbnail_url, "https://cn-beijing-data.aliyundrive.net/thumb");
        assert!(file.updated_at.is_some());
    }

    #[test]
    fn test_folder_without_size() {
        let item = r#"{"file_id": "f", "name": "Season 1", "type": "folder"}"#;

        let file: ShareFile = serde_json::from_str(item).unwrap();

        assert!(file.is_folder());
        assert_eq!(file.size, 0);
    }

    #[test]
    fn test_batch_request_shape() {
        let request = BatchRequest {
            requests: vec![BatchItem {
                body: CopyBody {
                    file_id: "src",
                    share_id: "share",
                    auto_rename: true,
                    to_parent_file_id: "tmp",
                    to_drive_id: "drive",
                },
                headers: HashMap::from([("Content-Type", "application/json")]),
                id: "0",
                method: "POST",
                url: "/file/copy",
            }],
            resource: "file",
        };

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["resource"], "file");
        assert_eq!(value["requests"][0]["url"], "/file/copy");
        assert_eq!(value["requests"][0]["body"]["to_drive_id"], "drive");
        assert_eq!(value["requests"][0]["headers"]["Content-Type"], "application/json");
    }

    #[test]
    fn test_preview_method_parse() {
        assert_eq!(PreviewMethod::parse("doc_preview"), Some(PreviewMethod::Document));
        assert_eq!(PreviewMethod::parse("video_preview"), Some(PreviewMethod::Video));
        assert_eq!(PreviewMethod::parse("audio_preview"), None);
    }
}
