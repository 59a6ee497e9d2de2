//! Backend wire format.
//!
//! Every message in either direction is an [`Envelope`]:
//! `{ "type": "req:inspect-file", "key": "files.0.path", "payload": { ... } }`.
//! The `type` string is resolved once into a [`Method`]; payload shapes are
//! fixed per method through the [`BackendMethod`] table below.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;

use crate::{FieldError, WidgetKey};

/// Message envelope shared by requests and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: WidgetKey,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, key: WidgetKey, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            key,
            payload,
        }
    }
}

/// Logical backend methods. Each has one request and one response type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    InspectFile,
    BrowseFiles,
    UploadDataset,
    LoadImage,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown message type: {0}")]
pub struct UnknownMethod(pub String);

impl Method {
    pub const ALL: [Method; 4] = [Method::InspectFile, Method::BrowseFiles, Method::UploadDataset, Method::LoadImage];

    pub fn name(self) -> &'static str {
        match self {
            Method::InspectFile => "inspect-file",
            Method::BrowseFiles => "browse-files",
            Method::UploadDataset => "upload-dataset",
            Method::LoadImage => "load-image",
        }
    }

    pub fn request_type(self) -> &'static str {
        match self {
            Method::InspectFile => "req:inspect-file",
            Method::BrowseFiles => "req:browse-files",
            Method::UploadDataset => "req:upload-dataset",
            Method::LoadImage => "req:load-image",
        }
    }

    pub fn response_type(self) -> &'static str {
        match self {
            Method::InspectFile => "res:inspect-file",
            Method::BrowseFiles => "res:browse-files",
            Method::UploadDataset => "res:upload-dataset",
            Method::LoadImage => "res:load-image",
        }
    }

    /// Resolves a `res:*` type string.
    pub fn from_response_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.response_type() == kind)
    }

    /// Resolves a `req:*` type string.
    pub fn from_request_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.request_type() == kind)
    }

    /// Whether a newer request for the same key supersedes an in-flight one.
    ///
    /// Browsing is excluded: the backend only answers once the user picks a
    /// file and may never answer at all.
    pub fn coalesces(self) -> bool {
        !matches!(self, Method::BrowseFiles)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.name() == s)
            .or_else(|| Self::from_request_type(s))
            .or_else(|| Self::from_response_type(s))
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// Compile-time description of one request/response pair.
pub trait BackendMethod {
    const METHOD: Method;
    type Request: Serialize;
    type Response: DeserializeOwned;
}

pub struct InspectFile;
pub struct BrowseFiles;
pub struct UploadDataset;
pub struct LoadImage;

impl BackendMethod for InspectFile {
    const METHOD: Method = Method::InspectFile;
    type Request = ReqInspectFile;
    type Response = ResInspectFile;
}

impl BackendMethod for BrowseFiles {
    const METHOD: Method = Method::BrowseFiles;
    type Request = ReqBrowseFiles;
    type Response = ResBrowseFiles;
}

impl BackendMethod for UploadDataset {
    const METHOD: Method = Method::UploadDataset;
    type Request = ReqUploadDataset;
    type Response = ResUploadDataset;
}

impl BackendMethod for LoadImage {
    const METHOD: Method = Method::LoadImage;
    type Request = ReqLoadImage;
    type Response = ResLoadImage;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReqInspectFile {
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResInspectFile {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// ISO 8601 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReqBrowseFiles {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResBrowseFiles {
    pub selected: String,
}

/// Gathered form data; opaque to the correlation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReqUploadDataset(pub JsonMap<String, Value>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResUploadDataset {
    #[serde(default)]
    pub dataset_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ResUploadDataset {
    pub fn is_success(&self) -> bool {
        self.errors.as_ref().is_none_or(Vec::is_empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReqLoadImage {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResLoadImage {
    /// Data URI of the thumbnail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_type_strings_resolve_both_ways() {
        for method in Method::ALL {
            assert_eq!(Method::from_request_type(method.request_type()), Some(method));
            assert_eq!(Method::from_response_type(method.response_type()), Some(method));
            assert_eq!(method.request_type().parse::<Method>(), Ok(method));
        }
        assert_eq!(Method::from_response_type("req:inspect-file"), None);
        assert!("res:unknown".parse::<Method>().is_err());
    }

    #[test]
    fn envelope_uses_type_field_on_the_wire() {
        let envelope = Envelope::new(
            Method::InspectFile.request_type(),
            WidgetKey::from("files.0.path"),
            json!({"filename": "/data/run.h5"}),
        );
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            encoded,
            json!({"type": "req:inspect-file", "key": "files.0.path", "payload": {"filename": "/data/run.h5"}})
        );
    }

    #[test]
    fn inspect_response_reads_camel_case_and_tolerates_echoed_fields() {
        let payload = json!({
            "filename": "/data/run.h5",
            "success": true,
            "size": 1024,
            "creationTime": "2024-01-01T00:00:00Z",
            "remotePath": "run.h5"
        });
        let response: ResInspectFile = serde_json::from_value(payload).unwrap();
        assert!(response.success);
        assert_eq!(response.size, Some(1024));
        assert_eq!(response.creation_time.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(response.remote_path.as_deref(), Some("run.h5"));
    }

    #[test]
    fn upload_response_with_errors_is_not_success() {
        let response: ResUploadDataset = serde_json::from_value(json!({
            "datasetName": "",
            "errors": [{"field": "sourceFolder", "error": "Required"}]
        }))
        .unwrap();
        assert!(!response.is_success());

        let ok: ResUploadDataset = serde_json::from_value(json!({"datasetName": "run 12", "pid": "20.500/abc"})).unwrap();
        assert!(ok.is_success());
    }

    #[test]
    fn browse_is_the_only_non_coalescing_method() {
        let non_coalescing: Vec<_> = Method::ALL.into_iter().filter(|m| !m.coalesces()).collect();
        assert_eq!(non_coalescing, vec![Method::BrowseFiles]);
    }
}
