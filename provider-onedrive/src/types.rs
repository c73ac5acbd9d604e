//! Microsoft Graph wire types
//!
//! Only the drive-item fields the connector consumes.

use serde::Deserialize;

/// A Graph drive item (file or folder)
#[derive(Debug, Clone, Deserialize)]
pub struct DriveItem {
    pub name: String,

    #[serde(rename = "eTag")]
    pub e_tag: Option<String>,

    /// Present when the item is a file
    #[serde(default)]
    pub file: Option<FileFacet>,

    /// Present when the item is a folder
    #[serde(default)]
    pub folder: Option<FolderFacet>,

    #[serde(default)]
    pub size: Option<i64>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileFacet {
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderFacet {
    #[serde(default, rename = "childCount")]
    pub child_count: Option<i64>,
}

/// One page of a children listing
#[derive(Debug, Clone, Deserialize)]
pub struct DriveItemList {
    pub value: Vec<DriveItem>,

    #[serde(default, rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}
