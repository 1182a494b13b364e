use uuid::Uuid;

use crate::layouts::{join_folder, Layout};
use crate::models::ImageSize;
use crate::processor::OutputFormat;

/// `[folder/]{id}/{size}/{id}{ext}`
///
/// Variants keep the extension of the original, no metadata
/// record is written.
#[derive(Debug, Clone)]
pub struct PathStyleLayout {
    folder: Option<String>,
}

impl PathStyleLayout {
    pub fn new(folder: Option<String>) -> Self {
        Self { folder }
    }
}

impl Layout for PathStyleLayout {
    fn base_prefix(&self, image_id: Uuid) -> String {
        join_folder(self.folder.as_deref(), &format!("{}/", image_id))
    }

    fn derive_key(&self, image_id: Uuid, size: ImageSize, ext: &str) -> String {
        format!("{}{}/{}{}", self.base_prefix(image_id), size.label(), image_id, ext)
    }

    fn metadata_key(&self, _image_id: Uuid) -> Option<String> {
        None
    }

    fn listing_prefix(&self) -> String {
        join_folder(self.folder.as_deref(), "")
    }

    fn variant_format(&self, ext: &str) -> OutputFormat {
        OutputFormat::from_extension(ext)
    }

    fn parse_key(&self, key: &str) -> Option<(Uuid, ImageSize)> {
        let rest = key.strip_prefix(self.listing_prefix().as_str())?;
        let mut parts = rest.splitn(3, '/');

        let image_id = Uuid::parse_str(parts.next()?).ok()?;
        let size = parts.next()?.parse::<ImageSize>().ok()?;
        let file = parts.next()?;

        if !file.starts_with(&image_id.to_string()) {
            return None;
        }

        Some((image_id, size))
    }
}
