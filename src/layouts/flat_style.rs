use uuid::Uuid;

use crate::layouts::{join_folder, Layout};
use crate::models::ImageSize;
use crate::processor::OutputFormat;

const ROOT: &str = "images";
const METADATA_FILE: &str = "metadata.json";

/// `[folder/]images/{id}/{size}.webp` plus a `metadata.json` record.
///
/// Only the original keeps its extension, resized variants are always WebP.
#[derive(Debug, Clone)]
pub struct FlatStyleLayout {
    folder: Option<String>,
}

impl FlatStyleLayout {
    pub fn new(folder: Option<String>) -> Self {
        Self { folder }
    }
}

impl Layout for FlatStyleLayout {
    fn base_prefix(&self, image_id: Uuid) -> String {
        format!("{}{}/", self.listing_prefix(), image_id)
    }

    fn derive_key(&self, image_id: Uuid, size: ImageSize, ext: &str) -> String {
        let base = self.base_prefix(image_id);
        match size {
            ImageSize::Original => format!("{}{}{}", base, size.label(), ext),
            other => format!("{}{}.{}", base, other.label(), OutputFormat::WebP.extension()),
        }
    }

    fn metadata_key(&self, image_id: Uuid) -> Option<String> {
        Some(format!("{}{}", self.base_prefix(image_id), METADATA_FILE))
    }

    fn listing_prefix(&self) -> String {
        join_folder(self.folder.as_deref(), &format!("{}/", ROOT))
    }

    fn variant_format(&self, _ext: &str) -> OutputFormat {
        OutputFormat::WebP
    }

    fn parse_key(&self, key: &str) -> Option<(Uuid, ImageSize)> {
        let rest = key.strip_prefix(self.listing_prefix().as_str())?;
        let (raw_id, file) = rest.split_once('/')?;
        let image_id = Uuid::parse_str(raw_id).ok()?;

        let (stem, _) = file.rsplit_once('.')?;
        let size = stem.parse::<ImageSize>().ok()?;

        Some((image_id, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::parse_str("0d4b1c55-5b0f-4bd5-9d0e-2f7b0c9a1e01").unwrap()
    }

    #[test]
    fn test_keys() {
        let layout = FlatStyleLayout::new(None);
        assert_eq!(
            layout.derive_key(id(), ImageSize::Sm, ".png"),
            "images/0d4b1c55-5b0f-4bd5-9d0e-2f7b0c9a1e01/sm.webp",
        );
        assert_eq!(
            layout.derive_key(id(), ImageSize::Original, ".png"),
            "images/0d4b1c55-5b0f-4bd5-9d0e-2f7b0c9a1e01/original.png",
        );
        assert_eq!(
            layout.metadata_key(id()).as_deref(),
            Some("images/0d4b1c55-5b0f-4bd5-9d0e-2f7b0c9a1e01/metadata.json"),
        );
    }

    #[test]
    fn test_every_key_shares_the_base_prefix() {
        let layout = FlatStyleLayout::new(Some("tenant-a".into()));
        let base = layout.base_prefix(id());
        assert_eq!(base, "tenant-a/images/0d4b1c55-5b0f-4bd5-9d0e-2f7b0c9a1e01/");

        for size in [ImageSize::Original, ImageSize::Thumb, ImageSize::Xl] {
            assert!(layout.derive_key(id(), size, ".jpg").starts_with(&base));
        }
        assert!(layout.metadata_key(id()).unwrap().starts_with(&base));
        assert_eq!(layout.image_id_from_prefix(&base), Some(id()));
    }

    #[test]
    fn test_parse_key() {
        let layout = FlatStyleLayout::new(None);
        let key = layout.derive_key(id(), ImageSize::Md, ".png");
        assert_eq!(layout.parse_key(&key), Some((id(), ImageSize::Md)));

        let key = layout.derive_key(id(), ImageSize::Original, ".tiff");
        assert_eq!(layout.parse_key(&key), Some((id(), ImageSize::Original)));

        assert_eq!(layout.parse_key(&layout.metadata_key(id()).unwrap()), None);
        assert_eq!(layout.parse_key("images/not-an-id/md.webp"), None);
    }
}
