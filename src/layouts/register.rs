use enum_dispatch::enum_dispatch;
use uuid::Uuid;

use crate::models::ImageSize;
use crate::processor::OutputFormat;

use super::flat_style::FlatStyleLayout;
use super::path_style::PathStyleLayout;

/// Layouts are selected once per deployment here.
#[allow(clippy::enum_variant_names)]
#[enum_dispatch(Layout)]
#[derive(Debug, Clone)]
pub enum LayoutSelector {
    PathStyleLayout,
    FlatStyleLayout,
}

/// Maps image identities onto object keys and back.
///
/// Every key returned for an image starts with its `base_prefix`.
#[enum_dispatch]
pub trait Layout: Sync + Send + 'static {
    /// The prefix shared by every object of the image, ending in `/`.
    fn base_prefix(&self, image_id: Uuid) -> String;

    /// The key of one stored variant. `ext` is the original's
    /// extension including the leading dot.
    fn derive_key(&self, image_id: Uuid, size: ImageSize, ext: &str) -> String;

    /// The key of the metadata record, if this layout keeps one.
    fn metadata_key(&self, image_id: Uuid) -> Option<String>;

    /// The prefix under which every image forms one delimiter group.
    fn listing_prefix(&self) -> String;

    /// The format resized variants are encoded in.
    fn variant_format(&self, ext: &str) -> OutputFormat;

    /// Recovers the identity and variant a stored key belongs to.
    ///
    /// Keys this layout would not produce, including metadata records,
    /// yield `None`.
    fn parse_key(&self, key: &str) -> Option<(Uuid, ImageSize)>;

    /// Recovers the identity from a common prefix returned by a
    /// delimiter listing under `listing_prefix`.
    fn image_id_from_prefix(&self, prefix: &str) -> Option<Uuid> {
        let listing_prefix = self.listing_prefix();
        let segment = prefix
            .strip_prefix(listing_prefix.as_str())?
            .trim_end_matches('/');

        if segment.is_empty() || segment.contains('/') {
            return None;
        }

        Uuid::parse_str(segment).ok()
    }
}
