mod flat_style;
mod path_style;
mod register;

pub use flat_style::FlatStyleLayout;
pub use path_style::PathStyleLayout;
pub use register::{Layout, LayoutSelector};

use crate::config::LayoutKind;

/// The extensions probed for an original, in probing order.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".bmp", ".tiff"];

impl LayoutKind {
    pub fn build_layout(&self, folder: Option<String>) -> LayoutSelector {
        match self {
            Self::Path => PathStyleLayout::new(folder).into(),
            Self::Flat => FlatStyleLayout::new(folder).into(),
        }
    }
}

pub(crate) fn join_folder(folder: Option<&str>, rest: &str) -> String {
    match folder {
        Some(folder) => format!("{}/{}", folder, rest),
        None => rest.to_string(),
    }
}

/// Picks the extension an upload is stored with.
///
/// The filename wins when its extension is one we can probe for,
/// otherwise the declared MIME type decides.
pub fn stored_extension(filename: &str, mime_type: &str) -> Option<&'static str> {
    let from_name = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()));

    if let Some(ext) = from_name {
        if let Some(known) = ALLOWED_EXTENSIONS.iter().find(|v| **v == ext) {
            return Some(*known);
        }
    }

    let mime_type = mime_type.parse::<mime::Mime>().ok()?;
    if mime_type.type_() != mime::IMAGE {
        return None;
    }

    match mime_type.subtype().as_str() {
        "jpeg" | "jpg" => Some(".jpg"),
        "png" => Some(".png"),
        "gif" => Some(".gif"),
        "webp" => Some(".webp"),
        "svg" => Some(".svg"),
        "bmp" => Some(".bmp"),
        "tiff" => Some(".tiff"),
        _ => None,
    }
}
