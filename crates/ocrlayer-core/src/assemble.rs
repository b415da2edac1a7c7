//! Merging text layers into the output document.
//!
//! Workers prepare a [`LayerPatch`] per page from the read-only input; the
//! single writer applies all patches to the output document at the end.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::layer::font;
use crate::pdf;

const FONT_KEY_BASE: &str = "FOcr";

/// Everything needed to add one page's text layer.
#[derive(Debug, Clone)]
pub struct LayerPatch {
    pub page_id: ObjectId,
    /// The page's effective resources, materialized, with a direct /Font dictionary.
    pub resources: Dictionary,
    /// Key under which the layer font is registered in /Font.
    pub font_key: String,
    /// Text layer content stream.
    pub content: Vec<u8>,
}

/// Materialized resources of a page with its /Font entry made direct.
pub fn materialize_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut resources = pdf::page_resources(doc, page_id);

    let fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|o| pdf::as_dict(doc, o))
        .cloned()
        .unwrap_or_else(Dictionary::new);
    resources.set("Font", Object::Dictionary(fonts));
    resources
}

/// A font resource name not yet used in `resources`.
pub fn unused_font_key(resources: &Dictionary) -> String {
    let taken = |key: &str| {
        resources
            .get(b"Font")
            .ok()
            .and_then(|o| o.as_dict().ok())
            .is_some_and(|fonts| fonts.has(key.as_bytes()))
    };

    if !taken(FONT_KEY_BASE) {
        return FONT_KEY_BASE.to_string();
    }
    (1..)
        .map(|n| format!("{}{}", FONT_KEY_BASE, n))
        .find(|key| !taken(key))
        .unwrap_or_else(|| FONT_KEY_BASE.to_string())
}

fn add_stream(doc: &mut Document, bytes: &[u8]) -> ObjectId {
    doc.add_object(Stream::new(dictionary! {}, bytes.to_vec()))
}

/// The page's current content stream references, flattened.
fn content_refs(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_object(page_id).and_then(|o| o.as_dict()) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Stream(stream)) => vec![Object::Stream(stream.clone())],
        _ => Vec::new(),
    }
}

/// Apply text layer patches to the output document.
///
/// Adds one shared Helvetica font object. Each patched page's original
/// content is bracketed by `q`/`Q` so the layer starts from the default
/// graphics state. Returns the number of pages patched.
pub fn apply_patches(doc: &mut Document, patches: Vec<LayerPatch>) -> Result<usize, String> {
    if patches.is_empty() {
        return Ok(0);
    }

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font::FONT_NAME,
        "Encoding" => "WinAnsiEncoding",
    });
    let save_id = add_stream(doc, b"q\n");
    let restore_id = add_stream(doc, b"\nQ\n");

    let count = patches.len();
    for patch in patches {
        let originals: Vec<Object> = content_refs(doc, patch.page_id)
            .into_iter()
            .map(|o| match o {
                // Streams inside an array must be indirect.
                Object::Stream(stream) => Object::Reference(doc.add_object(stream)),
                other => other,
            })
            .collect();
        let layer_id = add_stream(doc, &patch.content);

        let mut resources = patch.resources;
        let mut fonts = resources
            .get(b"Font")
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new);
        fonts.set(patch.font_key.as_bytes().to_vec(), Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        let mut contents = Vec::with_capacity(originals.len() + 3);
        contents.push(Object::Reference(save_id));
        contents.extend(originals);
        contents.push(Object::Reference(restore_id));
        contents.push(Object::Reference(layer_id));

        let page = doc
            .get_object_mut(patch.page_id)
            .and_then(|o| o.as_dict_mut())
            .map_err(|e| format!("page {:?}: {}", patch.page_id, e))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));

        debug!("Attached text layer to page object {:?}", patch.page_id);
    }

    Ok(count)
}
