//! Low-level PDF access on top of lopdf.

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::error::LoadError;

/// Parse PDF bytes, decrypting documents protected by an empty user password.
pub fn parse(data: &[u8]) -> Result<Document, LoadError> {
    let mut doc = Document::load_mem(data).map_err(|e| LoadError::Parse(e.to_string()))?;

    if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(LoadError::Encrypted);
        }
        debug!("Decrypted PDF with empty password");
    }

    let page_count = doc.get_pages().len();
    if page_count == 0 {
        return Err(LoadError::NoPages);
    }

    debug!("Parsed PDF with {} pages", page_count);
    Ok(doc)
}

/// Convert a numeric object (Integer or Real) to f64.
pub fn object_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(*f as f64),
        _ => None,
    }
}

/// Look up a key on a page, walking up the page tree via /Parent.
pub fn resolve_inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current_id = page_id;
    // Page trees are shallow; the bound guards against /Parent cycles.
    for _ in 0..64 {
        let dict = doc.get_object(current_id).and_then(|o| o.as_dict()).ok()?;

        if let Ok(value) = dict.get(key) {
            return Some(value);
        }

        current_id = dict.get(b"Parent").and_then(|p| p.as_reference()).ok()?;
    }
    None
}

/// Follow a reference to its target object; other objects are returned as-is.
pub fn deref<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Resolve an object to a dictionary, following one level of indirection.
pub fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    deref(doc, obj).as_dict().ok()
}

/// Read a page box entry as `[x0, y0, x1, y1]`, normalized so x0 < x1, y0 < y1.
fn page_box(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<[f64; 4]> {
    let array = deref(doc, resolve_inherited(doc, page_id, key)?).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let values: Vec<f64> = array
        .iter()
        .filter_map(|o| object_to_f64(deref(doc, o)))
        .collect();
    if values.len() != 4 {
        return None;
    }

    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
}

/// The page's /MediaBox as `[x0, y0, x1, y1]`, normalized so x0 < x1, y0 < y1.
///
/// Falls back to US Letter when the box is missing or malformed.
pub fn page_media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    const LETTER: [f64; 4] = [0.0, 0.0, 612.0, 792.0];
    page_box(doc, page_id, b"MediaBox").unwrap_or(LETTER)
}

/// The visible region of a page: its /CropBox clipped to the /MediaBox.
///
/// This is the area viewers display and renderers rasterize.
pub fn page_visible_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let media = page_media_box(doc, page_id);
    let Some(crop) = page_box(doc, page_id, b"CropBox") else {
        return media;
    };

    let clipped = [
        crop[0].max(media[0]),
        crop[1].max(media[1]),
        crop[2].min(media[2]),
        crop[3].min(media[3]),
    ];
    if clipped[0] >= clipped[2] || clipped[1] >= clipped[3] {
        debug!("CropBox {:?} lies outside MediaBox {:?}, ignored", crop, media);
        return media;
    }
    clipped
}

/// The page's /Rotate value normalized to 0, 90, 180 or 270.
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> u16 {
    let degrees = resolve_inherited(doc, page_id, b"Rotate")
        .and_then(|o| deref(doc, o).as_i64().ok())
        .unwrap_or(0);
    (degrees.rem_euclid(360) / 90 * 90) as u16
}

/// The page's resource dictionary (inherited or indirect), cloned.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    resolve_inherited(doc, page_id, b"Resources")
        .and_then(|obj| as_dict(doc, obj))
        .cloned()
        .unwrap_or_else(Dictionary::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_inherited_media_box() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), Object::Real(842.0)],
            }),
        );

        assert_eq!(page_media_box(&doc, page_id), [0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn test_media_box_is_normalized() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![612.into(), 792.into(), 0.into(), 0.into()],
        });

        assert_eq!(page_media_box(&doc, page_id), [0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn test_crop_box_is_clipped_to_media_box() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "CropBox" => vec![36.into(), 36.into(), 700.into(), 756.into()],
        });

        assert_eq!(page_visible_box(&doc, page_id), [36.0, 36.0, 612.0, 756.0]);
    }

    #[test]
    fn test_missing_crop_box_uses_media_box() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![10.into(), 20.into(), 622.into(), 812.into()],
        });

        assert_eq!(page_visible_box(&doc, page_id), [10.0, 20.0, 622.0, 812.0]);
    }

    #[test]
    fn test_rotation_is_normalized() {
        let mut doc = Document::with_version("1.5");
        let turned = doc.add_object(dictionary! { "Type" => "Page", "Rotate" => -90 });
        let odd = doc.add_object(dictionary! { "Type" => "Page", "Rotate" => 450 });
        let plain = doc.add_object(dictionary! { "Type" => "Page" });

        assert_eq!(page_rotation(&doc, turned), 270);
        assert_eq!(page_rotation(&doc, odd), 90);
        assert_eq!(page_rotation(&doc, plain), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse(b"not a pdf"), Err(LoadError::Parse(_))));
    }
}
