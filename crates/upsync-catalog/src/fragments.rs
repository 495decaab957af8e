//! Metadata fragment extraction.
//!
//! The protocol carves three slices out of an update's full metadata
//! document: the core fragment offered with the update, the extended
//! fragment fetched before installation, and the localized title and
//! description properties. Fragments must reach the client byte-faithful,
//! so the slicer works on the raw text and never re-serializes: it locates
//! balanced elements by name, honoring quoted attribute values, comments,
//! and self-closing tags.

/// Elements forming the core fragment: identity and applicability.
const CORE_ELEMENTS: &[&str] = &[
    "UpdateIdentity",
    "Properties",
    "Relationships",
    "ApplicabilityRules",
];

/// Elements forming the extended fragment: post-selection metadata.
const EXTENDED_ELEMENTS: &[&str] = &["Properties", "Files", "HandlerSpecificData"];

/// Extracts the core fragment from a full metadata document.
#[must_use]
pub fn core_fragment(doc: &str) -> String {
    concat_elements(doc, CORE_ELEMENTS)
}

/// Extracts the extended fragment from a full metadata document.
#[must_use]
pub fn extended_fragment(doc: &str) -> String {
    concat_elements(doc, EXTENDED_ELEMENTS)
}

/// Extracts the localized properties for the first requested language that
/// the document carries. Returns an empty string when no requested
/// language is available.
#[must_use]
pub fn localized_properties(doc: &str, languages: &[String]) -> String {
    let candidates = find_all(doc, "LocalizedProperties");
    for language in languages {
        for candidate in &candidates {
            let matches = find_first(candidate, "Language")
                .map(|(start, end)| element_text(&candidate[start..end]))
                .is_some_and(|text| text.eq_ignore_ascii_case(language));
            if matches {
                return (*candidate).to_string();
            }
        }
    }
    String::new()
}

fn concat_elements(doc: &str, names: &[&str]) -> String {
    let mut out = String::new();
    for name in names {
        for slice in find_all(doc, name) {
            out.push_str(slice);
        }
    }
    out
}

fn find_all<'a>(doc: &'a str, name: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some((start, end)) = find_element(doc, name, pos) {
        out.push(&doc[start..end]);
        pos = end;
    }
    out
}

fn find_first(doc: &str, name: &str) -> Option<(usize, usize)> {
    find_element(doc, name, 0)
}

/// Locates the next balanced element named `name` at or after `from`,
/// returning the byte range covering the whole element.
///
/// Tags are scanned linearly so comments and CDATA sections never produce
/// false starts; a name match requires the tag name to be terminated by
/// whitespace, '/', or '>' so that e.g. `<LocalizedPropertiesCollection>`
/// never matches a search for `LocalizedProperties`.
fn find_element(doc: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut pos = from;
    while let Some(rel) = doc.get(pos..).and_then(|rest| rest.find('<')) {
        let lt = pos + rel;
        if doc[lt..].starts_with("<!--") {
            pos = lt + doc[lt..].find("-->")? + 3;
            continue;
        }
        if doc[lt..].starts_with("<![CDATA[") {
            pos = lt + doc[lt..].find("]]>")? + 3;
            continue;
        }
        let gt = tag_end(doc, lt)?;
        let tag = &doc[lt..=gt];
        if opens(tag, name) {
            if tag.ends_with("/>") {
                if start.is_none() {
                    return Some((lt, gt + 1));
                }
            } else {
                if start.is_none() {
                    start = Some(lt);
                }
                depth += 1;
            }
        } else if closes(tag, name) && start.is_some() {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some((start?, gt + 1));
            }
        }
        pos = gt + 1;
    }
    None
}

/// Finds the '>' ending the tag opened at `lt`, skipping quoted values.
fn tag_end(doc: &str, lt: usize) -> Option<usize> {
    let bytes = doc.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(lt) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

fn opens(tag: &str, name: &str) -> bool {
    tag.strip_prefix('<')
        .and_then(|rest| rest.strip_prefix(name))
        .is_some_and(|rest| rest.starts_with([' ', '\t', '\n', '\r', '/', '>']))
}

fn closes(tag: &str, name: &str) -> bool {
    tag.strip_prefix("</")
        .and_then(|rest| rest.strip_prefix(name))
        .is_some_and(|rest| rest.trim_start().starts_with('>'))
}

/// The text content of a simple element, empty for self-closing ones.
fn element_text(fragment: &str) -> &str {
    let Some(start) = fragment.find('>') else {
        return "";
    };
    if fragment[..=start].ends_with("/>") {
        return "";
    }
    let Some(end) = fragment.rfind("</") else {
        return "";
    };
    &fragment[start + 1..end]
}
