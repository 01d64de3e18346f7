//! Slot discovery and substitution over view templates.
//!
//! A template marks editable regions with two attributes:
//!
//! * `data-cms-piece="code"` on any element: the inner HTML is the default
//!   content of the piece.
//! * `data-cms-meta="code"` on `<title>`: the inner text is the default title
//!   of the page meta record.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use html_escape::{decode_html_entities, encode_double_quoted_attribute};
use lol_html::html_content::{ContentType, Element};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use thiserror::Error;

use crate::domain::entities::PageMetaFields;
use crate::domain::types::ViewAddress;

pub const PIECE_ATTR: &str = "data-cms-piece";
pub const META_ATTR: &str = "data-cms-meta";
const CMS_ATTR_PREFIX: &str = "data-cms-";
const OPEN_MARKER: &str = "<!--tessera-slot:";
const CLOSE_MARKER: &str = "<!--/tessera-slot:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("template could not be processed: {0}")]
    Rewrite(String),
    #[error("slot `{code}` cannot hold content")]
    Unclosed { code: String },
    #[error("slot `{code}` contains another slot")]
    Nested { code: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Piece,
    Meta,
}

/// A slot found in a template, with its raw code and default content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub kind: SlotKind,
    pub code: String,
    pub default: String,
}

/// Values substituted into slots, keyed by trimmed code.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSlots {
    pub pieces: HashMap<String, String>,
    pub meta: HashMap<String, PageMetaFields>,
}

#[derive(Debug, Clone)]
struct Found {
    kind: SlotKind,
    code: String,
}

/// Find every slot in `html` in document order.
pub fn collect_slots(html: &str) -> Result<Vec<Slot>, MarkupError> {
    let found: Rc<RefCell<Vec<Found>>> = Rc::new(RefCell::new(Vec::new()));

    let marked = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("[data-cms-piece]", {
                    let found = Rc::clone(&found);
                    move |el| {
                        mark_slot(el, SlotKind::Piece, PIECE_ATTR, &found);
                        Ok(())
                    }
                }),
                element!("title[data-cms-meta]", {
                    let found = Rc::clone(&found);
                    move |el| {
                        mark_slot(el, SlotKind::Meta, META_ATTR, &found);
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| MarkupError::Rewrite(err.to_string()))?;

    let found = Rc::try_unwrap(found)
        .map(|cell| cell.into_inner())
        .unwrap_or_else(|rc| rc.borrow().clone());

    found
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            let default = slice_between_markers(&marked, index).ok_or_else(|| {
                MarkupError::Unclosed {
                    code: slot.code.clone(),
                }
            })?;
            if default.contains(OPEN_MARKER) {
                return Err(MarkupError::Nested { code: slot.code });
            }
            let default = match slot.kind {
                SlotKind::Piece => default.to_string(),
                SlotKind::Meta => decode_html_entities(default.trim()).into_owned(),
            };
            Ok(Slot {
                kind: slot.kind,
                code: slot.code,
                default,
            })
        })
        .collect()
}

fn mark_slot(el: &mut Element, kind: SlotKind, attr: &str, found: &RefCell<Vec<Found>>) {
    let code = el.get_attribute(attr).unwrap_or_default().trim().to_string();
    let mut found = found.borrow_mut();
    let index = found.len();
    el.prepend(&format!("{OPEN_MARKER}{index}-->"), ContentType::Html);
    el.append(&format!("{CLOSE_MARKER}{index}-->"), ContentType::Html);
    found.push(Found { kind, code });
}

fn slice_between_markers(marked: &str, index: usize) -> Option<&str> {
    let open = format!("{OPEN_MARKER}{index}-->");
    let close = format!("{CLOSE_MARKER}{index}-->");
    let start = marked.find(&open)? + open.len();
    let end = start + marked[start..].find(&close)?;
    Some(&marked[start..end])
}

/// Substitute resolved values into `html`.
///
/// The editable rendering tags each slot with its address so an editor can
/// locate it; the plain rendering strips every `data-cms-*` attribute.
pub fn render(
    html: &str,
    address: &ViewAddress,
    resolved: &ResolvedSlots,
    editable: bool,
) -> Result<String, MarkupError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("[data-cms-piece]", |el| {
                    let code = el.get_attribute(PIECE_ATTR).unwrap_or_default();
                    if let Some(content) = resolved.pieces.get(code.trim()) {
                        el.set_inner_content(content, ContentType::Html);
                    }
                    decorate(el, address, editable)
                }),
                element!("title[data-cms-meta]", |el| {
                    let code = el.get_attribute(META_ATTR).unwrap_or_default();
                    if let Some(fields) = resolved.meta.get(code.trim()) {
                        if let Some(title) = non_empty(&fields.title) {
                            el.set_inner_content(title, ContentType::Text);
                        }
                        let tags = meta_tags(fields);
                        if !tags.is_empty() {
                            el.after(&tags, ContentType::Html);
                        }
                    }
                    decorate(el, address, editable)
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| MarkupError::Rewrite(err.to_string()))
}

fn decorate(
    el: &mut Element,
    address: &ViewAddress,
    editable: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if editable {
        el.set_attribute("data-cms-editable", "true")?;
        el.set_attribute("data-cms-namespace", address.namespace())?;
        el.set_attribute("data-cms-view", address.view())?;
    } else {
        let names: Vec<String> = el
            .attributes()
            .iter()
            .map(|attr| attr.name())
            .filter(|name| name.starts_with(CMS_ATTR_PREFIX))
            .collect();
        for name in names {
            el.remove_attribute(&name);
        }
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn meta_tags(fields: &PageMetaFields) -> String {
    let mut tags = String::new();
    for (name, value) in [
        ("description", &fields.description),
        ("keywords", &fields.keywords),
    ] {
        if let Some(value) = non_empty(value) {
            tags.push_str(&format!(
                "<meta name=\"{name}\" content=\"{}\">",
                encode_double_quoted_attribute(value)
            ));
        }
    }
    tags
}
