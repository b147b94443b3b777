//! KML reading (roxmltree) and writing for splash containers.
//!
//! Elements are matched by local name only, so `kml/2.1`, `opengis 2.2` and un-namespaced
//! files all read the same way.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::ops::Range;

use roxmltree::{Document, Node};

use crate::container::tile::{TileName, base_name};
use crate::document::model::{Metadata, MetadataKey, SplashDocument};
use crate::document::redact::Redactor;
use crate::foundation::error::{SplashError, SplashResult};
use crate::foundation::geo::BoundingBox;

pub(crate) const KML_NAMESPACE: &str = "http://earth.google.com/kml/2.1";
const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
pub(crate) const CLOAK_FOLDER: &str = "Visibility cloak";
pub(crate) const VIEWER_SNIPPET: &str = "position of viewer";
const OVERLAY_COLOR: &str = "90ffffff";

/// A `GroundOverlay` as declared in the KML, before its image is looked up.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct OverlayRef {
    pub(crate) name: Option<String>,
    pub(crate) href: Option<String>,
    pub(crate) bounding_box: Option<BoundingBox>,
}

impl OverlayRef {
    pub(crate) fn label(&self, idx: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.href.as_deref().map(|h| base_name(h).to_string()))
            .unwrap_or_else(|| format!("overlay[{idx}]"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct ParsedDocument {
    pub(crate) metadata: Metadata,
    pub(crate) overlays: Vec<OverlayRef>,
    /// Entry folders found in the `Document > Folder > Folder` layout of a combined container.
    pub(crate) nested_entries: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ParsedEntry {
    pub(crate) name: Option<String>,
    pub(crate) metadata: Metadata,
    pub(crate) overlays: Vec<OverlayRef>,
}

#[derive(Debug, Default)]
pub(crate) struct ParsedGroup {
    pub(crate) name: String,
    pub(crate) entries: Vec<ParsedEntry>,
}

#[derive(Debug, Default)]
pub(crate) struct ParsedCombined {
    pub(crate) name: String,
    pub(crate) groups: Vec<ParsedGroup>,
}

fn parse(text: &str) -> SplashResult<Document<'_>> {
    Document::parse(text).map_err(|e| SplashError::corrupt_container(format!("malformed KML: {e}")))
}

fn is(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn children<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |n| is(n, name))
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> Option<Node<'a, 'i>> {
    children(node, name).next()
}

fn descendant<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> Option<Node<'a, 'i>> {
    node.descendants().find(|n| is(n, name))
}

/// Trimmed text content (CDATA included); `None` when blank.
fn text_of(node: Node<'_, '_>) -> Option<String> {
    let text = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn child_text(node: Node<'_, '_>, name: &'static str) -> Option<String> {
    child(node, name).and_then(text_of)
}

/// The `Document` element, or the root when a file has none.
fn document_scope<'a, 'i>(doc: &'a Document<'i>) -> Node<'a, 'i> {
    descendant(doc.root_element(), "Document").unwrap_or_else(|| doc.root_element())
}

fn folder_name(folder: Node<'_, '_>) -> Option<String> {
    child_text(folder, "name")
}

fn is_cloak_folder(node: &Node<'_, '_>) -> bool {
    is(node, "Folder") && folder_name(*node).as_deref() == Some(CLOAK_FOLDER)
}

/// The observer placemark: a `Placemark` with a `Point` whose snippet marks it as the viewer.
///
/// Other placemarks are ordinary map features and never count as identifying.
fn viewer_placemark<'a, 'i>(scope: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    scope.descendants().find(|n| {
        is(n, "Placemark")
            && child(*n, "Point").is_some()
            && child_text(*n, "Snippet").as_deref() == Some(VIEWER_SNIPPET)
    })
}

/// A metadata field together with the element that carries it.
struct Field<'a, 'i> {
    key: MetadataKey,
    value: Option<String>,
    node: Node<'a, 'i>,
}

fn metadata_fields<'a, 'i>(scope: Node<'a, 'i>) -> Vec<Field<'a, 'i>> {
    let mut out = Vec::new();
    if let Some(node) = child(scope, "name") {
        out.push(Field {
            key: MetadataKey::Title,
            value: text_of(node),
            node,
        });
    }
    if let Some(node) = descendant(scope, "author") {
        out.push(Field {
            key: MetadataKey::Owner,
            value: child_text(node, "name").or_else(|| text_of(node)),
            node,
        });
    }
    if let Some(node) = descendant(scope, "address") {
        out.push(Field {
            key: MetadataKey::Address,
            value: text_of(node),
            node,
        });
    }
    if let Some(node) = child(scope, "description") {
        out.push(Field {
            key: MetadataKey::Description,
            value: text_of(node),
            node,
        });
    }
    if let Some(pm) = viewer_placemark(scope) {
        out.push(Field {
            key: MetadataKey::ObserverName,
            value: child_text(pm, "name"),
            node: pm,
        });
        out.push(Field {
            key: MetadataKey::ObserverPosition,
            value: child(pm, "Point").and_then(|p| child_text(p, "coordinates")),
            node: pm,
        });
    }
    out
}

fn metadata_of(scope: Node<'_, '_>) -> Metadata {
    metadata_fields(scope)
        .into_iter()
        .filter_map(|f| f.value.map(|v| (f.key, v)))
        .collect()
}

fn lat_lon_box(overlay: Node<'_, '_>) -> Option<BoundingBox> {
    let b = child(overlay, "LatLonBox")?;
    let edge = |name| child_text(b, name).and_then(|t| t.parse::<f64>().ok());
    Some(BoundingBox::new(
        edge("north")?,
        edge("south")?,
        edge("east")?,
        edge("west")?,
    ))
}

fn overlay_ref(overlay: Node<'_, '_>) -> OverlayRef {
    let name = child_text(overlay, "name");
    let href = child(overlay, "Icon").and_then(|icon| child_text(icon, "href"));
    let bounding_box = lat_lon_box(overlay)
        .or_else(|| name.as_deref().and_then(TileName::parse).map(|t| t.bounding_box()))
        .or_else(|| {
            href.as_deref()
                .and_then(|h| TileName::parse(base_name(h)))
                .map(|t| t.bounding_box())
        });
    OverlayRef {
        name,
        href,
        bounding_box,
    }
}

fn overlays_under(node: Node<'_, '_>) -> Vec<OverlayRef> {
    node.descendants()
        .filter(|n| is(n, "GroundOverlay"))
        .map(overlay_ref)
        .collect()
}

/// Metadata and overlays of a single-document KML.
pub(crate) fn parse_document(text: &str) -> SplashResult<ParsedDocument> {
    let doc = parse(text)?;
    let scope = document_scope(&doc);
    Ok(ParsedDocument {
        metadata: metadata_of(scope),
        overlays: overlays_under(scope),
        nested_entries: nested_entry_count(scope),
    })
}

fn entry_folders<'a, 'i>(group: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    children(group, "Folder").filter(|f| !is_cloak_folder(f))
}

fn nested_entry_count(scope: Node<'_, '_>) -> usize {
    entry_folders(scope).map(|g| entry_folders(g).count()).sum()
}

fn parse_entry(scope: Node<'_, '_>) -> ParsedEntry {
    let overlays = match children(scope, "Folder").find(is_cloak_folder) {
        Some(cloak) => overlays_under(cloak),
        None => overlays_under(scope),
    };
    ParsedEntry {
        name: folder_name(scope),
        metadata: metadata_of(scope),
        overlays,
    }
}

/// `Document > Folder (group) > Folder (entry)`.
///
/// A group folder without entry folders is itself an entry; a document without group
/// folders is a single group holding one entry.
pub(crate) fn parse_combined(text: &str) -> SplashResult<ParsedCombined> {
    let doc = parse(text)?;
    let scope = document_scope(&doc);
    let name = folder_name(scope).unwrap_or_default();

    let group_folders = entry_folders(scope).collect::<Vec<_>>();
    if group_folders.is_empty() {
        return Ok(ParsedCombined {
            groups: vec![ParsedGroup {
                name: name.clone(),
                entries: vec![parse_entry(scope)],
            }],
            name,
        });
    }

    let groups = group_folders
        .into_iter()
        .enumerate()
        .map(|(idx, group)| {
            let nested = entry_folders(group).collect::<Vec<_>>();
            let entries = if nested.is_empty() {
                vec![parse_entry(group)]
            } else {
                nested.into_iter().map(parse_entry).collect()
            };
            ParsedGroup {
                name: folder_name(group).unwrap_or_else(|| format!("group-{}", idx + 1)),
                entries,
            }
        })
        .collect();
    Ok(ParsedCombined { name, groups })
}

/// Byte ranges of the elements holding the metadata `redactor` removes, one per element.
pub(crate) fn identifying_ranges(text: &str, redactor: &Redactor) -> SplashResult<Vec<Range<usize>>> {
    let doc = parse(text)?;
    let scope = document_scope(&doc);
    let mut ranges = metadata_fields(scope)
        .into_iter()
        .filter(|f| redactor.redacts(f.key))
        .map(|f| f.node.range())
        .collect::<Vec<_>>();
    ranges.sort_by_key(|r| (r.start, r.end));
    ranges.dedup();
    Ok(ranges)
}

/// Remove `ranges` from `text`, together with the indentation and line break they leave behind.
pub(crate) fn cut_ranges(text: &str, ranges: &[Range<usize>]) -> String {
    let bytes = text.as_bytes();
    let mut widened = ranges
        .iter()
        .map(|r| {
            let mut start = r.start;
            while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
                start -= 1;
            }
            if start > 0 && bytes[start - 1] == b'\n' {
                start -= 1;
                if start > 0 && bytes[start - 1] == b'\r' {
                    start -= 1;
                }
            }
            start..r.end
        })
        .collect::<Vec<_>>();
    widened.sort_by_key(|r| r.start);

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for r in widened {
        if r.start > pos {
            out.push_str(&text[pos..r.start]);
        }
        pos = pos.max(r.end);
    }
    out.push_str(&text[pos..]);
    out
}

fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Indented KML text builder.
struct KmlWriter {
    out: String,
    depth: usize,
}

impl KmlWriter {
    fn new() -> Self {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            out,
            "<kml xmlns=\"{KML_NAMESPACE}\" xmlns:atom=\"{ATOM_NAMESPACE}\">"
        );
        Self { out, depth: 0 }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        let _ = writeln!(self.out, "<{tag}>");
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        let _ = writeln!(self.out, "</{tag}>");
    }

    fn leaf(&mut self, tag: &str, text: &str) {
        self.indent();
        let _ = writeln!(self.out, "<{tag}>{}</{tag}>", escape(text));
    }

    fn finish(mut self) -> String {
        self.out.push_str("</kml>\n");
        self.out
    }

    fn ground_overlay(&mut self, bbox: &BoundingBox, href: &str) {
        let name = TileName::from_bounding_box(bbox)
            .map(|t| t.to_string())
            .unwrap_or_else(|| base_name(href).to_string());
        self.open("GroundOverlay");
        self.leaf("name", &name);
        self.leaf("visibility", "1");
        self.leaf("drawOrder", "0");
        self.leaf("color", OVERLAY_COLOR);
        self.open("Icon");
        self.leaf("href", href);
        self.close("Icon");
        self.open("LatLonBox");
        self.leaf("north", &bbox.north.to_string());
        self.leaf("south", &bbox.south.to_string());
        self.leaf("east", &bbox.east.to_string());
        self.leaf("west", &bbox.west.to_string());
        self.leaf("rotation", "0");
        self.close("LatLonBox");
        self.close("GroundOverlay");
    }

    fn cloak_folder(&mut self, bbox: &BoundingBox, href: &str) {
        self.open("Folder");
        self.leaf("name", CLOAK_FOLDER);
        self.leaf("open", "1");
        self.ground_overlay(bbox, href);
        self.close("Folder");
    }

    /// Name, identifying metadata, viewer placemark and overlay folder of one document.
    fn body(&mut self, name: &str, doc: &SplashDocument, href: &str) {
        let meta = |key| doc.metadata.get(&key).map(String::as_str);
        self.leaf("name", name);
        self.leaf("visibility", "1");
        self.leaf("open", "0");
        if let Some(owner) = meta(MetadataKey::Owner) {
            self.open("atom:author");
            self.leaf("atom:name", owner);
            self.close("atom:author");
        }
        if let Some(address) = meta(MetadataKey::Address) {
            self.leaf("address", address);
        }
        if let Some(description) = meta(MetadataKey::Description) {
            self.leaf("description", description);
        }
        let observer = meta(MetadataKey::ObserverName);
        let position = meta(MetadataKey::ObserverPosition);
        if observer.is_some() || position.is_some() {
            self.open("Placemark");
            if let Some(observer) = observer {
                self.leaf("name", observer);
            }
            self.leaf("Snippet", VIEWER_SNIPPET);
            self.open("Point");
            self.leaf("altitudeMode", "relativeToGround");
            self.leaf("coordinates", position.unwrap_or_default());
            self.close("Point");
            self.close("Placemark");
        }
        self.cloak_folder(&doc.bounding_box, href);
    }
}

/// KML of one splash document whose overlay image is stored at `href`.
pub(crate) fn document_kml(doc: &SplashDocument, href: &str) -> String {
    let mut w = KmlWriter::new();
    w.open("Document");
    w.body(doc.title(), doc, href);
    w.close("Document");
    w.finish()
}

/// KML of a merge result: a title and one overlay, nothing identifying.
pub(crate) fn composite_kml(title: &str, bbox: &BoundingBox, href: &str) -> String {
    let mut w = KmlWriter::new();
    w.open("Document");
    w.leaf("name", title);
    w.leaf("visibility", "1");
    w.leaf("open", "0");
    w.cloak_folder(bbox, href);
    w.close("Document");
    w.finish()
}

/// KML nesting every `(document, href)` as an entry folder, named by document id, inside one
/// group folder.
pub(crate) fn combined_kml(group: &str, entries: &[(&SplashDocument, String)]) -> String {
    let mut w = KmlWriter::new();
    w.open("Document");
    w.leaf("name", group);
    w.leaf("open", "1");
    w.open("Folder");
    w.leaf("name", group);
    for (doc, href) in entries {
        w.open("Folder");
        w.body(&doc.id, doc, href);
        w.close("Folder");
    }
    w.close("Folder");
    w.close("Document");
    w.finish()
}

#[cfg(test)]
#[path = "../../tests/unit/container/kml.rs"]
mod tests;
