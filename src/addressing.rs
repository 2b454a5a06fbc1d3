//! Item addressing for Microsoft Graph drive requests.
//!
//! A drive item can be addressed either by its opaque identifier or by a
//! path relative to the drive root. Path addressing uses the bracketed
//! `root:/<path>:` syntax dictated by the Graph protocol; identifiers are
//! passed through untouched.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Sentinel identifier for a drive's root folder.
pub const ROOT_ITEM_ID: &str = "root";

/// Characters escaped inside one path segment of an item reference.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

/// Build the item reference for a path relative to the drive root.
///
/// Leading and trailing slashes are tolerated; an empty path addresses the
/// root itself.
///
/// # Examples
///
/// ```
/// use graph_drive::addressing::root_path_ref;
///
/// assert_eq!(root_path_ref("A/B/report.pdf"), "root:/A/B/report.pdf:");
/// assert_eq!(root_path_ref(""), "root");
/// ```
pub fn root_path_ref(path: &str) -> String {
    let encoded = encode_path(path);
    if encoded.is_empty() {
        ROOT_ITEM_ID.to_string()
    } else {
        format!("root:/{encoded}:")
    }
}

/// Build the item reference for a named child of an identified folder.
///
/// # Examples
///
/// ```
/// use graph_drive::addressing::child_name_ref;
///
/// assert_eq!(child_name_ref("F1", "notes.txt"), "F1:/notes.txt:");
/// ```
pub fn child_name_ref(parent_id: &str, name: &str) -> String {
    format!("{}:/{}:", parent_id, utf8_percent_encode(name, SEGMENT))
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
