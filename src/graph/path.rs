//! Textual addresses: `NODE:HOOK.HOOK...`.
//!
//! `NODE` is a node name, `.` for the sending node, or `[hexid]`. Without a
//! colon the whole string is a hook path relative to the sending node. One
//! leading and one trailing `.` of the hook path are ignored, so `.` alone
//! and `name:` both address a node itself.

use crate::error::{NgError, NgResult};
use crate::graph::node::NodeId;
use crate::graph::valid_name;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NodeAddr<'a> {
    /// The node the path is resolved from.
    Here,
    Id(NodeId),
    Name(&'a str),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedPath<'a> {
    pub node: NodeAddr<'a>,
    /// Hooks to traverse, in order. Empty addresses the node itself.
    pub hooks: Vec<&'a str>,
}

/// `[hex]` to a node id. Zero is never a valid id.
pub fn decode_id(s: &str) -> Option<NodeId> {
    let inner = s.strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() || inner.len() > 8 || !inner.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match u32::from_str_radix(inner, 16) {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(NodeId(id)),
    }
}

/// Node part of a path: `.`, `[hexid]`, or a name.
pub fn parse_node_addr(s: &str) -> NgResult<NodeAddr<'_>> {
    if s == "." {
        return Ok(NodeAddr::Here);
    }
    if s.starts_with('[') {
        return decode_id(s).map(NodeAddr::Id).ok_or(NgError::Invalid);
    }
    if valid_name(s) && !s.contains(['[', ']']) {
        Ok(NodeAddr::Name(s))
    } else {
        Err(NgError::Invalid)
    }
}

pub fn parse_path(path: &str) -> NgResult<ParsedPath<'_>> {
    if path.is_empty() {
        return Err(NgError::Invalid);
    }

    let (node, hooks) = match path.find(':') {
        Some(pos) => {
            let node_part = &path[..pos];
            if node_part.is_empty() {
                return Err(NgError::Invalid);
            }
            (parse_node_addr(node_part)?, &path[pos + 1..])
        }
        None => (NodeAddr::Here, path),
    };

    let hooks = hooks.strip_prefix('.').unwrap_or(hooks);
    let hooks = hooks.strip_suffix('.').unwrap_or(hooks);

    if hooks.is_empty() {
        return Ok(ParsedPath {
            node,
            hooks: Vec::new(),
        });
    }

    let segments: Vec<&str> = hooks.split('.').collect();
    if segments.iter().any(|s| !valid_name(s)) {
        return Err(NgError::Invalid);
    }

    Ok(ParsedPath {
        node,
        hooks: segments,
    })
}

/// A node name must also not be mistaken for an id or a path.
pub fn valid_node_name(name: &str) -> bool {
    valid_name(name) && !name.contains(['[', ']']) && decode_id(name).is_none()
}
