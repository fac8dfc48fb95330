//! Argument and reply payloads of the generic commands.

use serde::{Deserialize, Serialize};

/// `mkpeer`: create a node of `type_name` and connect `ourhook` to its `peerhook`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MkPeer {
    #[serde(rename = "type")]
    pub type_name: String,
    pub ourhook: String,
    pub peerhook: String,
}

/// `connect`: pair `ourhook` with a new hook `peerhook` on the node at `path`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Connect {
    pub path: String,
    pub ourhook: String,
    pub peerhook: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Name {
    pub name: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RmHook {
    pub ourhook: String,
}

/// Summary of one node. `name` is empty for unnamed nodes.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: u32,
    pub hooks: u32,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub ourhook: String,
    pub peerhook: String,
    pub nodeinfo: NodeInfo,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct HookList {
    pub nodeinfo: NodeInfo,
    pub links: Vec<LinkInfo>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NameList {
    pub nodes: Vec<NodeInfo>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub type_name: String,
    pub numnodes: u32,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TypeList {
    pub types: Vec<TypeInfo>,
}
