//! Argument schemas and ASCII/binary conversion.
//!
//! Binary arguments are bincode, the ASCII form is JSON text. A command is
//! found by name when going from ASCII and by (cookie, cmd) the other way;
//! the receiving node's type list is searched before the generic one.

use crate::error::{NgError, NgResult};
use crate::msg::NgMesg;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Converts one argument type between its two forms.
#[derive(Copy, Clone)]
pub struct ArgCodec {
    to_ascii: fn(&[u8]) -> NgResult<String>,
    to_binary: fn(&str) -> NgResult<Vec<u8>>,
}

fn binary_to_text<T: Serialize + DeserializeOwned>(raw: &[u8]) -> NgResult<String> {
    let value: T = bincode::deserialize(raw)?;
    Ok(serde_json::to_string(&value)?)
}

fn text_to_binary<T: Serialize + DeserializeOwned>(text: &str) -> NgResult<Vec<u8>> {
    let value: T = serde_json::from_str(text)?;
    Ok(bincode::serialize(&value)?)
}

impl ArgCodec {
    pub const fn of<T: Serialize + DeserializeOwned>() -> Self {
        Self {
            to_ascii: binary_to_text::<T>,
            to_binary: text_to_binary::<T>,
        }
    }

    pub fn to_ascii(&self, raw: &[u8]) -> NgResult<String> {
        (self.to_ascii)(raw)
    }

    pub fn to_binary(&self, text: &str) -> NgResult<Vec<u8>> {
        (self.to_binary)(text)
    }
}

impl std::fmt::Debug for ArgCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ArgCodec")
    }
}

/// Schema entry of one command. `None` codecs mean "no arguments".
#[derive(Debug, Copy, Clone)]
pub struct CmdDesc {
    pub cookie: u32,
    pub cmd: u32,
    pub name: &'static str,
    pub request: Option<ArgCodec>,
    pub response: Option<ArgCodec>,
}

impl CmdDesc {
    fn codec_for(&self, msg: &NgMesg) -> Option<&ArgCodec> {
        if msg.is_response() {
            self.response.as_ref()
        } else {
            self.request.as_ref()
        }
    }
}

pub fn find_by_name<'a>(lists: &[&'a [CmdDesc]], name: &str) -> Option<&'a CmdDesc> {
    lists
        .iter()
        .flat_map(|list| list.iter())
        .find(|d| d.name == name)
}

pub fn find_by_cmd<'a>(lists: &[&'a [CmdDesc]], cookie: u32, cmd: u32) -> Option<&'a CmdDesc> {
    lists
        .iter()
        .flat_map(|list| list.iter())
        .find(|d| d.cookie == cookie && d.cmd == cmd)
}

/// Binary message to its ASCII form: `cmdstr` names the command, the
/// arguments become JSON text.
pub fn binary_to_ascii(msg: &NgMesg, lists: &[&[CmdDesc]]) -> NgResult<NgMesg> {
    let desc = find_by_cmd(lists, msg.cookie(), msg.cmd()).ok_or(NgError::NotFound)?;
    let text = match desc.codec_for(msg) {
        Some(codec) => codec.to_ascii(&msg.data)?,
        None if msg.data.is_empty() => String::new(),
        None => return Err(NgError::Invalid),
    };

    let mut out = msg.clone();
    out.header.cmdstr = desc.name.to_string();
    out.data = Bytes::from(text.into_bytes());
    Ok(out)
}

/// ASCII message to binary: the command is looked up by `cmdstr`, which
/// fills in cookie and command number.
pub fn ascii_to_binary(msg: &NgMesg, lists: &[&[CmdDesc]]) -> NgResult<NgMesg> {
    let desc = find_by_name(lists, &msg.header.cmdstr).ok_or(NgError::NotFound)?;
    let text = std::str::from_utf8(&msg.data).map_err(|_| NgError::Invalid)?;
    let raw = match desc.codec_for(msg) {
        Some(codec) => codec.to_binary(text)?,
        None if text.trim().is_empty() => Vec::new(),
        None => return Err(NgError::Invalid),
    };

    let mut out = msg.clone();
    out.header.typecookie = desc.cookie;
    out.header.cmd = desc.cmd;
    out.data = Bytes::from(raw);
    Ok(out)
}
