//! Control messages: the wire struct, the argument codecs and the generic
//! command set every node understands.

pub mod codec;
pub mod generic;
pub mod types;

use crate::error::{NgError, NgResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const NG_VERSION: u8 = 8;
/// Longest command string, in bytes (the wire field is one byte longer).
pub const NG_CMDSTR_MAX: usize = 31;
const CMDSTR_FIELD: usize = NG_CMDSTR_MAX + 1;
/// Encoded header length.
pub const NG_HEADER_LEN: usize = 24 + CMDSTR_FIELD;

/// Message is a response.
pub const NGF_RESP: u8 = 0x01;
/// Message does not modify the receiving node; it runs as a reader.
pub const NGF_READONLY: u8 = 0x02;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MsgHeader {
    pub version: u8,
    pub flags: u8,
    pub token: u32,
    pub typecookie: u32,
    pub cmd: u32,
    /// Errno carried by a response, zero on success.
    pub error: i32,
    pub cmdstr: String,
}

/// A control message: header plus opaque argument bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NgMesg {
    pub header: MsgHeader,
    pub data: Bytes,
}

fn clip_cmdstr(s: &str) -> String {
    if s.len() <= NG_CMDSTR_MAX {
        return s.to_string();
    }
    let mut end = NG_CMDSTR_MAX;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

impl NgMesg {
    pub fn new(cookie: u32, cmd: u32, cmdstr: &str, data: impl Into<Bytes>) -> Self {
        Self {
            header: MsgHeader {
                version: NG_VERSION,
                flags: 0,
                token: 0,
                typecookie: cookie,
                cmd,
                error: 0,
                cmdstr: clip_cmdstr(cmdstr),
            },
            data: data.into(),
        }
    }

    pub fn empty(cookie: u32, cmd: u32, cmdstr: &str) -> Self {
        Self::new(cookie, cmd, cmdstr, Bytes::new())
    }

    /// Request with `args` in binary argument form.
    pub fn request<T: Serialize>(cookie: u32, cmd: u32, cmdstr: &str, args: &T) -> NgResult<Self> {
        Ok(Self::new(cookie, cmd, cmdstr, bincode::serialize(args)?))
    }

    pub fn readonly(mut self) -> Self {
        self.header.flags |= NGF_READONLY;
        self
    }

    pub fn with_token(mut self, token: u32) -> Self {
        self.header.token = token;
        self
    }

    /// Response to this message: same cookie, command and token.
    pub fn response(&self, data: impl Into<Bytes>, error: i32) -> NgMesg {
        NgMesg {
            header: MsgHeader {
                flags: (self.header.flags & !NGF_READONLY) | NGF_RESP,
                error,
                ..self.header.clone()
            },
            data: data.into(),
        }
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.flags & NGF_RESP != 0
    }

    #[inline]
    pub fn is_readonly(&self) -> bool {
        self.header.flags & NGF_READONLY != 0
    }

    #[inline]
    pub fn cookie(&self) -> u32 {
        self.header.typecookie
    }

    #[inline]
    pub fn cmd(&self) -> u32 {
        self.header.cmd
    }

    pub fn arglen(&self) -> usize {
        self.data.len()
    }

    /// Error carried by a response.
    pub fn error(&self) -> Option<NgError> {
        NgError::from_errno(self.header.error)
    }

    /// Decode the binary arguments.
    pub fn args<T: DeserializeOwned>(&self) -> NgResult<T> {
        Ok(bincode::deserialize(&self.data)?)
    }

    /// Encode in wire form (little endian, fixed header, then arguments).
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(NG_HEADER_LEN + self.data.len());
        buf.put_u8(self.header.version);
        buf.put_u8(self.header.flags);
        buf.put_u16_le(0);
        buf.put_u32_le(self.data.len() as u32);
        buf.put_u32_le(self.header.token);
        buf.put_u32_le(self.header.typecookie);
        buf.put_u32_le(self.header.cmd);
        buf.put_i32_le(self.header.error);
        let mut cmdstr = [0u8; CMDSTR_FIELD];
        let raw = self.header.cmdstr.as_bytes();
        let n = raw.len().min(NG_CMDSTR_MAX);
        cmdstr[..n].copy_from_slice(&raw[..n]);
        buf.put_slice(&cmdstr);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Decode wire form. The argument length must match exactly.
    pub fn from_bytes(raw: &[u8]) -> NgResult<Self> {
        if raw.len() < NG_HEADER_LEN {
            return Err(NgError::Invalid);
        }
        let mut buf = raw;
        let version = buf.get_u8();
        if version != NG_VERSION {
            return Err(NgError::Invalid);
        }
        let flags = buf.get_u8();
        let _reserved = buf.get_u16_le();
        let arglen = buf.get_u32_le() as usize;
        let token = buf.get_u32_le();
        let typecookie = buf.get_u32_le();
        let cmd = buf.get_u32_le();
        let error = buf.get_i32_le();
        let field = &buf[..CMDSTR_FIELD];
        let end = field.iter().position(|b| *b == 0).unwrap_or(NG_CMDSTR_MAX);
        let cmdstr = std::str::from_utf8(&field[..end])
            .map_err(|_| NgError::Invalid)?
            .to_string();
        buf.advance(CMDSTR_FIELD);
        if buf.len() != arglen {
            return Err(NgError::Invalid);
        }

        Ok(Self {
            header: MsgHeader {
                version,
                flags,
                token,
                typecookie,
                cmd,
                error,
                cmdstr,
            },
            data: Bytes::copy_from_slice(buf),
        })
    }
}
