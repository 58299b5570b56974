//! The wire message: `version | receiver | sender | header | payload*`.

use crate::error::CodecError;
use bytes::Bytes;
use std::cell::RefCell;

/// Current protocol version. Messages with a higher version are rejected.
pub const PROTOCOL_VERSION: u8 = 0;

/// Splits `full` on its rightmost `.` into `(namespace, name)`. When no dot
/// is present the namespace is `default`.
pub fn split_name(full: &str, default_namespace: &str) -> (String, String) {
    match full.rsplit_once('.') {
        Some((ns, name)) => (ns.to_string(), name.to_string()),
        None => (default_namespace.to_string(), full.to_string()),
    }
}

/// Splits `header` on its last `;` into `(conversation_id, message_id)`.
/// A missing or malformed separator yields two empty strings.
pub fn parse_header(header: &str) -> (String, String) {
    match header.rsplit_once(';') {
        Some((conversation_id, message_id)) => (conversation_id.to_string(), message_id.to_string()),
        None => (String::new(), String::new()),
    }
}

pub fn join_header(conversation_id: &str, message_id: &str) -> String {
    format!("{conversation_id};{message_id}")
}

#[derive(Default)]
struct SplitCache {
    receiver: Option<(String, String)>,
    sender: Option<(String, String)>,
    header: Option<(String, String)>,
}

/// An addressable wire message, with lazily computed and cached split
/// results for `receiver`, `sender` and `header`. Any setter invalidates the
/// corresponding cache entry.
pub struct Message {
    pub version: u8,
    receiver: String,
    sender: String,
    header: String,
    pub payload: Vec<Bytes>,
    cache: RefCell<SplitCache>,
}

impl Message {
    pub fn new(receiver: impl Into<String>, sender: impl Into<String>, header: impl Into<String>) -> Self {
        Message {
            version: PROTOCOL_VERSION,
            receiver: receiver.into(),
            sender: sender.into(),
            header: header.into(),
            payload: Vec::new(),
            cache: RefCell::new(SplitCache::default()),
        }
    }

    pub fn with_payload(mut self, payload: Vec<Bytes>) -> Self {
        self.payload = payload;
        self
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn set_receiver(&mut self, receiver: impl Into<String>) {
        self.receiver = receiver.into();
        self.cache.borrow_mut().receiver = None;
    }

    pub fn set_sender(&mut self, sender: impl Into<String>) {
        self.sender = sender.into();
        self.cache.borrow_mut().sender = None;
    }

    pub fn set_header(&mut self, header: impl Into<String>) {
        self.header = header.into();
        self.cache.borrow_mut().header = None;
    }

    /// `(namespace, name)` of the receiver, under `default_namespace`.
    pub fn receiver_parts(&self, default_namespace: &str) -> (String, String) {
        if let Some(parts) = &self.cache.borrow().receiver {
            return parts.clone();
        }
        let parts = split_name(&self.receiver, default_namespace);
        self.cache.borrow_mut().receiver = Some(parts.clone());
        parts
    }

    /// `(namespace, name)` of the sender, under `default_namespace`.
    pub fn sender_parts(&self, default_namespace: &str) -> (String, String) {
        if let Some(parts) = &self.cache.borrow().sender {
            return parts.clone();
        }
        let parts = split_name(&self.sender, default_namespace);
        self.cache.borrow_mut().sender = Some(parts.clone());
        parts
    }

    /// `(conversation_id, message_id)` of the header.
    pub fn header_parts(&self) -> (String, String) {
        if let Some(parts) = &self.cache.borrow().header {
            return parts.clone();
        }
        let parts = parse_header(&self.header);
        self.cache.borrow_mut().header = Some(parts.clone());
        parts
    }

    /// Encodes this message to its wire frames. Fails if `sender` is blank.
    pub fn encode(&self) -> Result<Vec<Bytes>, CodecError> {
        if self.sender.is_empty() {
            return Err(CodecError::EmptySender);
        }
        let mut frames = vec![
            Bytes::copy_from_slice(&[self.version]),
            Bytes::from(self.receiver.clone()),
            Bytes::from(self.sender.clone()),
            Bytes::from(self.header.clone()),
        ];
        frames.extend(self.payload.iter().cloned());
        Ok(frames)
    }

    /// Decodes a message from its wire frames.
    pub fn decode(frames: &[Bytes]) -> Result<Message, CodecError> {
        if frames.len() < 4 {
            return Err(CodecError::Malformed);
        }
        let version = *frames[0].first().ok_or(CodecError::Malformed)?;
        if version > PROTOCOL_VERSION {
            return Err(CodecError::VersionTooNew);
        }
        let receiver = String::from_utf8_lossy(&frames[1]).into_owned();
        let sender = String::from_utf8_lossy(&frames[2]).into_owned();
        let header = String::from_utf8_lossy(&frames[3]).into_owned();
        let payload = frames[4..].to_vec();
        Ok(Message {
            version,
            receiver,
            sender,
            header,
            payload,
            cache: RefCell::new(SplitCache::default()),
        })
    }
}
