//! Command verbs and the `[verb, ...args]` wire encoding.
//!
//! Verbs are short string tags on the wire (§6). We decode them into a
//! tagged enum once at the edge and dispatch on the enum from then on,
//! rather than re-matching on strings throughout the router (§9: "do not
//! use string-reflection").

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    SignIn,
    SignOut,
    CoSignIn,
    CoSignOut,
    Ping,
    Get,
    Set,
    Call,
    Off,
    Clear,
    Log,
    List,
    Save,
    Acknowledge,
    Error,
}

impl Verb {
    /// The tag this Coordinator emits for this verb.
    pub fn tag(&self) -> &'static str {
        match self {
            Verb::SignIn => "SI",
            Verb::SignOut => "D",
            Verb::CoSignIn => "COS",
            Verb::CoSignOut => "COD",
            Verb::Ping => "P",
            Verb::Get => "G",
            Verb::Set => "S",
            Verb::Call => "C",
            Verb::Off => "O",
            Verb::Clear => "X",
            Verb::Log => "L",
            Verb::List => "?",
            Verb::Save => "V",
            Verb::Acknowledge => "A",
            Verb::Error => "E",
        }
    }

    /// Parses a wire tag into a verb. `DISCONNECT` is accepted as a legacy
    /// alias for `SignOut` (§9); this Coordinator never emits it.
    pub fn from_tag(tag: &str) -> Option<Verb> {
        Some(match tag {
            "SI" => Verb::SignIn,
            "D" | "DISCONNECT" => Verb::SignOut,
            "COS" => Verb::CoSignIn,
            "COD" => Verb::CoSignOut,
            "P" => Verb::Ping,
            "G" => Verb::Get,
            "S" => Verb::Set,
            "C" => Verb::Call,
            "O" => Verb::Off,
            "X" => Verb::Clear,
            "L" => Verb::Log,
            "?" => Verb::List,
            "V" => Verb::Save,
            "A" => Verb::Acknowledge,
            "E" => Verb::Error,
            _ => return None,
        })
    }
}

/// One sub-command: `[verb, ...args]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub verb: Verb,
    pub args: Vec<Value>,
}

impl Command {
    pub fn new(verb: Verb, args: Vec<Value>) -> Self {
        Command { verb, args }
    }

    pub fn bare(verb: Verb) -> Self {
        Command::new(verb, Vec::new())
    }

    pub fn acknowledge(detail: Option<Value>) -> Self {
        Command::new(Verb::Acknowledge, detail.into_iter().collect())
    }

    pub fn error(text: &str) -> Self {
        Command::new(Verb::Error, vec![Value::String(text.to_string())])
    }
}

impl Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(1 + self.args.len()))?;
        seq.serialize_element(self.verb.tag())?;
        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut elements = Vec::<Value>::deserialize(deserializer)?;
        if elements.is_empty() {
            return Err(D::Error::custom("command array is empty"));
        }
        let tag = elements
            .remove(0)
            .as_str()
            .ok_or_else(|| D::Error::custom("command tag is not a string"))?
            .to_string();
        let verb = Verb::from_tag(&tag).ok_or_else(|| D::Error::custom(format!("unknown verb tag {tag:?}")))?;
        Ok(Command { verb, args: elements })
    }
}

/// Serializes a batch of commands as the JSON payload carried in
/// `payload[0]` of a [`crate::message::Message`].
pub fn serialize_data(commands: &[Command]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(commands)
}

/// Deserializes `payload[0]` bytes into a batch of commands.
pub fn deserialize_data(bytes: &[u8]) -> serde_json::Result<Vec<Command>> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_round_trips() {
        let commands = vec![Command::bare(Verb::SignIn)];
        let bytes = serialize_data(&commands).unwrap();
        assert_eq!(bytes, br#"[["SI"]]"#);
        let decoded = deserialize_data(&bytes).unwrap();
        assert_eq!(decoded, commands);
    }

    #[test]
    fn error_with_text_round_trips() {
        let commands = vec![Command::error("The name is already taken.")];
        let bytes = serialize_data(&commands).unwrap();
        let decoded = deserialize_data(&bytes).unwrap();
        assert_eq!(decoded, commands);
    }

    #[test]
    fn legacy_disconnect_alias_decodes_to_sign_out() {
        let decoded = deserialize_data(br#"[["DISCONNECT"]]"#).unwrap();
        assert_eq!(decoded, vec![Command::bare(Verb::SignOut)]);
        assert_eq!(Command::bare(Verb::SignOut).verb.tag(), "D");
    }

    #[test]
    fn unknown_verb_fails_to_decode() {
        assert!(deserialize_data(br#"[["ZZ"]]"#).is_err());
    }

    #[test]
    fn rejects_empty_command_array() {
        assert!(deserialize_data(br#"[[]]"#).is_err());
    }
}
