//! # Schema-driven message elicitation
//!
//! [`MessageFiller`] walks a message descriptor field by field and asks the
//! operator for each value through a [`Prompt`]. Nested messages recurse,
//! repeated and map fields loop until end-of-input, enums and oneofs present
//! numbered menus.
//!
//! ## Cancellation
//!
//! The two prompt signals unwind differently. An **interrupt** unwinds
//! exactly one logical frame: inside a repeated or map field it ends the
//! collection, inside a nested message it skips that message's remaining
//! fields (the partial value stays set), and at the root it accepts what was
//! collected so far. **End-of-input** means "no more elements" and travels
//! up to the nearest collection boundary; at a streaming root it ends the
//! whole stream, which is how the call dispatcher knows to close-send.
//!
//! ## Cycles
//!
//! A message may reference its own type. Descending is automatic by default,
//! but a field whose type already appears on the ancestor chain always asks
//! for consent first; `dig_manually` makes every singular message field ask.

use std::collections::{HashMap, HashSet};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use prost::bytes::Bytes;
use prost_reflect::{
    DynamicMessage, EnumDescriptor, FieldDescriptor, Kind, MapKey, MessageDescriptor,
    OneofDescriptor, ReflectMessage, Value,
};

use crate::format::kind_name;
use crate::prompt::{Prompt, PromptSignal};

/// How input to a `bytes` field is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BytesFormat {
    /// base64, falling back to the quoted-literal interpretation.
    #[default]
    Auto,
    /// base64 only.
    Base64,
    /// A quoted string literal with `\uXXXX`, `\xNN` and C-style escapes.
    QuotedLiterals,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FillOptions {
    /// When set, an empty line on a singular scalar emits the zero value;
    /// otherwise the field is omitted from the outgoing message entirely.
    pub emit_defaults: bool,
    /// Ask before descending into every singular message field.
    pub dig_manually: bool,
    pub bytes: BytesFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("failed to decode bytes input: {0}")]
    BytesDecode(String),
}

/// Outcome of eliciting one message in a streaming context.
#[derive(Debug)]
pub enum StreamItem {
    Message(DynamicMessage),
    /// End-of-input: no more messages, close the sending side.
    End,
    /// Interrupt at the outer prompt: cancel the call.
    Cancel,
}

enum Stop {
    Interrupt,
    Eof,
    Failed(FillError),
}

impl From<PromptSignal> for Stop {
    fn from(signal: PromptSignal) -> Self {
        match signal {
            PromptSignal::Interrupt => Stop::Interrupt,
            PromptSignal::Eof => Stop::Eof,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootMode {
    Unary,
    Stream,
}

/// The recursive prompt engine.
pub struct MessageFiller<'a, P: Prompt> {
    prompt: &'a mut P,
    opts: FillOptions,
    path: Vec<String>,
    ancestors: Vec<String>,
    answered: usize,
}

impl<'a, P: Prompt> MessageFiller<'a, P> {
    pub fn new(prompt: &'a mut P, opts: FillOptions) -> Self {
        Self {
            prompt,
            opts,
            path: Vec::new(),
            ancestors: Vec::new(),
            answered: 0,
        }
    }

    /// Elicits one request for a unary or server-streaming call. Interrupt
    /// and end-of-input accept the partially filled message.
    pub fn fill_unary(&mut self, desc: &MessageDescriptor) -> Result<DynamicMessage, FillError> {
        let mut msg = self.start(desc);
        match self.fill_fields(&mut msg, Some(RootMode::Unary)) {
            Ok(()) | Err(Stop::Interrupt) | Err(Stop::Eof) => Ok(msg),
            Err(Stop::Failed(err)) => Err(err),
        }
    }

    /// Elicits the next request of a client-streaming or bidi call.
    pub fn fill_stream_item(
        &mut self,
        desc: &MessageDescriptor,
    ) -> Result<StreamItem, FillError> {
        let mut msg = self.start(desc);
        match self.fill_fields(&mut msg, Some(RootMode::Stream)) {
            Ok(()) => Ok(StreamItem::Message(msg)),
            Err(Stop::Eof) => Ok(StreamItem::End),
            Err(Stop::Interrupt) => Ok(StreamItem::Cancel),
            Err(Stop::Failed(err)) => Err(err),
        }
    }

    fn start(&mut self, desc: &MessageDescriptor) -> DynamicMessage {
        self.path.clear();
        self.ancestors = vec![desc.full_name().to_string()];
        self.answered = 0;
        DynamicMessage::new(desc.clone())
    }

    fn fill_fields(
        &mut self,
        msg: &mut DynamicMessage,
        root: Option<RootMode>,
    ) -> Result<(), Stop> {
        let desc = msg.descriptor();
        let mut handled_oneofs: HashSet<String> = HashSet::new();

        for field in desc.fields() {
            let result = match field.containing_oneof() {
                Some(oneof) if !synthetic_oneof(&oneof) => {
                    if !handled_oneofs.insert(oneof.name().to_string()) {
                        continue;
                    }
                    self.fill_oneof(msg, &oneof)
                }
                _ => self.fill_field(msg, &field),
            };

            match result {
                Ok(()) => {}
                Err(Stop::Interrupt) => {
                    // Unwind one frame: at a streaming root before anything
                    // was typed this is an outer-prompt interrupt, which the
                    // dispatcher turns into a call cancellation.
                    if root == Some(RootMode::Stream) && self.answered == 0 {
                        return Err(Stop::Interrupt);
                    }
                    break;
                }
                Err(Stop::Eof) if root == Some(RootMode::Unary) => break,
                Err(stop) => return Err(stop),
            }
        }
        Ok(())
    }

    fn fill_field(&mut self, msg: &mut DynamicMessage, field: &FieldDescriptor) -> Result<(), Stop> {
        if field.is_map() {
            return self.fill_map(msg, field);
        }
        if field.is_list() {
            return self.fill_list(msg, field);
        }

        match field.kind() {
            Kind::Message(inner) => self.fill_nested(msg, field, inner),
            Kind::Enum(inner) => {
                let value = self.read_enum(field.name(), &inner)?;
                msg.set_field(field, value);
                Ok(())
            }
            Kind::Bytes => {
                if let Some(value) = self.read_bytes(field.name(), false)? {
                    msg.set_field(field, value);
                }
                Ok(())
            }
            kind => {
                if let Some(value) = self.read_scalar(field.name(), &kind, false)? {
                    msg.set_field(field, value);
                }
                Ok(())
            }
        }
    }

    /// Presents the branches of a oneof and elicits the chosen one. Setting
    /// the chosen field clears any sibling branch.
    fn fill_oneof(
        &mut self,
        msg: &mut DynamicMessage,
        oneof: &OneofDescriptor,
    ) -> Result<(), Stop> {
        let branches: Vec<FieldDescriptor> = oneof.fields().collect();
        let options: Vec<String> = branches.iter().map(|f| f.name().to_string()).collect();
        let label = format!("{} (oneof)", self.label_for(oneof.name()));
        let choice = self.read_select(&label, &options)?;
        self.fill_field(msg, &branches[choice])
    }

    fn fill_nested(
        &mut self,
        msg: &mut DynamicMessage,
        field: &FieldDescriptor,
        inner: MessageDescriptor,
    ) -> Result<(), Stop> {
        let cyclic = self.ancestors.iter().any(|a| a == inner.full_name());
        if self.opts.dig_manually || cyclic {
            let label = format!("{} ({})", self.label_for(field.name()), inner.full_name());
            let options = ["dig down".to_string(), "skip".to_string()];
            if self.read_select(&label, &options)? == 1 {
                return Ok(());
            }
        }

        let mut child = DynamicMessage::new(inner.clone());
        self.path.push(field.name().to_string());
        self.ancestors.push(inner.full_name().to_string());
        let result = self.fill_fields(&mut child, None);
        self.ancestors.pop();
        self.path.pop();

        match result {
            Ok(()) => {
                msg.set_field(field, Value::Message(child));
                Ok(())
            }
            Err(Stop::Eof) => {
                msg.set_field(field, Value::Message(child));
                Err(Stop::Eof)
            }
            Err(stop) => Err(stop),
        }
    }

    fn fill_list(&mut self, msg: &mut DynamicMessage, field: &FieldDescriptor) -> Result<(), Stop> {
        let mut items = Vec::new();
        let mut index = 0usize;

        loop {
            let label = format!("{}[{index}]", field.name());
            match self.fill_single(&label, &field.kind()) {
                Ok(value) => {
                    items.push(value);
                    index += 1;
                }
                Err(Stop::Interrupt) | Err(Stop::Eof) => break,
                Err(stop) => return Err(stop),
            }
        }

        msg.set_field(field, Value::List(items));
        Ok(())
    }

    fn fill_map(&mut self, msg: &mut DynamicMessage, field: &FieldDescriptor) -> Result<(), Stop> {
        let Kind::Message(entry) = field.kind() else {
            return Ok(());
        };
        let key_kind = entry.map_entry_key_field().kind();
        let value_kind = entry.map_entry_value_field().kind();
        let mut map = HashMap::new();

        loop {
            let key = match self.read_scalar(&format!("{}::key", field.name()), &key_kind, true) {
                Ok(value) => value.unwrap_or_else(|| zero_value(&key_kind)),
                Err(Stop::Interrupt) | Err(Stop::Eof) => break,
                Err(stop) => return Err(stop),
            };
            let value = match self.fill_single(&format!("{}::value", field.name()), &value_kind) {
                Ok(value) => value,
                Err(Stop::Interrupt) | Err(Stop::Eof) => break,
                Err(stop) => return Err(stop),
            };
            if let Some(key) = to_map_key(key) {
                map.insert(key, value);
            }
        }

        msg.set_field(field, Value::Map(map));
        Ok(())
    }

    /// One element of a collection (or a map value): collections always emit
    /// a value, so an empty line yields the zero value.
    fn fill_single(&mut self, label: &str, kind: &Kind) -> Result<Value, Stop> {
        match kind {
            Kind::Message(inner) => {
                let mut child = DynamicMessage::new(inner.clone());
                self.path.push(label.to_string());
                self.ancestors.push(inner.full_name().to_string());
                let result = self.fill_fields(&mut child, None);
                self.ancestors.pop();
                self.path.pop();
                result.map(|()| Value::Message(child))
            }
            Kind::Enum(inner) => self.read_enum(label, inner),
            Kind::Bytes => Ok(self
                .read_bytes(label, true)?
                .unwrap_or_else(|| zero_value(&Kind::Bytes))),
            kind => Ok(self
                .read_scalar(label, kind, true)?
                .unwrap_or_else(|| zero_value(kind))),
        }
    }

    fn read_enum(&mut self, name: &str, desc: &EnumDescriptor) -> Result<Value, Stop> {
        let values: Vec<_> = desc.values().collect();
        let options: Vec<String> = values.iter().map(|v| v.name().to_string()).collect();
        let label = format!("{} ({})", self.label_for(name), desc.full_name());
        let choice = self.read_select(&label, &options)?;
        Ok(Value::EnumNumber(values[choice].number()))
    }

    fn read_bytes(&mut self, name: &str, force_default: bool) -> Result<Option<Value>, Stop> {
        let label = format!("{} (bytes) => ", self.label_for(name));
        let line = self.read_line(&label)?;
        if line.is_empty() {
            if force_default || self.opts.emit_defaults {
                return Ok(Some(Value::Bytes(Bytes::new())));
            }
            return Ok(None);
        }
        let decoded = decode_bytes(&line, self.opts.bytes).map_err(Stop::Failed)?;
        Ok(Some(Value::Bytes(decoded)))
    }

    fn read_scalar(
        &mut self,
        name: &str,
        kind: &Kind,
        force_default: bool,
    ) -> Result<Option<Value>, Stop> {
        let label = format!("{} ({}) => ", self.label_for(name), kind_name(kind));
        loop {
            let line = self.read_line(&label)?;
            if line.is_empty() {
                if force_default || self.opts.emit_defaults {
                    return Ok(Some(zero_value(kind)));
                }
                return Ok(None);
            }
            // Unparsable input re-prompts, like an out-of-range menu index.
            if let Some(value) = parse_scalar(kind, &line) {
                return Ok(Some(value));
            }
        }
    }

    fn read_line(&mut self, label: &str) -> Result<String, Stop> {
        let line = self.prompt.input(label).map_err(Stop::from)?;
        self.answered += 1;
        Ok(line)
    }

    fn read_select(&mut self, label: &str, options: &[String]) -> Result<usize, Stop> {
        let choice = self.prompt.select(label, options).map_err(Stop::from)?;
        self.answered += 1;
        Ok(choice)
    }

    fn label_for(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.path.join("::"), name)
        }
    }
}

// proto3 `optional` fields are wrapped in a synthetic single-member oneof
// whose name starts with an underscore; those are plain fields, not menus.
fn synthetic_oneof(oneof: &OneofDescriptor) -> bool {
    oneof.name().starts_with('_')
}

fn parse_scalar(kind: &Kind, input: &str) -> Option<Value> {
    let trimmed = input.trim();
    match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => trimmed.parse().ok().map(Value::I32),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => trimmed.parse().ok().map(Value::I64),
        Kind::Uint32 | Kind::Fixed32 => trimmed.parse().ok().map(Value::U32),
        Kind::Uint64 | Kind::Fixed64 => trimmed.parse().ok().map(Value::U64),
        Kind::Float => trimmed.parse().ok().map(Value::F32),
        Kind::Double => trimmed.parse().ok().map(Value::F64),
        Kind::Bool => trimmed.parse().ok().map(Value::Bool),
        Kind::String => Some(Value::String(input.to_string())),
        Kind::Bytes | Kind::Message(_) | Kind::Enum(_) => None,
    }
}

fn zero_value(kind: &Kind) -> Value {
    match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(0),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Value::I64(0),
        Kind::Uint32 | Kind::Fixed32 => Value::U32(0),
        Kind::Uint64 | Kind::Fixed64 => Value::U64(0),
        Kind::Float => Value::F32(0.0),
        Kind::Double => Value::F64(0.0),
        Kind::Bool => Value::Bool(false),
        Kind::String => Value::String(String::new()),
        Kind::Bytes => Value::Bytes(Bytes::new()),
        Kind::Enum(_) => Value::EnumNumber(0),
        Kind::Message(desc) => Value::Message(DynamicMessage::new(desc.clone())),
    }
}

fn to_map_key(value: Value) -> Option<MapKey> {
    match value {
        Value::Bool(v) => Some(MapKey::Bool(v)),
        Value::I32(v) => Some(MapKey::I32(v)),
        Value::I64(v) => Some(MapKey::I64(v)),
        Value::U32(v) => Some(MapKey::U32(v)),
        Value::U64(v) => Some(MapKey::U64(v)),
        Value::String(v) => Some(MapKey::String(v)),
        _ => None,
    }
}

fn decode_bytes(input: &str, format: BytesFormat) -> Result<Bytes, FillError> {
    match format {
        BytesFormat::Base64 => BASE64
            .decode(input)
            .map(Bytes::from)
            .map_err(|e| FillError::BytesDecode(format!("invalid base64: {e}"))),
        BytesFormat::QuotedLiterals => unescape_quoted(input)
            .map_err(|e| FillError::BytesDecode(format!("invalid quoted literal: {e}"))),
        BytesFormat::Auto => BASE64.decode(input).map(Bytes::from).or_else(|_| {
            unescape_quoted(input)
                .map_err(|e| FillError::BytesDecode(format!("invalid quoted literal: {e}")))
        }),
    }
}

/// Interprets a quoted string literal: `\uXXXX` escapes become the UTF-8
/// encoding of the code point, `\xNN` a raw byte, and the usual C escapes
/// their single character. Everything else passes through as UTF-8.
fn unescape_quoted(input: &str) -> Result<Bytes, String> {
    let mut out = Vec::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('u') => {
                let hex: String = (&mut chars).take(4).collect();
                if hex.len() != 4 {
                    return Err(format!("truncated \\u escape '\\u{hex}'"));
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| format!("invalid \\u escape '\\u{hex}'"))?;
                let c = char::from_u32(code)
                    .ok_or_else(|| format!("\\u{hex} is not a valid code point"))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            Some('x') => {
                let hex: String = (&mut chars).take(2).collect();
                if hex.len() != 2 {
                    return Err(format!("truncated \\x escape '\\x{hex}'"));
                }
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|_| format!("invalid \\x escape '\\x{hex}'"))?;
                out.push(byte);
            }
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('"') => out.push(b'"'),
            Some('\'') => out.push(b'\''),
            Some(other) => return Err(format!("unknown escape '\\{other}'")),
            None => return Err("dangling backslash".to_string()),
        }
    }

    Ok(Bytes::from(out))
}
