//! Shared fixtures: a hand-built descriptor set for the `api.Example`
//! service, an in-memory echo transport that records every request it
//! sends, and a harness running the REPL against both with scripted input.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use grepl_core::descriptor::{DescriptorSource, FileSource};
use grepl_core::grpc::{
    DynamicTransport, ReplyStream, RequestStream, TransportError, UnaryReply,
};
use grepl_core::prompt::ScriptedPrompt;
use grepl_core::repl::Repl;
use grepl_core::session::Session;
use grepl_core::ui::{SharedBuffer, Ui};
use prost::Message;
use prost_reflect::{DynamicMessage, MethodDescriptor, Value};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions, MethodDescriptorProto,
    OneofDescriptorProto, ServiceDescriptorProto,
    field_descriptor_proto::{Label, Type},
};
use tonic::metadata::{MetadataMap, MetadataValue};

// --- Descriptor set -------------------------------------------------------

fn scalar_field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::Message as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

fn enum_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::Enum as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

fn repeated(mut field: FieldDescriptorProto) -> FieldDescriptorProto {
    field.label = Some(Label::Repeated as i32);
    field
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn method(
    name: &str,
    input: &str,
    output: &str,
    client_streaming: bool,
    server_streaming: bool,
) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

fn example_file() -> FileDescriptorProto {
    let map_request = DescriptorProto {
        name: Some("MapRequest".to_string()),
        field: vec![FieldDescriptorProto {
            name: Some("attrs".to_string()),
            number: Some(1),
            label: Some(Label::Repeated as i32),
            r#type: Some(Type::Message as i32),
            type_name: Some(".api.MapRequest.AttrsEntry".to_string()),
            ..Default::default()
        }],
        nested_type: vec![DescriptorProto {
            name: Some("AttrsEntry".to_string()),
            field: vec![
                scalar_field("key", 1, Type::String),
                scalar_field("value", 2, Type::String),
            ],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    };

    let choice_request = DescriptorProto {
        name: Some("ChoiceRequest".to_string()),
        field: vec![
            FieldDescriptorProto {
                oneof_index: Some(0),
                ..scalar_field("a", 1, Type::String)
            },
            FieldDescriptorProto {
                oneof_index: Some(0),
                ..scalar_field("b", 2, Type::String)
            },
        ],
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("kind".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };

    FileDescriptorProto {
        name: Some("api/example.proto".to_string()),
        package: Some("api".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message("SimpleRequest", vec![scalar_field("name", 1, Type::String)]),
            message(
                "SimpleResponse",
                vec![scalar_field("message", 1, Type::String)],
            ),
            message(
                "PairRequest",
                vec![
                    scalar_field("first", 1, Type::String),
                    scalar_field("last", 2, Type::String),
                ],
            ),
            message(
                "NestedRequest",
                vec![message_field("pair", 1, ".api.PairRequest")],
            ),
            message(
                "RepeatedMessageRequest",
                vec![repeated(message_field("pairs", 1, ".api.PairRequest"))],
            ),
            map_request,
            choice_request,
            message("PaletteRequest", vec![enum_field("color", 1, ".api.Color")]),
            message("BytesRequest", vec![scalar_field("data", 1, Type::Bytes)]),
            message("BytesResponse", vec![scalar_field("data", 1, Type::Bytes)]),
            message(
                "TreeRequest",
                vec![
                    scalar_field("name", 1, Type::String),
                    message_field("child", 2, ".api.TreeRequest"),
                ],
            ),
            message(
                "RepeatedRequest",
                vec![repeated(scalar_field("names", 1, Type::String))],
            ),
        ],
        enum_type: vec![EnumDescriptorProto {
            name: Some("Color".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("RED".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("GREEN".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("BLUE".to_string()),
                    number: Some(2),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        service: vec![ServiceDescriptorProto {
            name: Some("Example".to_string()),
            method: vec![
                method("Unary", ".api.SimpleRequest", ".api.SimpleResponse", false, false),
                method(
                    "ClientStreaming",
                    ".api.SimpleRequest",
                    ".api.SimpleResponse",
                    true,
                    false,
                ),
                method(
                    "ServerStreaming",
                    ".api.SimpleRequest",
                    ".api.SimpleResponse",
                    false,
                    true,
                ),
                method(
                    "BidiStreaming",
                    ".api.SimpleRequest",
                    ".api.SimpleResponse",
                    true,
                    true,
                ),
                method(
                    "UnaryMessage",
                    ".api.NestedRequest",
                    ".api.SimpleResponse",
                    false,
                    false,
                ),
                method(
                    "UnaryRepeatedMessage",
                    ".api.RepeatedMessageRequest",
                    ".api.SimpleResponse",
                    false,
                    false,
                ),
                method("UnaryMap", ".api.MapRequest", ".api.SimpleResponse", false, false),
                method(
                    "UnaryOneof",
                    ".api.ChoiceRequest",
                    ".api.SimpleResponse",
                    false,
                    false,
                ),
                method(
                    "UnaryEnum",
                    ".api.PaletteRequest",
                    ".api.SimpleResponse",
                    false,
                    false,
                ),
                method("UnaryBytes", ".api.BytesRequest", ".api.BytesResponse", false, false),
                method("UnarySelf", ".api.TreeRequest", ".api.SimpleResponse", false, false),
                method(
                    "UnaryRepeated",
                    ".api.RepeatedRequest",
                    ".api.SimpleResponse",
                    false,
                    false,
                ),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn standalone_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("standalone.proto".to_string()),
        package: None,
        syntax: Some("proto3".to_string()),
        message_type: vec![message("Blank", vec![])],
        service: vec![ServiceDescriptorProto {
            name: Some("Standalone".to_string()),
            method: vec![method("Ping", ".Blank", ".Blank", false, false)],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn descriptor_set_bytes() -> Vec<u8> {
    FileDescriptorSet {
        file: vec![example_file(), standalone_file()],
    }
    .encode_to_vec()
}

// --- Echo transport -------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: String,
    pub message: DynamicMessage,
}

/// A transport that echoes requests back and records everything it sent.
#[derive(Default)]
pub struct EchoTransport {
    pub sent: Arc<Mutex<Vec<SentRequest>>>,
}

impl EchoTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, method: &MethodDescriptor, message: &DynamicMessage) {
        self.sent.lock().unwrap().push(SentRequest {
            method: method.full_name().to_string(),
            message: message.clone(),
        });
    }
}

fn reply_headers() -> MetadataMap {
    let mut headers = MetadataMap::new();
    headers.insert("x-echo", MetadataValue::from_static("roger"));
    headers
}

fn request_name(request: &DynamicMessage) -> String {
    request
        .get_field_by_name("name")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn reply_for(method: &MethodDescriptor, request: &DynamicMessage, text: String) -> DynamicMessage {
    let output = method.output();
    let mut reply = DynamicMessage::new(output.clone());
    if let Some(field) = output.get_field_by_name("data") {
        if let Some(value) = request.get_field_by_name("data") {
            reply.set_field(&field, value.into_owned());
        }
    } else if let Some(field) = output.get_field_by_name("message") {
        reply.set_field(&field, Value::String(text));
    }
    reply
}

#[tonic::async_trait]
impl DynamicTransport for EchoTransport {
    async fn unary(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        _headers: Vec<(String, String)>,
    ) -> Result<UnaryReply, TransportError> {
        self.record(method, &request);
        let text = format!("hi {}", request_name(&request));
        Ok(UnaryReply {
            headers: reply_headers(),
            message: reply_for(method, &request, text),
            trailers: MetadataMap::new(),
        })
    }

    async fn server_streaming(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        _headers: Vec<(String, String)>,
    ) -> Result<ReplyStream, TransportError> {
        self.record(method, &request);
        let name = request_name(&request);
        let replies: Vec<Result<DynamicMessage, tonic::Status>> = (0..3)
            .map(|i| Ok(reply_for(method, &request, format!("{name} - seq {i}"))))
            .collect();
        Ok(ReplyStream {
            headers: reply_headers(),
            messages: futures_util::stream::iter(replies).boxed(),
        })
    }

    async fn client_streaming(
        &mut self,
        method: &MethodDescriptor,
        mut requests: RequestStream,
        _headers: Vec<(String, String)>,
    ) -> Result<UnaryReply, TransportError> {
        let mut names = Vec::new();
        let mut last = DynamicMessage::new(method.input());
        while let Some(message) = requests.next().await {
            self.record(method, &message);
            names.push(request_name(&message));
            last = message;
        }
        let text = format!("hi {}", names.join(", "));
        Ok(UnaryReply {
            headers: reply_headers(),
            message: reply_for(method, &last, text),
            trailers: MetadataMap::new(),
        })
    }

    async fn bidi_streaming(
        &mut self,
        method: &MethodDescriptor,
        requests: RequestStream,
        _headers: Vec<(String, String)>,
    ) -> Result<ReplyStream, TransportError> {
        let sent = self.sent.clone();
        let method = method.clone();
        let messages = requests
            .map(move |message| {
                sent.lock().unwrap().push(SentRequest {
                    method: method.full_name().to_string(),
                    message: message.clone(),
                });
                let text = format!("echo: {}", request_name(&message));
                Ok(reply_for(&method, &message, text))
            })
            .boxed();
        Ok(ReplyStream {
            headers: reply_headers(),
            messages,
        })
    }
}

// --- REPL harness ---------------------------------------------------------

pub struct ReplRun {
    pub code: i32,
    pub out: SharedBuffer,
    pub err: SharedBuffer,
    pub sent: Arc<Mutex<Vec<SentRequest>>>,
}

impl ReplRun {
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn out(&self) -> String {
        self.out.contents()
    }

    pub fn err(&self) -> String {
        self.err.contents()
    }
}

/// Runs a full REPL session over the example schema with scripted input.
pub async fn run_repl(prompt: ScriptedPrompt) -> ReplRun {
    let (ui, out, err) = Ui::buffered();
    let source = DescriptorSource::Files(FileSource::from_bytes(&descriptor_set_bytes()).unwrap());
    let transport = EchoTransport::new();
    let sent = transport.sent.clone();

    let mut repl = Repl::new(source, transport, Session::new(), prompt, ui);
    let code = repl.run().await;

    ReplRun {
        code,
        out,
        err,
        sent,
    }
}
