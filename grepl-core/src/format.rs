//! Rendering of descriptors and tabular REPL output.

use std::collections::HashSet;

use colored::*;
use prost_reflect::{
    EnumDescriptor, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct Rendered(pub String);

/// A wrapper to indicate we want to print a message AND all its dependencies
/// recursively (the `desc` command).
pub struct ExpandedMessage(pub MessageDescriptor);

impl std::fmt::Display for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The proto name of a field type, uncolored. Shared with the prompt labels.
pub fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(m) => m.full_name().to_string(),
        Kind::Enum(e) => e.full_name().to_string(),
    }
}

impl From<ServiceDescriptor> for Rendered {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name().green()
        ));

        for method in service.methods() {
            out.push_str("  ");
            out.push_str(&Rendered::from(method).0);
            out.push('\n');
        }
        out.push('}');
        Rendered(out)
    }
}

impl From<MethodDescriptor> for Rendered {
    fn from(method: MethodDescriptor) -> Self {
        let input_stream = if method.is_client_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };
        let output_stream = if method.is_server_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };

        Rendered(format!(
            "{} {}({}{}) {} ({}{});",
            "rpc".cyan(),
            method.name().green(),
            input_stream,
            method.input().full_name().yellow(),
            "returns".cyan(),
            output_stream,
            method.output().full_name().yellow()
        ))
    }
}

impl From<MessageDescriptor> for Rendered {
    fn from(message: MessageDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.name().green()
        ));

        for field in message.fields() {
            if field.is_map() {
                let Kind::Message(entry) = field.kind() else {
                    continue;
                };
                out.push_str(&format!(
                    "  {}<{}, {}> {} = {};\n",
                    "map".cyan(),
                    kind_name(&entry.map_entry_key_field().kind()).yellow(),
                    kind_name(&entry.map_entry_value_field().kind()).yellow(),
                    field.name(),
                    field.number()
                ));
                continue;
            }

            let label = if field.is_list() {
                format!("{} ", "repeated".cyan())
            } else {
                "".to_string()
            };

            out.push_str(&format!(
                "  {}{} {} = {};\n",
                label,
                kind_name(&field.kind()).yellow(),
                field.name(),
                field.number()
            ));
        }
        out.push('}');
        Rendered(out)
    }
}

impl From<EnumDescriptor> for Rendered {
    fn from(enum_desc: EnumDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.name().green()
        ));

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name(),
                val.number().to_string().purple()
            ));
        }
        out.push('}');

        Rendered(out)
    }
}

// Traverses the root message and prints every message/enum type reachable
// through its fields, each exactly once.
impl From<ExpandedMessage> for Rendered {
    fn from(wrapper: ExpandedMessage) -> Self {
        let root = wrapper.0;
        let mut out = String::new();
        let mut visited = HashSet::new();
        let mut queue = vec![root.clone()];

        out.push_str(&Rendered::from(root.clone()).0);
        visited.insert(root.full_name().to_string());

        while let Some(current) = queue.pop() {
            for field in current.fields() {
                match field.kind() {
                    Kind::Message(sub) => {
                        if !sub.is_map_entry() && visited.insert(sub.full_name().to_string()) {
                            out.push_str("\n\n");
                            out.push_str(&Rendered::from(sub.clone()).0);
                            queue.push(sub);
                        }
                    }
                    Kind::Enum(sub) => {
                        if visited.insert(sub.full_name().to_string()) {
                            out.push_str("\n\n");
                            out.push_str(&Rendered::from(sub).0);
                        }
                    }
                    _ => {}
                }
            }
        }

        Rendered(out)
    }
}

/// Renders an ASCII table with a header row:
///
/// ```text
/// +---------+
/// | PACKAGE |
/// +---------+
/// | api     |
/// +---------+
/// ```
pub fn table(columns: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let rule = {
        let mut line = String::from("+");
        for w in &widths {
            line.push_str(&"-".repeat(w + 2));
            line.push('+');
        }
        line
    };

    let render_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (i, width) in widths.iter().copied().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            line.push_str(&format!(" {cell:<width$} |"));
        }
        line
    };

    let header: Vec<String> = columns.iter().map(|c| c.to_uppercase()).collect();
    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&render_row(&header));
    out.push('\n');
    out.push_str(&rule);
    for row in rows {
        out.push('\n');
        out.push_str(&render_row(row));
    }
    out.push('\n');
    out.push_str(&rule);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_cells_to_the_widest() {
        let out = table(
            &["key", "val"],
            &[
                vec!["grpc-client".to_string(), "grepl".to_string()],
                vec!["x".to_string(), "y".to_string()],
            ],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+-------------+-------+");
        assert_eq!(lines[1], "| KEY         | VAL   |");
        assert_eq!(lines[3], "| grpc-client | grepl |");
        assert_eq!(lines[4], "| x           | y     |");
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }
}
