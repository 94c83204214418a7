//! Document to text format, two-space indented, one field per line.

use super::escape::escape;
use crate::document::{Document, Message, Value};

pub fn print(document: &Document) -> String {
    let mut out = String::new();
    write_message(&mut out, document.root(), 0);
    out
}

fn write_message(out: &mut String, message: &Message, depth: usize) {
    for field in message.fields() {
        indent(out, depth);
        match &field.value {
            Value::Message(inner) => {
                out.push_str(&field.name);
                out.push_str(" {\n");
                write_message(out, inner, depth + 1);
                indent(out, depth);
                out.push_str("}\n");
            }
            Value::String(s) => {
                out.push_str(&format!("{}: \"{}\"\n", field.name, escape(s)));
            }
            Value::Int(n) => {
                out.push_str(&format!("{}: {}\n", field.name, n));
            }
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}
