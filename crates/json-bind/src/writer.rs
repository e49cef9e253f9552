//! `JsonWriter` — the bundled token sink.
//!
//! [`ObjectWriter`] and [`ArrayWriter`] are push-mode visitors that append
//! compact JSON text to a shared buffer, so any event producer (the reader,
//! tree replay, spec replay) can be pointed at a writer to serialize.

use crate::error::BindError;
use crate::value::Value;
use crate::visitor::{ArrayVisitor, ObjectVisitor, VisitResult, VisitorMode};

#[derive(Default)]
pub struct JsonWriter {
    out: String,
}

impl JsonWriter {
    pub fn new() -> Self {
        JsonWriter { out: String::new() }
    }

    /// Sink for one object document.
    pub fn object_visitor(&mut self) -> ObjectWriter<'_> {
        ObjectWriter {
            out: &mut self.out,
            first: true,
        }
    }

    /// Sink for one array document.
    pub fn array_visitor(&mut self) -> ArrayWriter<'_> {
        ArrayWriter {
            out: &mut self.out,
            first: true,
        }
    }

    /// Appends one scalar, for documents whose root is not a container.
    pub fn scalar(&mut self, value: &Value) {
        write_scalar(&mut self.out, value);
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

pub struct ObjectWriter<'a> {
    out: &'a mut String,
    first: bool,
}

impl ObjectWriter<'_> {
    fn member_prefix(&mut self, name: &str) {
        if !self.first {
            self.out.push(',');
        }
        self.first = false;
        write_string(self.out, name);
        self.out.push(':');
    }
}

impl ObjectVisitor for ObjectWriter<'_> {
    fn visit_start_object(&mut self) -> VisitorMode {
        self.out.push('{');
        VisitorMode::Push
    }

    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        self.member_prefix(name);
        Ok(Some(Box::new(ObjectWriter {
            out: &mut *self.out,
            first: true,
        })))
    }

    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        self.member_prefix(name);
        Ok(Some(Box::new(ArrayWriter {
            out: &mut *self.out,
            first: true,
        })))
    }

    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
        self.member_prefix(name);
        write_scalar(self.out, &value);
        Ok(None)
    }

    fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
        self.out.push('}');
        Ok(None)
    }
}

pub struct ArrayWriter<'a> {
    out: &'a mut String,
    first: bool,
}

impl ArrayWriter<'_> {
    fn element_prefix(&mut self) {
        if !self.first {
            self.out.push(',');
        }
        self.first = false;
    }
}

impl ArrayVisitor for ArrayWriter<'_> {
    fn visit_start_array(&mut self) -> VisitorMode {
        self.out.push('[');
        VisitorMode::Push
    }

    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        self.element_prefix();
        Ok(Some(Box::new(ObjectWriter {
            out: &mut *self.out,
            first: true,
        })))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        self.element_prefix();
        Ok(Some(Box::new(ArrayWriter {
            out: &mut *self.out,
            first: true,
        })))
    }

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        self.element_prefix();
        write_scalar(self.out, &value);
        Ok(None)
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        self.out.push(']');
        Ok(None)
    }
}

fn write_scalar(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::I32(i) => out.push_str(&i.to_string()),
        Value::I64(i) => out.push_str(&i.to_string()),
        Value::F32(f) => out.push_str(&format_float32(*f)),
        Value::F64(f) => out.push_str(&format_float(*f)),
        Value::Str(s) => write_string(out, s),
        // No JSON form of its own; the captured repr serializes as a string.
        Value::Opaque(op) => write_string(out, op.repr()),
    }
}

/// Write a JSON-encoded string (with escaping).
fn write_string(out: &mut String, s: &str) {
    // Fast path: pure ASCII printable, no quotes or backslash
    let mut has_special = false;
    for &b in s.as_bytes() {
        if b < 32 || b > 126 || b == b'"' || b == b'\\' {
            has_special = true;
            break;
        }
    }
    if !has_special {
        out.push('"');
        out.push_str(s);
        out.push('"');
        return;
    }
    // Fall back to serde_json for proper escaping
    let json_str = serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
    out.push_str(&json_str);
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "null".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "1e308".to_string()
        } else {
            "-1e308".to_string()
        }
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        // Rust's default float repr is the shortest round-trip representation
        format!("{}", f)
    }
}

fn format_float32(f: f32) -> String {
    if f.is_nan() {
        "null".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "1e308".to_string()
        } else {
            "-1e308".to_string()
        }
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::JsonReader;
    use crate::value::OpaqueValue;

    fn rewrite(text: &str) -> String {
        let mut writer = JsonWriter::new();
        let mut reader = JsonReader::new(text);
        if text.trim_start().starts_with('[') {
            let mut sink = writer.array_visitor();
            reader.read_array(&mut sink).unwrap();
        } else {
            let mut sink = writer.object_visitor();
            reader.read_object(&mut sink).unwrap();
        }
        writer.into_string()
    }

    #[test]
    fn rewrites_compact_and_in_order() {
        let out = rewrite(r#"{ "b": 1, "a": { "x": [true, null, "s"] }, "c": [] }"#);
        assert_eq!(out, r#"{"b":1,"a":{"x":[true,null,"s"]},"c":[]}"#);
    }

    #[test]
    fn output_reparses_identically() {
        let text = r#"{ "name": "café \"quoted\"", "n": [1, 2.5, -3], "ok": false }"#;
        let out = rewrite(text);
        let a: serde_json::Value = serde_json::from_str(text).unwrap();
        let b: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(2.0), "2");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(f64::NAN), "null");
        assert_eq!(format_float(f64::INFINITY), "1e308");
        assert_eq!(format_float(f64::NEG_INFINITY), "-1e308");
        assert_eq!(format_float(1e16), "10000000000000000");
    }

    #[test]
    fn opaque_values_serialize_their_repr() {
        let mut out = String::new();
        write_scalar(&mut out, &Value::Opaque(OpaqueValue::with_repr(0u8, "PENDING")));
        assert_eq!(out, r#""PENDING""#);
    }

    #[test]
    fn string_escaping_falls_back_for_specials() {
        let mut out = String::new();
        write_string(&mut out, "a\"b\\c\nd");
        assert_eq!(out, r#""a\"b\\c\nd""#);
    }
}
