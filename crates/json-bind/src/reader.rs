//! `JsonReader` — the bundled token source.
//!
//! A byte-walking parser over the full input that drives a visitor tree.
//! Push visitors get eager per-event calls; a `PullInside` array visitor gets
//! a lazy [`ElementSource`] instead, and elements it never pulls are skipped
//! at the byte level without being decoded; [`JsonReader::stream_array`]
//! exposes a top-level array as a pull iterator.
//!
//! `scalars_decoded` counts every scalar actually materialized into a
//! [`Value`], which makes "skipped input is never decoded" observable.

use crate::error::BindError;
use crate::value::Value;
use crate::visitor::{ArrayVisitor, ElementSource, ObjectVisitor, VisitResult, VisitorMode};

pub struct JsonReader {
    data: Vec<u8>,
    x: usize,
    scalars_decoded: usize,
}

impl JsonReader {
    pub fn new(input: &str) -> Self {
        JsonReader {
            data: input.as_bytes().to_vec(),
            x: 0,
            scalars_decoded: 0,
        }
    }

    /// Number of scalar values materialized so far.
    pub fn scalars_decoded(&self) -> usize {
        self.scalars_decoded
    }

    /// Parses one `{...}` document, driving `visitor` in push mode.
    pub fn read_object(&mut self, visitor: &mut dyn ObjectVisitor) -> Result<VisitResult, BindError> {
        self.skip_whitespace();
        if self.peek()? != b'{' {
            return Err(BindError::Syntax(self.x));
        }
        let result = self.drive_object(visitor)?;
        self.expect_end()?;
        Ok(result)
    }

    /// Parses one `[...]` document, driving `visitor` in push or pull-inside
    /// mode according to its declaration.
    pub fn read_array(&mut self, visitor: &mut dyn ArrayVisitor) -> Result<VisitResult, BindError> {
        self.skip_whitespace();
        if self.peek()? != b'[' {
            return Err(BindError::Syntax(self.x));
        }
        let result = self.drive_array(visitor)?;
        self.expect_end()?;
        Ok(result)
    }

    /// Opens a top-level `[...]` document as a pull cursor.
    ///
    /// `visitor` must declare [`VisitorMode::Pull`]. Each call to
    /// [`ArrayStream::next`] decodes exactly one element through the visitor;
    /// dropping the stream abandons the rest of the input unread.
    pub fn stream_array<V: ArrayVisitor>(mut self, mut visitor: V) -> Result<ArrayStream<V>, BindError> {
        self.skip_whitespace();
        if self.peek()? != b'[' {
            return Err(BindError::Syntax(self.x));
        }
        self.x += 1;
        let mode = visitor.visit_start_array();
        if mode != VisitorMode::Pull {
            return Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Pull,
            });
        }
        Ok(ArrayStream {
            reader: self,
            visitor,
            first: true,
            done: false,
        })
    }

    /// Parses a document whose root is a single scalar.
    pub(crate) fn read_scalar_document(&mut self) -> Result<Value, BindError> {
        self.skip_whitespace();
        let value = self.read_scalar()?;
        self.expect_end()?;
        Ok(value)
    }

    fn peek(&self) -> Result<u8, BindError> {
        self.data.get(self.x).copied().ok_or(BindError::Eof)
    }

    fn skip_whitespace(&mut self) {
        while self.x < self.data.len() {
            match self.data[self.x] {
                b' ' | b'\t' | b'\n' | b'\r' => self.x += 1,
                _ => break,
            }
        }
    }

    fn expect_end(&mut self) -> Result<(), BindError> {
        self.skip_whitespace();
        if self.x < self.data.len() {
            return Err(BindError::Syntax(self.x));
        }
        Ok(())
    }

    // Cursor sits on '{'. Consumes through the matching '}'.
    fn drive_object(&mut self, visitor: &mut dyn ObjectVisitor) -> Result<VisitResult, BindError> {
        self.x += 1;
        let mode = visitor.visit_start_object();
        if mode != VisitorMode::Push {
            return Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Push,
            });
        }
        let mut first = true;
        loop {
            self.skip_whitespace();
            let ch = self.peek()?;
            if ch == b'}' {
                self.x += 1;
                return visitor.visit_end_object();
            }
            if ch == b',' {
                if first {
                    return Err(BindError::Syntax(self.x));
                }
                self.x += 1;
                self.skip_whitespace();
            } else if !first {
                return Err(BindError::Syntax(self.x));
            }
            first = false;
            let name = self.read_str()?;
            self.skip_whitespace();
            if self.peek()? != b':' {
                return Err(BindError::Syntax(self.x));
            }
            self.x += 1;
            self.skip_whitespace();
            match self.peek()? {
                b'{' => match visitor.visit_member_object(&name)? {
                    Some(mut child) => {
                        self.drive_object(&mut child)?;
                    }
                    None => self.skip_value()?,
                },
                b'[' => match visitor.visit_member_array(&name)? {
                    Some(mut child) => {
                        self.drive_array(&mut child)?;
                    }
                    None => self.skip_value()?,
                },
                _ => {
                    let value = self.read_scalar()?;
                    visitor.visit_member_value(&name, value)?;
                }
            }
        }
    }

    // Cursor sits on '['. Consumes through the matching ']'.
    fn drive_array(&mut self, visitor: &mut dyn ArrayVisitor) -> Result<VisitResult, BindError> {
        self.x += 1;
        match visitor.visit_start_array() {
            VisitorMode::Push => {
                let mut first = true;
                while self.step_element(&mut first, visitor)?.is_some() {}
                visitor.visit_end_array()
            }
            VisitorMode::PullInside => {
                let mut first = true;
                let mut exhausted = false;
                let result = {
                    let mut elements = Elements {
                        reader: self,
                        first: &mut first,
                        exhausted: &mut exhausted,
                    };
                    visitor.visit_stream(&mut elements)?
                };
                if !exhausted {
                    while self.begin_element(&mut first)? {
                        self.skip_value()?;
                    }
                }
                Ok(result)
            }
            mode @ VisitorMode::Pull => Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Push,
            }),
        }
    }

    /// Positions the cursor at the start of the next element, consuming the
    /// separator. `Ok(false)` means the closing `]` was consumed instead.
    fn begin_element(&mut self, first: &mut bool) -> Result<bool, BindError> {
        self.skip_whitespace();
        let ch = self.peek()?;
        if ch == b']' {
            self.x += 1;
            return Ok(false);
        }
        if ch == b',' {
            if *first {
                return Err(BindError::Syntax(self.x));
            }
            self.x += 1;
            self.skip_whitespace();
        } else if !*first {
            return Err(BindError::Syntax(self.x));
        }
        *first = false;
        Ok(true)
    }

    /// Decodes exactly one array element into `sink`, or consumes the closing
    /// `]` and returns `None`. Shared by push drives, pull-inside sources and
    /// top-level pull streams.
    fn step_element(
        &mut self,
        first: &mut bool,
        sink: &mut dyn ArrayVisitor,
    ) -> Result<Option<VisitResult>, BindError> {
        if !self.begin_element(first)? {
            return Ok(None);
        }
        match self.peek()? {
            b'{' => match sink.visit_object()? {
                Some(mut child) => {
                    let result = self.drive_object(&mut child)?;
                    Ok(Some(result))
                }
                None => {
                    self.skip_value()?;
                    Ok(Some(None))
                }
            },
            b'[' => match sink.visit_array()? {
                Some(mut child) => {
                    let result = self.drive_array(&mut child)?;
                    Ok(Some(result))
                }
                None => {
                    self.skip_value()?;
                    Ok(Some(None))
                }
            },
            _ => {
                let value = self.read_scalar()?;
                let result = sink.visit_value(value)?;
                Ok(Some(result))
            }
        }
    }

    fn read_scalar(&mut self) -> Result<Value, BindError> {
        let value = match self.peek()? {
            b'"' => Value::Str(self.read_str()?),
            b'n' => {
                self.expect_literal(b"null")?;
                Value::Null
            }
            b't' => {
                self.expect_literal(b"true")?;
                Value::Bool(true)
            }
            b'f' => {
                self.expect_literal(b"false")?;
                Value::Bool(false)
            }
            c if c == b'-' || c.is_ascii_digit() => self.read_num()?,
            _ => return Err(BindError::Syntax(self.x)),
        };
        self.scalars_decoded += 1;
        Ok(value)
    }

    fn expect_literal(&mut self, lit: &[u8]) -> Result<(), BindError> {
        if self.x + lit.len() > self.data.len() || &self.data[self.x..self.x + lit.len()] != lit {
            return Err(BindError::Syntax(self.x));
        }
        self.x += lit.len();
        Ok(())
    }

    fn read_num(&mut self) -> Result<Value, BindError> {
        let start = self.x;
        let data = &self.data;
        let len = data.len();
        let mut x = self.x;
        if x < len && data[x] == b'-' {
            x += 1;
        }
        while x < len && data[x].is_ascii_digit() {
            x += 1;
        }
        let mut is_float = false;
        if x < len && data[x] == b'.' {
            is_float = true;
            x += 1;
            while x < len && data[x].is_ascii_digit() {
                x += 1;
            }
        }
        if x < len && (data[x] == b'e' || data[x] == b'E') {
            is_float = true;
            x += 1;
            if x < len && (data[x] == b'+' || data[x] == b'-') {
                x += 1;
            }
            while x < len && data[x].is_ascii_digit() {
                x += 1;
            }
        }
        self.x = x;
        let s = std::str::from_utf8(&data[start..x]).map_err(|_| BindError::InvalidUtf8)?;
        if is_float {
            let f: f64 = s.parse().map_err(|_| BindError::Syntax(start))?;
            Ok(Value::F64(f))
        } else if let Ok(i) = s.parse::<i64>() {
            if let Ok(i) = i32::try_from(i) {
                Ok(Value::I32(i))
            } else {
                Ok(Value::I64(i))
            }
        } else if let Ok(f) = s.parse::<f64>() {
            // Integer literal past the i64 range; only a float form exists.
            Ok(Value::F64(f))
        } else {
            Err(BindError::Syntax(start))
        }
    }

    fn read_str(&mut self) -> Result<String, BindError> {
        if self.peek()? != b'"' {
            return Err(BindError::Syntax(self.x));
        }
        self.x += 1; // skip opening quote
        let x0 = self.x;
        let x1 = find_ending_quote(&self.data, x0)?;
        let s = decode_json_string(&self.data[x0..x1], x0)?;
        self.x = x1 + 1; // skip closing quote
        Ok(s)
    }

    // Byte-level skip of one complete value; nothing is materialized.
    fn skip_value(&mut self) -> Result<(), BindError> {
        self.skip_whitespace();
        match self.peek()? {
            b'"' => self.skip_string(),
            b'{' => self.skip_delimited(b'{', b'}'),
            b'[' => self.skip_delimited(b'[', b']'),
            b'n' => self.expect_literal(b"null"),
            b't' => self.expect_literal(b"true"),
            b'f' => self.expect_literal(b"false"),
            c if c == b'-' || c.is_ascii_digit() => {
                self.x += 1;
                while self.x < self.data.len()
                    && matches!(self.data[self.x],
                        b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')
                {
                    self.x += 1;
                }
                Ok(())
            }
            _ => Err(BindError::Syntax(self.x)),
        }
    }

    fn skip_string(&mut self) -> Result<(), BindError> {
        let end = find_ending_quote(&self.data, self.x + 1)?;
        self.x = end + 1;
        Ok(())
    }

    fn skip_delimited(&mut self, open: u8, close: u8) -> Result<(), BindError> {
        let mut depth = 0usize;
        loop {
            if self.x >= self.data.len() {
                return Err(BindError::Eof);
            }
            let ch = self.data[self.x];
            if ch == b'"' {
                self.skip_string()?;
                continue;
            }
            self.x += 1;
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
    }
}

/// Lazy element source over the body of an array the reader is inside.
struct Elements<'a> {
    reader: &'a mut JsonReader,
    first: &'a mut bool,
    exhausted: &'a mut bool,
}

impl ElementSource for Elements<'_> {
    fn next_element(
        &mut self,
        sink: &mut dyn ArrayVisitor,
    ) -> Result<Option<VisitResult>, BindError> {
        if *self.exhausted {
            return Ok(None);
        }
        match self.reader.step_element(self.first, sink)? {
            Some(result) => Ok(Some(result)),
            None => {
                *self.exhausted = true;
                Ok(None)
            }
        }
    }
}

/// Owning pull cursor over a top-level array, one element per `next`.
pub struct ArrayStream<V> {
    reader: JsonReader,
    visitor: V,
    first: bool,
    done: bool,
}

impl<V: ArrayVisitor> ArrayStream<V> {
    pub fn scalars_decoded(&self) -> usize {
        self.reader.scalars_decoded()
    }
}

impl<V: ArrayVisitor> Iterator for ArrayStream<V> {
    type Item = Result<VisitResult, BindError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.step_element(&mut self.first, &mut self.visitor) {
            Ok(Some(result)) => Some(Ok(result)),
            Ok(None) => {
                self.done = true;
                match self.visitor.visit_end_array() {
                    Ok(_) => match self.reader.expect_end() {
                        Ok(()) => None,
                        Err(e) => Some(Err(e)),
                    },
                    Err(e) => Some(Err(e)),
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn find_ending_quote(data: &[u8], mut x: usize) -> Result<usize, BindError> {
    while x < data.len() {
        match data[x] {
            b'"' => return Ok(x),
            b'\\' => x += 2,
            _ => x += 1,
        }
    }
    Err(BindError::Eof)
}

/// Decode a JSON string body (between the quotes) handling escape sequences.
/// Uses serde_json for correctness.
fn decode_json_string(bytes: &[u8], at: usize) -> Result<String, BindError> {
    // Fast path: no backslash
    if !bytes.contains(&b'\\') {
        return std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| BindError::InvalidUtf8);
    }
    let mut quoted = Vec::with_capacity(bytes.len() + 2);
    quoted.push(b'"');
    quoted.extend_from_slice(bytes);
    quoted.push(b'"');
    let s: String = serde_json::from_slice(&quoted).map_err(|_| BindError::Syntax(at))?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every event as a line of text; children reborrow the same
    /// collector so nesting shows up in one flat trace.
    #[derive(Default)]
    struct Trace {
        events: Vec<String>,
        skip_member: Option<&'static str>,
    }

    impl ObjectVisitor for Trace {
        fn visit_start_object(&mut self) -> VisitorMode {
            self.events.push("{".to_string());
            VisitorMode::Push
        }
        fn visit_member_object(
            &mut self,
            name: &str,
        ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
            if self.skip_member == Some(name) {
                return Ok(None);
            }
            self.events.push(format!("obj {name}"));
            Ok(Some(Box::new(&mut *self)))
        }
        fn visit_member_array(
            &mut self,
            name: &str,
        ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
            if self.skip_member == Some(name) {
                return Ok(None);
            }
            self.events.push(format!("arr {name}"));
            Ok(Some(Box::new(&mut *self)))
        }
        fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
            self.events.push(format!("{name}={value:?}"));
            Ok(None)
        }
        fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
            self.events.push("}".to_string());
            Ok(None)
        }
    }

    impl ArrayVisitor for Trace {
        fn visit_start_array(&mut self) -> VisitorMode {
            self.events.push("[".to_string());
            VisitorMode::Push
        }
        fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
            Ok(Some(Box::new(&mut *self)))
        }
        fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
            Ok(Some(Box::new(&mut *self)))
        }
        fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
            self.events.push(format!("{value:?}"));
            Ok(None)
        }
        fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
            self.events.push("]".to_string());
            Ok(None)
        }
    }

    #[test]
    fn push_drive_emits_events_in_document_order() {
        let mut trace = Trace::default();
        let mut reader = JsonReader::new(r#"{ "a": 1, "b": { "c": true }, "d": [ "x", null ] }"#);
        reader.read_object(&mut trace).unwrap();
        assert_eq!(
            trace.events,
            vec![
                "{",
                "a=I32(1)",
                "obj b",
                "{",
                "c=Bool(true)",
                "}",
                "arr d",
                "[",
                "Str(\"x\")",
                "Null",
                "]",
                "}",
            ]
        );
        assert_eq!(reader.scalars_decoded(), 4);
    }

    #[test]
    fn skipped_member_is_never_decoded() {
        let mut trace = Trace {
            skip_member: Some("big"),
            ..Trace::default()
        };
        let mut reader =
            JsonReader::new(r#"{ "big": { "n": [1, 2, 3, "deep \" quote"] }, "keep": 9 }"#);
        reader.read_object(&mut trace).unwrap();
        assert_eq!(trace.events, vec!["{", "keep=I32(9)", "}"]);
        assert_eq!(reader.scalars_decoded(), 1);
    }

    #[test]
    fn numbers_pick_the_narrowest_integer_tag() {
        let mut trace = Trace::default();
        let mut reader = JsonReader::new(r#"{ "a": 2, "b": 9999999999, "c": 2.5, "d": 1e2 }"#);
        reader.read_object(&mut trace).unwrap();
        assert_eq!(
            trace.events,
            vec!["{", "a=I32(2)", "b=I64(9999999999)", "c=F64(2.5)", "d=F64(100.0)", "}"]
        );
    }

    #[test]
    fn integers_past_the_i64_range_fall_back_to_floats() {
        let mut reader = JsonReader::new("123456789012345678901234567890");
        let value = reader.read_scalar_document().unwrap();
        assert!(matches!(value, Value::F64(f) if f > 1.2e29 && f < 1.3e29));
    }

    #[test]
    fn escapes_in_member_names_and_values() {
        let mut trace = Trace::default();
        let mut reader = JsonReader::new(r#"{ "a\nb": "tab\there é" }"#);
        reader.read_object(&mut trace).unwrap();
        // The member name is carried verbatim; the value goes through `Debug`,
        // which re-escapes the decoded tab.
        assert_eq!(trace.events, vec!["{", "a\nb=Str(\"tab\\there \u{e9}\")", "}"]);
    }

    #[test]
    fn trailing_garbage_is_a_syntax_error() {
        let mut trace = Trace::default();
        let mut reader = JsonReader::new(r#"{ "a": 1 } extra"#);
        assert!(matches!(
            reader.read_object(&mut trace),
            Err(BindError::Syntax(_))
        ));
    }

    #[test]
    fn truncated_document_is_eof() {
        let mut trace = Trace::default();
        let mut reader = JsonReader::new(r#"{ "a": [1, 2"#);
        assert!(matches!(reader.read_object(&mut trace), Err(BindError::Eof)));
    }

    struct PullValues;

    impl ArrayVisitor for PullValues {
        fn visit_start_array(&mut self) -> VisitorMode {
            VisitorMode::Pull
        }
        fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
            Ok(None)
        }
        fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
            Ok(None)
        }
        fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
            Ok(Some(Box::new(value)))
        }
        fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
            Ok(None)
        }
    }

    #[test]
    fn pull_stream_decodes_one_element_per_next() {
        let reader = JsonReader::new("[10, 20, 30, 40]");
        let mut stream = reader.stream_array(PullValues).unwrap();

        let first = stream.next().unwrap().unwrap().unwrap();
        assert_eq!(
            first.downcast_ref::<Value>(),
            Some(&Value::I32(10))
        );
        assert_eq!(stream.scalars_decoded(), 1);

        stream.next().unwrap().unwrap();
        assert_eq!(stream.scalars_decoded(), 2);
        // Dropping here abandons the last two elements unread.
    }

    #[test]
    fn pull_stream_requires_pull_mode() {
        let reader = JsonReader::new("[1]");
        let err = reader.stream_array(Trace::default()).err();
        assert!(matches!(err, Some(BindError::InvalidMode { .. })));
    }

    struct TakeTwo;

    impl ArrayVisitor for TakeTwo {
        fn visit_start_array(&mut self) -> VisitorMode {
            VisitorMode::PullInside
        }
        fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
            Ok(None)
        }
        fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
            Ok(None)
        }
        fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
            Ok(Some(Box::new(value)))
        }
        fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
            Ok(None)
        }
        fn visit_stream(
            &mut self,
            elements: &mut dyn ElementSource,
        ) -> Result<VisitResult, BindError> {
            let mut sum = 0i64;
            for _ in 0..2 {
                if let Some(Some(native)) = elements.next_element(self)? {
                    if let Some(Value::I32(v)) = native.downcast_ref::<Value>() {
                        sum += i64::from(*v);
                    }
                }
            }
            Ok(Some(Box::new(sum)))
        }
    }

    #[test]
    fn pull_inside_leaves_unpulled_elements_undecoded() {
        let mut reader = JsonReader::new(r#"{ "nums": [1, 2, 3, 4, 5] }"#);
        // Route the member array into a TakeTwo by hand.
        struct Host;
        impl ObjectVisitor for Host {
            fn visit_start_object(&mut self) -> VisitorMode {
                VisitorMode::Push
            }
            fn visit_member_object(
                &mut self,
                _name: &str,
            ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
                Ok(None)
            }
            fn visit_member_array(
                &mut self,
                _name: &str,
            ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
                Ok(Some(Box::new(TakeTwo)))
            }
            fn visit_member_value(
                &mut self,
                _name: &str,
                _value: Value,
            ) -> Result<VisitResult, BindError> {
                Ok(None)
            }
            fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
                Ok(None)
            }
        }
        let mut host = Host;
        reader.read_object(&mut host).unwrap();
        assert_eq!(reader.scalars_decoded(), 2);
    }
}
