use crate::config::WriteOptions;
use crate::error::WriteError;

/// Escapes a string for a double-quoted literal. Only the escapes the
/// reader maps back are emitted, so every written string re-reads to the
/// same value.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats a float so it re-reads as a float: whole finite values keep one
/// fractional digit, non-finite values use the identifiers the reader's
/// float conversion accepts.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

#[derive(Debug)]
enum Frame {
    Array { count: usize },
    Object { count: usize, expect_key: bool },
    Ctor { count: usize },
}

/// Low-level token emitter enforcing the notation grammar.
///
/// Every operation checks that it is legal in the current state and fails
/// with `InvalidWriterState` otherwise, so a buggy caller produces an error
/// instead of unparseable output. Exactly one root value is allowed; after
/// it completes only `finish` is valid.
#[derive(Debug)]
pub struct Writer {
    out: String,
    options: WriteOptions,
    stack: Vec<Frame>,
    done: bool,
    pending_cast: Option<String>,
    // A constructor whose argument list closed but whose optional
    // initializer body has not started yet.
    ctor_done: bool,
}

impl Writer {
    pub fn new(options: WriteOptions) -> Self {
        Self {
            out: String::new(),
            options,
            stack: Vec::new(),
            done: false,
            pending_cast: None,
            ctor_done: false,
        }
    }

    /// Consumes the writer and returns the document. Fails unless the root
    /// value is complete.
    pub fn finish(mut self) -> Result<String, WriteError> {
        self.settle_ctor();
        if !self.done {
            return Err(self.invalid("finish"));
        }
        Ok(self.out)
    }

    /// Emits a `/* ... */` header. Only valid before the root value.
    pub fn comment(&mut self, text: &str) -> Result<&mut Self, WriteError> {
        if self.done || !self.stack.is_empty() || self.pending_cast.is_some() {
            return Err(self.invalid("comment"));
        }
        self.out.push_str("/*");
        self.out.push_str(text);
        self.out.push_str("*/");
        self.out.push(if self.options.indent { '\n' } else { ' ' });
        Ok(self)
    }

    /// Schedules a `(type)` cast to be emitted directly before the next
    /// value token.
    pub fn cast(&mut self, type_name: &str) -> Result<&mut Self, WriteError> {
        self.settle_ctor();
        // Only legal where a value could start, and one cast per value.
        let awaiting_key = matches!(
            self.stack.last(),
            Some(Frame::Object { expect_key: true, .. })
        );
        if self.done || awaiting_key || self.pending_cast.is_some() {
            return Err(self.invalid("cast"));
        }
        self.pending_cast = Some(type_name.to_string());
        Ok(self)
    }

    pub fn null_value(&mut self) -> Result<&mut Self, WriteError> {
        self.special_value("null")
    }

    pub fn bool_value(&mut self, b: bool) -> Result<&mut Self, WriteError> {
        self.special_value(if b { "true" } else { "false" })
    }

    pub fn int_value(&mut self, i: i64) -> Result<&mut Self, WriteError> {
        let text = i.to_string();
        self.special_value(&text)
    }

    pub fn float_value(&mut self, f: f64) -> Result<&mut Self, WriteError> {
        let text = format_float(f);
        self.special_value(&text)
    }

    /// Emits a double-quoted, escaped string value.
    pub fn quoted_value(&mut self, text: &str) -> Result<&mut Self, WriteError> {
        self.begin_value("quoted_value")?;
        self.out.push('"');
        self.out.push_str(&escape(text));
        self.out.push('"');
        self.end_value();
        Ok(self)
    }

    /// Emits a raw token as a value: `null`, booleans, numbers, reference
    /// paths and the non-finite float identifiers.
    pub fn special_value(&mut self, raw: &str) -> Result<&mut Self, WriteError> {
        self.begin_value("special_value")?;
        self.out.push_str(raw);
        self.end_value();
        Ok(self)
    }

    pub fn object_start(&mut self) -> Result<&mut Self, WriteError> {
        // After a constructor's argument list, an object opens its
        // initializer body instead of a new value.
        if self.ctor_done {
            self.ctor_done = false;
        } else {
            self.begin_value("object_start")?;
        }
        self.out.push('{');
        self.stack.push(Frame::Object {
            count: 0,
            expect_key: true,
        });
        Ok(self)
    }

    pub fn object_end(&mut self) -> Result<&mut Self, WriteError> {
        self.settle_ctor();
        let count = match self.stack.last() {
            Some(Frame::Object { count, expect_key: true }) => *count,
            _ => return Err(self.invalid("object_end")),
        };
        self.stack.pop();
        if self.options.indent && count > 0 {
            self.newline_indent();
        }
        self.out.push('}');
        self.end_value();
        Ok(self)
    }

    /// Emits a member key. Only valid directly inside an object, before a
    /// value.
    pub fn key(&mut self, name: &str) -> Result<&mut Self, WriteError> {
        self.settle_ctor();
        match self.stack.last() {
            Some(Frame::Object { expect_key: true, .. }) => {}
            _ => return Err(self.invalid("key")),
        }
        let indent = self.options.indent;
        if let Some(Frame::Object { count, expect_key }) = self.stack.last_mut() {
            if *count > 0 {
                self.out.push(',');
            }
            *count += 1;
            *expect_key = false;
        }
        if indent {
            self.newline_indent();
        }
        self.out.push('"');
        self.out.push_str(&escape(name));
        self.out.push('"');
        self.out.push(':');
        if indent {
            self.out.push(' ');
        }
        Ok(self)
    }

    pub fn array_start(&mut self) -> Result<&mut Self, WriteError> {
        // A collection constructed with arguments takes its elements in a
        // bracket body after the argument list.
        if self.ctor_done {
            self.ctor_done = false;
        } else {
            self.begin_value("array_start")?;
        }
        self.out.push('[');
        self.stack.push(Frame::Array { count: 0 });
        Ok(self)
    }

    pub fn array_end(&mut self) -> Result<&mut Self, WriteError> {
        self.settle_ctor();
        let count = match self.stack.last() {
            Some(Frame::Array { count }) => *count,
            _ => return Err(self.invalid("array_end")),
        };
        self.stack.pop();
        if self.options.indent && count > 0 {
            self.newline_indent();
        }
        self.out.push(']');
        self.end_value();
        Ok(self)
    }

    /// Opens a `new Type(` constructor expression. Arguments are written as
    /// values; `ctor_args_end` closes the list.
    pub fn ctor_start(&mut self, type_name: &str) -> Result<&mut Self, WriteError> {
        self.begin_value("ctor_start")?;
        self.out.push_str("new ");
        self.out.push_str(type_name);
        self.out.push('(');
        self.stack.push(Frame::Ctor { count: 0 });
        Ok(self)
    }

    /// Closes the argument list. An `object_start` or `array_start` directly
    /// after opens the initializer body; any other operation completes the
    /// constructor value.
    pub fn ctor_args_end(&mut self) -> Result<&mut Self, WriteError> {
        match self.stack.last() {
            Some(Frame::Ctor { .. }) => {}
            _ => return Err(self.invalid("ctor_args_end")),
        }
        self.stack.pop();
        self.out.push(')');
        self.ctor_done = true;
        Ok(self)
    }

    fn settle_ctor(&mut self) {
        if self.ctor_done {
            self.ctor_done = false;
            self.end_value();
        }
    }

    fn begin_value(&mut self, operation: &str) -> Result<(), WriteError> {
        self.settle_ctor();
        if self.done {
            return Err(self.invalid(operation));
        }
        if matches!(self.stack.last(), Some(Frame::Object { expect_key: true, .. })) {
            return Err(self.invalid(operation));
        }
        let indent = self.options.indent;
        match self.stack.last_mut() {
            Some(Frame::Array { count }) => {
                if *count > 0 {
                    self.out.push(',');
                }
                *count += 1;
                if indent {
                    self.newline_indent();
                }
            }
            Some(Frame::Ctor { count }) => {
                // Argument lists stay on one line even in indented output.
                if *count > 0 {
                    self.out.push(',');
                    if indent {
                        self.out.push(' ');
                    }
                }
                *count += 1;
            }
            _ => {}
        }
        if let Some(name) = self.pending_cast.take() {
            self.out.push('(');
            self.out.push_str(&name);
            self.out.push(')');
        }
        Ok(())
    }

    fn end_value(&mut self) {
        match self.stack.last_mut() {
            None => self.done = true,
            Some(Frame::Object { expect_key, .. }) => *expect_key = true,
            _ => {}
        }
    }

    fn newline_indent(&mut self) {
        self.out.push('\n');
        for _ in 0..self.stack.len() {
            self.out.push_str("  ");
        }
    }

    fn state_name(&self) -> String {
        if self.done {
            return "Done".to_string();
        }
        if self.ctor_done {
            return "CtorDone".to_string();
        }
        match self.stack.last() {
            None => "Initial",
            Some(Frame::Array { .. }) => "Array",
            Some(Frame::Object { expect_key: true, .. }) => "ObjectKey",
            Some(Frame::Object { expect_key: false, .. }) => "ObjectValue",
            Some(Frame::Ctor { .. }) => "CtorArgs",
        }
        .to_string()
    }

    fn invalid(&self, operation: &str) -> WriteError {
        WriteError::InvalidWriterState {
            operation: operation.to_string(),
            state: self.state_name(),
        }
    }
}
