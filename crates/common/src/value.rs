//! Runtime value representation for the Ember VM.
//!
//! A [`RuntimeValue`] is the only thing ever stored in a stack cell, an object
//! field, or the return register. Operands decoded from a module are a
//! separate type ([`crate::Operand`]) and are resolved to runtime values at
//! execution time.

use std::fmt;

/// Handle to a heap object.
///
/// Handles are plain indices into the owning heap's arena plus the
/// generation of the slot at allocation time. A handle whose generation no
/// longer matches its slot refers to a collected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    /// Create a handle from an arena index and slot generation.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Runtime value kind, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Int,
    Float,
    String,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Tagged runtime value.
///
/// A `String` owns its buffer. Overwriting a cell drops the previous value,
/// so no two live cells ever share a buffer.
#[derive(Debug, Clone, Default)]
pub enum RuntimeValue {
    /// Uninitialized cell.
    #[default]
    Null,
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Owned string.
    String(String),
    /// Reference to a heap object.
    Object(ObjectRef),
}

// Floats compare by bit pattern so that RuntimeValue is Eq. Script-level
// comparisons (JE, JL, ...) go through the interpreter, not this impl.
impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Null, RuntimeValue::Null) => true,
            (RuntimeValue::Int(a), RuntimeValue::Int(b)) => a == b,
            (RuntimeValue::Float(a), RuntimeValue::Float(b)) => a.to_bits() == b.to_bits(),
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::Object(a), RuntimeValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for RuntimeValue {}

impl RuntimeValue {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            RuntimeValue::Null => ValueKind::Null,
            RuntimeValue::Int(_) => ValueKind::Int,
            RuntimeValue::Float(_) => ValueKind::Float,
            RuntimeValue::String(_) => ValueKind::String,
            RuntimeValue::Object(_) => ValueKind::Object,
        }
    }

    /// The object handle, if this is an object reference.
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            RuntimeValue::Object(r) => Some(*r),
            _ => None,
        }
    }

    /// Coerce to an integer.
    ///
    /// Floats truncate toward zero, strings parse their leading integer
    /// (0 if there is none), null and objects yield 0.
    pub fn coerce_int(&self) -> i64 {
        match self {
            RuntimeValue::Int(i) => *i,
            RuntimeValue::Float(f) => *f as i64,
            RuntimeValue::String(s) => parse_leading_int(s),
            RuntimeValue::Null | RuntimeValue::Object(_) => 0,
        }
    }

    /// Coerce to a float.
    pub fn coerce_float(&self) -> f64 {
        match self {
            RuntimeValue::Int(i) => *i as f64,
            RuntimeValue::Float(f) => *f,
            RuntimeValue::String(s) => parse_leading_float(s),
            RuntimeValue::Null | RuntimeValue::Object(_) => 0.0,
        }
    }

    /// Coerce to a string.
    ///
    /// Null and objects have no string form and yield `None`.
    pub fn coerce_string(&self) -> Option<String> {
        match self {
            RuntimeValue::Int(i) => Some(i.to_string()),
            RuntimeValue::Float(f) => Some(f.to_string()),
            RuntimeValue::String(s) => Some(s.clone()),
            RuntimeValue::Null | RuntimeValue::Object(_) => None,
        }
    }

    /// Script truthiness: non-zero numbers and non-empty strings.
    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::Int(i) => *i != 0,
            RuntimeValue::Float(f) => *f != 0.0,
            RuntimeValue::String(s) => !s.is_empty(),
            RuntimeValue::Null | RuntimeValue::Object(_) => false,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Null => f.write_str("<null>"),
            RuntimeValue::Int(i) => write!(f, "{i}"),
            RuntimeValue::Float(x) => write!(f, "{x}"),
            RuntimeValue::String(s) => f.write_str(s),
            RuntimeValue::Object(r) => write!(f, "<object #{}>", r.index()),
        }
    }
}

impl From<i64> for RuntimeValue {
    fn from(value: i64) -> Self {
        RuntimeValue::Int(value)
    }
}

impl From<f64> for RuntimeValue {
    fn from(value: f64) -> Self {
        RuntimeValue::Float(value)
    }
}

impl From<&str> for RuntimeValue {
    fn from(value: &str) -> Self {
        RuntimeValue::String(value.to_owned())
    }
}

impl From<String> for RuntimeValue {
    fn from(value: String) -> Self {
        RuntimeValue::String(value)
    }
}

/// Longest prefix of `s` (after leading whitespace) that looks like a number.
fn numeric_prefix(s: &str, allow_fraction: bool) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        if b.is_ascii_digit() {
            end += 1;
        } else if allow_fraction && b == b'.' && !seen_dot {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }
    &s[..end]
}

fn parse_leading_int(s: &str) -> i64 {
    numeric_prefix(s, false).parse().unwrap_or(0)
}

fn parse_leading_float(s: &str) -> f64 {
    numeric_prefix(s, true).parse().unwrap_or(0.0)
}
