//! The dynamic `Value` (a.k.a. Variant) at the center of the engine.
//!
//! Mirrors the teacher's own `Value`/`MapKey` split (`runtime/src/value.rs`):
//! a tagged enum for the full dynamic value, and a narrower, genuinely
//! orderable key type for anything used as a collection key. Reference
//! payloads (`Collection`, `Coroutine`, `UserObject`, `Buffer`) are shared
//! via `Rc`, matching the teacher's use of `Arc` for its own reference
//! payloads — `Rc` rather than `Arc` because spec §5 makes a single Script
//! single-threaded, so there is no cross-thread sharing of a live value
//! graph to pay atomic-refcount cost for.

use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::JinxError;

/// A 128-bit GUID stored as four little-endian fields, per spec §3.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub const fn nil() -> Self {
        Guid::new(0, 0, 0, [0; 8])
    }

    /// Byte representation in the exact little-endian field layout used by
    /// the bytecode format, used both for serialization and for the
    /// componentwise byte-compare total order from spec §3.
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Guid {
            data1: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            data2: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
            data3: u16::from_le_bytes(bytes[6..8].try_into().unwrap()),
            data4: bytes[8..16].try_into().unwrap(),
        }
    }
}

impl PartialOrd for Guid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Guid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

/// The value-type tag itself, usable as a first-class value (`ValueType`
/// variant) and as the immediate operand of `Cast`/`SetIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    Null = 0,
    Integer = 1,
    Number = 2,
    Boolean = 3,
    String = 4,
    Collection = 5,
    CollectionIterator = 6,
    Function = 7,
    Coroutine = 8,
    UserObject = 9,
    Buffer = 10,
    Guid = 11,
    ValueType = 12,
    /// Pseudo-tag used by the parser/`as any` cast to mean "no constraint".
    Any = 255,
}

impl ValueType {
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            0 => ValueType::Null,
            1 => ValueType::Integer,
            2 => ValueType::Number,
            3 => ValueType::Boolean,
            4 => ValueType::String,
            5 => ValueType::Collection,
            6 => ValueType::CollectionIterator,
            7 => ValueType::Function,
            8 => ValueType::Coroutine,
            9 => ValueType::UserObject,
            10 => ValueType::Buffer,
            11 => ValueType::Guid,
            12 => ValueType::ValueType,
            255 => ValueType::Any,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Collection => "collection",
            ValueType::CollectionIterator => "collection iterator",
            ValueType::Function => "function",
            ValueType::Coroutine => "coroutine",
            ValueType::UserObject => "object",
            ValueType::Buffer => "buffer",
            ValueType::Guid => "guid",
            ValueType::ValueType => "type",
            ValueType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Something an executing coroutine value can be asked about. Implemented by
/// `jinx-runtime`'s `Coroutine`; kept as a trait here so `Value` (in
/// `jinx-core`) never needs to depend on the runtime crate.
pub trait CoroutineObject: fmt::Debug {
    /// Drives one more slice if needed, then reports whether the coroutine
    /// has finished.
    fn is_finished(&self) -> bool;
    /// The coroutine's captured return value, if it has finished. Must be
    /// stable across repeated calls (at-most-once capture, spec §8 property 8).
    fn value(&self) -> Option<Value>;
}

pub type CoroutineRef = Rc<RefCell<dyn CoroutineObject>>;
pub type BufferRef = Rc<RefCell<Vec<u8>>>;
pub type CollectionRef = Rc<RefCell<ValueMap>>;

/// A key admissible for use in a `Collection` (spec §3 "Key admissibility"):
/// Number, Integer, Boolean, String, or Guid. Kept as its own type, the way
/// the teacher narrows `Value` down to `MapKey`, because only this subset
/// can implement a total `Ord` cheaply (`f64` cannot).
#[derive(Debug, Clone)]
pub enum Key {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    String(String),
    Guid(Guid),
}

impl Key {
    fn tag_rank(&self) -> u8 {
        match self {
            Key::Integer(_) | Key::Number(_) => 0,
            Key::Boolean(_) => 1,
            Key::String(_) => 2,
            Key::Guid(_) => 3,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Key::Integer(i) => Some(*i as f64),
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Integer(i) => Value::Integer(*i),
            Key::Number(n) => Value::Number(*n),
            Key::Boolean(b) => Value::Boolean(*b),
            Key::String(s) => Value::String(s.clone()),
            Key::Guid(g) => Value::Guid(*g),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        // Numeric tags (Integer/Number) are unified by promoting to f64, per
        // spec §3's total order. Mixed non-numeric tags fall back to a
        // stable tag rank so the BTreeMap backing a Collection always has a
        // genuine total order, even though the `<`/`<=` *operators* reject
        // that same mismatch at the language level (see `Value::compare`).
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => return a.total_cmp(&b),
            _ => {}
        }
        match (self, other) {
            (Key::Boolean(a), Key::Boolean(b)) => a.cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Guid(a), Key::Guid(b)) => a.cmp(b),
            _ => self.tag_rank().cmp(&other.tag_rank()),
        }
    }
}

/// The ordered map backing `Value::Collection`: keys ordered per spec §3,
/// iteration always follows that key order (scenario D relies on this).
pub type ValueMap = BTreeMap<Key, Value>;

/// Cursor position for a `CollectionIterator`: `Before` the first element
/// (the state `PushItr` starts in), sitting `At` an admissible key, or
/// `After` the last element. `LoopOver`'s "advance then report done" wording
/// (spec §4.2) only produces the right walk order — first element included,
/// none skipped — if the cursor starts `Before` rather than already sitting
/// on the first entry.
#[derive(Debug, Clone, PartialEq)]
enum IterState {
    Before,
    At(Key),
    After,
}

/// Cursor over a shared `Collection`, per spec §3's `CollectionIterator`.
#[derive(Clone)]
pub struct Iterator_ {
    pub collection: CollectionRef,
    state: IterState,
}

impl Iterator_ {
    pub fn begin(collection: CollectionRef) -> Self {
        Iterator_ {
            collection,
            state: IterState::Before,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.state, IterState::Before | IterState::After)
    }

    pub fn current(&self) -> Option<(Value, Value)> {
        let IterState::At(key) = &self.state else {
            return None;
        };
        let map = self.collection.borrow();
        map.get(key).map(|v| (key.to_value(), v.clone()))
    }

    /// Move to the next key in order: from `Before` that's the first key;
    /// from `At(k)` it's the first key greater than `k` (found via range
    /// rather than by look-up, so this still works after `EraseItr` has
    /// removed `k` from the map); from `After` this is a no-op.
    pub fn advance(&mut self) {
        let map = self.collection.borrow();
        self.state = match &self.state {
            IterState::Before => map
                .keys()
                .next()
                .cloned()
                .map(IterState::At)
                .unwrap_or(IterState::After),
            IterState::At(key) => map
                .range((std::ops::Bound::Excluded(key.clone()), std::ops::Bound::Unbounded))
                .next()
                .map(|(k, _)| IterState::At(k.clone()))
                .unwrap_or(IterState::After),
            IterState::After => IterState::After,
        };
    }

    /// Remove the element under the cursor (if any) and advance past it,
    /// per `EraseItr`.
    pub fn erase_current(&mut self) {
        if let IterState::At(key) = &self.state {
            let key = key.clone();
            self.collection.borrow_mut().remove(&key);
        }
        self.advance();
    }
}

impl fmt::Debug for Iterator_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionIterator")
            .field("state", &self.state)
            .finish()
    }
}

impl PartialEq for Iterator_ {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.collection, &other.collection) && self.state == other.state
    }
}

/// The dynamic value carried on the VM stack, in variables, and in
/// properties. See spec §3 for the full invariant list.
#[derive(Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Number(f64),
    Boolean(bool),
    String(String),
    Collection(CollectionRef),
    CollectionIterator(Rc<RefCell<Iterator_>>),
    Function(u64),
    Coroutine(CoroutineRef),
    UserObject(Rc<dyn Any>),
    Buffer(BufferRef),
    Guid(Guid),
    ValueType(ValueType),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Collection(c) => write!(f, "<collection len={}>", c.borrow().len()),
            Value::CollectionIterator(_) => write!(f, "<iterator>"),
            Value::Function(id) => write!(f, "<function {id:#x}>"),
            Value::Coroutine(_) => write!(f, "<coroutine>"),
            Value::UserObject(_) => write!(f, "<object>"),
            Value::Buffer(b) => write!(f, "<buffer len={}>", b.borrow().len()),
            Value::Guid(g) => write!(f, "{g:?}"),
            Value::ValueType(t) => write!(f, "<type {t}>"),
        }
    }
}

/// Structural equality (same tag, `value_eq` payload) — distinct from the
/// numeric-promoting `value_eq` used for the script-level `=` operator,
/// which considers `Integer(2)` and `Number(2.0)` equal even though they
/// are not the same Rust variant.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.type_of() == other.type_of() && self.value_eq(other)
    }
}

impl Value {
    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Integer(_) => ValueType::Integer,
            Value::Number(_) => ValueType::Number,
            Value::Boolean(_) => ValueType::Boolean,
            Value::String(_) => ValueType::String,
            Value::Collection(_) => ValueType::Collection,
            Value::CollectionIterator(_) => ValueType::CollectionIterator,
            Value::Function(_) => ValueType::Function,
            Value::Coroutine(_) => ValueType::Coroutine,
            Value::UserObject(_) => ValueType::UserObject,
            Value::Buffer(_) => ValueType::Buffer,
            Value::Guid(_) => ValueType::Guid,
            Value::ValueType(_) => ValueType::ValueType,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to convert this value to an admissible collection `Key` (spec §3
    /// "Key admissibility"). Returns `TypeMismatch` otherwise.
    pub fn to_key(&self) -> Result<Key, JinxError> {
        match self {
            Value::Integer(i) => Ok(Key::Integer(*i)),
            Value::Number(n) => Ok(Key::Number(*n)),
            Value::Boolean(b) => Ok(Key::Boolean(*b)),
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Guid(g) => Ok(Key::Guid(*g)),
            other => Err(JinxError::type_mismatch(format!(
                "value of type {} cannot be used as a collection key",
                other.type_of()
            ))),
        }
    }

    /// Value equality used by `=`/`!=`: deep for scalars, shallow (shared
    /// reference) equality for reference-typed payloads, numeric promotion
    /// across Integer/Number, `Null` equal only to `Null`.
    pub fn value_eq(&self, other: &Value) -> bool {
        use Value::*;
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        match (self, other) {
            (Null, Null) => true,
            (Null, _) | (_, Null) => false,
            (Boolean(a), Boolean(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Guid(a), Guid(b)) => a == b,
            (ValueType(a), ValueType(b)) => a == b,
            (Function(a), Function(b)) => a == b,
            (Collection(a), Collection(b)) => Rc::ptr_eq(a, b),
            (CollectionIterator(a), CollectionIterator(b)) => Rc::ptr_eq(a, b),
            (Coroutine(a), Coroutine(b)) => Rc::ptr_eq(a, b),
            (UserObject(a), UserObject(b)) => Rc::ptr_eq(a, b),
            (Buffer(a), Buffer(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Relational comparison for `< <= > >=`. Numeric tags promote to
    /// `Number`; same non-numeric tags compare by natural order; any other
    /// cross-tag comparison is a `TypeMismatch` (spec §3).
    pub fn compare(&self, other: &Value) -> Result<Ordering, JinxError> {
        use Value::*;
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return Ok(a.total_cmp(&b));
        }
        match (self, other) {
            (Boolean(a), Boolean(b)) => Ok(a.cmp(b)),
            (String(a), String(b)) => Ok(a.cmp(b)),
            (Guid(a), Guid(b)) => Ok(a.cmp(b)),
            (ValueType(a), ValueType(b)) => Ok(a.cmp(b)),
            _ => Err(JinxError::type_mismatch(format!(
                "cannot compare {} to {}",
                self.type_of(),
                other.type_of()
            ))),
        }
    }

    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    fn arith_err(op: &str, a: &Value, b: &Value) -> JinxError {
        JinxError::type_mismatch(format!(
            "cannot apply '{op}' to {} and {}",
            a.type_of(),
            b.type_of()
        ))
    }

    pub fn add(&self, other: &Value) -> Result<Value, JinxError> {
        use Value::*;
        match (self, other) {
            (String(a), String(b)) => Ok(String(format!("{a}{b}"))),
            (String(a), b) => Ok(String(format!("{a}{}", display_value(b)))),
            (Integer(a), Integer(b)) => Ok(Integer(a.wrapping_add(*b))),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                Ok(Number(a.as_f64().unwrap() + b.as_f64().unwrap()))
            }
            (a, b) => Err(Self::arith_err("+", a, b)),
        }
    }

    pub fn subtract(&self, other: &Value) -> Result<Value, JinxError> {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Ok(Integer(a.wrapping_sub(*b))),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                Ok(Number(a.as_f64().unwrap() - b.as_f64().unwrap()))
            }
            (a, b) => Err(Self::arith_err("-", a, b)),
        }
    }

    pub fn multiply(&self, other: &Value) -> Result<Value, JinxError> {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Ok(Integer(a.wrapping_mul(*b))),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                Ok(Number(a.as_f64().unwrap() * b.as_f64().unwrap()))
            }
            (a, b) => Err(Self::arith_err("*", a, b)),
        }
    }

    pub fn divide(&self, other: &Value) -> Result<Value, JinxError> {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => {
                if *b == 0 {
                    return Err(JinxError::arithmetic("division by zero"));
                }
                if a % b == 0 {
                    Ok(Integer(a / b))
                } else {
                    Ok(Number(*a as f64 / *b as f64))
                }
            }
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                let bf = b.as_f64().unwrap();
                if bf == 0.0 {
                    return Err(JinxError::arithmetic("division by zero"));
                }
                Ok(Number(a.as_f64().unwrap() / bf))
            }
            (a, b) => Err(Self::arith_err("/", a, b)),
        }
    }

    /// Floored (Euclidean-style) modulus: result takes the sign of the
    /// divisor (spec §3).
    pub fn modulus(&self, other: &Value) -> Result<Value, JinxError> {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => {
                if *b == 0 {
                    return Err(JinxError::arithmetic("modulus by zero"));
                }
                let r = a % b;
                let r = if (r != 0) && ((r < 0) != (*b < 0)) {
                    r + b
                } else {
                    r
                };
                Ok(Integer(r))
            }
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                let (a, b) = (a.as_f64().unwrap(), b.as_f64().unwrap());
                if b == 0.0 {
                    return Err(JinxError::arithmetic("modulus by zero"));
                }
                let r = a % b;
                let r = if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r + b
                } else {
                    r
                };
                Ok(Number(r))
            }
            (a, b) => Err(Self::arith_err("%", a, b)),
        }
    }

    pub fn negate(&self) -> Result<Value, JinxError> {
        match self {
            Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(JinxError::type_mismatch(format!(
                "cannot negate {}",
                other.type_of()
            ))),
        }
    }

    /// Convert to the requested `ValueType`, used by the `Cast` opcode and
    /// by `SetIndex`'s parameter-slot type coercion.
    pub fn cast(&self, target: ValueType) -> Result<Value, JinxError> {
        if target == ValueType::Any || self.type_of() == target {
            return Ok(self.clone());
        }
        use Value::*;
        match (self, target) {
            (Integer(i), ValueType::Number) => Ok(Number(*i as f64)),
            (Number(n), ValueType::Integer) => Ok(Integer(*n as i64)),
            (Integer(i), ValueType::String) => Ok(String(i.to_string())),
            (Number(n), ValueType::String) => Ok(String(n.to_string())),
            (Boolean(b), ValueType::String) => Ok(String(b.to_string())),
            (Guid(g), ValueType::String) => Ok(String(format!("{g:?}"))),
            (Integer(i), ValueType::Boolean) => Ok(Boolean(*i != 0)),
            (String(s), ValueType::Integer) => s
                .trim()
                .parse::<i64>()
                .map(Integer)
                .map_err(|_| JinxError::type_mismatch(format!("cannot cast \"{s}\" to integer"))),
            (String(s), ValueType::Number) => s
                .trim()
                .parse::<f64>()
                .map(Number)
                .map_err(|_| JinxError::type_mismatch(format!("cannot cast \"{s}\" to number"))),
            (String(s), ValueType::Boolean) => match s.trim() {
                "true" => Ok(Boolean(true)),
                "false" => Ok(Boolean(false)),
                _ => Err(JinxError::type_mismatch(format!(
                    "cannot cast \"{s}\" to boolean"
                ))),
            },
            (_, ValueType::ValueType) => Ok(ValueType(self.type_of())),
            (v, target) => Err(JinxError::type_mismatch(format!(
                "cannot cast {} to {target}",
                v.type_of()
            ))),
        }
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Guid(g) => format!("{g:?}"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_promotes_when_inexact() {
        assert!(matches!(
            Value::Integer(7).divide(&Value::Integer(2)).unwrap(),
            Value::Number(n) if n == 3.5
        ));
        assert!(matches!(
            Value::Integer(8).divide(&Value::Integer(2)).unwrap(),
            Value::Integer(4)
        ));
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        assert!(matches!(
            Value::Integer(1).divide(&Value::Integer(0)),
            Err(JinxError::Arithmetic { .. })
        ));
    }

    #[test]
    fn floored_modulus_takes_divisor_sign() {
        assert!(matches!(
            Value::Integer(-7).modulus(&Value::Integer(3)).unwrap(),
            Value::Integer(2)
        ));
        assert!(matches!(
            Value::Integer(7).modulus(&Value::Integer(-3)).unwrap(),
            Value::Integer(-2)
        ));
    }

    #[test]
    fn null_equals_only_null() {
        assert!(Value::Null.value_eq(&Value::Null));
        assert!(!Value::Null.value_eq(&Value::Integer(0)));
        assert!(!Value::Integer(0).value_eq(&Value::Null));
    }

    #[test]
    fn cross_tag_relational_is_type_mismatch() {
        assert!(matches!(
            Value::String("x".into()).compare(&Value::Boolean(true)),
            Err(JinxError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn numeric_cross_tag_compares() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Number(2.5)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn key_admissibility_rejects_collections() {
        let map: CollectionRef = Rc::new(RefCell::new(ValueMap::new()));
        assert!(Value::Collection(map).to_key().is_err());
        assert!(Value::Integer(1).to_key().is_ok());
    }

    #[test]
    fn iterator_follows_key_order() {
        let mut map = ValueMap::new();
        map.insert(Key::Integer(2), Value::String("b".into()));
        map.insert(Key::Integer(1), Value::String("a".into()));
        map.insert(Key::Integer(3), Value::String("c".into()));
        let coll: CollectionRef = Rc::new(RefCell::new(map));
        let mut it = Iterator_::begin(coll);
        let mut seen = Vec::new();
        loop {
            it.advance();
            if it.is_end() {
                break;
            }
            let (_, v) = it.current().unwrap();
            seen.push(v);
        }
        let strs: Vec<_> = seen
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(strs, vec!["a", "b", "c"]);
    }
}
