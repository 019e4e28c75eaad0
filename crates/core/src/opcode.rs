//! The bytecode instruction set (spec §4.2's opcode table).
//!
//! Each `Instruction` variant carries its decoded immediates; encoding and
//! decoding live here so both the emitter (`jinx-compiler`) and the
//! executor (`jinx-runtime`) agree on the wire format without either crate
//! owning it.

use crate::bytecode::{ByteCodeReader, ByteCodeWriter};
use crate::error::JinxError;
use crate::signature::{FunctionSignature, NamePart, ParamSlot, PropertyName, SignaturePart, Visibility};
use crate::value::{Value, ValueType};

macro_rules! tags {
    ($($variant:ident = $tag:expr),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        enum Tag { $($variant = $tag),+ }

        impl Tag {
            fn from_u8(b: u8) -> Result<Self, JinxError> {
                match b {
                    $($tag => Ok(Tag::$variant),)+
                    other => Err(JinxError::format(format!("unknown opcode tag {other}"))),
                }
            }
        }
    };
}

tags! {
    PushVal = 0, PushVar = 1, PushProp = 2, PushTop = 3, PushColl = 4, PushList = 5,
    PushItr = 6, PushKeyVal = 7, Pop = 8, PopCount = 9, SetVar = 10, SetProp = 11,
    SetVarKeyVal = 12, SetPropKeyVal = 13, SetIndex = 14, EraseVarKeyVal = 15,
    ErasePropKeyVal = 16, EraseItr = 17, Add = 18, Subtract = 19, Multiply = 20,
    Divide = 21, Mod = 22, Negate = 23, Increment = 24, Decrement = 25, Equals = 26,
    NotEquals = 27, Less = 28, LessEq = 29, Greater = 30, GreaterEq = 31, And = 32,
    Or = 33, Not = 34, Jump = 35, JumpFalse = 36, JumpTrue = 37, JumpFalseCheck = 38,
    JumpTrueCheck = 39, Cast = 40, Type = 41, CallFunc = 42, Return = 43, Function = 44,
    Library = 45, Property = 46, LoopCount = 47, LoopOver = 48, ScopeBegin = 49,
    ScopeEnd = 50, Wait = 51, Exit = 52, CallAsync = 53,
}

/// One decoded bytecode instruction, per spec §4.2's table.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushVal(Value),
    PushVar(u64),
    PushProp(u64),
    PushTop,
    PushColl(u32),
    PushList(u32),
    PushItr,
    PushKeyVal,
    Pop,
    PopCount(u32),
    SetVar(u64),
    SetProp(u64),
    SetVarKeyVal { subs: u32, id: u64 },
    SetPropKeyVal { subs: u32, id: u64 },
    SetIndex { id: u64, stack_index: i32, value_type: ValueType },
    EraseVarKeyVal { subs: u32, id: u64 },
    ErasePropKeyVal { subs: u32, id: u64 },
    EraseItr(u64),
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Negate,
    Increment,
    Decrement,
    Equals,
    NotEquals,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
    Not,
    Jump(u32),
    JumpFalse(u32),
    JumpTrue(u32),
    JumpFalseCheck(u32),
    JumpTrueCheck(u32),
    Cast(ValueType),
    Type,
    CallFunc(u64),
    Return,
    Function(FunctionSignature),
    Library(String),
    Property(PropertyName, Value),
    LoopCount,
    LoopOver,
    ScopeBegin,
    ScopeEnd,
    Wait,
    Exit,
    /// Same calling convention as `CallFunc` (args already pushed), but
    /// spawns a coroutine around a bytecode function instead of inlining
    /// the call, pushing a `Value::Coroutine`. Not in the spec's own
    /// opcode table: §6 only exposes coroutine creation as a host API
    /// (`call_async_function`), but scenario E's `async call compute`
    /// drives it from script source, so the parser needs some bytecode
    /// form to lower that phrase to. See `DESIGN.md`.
    CallAsync(u64),
}

impl Instruction {
    pub fn encode(&self, w: &mut ByteCodeWriter) -> Result<(), JinxError> {
        use Instruction::*;
        match self {
            PushVal(v) => {
                w.write_u8(Tag::PushVal as u8);
                w.write_value(v)?;
            }
            PushVar(id) => {
                w.write_u8(Tag::PushVar as u8);
                w.write_u64(*id);
            }
            PushProp(id) => {
                w.write_u8(Tag::PushProp as u8);
                w.write_u64(*id);
            }
            PushTop => w.write_u8(Tag::PushTop as u8),
            PushColl(n) => {
                w.write_u8(Tag::PushColl as u8);
                w.write_u32(*n);
            }
            PushList(n) => {
                w.write_u8(Tag::PushList as u8);
                w.write_u32(*n);
            }
            PushItr => w.write_u8(Tag::PushItr as u8),
            PushKeyVal => w.write_u8(Tag::PushKeyVal as u8),
            Pop => w.write_u8(Tag::Pop as u8),
            PopCount(n) => {
                w.write_u8(Tag::PopCount as u8);
                w.write_u32(*n);
            }
            SetVar(id) => {
                w.write_u8(Tag::SetVar as u8);
                w.write_u64(*id);
            }
            SetProp(id) => {
                w.write_u8(Tag::SetProp as u8);
                w.write_u64(*id);
            }
            SetVarKeyVal { subs, id } => {
                w.write_u8(Tag::SetVarKeyVal as u8);
                w.write_u32(*subs);
                w.write_u64(*id);
            }
            SetPropKeyVal { subs, id } => {
                w.write_u8(Tag::SetPropKeyVal as u8);
                w.write_u32(*subs);
                w.write_u64(*id);
            }
            SetIndex { id, stack_index, value_type } => {
                w.write_u8(Tag::SetIndex as u8);
                w.write_u64(*id);
                w.write_i32(*stack_index);
                w.write_u8(*value_type as u8);
            }
            EraseVarKeyVal { subs, id } => {
                w.write_u8(Tag::EraseVarKeyVal as u8);
                w.write_u32(*subs);
                w.write_u64(*id);
            }
            ErasePropKeyVal { subs, id } => {
                w.write_u8(Tag::ErasePropKeyVal as u8);
                w.write_u32(*subs);
                w.write_u64(*id);
            }
            EraseItr(id) => {
                w.write_u8(Tag::EraseItr as u8);
                w.write_u64(*id);
            }
            Add => w.write_u8(Tag::Add as u8),
            Subtract => w.write_u8(Tag::Subtract as u8),
            Multiply => w.write_u8(Tag::Multiply as u8),
            Divide => w.write_u8(Tag::Divide as u8),
            Mod => w.write_u8(Tag::Mod as u8),
            Negate => w.write_u8(Tag::Negate as u8),
            Increment => w.write_u8(Tag::Increment as u8),
            Decrement => w.write_u8(Tag::Decrement as u8),
            Equals => w.write_u8(Tag::Equals as u8),
            NotEquals => w.write_u8(Tag::NotEquals as u8),
            Less => w.write_u8(Tag::Less as u8),
            LessEq => w.write_u8(Tag::LessEq as u8),
            Greater => w.write_u8(Tag::Greater as u8),
            GreaterEq => w.write_u8(Tag::GreaterEq as u8),
            And => w.write_u8(Tag::And as u8),
            Or => w.write_u8(Tag::Or as u8),
            Not => w.write_u8(Tag::Not as u8),
            Jump(a) => {
                w.write_u8(Tag::Jump as u8);
                w.write_u32(*a);
            }
            JumpFalse(a) => {
                w.write_u8(Tag::JumpFalse as u8);
                w.write_u32(*a);
            }
            JumpTrue(a) => {
                w.write_u8(Tag::JumpTrue as u8);
                w.write_u32(*a);
            }
            JumpFalseCheck(a) => {
                w.write_u8(Tag::JumpFalseCheck as u8);
                w.write_u32(*a);
            }
            JumpTrueCheck(a) => {
                w.write_u8(Tag::JumpTrueCheck as u8);
                w.write_u32(*a);
            }
            Cast(t) => {
                w.write_u8(Tag::Cast as u8);
                w.write_u8(*t as u8);
            }
            Type => w.write_u8(Tag::Type as u8),
            CallFunc(id) => {
                w.write_u8(Tag::CallFunc as u8);
                w.write_u64(*id);
            }
            Return => w.write_u8(Tag::Return as u8),
            Function(sig) => {
                w.write_u8(Tag::Function as u8);
                encode_signature(w, sig);
            }
            Library(name) => {
                w.write_u8(Tag::Library as u8);
                w.write_string(name);
            }
            Property(name, default) => {
                w.write_u8(Tag::Property as u8);
                encode_property(w, name, default)?;
            }
            LoopCount => w.write_u8(Tag::LoopCount as u8),
            LoopOver => w.write_u8(Tag::LoopOver as u8),
            ScopeBegin => w.write_u8(Tag::ScopeBegin as u8),
            ScopeEnd => w.write_u8(Tag::ScopeEnd as u8),
            Wait => w.write_u8(Tag::Wait as u8),
            Exit => w.write_u8(Tag::Exit as u8),
            CallAsync(id) => {
                w.write_u8(Tag::CallAsync as u8);
                w.write_u64(*id);
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut ByteCodeReader) -> Result<Self, JinxError> {
        let tag = Tag::from_u8(r.read_u8()?)?;
        Ok(match tag {
            Tag::PushVal => Instruction::PushVal(r.read_value()?),
            Tag::PushVar => Instruction::PushVar(r.read_u64()?),
            Tag::PushProp => Instruction::PushProp(r.read_u64()?),
            Tag::PushTop => Instruction::PushTop,
            Tag::PushColl => Instruction::PushColl(r.read_u32()?),
            Tag::PushList => Instruction::PushList(r.read_u32()?),
            Tag::PushItr => Instruction::PushItr,
            Tag::PushKeyVal => Instruction::PushKeyVal,
            Tag::Pop => Instruction::Pop,
            Tag::PopCount => Instruction::PopCount(r.read_u32()?),
            Tag::SetVar => Instruction::SetVar(r.read_u64()?),
            Tag::SetProp => Instruction::SetProp(r.read_u64()?),
            Tag::SetVarKeyVal => Instruction::SetVarKeyVal {
                subs: r.read_u32()?,
                id: r.read_u64()?,
            },
            Tag::SetPropKeyVal => Instruction::SetPropKeyVal {
                subs: r.read_u32()?,
                id: r.read_u64()?,
            },
            Tag::SetIndex => {
                let id = r.read_u64()?;
                let stack_index = r.read_i32()?;
                let value_type = ValueType::from_u8(r.read_u8()?)
                    .ok_or_else(|| JinxError::format("bad ValueType immediate"))?;
                Instruction::SetIndex { id, stack_index, value_type }
            }
            Tag::EraseVarKeyVal => Instruction::EraseVarKeyVal {
                subs: r.read_u32()?,
                id: r.read_u64()?,
            },
            Tag::ErasePropKeyVal => Instruction::ErasePropKeyVal {
                subs: r.read_u32()?,
                id: r.read_u64()?,
            },
            Tag::EraseItr => Instruction::EraseItr(r.read_u64()?),
            Tag::Add => Instruction::Add,
            Tag::Subtract => Instruction::Subtract,
            Tag::Multiply => Instruction::Multiply,
            Tag::Divide => Instruction::Divide,
            Tag::Mod => Instruction::Mod,
            Tag::Negate => Instruction::Negate,
            Tag::Increment => Instruction::Increment,
            Tag::Decrement => Instruction::Decrement,
            Tag::Equals => Instruction::Equals,
            Tag::NotEquals => Instruction::NotEquals,
            Tag::Less => Instruction::Less,
            Tag::LessEq => Instruction::LessEq,
            Tag::Greater => Instruction::Greater,
            Tag::GreaterEq => Instruction::GreaterEq,
            Tag::And => Instruction::And,
            Tag::Or => Instruction::Or,
            Tag::Not => Instruction::Not,
            Tag::Jump => Instruction::Jump(r.read_u32()?),
            Tag::JumpFalse => Instruction::JumpFalse(r.read_u32()?),
            Tag::JumpTrue => Instruction::JumpTrue(r.read_u32()?),
            Tag::JumpFalseCheck => Instruction::JumpFalseCheck(r.read_u32()?),
            Tag::JumpTrueCheck => Instruction::JumpTrueCheck(r.read_u32()?),
            Tag::Cast => Instruction::Cast(
                ValueType::from_u8(r.read_u8()?)
                    .ok_or_else(|| JinxError::format("bad ValueType immediate"))?,
            ),
            Tag::Type => Instruction::Type,
            Tag::CallFunc => Instruction::CallFunc(r.read_u64()?),
            Tag::Return => Instruction::Return,
            Tag::Function => Instruction::Function(decode_signature(r)?),
            Tag::Library => Instruction::Library(r.read_string()?),
            Tag::Property => {
                let (name, default) = decode_property(r)?;
                Instruction::Property(name, default)
            }
            Tag::LoopCount => Instruction::LoopCount,
            Tag::LoopOver => Instruction::LoopOver,
            Tag::ScopeBegin => Instruction::ScopeBegin,
            Tag::ScopeEnd => Instruction::ScopeEnd,
            Tag::Wait => Instruction::Wait,
            Tag::Exit => Instruction::Exit,
            Tag::CallAsync => Instruction::CallAsync(r.read_u64()?),
        })
    }
}

fn encode_signature(w: &mut ByteCodeWriter, sig: &FunctionSignature) {
    w.write_string(&sig.library);
    w.write_u8(match sig.visibility {
        Visibility::Public => 0,
        Visibility::Private => 1,
        Visibility::Local => 2,
    });
    w.write_u64(sig.id);
    w.write_u32(sig.parts.len() as u32);
    for part in &sig.parts {
        match part {
            SignaturePart::Name(n) => {
                w.write_u8(0);
                w.write_u8(n.optional as u8);
                w.write_u32(n.alternatives.len() as u32);
                for alt in &n.alternatives {
                    w.write_string(alt);
                }
            }
            SignaturePart::Param(p) => {
                w.write_u8(1);
                match p.param_type {
                    Some(t) => {
                        w.write_u8(1);
                        w.write_u8(t as u8);
                    }
                    None => w.write_u8(0),
                }
                match &p.name {
                    Some(n) => {
                        w.write_u8(1);
                        w.write_string(n);
                    }
                    None => w.write_u8(0),
                }
            }
        }
    }
}

fn decode_signature(r: &mut ByteCodeReader) -> Result<FunctionSignature, JinxError> {
    let library = r.read_string()?;
    let visibility = match r.read_u8()? {
        0 => Visibility::Public,
        1 => Visibility::Private,
        2 => Visibility::Local,
        other => return Err(JinxError::format(format!("bad visibility tag {other}"))),
    };
    let id = r.read_u64()?;
    let part_count = r.read_u32()?;
    let mut parts = Vec::with_capacity(part_count as usize);
    for _ in 0..part_count {
        match r.read_u8()? {
            0 => {
                let optional = r.read_u8()? != 0;
                let alt_count = r.read_u32()?;
                let mut alternatives = Vec::with_capacity(alt_count as usize);
                for _ in 0..alt_count {
                    alternatives.push(r.read_string()?);
                }
                parts.push(SignaturePart::Name(NamePart {
                    alternatives,
                    optional,
                }));
            }
            1 => {
                let param_type = if r.read_u8()? != 0 {
                    Some(
                        ValueType::from_u8(r.read_u8()?)
                            .ok_or_else(|| JinxError::format("bad ValueType immediate"))?,
                    )
                } else {
                    None
                };
                let name = if r.read_u8()? != 0 {
                    Some(r.read_string()?)
                } else {
                    None
                };
                parts.push(SignaturePart::Param(ParamSlot { param_type, name }));
            }
            other => return Err(JinxError::format(format!("bad signature part tag {other}"))),
        }
    }
    Ok(FunctionSignature {
        library,
        visibility,
        parts,
        id,
    })
}

fn encode_property(w: &mut ByteCodeWriter, name: &PropertyName, default: &Value) -> Result<(), JinxError> {
    w.write_string(&name.library);
    w.write_string(&name.name);
    w.write_u8(match name.visibility {
        Visibility::Public => 0,
        Visibility::Private => 1,
        Visibility::Local => 2,
    });
    w.write_u8(name.read_only as u8);
    w.write_u64(name.id);
    w.write_value(default)
}

fn decode_property(r: &mut ByteCodeReader) -> Result<(PropertyName, Value), JinxError> {
    let library = r.read_string()?;
    let name_text = r.read_string()?;
    let visibility = match r.read_u8()? {
        0 => Visibility::Public,
        1 => Visibility::Private,
        2 => Visibility::Local,
        other => return Err(JinxError::format(format!("bad visibility tag {other}"))),
    };
    let read_only = r.read_u8()? != 0;
    let id = r.read_u64()?;
    let default = r.read_value()?;
    let part_count = name_text.split_whitespace().count();
    Ok((
        PropertyName {
            library,
            name: name_text,
            visibility,
            read_only,
            id,
            part_count,
        },
        default,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_instructions_roundtrip() {
        let program = vec![
            Instruction::PushVal(Value::Integer(1)),
            Instruction::PushVar(42),
            Instruction::Add,
            Instruction::Jump(100),
            Instruction::Return,
        ];
        let mut w = ByteCodeWriter::new();
        for ins in &program {
            ins.encode(&mut w).unwrap();
        }
        let bytes = w.into_bytes();
        let mut r = ByteCodeReader::new(&bytes);
        let mut decoded = Vec::new();
        while !r.is_at_end() {
            decoded.push(Instruction::decode(&mut r).unwrap());
        }
        assert_eq!(decoded, program);
    }

    #[test]
    fn set_index_roundtrip() {
        let ins = Instruction::SetIndex {
            id: 7,
            stack_index: -2,
            value_type: ValueType::Integer,
        };
        let mut w = ByteCodeWriter::new();
        ins.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = ByteCodeReader::new(&bytes);
        assert_eq!(Instruction::decode(&mut r).unwrap(), ins);
    }
}
