//! Instruction Codec
//!
//! Binary encoding of the four protocol operations that cross into the
//! settlement authority. The layout is declared once in [`SCHEMA`]; both
//! directions walk that table, so a field added there is picked up by the
//! encoder and the decoder together.
//!
//! ## Layout
//!
//! ```text
//! [discriminator: u8] [field 0] [field 1] ...
//!
//! str   = [len: u32 LE] [utf-8 bytes]
//! u64   = 8 bytes LE
//! u8    = 1 byte
//! bool  = 1 byte, 0 or 1
//! side  = 1 byte, 0 = A, 1 = B
//! method= 1 byte, 0 = AI, 1 = Human
//! ```

use thiserror::Error;

use crate::protocol::pool::Side;
use crate::protocol::resolution::ResolutionMethod;

/// Version of the wire schema below.
pub const SCHEMA_VERSION: u8 = 1;

// =============================================================================
// SCHEMA
// =============================================================================

/// Encoding of a single field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Length-prefixed UTF-8.
    Str,
    /// Little-endian u64.
    U64,
    /// Raw byte.
    U8,
    /// 0 or 1.
    Bool,
    /// Side index.
    Side,
    /// Resolution method index.
    Method,
}

/// A named field in an operation record.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    /// Field name, as reported in decode errors.
    pub name: &'static str,
    /// Wire encoding of the field.
    pub kind: FieldKind,
}

/// Record layout of one operation.
#[derive(Clone, Copy, Debug)]
pub struct OpSchema {
    /// Operation name.
    pub name: &'static str,
    /// Leading byte of the record.
    pub discriminator: u8,
    /// Fields in wire order.
    pub fields: &'static [FieldSpec],
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Wire schema, indexed by discriminator.
pub const SCHEMA: [OpSchema; 4] = [
    OpSchema {
        name: "create_claim",
        discriminator: 0,
        fields: &[
            field("claim_text", FieldKind::Str),
            field("deadline", FieldKind::U64),
            field("stake", FieldKind::U64),
            field("category", FieldKind::Str),
            field("subcategory", FieldKind::Str),
        ],
    },
    OpSchema {
        name: "join_pool",
        discriminator: 1,
        fields: &[
            field("side", FieldKind::Side),
            field("amount", FieldKind::U64),
        ],
    },
    OpSchema {
        name: "submit_resolution",
        discriminator: 2,
        fields: &[
            field("verdict", FieldKind::Bool),
            field("confidence", FieldKind::U8),
            field("method", FieldKind::Method),
        ],
    },
    OpSchema {
        name: "claim_payout",
        discriminator: 3,
        fields: &[],
    },
];

/// Look up a record layout.
pub fn schema_for(discriminator: u8) -> Option<&'static OpSchema> {
    SCHEMA.get(discriminator as usize)
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why a buffer could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Ran out of bytes mid-record.
    #[error("input truncated: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        /// Bytes the next read wanted.
        needed: usize,
        /// Bytes left.
        remaining: usize,
    },

    /// No operation has this leading byte.
    #[error("unknown instruction discriminator {0}")]
    UnknownDiscriminator(u8),

    /// Enum-like byte out of range.
    #[error("invalid value {value} for field {field}")]
    InvalidFieldValue {
        /// Offending field.
        field: &'static str,
        /// Byte read.
        value: u8,
    },

    /// String field is not UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Offending field.
        field: &'static str,
    },

    /// Bytes left after the last field.
    #[error("{0} trailing bytes after instruction")]
    TrailingBytes(usize),
}

/// Why an instruction could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// String longer than its length prefix can express.
    #[error("field {field} is {len} bytes, exceeds u32 length prefix")]
    FieldTooLong {
        /// Offending field.
        field: &'static str,
        /// Its byte length.
        len: usize,
    },
}

// =============================================================================
// INSTRUCTION
// =============================================================================

/// A protocol operation as submitted to the authority.
///
/// The acting account and target claim are not part of the record; they
/// travel in the submission envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Post a claim; the creator's stake seeds side A.
    CreateClaim {
        claim_text: String,
        deadline: u64,
        stake: u64,
        category: String,
        subcategory: String,
    },
    /// Wager on a side.
    JoinPool { side: Side, amount: u64 },
    /// Submit a verdict.
    SubmitResolution {
        verdict: bool,
        confidence: u8,
        method: ResolutionMethod,
    },
    /// Collect what the caller is owed.
    ClaimPayout,
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Value {
    Str(String),
    U64(u64),
    U8(u8),
    Bool(bool),
    Side(Side),
    Method(ResolutionMethod),
}

impl Instruction {
    /// Wire discriminator.
    pub fn discriminator(&self) -> u8 {
        match self {
            Instruction::CreateClaim { .. } => 0,
            Instruction::JoinPool { .. } => 1,
            Instruction::SubmitResolution { .. } => 2,
            Instruction::ClaimPayout => 3,
        }
    }

    /// Operation name from the schema.
    pub fn name(&self) -> &'static str {
        SCHEMA[self.discriminator() as usize].name
    }

    /// Whether the operation targets an existing claim.
    pub fn needs_claim(&self) -> bool {
        !matches!(self, Instruction::CreateClaim { .. })
    }

    /// Field values in schema order.
    fn values(&self) -> Vec<Value> {
        match self {
            Instruction::CreateClaim { claim_text, deadline, stake, category, subcategory } => vec![
                Value::Str(claim_text.clone()),
                Value::U64(*deadline),
                Value::U64(*stake),
                Value::Str(category.clone()),
                Value::Str(subcategory.clone()),
            ],
            Instruction::JoinPool { side, amount } => vec![Value::Side(*side), Value::U64(*amount)],
            Instruction::SubmitResolution { verdict, confidence, method } => vec![
                Value::Bool(*verdict),
                Value::U8(*confidence),
                Value::Method(*method),
            ],
            Instruction::ClaimPayout => Vec::new(),
        }
    }

    /// Build from values read against `schema`.
    fn assemble(schema: &OpSchema, values: Vec<Value>) -> Option<Self> {
        let mut values = values.into_iter();
        let mut next = || values.next();

        let instruction = match schema.discriminator {
            0 => {
                let (Some(Value::Str(claim_text)), Some(Value::U64(deadline)), Some(Value::U64(stake)), Some(Value::Str(category)), Some(Value::Str(subcategory))) =
                    (next(), next(), next(), next(), next())
                else {
                    return None;
                };
                Instruction::CreateClaim { claim_text, deadline, stake, category, subcategory }
            }
            1 => {
                let (Some(Value::Side(side)), Some(Value::U64(amount))) = (next(), next()) else {
                    return None;
                };
                Instruction::JoinPool { side, amount }
            }
            2 => {
                let (Some(Value::Bool(verdict)), Some(Value::U8(confidence)), Some(Value::Method(method))) =
                    (next(), next(), next())
                else {
                    return None;
                };
                Instruction::SubmitResolution { verdict, confidence, method }
            }
            3 => Instruction::ClaimPayout,
            _ => return None,
        };
        Some(instruction)
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let schema = &SCHEMA[self.discriminator() as usize];
        let mut out = Vec::with_capacity(64);
        out.push(schema.discriminator);

        for (field_spec, value) in schema.fields.iter().zip(self.values()) {
            match value {
                Value::Str(s) => {
                    let len = u32::try_from(s.len())
                        .map_err(|_| EncodeError::FieldTooLong { field: field_spec.name, len: s.len() })?;
                    out.extend_from_slice(&len.to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                Value::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::U8(v) => out.push(v),
                Value::Bool(v) => out.push(v as u8),
                Value::Side(side) => out.push(side as u8),
                Value::Method(method) => out.push(method as u8),
            }
        }

        Ok(out)
    }

    /// Parse wire bytes. The whole buffer must be consumed.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);
        let discriminator = reader.u8()?;
        let schema = schema_for(discriminator).ok_or(DecodeError::UnknownDiscriminator(discriminator))?;

        let values = schema
            .fields
            .iter()
            .map(|field_spec| reader.value(field_spec))
            .collect::<Result<Vec<_>, _>>()?;

        let trailing = reader.remaining();
        if trailing > 0 {
            return Err(DecodeError::TrailingBytes(trailing));
        }

        Self::assemble(schema, values).ok_or(DecodeError::UnknownDiscriminator(discriminator))
    }

    /// Encode as a hex string for JSON envelopes.
    pub fn to_hex(&self) -> Result<String, EncodeError> {
        self.encode().map(hex::encode)
    }
}

// =============================================================================
// READER
// =============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::TruncatedInput { needed: n, remaining: self.remaining() });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn value(&mut self, field_spec: &FieldSpec) -> Result<Value, DecodeError> {
        let invalid = |value| DecodeError::InvalidFieldValue { field: field_spec.name, value };

        Ok(match field_spec.kind {
            FieldKind::Str => {
                let len = self.u32()? as usize;
                let raw = self.take(len)?;
                let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8 { field: field_spec.name })?;
                Value::Str(s.to_owned())
            }
            FieldKind::U64 => Value::U64(self.u64()?),
            FieldKind::U8 => Value::U8(self.u8()?),
            FieldKind::Bool => match self.u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                v => return Err(invalid(v)),
            },
            FieldKind::Side => {
                let v = self.u8()?;
                Value::Side(Side::from_index(v).ok_or_else(|| invalid(v))?)
            }
            FieldKind::Method => {
                let v = self.u8()?;
                Value::Method(ResolutionMethod::from_index(v).ok_or_else(|| invalid(v))?)
            }
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
