//! WASM type definitions
//!
//! Core types for the WASM runtime: the value model, errors and limits

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use wasmtime::{Val, ValType};

/// WASM value crossing the host/guest boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WasmValue {
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
}

impl WasmValue {
    /// Kind tag of this value
    pub fn kind(&self) -> WasmType {
        match self {
            WasmValue::I32(_) => WasmType::I32,
            WasmValue::I64(_) => WasmType::I64,
            WasmValue::F32(_) => WasmType::F32,
            WasmValue::F64(_) => WasmType::F64,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            WasmValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WasmValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            WasmValue::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WasmValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Interpret an i32 value as an offset into linear memory
    pub fn as_ptr(&self) -> WasmResult<u32> {
        match self {
            WasmValue::I32(v) => Ok(*v as u32),
            other => Err(WasmError::TypeMismatch {
                expected: WasmType::I32.to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }
}

impl fmt::Display for WasmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WasmValue::I32(v) => write!(f, "i32:{}", v),
            WasmValue::I64(v) => write!(f, "i64:{}", v),
            WasmValue::F32(v) => write!(f, "f32:{}", v),
            WasmValue::F64(v) => write!(f, "f64:{}", v),
        }
    }
}

impl From<i32> for WasmValue {
    fn from(v: i32) -> Self {
        WasmValue::I32(v)
    }
}

impl From<i64> for WasmValue {
    fn from(v: i64) -> Self {
        WasmValue::I64(v)
    }
}

impl From<f32> for WasmValue {
    fn from(v: f32) -> Self {
        WasmValue::F32(v)
    }
}

impl From<f64> for WasmValue {
    fn from(v: f64) -> Self {
        WasmValue::F64(v)
    }
}

impl From<WasmValue> for Val {
    fn from(v: WasmValue) -> Self {
        match v {
            WasmValue::I32(v) => Val::I32(v),
            WasmValue::I64(v) => Val::I64(v),
            WasmValue::F32(v) => Val::F32(v.to_bits()),
            WasmValue::F64(v) => Val::F64(v.to_bits()),
        }
    }
}

impl TryFrom<&Val> for WasmValue {
    type Error = WasmError;

    fn try_from(v: &Val) -> WasmResult<Self> {
        match v {
            Val::I32(v) => Ok(WasmValue::I32(*v)),
            Val::I64(v) => Ok(WasmValue::I64(*v)),
            Val::F32(bits) => Ok(WasmValue::F32(f32::from_bits(*bits))),
            Val::F64(bits) => Ok(WasmValue::F64(f64::from_bits(*bits))),
            _ => Err(WasmError::TypeMismatch {
                expected: "i32, i64, f32 or f64".to_string(),
                actual: "reference or vector".to_string(),
            }),
        }
    }
}

/// Rust scalars that map onto a WASM value kind
pub trait WasmPrimitive: Sized + Copy {
    const TYPE: WasmType;

    fn from_value(value: WasmValue) -> Option<Self>;
}

impl WasmPrimitive for i32 {
    const TYPE: WasmType = WasmType::I32;

    fn from_value(value: WasmValue) -> Option<Self> {
        value.as_i32()
    }
}

impl WasmPrimitive for i64 {
    const TYPE: WasmType = WasmType::I64;

    fn from_value(value: WasmValue) -> Option<Self> {
        value.as_i64()
    }
}

impl WasmPrimitive for f32 {
    const TYPE: WasmType = WasmType::F32;

    fn from_value(value: WasmValue) -> Option<Self> {
        value.as_f32()
    }
}

impl WasmPrimitive for f64 {
    const TYPE: WasmType = WasmType::F64;

    fn from_value(value: WasmValue) -> Option<Self> {
        value.as_f64()
    }
}

/// WASM value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WasmType {
    I32,
    I64,
    F32,
    F64,
}

impl WasmType {
    /// Zero value of this kind
    pub fn zero(&self) -> WasmValue {
        match self {
            WasmType::I32 => WasmValue::I32(0),
            WasmType::I64 => WasmValue::I64(0),
            WasmType::F32 => WasmValue::F32(0.0),
            WasmType::F64 => WasmValue::F64(0.0),
        }
    }

    /// Map an engine value type, `None` for vector and reference types
    pub fn from_val_type(ty: &ValType) -> Option<Self> {
        match ty {
            ValType::I32 => Some(WasmType::I32),
            ValType::I64 => Some(WasmType::I64),
            ValType::F32 => Some(WasmType::F32),
            ValType::F64 => Some(WasmType::F64),
            _ => None,
        }
    }

    pub fn to_val_type(self) -> ValType {
        match self {
            WasmType::I32 => ValType::I32,
            WasmType::I64 => ValType::I64,
            WasmType::F32 => ValType::F32,
            WasmType::F64 => ValType::F64,
        }
    }

    pub(crate) fn describe(ty: &ValType) -> String {
        match Self::from_val_type(ty) {
            Some(t) => t.to_string(),
            None => format!("{}", ty),
        }
    }
}

impl fmt::Display for WasmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WasmType::I32 => write!(f, "i32"),
            WasmType::I64 => write!(f, "i64"),
            WasmType::F32 => write!(f, "f32"),
            WasmType::F64 => write!(f, "f64"),
        }
    }
}

/// Where a guest binary comes from
#[derive(Debug, Clone, Copy)]
pub enum ModuleSource<'a> {
    /// Binary (or text format) file on disk
    Path(&'a Path),
    /// In-memory binary (or text format) buffer
    Bytes(&'a [u8]),
}

impl<'a> From<&'a Path> for ModuleSource<'a> {
    fn from(path: &'a Path) -> Self {
        ModuleSource::Path(path)
    }
}

impl<'a> From<&'a [u8]> for ModuleSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ModuleSource::Bytes(bytes)
    }
}

impl<'a> From<&'a str> for ModuleSource<'a> {
    fn from(text: &'a str) -> Self {
        ModuleSource::Bytes(text.as_bytes())
    }
}

/// WASM runtime errors
#[derive(Debug, Error)]
pub enum WasmError {
    #[error("Failed to compile WASM module: {0}")]
    CompileError(String),

    #[error("Failed to instantiate WASM module: {0}")]
    InstantiationError(String),

    #[error("Export not found: {0}")]
    UnknownExport(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Trap in {function}: {reason}")]
    Trap { function: String, reason: String },

    #[error("Memory access out of bounds: offset={offset}, size={size}")]
    MemoryOutOfBounds { offset: u64, size: u64 },

    #[error("{0}() : missing wasm instance")]
    MissingInstance(String),

    #[error("No module loaded")]
    NotLoaded,

    #[error("Host function error: {0}")]
    HostFunctionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WasmError {
    /// Guest runtime fault, including bounds violations caught by the host
    pub fn is_trap(&self) -> bool {
        matches!(
            self,
            WasmError::Trap { .. } | WasmError::MemoryOutOfBounds { .. }
        )
    }

    pub(crate) fn type_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        WasmError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn out_of_bounds(offset: usize, size: usize) -> Self {
        WasmError::MemoryOutOfBounds {
            offset: offset as u64,
            size: size as u64,
        }
    }
}

/// WASM result type
pub type WasmResult<T> = Result<T, WasmError>;

/// Resource limits applied to every instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum linear memory in 64KiB pages
    pub max_memory_pages: u32,
    /// Maximum table elements
    pub max_table_elements: u32,
    /// Maximum native stack used by guest code, in bytes
    pub max_wasm_stack: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_pages: 256, // 16MB
            max_table_elements: 10000,
            max_wasm_stack: 512 * 1024,
        }
    }
}

impl ResourceLimits {
    pub const PAGE_SIZE: usize = 65536;

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_pages as usize * Self::PAGE_SIZE
    }
}
