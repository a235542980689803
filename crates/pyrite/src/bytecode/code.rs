//! Code objects: the compiled unit the VM executes.
//!
//! A [`Code`] is produced by an external compiler (or by [`CodeBuilder`](super::CodeBuilder))
//! and is immutable once built. It carries the bytecode, a constant pool, the name tables
//! referenced by name opcodes, the local/cell layout, a location table for tracebacks and
//! an exception table for `try`/`with` handlers.
//!
//! Code objects round-trip through the postcard wire format with [`Code::to_bytes`] and
//! [`Code::from_bytes`].

use std::{fmt, rc::Rc};

use serde::{Deserialize, Serialize};

/// Compile-time constant stored in a code object's constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(f64, f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Constant>),
    /// A nested code object, used by `MakeFunction`.
    Code(Rc<Code>),
}

/// What kind of frame a code object runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CodeKind {
    /// Plain function, module body or class body.
    #[default]
    Function,
    /// Calling the function returns a generator.
    Generator,
    /// Calling the function returns a coroutine.
    Coroutine,
}

/// Parameter layout of a function.
///
/// Parameters occupy the first local slots in this order: positional parameters,
/// the `*args` tuple, keyword-only parameters, the `**kwargs` dict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    pub positional: u16,
    pub kwonly: u16,
    pub varargs: bool,
    pub varkw: bool,
}

impl Signature {
    /// Number of local slots used by parameters.
    #[must_use]
    pub fn param_slots(&self) -> usize {
        usize::from(self.positional) + usize::from(self.kwonly) + usize::from(self.varargs) + usize::from(self.varkw)
    }

    #[must_use]
    pub fn varargs_slot(&self) -> Option<usize> {
        self.varargs.then_some(usize::from(self.positional))
    }

    #[must_use]
    pub fn kwonly_range(&self) -> std::ops::Range<usize> {
        let start = usize::from(self.positional) + usize::from(self.varargs);
        start..start + usize::from(self.kwonly)
    }

    #[must_use]
    pub fn varkw_slot(&self) -> Option<usize> {
        self.varkw.then_some(self.kwonly_range().end)
    }
}

/// A cell variable: a local captured by an inner function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellVar {
    pub name: String,
    /// When the captured variable is a parameter, the local slot its initial value comes from.
    pub param_slot: Option<u16>,
}

/// Maps an instruction offset to a source position. Entries are sorted by offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

/// A protected bytecode range and its handler.
///
/// An exception raised by an instruction in `start..end` truncates the evaluation stack to
/// `stack_depth`, pushes the exception and jumps to `handler`. When ranges nest, the
/// narrowest one covering the instruction wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    pub stack_depth: u16,
}

/// An immutable compiled code object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub(crate) name: String,
    pub(crate) filename: String,
    pub(crate) kind: CodeKind,
    pub(crate) signature: Signature,
    pub(crate) bytecode: Vec<u8>,
    pub(crate) constants: Vec<Constant>,
    pub(crate) names: Vec<String>,
    pub(crate) local_names: Vec<String>,
    pub(crate) cell_vars: Vec<CellVar>,
    pub(crate) free_vars: Vec<String>,
    pub(crate) locations: Vec<LocationEntry>,
    pub(crate) exception_table: Vec<ExceptionEntry>,
}

/// Failure to decode a code object from its wire form, reported before execution starts.
#[derive(Debug)]
pub struct CodeLoadError {
    source: postcard::Error,
}

impl fmt::Display for CodeLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load code object: {}", self.source)
    }
}

impl std::error::Error for CodeLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Code {
    /// Decodes a code object from its postcard wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodeLoadError> {
        postcard::from_bytes(bytes).map_err(|source| CodeLoadError { source })
    }

    /// Encodes the code object to its postcard wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodeLoadError> {
        postcard::to_allocvec(self).map_err(|source| CodeLoadError { source })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn kind(&self) -> CodeKind {
        self.kind
    }

    #[must_use]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    #[must_use]
    pub fn constant(&self, index: usize) -> Option<&Constant> {
        self.constants.get(index)
    }

    #[must_use]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    #[must_use]
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn num_locals(&self) -> usize {
        self.local_names.len()
    }

    #[must_use]
    pub fn local_names(&self) -> &[String] {
        &self.local_names
    }

    #[must_use]
    pub fn cell_vars(&self) -> &[CellVar] {
        &self.cell_vars
    }

    #[must_use]
    pub fn free_vars(&self) -> &[String] {
        &self.free_vars
    }

    /// Name of cell slot `index` (cellvars first, then freevars).
    #[must_use]
    pub fn cell_name(&self, index: usize) -> &str {
        match self.cell_vars.get(index) {
            Some(cell) => &cell.name,
            None => self
                .free_vars
                .get(index - self.cell_vars.len())
                .map_or("<cell>", String::as_str),
        }
    }

    #[must_use]
    pub fn exception_table(&self) -> &[ExceptionEntry] {
        &self.exception_table
    }

    /// Source line of the instruction at `offset`; 0 when the location table is empty.
    #[must_use]
    pub fn line_for(&self, offset: usize) -> u32 {
        let offset = offset as u32;
        let idx = self.locations.partition_point(|entry| entry.offset <= offset);
        idx.checked_sub(1).map_or(0, |i| self.locations[i].line)
    }

    /// The innermost handler covering `offset`: the narrowest covering range, the
    /// earliest entry on ties.
    #[must_use]
    pub fn handler_for(&self, offset: usize) -> Option<ExceptionEntry> {
        let offset = offset as u32;
        self.exception_table
            .iter()
            .filter(|entry| entry.start <= offset && offset < entry.end)
            .min_by_key(|entry| entry.end - entry.start)
            .copied()
    }

    #[must_use]
    pub fn is_generator(&self) -> bool {
        self.kind == CodeKind::Generator
    }

    #[must_use]
    pub fn is_coroutine(&self) -> bool {
        self.kind == CodeKind::Coroutine
    }
}
