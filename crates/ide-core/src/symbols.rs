//! Symbol data model.
//!
//! Navigation queries (definitions, references, outlines, workspace symbol search) return
//! [`SymbolReference`] values. They are immutable snapshots: once the target document changes
//! the reference may go stale and the caller has to query again.

use crate::line_index::Position;
use serde::{Deserialize, Serialize};

/// A coarse symbol kind tag, following the LSP `SymbolKind` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A file-level symbol.
    File,
    /// A module symbol.
    Module,
    /// A namespace symbol.
    Namespace,
    /// A package symbol.
    Package,
    /// A class symbol.
    Class,
    /// A method symbol.
    Method,
    /// A property symbol.
    Property,
    /// A field symbol.
    Field,
    /// A constructor symbol.
    Constructor,
    /// An enum symbol.
    Enum,
    /// An interface symbol.
    Interface,
    /// A function symbol.
    Function,
    /// A variable symbol.
    Variable,
    /// A constant symbol.
    Constant,
    /// A string-like symbol.
    String,
    /// A numeric symbol.
    Number,
    /// A boolean symbol.
    Boolean,
    /// An array symbol.
    Array,
    /// An object symbol.
    Object,
    /// A key symbol.
    Key,
    /// A null symbol.
    Null,
    /// An enum member symbol.
    EnumMember,
    /// A struct symbol.
    Struct,
    /// An event symbol.
    Event,
    /// An operator symbol.
    Operator,
    /// A type parameter symbol.
    TypeParameter,
    /// A server-defined kind value.
    Custom(u32),
}

impl SymbolKind {
    /// Convert an LSP `SymbolKind` numeric value.
    pub fn from_lsp_kind(kind: u32) -> Self {
        match kind {
            1 => Self::File,
            2 => Self::Module,
            3 => Self::Namespace,
            4 => Self::Package,
            5 => Self::Class,
            6 => Self::Method,
            7 => Self::Property,
            8 => Self::Field,
            9 => Self::Constructor,
            10 => Self::Enum,
            11 => Self::Interface,
            12 => Self::Function,
            13 => Self::Variable,
            14 => Self::Constant,
            15 => Self::String,
            16 => Self::Number,
            17 => Self::Boolean,
            18 => Self::Array,
            19 => Self::Object,
            20 => Self::Key,
            21 => Self::Null,
            22 => Self::EnumMember,
            23 => Self::Struct,
            24 => Self::Event,
            25 => Self::Operator,
            26 => Self::TypeParameter,
            other => Self::Custom(other),
        }
    }
}

/// A location returned by a navigation query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolReference {
    /// Target document URI (`file://...`).
    pub uri: String,
    /// Start of the symbol (or referenced span).
    pub position: Position,
    /// End of the symbol span, when the server reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Position>,
    /// Symbol name, for outline and symbol search results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Symbol kind, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SymbolKind>,
    /// Name of the enclosing symbol (class, module, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

impl SymbolReference {
    /// A bare location without symbol metadata.
    pub fn location(uri: impl Into<String>, position: Position, end: Option<Position>) -> Self {
        Self {
            uri: uri.into(),
            position,
            end,
            name: None,
            kind: None,
            container_name: None,
        }
    }
}
