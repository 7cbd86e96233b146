//! Abstract Syntax Tree types for the circuit description language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (alphanumeric + underscore, starts with letter/_)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root AST node - a technology, its cells and the edits to run on them
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub statements: Vec<Spanned<Statement>>,
}

/// Top-level statement in a document
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `primitive gate [size: (10, 10)] { port a [...] }`
    Primitive(PrimitiveDecl),
    /// `arcproto metal [width: 2, pin: pin]`
    ArcProto(ArcProtoDecl),
    /// `cell inv [locked_instances] { ... }`
    Cell(CellDecl),
    /// `batch { rigid inv.w1  move inv.g1 [dx: 5] }`
    Batch(BatchDecl),
}

/// `key` or `key: value` inside square brackets
#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    pub key: Spanned<Identifier>,
    pub value: Option<Spanned<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    /// `(x, y)`
    Pair(f64, f64),
    Name(Identifier),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveDecl {
    pub name: Spanned<Identifier>,
    pub modifiers: Vec<Spanned<Modifier>>,
    pub ports: Vec<Spanned<PortDecl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortDecl {
    pub name: Spanned<Identifier>,
    pub modifiers: Vec<Spanned<Modifier>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArcProtoDecl {
    pub name: Spanned<Identifier>,
    pub modifiers: Vec<Spanned<Modifier>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellDecl {
    pub name: Spanned<Identifier>,
    pub modifiers: Vec<Spanned<Modifier>>,
    pub items: Vec<Spanned<CellItem>>,
}

/// Statement inside a cell body
#[derive(Debug, Clone, PartialEq)]
pub enum CellItem {
    Node(NodeDecl),
    Arc(ArcDecl),
    Export(ExportDecl),
}

/// `node g1: gate at (0, 0) [rotation: 900]`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDecl {
    pub name: Spanned<Identifier>,
    /// Primitive or cell name
    pub proto: Spanned<Identifier>,
    pub at: Option<Spanned<(f64, f64)>>,
    pub modifiers: Vec<Spanned<Modifier>>,
}

/// `node.port`, or just `node` for its first port
#[derive(Debug, Clone, PartialEq)]
pub struct PortRef {
    pub node: Spanned<Identifier>,
    pub port: Option<Spanned<Identifier>>,
}

/// `arc w1: metal g1.y -- p1.p [rigid]`; the name is optional
#[derive(Debug, Clone, PartialEq)]
pub struct ArcDecl {
    pub name: Option<Spanned<Identifier>>,
    pub proto: Spanned<Identifier>,
    pub head: PortRef,
    pub tail: PortRef,
    pub modifiers: Vec<Spanned<Modifier>>,
}

/// `export out = g1.y`
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDecl {
    pub name: Spanned<Identifier>,
    pub target: PortRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchDecl {
    pub items: Vec<Spanned<BatchItem>>,
}

/// `cell.item`
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedName {
    pub cell: Spanned<Identifier>,
    pub item: Spanned<Identifier>,
}

/// Statement inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    /// `move inv.g1 [dx: 5, rotate: 900]`
    Move {
        target: QualifiedName,
        modifiers: Vec<Spanned<Modifier>>,
    },
    /// `rigid inv.w1`: rigid for this batch only
    Rigid(QualifiedName),
    /// `flexible inv.w1`: flexible for this batch only
    Flexible(QualifiedName),
}
