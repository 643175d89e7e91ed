/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! AST types consumed by the compiler.
//!
//! The AST is produced by an external parser. This module only fixes its
//! shape so that the recorder and the code generator can walk it.
//!
//! ## Design
//!
//! - `ExpressionKind` and `StatementKind` are flat enums; pattern matching
//!   replaces virtual dispatch.
//! - `Node<T>` wraps every AST node with a `NodeId` and a `SourceRange`.
//!   Node ids key every side table (scope map, parameter map, type table).
//! - Functions and classes are boxed inline. The recorder allocates fresh
//!   ids from `Program::next_node_id` for nodes it synthesizes (default
//!   class constructors).
//! - `AstBuilder` is a small convenience for producers (and tests) that
//!   assigns ids and positions.

use rustc_hash::FxHashMap;

/// Identity of an AST node, unique within one `Program`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone)]
pub struct Node<T> {
    pub id: NodeId,
    pub range: SourceRange,
    pub inner: T,
}

pub type Statement = Node<StatementKind>;
pub type Expression = Node<ExpressionKind>;

#[derive(Debug, Clone)]
pub struct Identifier {
    pub id: NodeId,
    pub range: SourceRange,
    pub name: String,
}

// =============================================================================
// Program
// =============================================================================

#[derive(Debug, Clone)]
pub struct Program {
    pub id: NodeId,
    pub range: SourceRange,
    pub statements: Vec<Statement>,
    pub is_strict: bool,
    /// First id not used by any node in the tree.
    pub next_node_id: u32,
    /// Synthetic node -> the source node it was derived from.
    pub original_nodes: FxHashMap<NodeId, NodeId>,
}

impl Program {
    /// The node type lookups should use for `id`.
    pub fn original_node(&self, id: NodeId) -> NodeId {
        self.original_nodes.get(&id).copied().unwrap_or(id)
    }
}

/// Lookup into the external type-recording table.
pub trait TypeTable {
    fn type_index(&self, node: NodeId) -> Option<u32>;
}

/// Type index recorded when no type is known.
pub const ANY_TYPE: u32 = 0;

/// A type table without any entries.
pub struct NoTypes;

impl TypeTable for NoTypes {
    fn type_index(&self, _node: NodeId) -> Option<u32> {
        None
    }
}

impl TypeTable for FxHashMap<NodeId, u32> {
    fn type_index(&self, node: NodeId) -> Option<u32> {
        self.get(&node).copied()
    }
}

// =============================================================================
// Declarations and patterns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub kind: DeclarationKind,
    pub declarators: Vec<VariableDeclarator>,
}

#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub id: NodeId,
    pub range: SourceRange,
    pub target: BindingTarget,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone)]
pub enum BindingTarget {
    Identifier(Identifier),
    Pattern(Box<BindingPattern>),
}

impl BindingTarget {
    /// Every identifier bound by this target, in source order.
    pub fn bound_names(&self) -> Vec<&Identifier> {
        let mut names = Vec::new();
        self.collect_bound_names(&mut names);
        names
    }

    fn collect_bound_names<'a>(&'a self, names: &mut Vec<&'a Identifier>) {
        match self {
            BindingTarget::Identifier(ident) => names.push(ident),
            BindingTarget::Pattern(pattern) => {
                for element in &pattern.elements {
                    if let Some(target) = &element.target {
                        target.collect_bound_names(names);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Array,
    Object,
}

#[derive(Debug, Clone)]
pub struct BindingPattern {
    pub id: NodeId,
    pub range: SourceRange,
    pub kind: PatternKind,
    pub elements: Vec<BindingElement>,
}

#[derive(Debug, Clone)]
pub struct BindingElement {
    /// Property key; only present in object patterns.
    pub key: Option<PropertyKey>,
    /// `None` for an elision in an array pattern.
    pub target: Option<BindingTarget>,
    pub default: Option<Expression>,
    pub is_rest: bool,
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Identifier(String),
    String(String),
    Number(f64),
    Computed(Box<Expression>),
}

impl PropertyKey {
    /// The literal name of a non-computed key.
    pub fn literal_name(&self) -> Option<String> {
        match self {
            PropertyKey::Identifier(name) | PropertyKey::String(name) => Some(name.clone()),
            PropertyKey::Number(n) => Some(format_number(*n)),
            PropertyKey::Computed(_) => None,
        }
    }
}

/// Render a number the way it appears as a property name.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// =============================================================================
// Functions and classes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    Getter,
    Setter,
    Constructor,
    Generator,
    Async,
    AsyncArrow,
    AsyncGenerator,
}

impl FunctionKind {
    pub fn is_arrow(self) -> bool {
        matches!(self, FunctionKind::Arrow | FunctionKind::AsyncArrow)
    }

    pub fn is_generator_or_async(self) -> bool {
        matches!(
            self,
            FunctionKind::Generator
                | FunctionKind::Async
                | FunctionKind::AsyncArrow
                | FunctionKind::AsyncGenerator
        )
    }
}

#[derive(Debug, Clone)]
pub struct FunctionData {
    pub id: NodeId,
    pub range: SourceRange,
    pub name: Option<Identifier>,
    pub kind: FunctionKind,
    /// True for function expressions (as opposed to declarations, methods
    /// and arrows). Only these bind their own name in their own scope.
    pub is_expression: bool,
    pub parameters: Vec<Parameter>,
    pub body: FunctionBody,
    pub is_strict: bool,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub id: NodeId,
    pub range: SourceRange,
    pub target: BindingTarget,
    pub default: Option<Expression>,
    pub is_rest: bool,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Block),
    Expression(Box<Expression>),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: NodeId,
    pub range: SourceRange,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct ClassData {
    pub id: NodeId,
    pub range: SourceRange,
    pub name: Option<Identifier>,
    pub super_class: Option<Box<Expression>>,
    pub members: Vec<ClassMember>,
    pub is_expression: bool,
}

impl ClassData {
    pub fn constructor(&self) -> Option<&FunctionData> {
        self.members.iter().find_map(|member| match &member.kind {
            ClassMemberKind::Method(function) if function.kind == FunctionKind::Constructor => {
                Some(function.as_ref())
            }
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub id: NodeId,
    pub range: SourceRange,
    pub key: PropertyKey,
    pub is_static: bool,
    pub kind: ClassMemberKind,
}

#[derive(Debug, Clone)]
pub enum ClassMemberKind {
    /// Constructor, method, getter or setter, told apart by the function kind.
    Method(Box<FunctionData>),
    Field(Option<Box<Expression>>),
}

// =============================================================================
// Modules
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    None,
    Named,
    Default,
}

#[derive(Debug, Clone)]
pub struct ImportDeclaration {
    pub module_request: String,
    pub default_binding: Option<Identifier>,
    pub namespace_binding: Option<Identifier>,
    /// `None` when there is no braced clause; `Some(vec![])` for `import {} from`.
    pub named_bindings: Option<Vec<ImportSpecifier>>,
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    pub id: NodeId,
    pub imported: String,
    pub local: Identifier,
}

#[derive(Debug, Clone)]
pub struct ExportDeclaration {
    pub module_request: Option<String>,
    /// `None` for `export * from "m"`.
    pub specifiers: Option<Vec<ExportSpecifier>>,
}

#[derive(Debug, Clone)]
pub struct ExportSpecifier {
    pub id: NodeId,
    pub local: String,
    pub exported: String,
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone)]
pub enum StatementKind {
    Empty,
    Block(Block),
    Variable {
        declaration: VariableDeclaration,
        exported: bool,
    },
    Expression(Expression),
    If {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },
    While {
        test: Expression,
        body: Box<Statement>,
    },
    DoWhile {
        body: Box<Statement>,
        test: Expression,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
    },
    ForIn {
        lhs: ForInOfLhs,
        rhs: Expression,
        body: Box<Statement>,
    },
    ForOf {
        lhs: ForInOfLhs,
        rhs: Expression,
        body: Box<Statement>,
    },
    Continue(Option<String>),
    Break(Option<String>),
    Return(Option<Expression>),
    Labelled {
        label: String,
        body: Box<Statement>,
    },
    Throw(Expression),
    Try {
        block: Block,
        handler: Option<CatchClause>,
        finalizer: Option<Block>,
    },
    Switch {
        discriminant: Expression,
        cases: Vec<SwitchCase>,
    },
    Debugger,
    FunctionDeclaration {
        function: Box<FunctionData>,
        export: ExportKind,
    },
    ClassDeclaration {
        class: Box<ClassData>,
        export: ExportKind,
    },
    Import(ImportDeclaration),
    Export(ExportDeclaration),
    /// `export default <expression>`
    ExportDefault(Expression),
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Declaration(VariableDeclaration),
    Expression(Expression),
}

#[derive(Debug, Clone)]
pub enum ForInOfLhs {
    Declaration(VariableDeclaration),
    Target(Expression),
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub id: NodeId,
    pub range: SourceRange,
    pub param: Option<BindingTarget>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub id: NodeId,
    pub test: Option<Expression>,
    pub body: Vec<Statement>,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,
    Compound(BinaryOp),
}

#[derive(Debug, Clone)]
pub enum AssignmentTarget {
    Simple(Box<Expression>),
    Pattern(Box<BindingPattern>),
}

#[derive(Debug, Clone)]
pub enum ObjectProperty {
    KeyValue { key: PropertyKey, value: Expression },
    Shorthand(Identifier),
    /// Method, getter or setter, told apart by the function kind.
    Method { key: PropertyKey, function: Box<FunctionData> },
    Spread(Expression),
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    Number(f64),
    BigInt(String),
    String(String),
    Boolean(bool),
    Null,
    RegExp {
        pattern: String,
        flags: String,
    },
    Template {
        quasis: Vec<String>,
        expressions: Vec<Expression>,
    },
    TaggedTemplate {
        tag: Box<Expression>,
        quasis: Vec<String>,
        raw_quasis: Vec<String>,
        expressions: Vec<Expression>,
    },
    Identifier(Identifier),
    This,
    /// `None` elements are holes.
    Array(Vec<Option<Expression>>),
    Object(Vec<ObjectProperty>),
    Member {
        object: Box<Expression>,
        property: String,
    },
    ComputedMember {
        object: Box<Expression>,
        property: Box<Expression>,
    },
    SuperMember(String),
    SuperComputedMember(Box<Expression>),
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    SuperCall(Vec<Expression>),
    New {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    NewTarget,
    Spread(Box<Expression>),
    Function(Box<FunctionData>),
    Class(Box<ClassData>),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Assignment {
        op: AssignmentOp,
        target: AssignmentTarget,
        value: Box<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Sequence(Vec<Expression>),
    Yield(Option<Box<Expression>>),
    Await(Box<Expression>),
}

impl Expression {
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match &self.inner {
            ExpressionKind::Identifier(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn is_undefined_identifier(&self) -> bool {
        self.as_identifier().is_some_and(|ident| ident.name == "undefined")
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assigns node ids and positions while an AST is being constructed.
///
/// Every node created gets the builder's current position; `at()` moves it.
#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: u32,
    position: Position,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            position: Position {
                line: 1,
                column: 0,
                offset: 0,
            },
        }
    }

    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.position = Position {
            line,
            column,
            offset: self.position.offset,
        };
        self
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn range(&self) -> SourceRange {
        SourceRange {
            start: self.position,
            end: self.position,
        }
    }

    pub fn node<T>(&mut self, inner: T) -> Node<T> {
        Node {
            id: self.next_id(),
            range: self.range(),
            inner,
        }
    }

    pub fn program(&mut self, statements: Vec<Statement>) -> Program {
        let id = self.next_id();
        Program {
            id,
            range: self.range(),
            statements,
            is_strict: false,
            next_node_id: self.next_id,
            original_nodes: FxHashMap::default(),
        }
    }

    pub fn identifier(&mut self, name: &str) -> Identifier {
        Identifier {
            id: self.next_id(),
            range: self.range(),
            name: name.to_string(),
        }
    }

    pub fn block(&mut self, statements: Vec<Statement>) -> Block {
        Block {
            id: self.next_id(),
            range: self.range(),
            statements,
        }
    }

    // --- Expressions ---

    pub fn ident(&mut self, name: &str) -> Expression {
        let ident = self.identifier(name);
        self.node(ExpressionKind::Identifier(ident))
    }

    pub fn number(&mut self, value: f64) -> Expression {
        self.node(ExpressionKind::Number(value))
    }

    pub fn string(&mut self, value: &str) -> Expression {
        self.node(ExpressionKind::String(value.to_string()))
    }

    pub fn this(&mut self) -> Expression {
        self.node(ExpressionKind::This)
    }

    pub fn assign(&mut self, name: &str, value: Expression) -> Expression {
        let target = self.ident(name);
        self.node(ExpressionKind::Assignment {
            op: AssignmentOp::Assign,
            target: AssignmentTarget::Simple(Box::new(target)),
            value: Box::new(value),
        })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
        self.node(ExpressionKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn call(&mut self, callee: Expression, arguments: Vec<Expression>) -> Expression {
        self.node(ExpressionKind::Call {
            callee: Box::new(callee),
            arguments,
        })
    }

    pub fn member(&mut self, object: Expression, property: &str) -> Expression {
        self.node(ExpressionKind::Member {
            object: Box::new(object),
            property: property.to_string(),
        })
    }

    pub fn function_expression(&mut self, function: FunctionData) -> Expression {
        self.node(ExpressionKind::Function(Box::new(function)))
    }

    // --- Statements ---

    pub fn expression_statement(&mut self, expression: Expression) -> Statement {
        self.node(StatementKind::Expression(expression))
    }

    pub fn declare(
        &mut self,
        kind: DeclarationKind,
        name: &str,
        init: Option<Expression>,
    ) -> Statement {
        let ident = self.identifier(name);
        let declarator = VariableDeclarator {
            id: self.next_id(),
            range: self.range(),
            target: BindingTarget::Identifier(ident),
            init,
        };
        self.node(StatementKind::Variable {
            declaration: VariableDeclaration {
                kind,
                declarators: vec![declarator],
            },
            exported: false,
        })
    }

    pub fn block_statement(&mut self, statements: Vec<Statement>) -> Statement {
        let block = self.block(statements);
        self.node(StatementKind::Block(block))
    }

    pub fn return_statement(&mut self, value: Option<Expression>) -> Statement {
        self.node(StatementKind::Return(value))
    }

    /// A function with plain identifier parameters and a block body.
    pub fn function(
        &mut self,
        kind: FunctionKind,
        name: Option<&str>,
        parameters: &[&str],
        statements: Vec<Statement>,
    ) -> FunctionData {
        let name = name.map(|name| self.identifier(name));
        let parameters = parameters
            .iter()
            .map(|parameter| {
                let ident = self.identifier(parameter);
                Parameter {
                    id: self.next_id(),
                    range: self.range(),
                    target: BindingTarget::Identifier(ident),
                    default: None,
                    is_rest: false,
                }
            })
            .collect();
        let body = FunctionBody::Block(self.block(statements));
        FunctionData {
            id: self.next_id(),
            range: self.range(),
            name,
            kind,
            is_expression: false,
            parameters,
            body,
            is_strict: false,
        }
    }

    pub fn function_declaration(
        &mut self,
        name: &str,
        parameters: &[&str],
        statements: Vec<Statement>,
    ) -> Statement {
        let function = self.function(FunctionKind::Normal, Some(name), parameters, statements);
        self.node(StatementKind::FunctionDeclaration {
            function: Box::new(function),
            export: ExportKind::None,
        })
    }

    pub fn arrow(&mut self, parameters: &[&str], body: Expression) -> Expression {
        let mut function = self.function(FunctionKind::Arrow, None, parameters, Vec::new());
        function.body = FunctionBody::Expression(Box::new(body));
        self.node(ExpressionKind::Function(Box::new(function)))
    }
}
