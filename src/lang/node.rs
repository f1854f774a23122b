use super::token::Token;
use super::variable::{VariableId, Variables};
use crate::bytecode::op::{BlastOp, ScriptFunction};

/// Index of a node inside its [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind tag of a syntax tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    // ───────────────────────────── Structure ────────────────────────────
    /// Untyped placeholder; never valid at emission time.
    None,
    /// Top of the tree; its children are the script's statements.
    Root,
    /// Sequence of statements or expression parts.
    Compound,

    // ───────────────────────────── Expressions ──────────────────────────
    /// Operator token inside an expression: `+`, `<`, unary `-`.
    Operation,
    /// Call of a built-in function or procedure.
    Function,
    /// Single value: a variable, a well-known constant or `pop`.
    Parameter,

    // ───────────────────────────── Statements ───────────────────────────
    /// `x = ...;` with the destination bound to the node's variable.
    Assignment,
    /// Suspend execution for a number of frames.
    Yield,
    /// Unconditional jump to the label named by the node's identifier.
    JumpTo,
    /// Address marker named by the node's identifier.
    Label,

    // ──────────────────────────── Control flow ──────────────────────────
    /// Condition of an `if` or `while`.
    Condition,
    /// `if` statement; children are a condition plus then and/or else branches.
    IfThenElse,
    /// The `then` branch.
    IfThen,
    /// The `else` branch.
    IfElse,
    /// `while` loop; children are a condition and a loop body.
    While,
    /// Loop produced by lowering a `for`; the initializer sits in `depends_on`.
    WhileLoop,
    /// Loop body.
    WhileCompound,

    // ─────────────────────────── Transform-only ─────────────────────────
    // Removed by earlier passes; reaching the emitter is an internal error.
    Index,
    Switch,
    SwitchCase,
    SwitchDefault,
    For,
}

impl NodeType {
    pub fn name(self) -> &'static str {
        match self {
            NodeType::None => "none",
            NodeType::Root => "root",
            NodeType::Compound => "compound",
            NodeType::Operation => "operation",
            NodeType::Function => "function",
            NodeType::Parameter => "parameter",
            NodeType::Assignment => "assignment",
            NodeType::Yield => "yield",
            NodeType::JumpTo => "jump_to",
            NodeType::Label => "label",
            NodeType::Condition => "condition",
            NodeType::IfThenElse => "ifthenelse",
            NodeType::IfThen => "ifthen",
            NodeType::IfElse => "ifelse",
            NodeType::While => "while",
            NodeType::WhileLoop => "whileloop",
            NodeType::WhileCompound => "whilecompound",
            NodeType::Index => "index",
            NodeType::Switch => "switch",
            NodeType::SwitchCase => "switchcase",
            NodeType::SwitchDefault => "switchdefault",
            NodeType::For => "for",
        }
    }

    pub fn is_transform_only(self) -> bool {
        matches!(
            self,
            NodeType::Index
                | NodeType::Switch
                | NodeType::SwitchCase
                | NodeType::SwitchDefault
                | NodeType::For
        )
    }

    /// Kinds emitted as `begin .. end` around their children.
    pub fn is_compound_like(self) -> bool {
        matches!(
            self,
            NodeType::Compound
                | NodeType::Condition
                | NodeType::IfThen
                | NodeType::IfElse
                | NodeType::WhileCompound
        )
    }

    pub fn is_loop(self) -> bool {
        matches!(self, NodeType::While | NodeType::WhileLoop)
    }
}

/// A node of the syntax tree.
///
/// Children are owned by the arena and listed here by index. `depends_on`
/// lists detached subtrees that must be emitted right before this node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_type: NodeType,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub variable: Option<VariableId>,
    pub function: Option<&'static ScriptFunction>,
    pub token: Option<Token>,

    /// Direct opcode for a well-known constant (`1`, `pi`, ...).
    pub constant_op: Option<BlastOp>,

    pub vector_size: u8,
    pub is_vector: bool,

    /// Ties control-flow constructs to jump labels.
    pub identifier: String,

    pub depends_on: Vec<NodeId>,
}

impl Node {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            parent: None,
            children: Vec::new(),
            variable: None,
            function: None,
            token: None,
            constant_op: None,
            vector_size: 1,
            is_vector: false,
            identifier: String::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn parameter(variable: VariableId) -> Self {
        Self {
            variable: Some(variable),
            ..Self::new(NodeType::Parameter)
        }
    }

    pub fn constant(op: BlastOp) -> Self {
        Self {
            constant_op: Some(op),
            ..Self::new(NodeType::Parameter)
        }
    }

    pub fn operation(token: Token) -> Self {
        Self {
            token: Some(token),
            ..Self::new(NodeType::Operation)
        }
    }

    pub fn function(function: &'static ScriptFunction) -> Self {
        Self {
            function: Some(function),
            identifier: function.name.to_string(),
            ..Self::new(NodeType::Function)
        }
    }

    pub fn assignment(variable: VariableId) -> Self {
        Self {
            variable: Some(variable),
            ..Self::new(NodeType::Assignment)
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_vector(mut self, vector_size: u8) -> Self {
        self.vector_size = vector_size;
        self.is_vector = vector_size > 1;
        self
    }

    pub fn is_operation(&self) -> bool {
        self.node_type == NodeType::Operation
    }

    pub fn is_function(&self) -> bool {
        self.node_type == NodeType::Function && self.function.is_some()
    }

    /// Parameter that names the reserved `pop` function.
    pub fn is_pop(&self) -> bool {
        self.node_type == NodeType::Parameter && self.function.is_some_and(ScriptFunction::is_pop)
    }

    /// A parameter that encodes as a single value: no children, and bound to a
    /// constant, a variable or `pop`.
    pub fn is_simplex(&self) -> bool {
        self.node_type == NodeType::Parameter
            && self.children.is_empty()
            && (self.constant_op.is_some() || self.variable.is_some() || self.is_pop())
    }
}

/// Arena holding every node of one script.
///
/// Parent and child links are plain indices; nodes removed from the tree
/// stay in the arena as orphans.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeType::Root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Append `node` as the last child of `parent`.
    pub fn add(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Add a node that is not part of the tree yet, e.g. the head of a
    /// dependency subtree.
    pub fn add_detached(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Register `dependency` to be emitted right before `owner`.
    pub fn add_dependency(&mut self, owner: NodeId, dependency: NodeId) {
        self.nodes[owner.0].depends_on.push(dependency);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// First child of the given type.
    pub fn child_of_type(&self, id: NodeId, node_type: NodeType) -> Option<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].node_type == node_type)
    }

    /// Every node reachable from `start` through children and dependencies,
    /// in pre-order with dependencies visited before the node that owns them.
    pub fn reachable(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        self.collect_reachable(start, &mut seen, &mut order);
        order
    }

    fn collect_reachable(&self, id: NodeId, seen: &mut [bool], order: &mut Vec<NodeId>) {
        if seen[id.0] {
            return;
        }
        seen[id.0] = true;
        for dep in &self.nodes[id.0].depends_on {
            self.collect_reachable(*dep, seen, order);
        }
        order.push(id);
        for child in &self.nodes[id.0].children {
            self.collect_reachable(*child, seen, order);
        }
    }

    pub fn contains_type(&self, start: NodeId, node_type: NodeType) -> bool {
        self.reachable(start)
            .into_iter()
            .any(|id| self.nodes[id.0].node_type == node_type)
    }

    /// Render a node for diagnostics: `assignment#3 'a'`.
    pub fn describe(&self, id: NodeId, variables: Option<&Variables>) -> String {
        let Some(node) = self.nodes.get(id.0) else {
            return format!("<invalid node #{}>", id.0);
        };
        let mut out = format!("{}#{}", node.node_type.name(), id.0);
        let detail = if let Some(token) = node.token {
            Some(token.symbol().to_string())
        } else if let Some(op) = node.constant_op {
            Some(op.name().to_string())
        } else if let Some(var) = node.variable {
            Some(
                variables
                    .and_then(|v| v.get(var))
                    .map(|v| v.name.clone())
                    .unwrap_or_else(|| var.to_string()),
            )
        } else if !node.identifier.is_empty() {
            Some(node.identifier.clone())
        } else {
            node.function.map(|f| f.name.to_string())
        };
        if let Some(detail) = detail {
            out.push_str(&format!(" '{}'", detail));
        }
        out
    }
}
