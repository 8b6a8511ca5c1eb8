//! The compiled form of a stylesheet: what the compiler produces and the controller runs.

use crate::config::OutputProperties;
use crate::decimal_format::DecimalFormats;
use crate::key_manager::KeyManager;
use crate::numbering::NumberLevel;
use crate::pattern::Pattern;
use crate::rule_manager::RuleManager;
use std::collections::HashMap;
use std::sync::Arc;
use weft_tree::{Atom, Name, NameId, NamePool, SpaceRules};
use weft_xpath::{Binding, Expression};

/// A fully compiled stylesheet. Immutable once built and safe to share between threads;
/// each run gets its own controller.
#[derive(Debug)]
pub struct CompiledStylesheet {
    pub pool: Arc<NamePool>,
    /// Unique among stylesheets sharing `pool`; owns this stylesheet's key indexes.
    pub number: u64,
    pub templates: Vec<Template>,
    /// Template rules, with the index into `templates` as the handler.
    pub rules: RuleManager<usize>,
    pub named_templates: HashMap<NameId, usize>,
    /// Indexed by global slot.
    pub globals: Vec<GlobalVariable>,
    pub keys: KeyManager,
    /// Every declaration of each attribute set, lowest precedence first.
    pub attribute_sets: HashMap<NameId, Vec<AttributeSet>>,
    pub decimal_formats: DecimalFormats,
    pub output: OutputProperties,
    pub space_rules: SpaceRules,
    /// The widest local frame any template or global body needs.
    pub max_local_slots: usize,
    /// Namespaces in scope on the principal module's document element; run-time QNames
    /// such as key names passed to `key()` resolve against these.
    pub namespaces: NamespaceContext,
    pub base_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub name: Option<NameId>,
    /// The match pattern as written.
    pub match_text: Option<String>,
    pub mode: Option<NameId>,
    pub priority: Option<f64>,
    pub precedence: i32,
    /// The lowest precedence among the modules imported by the declaring module;
    /// `xsl:apply-imports` searches `min_import_precedence..precedence`.
    pub min_import_precedence: i32,
    pub body: Vec<Instruction>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: NameId,
    pub display_name: String,
    pub binding: Binding,
    pub value: VariableValue,
    pub is_param: bool,
    pub precedence: i32,
    pub line: u32,
}

/// Where a variable, parameter or `with-param` gets its value.
#[derive(Debug, Clone)]
pub enum VariableValue {
    Select(Expression),
    /// Content instantiated into a result tree fragment.
    Content(Vec<Instruction>),
    /// Neither `select` nor content: the empty string.
    Empty,
}

#[derive(Debug, Clone)]
pub struct WithParam {
    pub name: NameId,
    pub value: VariableValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDataType {
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseOrder {
    UpperFirst,
    LowerFirst,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub select: Expression,
    pub order: SortOrder,
    pub data_type: SortDataType,
    /// Only text keys use it. Without it strings compare by code point.
    pub case_order: Option<CaseOrder>,
    pub lang: Option<String>,
}

/// One `xsl:attribute-set` declaration.
#[derive(Debug, Clone)]
pub struct AttributeSet {
    pub name: NameId,
    /// Sets whose attributes are added before this declaration's own.
    pub use_sets: Vec<NameId>,
    /// `xsl:attribute` instructions.
    pub attributes: Vec<Instruction>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct NumberInstruction {
    pub level: NumberLevel,
    /// Without it, nodes of the current node's type and name are counted.
    pub count: Option<Pattern>,
    pub from: Option<Pattern>,
    /// Formats this number instead of counting nodes.
    pub value: Option<Expression>,
    pub format: AttributeValueTemplate,
    pub grouping_separator: Option<AttributeValueTemplate>,
    pub grouping_size: Option<AttributeValueTemplate>,
    pub letter_value: Option<AttributeValueTemplate>,
    pub lang: Option<AttributeValueTemplate>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct When {
    pub test: Expression,
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub enum AvtPart {
    Static(String),
    Dynamic(Expression),
}

/// An attribute value template such as `item-{@id}`.
#[derive(Debug, Clone)]
pub enum AttributeValueTemplate {
    Static(String),
    Dynamic(Vec<AvtPart>),
}

/// The namespace bindings in scope at an instruction, for resolving computed names.
pub type NamespaceContext = Vec<(Atom, Atom)>;

#[derive(Debug, Clone)]
pub enum Instruction {
    ApplyTemplates {
        select: Option<Expression>,
        mode: Option<NameId>,
        sorts: Vec<SortKey>,
        params: Vec<WithParam>,
        line: u32,
    },
    CallTemplate {
        template: usize,
        params: Vec<WithParam>,
    },
    ApplyImports {
        line: u32,
    },
    ForEach {
        select: Expression,
        sorts: Vec<SortKey>,
        body: Vec<Instruction>,
        line: u32,
    },
    If {
        test: Expression,
        body: Vec<Instruction>,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<Vec<Instruction>>,
    },
    ValueOf {
        select: Expression,
        disable_escaping: bool,
    },
    Text {
        text: String,
        disable_escaping: bool,
    },
    Copy {
        attribute_sets: Vec<NameId>,
        body: Vec<Instruction>,
    },
    CopyOf {
        select: Expression,
    },
    Element {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        namespaces: NamespaceContext,
        attribute_sets: Vec<NameId>,
        body: Vec<Instruction>,
        line: u32,
    },
    Attribute {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        namespaces: NamespaceContext,
        body: Vec<Instruction>,
        line: u32,
    },
    Comment {
        body: Vec<Instruction>,
    },
    ProcessingInstruction {
        name: AttributeValueTemplate,
        body: Vec<Instruction>,
        line: u32,
    },
    LiteralElement {
        name: Name,
        /// Declarations to copy to the result, XSLT and extension namespaces excluded.
        namespaces: NamespaceContext,
        attribute_sets: Vec<NameId>,
        attributes: Vec<(Name, AttributeValueTemplate)>,
        body: Vec<Instruction>,
    },
    Number(Box<NumberInstruction>),
    /// An extension instruction that is not implemented. Instantiating it runs its
    /// `xsl:fallback` content, or fails when it has none.
    Extension {
        name: String,
        fallback: Option<Vec<Instruction>>,
        line: u32,
    },
    Variable {
        binding: Binding,
        value: VariableValue,
    },
    Param {
        binding: Binding,
        name: NameId,
        value: VariableValue,
    },
    /// `weft:assign`: replaces the value of an assignable variable.
    Assign {
        binding: Binding,
        value: VariableValue,
    },
    Message {
        body: Vec<Instruction>,
        terminate: bool,
        line: u32,
    },
}
