//! The [`Controller`] runs a compiled stylesheet against a source document.
//!
//! It owns everything one run needs: the bindery for variables, the stack of output
//! destinations, the documents loaded by `document()` and the diagnostics collected
//! under the recovery policy. A compiled stylesheet can be shared by many controllers;
//! a controller is used by one thread at a time and is reusable after [`Controller::reset`].
//!
//! Processing follows the push model. Applying templates to a node finds the best rule
//! for it in the current mode, opens a fresh local frame and instantiates the rule's body.
//! Nodes with no matching rule get the built-in behaviour: documents and elements
//! recurse into their children, text and attributes copy their value, and everything
//! else produces nothing.

use crate::ast::{
    AttributeValueTemplate, AvtPart, CaseOrder, CompiledStylesheet, Instruction, SortDataType,
    SortKey, SortOrder, VariableValue, WithParam,
};
use crate::bindery::{Bindery, ParameterSet};
use crate::compiler_handlers::literals::split_qname;
use crate::config::{OutputProperties, RecoveryPolicy, TransformOptions};
use crate::context::Context;
use crate::env::{DynamicContext, apply_policy};
use crate::error::{Diagnostic, Location, XsltError};
use crate::executor_handlers::{
    apply_templates, call_template, control_flow, copy, for_each, literals, number, variables,
};
use crate::functions;
use crate::output::{Destination, Emitter, EventRecorder, Outputter, TextCollector, TreeEmitter};
use crate::resolver::{DocumentResolver, FileResolver, resolve_uri};
use crate::serializer::{Serializer, resolve_method};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use weft_tree::{Document, NameId, Node, NodeType, parse_document_with};
use weft_xpath::{
    Binding, EvaluationContext, Expression, LastPosition, LastPositionFinder, Lookahead,
    NodeSequence, VariableRef, XPathError, XPathHost, XPathValue, evaluate, evaluate_sequence,
};

/// Templates may nest this deep before the run fails. Counts template rules, named
/// templates and `xsl:apply-imports` alike.
pub const MAX_TEMPLATE_DEPTH: usize = 256;

/// Bytes of native stack a run may use for nested templates, measured from where the
/// run started. Stays inside the 2 MiB default of spawned threads.
const STACK_BUDGET: usize = 1 << 20;

fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

/// The lifecycle of a controller. Parameters, the initial mode and the recovery policy
/// can only be changed while `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Running,
    Completed,
    Failed,
}

pub struct Controller {
    stylesheet: Arc<CompiledStylesheet>,
    resolver: Arc<dyn DocumentResolver>,
    state: RunState,
    policy: RecoveryPolicy,
    parameters: ParameterSet,
    initial_mode: Option<NameId>,
    output_override: Option<OutputProperties>,
    bindery: Bindery,
    outputs: Vec<Outputter>,
    diagnostics: Vec<Diagnostic>,
    documents: HashMap<String, Arc<Document>>,
    principal: Option<Node>,
    current: Option<Node>,
    template_depth: usize,
    max_depth: usize,
    stack_base: usize,
}

/// Walks a selected node sequence, answering `last()` for its members. Sequences of
/// unknown length are wrapped in a [`Lookahead`] so the size is only computed if asked.
pub(crate) enum Cursor {
    Counted(NodeSequence, usize),
    Lookahead(Rc<Lookahead>),
}

impl Cursor {
    pub(crate) fn new(sequence: NodeSequence) -> Self {
        match sequence.known_len() {
            Some(len) => Cursor::Counted(sequence, len),
            None => Cursor::Lookahead(Lookahead::new(sequence)),
        }
    }

    pub(crate) fn last(&self) -> LastPosition {
        match self {
            Cursor::Counted(_, len) => LastPosition::Known(*len),
            Cursor::Lookahead(lookahead) => {
                let finder: Rc<dyn LastPositionFinder> = lookahead.clone();
                LastPosition::Deferred(finder)
            }
        }
    }

    pub(crate) fn next_node(&mut self) -> Option<Node> {
        match self {
            Cursor::Counted(sequence, _) => sequence.next(),
            Cursor::Lookahead(lookahead) => lookahead.next_node(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Text(String),
    Number(f64),
}

impl SortValue {
    fn compare(&self, other: &SortValue, case_order: Option<CaseOrder>) -> Ordering {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => compare_text(a, b, case_order),
            // NaN sorts before every number.
            (SortValue::Number(a), SortValue::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            _ => Ordering::Equal,
        }
    }
}

/// Without a case order strings compare by code point. With one they compare ignoring
/// case first, and the first difference in case decides between otherwise equal strings.
fn compare_text(a: &str, b: &str, case_order: Option<CaseOrder>) -> Ordering {
    let Some(case_order) = case_order else {
        return a.cmp(b);
    };
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    if folded != Ordering::Equal {
        return folded;
    }
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y {
            return match (case_order, x.is_lowercase()) {
                (CaseOrder::LowerFirst, true) | (CaseOrder::UpperFirst, false) => Ordering::Less,
                _ => Ordering::Greater,
            };
        }
    }
    a.cmp(b)
}

impl Controller {
    pub fn new(stylesheet: Arc<CompiledStylesheet>) -> Self {
        let bindery = Bindery::new(stylesheet.max_local_slots);
        Self {
            stylesheet,
            resolver: Arc::new(FileResolver),
            state: RunState::Idle,
            policy: RecoveryPolicy::default(),
            parameters: ParameterSet::new(),
            initial_mode: None,
            output_override: None,
            bindery,
            outputs: Vec::new(),
            diagnostics: Vec::new(),
            documents: HashMap::new(),
            principal: None,
            current: None,
            template_depth: 0,
            max_depth: MAX_TEMPLATE_DEPTH,
            stack_base: 0,
        }
    }

    /// Uses `resolver` to load the documents named by `document()`.
    pub fn with_resolver(mut self, resolver: Arc<dyn DocumentResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn stylesheet(&self) -> &Arc<CompiledStylesheet> {
        &self.stylesheet
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Local frames currently open; zero between runs.
    pub fn frame_depth(&self) -> usize {
        self.bindery.depth()
    }

    fn ensure_idle(&self, what: &str) -> Result<(), XsltError> {
        if self.state != RunState::Idle {
            return Err(XsltError::Execution(format!(
                "cannot {} while the controller is {:?}",
                what, self.state
            )));
        }
        Ok(())
    }

    /// Supplies a value for the stylesheet parameter `name`, given as `local`,
    /// `prefix:local` or `{uri}local`.
    pub fn set_parameter(&mut self, name: &str, value: XPathValue) -> Result<(), XsltError> {
        self.ensure_idle("set a parameter")?;
        let id = self.resolve_runtime_qname(name).ok_or_else(|| {
            XsltError::Execution(format!("'{}' is not a valid parameter name", name))
        })?;
        self.parameters.insert(id, value);
        Ok(())
    }

    pub fn set_initial_mode(&mut self, mode: Option<&str>) -> Result<(), XsltError> {
        self.ensure_idle("set the initial mode")?;
        self.initial_mode = match mode {
            Some(name) => {
                let id = self.resolve_runtime_qname(name).ok_or_else(|| {
                    XsltError::Execution(format!("'{}' is not a valid mode name", name))
                })?;
                if self.stylesheet.rules.get_mode(Some(id)).is_none() {
                    log::warn!("initial mode '{}' has no template rules", name);
                }
                Some(id)
            }
            None => None,
        };
        Ok(())
    }

    pub fn set_recovery_policy(&mut self, policy: RecoveryPolicy) -> Result<(), XsltError> {
        self.ensure_idle("change the recovery policy")?;
        self.policy = policy;
        Ok(())
    }

    /// Limits how deeply templates may nest. The native stack budget applies as well.
    pub fn set_max_depth(&mut self, depth: usize) -> Result<(), XsltError> {
        self.ensure_idle("change the nesting limit")?;
        self.max_depth = depth;
        Ok(())
    }

    pub fn set_output_properties(&mut self, properties: OutputProperties) -> Result<(), XsltError> {
        self.ensure_idle("change the output properties")?;
        self.output_override = Some(properties);
        Ok(())
    }

    /// Applies everything in `options` in one go.
    pub fn configure(&mut self, options: &TransformOptions) -> Result<(), XsltError> {
        self.set_recovery_policy(options.recovery)?;
        for (name, value) in &options.parameters {
            self.set_parameter(name, XPathValue::String(value.clone()))?;
        }
        self.set_initial_mode(options.initial_mode.as_deref())?;
        if let Some(output) = &options.output {
            self.set_output_properties(output.clone())?;
        }
        if let Some(depth) = options.max_depth {
            self.set_max_depth(depth)?;
        }
        Ok(())
    }

    /// The stylesheet's `xsl:output` with any caller override applied.
    pub fn output_properties(&self) -> OutputProperties {
        match &self.output_override {
            Some(properties) => {
                let mut merged = properties.clone();
                if merged.method.is_none() {
                    merged.method = self.stylesheet.output.method;
                }
                merged
            }
            None => self.stylesheet.output.clone(),
        }
    }

    /// Returns the controller to `Idle`, dropping per-run state. Parameters and settings
    /// are kept.
    pub fn reset(&mut self) {
        self.state = RunState::Idle;
        self.bindery = Bindery::new(self.stylesheet.max_local_slots);
        self.outputs.clear();
        self.diagnostics.clear();
        self.documents.clear();
        self.principal = None;
        self.current = None;
        self.template_depth = 0;
    }

    /// Transforms `source`, sending the result to `emitter`. Nothing reaches `emitter`
    /// unless the whole run succeeds.
    pub fn run(&mut self, source: &Arc<Document>, emitter: &mut dyn Emitter) -> Result<(), XsltError> {
        self.ensure_idle("start a run")?;
        if !Arc::ptr_eq(source.name_pool(), &self.stylesheet.pool) {
            return Err(XsltError::Structure {
                message: "the source document was built with a different name pool than the stylesheet; parse it with Stylesheet::parse_source".to_string(),
                location: Location::default(),
            });
        }
        self.state = RunState::Preparing;
        log::debug!(
            "starting run over {} nodes with {} template(s)",
            source.len(),
            self.stylesheet.templates.len()
        );
        self.bindery = Bindery::new(self.stylesheet.max_local_slots);
        self.bindery.allocate_globals(self.stylesheet.globals.len());
        self.principal = Some(source.root());
        self.outputs = vec![Outputter::new(Destination::Result(EventRecorder::new()))?];
        self.template_depth = 0;
        self.stack_base = stack_address();

        self.state = RunState::Running;
        match self.process(source) {
            Ok(recorder) => {
                self.state = RunState::Completed;
                log::debug!("run completed with {} diagnostic(s)", self.diagnostics.len());
                recorder.replay(emitter)
            }
            Err(err) => {
                self.state = RunState::Failed;
                self.outputs.clear();
                log::debug!("run failed: {}", err);
                Err(err)
            }
        }
    }

    /// Runs and serializes the result according to the output properties.
    pub fn transform_to_string(&mut self, source: &Arc<Document>) -> Result<String, XsltError> {
        let mut recorder = EventRecorder::new();
        self.run(source, &mut recorder)?;
        let properties = self.output_properties();
        let method = resolve_method(&properties, recorder.first_element());
        let mut serializer = Serializer::new(properties, method);
        recorder.replay(&mut serializer)?;
        Ok(serializer.into_string())
    }

    fn process(&mut self, source: &Arc<Document>) -> Result<EventRecorder, XsltError> {
        let root = source.root();
        let context = Context::new(root.clone()).with_mode(self.initial_mode);
        self.apply_templates(
            &context,
            NodeSequence::from_vec(vec![root]),
            self.initial_mode,
            ParameterSet::new(),
        )?;
        let outputter = self
            .outputs
            .pop()
            .ok_or_else(|| XsltError::Execution("the result destination was lost".to_string()))?;
        match outputter.finish()? {
            Destination::Result(recorder) => Ok(recorder),
            _ => Err(XsltError::Execution(
                "the result destination was replaced".to_string(),
            )),
        }
    }

    // --- Template application ---

    /// Applies templates in `mode` to each node of `nodes` in turn.
    pub(crate) fn apply_templates(
        &mut self,
        context: &Context,
        nodes: NodeSequence,
        mode: Option<NameId>,
        params: ParameterSet,
    ) -> Result<(), XsltError> {
        let mut cursor = Cursor::new(nodes);
        let last = cursor.last();
        let mut position = 0;
        while let Some(node) = cursor.next_node() {
            position += 1;
            let node_context = context.for_node(node, position, last.clone()).with_mode(mode);
            self.apply_to_node(&node_context, params.clone())?;
        }
        Ok(())
    }

    /// Processes one node in a fresh local frame. A recoverable error that escapes the
    /// rule is reported, output opened by the rule is closed, and processing carries on
    /// with the next node.
    fn apply_to_node(&mut self, context: &Context, params: ParameterSet) -> Result<(), XsltError> {
        let output_depth = self.output()?.depth();
        self.enter_template(context, params)?;
        let result = self.invoke_rule(context);
        self.leave_template();
        match result {
            Err(err) if err.is_recoverable() && self.policy != RecoveryPolicy::Strict => {
                self.report_recoverable(err)?;
                self.output()?.unwind_to(output_depth)
            }
            other => other,
        }
    }

    /// Opens the local frame of a template body. Every call is paired with
    /// [`Controller::leave_template`] once the body has run, whatever its outcome.
    pub(crate) fn enter_template(&mut self, context: &Context, params: ParameterSet) -> Result<(), XsltError> {
        let stack_used = self.stack_base.abs_diff(stack_address());
        if self.template_depth >= self.max_depth || stack_used > STACK_BUDGET {
            return Err(XsltError::Execution(format!(
                "templates nested too deep ({} levels, {} KiB of stack) at {}",
                self.template_depth,
                stack_used / 1024,
                context.current_node.path()
            )));
        }
        self.template_depth += 1;
        self.bindery.open_frame(params);
        Ok(())
    }

    pub(crate) fn leave_template(&mut self) {
        self.bindery.close_frame();
        self.template_depth -= 1;
    }

    fn invoke_rule(&mut self, context: &Context) -> Result<(), XsltError> {
        let stylesheet = Arc::clone(&self.stylesheet);
        let rule = stylesheet
            .rules
            .get_rule(&context.current_node, context.mode, self)?;
        match rule {
            Some(rule) => {
                log::trace!(
                    "{} matched '{}'",
                    context.current_node.path(),
                    rule.source
                );
                self.execute_template(rule.handler, context)
            }
            None => self.apply_builtin(context),
        }
    }

    pub(crate) fn execute_template(&mut self, index: usize, context: &Context) -> Result<(), XsltError> {
        let stylesheet = Arc::clone(&self.stylesheet);
        let template = stylesheet.templates.get(index).ok_or_else(|| {
            XsltError::Execution(format!("no template with index {}", index))
        })?;
        let context = context.clone().with_template(Some(index));
        self.execute_body(&template.body, &context)
    }

    /// The built-in rules shared by every mode.
    pub(crate) fn apply_builtin(&mut self, context: &Context) -> Result<(), XsltError> {
        let node = &context.current_node;
        match node.node_type() {
            NodeType::Document | NodeType::Element => {
                let children: Vec<Node> = node.children().collect();
                self.apply_templates(
                    context,
                    NodeSequence::from_vec(children),
                    context.mode,
                    ParameterSet::new(),
                )
            }
            NodeType::Text | NodeType::Attribute => {
                let text = node.string_value();
                self.output()?.characters(&text, false)
            }
            _ => Ok(()),
        }
    }

    // --- Instructions ---

    pub(crate) fn execute_body(&mut self, body: &[Instruction], context: &Context) -> Result<(), XsltError> {
        for instruction in body {
            self.execute_instruction(instruction, context)?;
        }
        Ok(())
    }

    fn execute_instruction(&mut self, instruction: &Instruction, context: &Context) -> Result<(), XsltError> {
        match instruction {
            Instruction::ApplyTemplates {
                select,
                mode,
                sorts,
                params,
                line,
            } => apply_templates::handle_apply_templates(
                self,
                select.as_ref(),
                *mode,
                sorts,
                params,
                *line,
                context,
            ),
            Instruction::CallTemplate { template, params } => {
                call_template::handle_call_template(self, *template, params, context)
            }
            Instruction::ApplyImports { line } => {
                apply_templates::handle_apply_imports(self, *line, context)
            }
            Instruction::ForEach {
                select,
                sorts,
                body,
                line,
            } => for_each::handle_for_each(self, select, sorts, body, *line, context),
            Instruction::If { test, body } => control_flow::handle_if(self, test, body, context),
            Instruction::Choose { whens, otherwise } => {
                control_flow::handle_choose(self, whens, otherwise.as_deref(), context)
            }
            Instruction::ValueOf {
                select,
                disable_escaping,
            } => literals::handle_value_of(self, select, *disable_escaping, context),
            Instruction::Text {
                text,
                disable_escaping,
            } => self.output()?.characters(text, *disable_escaping),
            Instruction::Copy {
                attribute_sets,
                body,
            } => copy::handle_copy(self, attribute_sets, body, context),
            Instruction::CopyOf { select } => copy::handle_copy_of(self, select, context),
            Instruction::Element {
                name,
                namespace,
                namespaces,
                attribute_sets,
                body,
                line,
            } => literals::handle_element(
                self,
                name,
                namespace.as_ref(),
                namespaces,
                attribute_sets,
                body,
                *line,
                context,
            ),
            Instruction::Attribute {
                name,
                namespace,
                namespaces,
                body,
                line,
            } => literals::handle_attribute(
                self,
                name,
                namespace.as_ref(),
                namespaces,
                body,
                *line,
                context,
            ),
            Instruction::Comment { body } => literals::handle_comment(self, body, context),
            Instruction::ProcessingInstruction { name, body, line } => {
                literals::handle_processing_instruction(self, name, body, *line, context)
            }
            Instruction::LiteralElement {
                name,
                namespaces,
                attribute_sets,
                attributes,
                body,
            } => literals::handle_literal_element(
                self,
                name,
                namespaces,
                attribute_sets,
                attributes,
                body,
                context,
            ),
            Instruction::Number(instruction) => number::handle_number(self, instruction, context),
            Instruction::Extension {
                name,
                fallback,
                line,
            } => match fallback {
                Some(body) => self.execute_body(body, context),
                None => Err(XsltError::structure(
                    format!("extension instruction {} is not available and has no xsl:fallback", name),
                    *line,
                )),
            },
            Instruction::Variable { binding, value } => {
                variables::handle_variable(self, binding, value, context)
            }
            Instruction::Param {
                binding,
                name,
                value,
            } => variables::handle_param(self, binding, *name, value, context),
            Instruction::Assign { binding, value } => {
                variables::handle_assign(self, binding, value, context)
            }
            Instruction::Message {
                body,
                terminate,
                line,
            } => control_flow::handle_message(self, body, *terminate, *line, context),
        }
    }

    /// Adds the attributes of the named sets to the element being built. Each set's
    /// own `use-attribute-sets` come first. Set bodies run in a fresh local frame.
    pub(crate) fn apply_attribute_sets(
        &mut self,
        names: &[NameId],
        context: &Context,
    ) -> Result<(), XsltError> {
        if names.is_empty() {
            return Ok(());
        }
        let stylesheet = Arc::clone(&self.stylesheet);
        for name in names {
            for declaration in stylesheet.attribute_sets.get(name).into_iter().flatten() {
                self.apply_attribute_sets(&declaration.use_sets, context)?;
                self.bindery.open_frame(ParameterSet::new());
                let result = self.execute_body(&declaration.attributes, context);
                self.bindery.close_frame();
                result?;
            }
        }
        Ok(())
    }

    // --- Evaluation ---

    /// Evaluates `expr` with `context` as the focus and its node as `current()`.
    pub(crate) fn evaluate_expression(
        &mut self,
        expr: &Expression,
        context: &Context,
    ) -> Result<XPathValue, XsltError> {
        let saved = self.current.replace(context.current_node.clone());
        let result = evaluate(expr, &context.focus(), self);
        self.current = saved;
        Ok(result?)
    }

    /// Evaluates `expr` as a node sequence. A value of another type is a recoverable
    /// error at `line`.
    pub(crate) fn select_nodes(
        &mut self,
        expr: &Expression,
        context: &Context,
        line: u32,
    ) -> Result<NodeSequence, XsltError> {
        let saved = self.current.replace(context.current_node.clone());
        let result = evaluate_sequence(expr, &context.focus(), self);
        self.current = saved;
        match result {
            Ok(sequence) => Ok(sequence),
            Err(XPathError::TypeError(message)) => {
                Err(XsltError::recoverable(message, Location::line(line)))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn evaluate_avt(
        &mut self,
        avt: &AttributeValueTemplate,
        context: &Context,
    ) -> Result<String, XsltError> {
        match avt {
            AttributeValueTemplate::Static(text) => Ok(text.clone()),
            AttributeValueTemplate::Dynamic(parts) => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        AvtPart::Static(text) => result.push_str(text),
                        AvtPart::Dynamic(expr) => {
                            let value = self.evaluate_expression(expr, context)?;
                            result.push_str(&value.to_string());
                        }
                    }
                }
                Ok(result)
            }
        }
    }

    /// The value of a variable, parameter or `with-param`. Content becomes a result tree
    /// fragment, held as a node-set of the fragment's document node.
    pub(crate) fn evaluate_value(
        &mut self,
        value: &VariableValue,
        context: &Context,
    ) -> Result<XPathValue, XsltError> {
        match value {
            VariableValue::Select(expr) => self.evaluate_expression(expr, context),
            VariableValue::Content(body) => {
                let emitter = TreeEmitter::new(Arc::clone(&self.stylesheet.pool));
                let destination = self.capture(Destination::Tree(emitter), body, context)?;
                match destination {
                    Destination::Tree(tree) => {
                        let fragment = tree.finish()?;
                        Ok(XPathValue::NodeSet(vec![fragment.root()]))
                    }
                    _ => Err(XsltError::Execution(
                        "result tree fragment destination was replaced".to_string(),
                    )),
                }
            }
            VariableValue::Empty => Ok(XPathValue::String(String::new())),
        }
    }

    pub(crate) fn evaluate_params(
        &mut self,
        params: &[WithParam],
        context: &Context,
    ) -> Result<ParameterSet, XsltError> {
        let mut values = ParameterSet::with_capacity(params.len());
        for param in params {
            let value = self.evaluate_value(&param.value, context)?;
            values.insert(param.name, value);
        }
        Ok(values)
    }

    /// Instantiates `body` into `destination` and hands the destination back.
    fn capture(
        &mut self,
        destination: Destination,
        body: &[Instruction],
        context: &Context,
    ) -> Result<Destination, XsltError> {
        self.outputs.push(Outputter::new(destination)?);
        let result = self.execute_body(body, context);
        let outputter = self
            .outputs
            .pop()
            .ok_or_else(|| XsltError::Execution("output destination stack underflow".to_string()))?;
        result?;
        outputter.finish()
    }

    /// Instantiates `body` for its text. Nodes other than text are dropped and reported
    /// as a recoverable error.
    pub(crate) fn capture_text(
        &mut self,
        body: &[Instruction],
        context: &Context,
        what: &str,
        line: u32,
    ) -> Result<String, XsltError> {
        let destination = self.capture(Destination::Text(TextCollector::new()), body, context)?;
        let Destination::Text(collector) = destination else {
            return Err(XsltError::Execution(
                "text destination was replaced".to_string(),
            ));
        };
        if collector.skipped() > 0 {
            self.report_recoverable(XsltError::recoverable(
                format!("non-text nodes created in the content of {} were ignored", what),
                Location::line(line),
            ))?;
        }
        Ok(collector.into_text())
    }

    /// Orders `nodes` by `sorts`, keeping document order among equal keys.
    pub(crate) fn sort_nodes(
        &mut self,
        nodes: Vec<Node>,
        sorts: &[SortKey],
        context: &Context,
    ) -> Result<Vec<Node>, XsltError> {
        if sorts.is_empty() {
            return Ok(nodes);
        }
        let size = nodes.len();
        let mut keyed = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let node_context = context.for_node(node.clone(), i + 1, LastPosition::Known(size));
            let mut keys = Vec::with_capacity(sorts.len());
            for sort in sorts {
                let value = self.evaluate_expression(&sort.select, &node_context)?;
                keys.push(match sort.data_type {
                    SortDataType::Text => SortValue::Text(value.to_string()),
                    SortDataType::Number => SortValue::Number(value.to_number()),
                });
            }
            keyed.push((keys, node));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for ((left, right), sort) in a.iter().zip(b.iter()).zip(sorts) {
                let ordering = match sort.order {
                    SortOrder::Ascending => left.compare(right, sort.case_order),
                    SortOrder::Descending => right.compare(left, sort.case_order),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, node)| node).collect())
    }

    // --- Variables ---

    pub(crate) fn bindery(&mut self) -> &mut Bindery {
        &mut self.bindery
    }

    /// The value of a global variable or parameter, evaluated on first use.
    pub(crate) fn global_value(&mut self, binding: &Binding) -> Result<XPathValue, XsltError> {
        if let Some(value) = self.bindery.get(binding) {
            return Ok(value.clone());
        }
        let stylesheet = Arc::clone(&self.stylesheet);
        let global = stylesheet.globals.get(binding.slot).ok_or_else(|| {
            XsltError::Execution(format!("no global variable in slot {}", binding.slot))
        })?;
        self.bindery.mark_busy(binding, &global.display_name)?;
        let result = self.compute_global(global, binding);
        self.bindery.clear_busy(binding);
        result?;
        self.bindery.get(binding).cloned().ok_or_else(|| {
            XsltError::Execution(format!("global ${} has no value", global.display_name))
        })
    }

    fn compute_global(
        &mut self,
        global: &crate::ast::GlobalVariable,
        binding: &Binding,
    ) -> Result<(), XsltError> {
        if global.is_param
            && self
                .bindery
                .use_global_parameter(global.name, binding, &self.parameters)
        {
            return Ok(());
        }
        let root = self.principal.clone().ok_or_else(|| {
            XsltError::Execution(format!(
                "global ${} used outside a run",
                global.display_name
            ))
        })?;
        log::trace!("evaluating global ${}", global.display_name);
        let context = Context::new(root);
        self.bindery.open_frame(ParameterSet::new());
        let value = self.evaluate_value(&global.value, &context);
        self.bindery.close_frame();
        self.bindery.define(binding, value?);
        Ok(())
    }

    // --- Output ---

    pub(crate) fn output(&mut self) -> Result<&mut Outputter, XsltError> {
        self.outputs
            .last_mut()
            .ok_or_else(|| XsltError::Execution("no output destination is open".to_string()))
    }

    /// Reports `err` under the recovery policy when it is recoverable; passes it back
    /// otherwise.
    pub(crate) fn recover(&mut self, result: Result<(), XsltError>) -> Result<(), XsltError> {
        match result {
            Err(err) if err.is_recoverable() => self.report_recoverable(err),
            other => other,
        }
    }

    pub(crate) fn push_message(&mut self, message: String) {
        self.diagnostics.push(Diagnostic {
            kind: crate::error::DiagnosticKind::Message,
            message,
        });
    }

    // --- Names and documents ---

    pub(crate) fn current_node(&self) -> Option<Node> {
        self.current.clone()
    }

    /// Splits a run-time QName into namespace URI and local part, resolving a prefix
    /// against the namespaces of the principal stylesheet module. `{uri}local` is
    /// accepted as well.
    pub(crate) fn expand_runtime_qname(&self, text: &str) -> Option<(String, String)> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix('{') {
            let (uri, local) = rest.split_once('}')?;
            return Some((uri.to_string(), local.to_string()));
        }
        let (prefix, local) = split_qname(text)?;
        if prefix.is_empty() {
            return Some((String::new(), local.to_string()));
        }
        let uri = self
            .stylesheet
            .namespaces
            .iter()
            .rev()
            .find(|(p, _)| p.as_ref() == prefix)?
            .1
            .to_string();
        Some((uri, local.to_string()))
    }

    pub(crate) fn resolve_runtime_qname(&self, text: &str) -> Option<NameId> {
        let (uri, local) = self.expand_runtime_qname(text)?;
        Some(self.stylesheet.pool.intern(&uri, &local))
    }

    /// Loads the document at `href` relative to the stylesheet, once per run. A document
    /// that cannot be loaded is a recoverable error and yields `None`.
    pub(crate) fn load_document(&mut self, href: &str) -> Result<Option<Arc<Document>>, XsltError> {
        let base = self.stylesheet.base_uri.clone();
        let uri = resolve_uri(href, base.as_deref());
        if let Some(document) = self.documents.get(&uri) {
            return Ok(Some(Arc::clone(document)));
        }
        let loaded = self.resolver.load(href, base.as_deref()).and_then(|(uri, text)| {
            let document = parse_document_with(
                &text,
                &self.stylesheet.pool,
                &self.stylesheet.space_rules,
                Some(&uri),
            )?;
            Ok((uri, document))
        });
        match loaded {
            Ok((uri, document)) => {
                log::debug!("loaded '{}' for document()", uri);
                self.documents.insert(uri, Arc::clone(&document));
                Ok(Some(document))
            }
            Err(err) => {
                self.report_recoverable(XsltError::recoverable(
                    format!("document('{}') failed: {}", href, err),
                    Location::default(),
                ))?;
                Ok(None)
            }
        }
    }
}

impl XPathHost for Controller {
    fn variable(&mut self, var: &VariableRef) -> Result<XPathValue, XPathError> {
        let Some(binding) = var.binding else {
            return Err(XPathError::UnknownVariable(var.name.clone()));
        };
        if binding.is_global() {
            return Ok(self.global_value(&binding)?);
        }
        self.bindery
            .get(&binding)
            .cloned()
            .ok_or_else(|| XPathError::UnknownVariable(var.name.clone()))
    }

    fn call_function(
        &mut self,
        name: &str,
        args: Vec<XPathValue>,
        ctx: &EvaluationContext,
    ) -> Result<XPathValue, XPathError> {
        Ok(functions::call(self, name, args, ctx)?)
    }
}

impl DynamicContext for Controller {
    fn evaluate(
        &mut self,
        expr: &Expression,
        focus: &EvaluationContext,
    ) -> Result<XPathValue, XsltError> {
        let saved = self.current.replace(focus.context_node.clone());
        let result = evaluate(expr, focus, self);
        self.current = saved;
        Ok(result?)
    }

    fn select_by_key(
        &mut self,
        key: NameId,
        document: &Arc<Document>,
        value: &str,
    ) -> Result<Vec<Node>, XsltError> {
        let stylesheet = Arc::clone(&self.stylesheet);
        stylesheet.keys.select_by_key(key, document, value, self)
    }

    fn recovery_policy(&self) -> RecoveryPolicy {
        self.policy
    }

    fn report_recoverable(&mut self, err: XsltError) -> Result<(), XsltError> {
        apply_policy(self.policy, err, &mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerBuilder;
    use crate::output::OutputEvent;
    use crate::resolver::MapResolver;
    use weft_tree::{NamePool, parse_document};

    fn controller(sheet: &str) -> (Controller, Arc<NamePool>) {
        let pool = NamePool::new();
        let doc = parse_document(sheet, &pool).unwrap();
        let compiled = CompilerBuilder::new(Arc::clone(&pool), Arc::new(MapResolver::new()))
            .compile(&doc, None)
            .unwrap();
        (Controller::new(Arc::new(compiled)), pool)
    }

    fn run(sheet: &str, source: &str) -> (Controller, String) {
        let (mut controller, pool) = controller(sheet);
        let doc = parse_document(source, &pool).unwrap();
        let output = controller.transform_to_string(&doc).unwrap();
        (controller, output)
    }

    const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

    #[test]
    fn test_builtin_rules_copy_text() {
        let sheet = format!(r#"<xsl:stylesheet version="1.0" {}><xsl:output method="text"/></xsl:stylesheet>"#, XSL);
        let (_, output) = run(&sheet, "<a>one<b>two</b><!-- no --><?pi no?></a>");
        assert_eq!(output, "onetwo");
    }

    #[test]
    fn test_last_in_lazy_selection() {
        let sheet = format!(
            r#"<xsl:stylesheet version="1.0" {}>
                 <xsl:output method="text"/>
                 <xsl:template match="/"><xsl:apply-templates select="a/b"/></xsl:template>
                 <xsl:template match="b"><xsl:value-of select="position()"/>/<xsl:value-of select="last()"/>;</xsl:template>
               </xsl:stylesheet>"#,
            XSL
        );
        let (_, output) = run(&sheet, "<a><b/><b/><b/></a>");
        assert_eq!(output, "1/3;2/3;3/3;");
    }

    #[test]
    fn test_sort_is_stable_and_numeric() {
        let sheet = format!(
            r#"<xsl:stylesheet version="1.0" {}>
                 <xsl:output method="text"/>
                 <xsl:template match="/">
                   <xsl:for-each select="r/i">
                     <xsl:sort select="@n" data-type="number"/>
                     <xsl:value-of select="."/>
                   </xsl:for-each>
                 </xsl:template>
               </xsl:stylesheet>"#,
            XSL
        );
        let (_, output) = run(
            &sheet,
            r#"<r><i n="10">a</i><i n="2">b</i><i n="x">c</i><i n="2">d</i></r>"#,
        );
        assert_eq!(output, "cbda");
    }

    #[test]
    fn test_frames_are_balanced_after_run() {
        let sheet = format!(
            r#"<xsl:stylesheet version="1.0" {}>
                 <xsl:template match="*"><xsl:variable name="v" select="1"/><xsl:apply-templates/></xsl:template>
               </xsl:stylesheet>"#,
            XSL
        );
        let (controller, _) = run(&sheet, "<a><b><c/></b></a>");
        assert_eq!(controller.frame_depth(), 0);
        assert_eq!(controller.state(), RunState::Completed);
    }

    #[test]
    fn test_settings_only_while_idle() {
        let sheet = format!(r#"<xsl:stylesheet version="1.0" {}/>"#, XSL);
        let (mut controller, _) = run(&sheet, "<a/>");
        assert!(controller.set_recovery_policy(RecoveryPolicy::Strict).is_err());
        assert!(controller.set_parameter("p", XPathValue::Number(1.0)).is_err());
        controller.reset();
        assert_eq!(controller.state(), RunState::Idle);
        assert!(controller.set_recovery_policy(RecoveryPolicy::Strict).is_ok());
    }

    #[test]
    fn test_failed_run_emits_nothing() {
        let sheet = format!(
            r#"<xsl:stylesheet version="1.0" {}>
                 <xsl:template match="/"><out/><xsl:message terminate="yes">stop</xsl:message></xsl:template>
               </xsl:stylesheet>"#,
            XSL
        );
        let (mut controller, pool) = controller(&sheet);
        let doc = parse_document("<a/>", &pool).unwrap();
        let mut recorder = EventRecorder::new();
        let err = controller.run(&doc, &mut recorder).unwrap_err();
        assert!(matches!(err, XsltError::Terminated(ref text) if text == "stop"));
        assert!(recorder.events().is_empty());
        assert_eq!(controller.state(), RunState::Failed);
    }

    #[test]
    fn test_result_events() {
        let sheet = format!(
            r#"<xsl:stylesheet version="1.0" {}>
                 <xsl:template match="/"><out n="{{count(//b)}}"/></xsl:template>
               </xsl:stylesheet>"#,
            XSL
        );
        let (mut controller, pool) = controller(&sheet);
        let doc = parse_document("<a><b/><b/></a>", &pool).unwrap();
        let mut recorder = EventRecorder::new();
        controller.run(&doc, &mut recorder).unwrap();
        let events = recorder.into_events();
        assert_eq!(events.first(), Some(&OutputEvent::StartDocument));
        assert!(events.iter().any(|e| matches!(
            e,
            OutputEvent::StartElement { attributes, .. } if attributes[0].1 == "2"
        )));
    }

    #[test]
    fn test_runtime_qnames() {
        let sheet = format!(r#"<xsl:stylesheet version="1.0" {} xmlns:p="urn:p"/>"#, XSL);
        let (controller, _) = controller(&sheet);
        assert_eq!(
            controller.expand_runtime_qname("p:k"),
            Some(("urn:p".to_string(), "k".to_string()))
        );
        assert_eq!(
            controller.expand_runtime_qname("{urn:q}k"),
            Some(("urn:q".to_string(), "k".to_string()))
        );
        assert_eq!(controller.expand_runtime_qname("q:k"), None);
    }

    #[test]
    fn test_case_order() {
        assert_eq!(compare_text("B", "a", None), Ordering::Less);
        assert_eq!(compare_text("B", "a", Some(CaseOrder::UpperFirst)), Ordering::Greater);
        assert_eq!(compare_text("a", "A", Some(CaseOrder::UpperFirst)), Ordering::Greater);
        assert_eq!(compare_text("a", "A", Some(CaseOrder::LowerFirst)), Ordering::Less);
        assert_eq!(compare_text("ab", "Ab", Some(CaseOrder::LowerFirst)), Ordering::Less);
        assert_eq!(compare_text("abc", "abc", Some(CaseOrder::LowerFirst)), Ordering::Equal);
    }
}
