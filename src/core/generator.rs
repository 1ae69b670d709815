// src/core/generator.rs - Replays a recorded call graph as source text
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{Result, TracewrightError};

use super::call_graph::{
    Declaration, FunctionCall, LanguageObject, LanguageType, LiteralValue, MethodKind, ObjectId,
    ProgramExecution,
};
use super::tokens::{token_generator_for, CallTarget, Rendered, TokenGenerator};
use super::value::BUILTIN_MODULE_NAMES;

/// What kind of source file to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A standalone program replaying the recorded calls.
    Program,
    /// A standalone program with inline assertions on returned values.
    ProgramWithAsserts,
    /// A unit test asserting every recorded outcome.
    UnitTest,
}

/// Which nesting levels to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelFilter {
    /// Every recorded call. Nested calls run again inside their callers, so
    /// the output is a log-like trace rather than an equivalent program.
    All,
    /// Only calls recorded at exactly this nesting level.
    Exactly(u32),
}

impl LevelFilter {
    fn matches(self, level: u32) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Exactly(wanted) => level == wanted,
        }
    }
}

/// How a declared object is referenced in emitted code: by the variable the
/// driver bound, or by repeating an inline literal.
struct Binding {
    repr: String,
    bound: bool,
}

/// The language-agnostic generation driver.
///
/// Walks the recorded calls in capture order, declaring every object the
/// first time it is referenced, and asks the token generator backend for
/// the target-syntax spelling of each statement. All "already declared"
/// bookkeeping lives here and is discarded with the generator.
pub struct CodeGenerator<'a> {
    execution: &'a ProgramExecution,
    backend: Box<dyn TokenGenerator>,
    kind: OutputKind,
    project: Option<String>,
    bindings: HashMap<ObjectId, Binding>,
    constructed: HashSet<ObjectId>,
    next_instance_index: usize,
    indentation: String,
    base_indent: String,
}

impl<'a> CodeGenerator<'a> {
    /// Build a generator with the backend matching the captured language.
    pub fn new(execution: &'a ProgramExecution, kind: OutputKind, project: Option<String>) -> Self {
        Self::with_backend(
            execution,
            token_generator_for(execution.language()),
            kind,
            project,
        )
    }

    pub fn with_backend(
        execution: &'a ProgramExecution,
        backend: Box<dyn TokenGenerator>,
        kind: OutputKind,
        project: Option<String>,
    ) -> Self {
        Self {
            execution,
            backend,
            kind,
            project,
            bindings: HashMap::new(),
            constructed: HashSet::new(),
            next_instance_index: 0,
            indentation: String::new(),
            base_indent: String::new(),
        }
    }

    /// Produce the source text for the calls selected by `filter`.
    pub fn generate(mut self, filter: LevelFilter) -> Result<String> {
        self.backend.ensure_supported(self.kind)?;
        debug!(kind = ?self.kind, filter = ?filter, "generating source");

        let mut out = String::new();
        out.push_str(&self.backend.file_prolog(self.kind));

        if self.uses_dummy() {
            out.push_str(&self.backend.dummy_support_import());
        }

        // Modules first, then classes, so every later reference can assume
        // its qualifier exists.
        for object in self.execution.objects() {
            if object.language_type() == LanguageType::Module {
                let code = self.declare(object.id())?;
                out.push_str(&code);
            }
        }
        for object in self.execution.objects() {
            if object.language_type() == LanguageType::Class {
                let code = self.declare(object.id())?;
                out.push_str(&code);
            }
        }
        out.push('\n');

        let prolog = self.backend.main_prolog(self.kind, self.project.as_deref());
        out.push_str(&prolog.code);
        self.base_indent = prolog.base_indent;
        self.indentation = self.base_indent.clone();

        let mut previous_level = None;
        for call in self.execution.calls() {
            let level = call.level();
            if !filter.matches(level) {
                continue;
            }
            if previous_level != Some(level) {
                self.indentation = match filter {
                    LevelFilter::All => {
                        format!(
                            "{}{}",
                            self.base_indent,
                            self.backend.one_indent().repeat(level as usize)
                        )
                    }
                    LevelFilter::Exactly(_) => self.base_indent.clone(),
                };
                previous_level = Some(level);
            }
            let code = self.emit_call(call)?;
            out.push_str(&code);
        }

        out.push_str(&self.backend.main_epilog(self.kind));
        out.push_str(&self.backend.file_epilog(self.kind));
        Ok(out)
    }

    /// Whether any recorded argument needs the dummy-placeholder support
    /// type, which then has to be imported up front.
    fn uses_dummy(&self) -> bool {
        self.execution.calls().iter().any(|call| {
            call.arguments().iter().any(|argument| {
                self.execution
                    .object(argument.object())
                    .map(|object| object.declaration().is_dummy())
                    .unwrap_or(false)
            })
        })
    }

    /// Emit the declaration for an object the first time it is referenced;
    /// later references return no code. Registers how the object is spelled
    /// in expressions (variable name or inline literal).
    fn declare(&mut self, id: ObjectId) -> Result<String> {
        if self.bindings.contains_key(&id) {
            return Ok(String::new());
        }
        let object = self.execution.expect_object(id)?;
        match object.language_type() {
            LanguageType::Module => {
                let name = fixed_string(object)?;
                let code = match self.backend.module_import(&name) {
                    Some(import) => format!("{}{}", self.indentation, import),
                    None => String::new(),
                };
                self.bindings.insert(
                    id,
                    Binding {
                        repr: name,
                        bound: false,
                    },
                );
                Ok(code)
            }
            LanguageType::Class => {
                let name = fixed_string(object)?;
                self.bindings.insert(
                    id,
                    Binding {
                        repr: name,
                        bound: false,
                    },
                );
                Ok(String::new())
            }
            LanguageType::Instance => self.declare_instance(object),
        }
    }

    fn declare_instance(&mut self, object: &'a LanguageObject) -> Result<String> {
        let id = object.id();
        // Every instance consumes a variable index, used or not; this keeps
        // the numbering stable however a value ends up being referenced.
        let var = format!("var{}", self.next_instance_index);
        self.next_instance_index += 1;

        match object.declaration() {
            Declaration::Constructor => {
                // The binding statement is the replayed constructor call.
                self.bindings.insert(
                    id,
                    Binding {
                        repr: var,
                        bound: true,
                    },
                );
                Ok(String::new())
            }
            Declaration::Dummy { class_hint } => {
                let text = self.backend.render_dummy(class_hint);
                self.bindings.insert(
                    id,
                    Binding {
                        repr: text,
                        bound: false,
                    },
                );
                Ok(String::new())
            }
            Declaration::FixedValue(literal) => match literal {
                LiteralValue::Sequence(elements) => {
                    let mut code = String::new();
                    for &element in elements {
                        code.push_str(&self.declare(element)?);
                    }
                    let rendered = elements
                        .iter()
                        .map(|&element| self.rendered_of(element))
                        .collect::<Result<Vec<_>>>()?;
                    let class_name = self.parent_class_name(object)?;
                    code.push_str(&self.backend.bind_sequence(
                        &self.indentation,
                        &var,
                        &class_name,
                        &rendered,
                    )?);
                    self.bindings.insert(
                        id,
                        Binding {
                            repr: var,
                            bound: true,
                        },
                    );
                    Ok(code)
                }
                LiteralValue::Mapping(pairs) => {
                    let mut code = String::new();
                    for &(key, value) in pairs {
                        code.push_str(&self.declare(key)?);
                        code.push_str(&self.declare(value)?);
                    }
                    let rendered = pairs
                        .iter()
                        .map(|&(key, value)| {
                            Ok((self.rendered_of(key)?, self.rendered_of(value)?))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let class_name = self.parent_class_name(object)?;
                    code.push_str(&self.backend.bind_mapping(
                        &self.indentation,
                        &var,
                        &class_name,
                        &rendered,
                    )?);
                    self.bindings.insert(
                        id,
                        Binding {
                            repr: var,
                            bound: true,
                        },
                    );
                    Ok(code)
                }
                scalar => {
                    let text = self.backend.render_literal(scalar)?;
                    if self.backend.needs_binding(scalar) {
                        let class_name = self.parent_class_name(object)?;
                        let code =
                            self.backend
                                .bind_value(&self.indentation, &var, &class_name, &text);
                        self.bindings.insert(
                            id,
                            Binding {
                                repr: var,
                                bound: true,
                            },
                        );
                        Ok(code)
                    } else {
                        self.bindings.insert(
                            id,
                            Binding {
                                repr: text,
                                bound: false,
                            },
                        );
                        Ok(String::new())
                    }
                }
            },
        }
    }

    fn emit_call(&mut self, call: &FunctionCall) -> Result<String> {
        let mut out = String::new();
        let callee_id = call.callee();
        out.push_str(&self.declare(callee_id)?);
        let callee = self.execution.expect_object(callee_id)?;

        let is_constructor_call =
            callee.language_type() == LanguageType::Instance
                && call.method_kind() == MethodKind::Constructor;

        // A receiver whose first generated call is not its constructor was
        // created before capture started; give it a default construction.
        if !is_constructor_call
            && !self.constructed.contains(&callee_id)
            && callee.language_type() == LanguageType::Instance
            && self.is_bound(callee_id)
        {
            let class_name = self.parent_class_name(callee)?;
            let var = self.repr_of(callee_id)?;
            out.push_str(
                &self
                    .backend
                    .default_construct(&self.indentation, &var, &class_name),
            );
            self.constructed.insert(callee_id);
        }

        let is_destructor = call.method_kind() == MethodKind::Destructor;
        let destructor_form = if is_destructor {
            self.backend.destructor_statement(&self.repr_of(callee_id)?)
        } else {
            None
        };

        let target = if is_constructor_call {
            self.constructed.insert(callee_id);
            let class_name = self.parent_class_name(callee)?;
            let var = self.repr_of(callee_id)?;
            self.backend.constructor_target(&var, &class_name)
        } else if let Some(form) = &destructor_form {
            form.clone()
        } else {
            let repr = self.repr_of(callee_id)?;
            let callee_target = match callee.language_type() {
                LanguageType::Module => CallTarget::Module {
                    name: &repr,
                    builtin: BUILTIN_MODULE_NAMES.contains(&repr.as_str()),
                },
                LanguageType::Class => CallTarget::Class { name: &repr },
                LanguageType::Instance => CallTarget::Instance { var: &repr },
            };
            self.backend.call_target(callee_target, call.function_name())
        };

        // Destructors take no argument list; everything else declares its
        // arguments first, then renders the non-suppressed ones.
        let mut rendered_args = Vec::new();
        if destructor_form.is_none() {
            for (index, argument) in call.arguments().iter().enumerate() {
                out.push_str(&self.declare(argument.object())?);
                if self
                    .backend
                    .skip_argument(call.method_kind(), callee.language_type(), index)
                {
                    continue;
                }
                let mut text = String::new();
                if let Some(name) = argument.name() {
                    text.push_str(name);
                    text.push_str(" = ");
                }
                text.push_str(&self.repr_of(argument.object())?);
                rendered_args.push(text);
            }
        }

        let call_expr = match &destructor_form {
            Some(_) => target.clone(),
            None => format!("{}({})", target, rendered_args.join(", ")),
        };

        let line = if is_constructor_call {
            self.plain_line(&call_expr)
        } else if let Some(returned_id) = call.returned_object() {
            let returned = self.execution.expect_object(returned_id)?;
            if returned.declaration().is_constructor() {
                // The call produced an object later used as a receiver; its
                // binding is this call's result.
                out.push_str(&self.declare(returned_id)?);
                let var = self.repr_of(returned_id)?;
                self.plain_line(&format!("{var} = {call_expr}"))
            } else {
                match self.kind {
                    OutputKind::UnitTest => {
                        out.push_str(&self.declare(returned_id)?);
                        if call.threw_exception() {
                            let class_id = returned.parent().ok_or_else(|| {
                                TracewrightError::Generation(
                                    "exception instance has no class".to_string(),
                                )
                            })?;
                            out.push_str(&self.declare(class_id)?);
                            let exception_class = self.repr_of(class_id)?;
                            self.backend.assert_raises(
                                &self.indentation,
                                &exception_class,
                                &target,
                                &rendered_args,
                            )
                        } else {
                            let expected = self.repr_of(returned_id)?;
                            self.backend
                                .assert_equal(&self.indentation, &expected, &call_expr)
                        }
                    }
                    OutputKind::ProgramWithAsserts
                        if !call.threw_exception() && !returned.declaration().is_dummy() =>
                    {
                        out.push_str(&self.declare(returned_id)?);
                        let expected = self.repr_of(returned_id)?;
                        self.backend
                            .inline_assert(&self.indentation, &call_expr, &expected)
                    }
                    _ => self.plain_line(&call_expr),
                }
            }
        } else {
            self.plain_line(&call_expr)
        };

        out.push_str(&line);
        Ok(out)
    }

    fn plain_line(&self, expr: &str) -> String {
        format!(
            "{}{}{}\n",
            self.indentation,
            expr,
            self.backend.statement_end()
        )
    }

    fn parent_class_name(&mut self, object: &LanguageObject) -> Result<String> {
        let parent = object.parent().ok_or_else(|| {
            TracewrightError::Generation(format!(
                "object {} has no class parent to name it by",
                object.id()
            ))
        })?;
        // Classes and modules declare without emitting statements, so this
        // cannot inject code mid-line.
        self.declare(parent)?;
        self.repr_of(parent)
    }

    fn repr_of(&self, id: ObjectId) -> Result<String> {
        self.binding(id).map(|binding| binding.repr.clone())
    }

    fn rendered_of(&self, id: ObjectId) -> Result<Rendered> {
        self.binding(id).map(|binding| Rendered {
            text: binding.repr.clone(),
            inline: !binding.bound,
        })
    }

    fn is_bound(&self, id: ObjectId) -> bool {
        self.bindings
            .get(&id)
            .map(|binding| binding.bound)
            .unwrap_or(false)
    }

    fn binding(&self, id: ObjectId) -> Result<&Binding> {
        self.bindings.get(&id).ok_or_else(|| {
            TracewrightError::Generation(format!("object {id} referenced before declaration"))
        })
    }
}

/// Generate source text for an execution in one step.
pub fn generate(
    execution: &ProgramExecution,
    filter: LevelFilter,
    kind: OutputKind,
    project: Option<&str>,
) -> Result<String> {
    CodeGenerator::new(execution, kind, project.map(str::to_string)).generate(filter)
}

fn fixed_string(object: &LanguageObject) -> Result<String> {
    match object.declaration() {
        Declaration::FixedValue(LiteralValue::Str(name)) => Ok(name.clone()),
        other => Err(TracewrightError::Generation(format!(
            "expected a string declaration for object {}, found {}",
            object.id(),
            other.kind_str()
        ))),
    }
}
