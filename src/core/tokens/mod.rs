//! Token generators for the supported target syntaxes
//!
//! The code-generation driver is language agnostic; each target syntax gets
//! one backend here answering only syntax questions: how to format a
//! literal, an import, a call, and the prolog/epilog around the emitted
//! statements.

mod cpp;
mod python;

pub use cpp::CppTokenGenerator;
pub use python::PythonTokenGenerator;

use crate::error::Result;

use super::call_graph::{LanguageType, LiteralValue, MethodKind, SourceLanguage};
use super::generator::OutputKind;

/// The receiver of a generated call, already rendered by the driver.
#[derive(Debug, Clone, Copy)]
pub enum CallTarget<'a> {
    Module { name: &'a str, builtin: bool },
    Class { name: &'a str },
    Instance { var: &'a str },
}

/// A rendered value reference: either an inline literal ("5") or the name
/// of a variable the driver has bound ("var2").
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub inline: bool,
}

/// Code emitted around the generated statements.
#[derive(Debug, Clone, Default)]
pub struct MainProlog {
    pub code: String,
    /// Indentation every statement inside main starts from.
    pub base_indent: String,
}

/// Trait all target-syntax backends implement. Methods that return complete
/// statements include the supplied indentation and a trailing newline.
pub trait TokenGenerator {
    /// The source language this backend emits.
    fn language(&self) -> SourceLanguage;

    /// Fail early when the backend cannot express the requested output kind.
    fn ensure_supported(&self, _kind: OutputKind) -> Result<()> {
        Ok(())
    }

    fn one_indent(&self) -> &'static str;

    /// The statement terminator appended to bare call lines.
    fn statement_end(&self) -> &'static str;

    fn file_prolog(&self, kind: OutputKind) -> String;

    fn file_epilog(&self, kind: OutputKind) -> String;

    fn main_prolog(&self, kind: OutputKind, project: Option<&str>) -> MainProlog;

    fn main_epilog(&self, kind: OutputKind) -> String;

    /// Import statement for a module, or None when the module is implicit
    /// (built in) and needs no import.
    fn module_import(&self, name: &str) -> Option<String>;

    /// Import for the dummy-placeholder support type.
    fn dummy_support_import(&self) -> String;

    /// Render a scalar literal inline. Containers are never passed here;
    /// the driver declares them through the binding methods.
    fn render_literal(&self, literal: &LiteralValue) -> Result<String>;

    /// Placeholder expression for a value only known by its class.
    fn render_dummy(&self, class_hint: &str) -> String;

    /// Whether a literal is too unwieldy to repeat inline and must be bound
    /// to a variable once.
    fn needs_binding(&self, literal: &LiteralValue) -> bool;

    /// Bind a scalar literal to a variable.
    fn bind_value(&self, indent: &str, var: &str, class_name: &str, value: &str) -> String;

    /// Bind a sequence literal whose elements are already rendered.
    fn bind_sequence(
        &self,
        indent: &str,
        var: &str,
        class_name: &str,
        elements: &[Rendered],
    ) -> Result<String>;

    /// Bind a mapping literal whose keys and values are already rendered.
    fn bind_mapping(
        &self,
        indent: &str,
        var: &str,
        class_name: &str,
        pairs: &[(Rendered, Rendered)],
    ) -> Result<String>;

    /// Construct a receiver with its default constructor, for instances
    /// whose first generated call is not their recorded constructor.
    fn default_construct(&self, indent: &str, var: &str, class_name: &str) -> String;

    /// The call expression target, without the argument list.
    fn call_target(&self, target: CallTarget<'_>, function_name: &str) -> String;

    /// The binding-plus-constructor form (`var0 = MyClass`), without the
    /// argument list.
    fn constructor_target(&self, var: &str, class_name: &str) -> String;

    /// A destructor statement, or None when the target syntax has no
    /// explicit destruction and the call should render as a plain method.
    fn destructor_statement(&self, var: &str) -> Option<String>;

    /// Whether the argument at `index` is the implicit receiver and must be
    /// suppressed in the emitted argument list.
    fn skip_argument(&self, kind: MethodKind, callee_type: LanguageType, index: usize) -> bool;

    /// Unit-test equality assertion for a completed call.
    fn assert_equal(&self, indent: &str, expected: &str, call_expr: &str) -> String;

    /// Unit-test assertion that invoking `callable` with `args` raises
    /// `exception_class`.
    fn assert_raises(
        &self,
        indent: &str,
        exception_class: &str,
        callable: &str,
        args: &[String],
    ) -> String;

    /// Inline assertion for the program-with-assertions output kind.
    fn inline_assert(&self, indent: &str, call_expr: &str, expected: &str) -> String;
}

/// Pick the backend matching a captured program's language.
pub fn token_generator_for(language: SourceLanguage) -> Box<dyn TokenGenerator> {
    match language {
        SourceLanguage::Python => Box::new(PythonTokenGenerator::new()),
        SourceLanguage::Cpp => Box::new(CppTokenGenerator::new()),
    }
}
