use crate::error::{Result, TracewrightError};

use super::super::call_graph::{LanguageType, LiteralValue, MethodKind, SourceLanguage};
use super::super::generator::OutputKind;
use super::super::value::BUILTIN_MODULE_NAMES;
use super::{CallTarget, MainProlog, Rendered, TokenGenerator};

const SPACES_PER_TAB: usize = 4;
const MAX_LENGTH_FOR_NOT_DECLARING: usize = 50;

/// Token generator for Python source files.
pub struct PythonTokenGenerator;

impl PythonTokenGenerator {
    pub fn new() -> Self {
        Self
    }

    fn quote(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for ch in value.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push(other),
            }
        }
        out.push('\'');
        out
    }
}

impl Default for PythonTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator for PythonTokenGenerator {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Python
    }

    fn one_indent(&self) -> &'static str {
        "    "
    }

    fn statement_end(&self) -> &'static str {
        ""
    }

    fn file_prolog(&self, kind: OutputKind) -> String {
        match kind {
            OutputKind::UnitTest => "import unittest\n".to_string(),
            _ => String::new(),
        }
    }

    fn file_epilog(&self, kind: OutputKind) -> String {
        match kind {
            OutputKind::UnitTest => "\nif __name__ == '__main__':\n    unittest.main()\n".to_string(),
            _ => String::new(),
        }
    }

    fn main_prolog(&self, kind: OutputKind, project: Option<&str>) -> MainProlog {
        match kind {
            OutputKind::UnitTest => {
                let case_name = project
                    .map(|name| format!("{}Test", name.replace(' ', "_")))
                    .unwrap_or_else(|| "UNIT_TEST_CASE".to_string());
                MainProlog {
                    code: format!(
                        "class {case_name}(unittest.TestCase):\n    def test_main(self):\n"
                    ),
                    base_indent: self.one_indent().repeat(2),
                }
            }
            _ => MainProlog::default(),
        }
    }

    fn main_epilog(&self, _kind: OutputKind) -> String {
        String::new()
    }

    fn module_import(&self, name: &str) -> Option<String> {
        if BUILTIN_MODULE_NAMES.contains(&name) {
            None
        } else {
            Some(format!("import {name}\n"))
        }
    }

    fn dummy_support_import(&self) -> String {
        "from tracewright import dummy\n".to_string()
    }

    fn render_literal(&self, literal: &LiteralValue) -> Result<String> {
        match literal {
            LiteralValue::Null => Ok("None".to_string()),
            LiteralValue::Bool(v) => Ok(if *v { "True" } else { "False" }.to_string()),
            LiteralValue::Int(v) => Ok(v.to_string()),
            LiteralValue::Float(v) => Ok(format!("{v:?}")),
            LiteralValue::Str(v) => Ok(self.quote(v)),
            LiteralValue::Sequence(_) | LiteralValue::Mapping(_) => {
                Err(TracewrightError::Generation(
                    "container literals must be declared through a binding".to_string(),
                ))
            }
        }
    }

    fn render_dummy(&self, class_hint: &str) -> String {
        format!("dummy.Dummy({})", self.quote(class_hint))
    }

    fn needs_binding(&self, literal: &LiteralValue) -> bool {
        match literal {
            LiteralValue::Str(v) => v.len() > MAX_LENGTH_FOR_NOT_DECLARING,
            LiteralValue::Sequence(_) | LiteralValue::Mapping(_) => true,
            _ => false,
        }
    }

    fn bind_value(&self, indent: &str, var: &str, _class_name: &str, value: &str) -> String {
        format!("{indent}{var} = {value}\n")
    }

    fn bind_sequence(
        &self,
        indent: &str,
        var: &str,
        _class_name: &str,
        elements: &[Rendered],
    ) -> Result<String> {
        let rendered = elements
            .iter()
            .map(|element| element.text.clone())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("{indent}{var} = [{rendered}]\n"))
    }

    fn bind_mapping(
        &self,
        indent: &str,
        var: &str,
        _class_name: &str,
        pairs: &[(Rendered, Rendered)],
    ) -> Result<String> {
        let mut out = format!("{indent}{var} = {{}}\n");
        for (key, value) in pairs {
            out.push_str(&format!("{indent}{var}[{}] = {}\n", key.text, value.text));
        }
        Ok(out)
    }

    fn default_construct(&self, indent: &str, var: &str, class_name: &str) -> String {
        format!("{indent}{var} = {class_name}()\n")
    }

    fn call_target(&self, target: CallTarget<'_>, function_name: &str) -> String {
        match target {
            // Functions from the built-in module need no qualification.
            CallTarget::Module { builtin: true, .. } => function_name.to_string(),
            CallTarget::Module { name, .. } => format!("{name}.{function_name}"),
            CallTarget::Class { name } => format!("{name}.{function_name}"),
            CallTarget::Instance { var } => format!("{var}.{function_name}"),
        }
    }

    fn constructor_target(&self, var: &str, class_name: &str) -> String {
        format!("{var} = {class_name}")
    }

    fn destructor_statement(&self, _var: &str) -> Option<String> {
        // Python has no explicit destruction; render as a plain method.
        None
    }

    fn skip_argument(&self, kind: MethodKind, callee_type: LanguageType, index: usize) -> bool {
        // Skip "self" in instance methods and "cls" in class methods.
        index == 0 && (kind == MethodKind::ClassMethod || callee_type == LanguageType::Instance)
    }

    fn assert_equal(&self, indent: &str, expected: &str, call_expr: &str) -> String {
        format!("{indent}self.assertEqual({expected}, {call_expr})\n")
    }

    fn assert_raises(
        &self,
        indent: &str,
        exception_class: &str,
        callable: &str,
        args: &[String],
    ) -> String {
        // assertRaises invokes the callable itself, so the arguments are
        // forwarded after it rather than applied to it.
        let mut parts = vec![exception_class.to_string(), callable.to_string()];
        parts.extend(args.iter().cloned());
        format!("{indent}self.assertRaises({})\n", parts.join(", "))
    }

    fn inline_assert(&self, indent: &str, call_expr: &str, expected: &str) -> String {
        format!("{indent}assert {call_expr} == {expected}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_render_in_python_syntax() {
        let tokens = PythonTokenGenerator::new();
        assert_eq!(tokens.render_literal(&LiteralValue::Null).unwrap(), "None");
        assert_eq!(
            tokens.render_literal(&LiteralValue::Bool(true)).unwrap(),
            "True"
        );
        assert_eq!(tokens.render_literal(&LiteralValue::Int(-3)).unwrap(), "-3");
        assert_eq!(
            tokens.render_literal(&LiteralValue::Float(2.5)).unwrap(),
            "2.5"
        );
        assert_eq!(
            tokens
                .render_literal(&LiteralValue::Str("it's".into()))
                .unwrap(),
            "'it\\'s'"
        );
    }

    #[test]
    fn builtin_modules_are_not_imported() {
        let tokens = PythonTokenGenerator::new();
        assert_eq!(tokens.module_import("__builtin__"), None);
        assert_eq!(
            tokens.module_import("my_functions").unwrap(),
            "import my_functions\n"
        );
    }

    #[test]
    fn receiver_argument_is_skipped() {
        let tokens = PythonTokenGenerator::new();
        assert!(tokens.skip_argument(MethodKind::Method, LanguageType::Instance, 0));
        assert!(tokens.skip_argument(MethodKind::ClassMethod, LanguageType::Class, 0));
        assert!(!tokens.skip_argument(MethodKind::StaticMethod, LanguageType::Class, 0));
        assert!(!tokens.skip_argument(MethodKind::Method, LanguageType::Instance, 1));
        assert!(!tokens.skip_argument(MethodKind::Method, LanguageType::Module, 0));
    }

    #[test]
    fn raises_assertion_forwards_arguments() {
        let tokens = PythonTokenGenerator::new();
        assert_eq!(
            tokens.assert_raises("", "m.MyException", "m.func2", &[]),
            "self.assertRaises(m.MyException, m.func2)\n"
        );
        assert_eq!(
            tokens.assert_raises("", "m.MyException", "m.func3", &["5".to_string()]),
            "self.assertRaises(m.MyException, m.func3, 5)\n"
        );
    }
}
