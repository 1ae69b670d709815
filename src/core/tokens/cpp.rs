use crate::error::{Result, TracewrightError};

use super::super::call_graph::{LanguageType, LiteralValue, MethodKind, SourceLanguage};
use super::super::generator::OutputKind;
use super::super::value::BUILTIN_MODULE_NAMES;
use super::{CallTarget, MainProlog, Rendered, TokenGenerator};

const MAX_LENGTH_FOR_NOT_DECLARING: usize = 50;

/// Token generator for C++ source files.
pub struct CppTokenGenerator;

impl CppTokenGenerator {
    pub fn new() -> Self {
        Self
    }

    fn quote(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for ch in value.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push(other),
            }
        }
        out.push('"');
        out
    }

    /// Container elements must be inline-representable; bound variables
    /// cannot be replayed into vector/map literals.
    fn reject_bound(&self, rendered: &Rendered, container: &str) -> Result<()> {
        if rendered.inline {
            Ok(())
        } else {
            Err(TracewrightError::Generation(format!(
                "{container} only allows simple-type members"
            )))
        }
    }
}

impl Default for CppTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator for CppTokenGenerator {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Cpp
    }

    fn ensure_supported(&self, kind: OutputKind) -> Result<()> {
        match kind {
            OutputKind::UnitTest => Err(TracewrightError::Generation(
                "unit test generation is not supported for the C++ backend".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn one_indent(&self) -> &'static str {
        "    "
    }

    fn statement_end(&self) -> &'static str {
        ";"
    }

    fn file_prolog(&self, kind: OutputKind) -> String {
        match kind {
            OutputKind::ProgramWithAsserts => "#include <cassert>\n".to_string(),
            _ => String::new(),
        }
    }

    fn file_epilog(&self, _kind: OutputKind) -> String {
        String::new()
    }

    fn main_prolog(&self, _kind: OutputKind, _project: Option<&str>) -> MainProlog {
        MainProlog {
            code: "int main(int argc, char* argv[])\n{\n".to_string(),
            base_indent: self.one_indent().to_string(),
        }
    }

    fn main_epilog(&self, _kind: OutputKind) -> String {
        "}\n".to_string()
    }

    fn module_import(&self, name: &str) -> Option<String> {
        if BUILTIN_MODULE_NAMES.contains(&name) {
            return None;
        }
        // System headers already carry their angle brackets.
        if name.starts_with('<') {
            Some(format!("#include {name}\n"))
        } else {
            Some(format!("#include \"{name}\"\n"))
        }
    }

    fn dummy_support_import(&self) -> String {
        "#include <tracewright/Dummy.h>\n".to_string()
    }

    fn render_literal(&self, literal: &LiteralValue) -> Result<String> {
        match literal {
            LiteralValue::Null => Ok("NULL".to_string()),
            LiteralValue::Bool(v) => Ok(if *v { "true" } else { "false" }.to_string()),
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
        format!("Dummy({})", self.quote(class_hint))
    }

    fn needs_binding(&self, literal: &LiteralValue) -> bool {
        match literal {
            LiteralValue::Str(v) => v.len() > MAX_LENGTH_FOR_NOT_DECLARING,
            LiteralValue::Sequence(_) | LiteralValue::Mapping(_) => true,
            _ => false,
        }
    }

    fn bind_value(&self, indent: &str, var: &str, class_name: &str, value: &str) -> String {
        format!("{indent}{class_name} {var} = {value};\n")
    }

    fn bind_sequence(
        &self,
        indent: &str,
        var: &str,
        class_name: &str,
        elements: &[Rendered],
    ) -> Result<String> {
        let mut out = format!("{indent}{class_name} {var};\n");
        for element in elements {
            self.reject_bound(element, "std::vector")?;
            out.push_str(&format!("{indent}{var}.push_back({});\n", element.text));
        }
        Ok(out)
    }

    fn bind_mapping(
        &self,
        indent: &str,
        var: &str,
        class_name: &str,
        pairs: &[(Rendered, Rendered)],
    ) -> Result<String> {
        let mut out = format!("{indent}{class_name} {var};\n");
        for (key, value) in pairs {
            self.reject_bound(key, "std::map")?;
            self.reject_bound(value, "std::map")?;
            out.push_str(&format!(
                "{indent}{var}[{}] = {};\n",
                key.text, value.text
            ));
        }
        Ok(out)
    }

    fn default_construct(&self, indent: &str, var: &str, class_name: &str) -> String {
        format!("{indent}{class_name} * {var} = new {class_name};\n")
    }

    fn call_target(&self, target: CallTarget<'_>, function_name: &str) -> String {
        match target {
            // Free functions are not qualified by their header.
            CallTarget::Module { .. } => function_name.to_string(),
            CallTarget::Class { name } => format!("{name}::{function_name}"),
            CallTarget::Instance { var } => format!("{var}->{function_name}"),
        }
    }

    fn constructor_target(&self, var: &str, class_name: &str) -> String {
        format!("{class_name} * {var} = new {class_name}")
    }

    fn destructor_statement(&self, var: &str) -> Option<String> {
        Some(format!("delete {var}"))
    }

    fn skip_argument(&self, _kind: MethodKind, _callee_type: LanguageType, _index: usize) -> bool {
        // No implicit receiver argument in the C++ event stream.
        false
    }

    fn assert_equal(&self, indent: &str, expected: &str, call_expr: &str) -> String {
        format!("{indent}assert({call_expr} == {expected});\n")
    }

    fn assert_raises(
        &self,
        indent: &str,
        _exception_class: &str,
        callable: &str,
        args: &[String],
    ) -> String {
        // No portable raises-assertion; emit the bare call.
        format!("{indent}{callable}({});\n", args.join(", "))
    }

    fn inline_assert(&self, indent: &str, call_expr: &str, expected: &str) -> String {
        format!("{indent}assert({call_expr} == {expected});\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_render_in_cpp_syntax() {
        let tokens = CppTokenGenerator::new();
        assert_eq!(tokens.render_literal(&LiteralValue::Null).unwrap(), "NULL");
        assert_eq!(
            tokens.render_literal(&LiteralValue::Bool(false)).unwrap(),
            "false"
        );
        assert_eq!(
            tokens
                .render_literal(&LiteralValue::Str("hi".into()))
                .unwrap(),
            "\"hi\""
        );
    }

    #[test]
    fn system_headers_keep_their_brackets() {
        let tokens = CppTokenGenerator::new();
        assert_eq!(
            tokens.module_import("<vector>").unwrap(),
            "#include <vector>\n"
        );
        assert_eq!(
            tokens.module_import("widget.h").unwrap(),
            "#include \"widget.h\"\n"
        );
    }

    #[test]
    fn bound_container_members_are_rejected() {
        let tokens = CppTokenGenerator::new();
        let bound = Rendered {
            text: "var1".to_string(),
            inline: false,
        };
        let err = tokens
            .bind_sequence("", "var0", "list", &[bound])
            .unwrap_err();
        assert!(matches!(err, TracewrightError::Generation(_)));
    }

    #[test]
    fn unit_tests_are_not_expressible() {
        let tokens = CppTokenGenerator::new();
        assert!(tokens.ensure_supported(OutputKind::UnitTest).is_err());
        assert!(tokens.ensure_supported(OutputKind::Program).is_ok());
    }
}
