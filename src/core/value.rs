use serde::{Deserialize, Serialize};

use super::call_graph::LanguageType;

/// Module name the host language treats as implicitly imported. Objects that
/// live here (ints, strings, built-in exceptions) never produce an import in
/// generated code.
pub const BUILTIN_MODULE: &str = "__builtin__";

/// Module names that count as built in when deciding whether an import is
/// needed.
pub const BUILTIN_MODULE_NAMES: &[&str] = &["__builtin__", "builtins", "exceptions"];

/// Reference to a class in the captured program: its defining module plus the
/// class name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassRef {
    pub module: String,
    pub name: String,
}

impl ClassRef {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// A class from the host language's built-in module (`int`, `str`, ...).
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new(BUILTIN_MODULE, name)
    }

    /// Parse a dotted "module.Class" hint; a bare name maps to the built-in
    /// module.
    pub fn from_qualified(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((module, name)) => Self::new(module, name),
            None => Self::builtin(qualified),
        }
    }

    /// Name as it appears in generated code: built-in classes are not
    /// qualified by their module.
    pub fn qualified_name(&self) -> String {
        if BUILTIN_MODULE_NAMES.contains(&self.module.as_str()) {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }
}

/// A runtime value as reified by the instrumentation layer.
///
/// The core never inspects live host objects; every enter/exit event carries
/// its callee, arguments and result in this representation. `Instance` keeps
/// the host address so two live objects are never conflated; `Opaque` is the
/// instrumentation's admission that it could not reify a value, and degrades
/// to a Dummy declaration during resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CapturedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A list or tuple; element order preserved.
    Sequence(Vec<CapturedValue>),
    /// A mapping; pair order preserved.
    Mapping(Vec<(CapturedValue, CapturedValue)>),
    Module { name: String },
    Class(ClassRef),
    Instance { class: ClassRef, address: u64 },
    Opaque { class_name: String, address: u64 },
}

impl CapturedValue {
    pub fn module(name: impl Into<String>) -> Self {
        CapturedValue::Module { name: name.into() }
    }

    pub fn instance(class: ClassRef, address: u64) -> Self {
        CapturedValue::Instance { class, address }
    }

    pub fn list(elements: Vec<CapturedValue>) -> Self {
        CapturedValue::Sequence(elements)
    }

    pub fn dict(pairs: Vec<(CapturedValue, CapturedValue)>) -> Self {
        CapturedValue::Mapping(pairs)
    }

    /// Where this value sits in the Module -> Class -> Instance hierarchy.
    pub fn language_type(&self) -> LanguageType {
        match self {
            CapturedValue::Module { .. } => LanguageType::Module,
            CapturedValue::Class(_) => LanguageType::Class,
            _ => LanguageType::Instance,
        }
    }

    /// The class an instance-like value belongs to. Modules and classes have
    /// no class of their own in this hierarchy.
    pub fn class_of(&self) -> Option<ClassRef> {
        match self {
            CapturedValue::Null => Some(ClassRef::builtin("NoneType")),
            CapturedValue::Bool(_) => Some(ClassRef::builtin("bool")),
            CapturedValue::Int(_) => Some(ClassRef::builtin("int")),
            CapturedValue::Float(_) => Some(ClassRef::builtin("float")),
            CapturedValue::Str(_) => Some(ClassRef::builtin("str")),
            CapturedValue::Sequence(_) => Some(ClassRef::builtin("list")),
            CapturedValue::Mapping(_) => Some(ClassRef::builtin("dict")),
            CapturedValue::Instance { class, .. } => Some(class.clone()),
            CapturedValue::Opaque { class_name, .. } => {
                Some(ClassRef::from_qualified(class_name))
            }
            CapturedValue::Module { .. } | CapturedValue::Class(_) => None,
        }
    }
}

impl From<i64> for CapturedValue {
    fn from(v: i64) -> Self {
        CapturedValue::Int(v)
    }
}

impl From<f64> for CapturedValue {
    fn from(v: f64) -> Self {
        CapturedValue::Float(v)
    }
}

impl From<bool> for CapturedValue {
    fn from(v: bool) -> Self {
        CapturedValue::Bool(v)
    }
}

impl From<&str> for CapturedValue {
    fn from(v: &str) -> Self {
        CapturedValue::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_classes_are_unqualified() {
        assert_eq!(ClassRef::builtin("int").qualified_name(), "int");
        assert_eq!(
            ClassRef::new("my_mod", "Widget").qualified_name(),
            "my_mod.Widget"
        );
    }

    #[test]
    fn qualified_hint_round_trips() {
        let class = ClassRef::from_qualified("my_mod.Widget");
        assert_eq!(class.module, "my_mod");
        assert_eq!(class.name, "Widget");

        let bare = ClassRef::from_qualified("RuntimeError");
        assert_eq!(bare.module, BUILTIN_MODULE);
    }

    #[test]
    fn hierarchy_classification() {
        assert_eq!(
            CapturedValue::module("m").language_type(),
            LanguageType::Module
        );
        assert_eq!(
            CapturedValue::Class(ClassRef::builtin("int")).language_type(),
            LanguageType::Class
        );
        assert_eq!(CapturedValue::Int(5).language_type(), LanguageType::Instance);
        assert_eq!(
            CapturedValue::Int(5).class_of(),
            Some(ClassRef::builtin("int"))
        );
    }
}
