// src/core/call_graph.rs - In-memory representation of a captured call graph
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TracewrightError};

/// Identifier for a LanguageObject inside one ProgramExecution. Positive,
/// monotonically assigned, never reused within a session.
pub type ObjectId = u64;

/// Identifier for a FunctionCall inside one ProgramExecution.
pub type CallId = u64;

/// Where an object sits in the captured program's hierarchy:
///
/// ```text
/// Module
///   |
/// Class
///   |
/// Instance
/// ```
///
/// A parent of "none" is only valid for modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageType {
    Module,
    Class,
    Instance,
}

impl LanguageType {
    /// Rank in the hierarchy; the implicit "none" parent ranks 0.
    pub fn rank(self) -> u8 {
        match self {
            LanguageType::Module => 1,
            LanguageType::Class => 2,
            LanguageType::Instance => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageType::Module => "Module",
            LanguageType::Class => "Class",
            LanguageType::Instance => "Instance",
        }
    }

    /// A parent is valid iff it ranks exactly one below the child
    /// (none -> Module -> Class -> Instance).
    pub fn is_valid_parent(parent: Option<LanguageType>, child: LanguageType) -> bool {
        let parent_rank = parent.map_or(0, LanguageType::rank);
        parent_rank + 1 == child.rank()
    }

    fn name_of(parent: Option<LanguageType>) -> &'static str {
        parent.map_or("None", LanguageType::as_str)
    }
}

/// The literal payload of a FixedValue declaration. Containers do not hold
/// their contents directly: by the time a container is declared, every
/// element has already been resolved to its own LanguageObject, so the
/// payload references child ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// List/tuple literal: ids of the element objects, in order.
    Sequence(Vec<ObjectId>),
    /// Mapping literal: (key id, value id) pairs, in order.
    Mapping(Vec<(ObjectId, ObjectId)>),
}

impl LiteralValue {
    pub fn is_container(&self) -> bool {
        matches!(self, LiteralValue::Sequence(_) | LiteralValue::Mapping(_))
    }
}

/// How to reproduce an object in generated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Declaration {
    /// The object is created by replaying its recorded constructor call
    /// (`var0 = MyClass(...)`); no payload needed.
    Constructor,
    /// There is a fixed literal representation for the object.
    FixedValue(LiteralValue),
    /// We do not know how to create the object; generated code substitutes a
    /// placeholder that only remembers the class name.
    Dummy { class_hint: String },
}

impl Declaration {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Declaration::Constructor => "CONSTRUCTOR",
            Declaration::FixedValue(_) => "FIXED_VALUE",
            Declaration::Dummy { .. } => "DUMMY",
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, Declaration::Constructor)
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self, Declaration::Dummy { .. })
    }
}

/// Flavor of a recorded function, as classified by the instrumentation
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Method,
    StaticMethod,
    ClassMethod,
    Property,
    Constructor,
    Destructor,
}

impl MethodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodKind::Method => "method",
            MethodKind::StaticMethod => "static method",
            MethodKind::ClassMethod => "class method",
            MethodKind::Property => "property",
            MethodKind::Constructor => "constructor",
            MethodKind::Destructor => "destructor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "method" => Some(MethodKind::Method),
            "static method" => Some(MethodKind::StaticMethod),
            "class method" => Some(MethodKind::ClassMethod),
            "property" => Some(MethodKind::Property),
            "constructor" => Some(MethodKind::Constructor),
            "destructor" => Some(MethodKind::Destructor),
            _ => None,
        }
    }
}

/// How an argument is passed. Only meaningful for C-like targets; Value for
/// everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassingMode {
    Value,
    Pointer,
    Reference,
}

impl PassingMode {
    pub fn as_u8(self) -> u8 {
        match self {
            PassingMode::Value => 0,
            PassingMode::Pointer => 1,
            PassingMode::Reference => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PassingMode::Value),
            1 => Some(PassingMode::Pointer),
            2 => Some(PassingMode::Reference),
            _ => None,
        }
    }
}

/// Language of the captured program. Selects the serialized argument
/// encoding and the default generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLanguage {
    Python,
    Cpp,
}

impl SourceLanguage {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceLanguage::Python => "Python",
            SourceLanguage::Cpp => "C++",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Python" => Some(SourceLanguage::Python),
            "C++" => Some(SourceLanguage::Cpp),
            _ => None,
        }
    }

    /// C-like languages serialize per-argument passing mode and constness
    /// instead of keyword names.
    pub fn is_c_like(self) -> bool {
        matches!(self, SourceLanguage::Cpp)
    }
}

/// KEY TYPE. One deduplicated node for one logical runtime value: a module,
/// a class, or an instance. Every value a recorded call touches is declared
/// as a LanguageObject; capturing the number 5 declares the built-in module,
/// the `int` class, and the `5` instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageObject {
    id: ObjectId,
    language_type: LanguageType,
    declaration: Declaration,
    parent: Option<ObjectId>,
}

impl LanguageObject {
    /// Build a new object, validating the parent-adjacency invariant: the
    /// parent's language type must rank exactly one below the child's.
    pub fn new(
        id: ObjectId,
        language_type: LanguageType,
        declaration: Declaration,
        parent: Option<&LanguageObject>,
    ) -> Result<Self> {
        if id == 0 {
            return Err(TracewrightError::LoadFormat(
                "LanguageObject id must be positive".to_string(),
            ));
        }
        let parent_type = parent.map(|p| p.language_type);
        if !LanguageType::is_valid_parent(parent_type, language_type) {
            return Err(TracewrightError::InvalidParent {
                parent: LanguageType::name_of(parent_type).to_string(),
                child: language_type.as_str().to_string(),
            });
        }
        Ok(Self {
            id,
            language_type,
            declaration,
            parent: parent.map(|p| p.id),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn language_type(&self) -> LanguageType {
        self.language_type
    }

    pub fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }
}

/// One function argument: the object passed, an optional keyword name, and
/// the C-like passing information.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    object: ObjectId,
    name: Option<String>,
    passing: PassingMode,
    is_const: bool,
}

impl Argument {
    pub fn positional(object: ObjectId) -> Self {
        Self {
            object,
            name: None,
            passing: PassingMode::Value,
            is_const: false,
        }
    }

    pub fn named(object: ObjectId, name: impl Into<String>) -> Self {
        Self {
            object,
            name: Some(name.into()),
            passing: PassingMode::Value,
            is_const: false,
        }
    }

    pub fn with_passing(object: ObjectId, passing: PassingMode, is_const: bool) -> Self {
        Self {
            object,
            name: None,
            passing,
            is_const,
        }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn passing(&self) -> PassingMode {
        self.passing
    }

    pub fn is_const(&self) -> bool {
        self.is_const
    }
}

/// One recorded invocation. Created when the instrumented function is
/// entered, completed exactly once when it exits, immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    id: CallId,
    callee: ObjectId,
    function_name: String,
    method_kind: MethodKind,
    arguments: Vec<Argument>,
    level: u32,
    returned_object: Option<ObjectId>,
    threw_exception: bool,
    total_time: Option<f64>,
}

impl FunctionCall {
    pub fn new(
        id: CallId,
        callee: ObjectId,
        function_name: impl Into<String>,
        method_kind: MethodKind,
        arguments: Vec<Argument>,
        level: u32,
    ) -> Self {
        Self {
            id,
            callee,
            function_name: function_name.into(),
            method_kind,
            arguments,
            level,
            returned_object: None,
            threw_exception: false,
            total_time: None,
        }
    }

    /// Rebuild a completed call, e.g. when loading a persisted graph.
    #[allow(clippy::too_many_arguments)]
    pub fn completed(
        id: CallId,
        callee: ObjectId,
        function_name: impl Into<String>,
        method_kind: MethodKind,
        arguments: Vec<Argument>,
        level: u32,
        returned_object: Option<ObjectId>,
        threw_exception: bool,
        total_time: Option<f64>,
    ) -> Self {
        Self {
            id,
            callee,
            function_name: function_name.into(),
            method_kind,
            arguments,
            level,
            returned_object,
            threw_exception,
            total_time,
        }
    }

    /// Record the function's outcome. Called once, on the exit event.
    pub fn complete(
        &mut self,
        returned_object: Option<ObjectId>,
        threw_exception: bool,
        total_time: Option<f64>,
    ) {
        self.returned_object = returned_object;
        self.threw_exception = threw_exception;
        self.total_time = total_time;
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn callee(&self) -> ObjectId {
        self.callee
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn method_kind(&self) -> MethodKind {
        self.method_kind
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn returned_object(&self) -> Option<ObjectId> {
        self.returned_object
    }

    pub fn threw_exception(&self) -> bool {
        self.threw_exception
    }

    pub fn total_time(&self) -> Option<f64> {
        self.total_time
    }
}

/// The complete captured call graph for one session: every LanguageObject
/// used by the recorded functions, plus the calls themselves in temporal
/// order.
///
/// Objects live in an arena: a growable, insertion-ordered table indexed by
/// id, with parent links as ids rather than pointers. Parents are always
/// registered before their children, which is exactly the order a persisted
/// graph is reloaded in.
#[derive(Debug, Clone)]
pub struct ProgramExecution {
    language: SourceLanguage,
    objects: Vec<LanguageObject>,
    index: HashMap<ObjectId, usize>,
    calls: Vec<FunctionCall>,
}

impl ProgramExecution {
    /// Top-of-stack nesting level.
    pub const MIN_LEVEL: u32 = 0;

    pub fn new(language: SourceLanguage) -> Self {
        Self {
            language,
            objects: Vec::new(),
            index: HashMap::new(),
            calls: Vec::new(),
        }
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    /// The LanguageType table persisted with every dump, including the
    /// rank-0 "None" entry used for module parents.
    pub fn language_type_table(&self) -> [(u8, &'static str); 4] {
        [(0, "None"), (1, "Module"), (2, "Class"), (3, "Instance")]
    }

    /// Register a new object. The id must be unused and the parent, if any,
    /// must already be registered.
    pub fn add_object(&mut self, object: LanguageObject) -> Result<()> {
        if self.index.contains_key(&object.id()) {
            return Err(TracewrightError::DuplicateObjectId(object.id()));
        }
        if let Some(parent) = object.parent() {
            if !self.index.contains_key(&parent) {
                return Err(TracewrightError::MissingObject(parent));
            }
        }
        self.index.insert(object.id(), self.objects.len());
        self.objects.push(object);
        Ok(())
    }

    /// Append a call. Calls are stored in capture order and never removed.
    pub fn add_call(&mut self, call: FunctionCall) {
        self.calls.push(call);
    }

    pub fn object(&self, id: ObjectId) -> Option<&LanguageObject> {
        self.index.get(&id).map(|&slot| &self.objects[slot])
    }

    /// Like `object`, but a missing id is a hard error.
    pub fn expect_object(&self, id: ObjectId) -> Result<&LanguageObject> {
        self.object(id).ok_or(TracewrightError::MissingObject(id))
    }

    /// Objects in registration (= declaration) order.
    pub fn objects(&self) -> impl Iterator<Item = &LanguageObject> {
        self.objects.iter()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Calls in capture order.
    pub fn calls(&self) -> &[FunctionCall] {
        &self.calls
    }

    pub(crate) fn call_at_mut(&mut self, index: usize) -> &mut FunctionCall {
        &mut self.calls[index]
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> LanguageObject {
        LanguageObject::new(
            1,
            LanguageType::Module,
            Declaration::FixedValue(LiteralValue::Str("mod1.mod2".into())),
            None,
        )
        .unwrap()
    }

    #[test]
    fn valid_parent_pairs() {
        assert!(LanguageType::is_valid_parent(None, LanguageType::Module));
        assert!(LanguageType::is_valid_parent(
            Some(LanguageType::Module),
            LanguageType::Class
        ));
        assert!(LanguageType::is_valid_parent(
            Some(LanguageType::Class),
            LanguageType::Instance
        ));
    }

    #[test]
    fn invalid_parent_pairs() {
        let all = [LanguageType::Module, LanguageType::Class, LanguageType::Instance];
        for child in all {
            for parent in all {
                let expected = parent.rank() + 1 == child.rank();
                assert_eq!(
                    LanguageType::is_valid_parent(Some(parent), child),
                    expected,
                    "parent {parent:?} child {child:?}"
                );
            }
        }
        assert!(!LanguageType::is_valid_parent(None, LanguageType::Class));
        assert!(!LanguageType::is_valid_parent(None, LanguageType::Instance));
    }

    #[test]
    fn construction_enforces_hierarchy() {
        let module = module();
        assert_eq!(module.id(), 1);
        assert_eq!(module.parent(), None);

        // A module cannot parent another module.
        let err = LanguageObject::new(
            2,
            LanguageType::Module,
            Declaration::FixedValue(LiteralValue::Str("mod2".into())),
            Some(&module),
        )
        .unwrap_err();
        assert!(matches!(err, TracewrightError::InvalidParent { .. }));

        // A class needs a module parent.
        let err = LanguageObject::new(
            3,
            LanguageType::Class,
            Declaration::FixedValue(LiteralValue::Str("AClass".into())),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TracewrightError::InvalidParent { .. }));

        let class = LanguageObject::new(
            2,
            LanguageType::Class,
            Declaration::FixedValue(LiteralValue::Str("AClass".into())),
            Some(&module),
        )
        .unwrap();

        // An instance needs a class parent, not a module.
        let err = LanguageObject::new(
            3,
            LanguageType::Instance,
            Declaration::FixedValue(LiteralValue::Str("Gerva".into())),
            Some(&module),
        )
        .unwrap_err();
        assert!(matches!(err, TracewrightError::InvalidParent { .. }));

        let instance = LanguageObject::new(
            3,
            LanguageType::Instance,
            Declaration::FixedValue(LiteralValue::Str("Gerva".into())),
            Some(&class),
        )
        .unwrap();
        assert_eq!(instance.parent(), Some(2));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut execution = ProgramExecution::new(SourceLanguage::Python);
        let module = module();
        execution.add_object(module.clone()).unwrap();

        let class = LanguageObject::new(
            1,
            LanguageType::Class,
            Declaration::FixedValue(LiteralValue::Str("AClass".into())),
            Some(&module),
        )
        .unwrap();
        let err = execution.add_object(class).unwrap_err();
        assert!(matches!(err, TracewrightError::DuplicateObjectId(1)));
    }

    #[test]
    fn unregistered_parent_is_rejected() {
        let mut execution = ProgramExecution::new(SourceLanguage::Python);
        let orphan_parent = module();
        let class = LanguageObject::new(
            2,
            LanguageType::Class,
            Declaration::FixedValue(LiteralValue::Str("AClass".into())),
            Some(&orphan_parent),
        )
        .unwrap();
        let err = execution.add_object(class).unwrap_err();
        assert!(matches!(err, TracewrightError::MissingObject(1)));
    }

    #[test]
    fn calls_keep_capture_order() {
        let mut execution = ProgramExecution::new(SourceLanguage::Python);
        execution.add_object(module()).unwrap();

        let args = vec![Argument::positional(1), Argument::named(1, "param")];
        execution.add_call(FunctionCall::new(1, 1, "fun", MethodKind::Method, args.clone(), 0));
        execution.add_call(FunctionCall::new(2, 1, "fun2", MethodKind::Method, args, 1));

        let calls = execution.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function_name(), "fun");
        assert_eq!(calls[0].level(), 0);
        assert_eq!(calls[0].returned_object(), None);
        assert!(!calls[0].threw_exception());
        assert_eq!(calls[1].function_name(), "fun2");
        assert_eq!(calls[1].arguments()[1].name(), Some("param"));
    }

    #[test]
    fn completing_a_call_records_the_outcome() {
        let mut call = FunctionCall::new(1, 1, "fun", MethodKind::Method, vec![], 0);
        call.complete(Some(4), true, Some(0.25));
        assert_eq!(call.returned_object(), Some(4));
        assert!(call.threw_exception());
        assert_eq!(call.total_time(), Some(0.25));
    }
}
