mod call_graph;
mod capture;
mod engine;
mod file_utils;
mod generator;
mod resolver;
mod serialization;
mod value;

// Per-target-syntax token generators
mod tokens;

pub use call_graph::{
    Argument, CallId, Declaration, FunctionCall, LanguageObject, LanguageType, LiteralValue,
    MethodKind, ObjectId, PassingMode, ProgramExecution, SourceLanguage,
};
pub use capture::{CaptureEvent, CaptureHandle, CaptureSession};
pub use engine::{Engine, GenerateOptions};
pub use file_utils::unique_dump_path;
pub use generator::{generate, CodeGenerator, LevelFilter, OutputKind};
pub use resolver::DeclarationResolver;
pub use serialization::{dump_to_file, CallGraphSerializer};
pub use tokens::{
    token_generator_for, CallTarget, CppTokenGenerator, MainProlog, PythonTokenGenerator,
    Rendered, TokenGenerator,
};
pub use value::{CapturedValue, ClassRef, BUILTIN_MODULE, BUILTIN_MODULE_NAMES};
