// src/core/serialization.rs - JSON persistence for a captured call graph
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TracewrightError};

use super::file_utils::unique_dump_path;

use super::call_graph::{
    Argument, Declaration, FunctionCall, LanguageObject, LanguageType, LiteralValue, MethodKind,
    PassingMode, ProgramExecution, SourceLanguage,
};

#[derive(Debug, Serialize, Deserialize)]
struct LanguageTypeEntry {
    id: u8,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectRecord {
    id: u64,
    #[serde(rename = "languageTypeId")]
    language_type_id: u8,
    #[serde(rename = "declarationType")]
    declaration_type: String,
    #[serde(rename = "declarationCode")]
    declaration_code: Value,
    #[serde(rename = "parentId", skip_serializing_if = "Option::is_none", default)]
    parent_id: Option<u64>,
}

/// One serialized argument. Python-style graphs store a bare object id;
/// C-like graphs store the id plus passing mode and constness.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ArgEntry {
    Plain(u64),
    CLike {
        id: u64,
        #[serde(rename = "argType")]
        arg_type: u8,
        #[serde(rename = "isConst")]
        is_const: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ArgumentsRecord {
    args: Vec<ArgEntry>,
    /// Keyword arguments, name -> object id. Canonicalized to name order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    kargs: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CallRecord {
    id: u64,
    #[serde(rename = "calleeId")]
    callee_id: u64,
    #[serde(rename = "funcName")]
    func_name: String,
    #[serde(rename = "methodType")]
    method_type: String,
    level: u32,
    #[serde(
        rename = "returnedObject",
        skip_serializing_if = "Option::is_none",
        default
    )]
    returned_object: Option<u64>,
    #[serde(rename = "threwException")]
    threw_exception: bool,
    #[serde(rename = "totalTime", skip_serializing_if = "Option::is_none", default)]
    total_time: Option<f64>,
    arguments: ArgumentsRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExecutionDocument {
    language: String,
    #[serde(rename = "languageTypes")]
    language_types: Vec<LanguageTypeEntry>,
    #[serde(rename = "languageObjects")]
    language_objects: Vec<ObjectRecord>,
    #[serde(rename = "callGraph")]
    call_graph: Vec<CallRecord>,
}

/// Bidirectional codec between a ProgramExecution and its persisted JSON
/// document. Capture and generation are separate processes; this is the
/// contract between them.
pub struct CallGraphSerializer;

impl CallGraphSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Dump an execution as pretty-printed JSON.
    pub fn dump<W: Write>(&self, execution: &ProgramExecution, writer: W) -> Result<()> {
        let document = self.to_document(execution)?;
        serde_json::to_writer_pretty(writer, &document)?;
        Ok(())
    }

    pub fn dump_to_string(&self, execution: &ProgramExecution) -> Result<String> {
        let document = self.to_document(execution)?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Load an execution, verifying the format along the way. Objects are
    /// rebuilt in document order, so parents must appear before children;
    /// every id a call references must resolve against the rebuilt store.
    pub fn load<R: Read>(&self, reader: R) -> Result<ProgramExecution> {
        let document: ExecutionDocument = serde_json::from_reader(reader)?;
        self.from_document(document)
    }

    pub fn load_from_str(&self, text: &str) -> Result<ProgramExecution> {
        let document: ExecutionDocument = serde_json::from_str(text)?;
        self.from_document(document)
    }

    fn to_document(&self, execution: &ProgramExecution) -> Result<ExecutionDocument> {
        let language = execution.language();

        let language_types = execution
            .language_type_table()
            .iter()
            .map(|&(id, name)| LanguageTypeEntry {
                id,
                name: name.to_string(),
            })
            .collect();

        let language_objects = execution
            .objects()
            .map(|object| ObjectRecord {
                id: object.id(),
                language_type_id: object.language_type().rank(),
                declaration_type: object.declaration().kind_str().to_string(),
                declaration_code: declaration_code(object.declaration()),
                parent_id: object.parent(),
            })
            .collect();

        let call_graph = execution
            .calls()
            .iter()
            .map(|call| self.call_record(call, language))
            .collect();

        Ok(ExecutionDocument {
            language: language.as_str().to_string(),
            language_types,
            language_objects,
            call_graph,
        })
    }

    fn call_record(&self, call: &FunctionCall, language: SourceLanguage) -> CallRecord {
        let mut args = Vec::new();
        let mut kargs = BTreeMap::new();
        for argument in call.arguments() {
            if language.is_c_like() {
                args.push(ArgEntry::CLike {
                    id: argument.object(),
                    arg_type: argument.passing().as_u8(),
                    is_const: argument.is_const(),
                });
            } else {
                match argument.name() {
                    None => args.push(ArgEntry::Plain(argument.object())),
                    Some(name) => {
                        kargs.insert(name.to_string(), argument.object());
                    }
                }
            }
        }

        CallRecord {
            id: call.id(),
            callee_id: call.callee(),
            func_name: call.function_name().to_string(),
            method_type: call.method_kind().as_str().to_string(),
            level: call.level(),
            returned_object: call.returned_object(),
            threw_exception: call.threw_exception(),
            total_time: call.total_time(),
            arguments: ArgumentsRecord { args, kargs },
        }
    }

    fn from_document(&self, document: ExecutionDocument) -> Result<ProgramExecution> {
        let language = SourceLanguage::parse(&document.language).ok_or_else(|| {
            TracewrightError::LoadFormat(format!("unknown language '{}'", document.language))
        })?;
        let mut execution = ProgramExecution::new(language);

        self.verify_language_types(&execution, &document.language_types)?;

        for record in document.language_objects {
            let language_type = language_type_from_rank(record.language_type_id)?;
            let declaration = declaration_from_record(
                &record.declaration_type,
                record.declaration_code,
            )?;
            let object = {
                let parent = match record.parent_id {
                    Some(parent_id) => Some(execution.expect_object(parent_id)?),
                    None => None,
                };
                LanguageObject::new(record.id, language_type, declaration, parent)?
            };
            execution.add_object(object)?;
        }

        for record in document.call_graph {
            execution.expect_object(record.callee_id)?;
            if let Some(returned) = record.returned_object {
                execution.expect_object(returned)?;
            }
            let method_kind = MethodKind::parse(&record.method_type).ok_or_else(|| {
                TracewrightError::LoadFormat(format!(
                    "unknown method type '{}'",
                    record.method_type
                ))
            })?;

            let mut arguments = Vec::new();
            for entry in record.arguments.args {
                let argument = match entry {
                    ArgEntry::Plain(id) => {
                        execution.expect_object(id)?;
                        Argument::positional(id)
                    }
                    ArgEntry::CLike {
                        id,
                        arg_type,
                        is_const,
                    } => {
                        execution.expect_object(id)?;
                        let passing = PassingMode::from_u8(arg_type).ok_or_else(|| {
                            TracewrightError::LoadFormat(format!(
                                "unknown passing mode {arg_type}"
                            ))
                        })?;
                        Argument::with_passing(id, passing, is_const)
                    }
                };
                arguments.push(argument);
            }
            for (name, id) in record.arguments.kargs {
                execution.expect_object(id)?;
                arguments.push(Argument::named(id, name));
            }

            execution.add_call(FunctionCall::completed(
                record.id,
                record.callee_id,
                record.func_name,
                method_kind,
                arguments,
                record.level,
                record.returned_object,
                record.threw_exception,
                record.total_time,
            ));
        }

        Ok(execution)
    }

    fn verify_language_types(
        &self,
        execution: &ProgramExecution,
        entries: &[LanguageTypeEntry],
    ) -> Result<()> {
        let expected = execution.language_type_table();
        if entries.len() != expected.len() {
            return Err(TracewrightError::LoadFormat(format!(
                "expected {} LanguageType entries, found {}",
                expected.len(),
                entries.len()
            )));
        }
        for &(id, name) in &expected {
            let found = entries.iter().find(|entry| entry.id == id).ok_or_else(|| {
                TracewrightError::LoadFormat(format!("missing LanguageType id {id}"))
            })?;
            if found.name != name {
                return Err(TracewrightError::LoadFormat(format!(
                    "invalid LanguageType pair. Id: {id}, name: '{}'",
                    found.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for CallGraphSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Persist an execution to `path`. With `preserve_old` set, an existing
/// dump is never overwritten: the name gets an incrementing "(N)" index and
/// the path actually written is returned.
pub fn dump_to_file(
    execution: &ProgramExecution,
    path: &Path,
    preserve_old: bool,
) -> Result<PathBuf> {
    let target = if preserve_old {
        unique_dump_path(path)
    } else {
        path.to_path_buf()
    };
    let file = File::create(&target)?;
    CallGraphSerializer::new().dump(execution, file)?;
    Ok(target)
}

fn language_type_from_rank(rank: u8) -> Result<LanguageType> {
    match rank {
        1 => Ok(LanguageType::Module),
        2 => Ok(LanguageType::Class),
        3 => Ok(LanguageType::Instance),
        other => Err(TracewrightError::LoadFormat(format!(
            "invalid languageTypeId {other}"
        ))),
    }
}

/// Embed a declaration payload as a JSON literal. Mapping payloads become a
/// JSON object keyed by the decimal key id; the loader converts the keys
/// back to numbers, so ids survive the string-keys-only rule of JSON
/// objects.
fn declaration_code(declaration: &Declaration) -> Value {
    match declaration {
        Declaration::Constructor => Value::Null,
        Declaration::Dummy { class_hint } => Value::String(class_hint.clone()),
        Declaration::FixedValue(literal) => match literal {
            LiteralValue::Null => Value::Null,
            LiteralValue::Bool(v) => Value::Bool(*v),
            LiteralValue::Int(v) => Value::from(*v),
            LiteralValue::Float(v) => Value::from(*v),
            LiteralValue::Str(v) => Value::String(v.clone()),
            LiteralValue::Sequence(ids) => {
                Value::Array(ids.iter().map(|&id| Value::from(id)).collect())
            }
            LiteralValue::Mapping(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|&(key, value)| (key.to_string(), Value::from(value)))
                    .collect(),
            ),
        },
    }
}

fn declaration_from_record(declaration_type: &str, code: Value) -> Result<Declaration> {
    match declaration_type {
        "CONSTRUCTOR" => Ok(Declaration::Constructor),
        "DUMMY" => match code {
            Value::String(class_hint) => Ok(Declaration::Dummy { class_hint }),
            other => Err(TracewrightError::LoadFormat(format!(
                "DUMMY declarationCode must be a string, found {other}"
            ))),
        },
        "FIXED_VALUE" => Ok(Declaration::FixedValue(literal_from_value(code)?)),
        other => Err(TracewrightError::LoadFormat(format!(
            "unknown declarationType '{other}'"
        ))),
    }
}

fn literal_from_value(code: Value) -> Result<LiteralValue> {
    let literal = match code {
        Value::Null => LiteralValue::Null,
        Value::Bool(v) => LiteralValue::Bool(v),
        Value::Number(number) => match number.as_i64() {
            Some(v) => LiteralValue::Int(v),
            None => LiteralValue::Float(number.as_f64().ok_or_else(|| {
                TracewrightError::LoadFormat(format!("unrepresentable number {number}"))
            })?),
        },
        Value::String(v) => LiteralValue::Str(v),
        Value::Array(elements) => {
            let mut ids = Vec::with_capacity(elements.len());
            for element in elements {
                ids.push(element.as_u64().ok_or_else(|| {
                    TracewrightError::LoadFormat(format!(
                        "sequence declarationCode must hold object ids, found {element}"
                    ))
                })?);
            }
            LiteralValue::Sequence(ids)
        }
        Value::Object(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let key_id = key.parse::<u64>().map_err(|_| {
                    TracewrightError::LoadFormat(format!(
                        "mapping declarationCode key '{key}' is not an object id"
                    ))
                })?;
                let value_id = value.as_u64().ok_or_else(|| {
                    TracewrightError::LoadFormat(format!(
                        "mapping declarationCode value {value} is not an object id"
                    ))
                })?;
                pairs.push((key_id, value_id));
            }
            LiteralValue::Mapping(pairs)
        }
    };
    Ok(literal)
}
