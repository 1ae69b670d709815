// src/core/resolver.rs - Recursive declaration of captured values
use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;

use super::call_graph::{
    Declaration, LanguageObject, LanguageType, LiteralValue, ObjectId, ProgramExecution,
};
use super::value::CapturedValue;

/// Identity of a logical value within one capture session.
///
/// Instances are keyed by their host address: two live objects must never be
/// conflated, even if they render identically. Everything else (modules,
/// classes, primitives, id-substituted containers) is keyed by its rendered
/// text, so two temporally distinct but equal values collapse into one
/// declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdentityKey {
    Address(u64),
    Content(String),
}

/// Turns captured values into deduplicated, parent-linked LanguageObjects.
///
/// All structural bookkeeping lives here: the identity index, the id
/// allocator, and the recursion over container elements and structural
/// parents. The arena itself only checks registration invariants.
pub struct DeclarationResolver {
    seen: HashMap<IdentityKey, ObjectId>,
    next_object_id: ObjectId,
}

impl DeclarationResolver {
    pub fn new() -> Self {
        Self {
            seen: HashMap::new(),
            next_object_id: 1,
        }
    }

    /// Declare `value` (and, recursively, its container elements and its
    /// structural parents) in `execution`, returning the id of its
    /// LanguageObject. Values seen before resolve to their existing id.
    ///
    /// `is_callee` marks the receiver of a call being entered: an instance
    /// first seen as a callee is declared with constructor syntax rather
    /// than as a literal or placeholder.
    pub fn resolve(
        &mut self,
        execution: &mut ProgramExecution,
        value: &CapturedValue,
        is_callee: bool,
    ) -> Result<ObjectId> {
        // Container elements are declared first, so the container's literal
        // references already-registered ids.
        let (key, declaration) = match value {
            CapturedValue::Sequence(elements) => {
                let mut ids = Vec::with_capacity(elements.len());
                for element in elements {
                    ids.push(self.resolve(execution, element, false)?);
                }
                let text = format!(
                    "[{}]",
                    ids.iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                (
                    IdentityKey::Content(text),
                    Declaration::FixedValue(LiteralValue::Sequence(ids)),
                )
            }
            CapturedValue::Mapping(pairs) => {
                let mut id_pairs = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key_id = self.resolve(execution, key, false)?;
                    let value_id = self.resolve(execution, value, false)?;
                    id_pairs.push((key_id, value_id));
                }
                let text = format!(
                    "{{{}}}",
                    id_pairs
                        .iter()
                        .map(|(k, v)| format!("{k}: {v}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                (
                    IdentityKey::Content(text),
                    Declaration::FixedValue(LiteralValue::Mapping(id_pairs)),
                )
            }
            CapturedValue::Null => (
                IdentityKey::Content("None".to_string()),
                Declaration::FixedValue(LiteralValue::Null),
            ),
            CapturedValue::Bool(v) => (
                IdentityKey::Content(if *v { "True" } else { "False" }.to_string()),
                Declaration::FixedValue(LiteralValue::Bool(*v)),
            ),
            CapturedValue::Int(v) => (
                IdentityKey::Content(v.to_string()),
                Declaration::FixedValue(LiteralValue::Int(*v)),
            ),
            CapturedValue::Float(v) => (
                IdentityKey::Content(format!("{v:?}")),
                Declaration::FixedValue(LiteralValue::Float(*v)),
            ),
            CapturedValue::Str(v) => (
                IdentityKey::Content(format!("{v:?}")),
                Declaration::FixedValue(LiteralValue::Str(v.clone())),
            ),
            CapturedValue::Module { name } => (
                IdentityKey::Content(format!("<module {name}>")),
                Declaration::FixedValue(LiteralValue::Str(name.clone())),
            ),
            CapturedValue::Class(class) => (
                IdentityKey::Content(format!("<class {}>", class.qualified_name())),
                Declaration::FixedValue(LiteralValue::Str(class.qualified_name())),
            ),
            CapturedValue::Instance { class, address } => (
                IdentityKey::Address(*address),
                Declaration::Dummy {
                    class_hint: class.qualified_name(),
                },
            ),
            CapturedValue::Opaque {
                class_name,
                address,
            } => (
                IdentityKey::Address(*address),
                Declaration::Dummy {
                    class_hint: class_name.clone(),
                },
            ),
        };

        // At most one declaration per logical value per session.
        if let Some(&id) = self.seen.get(&key) {
            return Ok(id);
        }

        let language_type = value.language_type();
        let declaration = if is_callee && language_type == LanguageType::Instance {
            Declaration::Constructor
        } else {
            declaration
        };
        if let Declaration::Dummy { class_hint } = &declaration {
            debug!(class = %class_hint, "value has no literal form, declaring a dummy placeholder");
        }

        // Structural parent: Instance -> its Class, Class -> its Module,
        // Module -> none. Declared before the child so it holds the lower id.
        let parent_value = match value {
            CapturedValue::Module { .. } => None,
            CapturedValue::Class(class) => Some(CapturedValue::module(class.module.clone())),
            other => other.class_of().map(CapturedValue::Class),
        };
        let parent_id = match parent_value {
            Some(parent) => Some(self.resolve(execution, &parent, false)?),
            None => None,
        };

        let id = self.next_object_id;
        self.next_object_id += 1;
        let object = {
            let parent = match parent_id {
                Some(pid) => Some(execution.expect_object(pid)?),
                None => None,
            };
            LanguageObject::new(id, language_type, declaration, parent)?
        };
        execution.add_object(object)?;
        self.seen.insert(key, id);
        Ok(id)
    }
}

impl Default for DeclarationResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::SourceLanguage;
    use crate::core::value::ClassRef;

    fn setup() -> (ProgramExecution, DeclarationResolver) {
        (
            ProgramExecution::new(SourceLanguage::Python),
            DeclarationResolver::new(),
        )
    }

    #[test]
    fn primitive_declares_its_whole_parent_chain() {
        let (mut execution, mut resolver) = setup();
        let id = resolver
            .resolve(&mut execution, &CapturedValue::Int(5), false)
            .unwrap();

        // Module, class, instance - in that registration order.
        assert_eq!(id, 3);
        assert_eq!(execution.object_count(), 3);

        let instance = execution.expect_object(3).unwrap();
        assert_eq!(instance.language_type(), LanguageType::Instance);
        assert_eq!(
            instance.declaration(),
            &Declaration::FixedValue(LiteralValue::Int(5))
        );
        assert_eq!(instance.parent(), Some(2));

        let class = execution.expect_object(2).unwrap();
        assert_eq!(class.language_type(), LanguageType::Class);
        assert_eq!(class.parent(), Some(1));

        let module = execution.expect_object(1).unwrap();
        assert_eq!(module.language_type(), LanguageType::Module);
        assert_eq!(module.parent(), None);
    }

    #[test]
    fn equal_values_collapse_to_one_declaration() {
        let (mut execution, mut resolver) = setup();
        let first = resolver
            .resolve(&mut execution, &CapturedValue::Int(5), false)
            .unwrap();
        let second = resolver
            .resolve(&mut execution, &CapturedValue::Int(5), false)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(execution.object_count(), 3);

        // A different value shares the class and module objects.
        let third = resolver
            .resolve(&mut execution, &CapturedValue::Int(25), false)
            .unwrap();
        assert_ne!(third, first);
        assert_eq!(execution.object_count(), 4);
    }

    #[test]
    fn equal_text_different_type_stays_distinct() {
        let (mut execution, mut resolver) = setup();
        let number = resolver
            .resolve(&mut execution, &CapturedValue::Int(5), false)
            .unwrap();
        let string = resolver
            .resolve(&mut execution, &CapturedValue::from("5"), false)
            .unwrap();
        assert_ne!(number, string);
    }

    #[test]
    fn instances_are_keyed_by_address() {
        let (mut execution, mut resolver) = setup();
        let class = ClassRef::new("my_mod", "Widget");

        let a = resolver
            .resolve(
                &mut execution,
                &CapturedValue::instance(class.clone(), 0x1000),
                false,
            )
            .unwrap();
        let b = resolver
            .resolve(
                &mut execution,
                &CapturedValue::instance(class.clone(), 0x2000),
                false,
            )
            .unwrap();
        let a_again = resolver
            .resolve(
                &mut execution,
                &CapturedValue::instance(class, 0x1000),
                false,
            )
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }

    #[test]
    fn callee_instance_declares_as_constructor() {
        let (mut execution, mut resolver) = setup();
        let class = ClassRef::new("my_mod", "Widget");

        let callee = resolver
            .resolve(
                &mut execution,
                &CapturedValue::instance(class.clone(), 0x1000),
                true,
            )
            .unwrap();
        assert!(execution
            .expect_object(callee)
            .unwrap()
            .declaration()
            .is_constructor());

        // The same instance passed as an argument keeps its constructor
        // declaration: the identity index wins.
        let as_arg = resolver
            .resolve(
                &mut execution,
                &CapturedValue::instance(class.clone(), 0x1000),
                false,
            )
            .unwrap();
        assert_eq!(as_arg, callee);

        // A plain argument instance degrades to a dummy placeholder.
        let other = resolver
            .resolve(
                &mut execution,
                &CapturedValue::instance(class, 0x2000),
                false,
            )
            .unwrap();
        assert!(execution.expect_object(other).unwrap().declaration().is_dummy());
    }

    #[test]
    fn sequence_declares_elements_first() {
        let (mut execution, mut resolver) = setup();
        let list = CapturedValue::list(vec![CapturedValue::Int(1), CapturedValue::Int(2)]);
        let id = resolver.resolve(&mut execution, &list, false).unwrap();

        let object = execution.expect_object(id).unwrap();
        let element_ids = match object.declaration() {
            Declaration::FixedValue(LiteralValue::Sequence(ids)) => ids.clone(),
            other => panic!("expected sequence declaration, got {other:?}"),
        };
        assert_eq!(element_ids.len(), 2);
        for element_id in &element_ids {
            // Elements were registered before the container.
            assert!(*element_id < id);
            let element = execution.expect_object(*element_id).unwrap();
            assert_eq!(element.language_type(), LanguageType::Instance);
        }

        // Same contents, same declaration.
        let again = resolver
            .resolve(
                &mut execution,
                &CapturedValue::list(vec![CapturedValue::Int(1), CapturedValue::Int(2)]),
                false,
            )
            .unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn mapping_declares_keys_and_values() {
        let (mut execution, mut resolver) = setup();
        let dict = CapturedValue::dict(vec![
            (CapturedValue::from("x"), CapturedValue::Int(1)),
            (CapturedValue::from("y"), CapturedValue::Int(2)),
        ]);
        let id = resolver.resolve(&mut execution, &dict, false).unwrap();

        let object = execution.expect_object(id).unwrap();
        match object.declaration() {
            Declaration::FixedValue(LiteralValue::Mapping(pairs)) => {
                assert_eq!(pairs.len(), 2);
                for (key_id, value_id) in pairs {
                    assert!(execution.object(*key_id).is_some());
                    assert!(execution.object(*value_id).is_some());
                }
            }
            other => panic!("expected mapping declaration, got {other:?}"),
        }
    }
}
