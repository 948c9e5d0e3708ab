//! Class code generation.
//!
//! A class lowers to its constructor function plus a series of
//! `Object.defineProperty` calls installing the members. Derived classes
//! link both the constructor and the prototype to the parent:
//!
//! ```text
//! C.__proto__ = Parent
//! C.prototype = Object.create(Parent.prototype)
//! C.prototype.constructor = C        ; non-enumerable
//! ```

use super::{ByteCodeGenerateContext, ChildBody};
use crate::ast::*;
use crate::compiler::bytecode::{Instruction, RegisterIndex};
use crate::compiler::code_block::CodeBlockId;
use crate::compiler::scope_analysis::method_key_name;
use crate::error::Error;
use crate::runtime::value::Value;

impl ByteCodeGenerateContext<'_, '_> {
    /// Generates `class` and leaves its constructor in `dst`.
    pub(crate) fn generate_class(&mut self, class: &ClassExpression, dst: RegisterIndex) -> Result<(), Error> {
        let parent = self.get_register();
        if let Some(heritage) = &class.super_class {
            self.generate_expression(heritage, parent)?;
        }

        // Scope analysis created one child block per member, in this order.
        let members = class.members_with_constructor();
        let ids: Vec<CodeBlockId> = members
            .iter()
            .map(|_| self.next_function_expression_child())
            .collect();
        let Some(constructor) = members.iter().position(|m| m.kind == MethodKind::Constructor) else {
            return Err(Error::InternalError("class without a constructor".to_string()));
        };

        self.emit(Instruction::CreateFunction {
            dst,
            code_block: ids[constructor],
        });
        self.generate_child(ids[constructor], ChildBody::Statements(&members[constructor].value.body))?;

        let prototype = self.get_register();
        if class.super_class.is_some() {
            if class.extends_null() {
                self.emit_literal(prototype, Value::Null);
            } else {
                self.emit(Instruction::SetObjectPreComputedCase {
                    object: dst,
                    name: "__proto__".to_string(),
                    value: parent,
                });
                self.emit_get_named(parent, "prototype", prototype);
            }
            self.emit_object_create(prototype, prototype);
            self.emit(Instruction::SetObjectPreComputedCase {
                object: dst,
                name: "prototype".to_string(),
                value: prototype,
            });
            self.emit_define_hidden_property(prototype, "constructor", dst);
        } else {
            self.emit_get_named(dst, "prototype", prototype);
        }

        for (member, id) in members.iter().zip(ids.iter().copied()) {
            if member.kind == MethodKind::Constructor {
                continue;
            }
            let target = if member.is_static { dst } else { prototype };
            let key = method_key_name(&member.key)?;
            let function = self.get_register();
            self.emit(Instruction::CreateFunction { dst: function, code_block: id });
            self.generate_child(id, ChildBody::Statements(&member.value.body))?;
            match member.kind {
                MethodKind::Method => self.emit_define_hidden_property(target, &key, function),
                MethodKind::Get | MethodKind::Set => {
                    let property = self.get_register();
                    self.emit_string(property, &key);
                    self.emit(if member.kind == MethodKind::Get {
                        Instruction::ObjectDefineGetter {
                            object: target,
                            property,
                            getter: function,
                        }
                    } else {
                        Instruction::ObjectDefineSetter {
                            object: target,
                            property,
                            setter: function,
                        }
                    });
                    self.give_up_register();
                }
                MethodKind::Constructor => unreachable!(),
            }
            self.give_up_register();
        }

        self.give_up_register();
        self.give_up_register();
        Ok(())
    }

    /// `dst = Object.create(prototype)`
    fn emit_object_create(&mut self, prototype: RegisterIndex, dst: RegisterIndex) {
        let object = self.get_register();
        let create = self.get_register();
        let argument = self.get_register();
        self.emit(Instruction::GetGlobalObject {
            dst: object,
            name: "Object".to_string(),
        });
        self.emit_get_named(object, "create", create);
        self.emit(Instruction::Move {
            src: prototype,
            dst: argument,
        });
        self.emit(Instruction::CallFunctionWithReceiver {
            receiver: object,
            callee: create,
            args_start: argument,
            argc: 1,
            dst,
            spread: None,
        });
        self.give_up_register();
        self.give_up_register();
        self.give_up_register();
    }

    /// Installs a writable, configurable, non-enumerable data property:
    ///
    /// ```text
    /// Object.defineProperty(target, name, {
    ///     value, writable: true, enumerable: false, configurable: true
    /// })
    /// ```
    fn emit_define_hidden_property(&mut self, target: RegisterIndex, name: &str, value: RegisterIndex) {
        let object = self.get_register();
        let define = self.get_register();
        self.emit(Instruction::GetGlobalObject {
            dst: object,
            name: "Object".to_string(),
        });
        self.emit_get_named(object, "defineProperty", define);

        let args = self.get_register();
        let key = self.get_register();
        let descriptor = self.get_register();
        self.emit(Instruction::Move { src: target, dst: args });
        self.emit_string(key, name);
        self.emit(Instruction::CreateObject { dst: descriptor });

        let field = self.get_register();
        let field_value = self.get_register();
        let fields = [
            ("value", None),
            ("writable", Some(true)),
            ("enumerable", Some(false)),
            ("configurable", Some(true)),
        ];
        for (field_name, flag) in fields {
            self.emit_string(field, field_name);
            let src = match flag {
                Some(flag) => {
                    self.emit_literal(field_value, Value::Boolean(flag));
                    field_value
                }
                None => value,
            };
            self.emit(Instruction::ObjectDefineOwnProperty {
                object: descriptor,
                property: field,
                value: src,
            });
        }
        self.give_up_register();
        self.give_up_register();

        self.emit(Instruction::CallFunctionWithReceiver {
            receiver: object,
            callee: define,
            args_start: args,
            argc: 3,
            dst: args,
            spread: None,
        });
        for _ in 0..5 {
            self.give_up_register();
        }
    }
}
