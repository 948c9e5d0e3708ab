//! The realm: heap, intrinsics and the object internal methods.
//!
//! Every fundamental object operation enters here. Ordinary objects are
//! handled inline; proxies anywhere along the way (the object itself or a
//! prototype reached during lookup) are handed to [`super::proxy`], which
//! calls back into the realm for the target.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use tracing::debug;

use super::environment::{EnvRef, Environment};
use super::function::FunctionObject;
use super::object::{Heap, JsObject, ObjectKind, ObjectRef};
use super::property::{PartialDescriptor, PropertyDescriptor, PropertyKey};
use super::proxy::{self, ProxyObject};
use super::value::{Value, string_to_number};
use crate::SourceParser;
use crate::builtins;
use crate::compiler::Compiler;
use crate::compiler::code_block::NativeCodeBlock;
use crate::config::EngineConfig;
use crate::error::{Error, JsResult};

/// Objects every realm starts with.
#[derive(Debug, Clone)]
pub struct Intrinsics {
    /// `Object.prototype`
    pub object_prototype: ObjectRef,
    /// `Function.prototype`
    pub function_prototype: ObjectRef,
    /// `Array.prototype`
    pub array_prototype: ObjectRef,
    /// `%ArrayIteratorPrototype%`
    pub array_iterator_prototype: ObjectRef,
    /// `Error.prototype`
    pub error_prototype: ObjectRef,
    /// `TypeError.prototype`
    pub type_error_prototype: ObjectRef,
    /// `RangeError.prototype`
    pub range_error_prototype: ObjectRef,
    /// `SyntaxError.prototype`
    pub syntax_error_prototype: ObjectRef,
    /// `ReferenceError.prototype`
    pub reference_error_prototype: ObjectRef,
    /// The global object
    pub global_object: ObjectRef,
    /// The `eval` function, recognised by direct eval calls
    pub eval: Option<ObjectRef>,
    /// The `Proxy` constructor, absent when disabled by configuration
    pub proxy: Option<ObjectRef>,
}

/// A realm owns every object a script can reach plus the global scope.
pub struct Realm {
    /// Object storage
    pub heap: Heap,
    /// Builtin objects
    pub intrinsics: Intrinsics,
    /// Engine settings
    pub config: EngineConfig,
    pub(crate) global_env: EnvRef,
    pub(crate) compiler: Compiler,
    pub(crate) source_parser: Option<Rc<dyn SourceParser>>,
    pub(crate) call_depth: usize,
    /// Address of a local in the outermost active call, used to measure native stack use.
    pub(crate) native_stack_base: usize,
}

impl Realm {
    /// Creates a realm with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates a realm and installs the builtins.
    pub fn with_config(config: EngineConfig) -> Self {
        let mut heap = Heap::new();
        let object_prototype = heap.alloc(JsObject::new(ObjectKind::Ordinary, None));
        let empty = NativeCodeBlock::new("", 0, false, Rc::new(|_, _, _, _| Ok(Value::Undefined)));
        let function_prototype = heap.alloc(JsObject::new(
            ObjectKind::Function(FunctionObject::native(empty)),
            Some(object_prototype),
        ));
        let array_prototype = heap.alloc(JsObject::new(ObjectKind::Array, Some(object_prototype)));
        heap.get_mut(array_prototype).insert(
            "length".into(),
            PropertyDescriptor::data_with(Value::Number(0.0), true, false, false),
        );
        let array_iterator_prototype = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(object_prototype)));
        let error_prototype = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(object_prototype)));
        let mut native_error = || heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(error_prototype)));
        let type_error_prototype = native_error();
        let range_error_prototype = native_error();
        let syntax_error_prototype = native_error();
        let reference_error_prototype = native_error();
        let global_object = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(object_prototype)));

        let mut realm = Self {
            heap,
            intrinsics: Intrinsics {
                object_prototype,
                function_prototype,
                array_prototype,
                array_iterator_prototype,
                error_prototype,
                type_error_prototype,
                range_error_prototype,
                syntax_error_prototype,
                reference_error_prototype,
                global_object,
                eval: None,
                proxy: None,
            },
            compiler: Compiler::new(&config),
            config,
            global_env: Environment::new_global(global_object),
            source_parser: None,
            call_depth: 0,
            native_stack_base: 0,
        };
        builtins::install(&mut realm);
        debug!(objects = realm.heap.len(), "realm initialized");
        realm
    }

    /// The global object.
    pub fn global_object(&self) -> ObjectRef {
        self.intrinsics.global_object
    }

    /// The outermost environment.
    pub fn global_env(&self) -> EnvRef {
        self.global_env.clone()
    }

    /// Installs the parser used for string arguments to direct `eval`.
    pub fn set_source_parser(&mut self, parser: Rc<dyn SourceParser>) {
        self.source_parser = Some(parser);
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// A plain object inheriting from `Object.prototype`.
    pub fn new_object(&mut self) -> ObjectRef {
        self.new_object_with_prototype(Some(self.intrinsics.object_prototype))
    }

    /// A plain object with the given prototype.
    pub fn new_object_with_prototype(&mut self, prototype: Option<ObjectRef>) -> ObjectRef {
        self.heap.alloc(JsObject::new(ObjectKind::Ordinary, prototype))
    }

    /// An array holding `values`.
    pub fn new_array(&mut self, values: Vec<Value>) -> ObjectRef {
        let array = self
            .heap
            .alloc(JsObject::new(ObjectKind::Array, Some(self.intrinsics.array_prototype)));
        let object = self.heap.get_mut(array);
        object.insert(
            "length".into(),
            PropertyDescriptor::data_with(Value::Number(values.len() as f64), true, false, false),
        );
        for (index, value) in values.into_iter().enumerate() {
            object.insert(PropertyKey::from(index as u32), PropertyDescriptor::data(value));
        }
        array
    }

    /// An arguments object: a snapshot of the call's arguments.
    pub fn new_arguments_object(&mut self, args: &[Value]) -> ObjectRef {
        let arguments = self
            .heap
            .alloc(JsObject::new(ObjectKind::Arguments, Some(self.intrinsics.object_prototype)));
        let object = self.heap.get_mut(arguments);
        for (index, value) in args.iter().enumerate() {
            object.insert(PropertyKey::from(index as u32), PropertyDescriptor::data(value.clone()));
        }
        object.insert(
            "length".into(),
            PropertyDescriptor::hidden(Value::Number(args.len() as f64)),
        );
        arguments
    }

    /// Wraps a function object, giving it `length` and `name`.
    pub fn new_function_object(&mut self, function: FunctionObject) -> ObjectRef {
        let length = function.parameter_count() as f64;
        let name = function.name().to_string();
        let object = self.heap.alloc(JsObject::new(
            ObjectKind::Function(function),
            Some(self.intrinsics.function_prototype),
        ));
        let f = self.heap.get_mut(object);
        f.insert(
            "length".into(),
            PropertyDescriptor::data_with(Value::Number(length), false, false, true),
        );
        f.insert(
            "name".into(),
            PropertyDescriptor::data_with(Value::String(name), false, false, true),
        );
        object
    }

    /// A host function that cannot be used with `new`.
    pub fn new_native_function<F>(&mut self, name: &str, length: usize, f: F) -> ObjectRef
    where
        F: Fn(&mut Realm, &Value, &[Value], bool) -> JsResult<Value> + 'static,
    {
        let code = NativeCodeBlock::new(name, length, false, Rc::new(f));
        self.new_function_object(FunctionObject::native(code))
    }

    /// A host constructor linked to `prototype` through `prototype` and
    /// `prototype.constructor`.
    pub fn new_native_constructor<F>(&mut self, name: &str, length: usize, prototype: ObjectRef, f: F) -> ObjectRef
    where
        F: Fn(&mut Realm, &Value, &[Value], bool) -> JsResult<Value> + 'static,
    {
        let code = NativeCodeBlock::new(name, length, true, Rc::new(f));
        let constructor = self.new_function_object(FunctionObject::native(code));
        self.heap.get_mut(constructor).insert(
            "prototype".into(),
            PropertyDescriptor::data_with(Value::Object(prototype), false, false, false),
        );
        self.define_builtin(prototype, "constructor", Value::Object(constructor));
        constructor
    }

    /// A proxy over `target` with `handler`. Inherits nothing.
    pub fn new_proxy(&mut self, target: ObjectRef, handler: ObjectRef) -> ObjectRef {
        self.heap.alloc(JsObject::new(
            ObjectKind::Proxy(ProxyObject::new(target, handler)),
            None,
        ))
    }

    /// An error instance of the named native error type.
    pub fn new_error(&mut self, name: &str, message: &str) -> ObjectRef {
        let prototype = self.error_prototype(name);
        let error = self.heap.alloc(JsObject::new(ObjectKind::Error, Some(prototype)));
        if !message.is_empty() {
            self.define_builtin(error, "message", Value::String(message.to_string()));
        }
        error
    }

    /// The prototype for instances of the named native error type.
    pub fn error_prototype(&self, name: &str) -> ObjectRef {
        match name {
            "TypeError" => self.intrinsics.type_error_prototype,
            "RangeError" => self.intrinsics.range_error_prototype,
            "SyntaxError" => self.intrinsics.syntax_error_prototype,
            "ReferenceError" => self.intrinsics.reference_error_prototype,
            _ => self.intrinsics.error_prototype,
        }
    }

    /// Installs a non-enumerable data property without going through any traps.
    pub fn define_builtin(&mut self, object: ObjectRef, name: &str, value: Value) {
        self.heap
            .get_mut(object)
            .insert(name.into(), PropertyDescriptor::hidden(value));
    }

    /// Installs a host method on `object`.
    pub fn define_builtin_function<F>(&mut self, object: ObjectRef, name: &str, length: usize, f: F) -> ObjectRef
    where
        F: Fn(&mut Realm, &Value, &[Value], bool) -> JsResult<Value> + 'static,
    {
        let function = self.new_native_function(name, length, f);
        self.define_builtin(object, name, Value::Object(function));
        function
    }

    // ========================================================================
    // Internal methods
    // ========================================================================

    fn is_proxy(&self, obj: ObjectRef) -> bool {
        self.heap.get(obj).is_proxy()
    }

    fn prototype_chain_too_deep() -> Error {
        Error::RangeError("Maximum prototype chain depth exceeded".to_string())
    }

    /// `[[GetPrototypeOf]]`
    pub fn get_prototype_of(&mut self, obj: ObjectRef) -> JsResult<Option<ObjectRef>> {
        if self.is_proxy(obj) {
            return proxy::get_prototype_of(self, obj);
        }
        Ok(self.heap.get(obj).prototype)
    }

    /// `[[SetPrototypeOf]]`
    pub fn set_prototype_of(&mut self, obj: ObjectRef, prototype: Option<ObjectRef>) -> JsResult<bool> {
        if self.is_proxy(obj) {
            return proxy::set_prototype_of(self, obj, prototype);
        }
        let object = self.heap.get(obj);
        if object.prototype == prototype {
            return Ok(true);
        }
        if !object.extensible {
            return Ok(false);
        }
        let mut current = prototype;
        while let Some(p) = current {
            if p == obj {
                return Ok(false);
            }
            if self.is_proxy(p) {
                break;
            }
            current = self.heap.get(p).prototype;
        }
        self.heap.get_mut(obj).prototype = prototype;
        Ok(true)
    }

    /// `[[IsExtensible]]`
    pub fn is_extensible(&mut self, obj: ObjectRef) -> JsResult<bool> {
        if self.is_proxy(obj) {
            return proxy::is_extensible(self, obj);
        }
        Ok(self.heap.get(obj).extensible)
    }

    /// `[[PreventExtensions]]`
    pub fn prevent_extensions(&mut self, obj: ObjectRef) -> JsResult<bool> {
        if self.is_proxy(obj) {
            return proxy::prevent_extensions(self, obj);
        }
        self.heap.get_mut(obj).extensible = false;
        Ok(true)
    }

    /// `[[GetOwnProperty]]`
    pub fn get_own_property(&mut self, obj: ObjectRef, key: &PropertyKey) -> JsResult<Option<PropertyDescriptor>> {
        if self.is_proxy(obj) {
            return proxy::get_own_property(self, obj, key);
        }
        Ok(self.heap.get(obj).get_own(key).cloned())
    }

    /// `[[DefineOwnProperty]]`. Returns false when the definition is rejected.
    pub fn define_own_property(&mut self, obj: ObjectRef, key: PropertyKey, desc: PartialDescriptor) -> JsResult<bool> {
        if self.is_proxy(obj) {
            return proxy::define_own_property(self, obj, key, desc);
        }
        let is_array = matches!(self.heap.get(obj).kind, ObjectKind::Array);
        if is_array && key.as_str() == Some("length") {
            return self.define_array_length(obj, desc);
        }

        let object = self.heap.get(obj);
        let current = object.get_own(&key).cloned();
        let complete = desc.complete(current.as_ref());
        if !PropertyDescriptor::is_compatible(object.extensible, &complete, current.as_ref()) {
            return Ok(false);
        }

        if is_array {
            if let Some(index) = key.as_array_index() {
                let (length, length_writable) = self.array_length(obj);
                if index >= length {
                    if !length_writable {
                        return Ok(false);
                    }
                    self.heap.get_mut(obj).insert(
                        "length".into(),
                        PropertyDescriptor::data_with(Value::Number(index as f64 + 1.0), true, false, false),
                    );
                }
            }
        }
        self.heap.get_mut(obj).insert(key, complete);
        Ok(true)
    }

    fn array_length(&self, array: ObjectRef) -> (u32, bool) {
        match self.heap.get(array).get_own(&"length".into()) {
            Some(PropertyDescriptor::Data { value, writable, .. }) => (value.to_uint32(), *writable),
            _ => (0, true),
        }
    }

    fn define_array_length(&mut self, array: ObjectRef, desc: PartialDescriptor) -> JsResult<bool> {
        let (old_length, writable) = self.array_length(array);
        let new_length = match &desc.value {
            Some(value) => {
                let number = self.to_number(value)?;
                let length = value.to_uint32();
                if length as f64 != number {
                    return Err(Error::RangeError("Invalid array length".to_string()));
                }
                length
            }
            None => old_length,
        };
        if desc.is_accessor() || desc.configurable == Some(true) || desc.enumerable == Some(true) {
            return Ok(false);
        }
        if new_length != old_length && !writable {
            return Ok(false);
        }
        if new_length < old_length {
            let doomed: Vec<PropertyKey> = self
                .heap
                .get(array)
                .keys()
                .filter(|k| k.as_array_index().is_some_and(|i| i >= new_length))
                .cloned()
                .collect();
            let object = self.heap.get_mut(array);
            for key in doomed {
                object.remove(&key);
            }
        }
        let writable = desc.writable.unwrap_or(writable);
        self.heap.get_mut(array).insert(
            "length".into(),
            PropertyDescriptor::data_with(Value::Number(new_length as f64), writable, false, false),
        );
        Ok(true)
    }

    /// `[[HasProperty]]`
    pub fn has_property(&mut self, obj: ObjectRef, key: &PropertyKey) -> JsResult<bool> {
        let mut current = obj;
        for _ in 0..self.config.max_prototype_chain_depth {
            if self.is_proxy(current) {
                return proxy::has(self, current, key);
            }
            let object = self.heap.get(current);
            if object.get_own(key).is_some() {
                return Ok(true);
            }
            match object.prototype {
                Some(prototype) => current = prototype,
                None => return Ok(false),
            }
        }
        Err(Self::prototype_chain_too_deep())
    }

    /// `[[Delete]]`
    pub fn delete(&mut self, obj: ObjectRef, key: &PropertyKey) -> JsResult<bool> {
        if self.is_proxy(obj) {
            return proxy::delete(self, obj, key);
        }
        let object = self.heap.get_mut(obj);
        match object.get_own(key) {
            None => Ok(true),
            Some(desc) if desc.is_configurable() => {
                object.remove(key);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// `[[Get]]`
    pub fn get(&mut self, obj: ObjectRef, key: &PropertyKey, receiver: &Value) -> JsResult<Value> {
        let mut current = obj;
        for _ in 0..self.config.max_prototype_chain_depth {
            if self.is_proxy(current) {
                return proxy::get(self, current, key, receiver);
            }
            let object = self.heap.get(current);
            let getter = match object.get_own(key) {
                Some(PropertyDescriptor::Data { value, .. }) => return Ok(value.clone()),
                Some(PropertyDescriptor::Accessor { get, .. }) => *get,
                None => match object.prototype {
                    Some(prototype) => {
                        current = prototype;
                        continue;
                    }
                    None => return Ok(Value::Undefined),
                },
            };
            return match getter {
                Some(getter) => self.call(&Value::Object(getter), receiver, &[]),
                None => Ok(Value::Undefined),
            };
        }
        Err(Self::prototype_chain_too_deep())
    }

    /// `[[Set]]`. Returns false when the assignment is rejected.
    pub fn set(&mut self, obj: ObjectRef, key: PropertyKey, value: Value, receiver: &Value) -> JsResult<bool> {
        let mut current = obj;
        let mut found = None;
        for _ in 0..self.config.max_prototype_chain_depth {
            if self.is_proxy(current) {
                return proxy::set(self, current, key, value, receiver);
            }
            let object = self.heap.get(current);
            if let Some(desc) = object.get_own(&key) {
                found = Some(desc.clone());
                break;
            }
            match object.prototype {
                Some(prototype) => current = prototype,
                None => {
                    found = Some(PropertyDescriptor::data(Value::Undefined));
                    break;
                }
            }
        }
        let Some(desc) = found else {
            return Err(Self::prototype_chain_too_deep());
        };

        match desc {
            PropertyDescriptor::Data { writable: false, .. } => Ok(false),
            PropertyDescriptor::Data { .. } => {
                let Some(receiver) = receiver.as_object() else {
                    return Ok(false);
                };
                match self.get_own_property(receiver, &key)? {
                    Some(PropertyDescriptor::Data { writable: true, .. }) => {
                        let update = PartialDescriptor {
                            value: Some(value),
                            ..Default::default()
                        };
                        self.define_own_property(receiver, key, update)
                    }
                    Some(_) => Ok(false),
                    None => self.create_data_property(receiver, key, value),
                }
            }
            PropertyDescriptor::Accessor { set: Some(setter), .. } => {
                self.call(&Value::Object(setter), receiver, &[value])?;
                Ok(true)
            }
            PropertyDescriptor::Accessor { set: None, .. } => Ok(false),
        }
    }

    /// CreateDataProperty: a writable, enumerable, configurable own property.
    pub fn create_data_property(&mut self, obj: ObjectRef, key: PropertyKey, value: Value) -> JsResult<bool> {
        self.define_own_property(obj, key, PropertyDescriptor::data(value).into())
    }

    /// Own property keys in insertion order. A proxy reports its target's keys.
    pub fn own_property_keys(&mut self, obj: ObjectRef) -> JsResult<Vec<PropertyKey>> {
        if self.is_proxy(obj) {
            return proxy::enumerate(self, obj);
        }
        Ok(self.heap.get(obj).keys().cloned().collect())
    }

    /// Keys visited by `for-in`: enumerable string keys along the prototype
    /// chain, shadowed keys reported once.
    pub fn enumerate(&mut self, obj: ObjectRef) -> JsResult<Vec<PropertyKey>> {
        let mut seen = FxHashSet::default();
        let mut keys = Vec::new();
        let mut current = Some(obj);
        let mut depth = 0;
        while let Some(object) = current {
            depth += 1;
            if depth > self.config.max_prototype_chain_depth {
                return Err(Self::prototype_chain_too_deep());
            }
            for key in self.own_property_keys(object)? {
                if matches!(key, PropertyKey::Symbol(_)) || !seen.insert(key.clone()) {
                    continue;
                }
                if self
                    .get_own_property(object, &key)?
                    .is_some_and(|desc| desc.is_enumerable())
                {
                    keys.push(key);
                }
            }
            current = self.get_prototype_of(object)?;
        }
        Ok(keys)
    }

    // ========================================================================
    // Value access
    // ========================================================================

    /// Property read on any value (`base[key]`).
    pub fn get_value(&mut self, base: &Value, key: &PropertyKey) -> JsResult<Value> {
        match base {
            Value::Object(obj) => self.get(*obj, key, base),
            Value::Undefined | Value::Null => Err(Error::type_error(format!(
                "Cannot read properties of {base} (reading '{key}')"
            ))),
            Value::String(s) => {
                if key.as_str() == Some("length") {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Some(index) = key.as_array_index() {
                    if let Some(c) = s.chars().nth(index as usize) {
                        return Ok(Value::String(c.to_string()));
                    }
                }
                let prototype = self.intrinsics.object_prototype;
                self.get(prototype, key, base)
            }
            _ => {
                let prototype = self.intrinsics.object_prototype;
                self.get(prototype, key, base)
            }
        }
    }

    /// Property write on any value (`base[key] = value`).
    pub fn put_value(&mut self, base: &Value, key: PropertyKey, value: Value, strict: bool) -> JsResult<()> {
        match base {
            Value::Object(obj) => {
                if !self.set(*obj, key.clone(), value, base)? && strict {
                    return Err(Error::type_error(format!(
                        "Cannot assign to read only property '{key}' of object"
                    )));
                }
                Ok(())
            }
            Value::Undefined | Value::Null => Err(Error::type_error(format!(
                "Cannot set properties of {base} (setting '{key}')"
            ))),
            _ if strict => Err(Error::type_error(format!(
                "Cannot create property '{key}' on {}",
                self.type_of(base)
            ))),
            _ => Ok(()),
        }
    }

    /// LengthOfArrayLike
    pub fn length_of_array_like(&mut self, obj: ObjectRef) -> JsResult<u32> {
        let length = self.get(obj, &"length".into(), &Value::Object(obj))?;
        let length = self.to_number(&length)?;
        if length.is_nan() || length <= 0.0 {
            return Ok(0);
        }
        Ok(length.min(u32::MAX as f64) as u32)
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// IsCallable
    pub fn is_callable(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|obj| self.heap.get(obj).is_callable())
    }

    /// IsConstructor
    pub fn is_constructor(&self, value: &Value) -> bool {
        match value.as_object().map(|obj| &self.heap.get(obj).kind) {
            Some(ObjectKind::Function(function)) => function.is_constructor(),
            _ => false,
        }
    }

    /// The `typeof` result.
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(_) if self.is_callable(value) => "function",
            Value::Object(_) => "object",
        }
    }

    /// ToPropertyKey
    pub fn to_property_key(&mut self, value: &Value) -> JsResult<PropertyKey> {
        match value {
            Value::Symbol(symbol) => Ok(PropertyKey::Symbol(*symbol)),
            Value::String(s) => Ok(PropertyKey::String(s.clone())),
            other => Ok(PropertyKey::String(self.to_string(other)?)),
        }
    }

    /// ToString. Objects convert without consulting user-defined methods.
    pub fn to_string(&mut self, value: &Value) -> JsResult<String> {
        match value {
            Value::Symbol(_) => Err(Error::type_error("Cannot convert a Symbol value to a string")),
            Value::Object(obj) => self.object_to_string(*obj),
            other => Ok(other.to_string()),
        }
    }

    fn object_to_string(&mut self, obj: ObjectRef) -> JsResult<String> {
        match &self.heap.get(obj).kind {
            ObjectKind::Function(function) => {
                Ok(format!("function {}() {{ [native code] }}", function.name()))
            }
            ObjectKind::RevocableFunction(_) => Ok("function () { [native code] }".to_string()),
            ObjectKind::Array => {
                let length = self.length_of_array_like(obj)?;
                let mut parts = Vec::with_capacity(length as usize);
                for index in 0..length {
                    let element = self.get(obj, &PropertyKey::from(index), &Value::Object(obj))?;
                    parts.push(if element.is_nullish() {
                        String::new()
                    } else {
                        self.to_string(&element)?
                    });
                }
                Ok(parts.join(","))
            }
            ObjectKind::Error => {
                let receiver = Value::Object(obj);
                let name = self.get(obj, &"name".into(), &receiver)?;
                let name = if name.is_undefined() {
                    "Error".to_string()
                } else {
                    self.to_string(&name)?
                };
                let message = self.get(obj, &"message".into(), &receiver)?;
                let message = if message.is_undefined() {
                    String::new()
                } else {
                    self.to_string(&message)?
                };
                Ok(match (name.is_empty(), message.is_empty()) {
                    (_, true) => name,
                    (true, false) => message,
                    (false, false) => format!("{name}: {message}"),
                })
            }
            _ => Ok("[object Object]".to_string()),
        }
    }

    /// ToPrimitive. Objects become their string form.
    pub fn to_primitive(&mut self, value: &Value) -> JsResult<Value> {
        match value {
            Value::Object(obj) => Ok(Value::String(self.object_to_string(*obj)?)),
            other => Ok(other.clone()),
        }
    }

    /// ToNumber
    pub fn to_number(&mut self, value: &Value) -> JsResult<f64> {
        match value {
            Value::Symbol(_) => Err(Error::type_error("Cannot convert a Symbol value to a number")),
            Value::Object(obj) => Ok(string_to_number(&self.object_to_string(*obj)?)),
            other => Ok(other.to_number()),
        }
    }

    /// ToPropertyDescriptor
    pub fn to_property_descriptor(&mut self, value: &Value) -> JsResult<PartialDescriptor> {
        let Some(obj) = value.as_object() else {
            return Err(Error::type_error(format!(
                "Property description must be an object: {value}"
            )));
        };
        let field = |realm: &mut Realm, name: &str| -> JsResult<Option<Value>> {
            let key = PropertyKey::from(name);
            if realm.has_property(obj, &key)? {
                Ok(Some(realm.get(obj, &key, value)?))
            } else {
                Ok(None)
            }
        };
        let mut desc = PartialDescriptor {
            enumerable: field(self, "enumerable")?.map(|v| v.to_boolean()),
            configurable: field(self, "configurable")?.map(|v| v.to_boolean()),
            value: field(self, "value")?,
            writable: field(self, "writable")?.map(|v| v.to_boolean()),
            ..Default::default()
        };
        for (name, slot) in [("get", 0), ("set", 1)] {
            let Some(accessor) = field(self, name)? else {
                continue;
            };
            let function = match accessor {
                Value::Undefined => None,
                f if self.is_callable(&f) => f.as_object(),
                other => {
                    return Err(Error::type_error(format!(
                        "{} must be a function: {other}",
                        if slot == 0 { "Getter" } else { "Setter" }
                    )));
                }
            };
            if slot == 0 {
                desc.get = Some(function);
            } else {
                desc.set = Some(function);
            }
        }
        if desc.is_accessor() && (desc.value.is_some() || desc.writable.is_some()) {
            return Err(Error::type_error(
                "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
            ));
        }
        Ok(desc)
    }

    /// FromPropertyDescriptor for a complete descriptor.
    pub fn from_property_descriptor(&mut self, desc: &PropertyDescriptor) -> Value {
        self.from_partial_descriptor(&desc.clone().into())
    }

    /// FromPropertyDescriptor, emitting only the fields that are present.
    pub fn from_partial_descriptor(&mut self, desc: &PartialDescriptor) -> Value {
        let object = self.new_object();
        let accessor = |f: Option<ObjectRef>| f.map_or(Value::Undefined, Value::Object);
        let fields = [
            ("value", desc.value.clone()),
            ("writable", desc.writable.map(Value::Boolean)),
            ("get", desc.get.map(accessor)),
            ("set", desc.set.map(accessor)),
            ("enumerable", desc.enumerable.map(Value::Boolean)),
            ("configurable", desc.configurable.map(Value::Boolean)),
        ];
        let target = self.heap.get_mut(object);
        for (name, value) in fields {
            if let Some(value) = value {
                target.insert(name.into(), PropertyDescriptor::data(value));
            }
        }
        Value::Object(object)
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// The value a `catch` clause receives for `error`.
    pub fn error_to_value(&mut self, error: Error) -> Value {
        let (name, message) = match error {
            Error::Thrown(value) => return value,
            Error::SyntaxError(m) => ("SyntaxError", m),
            Error::TypeError(m) => ("TypeError", m),
            Error::ReferenceError(m) => ("ReferenceError", m),
            Error::RangeError(m) => ("RangeError", m),
            Error::InternalError(m) => ("Error", m),
        };
        Value::Object(self.new_error(name, &message))
    }

    /// Maps an uncaught value back to an [`Error`]. Native error instances
    /// become the matching variant; anything else stays `Thrown`.
    pub fn value_to_error(&mut self, value: Value) -> Error {
        let Some(obj) = value.as_object() else {
            return Error::Thrown(value);
        };
        if !matches!(self.heap.get(obj).kind, ObjectKind::Error) {
            return Error::Thrown(value);
        }
        let read = |realm: &mut Realm, name: &str| {
            realm
                .get(obj, &name.into(), &value)
                .and_then(|v| if v.is_undefined() { Ok(String::new()) } else { realm.to_string(&v) })
                .unwrap_or_default()
        };
        let name = read(self, "name");
        let message = read(self, "message");
        match name.as_str() {
            "TypeError" => Error::TypeError(message),
            "RangeError" => Error::RangeError(message),
            "SyntaxError" => Error::SyntaxError(message),
            "ReferenceError" => Error::ReferenceError(message),
            _ => Error::Thrown(value),
        }
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("objects", &self.heap.len())
            .field("call_depth", &self.call_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_walks_prototype_chain() {
        let mut realm = Realm::new();
        let parent = realm.new_object();
        realm.create_data_property(parent, "x".into(), Value::Number(1.0)).unwrap();
        let child = realm.new_object_with_prototype(Some(parent));
        assert_eq!(
            realm.get(child, &"x".into(), &Value::Object(child)).unwrap(),
            Value::Number(1.0)
        );
        assert!(realm.has_property(child, &"x".into()).unwrap());
        assert!(!realm.has_property(child, &"y".into()).unwrap());
    }

    #[test]
    fn test_set_creates_own_property_on_receiver() {
        let mut realm = Realm::new();
        let parent = realm.new_object();
        realm.create_data_property(parent, "x".into(), Value::Number(1.0)).unwrap();
        let child = realm.new_object_with_prototype(Some(parent));
        assert!(realm.set(child, "x".into(), Value::Number(2.0), &Value::Object(child)).unwrap());
        assert_eq!(
            realm.heap.get(child).get_own(&"x".into()).and_then(|d| d.value().cloned()),
            Some(Value::Number(2.0))
        );
        assert_eq!(
            realm.get(parent, &"x".into(), &Value::Object(parent)).unwrap(),
            Value::Number(1.0)
        );
    }

    #[test]
    fn test_read_only_property_rejects_assignment() {
        let mut realm = Realm::new();
        let obj = realm.new_object();
        let frozen = PropertyDescriptor::data_with(Value::Number(1.0), false, true, false);
        assert!(realm.define_own_property(obj, "x".into(), frozen.into()).unwrap());
        assert!(!realm.set(obj, "x".into(), Value::Number(2.0), &Value::Object(obj)).unwrap());
        assert!(realm.put_value(&Value::Object(obj), "x".into(), Value::Number(2.0), true).is_err());
        assert!(realm.put_value(&Value::Object(obj), "x".into(), Value::Number(2.0), false).is_ok());
        assert!(!realm.delete(obj, &"x".into()).unwrap());
    }

    #[test]
    fn test_array_length_tracks_indices() {
        let mut realm = Realm::new();
        let array = realm.new_array(vec![Value::Number(1.0), Value::Number(2.0)]);
        realm.create_data_property(array, 5u32.into(), Value::Null).unwrap();
        assert_eq!(realm.length_of_array_like(array).unwrap(), 6);

        let shrink = PartialDescriptor {
            value: Some(Value::Number(1.0)),
            ..Default::default()
        };
        assert!(realm.define_own_property(array, "length".into(), shrink).unwrap());
        assert_eq!(realm.length_of_array_like(array).unwrap(), 1);
        assert!(realm.heap.get(array).get_own(&1u32.into()).is_none());
        assert_eq!(realm.to_string(&Value::Object(array)).unwrap(), "1");
    }

    #[test]
    fn test_set_prototype_of_rejects_cycles() {
        let mut realm = Realm::new();
        let a = realm.new_object();
        let b = realm.new_object_with_prototype(Some(a));
        assert!(!realm.set_prototype_of(a, Some(b)).unwrap());
        realm.prevent_extensions(a).unwrap();
        assert!(!realm.set_prototype_of(a, None).unwrap());
    }

    #[test]
    fn test_enumerate_skips_shadowed_and_hidden_keys() {
        let mut realm = Realm::new();
        let parent = realm.new_object();
        realm.create_data_property(parent, "a".into(), Value::Null).unwrap();
        realm.create_data_property(parent, "b".into(), Value::Null).unwrap();
        let child = realm.new_object_with_prototype(Some(parent));
        realm.create_data_property(child, "b".into(), Value::Null).unwrap();
        realm.define_builtin(child, "hidden", Value::Null);

        let keys: Vec<String> = realm
            .enumerate(child)
            .unwrap()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_descriptor_object_conversion() {
        let mut realm = Realm::new();
        let desc = PropertyDescriptor::data_with(Value::Number(3.0), false, true, false);
        let object = realm.from_property_descriptor(&desc);
        let partial = realm.to_property_descriptor(&object).unwrap();
        assert_eq!(partial.complete(None), desc);
        assert!(realm.to_property_descriptor(&Value::Number(1.0)).is_err());
    }

    #[test]
    fn test_errors_round_trip_through_values() {
        let mut realm = Realm::new();
        let value = realm.error_to_value(Error::type_error("bad"));
        assert_eq!(realm.to_string(&value).unwrap(), "TypeError: bad");
        assert!(matches!(realm.value_to_error(value), Error::TypeError(m) if m == "bad"));

        let thrown = realm.error_to_value(Error::Thrown(Value::Number(1.0)));
        assert!(matches!(realm.value_to_error(thrown), Error::Thrown(Value::Number(_))));
    }

    #[test]
    fn test_primitive_property_access() {
        let mut realm = Realm::new();
        let s = Value::from("héllo");
        assert_eq!(realm.get_value(&s, &"length".into()).unwrap(), Value::Number(5.0));
        assert_eq!(realm.get_value(&s, &1u32.into()).unwrap(), Value::from("é"));
        assert!(realm.get_value(&Value::Undefined, &"x".into()).is_err());
    }
}
