//! The runtime: heap, realms, activation stack and generic object operations
//!
//! Stub code and MIR only take the fast paths they were specialized for.
//! Everything else (proxies, accessors, megamorphic lookups, calls) goes
//! through the generic operations here, which both tiers share.

use std::cmp::Ordering;
use std::sync::Arc;

use num_bigint::BigInt;

use crate::error::{Exception, VmResult};
use crate::function::{CallArgs, FunctionData, FunctionFlags, FunctionKind, NativeFn};
use crate::gc::GcState;
use crate::object::{
    ClassData, ClassFlags, ClassId, Elements, ElementsFlags, ObjectData, ObjectId, ObjectKind,
    layout,
};
use crate::proxy::{ProxyData, ProxyHandler};
use crate::realm::{FrameInfo, FrameKind, RealmData, RealmId};
use crate::shape::{PropertyAttrs, PropertyInfo, PropertyKey, PropertyStorage, ShapeId, ShapeTable};
use crate::string::{StringId, StringTable, SymbolTable};
use crate::types::{GroupId, GroupTable, TypeKey};
use crate::value::{JSWhyMagic, Value, ValueType};

/// Number of inline slots given to plain objects.
pub const DEFAULT_FIXED_SLOTS: u32 = 4;

/// Initial dense capacity of arrays.
const MIN_DENSE_CAPACITY: u32 = 4;

/// Atoms the runtime needs by name.
#[derive(Debug, Clone, Copy)]
pub struct CommonNames {
    /// `"length"`
    pub length: StringId,
    /// `"prototype"`
    pub prototype: StringId,
}

/// Where a named data property is stored, as a stub-field byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLocation {
    /// Inline slot at this byte offset
    Fixed(u32),
    /// Out-of-line slot at this byte offset
    Dynamic(u32),
}

/// Heap and execution state shared by both tiers.
pub struct Runtime {
    objects: Vec<ObjectData>,
    /// Shapes
    pub shapes: ShapeTable,
    /// Object groups and property type sets
    pub groups: GroupTable,
    /// Atoms
    pub strings: StringTable,
    /// Symbols and bigints
    pub symbols: SymbolTable,
    classes: Vec<ClassData>,
    realms: Vec<RealmData>,
    current_realm: RealmId,
    frames: Vec<FrameInfo>,
    names: CommonNames,
    /// Collector state
    pub gc: GcState,
    /// Largest dense capacity the pure growth helper will allocate
    pub max_dense_capacity: u32,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with the builtin classes and one realm.
    pub fn new() -> Self {
        let mut strings = StringTable::default();
        let names = CommonNames {
            length: strings.intern("length"),
            prototype: strings.intern("prototype"),
        };
        let classes = [
            ("Object", ClassFlags::empty()),
            ("Array", ClassFlags::empty()),
            ("Function", ClassFlags::IS_CALLABLE),
            ("Proxy", ClassFlags::IS_PROXY),
            ("Arguments", ClassFlags::empty()),
            ("Arguments", ClassFlags::empty()),
        ]
        .into_iter()
        .map(|(name, flags)| ClassData {
            name: name.to_string(),
            flags,
        })
        .collect();

        Self {
            objects: Vec::new(),
            shapes: ShapeTable::default(),
            groups: GroupTable::default(),
            strings,
            symbols: SymbolTable::default(),
            classes,
            realms: vec![RealmData {
                name: "main".to_string(),
            }],
            current_realm: RealmId::new(0),
            frames: Vec::new(),
            names,
            gc: GcState::default(),
            max_dense_capacity: 1 << 20,
        }
    }

    // ---------------------------------------------------------------------
    // Classes, realms, atoms
    // ---------------------------------------------------------------------

    /// Register a class.
    pub fn register_class(&mut self, name: &str, flags: ClassFlags) -> ClassId {
        self.classes.push(ClassData {
            name: name.to_string(),
            flags,
        });
        ClassId::new(self.classes.len() as u32 - 1)
    }

    /// Class contents.
    pub fn class_data(&self, class: ClassId) -> &ClassData {
        &self.classes[class.index() as usize]
    }

    /// Create a realm.
    pub fn new_realm(&mut self, name: &str) -> RealmId {
        self.realms.push(RealmData {
            name: name.to_string(),
        });
        RealmId::new(self.realms.len() as u32 - 1)
    }

    /// The realm code is currently running in.
    #[inline]
    pub fn current_realm(&self) -> RealmId {
        self.current_realm
    }

    /// Enter `realm`.
    #[inline]
    pub fn set_current_realm(&mut self, realm: RealmId) {
        self.current_realm = realm;
    }

    /// Well-known atoms.
    pub fn names(&self) -> CommonNames {
        self.names
    }

    /// Intern a string.
    pub fn intern(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    /// Intern a string and box it.
    pub fn string_value(&mut self, s: &str) -> Value {
        Value::string(self.strings.intern(s))
    }

    /// Property key for a name.
    pub fn atom_key(&mut self, s: &str) -> PropertyKey {
        PropertyKey::Atom(self.strings.intern(s))
    }

    /// Create a symbol.
    pub fn new_symbol(&mut self, description: Option<&str>) -> Value {
        let description = description.map(|d| self.strings.intern(d));
        Value::symbol(self.symbols.new_symbol(description))
    }

    /// Store a bigint.
    pub fn new_bigint(&mut self, value: BigInt) -> Value {
        Value::bigint(self.symbols.new_bigint(value))
    }

    /// A `TypeError`-like exception carrying `message`.
    pub fn type_error(&mut self, message: &str) -> Exception {
        Exception::new(self.string_value(message))
    }

    // ---------------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------------

    fn allocate(
        &mut self,
        class: ClassId,
        proto: Option<ObjectId>,
        num_fixed_slots: u32,
        kind: ObjectKind,
    ) -> ObjectId {
        let shape = self.shapes.initial_shape(class, proto, num_fixed_slots);
        let group = self.groups.default_group(class, proto);
        let id = ObjectId::new(self.objects.len() as u32);
        self.objects.push(ObjectData {
            shape,
            group,
            realm: self.current_realm,
            fixed_slots: vec![Value::UNDEFINED; num_fixed_slots as usize],
            dynamic_slots: Vec::new(),
            elements: Elements::default(),
            kind,
            in_nursery: self.gc.nursery_allocation,
        });
        id
    }

    /// Allocate a plain object.
    pub fn new_object(&mut self, proto: Option<ObjectId>) -> ObjectId {
        self.allocate(ClassId::PLAIN_OBJECT, proto, DEFAULT_FIXED_SLOTS, ObjectKind::Ordinary)
    }

    /// Allocate an ordinary object of a given class.
    pub fn new_object_with_class(
        &mut self,
        class: ClassId,
        proto: Option<ObjectId>,
        num_fixed_slots: u32,
    ) -> ObjectId {
        self.allocate(class, proto, num_fixed_slots, ObjectKind::Ordinary)
    }

    /// Allocate a packed (unless it contains holes) array.
    pub fn new_array(&mut self, values: Vec<Value>) -> ObjectId {
        let id = self.allocate(ClassId::ARRAY, None, 0, ObjectKind::Ordinary);
        let len = values.len() as u32;
        let packed = !values.iter().any(|v| v.is_magic(JSWhyMagic::ElementsHole));
        let elements = &mut self.objects[id.index() as usize].elements;
        elements.capacity = len.max(MIN_DENSE_CAPACITY);
        elements.length = len;
        elements.values = values;
        if !packed {
            elements.flags |= ElementsFlags::NON_PACKED;
        }
        id
    }

    /// Allocate a function in the current realm.
    pub fn new_function(
        &mut self,
        kind: FunctionKind,
        nargs: u16,
        flags: FunctionFlags,
        body: NativeFn,
    ) -> ObjectId {
        let data = FunctionData {
            kind,
            nargs,
            flags,
            body,
            realm: self.current_realm,
            dom_this_class: None,
        };
        self.allocate(ClassId::FUNCTION, None, 2, ObjectKind::Function(data))
    }

    /// Allocate a native function.
    pub fn new_native_function<F>(&mut self, nargs: u16, body: F) -> ObjectId
    where
        F: Fn(&mut Runtime, &CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.new_function(FunctionKind::Native, nargs, FunctionFlags::empty(), Arc::new(body))
    }

    /// Allocate a scripted (JIT-enterable) constructor function.
    pub fn new_scripted_function<F>(&mut self, nargs: u16, body: F) -> ObjectId
    where
        F: Fn(&mut Runtime, &CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.new_function(
            FunctionKind::Scripted,
            nargs,
            FunctionFlags::CONSTRUCTOR,
            Arc::new(body),
        )
    }

    /// Allocate a DOM method whose `this` must be of class `this_class`.
    pub fn new_dom_function<F>(&mut self, nargs: u16, this_class: ClassId, body: F) -> ObjectId
    where
        F: Fn(&mut Runtime, &CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        let id = self.new_function(FunctionKind::Dom, nargs, FunctionFlags::empty(), Arc::new(body));
        if let ObjectKind::Function(fun) = &mut self.objects[id.index() as usize].kind {
            fun.dom_this_class = Some(this_class);
        }
        id
    }

    /// Allocate a proxy.
    pub fn new_proxy(
        &mut self,
        handler: Arc<dyn ProxyHandler>,
        target: Option<ObjectId>,
    ) -> ObjectId {
        self.allocate(
            ClassId::PROXY,
            None,
            0,
            ObjectKind::Proxy(ProxyData { handler, target }),
        )
    }

    /// Give `obj` its own fresh group.
    pub fn split_group(&mut self, obj: ObjectId) -> GroupId {
        let class = self.class_of(obj);
        let proto = self.proto_of(obj);
        let group = self.groups.new_group(class, proto);
        self.object_mut(obj).group = group;
        group
    }

    // ---------------------------------------------------------------------
    // Object accessors
    // ---------------------------------------------------------------------

    /// Object contents.
    #[inline]
    pub fn object(&self, id: ObjectId) -> &ObjectData {
        &self.objects[id.index() as usize]
    }

    /// Mutable object contents.
    #[inline]
    pub fn object_mut(&mut self, id: ObjectId) -> &mut ObjectData {
        &mut self.objects[id.index() as usize]
    }

    /// Shape of `obj`.
    #[inline]
    pub fn shape_of(&self, obj: ObjectId) -> ShapeId {
        self.object(obj).shape
    }

    /// Class of `obj`.
    #[inline]
    pub fn class_of(&self, obj: ObjectId) -> ClassId {
        self.shapes.get(self.object(obj).shape).class
    }

    /// Prototype of `obj`.
    #[inline]
    pub fn proto_of(&self, obj: ObjectId) -> Option<ObjectId> {
        self.shapes.get(self.object(obj).shape).proto
    }

    /// Group of `obj`.
    #[inline]
    pub fn group_of(&self, obj: ObjectId) -> GroupId {
        self.object(obj).group
    }

    /// Whether `obj` is a proxy.
    pub fn is_proxy(&self, obj: ObjectId) -> bool {
        self.class_data(self.class_of(obj))
            .flags
            .contains(ClassFlags::IS_PROXY)
    }

    /// Whether `obj` is callable.
    pub fn is_callable(&self, obj: ObjectId) -> bool {
        self.object(obj).as_function().is_some()
            || self
                .class_data(self.class_of(obj))
                .flags
                .contains(ClassFlags::IS_CALLABLE)
    }

    /// Function payload of `obj`.
    pub fn function(&self, obj: ObjectId) -> Option<&FunctionData> {
        self.object(obj).as_function()
    }

    /// Target of a proxy.
    pub fn proxy_target(&self, obj: ObjectId) -> Option<ObjectId> {
        self.object(obj).as_proxy().and_then(|p| p.target)
    }

    // ---------------------------------------------------------------------
    // Slots
    // ---------------------------------------------------------------------

    /// Read slot `slot` (fixed or dynamic).
    pub fn get_slot(&self, obj: ObjectId, slot: u32) -> Value {
        let data = self.object(obj);
        let nfixed = self.shapes.get(data.shape).num_fixed_slots;
        if slot < nfixed {
            data.fixed_slots[slot as usize]
        } else {
            data.dynamic_slots
                .get((slot - nfixed) as usize)
                .copied()
                .unwrap_or(Value::UNDEFINED)
        }
    }

    fn set_slot_raw(&mut self, obj: ObjectId, slot: u32, value: Value) {
        let nfixed = self.shapes.get(self.object(obj).shape).num_fixed_slots;
        let data = self.object_mut(obj);
        if slot < nfixed {
            data.fixed_slots[slot as usize] = value;
        } else {
            let index = (slot - nfixed) as usize;
            if index >= data.dynamic_slots.len() {
                let capacity = dynamic_slot_capacity(index as u32 + 1);
                data.dynamic_slots.resize(capacity as usize, Value::UNDEFINED);
            }
            data.dynamic_slots[index] = value;
        }
    }

    /// Write slot `slot` behind both barriers.
    pub fn set_slot(&mut self, obj: ObjectId, slot: u32, value: Value) {
        let old = self.get_slot(obj, slot);
        self.gc.pre_write_barrier(old);
        self.set_slot_raw(obj, slot, value);
        self.post_write_barrier(obj, value);
    }

    /// Own data property of `obj`, as a stub-field byte offset.
    pub fn slot_location(&self, obj: ObjectId, key: PropertyKey) -> Option<SlotLocation> {
        let shape = self.shapes.get(self.object(obj).shape);
        match shape.lookup(key)?.storage {
            PropertyStorage::Slot(slot) if slot < shape.num_fixed_slots => {
                Some(SlotLocation::Fixed(layout::fixed_slot_offset(slot)))
            }
            PropertyStorage::Slot(slot) => Some(SlotLocation::Dynamic(layout::dynamic_slot_offset(
                slot - shape.num_fixed_slots,
            ))),
            PropertyStorage::Accessor { .. } => None,
        }
    }

    /// Load the fixed slot at byte offset `offset`.
    pub fn load_fixed_slot(&self, obj: ObjectId, offset: u32) -> Value {
        self.object(obj).fixed_slots[layout::fixed_slot_index(offset)]
    }

    /// Store the fixed slot at byte offset `offset`, without barriers.
    pub fn store_fixed_slot(&mut self, obj: ObjectId, offset: u32, value: Value) {
        self.object_mut(obj).fixed_slots[layout::fixed_slot_index(offset)] = value;
    }

    /// Load the dynamic slot at byte offset `offset`.
    pub fn load_dynamic_slot(&self, obj: ObjectId, offset: u32) -> Value {
        self.object(obj)
            .dynamic_slots
            .get(layout::dynamic_slot_index(offset))
            .copied()
            .unwrap_or(Value::UNDEFINED)
    }

    /// Store the dynamic slot at byte offset `offset`, without barriers.
    pub fn store_dynamic_slot(&mut self, obj: ObjectId, offset: u32, value: Value) {
        let index = layout::dynamic_slot_index(offset);
        let slots = &mut self.object_mut(obj).dynamic_slots;
        if index >= slots.len() {
            slots.resize(index + 1, Value::UNDEFINED);
        }
        slots[index] = value;
    }

    /// Grow the dynamic slot vector to `capacity` slots. Pure: never collects.
    pub fn grow_slots_pure(&mut self, obj: ObjectId, capacity: u32) -> bool {
        let slots = &mut self.object_mut(obj).dynamic_slots;
        if (capacity as usize) > slots.len() {
            slots.resize(capacity as usize, Value::UNDEFINED);
        }
        true
    }

    /// Own property of `obj`.
    pub fn lookup_own(&self, obj: ObjectId, key: PropertyKey) -> Option<PropertyInfo> {
        self.shapes.get(self.object(obj).shape).lookup(key).copied()
    }

    /// Define or overwrite an own data property.
    pub fn define_property(&mut self, obj: ObjectId, key: PropertyKey, value: Value) {
        if let PropertyKey::Index(index) = key {
            self.set_element(obj, index, value);
            return;
        }
        let slot = match self.lookup_own(obj, key).map(|p| p.storage) {
            Some(PropertyStorage::Slot(slot)) => slot,
            _ => {
                let from = self.object(obj).shape;
                let shape = self
                    .shapes
                    .add_data_property(from, key, PropertyAttrs::default());
                self.object_mut(obj).shape = shape;
                match self.shapes.get(shape).lookup(key).map(|p| p.storage) {
                    Some(PropertyStorage::Slot(slot)) => slot,
                    _ => return,
                }
            }
        };
        let group = self.object(obj).group;
        self.groups.add_type(group, TypeKey::Property(key), value);
        self.set_slot(obj, slot, value);
    }

    /// Define an accessor property.
    pub fn define_accessor(
        &mut self,
        obj: ObjectId,
        key: PropertyKey,
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
    ) {
        let from = self.object(obj).shape;
        let shape = self.shapes.add_accessor_property(from, key, getter, setter);
        self.object_mut(obj).shape = shape;
    }

    // ---------------------------------------------------------------------
    // Elements
    // ---------------------------------------------------------------------

    /// Element below the initialized length (may be a hole).
    pub fn dense_element(&self, obj: ObjectId, index: u32) -> Option<Value> {
        self.object(obj).elements.values.get(index as usize).copied()
    }

    /// Initialized length of `obj`'s elements.
    pub fn initialized_length(&self, obj: ObjectId) -> u32 {
        self.object(obj).elements.initialized_length()
    }

    /// Array length of `obj`.
    pub fn array_length(&self, obj: ObjectId) -> u32 {
        self.object(obj).elements.length
    }

    /// Ensure capacity for one more element. Pure: never collects, only
    /// fails when the capacity limit is reached.
    pub fn add_dense_element_pure(&mut self, obj: ObjectId) -> bool {
        let max = self.max_dense_capacity;
        let elements = &mut self.object_mut(obj).elements;
        let needed = elements.initialized_length() + 1;
        if needed <= elements.capacity {
            return true;
        }
        if needed > max {
            return false;
        }
        elements.capacity = needed.next_power_of_two().clamp(MIN_DENSE_CAPACITY, max);
        elements.values.reserve(elements.capacity as usize - elements.values.len());
        true
    }

    /// Generic element store; fills with holes when writing past the end.
    pub fn set_element(&mut self, obj: ObjectId, index: u32, value: Value) {
        let group = self.object(obj).group;
        self.groups.add_type(group, TypeKey::Elements, value);
        let init_len = self.initialized_length(obj);
        if index < init_len {
            let old = self.object(obj).elements.values[index as usize];
            self.gc.pre_write_barrier(old);
            self.object_mut(obj).elements.values[index as usize] = value;
        } else {
            let elements = &mut self.object_mut(obj).elements;
            if index > init_len {
                elements.flags |= ElementsFlags::NON_PACKED;
            }
            elements
                .values
                .resize(index as usize, Value::magic(JSWhyMagic::ElementsHole));
            elements.values.push(value);
            elements.capacity = elements.capacity.max(elements.values.len() as u32);
            if index >= elements.length {
                elements.length = index + 1;
            }
        }
        self.post_write_barrier(obj, value);
    }

    // ---------------------------------------------------------------------
    // Barriers and collection
    // ---------------------------------------------------------------------

    /// Whether storing `value` into `holder` requires a store-buffer entry.
    pub fn needs_post_barrier(&self, holder: ObjectId, value: Value) -> bool {
        !self.object(holder).in_nursery
            && value
                .as_object()
                .is_some_and(|target| self.object(target).in_nursery)
    }

    /// Post-write barrier.
    pub fn post_write_barrier(&mut self, holder: ObjectId, value: Value) {
        if self.needs_post_barrier(holder, value) {
            self.gc.put_whole_cell(holder);
        }
    }

    /// Tenure every nursery object.
    pub fn minor_gc(&mut self) {
        for object in &mut self.objects {
            object.in_nursery = false;
        }
        self.gc.finish_minor_gc();
    }

    /// Called by every VM function that is allowed to collect.
    pub fn maybe_gc(&mut self) {
        if self.gc.note_gc_capable_call() {
            self.minor_gc();
        }
    }

    // ---------------------------------------------------------------------
    // Activation stack
    // ---------------------------------------------------------------------

    /// Push an activation.
    pub fn push_frame(&mut self, kind: FrameKind) {
        self.frames.push(FrameInfo {
            kind,
            realm: self.current_realm,
        });
    }

    /// Pop the innermost activation.
    pub fn pop_frame(&mut self) -> Option<FrameInfo> {
        self.frames.pop()
    }

    /// Activation stack, outermost first.
    pub fn frames(&self) -> &[FrameInfo] {
        &self.frames
    }

    /// Drop activations above `depth` (exception unwinding).
    pub fn unwind_frames(&mut self, depth: usize) {
        if let Some(frame) = self.frames.get(depth) {
            self.current_realm = frame.realm;
        }
        self.frames.truncate(depth);
    }

    /// The bytecode offset execution resumes at if the innermost JIT
    /// activation has to be reconstructed: the IC site for a Baseline stub
    /// frame, the resume point for a Warp call.
    pub fn reentry_pc(&self) -> Option<u32> {
        self.frames.iter().rev().find_map(|frame| match frame.kind {
            FrameKind::BaselineStub { pc } => Some(pc),
            FrameKind::WarpCall { resume_pc } => Some(resume_pc),
            _ => None,
        })
    }

    // ---------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------

    /// Generic `[[Call]]`: rectifies scripted callees, enters the callee's
    /// realm and pushes its frame.
    pub fn call_function(&mut self, callee: ObjectId, mut args: CallArgs) -> VmResult<Value> {
        let Some(fun) = self.function(callee).cloned() else {
            return Err(self.type_error("not a function"));
        };
        if fun.is_class_constructor() && !args.is_constructing() {
            return Err(self.type_error("class constructor cannot be invoked without 'new'"));
        }
        if fun.kind == FunctionKind::Scripted {
            args.rectify(fun.nargs as usize);
        }
        let saved_realm = self.current_realm;
        self.current_realm = fun.realm;
        let result = self.run_body(&fun, callee, &args);
        self.current_realm = saved_realm;
        result
    }

    /// JIT-style entry: the caller has already rectified the arguments and
    /// switched realms.
    pub fn enter_function(&mut self, callee: ObjectId, args: &CallArgs) -> VmResult<Value> {
        let Some(fun) = self.function(callee).cloned() else {
            return Err(self.type_error("not a function"));
        };
        self.run_body(&fun, callee, args)
    }

    fn run_body(&mut self, fun: &FunctionData, callee: ObjectId, args: &CallArgs) -> VmResult<Value> {
        let kind = match fun.kind {
            FunctionKind::Scripted => FrameKind::Scripted { callee },
            FunctionKind::Native | FunctionKind::Dom => FrameKind::Native { callee },
        };
        let depth = self.frames.len();
        self.push_frame(kind);
        let result = (fun.body)(self, args);
        self.frames.truncate(depth);
        result
    }

    /// `new callee(...args)`.
    pub fn construct(&mut self, callee: ObjectId, args: Vec<Value>) -> VmResult<Value> {
        if !self.function(callee).is_some_and(|f| f.is_constructor()) {
            return Err(self.type_error("not a constructor"));
        }
        let this = Value::object(self.create_this(callee, callee));
        let mut call = CallArgs::new(callee, this, args);
        call.new_target = Some(Value::object(callee));
        let result = self.call_function(callee, call)?;
        Ok(if result.is_object() { result } else { this })
    }

    /// Allocate `this` for a constructing call, using `new_target.prototype`.
    pub fn create_this(&mut self, _callee: ObjectId, new_target: ObjectId) -> ObjectId {
        let key = PropertyKey::Atom(self.names.prototype);
        let proto = match self.lookup_own(new_target, key).map(|p| p.storage) {
            Some(PropertyStorage::Slot(slot)) => self.get_slot(new_target, slot).as_object(),
            _ => None,
        };
        self.new_object(proto)
    }

    /// Allocate `this` with the shape, group and slot layout of
    /// `template`. Every slot starts undefined.
    pub fn create_this_from_template(&mut self, template: ObjectId) -> ObjectId {
        let data = self.object(template);
        let (shape, group) = (data.shape, data.group);
        let (num_fixed, num_dynamic) = (data.fixed_slots.len(), data.dynamic_slots.len());
        let id = ObjectId::new(self.objects.len() as u32);
        self.objects.push(ObjectData {
            shape,
            group,
            realm: self.current_realm,
            fixed_slots: vec![Value::UNDEFINED; num_fixed],
            dynamic_slots: vec![Value::UNDEFINED; num_dynamic],
            elements: Elements::default(),
            kind: ObjectKind::Ordinary,
            in_nursery: self.gc.nursery_allocation,
        });
        id
    }

    /// Call a getter with no arguments.
    pub fn call_getter(&mut self, getter: ObjectId, receiver: Value) -> VmResult<Value> {
        self.call_function(getter, CallArgs::new(getter, receiver, Vec::new()))
    }

    /// Call a setter with one argument.
    pub fn call_setter(&mut self, setter: ObjectId, receiver: Value, value: Value) -> VmResult<()> {
        self.call_function(setter, CallArgs::new(setter, receiver, vec![value]))
            .map(|_| ())
    }

    // ---------------------------------------------------------------------
    // Generic property operations
    // ---------------------------------------------------------------------

    /// `[[Get]]` walking the prototype chain.
    pub fn get_property(
        &mut self,
        obj: ObjectId,
        key: PropertyKey,
        receiver: Value,
    ) -> VmResult<Value> {
        let mut current = Some(obj);
        while let Some(holder) = current {
            if let Some(proxy) = self.object(holder).as_proxy() {
                let handler = Arc::clone(&proxy.handler);
                return handler.get(self, holder, key, receiver);
            }
            if let Some(value) = self.own_value(holder, key) {
                return match value {
                    OwnValue::Data(v) => Ok(v),
                    OwnValue::Getter(Some(getter)) => self.call_getter(getter, receiver),
                    OwnValue::Getter(None) => Ok(Value::UNDEFINED),
                };
            }
            current = self.proto_of(holder);
        }
        Ok(Value::UNDEFINED)
    }

    fn own_value(&self, obj: ObjectId, key: PropertyKey) -> Option<OwnValue> {
        if let PropertyKey::Index(index) = key {
            if let Some(v) = self.dense_element(obj, index) {
                if !v.is_magic(JSWhyMagic::ElementsHole) {
                    return Some(OwnValue::Data(v));
                }
            }
        }
        if key == PropertyKey::Atom(self.names.length) && self.class_of(obj) == ClassId::ARRAY {
            return Some(OwnValue::Data(Value::number(self.array_length(obj) as f64)));
        }
        match self.lookup_own(obj, key)?.storage {
            PropertyStorage::Slot(slot) => Some(OwnValue::Data(self.get_slot(obj, slot))),
            PropertyStorage::Accessor { getter, .. } => Some(OwnValue::Getter(getter)),
        }
    }

    /// `[[Set]]`: calls inherited setters, otherwise defines on `obj`.
    pub fn set_property(&mut self, obj: ObjectId, key: PropertyKey, value: Value) -> VmResult<()> {
        let mut current = Some(obj);
        while let Some(holder) = current {
            if let Some(proxy) = self.object(holder).as_proxy() {
                let handler = Arc::clone(&proxy.handler);
                handler.set(self, holder, key, value, Value::object(obj))?;
                return Ok(());
            }
            if let Some(info) = self.lookup_own(holder, key) {
                if let PropertyStorage::Accessor { setter, .. } = info.storage {
                    return match setter {
                        Some(setter) => self.call_setter(setter, Value::object(obj), value),
                        None => Ok(()),
                    };
                }
                if holder == obj {
                    break;
                }
            }
            current = self.proto_of(holder);
        }
        self.define_property(obj, key, value);
        Ok(())
    }

    /// `[[HasProperty]]`
    pub fn has_property(&mut self, obj: ObjectId, key: PropertyKey) -> VmResult<bool> {
        let mut current = Some(obj);
        while let Some(holder) = current {
            if let Some(proxy) = self.object(holder).as_proxy() {
                let handler = Arc::clone(&proxy.handler);
                return handler.has(self, holder, key);
            }
            if self.own_value(holder, key).is_some() {
                return Ok(true);
            }
            current = self.proto_of(holder);
        }
        Ok(false)
    }

    /// Own-property presence.
    pub fn has_own_property(&mut self, obj: ObjectId, key: PropertyKey) -> VmResult<bool> {
        if let Some(proxy) = self.object(obj).as_proxy() {
            let handler = Arc::clone(&proxy.handler);
            return handler.has_own(self, obj, key);
        }
        Ok(self.own_value(obj, key).is_some())
    }

    /// Side-effect-free lookup for megamorphic stubs. `None` means the pure
    /// path cannot answer (proxy, accessor) and the caller must bail.
    pub fn megamorphic_load_slot(&self, obj: ObjectId, key: PropertyKey) -> Option<Value> {
        let mut holder = obj;
        loop {
            if self.object(holder).as_proxy().is_some() {
                return None;
            }
            match self.own_value(holder, key) {
                Some(OwnValue::Data(v)) => return Some(v),
                Some(OwnValue::Getter(_)) => return None,
                None => {}
            }
            match self.proto_of(holder) {
                Some(proto) => holder = proto,
                None => return Some(Value::UNDEFINED),
            }
        }
    }

    /// Side-effect-free `in`/`hasOwnProperty` for megamorphic stubs.
    pub fn megamorphic_has_prop(&self, obj: ObjectId, key: PropertyKey, has_own: bool) -> Option<bool> {
        let mut holder = obj;
        loop {
            if self.object(holder).as_proxy().is_some() {
                return None;
            }
            if self.own_value(holder, key).is_some() {
                return Some(true);
            }
            match self.proto_of(holder) {
                Some(proto) if !has_own => holder = proto,
                _ => return Some(false),
            }
        }
    }

    /// Proxy `[[Get]]`.
    pub fn proxy_get(&mut self, proxy: ObjectId, key: PropertyKey, receiver: Value) -> VmResult<Value> {
        match self.object(proxy).as_proxy() {
            Some(data) => {
                let handler = Arc::clone(&data.handler);
                handler.get(self, proxy, key, receiver)
            }
            None => self.get_property(proxy, key, receiver),
        }
    }

    /// Proxy `[[Set]]`.
    pub fn proxy_set(&mut self, proxy: ObjectId, key: PropertyKey, value: Value, strict: bool) -> VmResult<()> {
        match self.object(proxy).as_proxy() {
            Some(data) => {
                let handler = Arc::clone(&data.handler);
                let ok = handler.set(self, proxy, key, value, Value::object(proxy))?;
                if !ok && strict {
                    return Err(self.type_error("proxy set trap returned false"));
                }
                Ok(())
            }
            None => self.set_property(proxy, key, value),
        }
    }

    /// Convert a value to a property key.
    pub fn to_property_key(&mut self, value: Value) -> VmResult<PropertyKey> {
        match value.value_type() {
            ValueType::Int32 if (value.payload() as u32 as i32) >= 0 => {
                Ok(PropertyKey::Index(value.payload() as u32))
            }
            ValueType::String => Ok(PropertyKey::Atom(StringId::new(value.payload() as u32))),
            ValueType::Symbol => Ok(PropertyKey::Symbol(crate::string::SymbolId::new(
                value.payload() as u32,
            ))),
            _ => {
                let s = self.to_display_string(value);
                Ok(self.atom_key(&s))
            }
        }
    }

    fn to_display_string(&self, value: Value) -> String {
        match value.value_type() {
            ValueType::Int32 => (value.payload() as u32 as i32).to_string(),
            ValueType::Double => value.as_double().map(|d| d.to_string()).unwrap_or_default(),
            ValueType::Boolean => (value.payload() != 0).to_string(),
            ValueType::Undefined => "undefined".to_string(),
            ValueType::Null => "null".to_string(),
            ValueType::String => self.strings.get(StringId::new(value.payload() as u32)).to_string(),
            _ => "[object]".to_string(),
        }
    }

    // ---------------------------------------------------------------------
    // Strings and conversions
    // ---------------------------------------------------------------------

    /// `a + b` on strings.
    pub fn concat_strings(&mut self, a: StringId, b: StringId) -> StringId {
        let joined = format!("{}{}", self.strings.get(a), self.strings.get(b));
        self.strings.intern(&joined)
    }

    /// UTF-16 ordering of two strings.
    pub fn compare_strings(&self, a: StringId, b: StringId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.strings
            .get(a)
            .encode_utf16()
            .cmp(self.strings.get(b).encode_utf16())
    }

    /// One-code-unit string at `index`.
    pub fn string_char_at(&mut self, s: StringId, index: usize) -> Option<StringId> {
        let unit = self.strings.char_code_at(s, index)?;
        let ch = char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut buf = [0u8; 4];
        Some(self.strings.intern(ch.encode_utf8(&mut buf)))
    }

    /// `typeof value`.
    pub fn type_of(&mut self, value: Value) -> StringId {
        let name = match value.value_type() {
            ValueType::Undefined | ValueType::Magic => "undefined",
            ValueType::Null => "object",
            ValueType::Boolean => "boolean",
            ValueType::Int32 | ValueType::Double => "number",
            ValueType::String => "string",
            ValueType::Symbol => "symbol",
            ValueType::BigInt => "bigint",
            ValueType::Object => match value.as_object() {
                Some(obj) if self.is_callable(obj) => "function",
                _ => "object",
            },
        };
        self.strings.intern(name)
    }

    /// `ToBoolean(value)`.
    pub fn to_boolean(&self, value: Value) -> bool {
        match value.value_type() {
            ValueType::Undefined | ValueType::Null | ValueType::Magic => false,
            ValueType::Boolean => value.payload() != 0,
            ValueType::Int32 => value.payload() != 0,
            ValueType::Double => value.as_double().is_some_and(|d| d != 0.0 && !d.is_nan()),
            ValueType::String => !self.strings.get(StringId::new(value.payload() as u32)).is_empty(),
            ValueType::BigInt => value
                .as_bigint()
                .is_some_and(|id| *self.symbols.bigint(id) != BigInt::from(0)),
            ValueType::Symbol | ValueType::Object => true,
        }
    }
}

enum OwnValue {
    Data(Value),
    Getter(Option<ObjectId>),
}

/// Dynamic-slot capacity used for a slot span.
pub fn dynamic_slot_capacity(span: u32) -> u32 {
    if span == 0 { 0 } else { span.next_power_of_two().max(2) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let mut rt = Runtime::new();
        let obj = rt.new_object(None);
        let x = rt.atom_key("x");
        rt.define_property(obj, x, Value::int32(7));
        assert_eq!(rt.get_property(obj, x, Value::object(obj)).unwrap(), Value::int32(7));
        assert_eq!(rt.slot_location(obj, x), Some(SlotLocation::Fixed(16)));
    }

    #[test]
    fn test_properties_spill_to_dynamic_slots() {
        let mut rt = Runtime::new();
        let obj = rt.new_object(None);
        for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            let key = rt.atom_key(name);
            rt.define_property(obj, key, Value::int32(i as i32));
        }
        let e = rt.atom_key("e");
        assert_eq!(rt.slot_location(obj, e), Some(SlotLocation::Dynamic(0)));
        assert_eq!(rt.load_dynamic_slot(obj, 0), Value::int32(4));
        assert_eq!(rt.object(obj).dynamic_slots.len(), 2);
    }

    #[test]
    fn test_proto_chain_and_getter() {
        let mut rt = Runtime::new();
        let proto = rt.new_object(None);
        let getter = rt.new_native_function(0, |_, args| {
            Ok(Value::boolean(args.this.is_object()))
        });
        let g = rt.atom_key("g");
        rt.define_accessor(proto, g, Some(getter), None);
        let obj = rt.new_object(Some(proto));
        assert_eq!(rt.get_property(obj, g, Value::object(obj)).unwrap(), Value::TRUE);
        assert_eq!(rt.megamorphic_load_slot(obj, g), None);
        let missing = rt.atom_key("missing");
        assert_eq!(rt.megamorphic_load_slot(obj, missing), Some(Value::UNDEFINED));
    }

    #[test]
    fn test_template_this_matches_create_this() {
        let mut rt = Runtime::new();
        let ctor = rt.new_scripted_function(0, |_, _| Ok(Value::UNDEFINED));
        let proto = rt.new_object(None);
        let prototype = PropertyKey::Atom(rt.names.prototype);
        rt.define_property(ctor, prototype, Value::object(proto));

        let plain = rt.create_this(ctor, ctor);
        let template = rt.new_object(Some(proto));
        let from_template = rt.create_this_from_template(template);
        assert_ne!(from_template, template);
        assert_eq!(rt.shape_of(from_template), rt.shape_of(plain));
        assert_eq!(rt.object(from_template).group, rt.object(plain).group);
        assert!(rt.object(from_template).fixed_slots.iter().all(|v| *v == Value::UNDEFINED));
    }

    #[test]
    fn test_post_barrier_only_for_tenured_holder() {
        let mut rt = Runtime::new();
        let holder = rt.new_object(None);
        rt.minor_gc();
        let young = rt.new_object(None);
        assert!(rt.needs_post_barrier(holder, Value::object(young)));
        assert!(!rt.needs_post_barrier(young, Value::object(holder)));
        let x = rt.atom_key("x");
        rt.define_property(holder, x, Value::object(young));
        assert!(rt.gc.store_buffer_contains(holder));
    }

    #[test]
    fn test_add_dense_element_pure_respects_limit() {
        let mut rt = Runtime::new();
        rt.max_dense_capacity = 4;
        let arr = rt.new_array(vec![Value::int32(0); 4]);
        assert!(!rt.add_dense_element_pure(arr));
        rt.max_dense_capacity = 64;
        assert!(rt.add_dense_element_pure(arr));
        assert_eq!(rt.object(arr).elements.capacity, 8);
    }

    #[test]
    fn test_call_function_switches_realm_and_rectifies() {
        let mut rt = Runtime::new();
        let other = rt.new_realm("other");
        rt.set_current_realm(other);
        let f = rt.new_scripted_function(3, |rt, args| {
            Ok(Value::int32(args.args.len() as i32 * 10 + rt.current_realm().index() as i32))
        });
        rt.set_current_realm(RealmId::new(0));
        let result = rt
            .call_function(f, CallArgs::new(f, Value::UNDEFINED, vec![Value::int32(1)]))
            .unwrap();
        assert_eq!(result, Value::int32(31));
        assert_eq!(rt.current_realm(), RealmId::new(0));
        assert!(rt.frames().is_empty());
    }

    #[test]
    fn test_compare_and_concat() {
        let mut rt = Runtime::new();
        let a = rt.intern("ab");
        let b = rt.intern("b");
        assert_eq!(rt.compare_strings(a, b), Ordering::Less);
        let ab = rt.concat_strings(a, b);
        assert_eq!(rt.strings.get(ab), "abb");
    }
}
