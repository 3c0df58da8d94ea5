use crate::{
    bytecode::chunk::Chunk,
    config::VmConfig,
    error::{ErrorKind, RuntimeError},
    runtime::{
        class::Class,
        closure::{ClassClosureBind, Closure},
        function::{Function, VarArg},
        gc::HeapObject,
        native_function::NativeFunction,
        value::Value,
        vm::VM,
    },
};

fn new_vm() -> VM {
    VM::new(VmConfig::default())
}

fn closure(vm: &mut VM, function: Function) -> Value {
    let function = vm.heap_mut().alloc(HeapObject::Function(function));
    Value::Object(
        vm.heap_mut()
            .alloc(HeapObject::Closure(Closure::new(function, Vec::new()))),
    )
}

fn stack_snapshot(vm: &VM) -> Vec<String> {
    vm.stack[..vm.sp].iter().map(|v| vm.render(v)).collect()
}

#[test]
fn call_closure_pushes_frame_at_callee_slot() {
    let mut vm = new_vm();
    let callee = closure(&mut vm, Function::new("add", Chunk::new(), 2));
    vm.push(Value::Int(0)).unwrap();
    vm.push(callee).unwrap();
    vm.push(Value::Int(1)).unwrap();
    vm.push(Value::Int(2)).unwrap();

    vm.execute_call(2).unwrap();

    assert_eq!(vm.frames.len(), 1);
    assert_eq!(vm.frames[0].base_pointer, 1);
    assert_eq!(vm.sp, 4);
}

#[test]
fn call_closure_wrong_arity_errors() {
    let mut vm = new_vm();
    let callee = closure(&mut vm, Function::new("add", Chunk::new(), 2));
    vm.push(callee).unwrap();
    vm.push(Value::Int(1)).unwrap();

    let err = vm.execute_call(1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Arity);
    assert_eq!(err.message, "add expects 2 arguments, got 1");
}

#[test]
fn named_variadic_collects_surplus_in_call_order() {
    let mut vm = new_vm();
    let function = Function::new("f", Chunk::new(), 2).with_var_arg(VarArg::TrailingNamed);
    let callee = closure(&mut vm, function);
    vm.push(callee).unwrap();
    for i in 1..=4 {
        vm.push(Value::Int(i)).unwrap();
    }

    vm.execute_call(4).unwrap();

    assert_eq!(stack_snapshot(&vm)[1..], ["1", "[2,3,4]"]);
    assert_eq!(vm.frames[0].base_pointer, 0);
}

#[test]
fn named_variadic_one_short_gets_empty_array() {
    let mut vm = new_vm();
    let function = Function::new("f", Chunk::new(), 2).with_var_arg(VarArg::TrailingNamed);
    let callee = closure(&mut vm, function);
    vm.push(callee).unwrap();
    vm.push(Value::Int(1)).unwrap();

    vm.execute_call(1).unwrap();

    assert_eq!(stack_snapshot(&vm)[1..], ["1", "[]"]);
}

#[test]
fn unnamed_variadic_drops_surplus() {
    let mut vm = new_vm();
    let function = Function::new("f", Chunk::new(), 2).with_var_arg(VarArg::TrailingUnnamed);
    let callee = closure(&mut vm, function);
    vm.push(callee).unwrap();
    for i in 1..=3 {
        vm.push(Value::Int(i)).unwrap();
    }

    vm.execute_call(3).unwrap();

    assert_eq!(stack_snapshot(&vm)[1..], ["1"]);
}

#[test]
fn variadic_two_short_is_arity_error() {
    let mut vm = new_vm();
    let function = Function::new("f", Chunk::new(), 3).with_var_arg(VarArg::TrailingNamed);
    let callee = closure(&mut vm, function);
    vm.push(callee).unwrap();
    vm.push(Value::Int(1)).unwrap();

    let err = vm.execute_call(1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Arity);
}

#[test]
fn native_receives_argument_window() {
    let mut vm = new_vm();
    let sum = NativeFunction::new("sum", |_heap, args, _token| {
        let total = args.iter().filter_map(Value::as_int).sum::<i64>();
        Ok(Some(Value::Int(total)))
    });
    let native = vm.define_native(0, sum).unwrap();
    vm.push(native).unwrap();
    vm.push(Value::Int(4)).unwrap();
    vm.push(Value::Int(5)).unwrap();

    vm.execute_call(2).unwrap();

    assert_eq!(vm.sp, 1);
    assert!(matches!(vm.pop().unwrap(), Value::Int(9)));
}

#[test]
fn native_without_result_pushes_nil() {
    let mut vm = new_vm();
    let noop = NativeFunction::new("noop", |_heap, _args, _token| Ok(None));
    let native = vm.define_native(0, noop).unwrap();
    vm.push(native).unwrap();

    vm.execute_call(0).unwrap();

    assert!(matches!(vm.pop().unwrap(), Value::Nil));
}

#[test]
fn native_errors_propagate() {
    let mut vm = new_vm();
    let fail = NativeFunction::new("fail", |_heap, _args, _token| {
        Err(RuntimeError::native("refused"))
    });
    let native = vm.define_native(0, fail).unwrap();
    vm.push(native).unwrap();

    let err = vm.execute_call(0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Native);
}

#[test]
fn calling_a_number_is_not_callable() {
    let mut vm = new_vm();
    vm.push(Value::Int(3)).unwrap();
    let err = vm.execute_call(0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotCallable);
    assert_eq!(err.message, "cannot call int");
}

#[test]
fn calling_a_class_instantiates_and_runs_constructor() {
    let mut vm = new_vm();
    let ctor = closure(&mut vm, Function::new("init", Chunk::new(), 1));
    let mut class = Class::new("Point");
    class
        .constructors
        .insert(1, ctor.as_handle().unwrap());
    let class = vm.heap_mut().alloc(HeapObject::Class(class));

    vm.push(Value::Object(class)).unwrap();
    vm.push(Value::Int(3)).unwrap();
    vm.execute_call(1).unwrap();

    assert_eq!(vm.frames.len(), 1);
    let receiver = vm.stack[0];
    assert!(matches!(
        vm.heap().get(receiver.as_handle().unwrap()),
        HeapObject::ClassInstance(_)
    ));
}

#[test]
fn class_without_matching_constructor_errors() {
    let mut vm = new_vm();
    let class = vm.heap_mut().alloc(HeapObject::Class(Class::new("Empty")));
    vm.push(Value::Object(class)).unwrap();
    vm.push(Value::Int(3)).unwrap();

    let err = vm.execute_call(1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Arity);
    assert!(err.message.contains("Empty"));
}

#[test]
fn bound_method_call_places_receiver_in_slot_zero() {
    let mut vm = new_vm();
    let method = closure(&mut vm, Function::new("m", Chunk::new(), 0));
    let bind = vm
        .heap_mut()
        .alloc(HeapObject::ClassClosureBind(ClassClosureBind {
            receiver: Value::Int(77),
            closure: method.as_handle().unwrap(),
        }));
    vm.push(Value::Object(bind)).unwrap();

    vm.execute_call(0).unwrap();

    assert!(matches!(vm.stack[0], Value::Int(77)));
    assert_eq!(vm.frames[0].closure, method.as_handle().unwrap());
}

#[test]
fn frame_limit_is_enforced() {
    let mut vm = VM::new(VmConfig {
        frames_max: 1,
        ..VmConfig::default()
    });
    let callee = closure(&mut vm, Function::new("f", Chunk::new(), 0));
    vm.push(callee).unwrap();
    vm.execute_call(0).unwrap();
    vm.push(callee).unwrap();

    let err = vm.execute_call(0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CallFrameOverflow);
}

#[test]
fn aggregate_resolve_pads_short_arrays() {
    let mut vm = new_vm();
    let array = vm
        .heap_mut()
        .alloc(HeapObject::Array(vec![Value::Int(1), Value::Int(2)]));
    vm.push(Value::Object(array)).unwrap();

    vm.execute_aggregate_resolve(3).unwrap();

    assert_eq!(stack_snapshot(&vm), ["null", "2", "1"]);
}

#[test]
fn aggregate_resolve_truncates_long_arrays() {
    let mut vm = new_vm();
    let array = vm.heap_mut().alloc(HeapObject::Array(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
    ]));
    vm.push(Value::Object(array)).unwrap();

    vm.execute_aggregate_resolve(2).unwrap();

    assert_eq!(stack_snapshot(&vm), ["2", "1"]);
}

#[test]
fn aggregate_resolve_scalar_fills_first_target() {
    let mut vm = new_vm();
    vm.push(Value::Int(5)).unwrap();

    vm.execute_aggregate_resolve(3).unwrap();

    assert_eq!(stack_snapshot(&vm), ["null", "null", "5"]);
}

#[test]
fn aggregate_resolve_var_arg_collects_rest() {
    let mut vm = new_vm();
    let array = vm.heap_mut().alloc(HeapObject::Array(
        (1..=4).map(Value::Int).collect(),
    ));
    vm.push(Value::Object(array)).unwrap();

    vm.execute_aggregate_resolve_var_arg(2).unwrap();

    assert_eq!(stack_snapshot(&vm), ["[2,3,4]", "1"]);
}

#[test]
fn aggregate_resolve_var_arg_short_input() {
    let mut vm = new_vm();
    let array = vm
        .heap_mut()
        .alloc(HeapObject::Array(vec![Value::Int(1)]));
    vm.push(Value::Object(array)).unwrap();

    vm.execute_aggregate_resolve_var_arg(3).unwrap();

    assert_eq!(stack_snapshot(&vm), ["[]", "null", "1"]);

    let mut vm = new_vm();
    vm.push(Value::Int(7)).unwrap();
    vm.execute_aggregate_resolve_var_arg(2).unwrap();
    assert_eq!(stack_snapshot(&vm), ["[]", "7"]);
}

#[test]
fn init_var_arg_interleaves_values_and_keys() {
    let mut vm = new_vm();
    for v in [10, 20] {
        vm.push(Value::Int(v)).unwrap();
    }
    for k in [1, 2] {
        vm.push(Value::Int(k)).unwrap();
    }

    vm.execute_init_var_arg(2).unwrap();

    assert_eq!(stack_snapshot(&vm), ["10", "1", "20", "2"]);
}
