use crate::{
    bytecode::op_code::OpCode,
    config::VmConfig,
    error::ErrorKind,
    runtime::{gc::HeapObject, value::Value, vm::VM},
};

fn new_vm() -> VM {
    VM::new(VmConfig::default())
}

fn binary(vm: &mut VM, left: Value, right: Value, op: OpCode) -> Value {
    vm.push(left).unwrap();
    vm.push(right).unwrap();
    vm.execute_binary_operation(op).unwrap();
    vm.pop().unwrap()
}

#[test]
fn add_integers() {
    let mut vm = new_vm();
    let result = binary(&mut vm, Value::Int(2), Value::Int(3), OpCode::OpAdd);
    assert!(matches!(result, Value::Int(5)));
}

#[test]
fn add_mixed_numbers_promotes_to_real() {
    let mut vm = new_vm();
    let result = binary(&mut vm, Value::Int(2), Value::Real(3.5), OpCode::OpAdd);
    assert!(matches!(result, Value::Real(r) if r == 5.5));
}

#[test]
fn integer_division_truncates() {
    let mut vm = new_vm();
    assert!(matches!(
        binary(&mut vm, Value::Int(7), Value::Int(2), OpCode::OpDiv),
        Value::Int(3)
    ));
    assert!(matches!(
        binary(&mut vm, Value::Int(-7), Value::Int(2), OpCode::OpMod),
        Value::Int(-1)
    ));
}

#[test]
fn integer_division_by_zero_errors() {
    let mut vm = new_vm();
    vm.push(Value::Int(1)).unwrap();
    vm.push(Value::Int(0)).unwrap();
    let err = vm.execute_binary_operation(OpCode::OpDiv).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("division by zero"));
}

#[test]
fn real_division_by_zero_is_infinite() {
    let mut vm = new_vm();
    let result = binary(&mut vm, Value::Real(1.0), Value::Int(0), OpCode::OpDiv);
    assert!(matches!(result, Value::Real(r) if r.is_infinite()));
}

#[test]
fn integer_overflow_wraps() {
    let mut vm = new_vm();
    let result = binary(&mut vm, Value::Int(i64::MAX), Value::Int(1), OpCode::OpAdd);
    assert!(matches!(result, Value::Int(i64::MIN)));
}

#[test]
fn bitwise_and_shift_operators() {
    let mut vm = new_vm();
    assert!(matches!(
        binary(&mut vm, Value::Int(0b1100), Value::Int(0b1010), OpCode::OpBitAnd),
        Value::Int(0b1000)
    ));
    assert!(matches!(
        binary(&mut vm, Value::Int(0b1100), Value::Int(0b1010), OpCode::OpBitXor),
        Value::Int(0b0110)
    ));
    assert!(matches!(
        binary(&mut vm, Value::Int(1), Value::Int(65), OpCode::OpShiftLeft),
        Value::Int(2)
    ));
    assert!(matches!(
        binary(&mut vm, Value::Int(-8), Value::Int(1), OpCode::OpShiftRight),
        Value::Int(-4)
    ));
}

#[test]
fn bitwise_rejects_reals() {
    let mut vm = new_vm();
    vm.push(Value::Real(1.0)).unwrap();
    vm.push(Value::Int(1)).unwrap();
    let err = vm.execute_binary_operation(OpCode::OpBitOr).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn logical_operators_require_bools() {
    let mut vm = new_vm();
    assert!(matches!(
        binary(&mut vm, Value::Bool(true), Value::Bool(false), OpCode::OpOr),
        Value::Bool(true)
    ));

    vm.push(Value::Bool(true)).unwrap();
    vm.push(Value::Int(1)).unwrap();
    let err = vm.execute_binary_operation(OpCode::OpAnd).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("bool and int"));
}

#[test]
fn add_concatenates_strings() {
    let mut vm = new_vm();
    let left = vm.alloc_string("foo");
    let right = vm.alloc_string("bar");
    let result = binary(&mut vm, left, right, OpCode::OpAdd);
    assert_eq!(vm.render(&result), "foobar");
}

#[test]
fn add_string_and_int_errors() {
    let mut vm = new_vm();
    let left = vm.alloc_string("foo");
    vm.push(left).unwrap();
    vm.push(Value::Int(1)).unwrap();
    let err = vm.execute_binary_operation(OpCode::OpAdd).unwrap_err();
    assert!(err.message.contains("string and int"));
}

#[test]
fn unary_operators() {
    let mut vm = new_vm();
    let cases = [
        (OpCode::OpNot, Value::Bool(false), Value::Bool(true)),
        (OpCode::OpBitNot, Value::Int(0), Value::Int(-1)),
        (OpCode::OpMinus, Value::Real(2.5), Value::Real(-2.5)),
        (OpCode::OpFactorial, Value::Int(5), Value::Int(120)),
        (OpCode::OpFactorial, Value::Int(0), Value::Int(1)),
    ];
    for (op, operand, expected) in cases {
        vm.push(operand).unwrap();
        vm.execute_unary_operation(op).unwrap();
        assert_eq!(vm.pop().unwrap(), expected, "{op}");
    }
}

#[test]
fn not_requires_bool() {
    let mut vm = new_vm();
    vm.push(Value::Nil).unwrap();
    let err = vm.execute_unary_operation(OpCode::OpNot).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn operands_are_read_through_references() {
    let mut vm = new_vm();
    vm.set_global(0, Value::Int(40)).unwrap();
    let reference = vm.heap_mut().alloc(HeapObject::Ref(
        crate::runtime::reference::Reference::new(crate::runtime::reference::RefTarget::Global(0)),
    ));
    let result = binary(&mut vm, Value::Object(reference), Value::Int(2), OpCode::OpAdd);
    assert!(matches!(result, Value::Int(42)));
}

#[test]
fn logical_operators_reject_numbers_by_name() {
    let mut vm = new_vm();
    let cases = [
        (OpCode::OpAnd, Value::Real(1.0), Value::Real(2.0), "OpAnd: real and real"),
        (OpCode::OpOr, Value::Int(1), Value::Int(0), "OpOr: int and int"),
        (OpCode::OpAnd, Value::Int(1), Value::Real(0.5), "OpAnd: int and real"),
        (OpCode::OpBitOr, Value::Real(1.0), Value::Int(1), "OpBitOr: real and int"),
        (OpCode::OpMod, Value::Real(5.0), Value::Real(2.0), "OpMod: real and real"),
    ];
    for (op, left, right, expected) in cases {
        vm.push(left).unwrap();
        vm.push(right).unwrap();
        let err = vm.execute_binary_operation(op).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
        assert_eq!(err.message, format!("unsupported operand types for {expected}"));
        vm.sp = 0;
    }
}
