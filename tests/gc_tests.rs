use cynic::{
    VM, Value, VmConfig,
    bytecode::{chunk::Chunk, op_code::OpCode, token::Token},
    runtime::{
        function::{Function, VarArg},
        gc::{GcHandle, HeapObject},
    },
};

fn tok() -> Token {
    Token::new("x", 1, 1)
}

fn entry(vm: &mut VM, chunk: Chunk) -> GcHandle {
    vm.heap_mut()
        .alloc(HeapObject::Function(Function::new("", chunk, 0)))
}

/// Two dicts that point at each other through key 0, then dropped.
fn cycle_program() -> Chunk {
    let mut chunk = Chunk::new();
    chunk.emit(OpCode::OpDict, &[0], tok()); // slot 1
    chunk.emit(OpCode::OpDict, &[0], tok()); // slot 2
    for (value, container) in [(2, 1), (1, 2)] {
        chunk.emit(OpCode::OpGetLocal, &[value], tok());
        chunk.emit(OpCode::OpGetLocal, &[container], tok());
        chunk.emit_constant(Value::Int(0), tok());
        chunk.emit(OpCode::OpSetIndex, &[], tok());
        chunk.emit(OpCode::OpPop, &[], tok());
    }
    chunk.emit(OpCode::OpReturn, &[0], tok());
    chunk
}

#[test]
fn unreachable_cycle_is_reclaimed_after_run() {
    let mut vm = VM::default();
    let main = entry(&mut vm, cycle_program());
    vm.heap_mut().pin(main);

    vm.run(main).unwrap();
    // entry closure plus both dicts
    assert_eq!(vm.heap().live_count(), 4);

    let freed = vm.collect_garbage();
    assert_eq!(freed, 3);
    assert_eq!(vm.heap().live_count(), 1);
    assert!(vm.heap().is_live(main));
}

#[test]
fn globals_keep_objects_alive() {
    let mut vm = VM::default();
    let mut chunk = Chunk::new();
    chunk.emit_constant(Value::Int(1), tok());
    chunk.emit(OpCode::OpArray, &[1], tok());
    chunk.emit(OpCode::OpSetGlobal, &[0], tok());
    chunk.emit(OpCode::OpReturn, &[0], tok());
    let main = entry(&mut vm, chunk);

    vm.run(main).unwrap();
    vm.collect_garbage();

    let array = vm.global(0).unwrap();
    assert_eq!(vm.render(&array), "[1]");
    assert!(!vm.heap().is_live(main));
}

/// Builds a string by repeated concatenation, allocating on every step.
fn concat_loop(vm: &mut VM, rounds: i64) -> Chunk {
    let piece = Value::Object(vm.heap_mut().alloc(HeapObject::from("ab")));
    let empty = Value::Object(vm.heap_mut().alloc(HeapObject::from("")));

    let mut chunk = Chunk::new();
    chunk.emit_constant(empty, tok()); // slot 1: acc
    chunk.emit_constant(Value::Int(0), tok()); // slot 2: i
    let loop_start = chunk.len();
    chunk.emit(OpCode::OpGetLocal, &[2], tok());
    chunk.emit_constant(Value::Int(rounds), tok());
    chunk.emit(OpCode::OpLess, &[], tok());
    let exit = chunk.emit_jump(OpCode::OpJumpIfFalse, tok());
    chunk.emit(OpCode::OpPop, &[], tok());

    chunk.emit(OpCode::OpGetLocal, &[1], tok());
    chunk.emit_constant(piece, tok());
    chunk.emit(OpCode::OpAdd, &[], tok());
    chunk.emit(OpCode::OpSetLocal, &[1], tok());
    chunk.emit(OpCode::OpPop, &[], tok());

    chunk.emit(OpCode::OpGetLocal, &[2], tok());
    chunk.emit_constant(Value::Int(1), tok());
    chunk.emit(OpCode::OpAdd, &[], tok());
    chunk.emit(OpCode::OpSetLocal, &[2], tok());
    chunk.emit(OpCode::OpPop, &[], tok());
    chunk.emit_loop(loop_start, tok()).unwrap();

    chunk.patch_jump(exit).unwrap();
    chunk.emit(OpCode::OpPop, &[], tok());
    chunk.emit(OpCode::OpGetLocal, &[1], tok());
    chunk.emit(OpCode::OpReturn, &[1], tok());
    chunk
}

#[test]
fn stress_mode_collects_on_every_allocation() {
    let mut vm = VM::new(VmConfig::default().with_stress_gc(true));
    let chunk = concat_loop(&mut vm, 50);
    let main = entry(&mut vm, chunk);

    let results = vm.run(main).unwrap();

    assert_eq!(vm.render(&results[0]), "ab".repeat(50));
    let stats = vm.gc_stats();
    assert!(stats.total_collections >= 50);
    // Intermediate strings do not pile up.
    assert!(stats.live_objects < 10);
}

#[test]
fn threshold_triggers_collection_without_stress() {
    let mut vm = VM::new(VmConfig {
        initial_gc_threshold: 256,
        ..VmConfig::default()
    });
    let chunk = concat_loop(&mut vm, 200);
    let main = entry(&mut vm, chunk);

    let results = vm.run(main).unwrap();

    assert_eq!(vm.render(&results[0]).len(), 400);
    assert!(vm.gc_stats().total_collections > 0);
}

#[test]
fn closures_survive_stress_collection() {
    let mut vm = VM::new(VmConfig::default().with_stress_gc(true));

    let mut inc = Chunk::new();
    inc.emit(OpCode::OpGetUpvalue, &[0], tok());
    inc.emit_constant(Value::Int(1), tok());
    inc.emit(OpCode::OpAdd, &[], tok());
    inc.emit(OpCode::OpSetUpvalue, &[0], tok());
    inc.emit(OpCode::OpReturn, &[1], tok());
    let inc = vm
        .heap_mut()
        .alloc(HeapObject::Function(Function::new("inc", inc, 0).with_upvalues(1)));

    let mut make = Chunk::new();
    make.emit_constant(Value::Int(0), tok());
    let inc = make.add_constant(Value::Object(inc));
    make.emit_closure(inc, &[(1, 1)], tok());
    make.emit(OpCode::OpReturn, &[1], tok());
    let make = vm
        .heap_mut()
        .alloc(HeapObject::Function(Function::new("make", make, 0)));

    let mut main = Chunk::new();
    let make = main.add_constant(Value::Object(make));
    main.emit_closure(make, &[], tok());
    main.emit(OpCode::OpCall, &[0], tok());
    for _ in 0..3 {
        main.emit(OpCode::OpGetLocal, &[1], tok());
        main.emit(OpCode::OpCall, &[0], tok());
        main.emit(OpCode::OpPop, &[], tok());
    }
    main.emit(OpCode::OpGetLocal, &[1], tok());
    main.emit(OpCode::OpCall, &[0], tok());
    main.emit(OpCode::OpReturn, &[1], tok());
    let main = entry(&mut vm, main);

    let results = vm.run(main).unwrap();
    assert!(matches!(results.as_slice(), [Value::Int(4)]));
}

#[test]
fn unpinned_entry_survives_collection_at_startup() {
    let mut vm = VM::new(VmConfig::default().with_stress_gc(true));
    let garbage = vm.heap_mut().alloc(HeapObject::Array(Vec::new()));

    let mut chunk = Chunk::new();
    chunk.emit_constant(Value::Int(3), tok());
    chunk.emit(OpCode::OpReturn, &[1], tok());
    let main = entry(&mut vm, chunk);

    let results = vm.run(main).unwrap();

    assert!(matches!(results.as_slice(), [Value::Int(3)]));
    assert!(!vm.heap().is_live(garbage));
}

#[test]
fn bound_method_survives_reassignment_of_its_member() {
    let mut vm = VM::new(VmConfig::default().with_stress_gc(true));

    // m(...rest) returns its captured upvalue
    let mut body = Chunk::new();
    body.emit(OpCode::OpGetUpvalue, &[0], tok());
    body.emit(OpCode::OpReturn, &[1], tok());
    let m = vm.heap_mut().alloc(HeapObject::Function(
        Function::new("m", body, 1)
            .with_var_arg(VarArg::TrailingNamed)
            .with_upvalues(1),
    ));
    let m_name = Value::Object(vm.heap_mut().alloc(HeapObject::from("m")));
    let class_name = Value::Object(vm.heap_mut().alloc(HeapObject::from("C")));

    let mut main = Chunk::new();
    main.emit_constant(Value::Int(5), tok()); // slot 1
    let m = main.add_constant(Value::Object(m));
    main.emit_closure(m, &[(1, 0)], tok());
    main.emit_constant(m_name, tok());
    main.emit_constant(class_name, tok());
    main.emit(OpCode::OpClass, &[0, 0, 1, 0, 0, 0], tok()); // slot 2

    main.emit(OpCode::OpGetLocal, &[2], tok());
    main.emit_constant(m_name, tok());
    main.emit(OpCode::OpGetProperty, &[], tok()); // slot 3: bound method

    main.emit(OpCode::OpNil, &[], tok());
    main.emit(OpCode::OpGetLocal, &[2], tok());
    main.emit_constant(m_name, tok());
    main.emit(OpCode::OpSetProperty, &[], tok());
    main.emit(OpCode::OpPop, &[], tok());

    // the bound method in slot 3 is the callee itself
    main.emit(OpCode::OpCall, &[0], tok());
    main.emit(OpCode::OpReturn, &[1], tok());
    let main = entry(&mut vm, main);

    let results = vm.run(main).unwrap();
    assert!(matches!(results.as_slice(), [Value::Int(5)]));
}
